use std::ops::ControlFlow;
use anyhow::{anyhow, bail, Context as _, Result};
use java_string::JavaString;
use log::debug;
use crate::{ClassError, ClassWrite};
use crate::class_constants::attribute;
use crate::class_writer::{write_attribute_fix_length, write_unknown_attributes, Compute, Context};
use crate::class_writer::annotation::{annotation_prefix, type_annotation_prefix, AnnotationResidual, AnnotationTarget, AnnotationWriter, Annotations};
use crate::tree::access::{ACC_DEPRECATED, ACC_SYNTHETIC};
use crate::tree::attribute::Attribute;
use crate::tree::class::{ConstantValue, RawMember};
use crate::tree::type_annotation::{TypePath, TypeReference};
use crate::tree::version::Version;
use crate::visitor::field::FieldVisitor;

/// Everything about a field except the [`Context`].
pub struct FieldState {
	access: u32,
	name: JavaString,
	descriptor: JavaString,
	signature: Option<JavaString>,
	value: Option<ConstantValue>,
	annotations: Annotations,
	attributes: Vec<Attribute>,
	/// The `field_info` as copied from a class reader.
	raw: Option<Vec<u8>>,
	/// The finished `field_info`, present after `visit_end`.
	bytes: Option<Vec<u8>>,
}

impl FieldState {
	fn check(&self, got: &'static str) -> Result<()> {
		if self.bytes.is_some() {
			bail!(ClassError::IllegalState { expected: "finish_field", got });
		}
		if self.raw.is_some() {
			bail!(ClassError::IllegalState { expected: "visit_end", got });
		}
		Ok(())
	}
}

/// Writes a field, created by [`ClassWriter`][crate::ClassWriter].
pub struct FieldWriter {
	context: Context,
	state: FieldState,
}

impl FieldWriter {
	pub(crate) fn new(context: Context, access: u32, name: JavaString, descriptor: JavaString, signature: Option<JavaString>, value: Option<ConstantValue>) -> FieldWriter {
		FieldWriter {
			context,
			state: FieldState {
				access,
				name,
				descriptor,
				signature,
				value,
				annotations: Annotations::default(),
				attributes: Vec::new(),
				raw: None,
				bytes: None,
			},
		}
	}

	/// Gives back the context and the `field_info`.
	pub(crate) fn finish(self) -> Result<(Context, Vec<u8>)> {
		match self.state.bytes {
			Some(bytes) => Ok((self.context, bytes)),
			None => bail!(ClassError::IllegalState { expected: "visit_end", got: "finish_field" }),
		}
	}
}

impl FieldVisitor for FieldWriter {
	type AnnotationVisitor = AnnotationWriter;
	type AnnotationResidual = AnnotationResidual<FieldState>;

	fn visit_annotation(mut self, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>
	{
		self.state.check("visit_annotation")?;
		let prefix = annotation_prefix(&mut self.context.symbols, &descriptor)?;
		let annotation_writer = AnnotationWriter::annotation(self.context, prefix);
		let target = AnnotationTarget::Plain { visible };
		Ok(ControlFlow::Continue((AnnotationResidual { parent: self.state, target }, annotation_writer)))
	}

	fn visit_type_annotation(mut self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>
	{
		self.state.check("visit_type_annotation")?;
		let prefix = type_annotation_prefix(&mut self.context.symbols, type_reference, &type_path, &descriptor)?;
		let annotation_writer = AnnotationWriter::annotation(self.context, prefix);
		let target = AnnotationTarget::Type { visible };
		Ok(ControlFlow::Continue((AnnotationResidual { parent: self.state, target }, annotation_writer)))
	}

	fn finish_annotation(this: Self::AnnotationResidual, annotation_visitor: Self::AnnotationVisitor) -> Result<Self> {
		let (context, bytes) = annotation_visitor.finish()?;
		let mut state = this.parent;
		match this.target {
			AnnotationTarget::Plain { visible } => state.annotations.add(bytes, visible, false),
			AnnotationTarget::Type { visible } => state.annotations.add(bytes, visible, true),
			target => bail!("annotation target {target:?} doesn't exist on fields"),
		}
		Ok(FieldWriter { context, state })
	}

	fn visit_attribute(&mut self, attribute: Attribute) -> Result<()> {
		self.state.check("visit_attribute")?;
		self.state.attributes.push(attribute);
		Ok(())
	}

	fn copy_raw(&mut self, raw: &RawMember<'_>) -> Result<bool> {
		let state = &self.state;
		if state.raw.is_some() || state.bytes.is_some() || self.context.compute != Compute::Nothing
			|| raw.access != state.access || !self.context.symbols.shares_pool(raw.pool) {
			return Ok(false);
		}

		let symbols = &mut self.context.symbols;
		let same = raw.name_index == symbols.put_utf8(&state.name)?
			&& raw.descriptor_index == symbols.put_utf8(&state.descriptor)?
			&& raw.signature_index == state.signature.as_deref().map(|signature| symbols.put_utf8(signature)).transpose()?
			&& raw.constant_value_index == state.value.as_ref().map(|value| symbols.put_constant_value(value)).transpose()?;
		if !same {
			return Ok(false);
		}

		debug!("copying field {} unchanged", state.name);
		let mut bytes = Vec::with_capacity(6 + raw.attributes.len());
		bytes.write_u16(raw.access_flags)?;
		bytes.write_u16(raw.name_index)?;
		bytes.write_u16(raw.descriptor_index)?;
		bytes.write_u8_slice(raw.attributes)?;
		self.state.raw = Some(bytes);
		Ok(true)
	}

	fn visit_end(&mut self) -> Result<()> {
		if self.state.bytes.is_some() {
			bail!(ClassError::IllegalState { expected: "finish_field", got: "visit_end" });
		}
		let bytes = match self.state.raw.take() {
			Some(raw) => raw,
			None => write_field(&mut self.context, &self.state)
				.with_context(|| anyhow!("failed to write field {}", self.state.name))?,
		};
		self.state.bytes = Some(bytes);
		Ok(())
	}
}

/// Writes the `field_info`.
fn write_field(context: &mut Context, field: &FieldState) -> Result<Vec<u8>> {
	let symbols = &mut context.symbols;
	let synthetic_attribute = field.access & ACC_SYNTHETIC != 0 && context.version < Version::V1_5;
	let mask = if synthetic_attribute { ACC_DEPRECATED | ACC_SYNTHETIC } else { ACC_DEPRECATED };

	let mut w = Vec::new();
	w.write_u16((field.access & !mask) as u16)?;
	w.write_u16(symbols.put_utf8(&field.name)?)?;
	w.write_u16(symbols.put_utf8(&field.descriptor)?)?;

	let mut attribute_count = 0;
	let mut buffer = Vec::new();

	if let Some(value) = &field.value {
		attribute_count += 1;
		let index = symbols.put_constant_value(value)?;
		write_attribute_fix_length(&mut buffer, symbols, attribute::CONSTANT_VALUE, 2)?;
		buffer.write_u16(index)?;
	}
	if synthetic_attribute {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, symbols, attribute::SYNTHETIC, 0)?;
	}
	if let Some(signature) = &field.signature {
		attribute_count += 1;
		let index = symbols.put_utf8(signature)?;
		write_attribute_fix_length(&mut buffer, symbols, attribute::SIGNATURE, 2)?;
		buffer.write_u16(index)?;
	}
	if field.access & ACC_DEPRECATED != 0 {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, symbols, attribute::DEPRECATED, 0)?;
	}

	attribute_count += field.annotations.write(&mut buffer, symbols)?;
	attribute_count += write_unknown_attributes(&mut buffer, symbols, &field.attributes)?;

	w.write_usize_as_u16(attribute_count).with_context(|| anyhow!("too many attributes"))?;
	w.write_u8_slice(&buffer)?;
	Ok(w)
}

#[cfg(test)]
mod testing {
	use std::ops::ControlFlow;
	use anyhow::{bail, Result};
	use pretty_assertions::assert_eq;
	use crate::ClassError;
	use crate::class_writer::{Compute, Context};
	use crate::class_writer::field::FieldWriter;
	use crate::tree::access::{ACC_DEPRECATED, ACC_FINAL, ACC_STATIC, ACC_SYNTHETIC};
	use crate::tree::class::ConstantValue;
	use crate::tree::version::Version;
	use crate::visitor::field::FieldVisitor;

	fn context(version: Version) -> Context {
		let mut context = Context::new(Compute::Nothing);
		context.class_name = "Foo".into();
		context.version = version;
		context
	}

	#[test]
	fn constant_field() -> Result<()> {
		let access = ACC_STATIC | ACC_FINAL | ACC_DEPRECATED;
		let mut writer = FieldWriter::new(context(Version::V1_8), access, "X".into(), "I".into(), None, Some(ConstantValue::Integer(7)));
		writer.visit_end()?;
		let (_, bytes) = writer.finish()?;

		// #1 "X", #2 "I", #3 7, #4 "ConstantValue", #5 "Deprecated"
		assert_eq!(bytes, vec![
			0x00, 0x18, 0x00, 0x01, 0x00, 0x02,
			0x00, 0x02,
			0x00, 0x04, 0x00, 0x00, 0x00, 0x02, 0x00, 0x03,
			0x00, 0x05, 0x00, 0x00, 0x00, 0x00,
		]);
		Ok(())
	}

	#[test]
	fn synthetic_attribute_before_1_5() -> Result<()> {
		let mut writer = FieldWriter::new(context(Version::V1_4), ACC_SYNTHETIC, "x".into(), "J".into(), None, None);
		writer.visit_end()?;
		let (_, bytes) = writer.finish()?;

		// #1 "x", #2 "J", #3 "Synthetic"
		assert_eq!(bytes, vec![
			0x00, 0x00, 0x00, 0x01, 0x00, 0x02,
			0x00, 0x01,
			0x00, 0x03, 0x00, 0x00, 0x00, 0x00,
		]);

		let mut writer = FieldWriter::new(context(Version::V1_5), ACC_SYNTHETIC, "x".into(), "J".into(), None, None);
		writer.visit_end()?;
		let (_, bytes) = writer.finish()?;
		assert_eq!(bytes, vec![0x10, 0x00, 0x00, 0x01, 0x00, 0x02, 0x00, 0x00]);
		Ok(())
	}

	#[test]
	fn call_order() -> Result<()> {
		let writer = FieldWriter::new(context(Version::V1_8), 0, "x".into(), "I".into(), None, None);
		let Err(error) = writer.finish() else { bail!("unfinished field was accepted") };
		assert_eq!(ClassError::find(&error), Some(&ClassError::IllegalState { expected: "visit_end", got: "finish_field" }));

		let mut writer = FieldWriter::new(context(Version::V1_8), 0, "x".into(), "I".into(), None, None);
		writer.visit_end()?;
		let Err(error) = writer.visit_annotation("LA;".into(), true).map(|flow| matches!(flow, ControlFlow::Continue(_))) else {
			bail!("annotation after visit_end was accepted");
		};
		assert_eq!(ClassError::find(&error), Some(&ClassError::IllegalState { expected: "finish_field", got: "visit_annotation" }));
		Ok(())
	}
}
