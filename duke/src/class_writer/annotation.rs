use std::ops::ControlFlow;
use anyhow::{anyhow, bail, Context as _, Result};
use java_string::{JavaStr, JavaString};
use crate::{ClassError, ClassWrite};
use crate::class_constants::attribute;
use crate::class_writer::{write_attribute, Context};
use crate::class_writer::symbols::SymbolTable;
use crate::tree::annotation::ElementValue;
use crate::tree::code::Label;
use crate::tree::type_annotation::{TypePath, TypeReference};
use crate::visitor::annotation::AnnotationVisitor;

/// The element value pairs of an annotation, or the elements of an array, or the single value of an
/// `AnnotationDefault` attribute.
#[derive(Debug)]
struct AnnotationBody {
	bytes: Vec<u8>,
	count: u16,
	/// Where the count is patched in. `None` for `AnnotationDefault`.
	count_at: Option<usize>,
	/// Elements of annotations have names, elements of arrays don't.
	named: bool,
}

impl AnnotationBody {
	fn counted(mut prefix: Vec<u8>, named: bool) -> AnnotationBody {
		let count_at = prefix.len();
		prefix.extend_from_slice(&[0, 0]);
		AnnotationBody { bytes: prefix, count: 0, count_at: Some(count_at), named }
	}

	fn start_element(&mut self, symbols: &mut SymbolTable, name: Option<JavaString>) -> Result<()> {
		if self.count_at.is_none() && self.count == 1 {
			bail!("an annotation default has exactly one value");
		}
		self.count = self.count.checked_add(1)
			.ok_or(ClassError::TooLarge { what: "annotation elements" })?;

		if self.named {
			let name = name.ok_or_else(|| anyhow!("element values of annotations must have a name"))?;
			self.bytes.write_u16(symbols.put_utf8(&name)?)?;
		}
		Ok(())
	}

	fn into_bytes(mut self) -> Vec<u8> {
		if let Some(at) = self.count_at {
			self.bytes[at..at + 2].copy_from_slice(&self.count.to_be_bytes());
		}
		self.bytes
	}
}

/// Writes an annotation, an array element value, or an annotation default.
pub struct AnnotationWriter {
	context: Context,
	body: AnnotationBody,
}

/// The enclosing annotation or array while a nested one is written.
pub struct NestedResidual {
	parent: AnnotationBody,
}

impl AnnotationWriter {
	/// Starts an annotation whose bytes begin with `prefix`, followed by the element value pairs.
	pub(crate) fn annotation(context: Context, prefix: Vec<u8>) -> AnnotationWriter {
		AnnotationWriter { context, body: AnnotationBody::counted(prefix, true) }
	}

	pub(crate) fn annotation_default(context: Context) -> AnnotationWriter {
		AnnotationWriter {
			context,
			body: AnnotationBody { bytes: Vec::new(), count: 0, count_at: None, named: false },
		}
	}

	/// Gives back the context and the finished bytes.
	pub(crate) fn finish(self) -> Result<(Context, Vec<u8>)> {
		if self.body.count_at.is_none() && self.body.count != 1 {
			bail!("an annotation default has exactly one value, got {}", self.body.count);
		}
		Ok((self.context, self.body.into_bytes()))
	}
}

impl AnnotationVisitor for AnnotationWriter {
	type Residual = NestedResidual;

	fn visit_value(&mut self, name: Option<JavaString>, value: ElementValue) -> Result<()> {
		let symbols = &mut self.context.symbols;
		self.body.start_element(symbols, name)?;

		let index = match &value {
			ElementValue::Byte(value) => symbols.put_integer(*value as i32)?,
			ElementValue::Char(value) => symbols.put_integer(*value as i32)?,
			ElementValue::Short(value) => symbols.put_integer(*value as i32)?,
			ElementValue::Boolean(value) => symbols.put_integer(*value as i32)?,
			ElementValue::Int(value) => symbols.put_integer(*value)?,
			ElementValue::Long(value) => symbols.put_long(*value)?,
			ElementValue::Float(value) => symbols.put_float(*value)?,
			ElementValue::Double(value) => symbols.put_double(*value)?,
			ElementValue::String(value) | ElementValue::Class(value) => symbols.put_utf8(value)?,
		};
		self.body.bytes.write_u8(value.tag())?;
		self.body.bytes.write_u16(index)
	}

	fn visit_enum(&mut self, name: Option<JavaString>, descriptor: JavaString, value: JavaString) -> Result<()> {
		let symbols = &mut self.context.symbols;
		self.body.start_element(symbols, name)?;
		self.body.bytes.write_u8(b'e')?;
		self.body.bytes.write_u16(symbols.put_utf8(&descriptor)?)?;
		self.body.bytes.write_u16(symbols.put_utf8(&value)?)
	}

	fn visit_annotation(mut self, name: Option<JavaString>, descriptor: JavaString) -> Result<ControlFlow<Self, (Self::Residual, Self)>> {
		self.body.start_element(&mut self.context.symbols, name)?;
		self.body.bytes.write_u8(b'@')?;
		let type_index = self.context.symbols.put_utf8(&descriptor)?;
		self.body.bytes.write_u16(type_index)?;

		let nested = AnnotationWriter { context: self.context, body: AnnotationBody::counted(Vec::new(), true) };
		Ok(ControlFlow::Continue((NestedResidual { parent: self.body }, nested)))
	}

	fn visit_array(mut self, name: Option<JavaString>) -> Result<ControlFlow<Self, (Self::Residual, Self)>> {
		self.body.start_element(&mut self.context.symbols, name)?;
		self.body.bytes.write_u8(b'[')?;

		let nested = AnnotationWriter { context: self.context, body: AnnotationBody::counted(Vec::new(), false) };
		Ok(ControlFlow::Continue((NestedResidual { parent: self.body }, nested)))
	}

	fn finish_nested(this: Self::Residual, nested: Self) -> Result<Self> {
		let mut parent = this.parent;
		parent.bytes.extend_from_slice(&nested.body.into_bytes());
		Ok(AnnotationWriter { context: nested.context, body: parent })
	}
}

/// Where the bytes of a finished annotation go.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AnnotationTarget {
	Plain { visible: bool },
	Type { visible: bool },
	Default,
	Parameter { parameter: u8, visible: bool },
	Code { target: CodeTarget, type_reference: TypeReference, visible: bool },
}

/// What a type annotation inside code is about. The offsets are only known once the code is assembled.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CodeTarget {
	/// The index of the annotated instruction.
	Instruction(usize),
	LocalVariable(Vec<(Label, Label, u16)>),
	/// The index of the try catch block.
	TryCatch(u16),
}

/// The residual of a class, field or method writer while one of its annotations is written.
pub struct AnnotationResidual<P> {
	pub(crate) parent: P,
	pub(crate) target: AnnotationTarget,
}

/// The first bytes of an annotation, the index of its type.
pub(crate) fn annotation_prefix(symbols: &mut SymbolTable, descriptor: &JavaStr) -> Result<Vec<u8>> {
	let mut prefix = Vec::new();
	prefix.write_u16(symbols.put_utf8(descriptor)?)?;
	Ok(prefix)
}

/// The first bytes of a type annotation outside of code: the target, the type path and the index of its type.
pub(crate) fn type_annotation_prefix(symbols: &mut SymbolTable, type_reference: TypeReference, type_path: &TypePath, descriptor: &JavaStr) -> Result<Vec<u8>> {
	let mut prefix = Vec::new();
	prefix.write_u8(type_reference.target_type())?;
	match type_reference {
		TypeReference::ClassTypeParameter { index } |
		TypeReference::MethodTypeParameter { index } |
		TypeReference::MethodFormalParameter { index } => prefix.write_u8(index)?,
		TypeReference::ClassExtends { index } |
		TypeReference::Throws { index } => prefix.write_u16(index)?,
		TypeReference::ClassTypeParameterBound { type_parameter, bound } |
		TypeReference::MethodTypeParameterBound { type_parameter, bound } => {
			prefix.write_u8(type_parameter)?;
			prefix.write_u8(bound)?;
		},
		TypeReference::Field | TypeReference::MethodReturn | TypeReference::MethodReceiver => {},
		type_reference => bail!("type annotation target {type_reference:?} is only valid inside code"),
	}
	write_type_path(&mut prefix, type_path)?;
	prefix.write_u16(symbols.put_utf8(descriptor)?)?;
	Ok(prefix)
}

/// The first bytes of a type annotation inside of code, without the target.
pub(crate) fn code_type_annotation_prefix(symbols: &mut SymbolTable, type_path: &TypePath, descriptor: &JavaStr) -> Result<Vec<u8>> {
	let mut prefix = Vec::new();
	write_type_path(&mut prefix, type_path)?;
	prefix.write_u16(symbols.put_utf8(descriptor)?)?;
	Ok(prefix)
}

pub(crate) fn write_type_path(w: &mut Vec<u8>, type_path: &TypePath) -> Result<()> {
	w.write_slice(
		&type_path.path,
		|w, size| w.write_usize_as_u8(size).with_context(|| anyhow!("type path too long")),
		|w, kind| {
			let (kind, type_argument_index) = kind.to_raw();
			w.write_u8(kind)?;
			w.write_u8(type_argument_index)
		}
	)
}

/// The annotations and type annotations of a class, field or method.
#[derive(Debug, Default)]
pub(crate) struct Annotations {
	visible: Vec<Vec<u8>>,
	invisible: Vec<Vec<u8>>,
	type_visible: Vec<Vec<u8>>,
	type_invisible: Vec<Vec<u8>>,
}

impl Annotations {
	pub(crate) fn add(&mut self, bytes: Vec<u8>, visible: bool, type_annotation: bool) {
		match (type_annotation, visible) {
			(false, true) => self.visible.push(bytes),
			(false, false) => self.invisible.push(bytes),
			(true, true) => self.type_visible.push(bytes),
			(true, false) => self.type_invisible.push(bytes),
		}
	}

	/// Writes the `Runtime[In]VisibleAnnotations` attributes that aren't empty, returning how many.
	pub(crate) fn write_annotations(&self, w: &mut Vec<u8>, symbols: &mut SymbolTable) -> Result<usize> {
		write_annotation_attributes(w, symbols, [
			(&self.visible, attribute::RUNTIME_VISIBLE_ANNOTATIONS),
			(&self.invisible, attribute::RUNTIME_INVISIBLE_ANNOTATIONS),
		])
	}

	/// Writes the `Runtime[In]VisibleTypeAnnotations` attributes that aren't empty, returning how many.
	pub(crate) fn write_type_annotations(&self, w: &mut Vec<u8>, symbols: &mut SymbolTable) -> Result<usize> {
		write_annotation_attributes(w, symbols, [
			(&self.type_visible, attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS),
			(&self.type_invisible, attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS),
		])
	}

	pub(crate) fn write(&self, w: &mut Vec<u8>, symbols: &mut SymbolTable) -> Result<usize> {
		Ok(self.write_annotations(w, symbols)? + self.write_type_annotations(w, symbols)?)
	}
}

fn write_annotation_attributes(w: &mut Vec<u8>, symbols: &mut SymbolTable, attributes: [(&Vec<Vec<u8>>, &str); 2]) -> Result<usize> {
	let mut attribute_count = 0;
	for (annotations, name) in attributes {
		if !annotations.is_empty() {
			attribute_count += 1;
			write_attribute(w, symbols, name, |w, _| write_annotation_list(w, annotations))?;
		}
	}
	Ok(attribute_count)
}

/// Writes the `num_annotations` and the annotations.
pub(crate) fn write_annotation_list(w: &mut Vec<u8>, annotations: &[Vec<u8>]) -> Result<()> {
	w.write_slice(
		annotations,
		|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("too many annotations")),
		|w, annotation| w.write_u8_slice(annotation)
	)
}

/// The annotations of the parameters of a method, for one of `Runtime[In]VisibleParameterAnnotations`.
#[derive(Debug, Default)]
pub(crate) struct ParameterAnnotations {
	/// Set by [`MethodVisitor::visit_annotable_parameter_count`][crate::visitor::method::MethodVisitor::visit_annotable_parameter_count].
	pub(crate) count: Option<u8>,
	pub(crate) annotations: Vec<(u8, Vec<u8>)>,
}

impl ParameterAnnotations {
	pub(crate) fn is_empty(&self) -> bool {
		self.count.is_none() && self.annotations.is_empty()
	}

	/// Writes the attribute content, `parameters` being the number of parameters in the descriptor.
	pub(crate) fn write(&self, w: &mut Vec<u8>, parameters: usize) -> Result<()> {
		let highest = self.annotations.iter().map(|&(parameter, _)| parameter as usize + 1).max().unwrap_or(0);
		let count = match self.count {
			Some(count) => count as usize,
			None => parameters.max(highest),
		};
		if highest > count {
			bail!("annotation on parameter {} but only {count} parameters are annotable", highest - 1);
		}

		w.write_usize_as_u8(count).with_context(|| anyhow!("too many parameters"))?;
		for parameter in 0..count {
			let annotations: Vec<&Vec<u8>> = self.annotations.iter()
				.filter(|&&(p, _)| p as usize == parameter)
				.map(|(_, bytes)| bytes)
				.collect();
			w.write_usize_as_u16(annotations.len()).with_context(|| anyhow!("too many annotations on parameter {parameter}"))?;
			for annotation in annotations {
				w.write_u8_slice(annotation)?;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod testing {
	use std::ops::ControlFlow;
	use anyhow::{bail, Result};
	use java_string::JavaStr;
	use pretty_assertions::assert_eq;
	use crate::class_writer::annotation::{annotation_prefix, type_annotation_prefix, AnnotationWriter};
	use crate::class_writer::{Compute, Context};
	use crate::tree::annotation::ElementValue;
	use crate::tree::type_annotation::{TypePath, TypePathKind, TypeReference};
	use crate::visitor::annotation::AnnotationVisitor;

	#[test]
	fn nested_counts() -> Result<()> {
		let mut context = Context::new(Compute::Nothing);
		let prefix = annotation_prefix(&mut context.symbols, JavaStr::from_str("LFoo;"))?;
		let mut writer = AnnotationWriter::annotation(context, prefix);

		writer.visit_value(Some("a".into()), ElementValue::Int(1))?;
		let ControlFlow::Continue((residual, mut array)) = writer.visit_array(Some("b".into()))? else { bail!("array refused") };
		array.visit_value(None, ElementValue::Boolean(true))?;
		array.visit_value(None, ElementValue::Boolean(false))?;
		writer = AnnotationWriter::finish_nested(residual, array)?;

		let (_, bytes) = writer.finish()?;
		// #1 "LFoo;", #2 "a", #3 1, #4 "b", #5 0
		assert_eq!(bytes, vec![
			0x00, 0x01, 0x00, 0x02,
			0x00, 0x02, b'I', 0x00, 0x03,
			0x00, 0x04, b'[', 0x00, 0x02, b'Z', 0x00, 0x03, b'Z', 0x00, 0x05,
		]);
		Ok(())
	}

	#[test]
	fn unnamed_element_in_annotation() {
		let context = Context::new(Compute::Nothing);
		let mut writer = AnnotationWriter::annotation(context, vec![0x00, 0x01]);
		assert!(writer.visit_value(None, ElementValue::Int(1)).is_err());
	}

	#[test]
	fn annotation_default_single_value() -> Result<()> {
		let mut writer = AnnotationWriter::annotation_default(Context::new(Compute::Nothing));
		writer.visit_enum(None, "LE;".into(), "A".into())?;
		assert!(writer.visit_value(None, ElementValue::Int(2)).is_err());

		let writer = AnnotationWriter::annotation_default(Context::new(Compute::Nothing));
		assert!(writer.finish().is_err());
		Ok(())
	}

	#[test]
	fn type_annotation_targets() -> Result<()> {
		let mut context = Context::new(Compute::Nothing);
		let path = TypePath { path: vec![TypePathKind::ArrayDeeper, TypePathKind::TypeArgument { index: 1 }] };
		let prefix = type_annotation_prefix(&mut context.symbols, TypeReference::Throws { index: 2 }, &path, JavaStr::from_str("LA;"))?;
		assert_eq!(prefix, vec![0x17, 0x00, 0x02, 0x02, 0x00, 0x00, 0x03, 0x01, 0x00, 0x01]);

		assert!(type_annotation_prefix(&mut context.symbols, TypeReference::New, &TypePath::default(), JavaStr::from_str("LA;")).is_err());
		Ok(())
	}
}
