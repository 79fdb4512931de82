//! Turning visitor events back into class files.
//!
//! The [`ClassWriter`] interns names into its constant pool as events arrive, and buffers the bytes of fields,
//! methods and class attributes. Method code is assembled when the method ends, computing what the [`Compute`] mode
//! asks for. The class file itself is put together in [`ClassVisitor::visit_end`].

use std::ops::ControlFlow;
use anyhow::{anyhow, bail, Context as _, Result};
use indexmap::IndexMap;
use java_string::JavaString;
use log::trace;
use crate::{jstring, ClassError, ClassReader, ClassWrite};
use crate::class_constants::{attribute, MAGIC};
use crate::class_writer::annotation::{annotation_prefix, type_annotation_prefix, Annotations};
use crate::class_writer::hierarchy::{ClassHierarchy, ObjectHierarchy};
use crate::class_writer::module::ModuleAttributes;
use crate::class_writer::symbols::SymbolTable;
use crate::tree::access::{ACC_DEPRECATED, ACC_SYNTHETIC};
use crate::tree::attribute::Attribute;
use crate::tree::class::{ClassHeader, ConstantValue, InnerClass};
use crate::tree::type_annotation::{TypePath, TypeReference};
use crate::tree::version::Version;
use crate::visitor::Api;
use crate::visitor::class::ClassVisitor;

mod annotation;
mod assembler;
mod field;
mod frames;
pub mod hierarchy;
mod method;
mod module;
mod stack_map;
mod symbols;

pub use annotation::{AnnotationResidual, AnnotationWriter, NestedResidual};
pub use field::{FieldState, FieldWriter};
pub use method::{MethodState, MethodWriter};
pub use module::ModuleWriter;

/// What the [`ClassWriter`] computes for the code of methods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Compute {
	/// Uses the values of [`MethodVisitor::visit_maxs`][crate::visitor::method::MethodVisitor::visit_maxs] and
	/// the visited frames.
	#[default]
	Nothing,
	/// Computes the maximum stack size and number of locals. Visited frames are kept.
	Maxs,
	/// Computes the maximums and the `StackMapTable` from scratch. Visited frames are ignored, unreachable code is
	/// replaced by `nop`s followed by `athrow`.
	///
	/// For class files older than 1.6, this is the same as [`Compute::Maxs`] without any frames.
	Frames,
}

/// What the class writer and all its sub-writers share: the constant pool and the options.
///
/// It's moved into a sub-writer when one is created, and moved back when it's finished.
pub(crate) struct Context {
	pub(crate) symbols: SymbolTable,
	pub(crate) compute: Compute,
	pub(crate) hierarchy: Box<dyn ClassHierarchy>,
	pub(crate) widen_branches: bool,
	pub(crate) api: Api,
	/// The version of the class being written, known after [`ClassVisitor::visit`].
	pub(crate) version: Version,
	pub(crate) class_name: JavaString,
}

impl Context {
	pub(crate) fn new(compute: Compute) -> Context {
		Context {
			symbols: SymbolTable::new(),
			compute,
			hierarchy: Box::new(ObjectHierarchy),
			widen_branches: true,
			api: Api::default(),
			version: Version::MAX,
			class_name: JavaString::new(),
		}
	}
}

/// Writes an attribute whose content `f` writes.
pub(crate) fn write_attribute<F>(w: &mut Vec<u8>, symbols: &mut SymbolTable, name: &str, f: F) -> Result<()>
where
	F: FnOnce(&mut Vec<u8>, &mut SymbolTable) -> Result<()>,
{
	let mut buffer = Vec::new();
	f(&mut buffer, symbols)?;
	w.write_u16(symbols.put_name(name)?)?;
	w.write_usize_as_u32(buffer.len()).with_context(|| anyhow!("attribute {name:?} is too large"))?;
	w.write_u8_slice(&buffer)
}

/// Writes the header of an attribute, the caller writes exactly `length` bytes of content afterwards.
pub(crate) fn write_attribute_fix_length(w: &mut Vec<u8>, symbols: &mut SymbolTable, name: &str, length: usize) -> Result<()> {
	w.write_u16(symbols.put_name(name)?)?;
	w.write_usize_as_u32(length).with_context(|| anyhow!("attribute {name:?} is too large"))
}

/// Writes attributes this library doesn't know as they are, returning how many.
pub(crate) fn write_unknown_attributes(w: &mut Vec<u8>, symbols: &mut SymbolTable, attributes: &[Attribute]) -> Result<usize> {
	for attribute in attributes {
		w.write_u16(symbols.put_utf8(&attribute.name)?)?;
		w.write_usize_as_u32(attribute.content.len()).with_context(|| anyhow!("attribute {:?} is too large", attribute.name))?;
		w.write_u8_slice(&attribute.content)?;
	}
	Ok(attributes.len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
	Start,
	Header,
	Source,
	Module,
	NestHost,
	OuterClass,
	Annotations,
	Members,
	End,
}

/// Everything about a class except the [`Context`].
pub struct ClassState {
	stage: Stage,
	access: u32,
	this_class: u16,
	super_class: u16,
	interfaces: Vec<u16>,
	signature: Option<u16>,
	source_file: Option<u16>,
	source_debug_extension: Option<Vec<u8>>,
	module: Option<ModuleAttributes>,
	nest_host: Option<u16>,
	enclosing_method: Option<(u16, u16)>,
	annotations: Annotations,
	attributes: Vec<Attribute>,
	nest_members: Vec<u16>,
	permitted_subclasses: Vec<u16>,
	/// The entries of the `InnerClasses` attribute by the name of the inner class, the first one visited wins.
	inner_classes: IndexMap<JavaString, [u16; 4]>,
	fields: Vec<Vec<u8>>,
	methods: Vec<Vec<u8>>,
	bytes: Option<Vec<u8>>,
}

impl ClassState {
	fn expected(&self) -> &'static str {
		match self.stage {
			Stage::Start => "visit",
			Stage::End => "to_bytes",
			_ => "visit_end",
		}
	}

	/// Moves on to `stage`, for the events that may only come once.
	fn advance_once(&mut self, stage: Stage, got: &'static str) -> Result<()> {
		if self.stage == Stage::Start || self.stage >= stage {
			bail!(ClassError::IllegalState { expected: self.expected(), got });
		}
		self.stage = stage;
		Ok(())
	}

	/// Moves on to `stage`, for the events that may be repeated.
	fn advance(&mut self, stage: Stage, got: &'static str) -> Result<()> {
		if self.stage == Stage::Start || self.stage > stage {
			bail!(ClassError::IllegalState { expected: self.expected(), got });
		}
		self.stage = stage;
		Ok(())
	}
}

/// A [`ClassVisitor`] producing the bytes of a class file.
///
/// ```
/// # use anyhow::Result;
/// # fn main() -> Result<()> {
/// use duke::{ClassWriter, Compute};
/// use duke::tree::access::ACC_PUBLIC;
/// use duke::tree::class::ClassHeader;
/// use duke::tree::version::Version;
/// use duke::visitor::class::ClassVisitor;
///
/// let mut writer = ClassWriter::new(Compute::Frames);
/// writer.visit(ClassHeader {
///     version: Version::V1_8,
///     access: ACC_PUBLIC,
///     name: "Foo".into(),
///     signature: None,
///     super_class: Some("java/lang/Object".into()),
///     interfaces: Vec::new(),
/// })?;
/// writer.visit_end()?;
/// let bytes = writer.to_bytes()?;
/// assert_eq!(bytes[..4], [0xca, 0xfe, 0xba, 0xbe]);
/// # Ok(())
/// # }
/// ```
pub struct ClassWriter {
	context: Context,
	state: ClassState,
}

impl ClassWriter {
	pub fn new(compute: Compute) -> ClassWriter {
		ClassWriter::with_context(Context::new(compute))
	}

	/// Creates a writer starting with the constant pool of the class `reader` reads.
	///
	/// Fields and methods the reader offers through `copy_raw` are then copied without decoding them, as long as
	/// nothing about them changed and `compute` is [`Compute::Nothing`].
	pub fn from_reader(reader: &ClassReader, compute: Compute) -> Result<ClassWriter> {
		let mut context = Context::new(compute);
		context.symbols = SymbolTable::from_reader(reader)
			.with_context(|| anyhow!("failed to copy the constant pool"))?;
		Ok(ClassWriter::with_context(context))
	}

	fn with_context(context: Context) -> ClassWriter {
		ClassWriter {
			context,
			state: ClassState {
				stage: Stage::Start,
				access: 0,
				this_class: 0,
				super_class: 0,
				interfaces: Vec::new(),
				signature: None,
				source_file: None,
				source_debug_extension: None,
				module: None,
				nest_host: None,
				enclosing_method: None,
				annotations: Annotations::default(),
				attributes: Vec::new(),
				nest_members: Vec::new(),
				permitted_subclasses: Vec::new(),
				inner_classes: IndexMap::new(),
				fields: Vec::new(),
				methods: Vec::new(),
				bytes: None,
			},
		}
	}

	/// Sets the hierarchy frame computation asks for common super classes. Defaults to [`ObjectHierarchy`].
	pub fn with_hierarchy(mut self, hierarchy: impl ClassHierarchy + 'static) -> ClassWriter {
		self.context.hierarchy = Box::new(hierarchy);
		self
	}

	/// Sets the api this writer reports to the reader.
	pub fn with_api(mut self, api: Api) -> ClassWriter {
		self.context.api = api;
		self
	}

	/// Whether jumps too far for a 16 bit offset are rewritten using `goto_w`, on by default. Otherwise they fail with
	/// [`ClassError::BranchOverflow`].
	pub fn with_branch_widening(mut self, widen_branches: bool) -> ClassWriter {
		self.context.widen_branches = widen_branches;
		self
	}

	/// Returns the class file, available after [`ClassVisitor::visit_end`].
	pub fn to_bytes(&self) -> Result<Vec<u8>> {
		match &self.state.bytes {
			Some(bytes) => Ok(bytes.clone()),
			None => bail!(ClassError::IllegalState { expected: "visit_end", got: "to_bytes" }),
		}
	}
}

impl ClassVisitor for ClassWriter {
	type ModuleVisitor = ModuleWriter;
	type ModuleResidual = ClassState;
	type AnnotationVisitor = AnnotationWriter;
	type AnnotationResidual = AnnotationResidual<ClassState>;
	type FieldVisitor = FieldWriter;
	type FieldResidual = ClassState;
	type MethodVisitor = MethodWriter;
	type MethodResidual = ClassState;

	fn api(&self) -> Api {
		self.context.api
	}

	fn visit(&mut self, header: ClassHeader) -> Result<()> {
		if self.state.stage != Stage::Start {
			bail!(ClassError::IllegalState { expected: self.state.expected(), got: "visit" });
		}
		if self.context.compute == Compute::Frames && self.context.api.is_experimental() {
			bail!(ClassError::ExperimentalCompute { api: self.context.api });
		}

		let symbols = &mut self.context.symbols;
		let state = &mut self.state;
		state.stage = Stage::Header;
		state.access = header.access;
		state.this_class = symbols.put_class(&header.name)?;
		state.signature = header.signature.as_deref().map(|signature| symbols.put_utf8(signature)).transpose()?;
		state.super_class = symbols.put_optional(header.super_class.as_deref(), SymbolTable::put_class)?;
		state.interfaces = header.interfaces.iter()
			.map(|interface| symbols.put_class(interface))
			.collect::<Result<_>>()?;

		self.context.version = header.version;
		self.context.class_name = header.name;
		Ok(())
	}

	fn visit_source(&mut self, source: Option<JavaString>, debug: Option<JavaString>) -> Result<()> {
		self.state.advance_once(Stage::Source, "visit_source")?;
		self.state.source_file = source.as_deref().map(|source| self.context.symbols.put_utf8(source)).transpose()?;
		self.state.source_debug_extension = debug.as_deref().map(|debug| jstring::encode(debug).into_owned());
		Ok(())
	}

	fn visit_module(mut self, name: JavaString, access: u16, version: Option<JavaString>)
		-> Result<ControlFlow<Self, (Self::ModuleResidual, Self::ModuleVisitor)>>
	{
		self.state.advance_once(Stage::Module, "visit_module")?;
		let module_writer = ModuleWriter::new(self.context, &name, access, version.as_deref())?;
		Ok(ControlFlow::Continue((self.state, module_writer)))
	}

	fn finish_module(this: Self::ModuleResidual, module_visitor: Self::ModuleVisitor) -> Result<Self> {
		let (context, module) = module_visitor.finish()?;
		let mut state = this;
		state.module = Some(module);
		Ok(ClassWriter { context, state })
	}

	fn visit_nest_host(&mut self, nest_host: JavaString) -> Result<()> {
		self.state.advance_once(Stage::NestHost, "visit_nest_host")?;
		self.state.nest_host = Some(self.context.symbols.put_class(&nest_host)?);
		Ok(())
	}

	fn visit_outer_class(&mut self, owner: JavaString, name: Option<JavaString>, descriptor: Option<JavaString>) -> Result<()> {
		self.state.advance_once(Stage::OuterClass, "visit_outer_class")?;
		let symbols = &mut self.context.symbols;
		let class = symbols.put_class(&owner)?;
		let method = match (name, descriptor) {
			(Some(name), Some(descriptor)) => symbols.put_name_and_type(&name, &descriptor)?,
			_ => 0,
		};
		self.state.enclosing_method = Some((class, method));
		Ok(())
	}

	fn visit_annotation(mut self, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>
	{
		self.state.advance(Stage::Annotations, "visit_annotation")?;
		let prefix = annotation_prefix(&mut self.context.symbols, &descriptor)?;
		let annotation_writer = AnnotationWriter::annotation(self.context, prefix);
		let target = annotation::AnnotationTarget::Plain { visible };
		Ok(ControlFlow::Continue((AnnotationResidual { parent: self.state, target }, annotation_writer)))
	}

	fn visit_type_annotation(mut self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>
	{
		self.state.advance(Stage::Annotations, "visit_type_annotation")?;
		let prefix = type_annotation_prefix(&mut self.context.symbols, type_reference, &type_path, &descriptor)?;
		let annotation_writer = AnnotationWriter::annotation(self.context, prefix);
		let target = annotation::AnnotationTarget::Type { visible };
		Ok(ControlFlow::Continue((AnnotationResidual { parent: self.state, target }, annotation_writer)))
	}

	fn finish_annotation(this: Self::AnnotationResidual, annotation_visitor: Self::AnnotationVisitor) -> Result<Self> {
		let (context, bytes) = annotation_visitor.finish()?;
		let mut state = this.parent;
		match this.target {
			annotation::AnnotationTarget::Plain { visible } => state.annotations.add(bytes, visible, false),
			annotation::AnnotationTarget::Type { visible } => state.annotations.add(bytes, visible, true),
			target => bail!("annotation target {target:?} doesn't exist on classes"),
		}
		Ok(ClassWriter { context, state })
	}

	fn visit_attribute(&mut self, attribute: Attribute) -> Result<()> {
		self.state.advance(Stage::Annotations, "visit_attribute")?;
		self.state.attributes.push(attribute);
		Ok(())
	}

	fn visit_nest_member(&mut self, nest_member: JavaString) -> Result<()> {
		self.state.advance(Stage::Members, "visit_nest_member")?;
		let index = self.context.symbols.put_class(&nest_member)?;
		self.state.nest_members.push(index);
		Ok(())
	}

	fn visit_permitted_subclass(&mut self, permitted_subclass: JavaString) -> Result<()> {
		self.state.advance(Stage::Members, "visit_permitted_subclass")?;
		let index = self.context.symbols.put_class(&permitted_subclass)?;
		self.state.permitted_subclasses.push(index);
		Ok(())
	}

	fn visit_inner_class(&mut self, inner_class: InnerClass) -> Result<()> {
		self.state.advance(Stage::Members, "visit_inner_class")?;
		if self.state.inner_classes.contains_key(&inner_class.name) {
			return Ok(());
		}
		let symbols = &mut self.context.symbols;
		let entry = [
			symbols.put_class(&inner_class.name)?,
			symbols.put_optional(inner_class.outer_name.as_deref(), SymbolTable::put_class)?,
			symbols.put_optional(inner_class.inner_name.as_deref(), SymbolTable::put_utf8)?,
			inner_class.access,
		];
		self.state.inner_classes.insert(inner_class.name, entry);
		Ok(())
	}

	fn visit_field(mut self, access: u32, name: JavaString, descriptor: JavaString, signature: Option<JavaString>, value: Option<ConstantValue>)
		-> Result<ControlFlow<Self, (Self::FieldResidual, Self::FieldVisitor)>>
	{
		self.state.advance(Stage::Members, "visit_field")?;
		let field_writer = FieldWriter::new(self.context, access, name, descriptor, signature, value);
		Ok(ControlFlow::Continue((self.state, field_writer)))
	}

	fn finish_field(this: Self::FieldResidual, field_visitor: Self::FieldVisitor) -> Result<Self> {
		let (context, bytes) = field_visitor.finish()?;
		let mut state = this;
		state.fields.push(bytes);
		Ok(ClassWriter { context, state })
	}

	fn visit_method(mut self, access: u32, name: JavaString, descriptor: JavaString, signature: Option<JavaString>, exceptions: Vec<JavaString>)
		-> Result<ControlFlow<Self, (Self::MethodResidual, Self::MethodVisitor)>>
	{
		self.state.advance(Stage::Members, "visit_method")?;
		let method_writer = MethodWriter::new(self.context, access, name, descriptor, signature, exceptions);
		Ok(ControlFlow::Continue((self.state, method_writer)))
	}

	fn finish_method(this: Self::MethodResidual, method_visitor: Self::MethodVisitor) -> Result<Self> {
		let (context, bytes) = method_visitor.finish()?;
		let mut state = this;
		state.methods.push(bytes);
		Ok(ClassWriter { context, state })
	}

	fn visit_end(&mut self) -> Result<()> {
		if matches!(self.state.stage, Stage::Start | Stage::End) {
			bail!(ClassError::IllegalState { expected: self.state.expected(), got: "visit_end" });
		}
		trace!("writing class {}", self.context.class_name);
		let bytes = write_class(&mut self.context, &self.state)
			.with_context(|| anyhow!("failed to write class {}", self.context.class_name))?;
		self.state.bytes = Some(bytes);
		self.state.stage = Stage::End;
		Ok(())
	}
}

fn write_class_list(w: &mut Vec<u8>, symbols: &mut SymbolTable, name: &str, classes: &[u16]) -> Result<()> {
	write_attribute(w, symbols, name, |w, _| {
		w.write_slice(
			classes,
			|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("too many classes in {name}")),
			|w, &class| w.write_u16(class)
		)
	})
}

fn write_class(context: &mut Context, class: &ClassState) -> Result<Vec<u8>> {
	let symbols = &mut context.symbols;
	let synthetic_attribute = class.access & ACC_SYNTHETIC != 0 && context.version < Version::V1_5;

	// The attributes go first, they may add to the constant pool.
	let mut attribute_count = 0;
	let mut buffer = Vec::new();

	if let Some(signature) = class.signature {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, symbols, attribute::SIGNATURE, 2)?;
		buffer.write_u16(signature)?;
	}
	if let Some(source_file) = class.source_file {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, symbols, attribute::SOURCE_FILE, 2)?;
		buffer.write_u16(source_file)?;
	}
	if let Some(source_debug_extension) = &class.source_debug_extension {
		attribute_count += 1;
		write_attribute(&mut buffer, symbols, attribute::SOURCE_DEBUG_EXTENSION, |w, _| w.write_u8_slice(source_debug_extension))?;
	}
	if let Some((class_index, method_index)) = class.enclosing_method {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, symbols, attribute::ENCLOSING_METHOD, 4)?;
		buffer.write_u16(class_index)?;
		buffer.write_u16(method_index)?;
	}
	if class.access & ACC_DEPRECATED != 0 {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, symbols, attribute::DEPRECATED, 0)?;
	}
	if synthetic_attribute {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, symbols, attribute::SYNTHETIC, 0)?;
	}

	attribute_count += class.annotations.write(&mut buffer, symbols)?;

	if let Some(module) = &class.module {
		attribute_count += module.write(&mut buffer, symbols)?;
	}
	if let Some(nest_host) = class.nest_host {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, symbols, attribute::NEST_HOST, 2)?;
		buffer.write_u16(nest_host)?;
	}
	if !class.nest_members.is_empty() {
		attribute_count += 1;
		write_class_list(&mut buffer, symbols, attribute::NEST_MEMBERS, &class.nest_members)?;
	}
	if !class.permitted_subclasses.is_empty() {
		attribute_count += 1;
		write_class_list(&mut buffer, symbols, attribute::PERMITTED_SUBCLASSES, &class.permitted_subclasses)?;
	}
	if !class.inner_classes.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, symbols, attribute::INNER_CLASSES, |w, _| {
			w.write_usize_as_u16(class.inner_classes.len()).with_context(|| anyhow!("too many inner classes"))?;
			for entry in class.inner_classes.values() {
				for &item in entry {
					w.write_u16(item)?;
				}
			}
			Ok(())
		})?;
	}
	// after everything that can add bootstrap methods
	if symbols.has_bootstrap_methods() {
		attribute_count += 1;
		write_attribute(&mut buffer, symbols, attribute::BOOTSTRAP_METHODS, |w, symbols| symbols.write_bootstrap_methods(w))?;
	}

	attribute_count += write_unknown_attributes(&mut buffer, symbols, &class.attributes)?;

	let mask = if synthetic_attribute { ACC_DEPRECATED | ACC_SYNTHETIC } else { ACC_DEPRECATED };

	let mut w = Vec::new();
	w.write_u32(MAGIC)?;
	w.write_u16(context.version.minor)?;
	w.write_u16(context.version.major)?;
	symbols.write_pool(&mut w)?;
	w.write_u16((class.access & !mask) as u16)?;
	w.write_u16(class.this_class)?;
	w.write_u16(class.super_class)?;
	w.write_slice(
		&class.interfaces,
		|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("too many interfaces")),
		|w, &interface| w.write_u16(interface)
	)?;
	w.write_slice(
		&class.fields,
		|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("too many fields")),
		|w, field| w.write_u8_slice(field)
	)?;
	w.write_slice(
		&class.methods,
		|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("too many methods")),
		|w, method| w.write_u8_slice(method)
	)?;
	w.write_usize_as_u16(attribute_count).with_context(|| anyhow!("too many attributes"))?;
	w.write_u8_slice(&buffer)?;
	Ok(w)
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::{ClassError, ClassWriter, Compute};
	use crate::tree::access::{ACC_DEPRECATED, ACC_PUBLIC, ACC_SUPER};
	use crate::tree::class::{ClassHeader, InnerClass};
	use crate::tree::version::Version;
	use crate::visitor::Api;
	use crate::visitor::class::ClassVisitor;

	fn header(name: &str) -> ClassHeader {
		ClassHeader {
			version: Version::V1_8,
			access: ACC_PUBLIC | ACC_SUPER,
			name: name.into(),
			signature: None,
			super_class: Some("java/lang/Object".into()),
			interfaces: Vec::new(),
		}
	}

	fn utf8(w: &mut Vec<u8>, s: &str) {
		w.push(1);
		w.extend_from_slice(&(s.len() as u16).to_be_bytes());
		w.extend_from_slice(s.as_bytes());
	}

	#[test]
	fn empty_class() -> Result<()> {
		let mut writer = ClassWriter::new(Compute::Nothing);
		writer.visit(header("Foo"))?;
		writer.visit_end()?;

		let mut expected = vec![0xca, 0xfe, 0xba, 0xbe, 0x00, 0x00, 0x00, 0x34, 0x00, 0x05];
		utf8(&mut expected, "Foo");
		expected.extend_from_slice(&[7, 0x00, 0x01]);
		utf8(&mut expected, "java/lang/Object");
		expected.extend_from_slice(&[7, 0x00, 0x03]);
		expected.extend_from_slice(&[
			0x00, 0x21, 0x00, 0x02, 0x00, 0x04,
			0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
		]);
		assert_eq!(writer.to_bytes()?, expected);
		Ok(())
	}

	#[test]
	fn deprecated_and_inner_classes() -> Result<()> {
		let mut writer = ClassWriter::new(Compute::Nothing);
		let mut header = header("Foo");
		header.access |= ACC_DEPRECATED;
		writer.visit(header)?;
		let inner = InnerClass { name: "Foo$1".into(), outer_name: None, inner_name: None, access: 0 };
		writer.visit_inner_class(inner.clone())?;
		writer.visit_inner_class(inner)?;
		writer.visit_end()?;

		let bytes = writer.to_bytes()?;
		// access flags without the deprecated bit, then one attribute each
		let tail = &bytes[bytes.len() - (2 + 6 + 6 + 2 + 8)..];
		assert_eq!(&tail[..2], &[0x00, 0x02]);
		assert_eq!(&tail[2 + 2..2 + 6], &[0x00, 0x00, 0x00, 0x00]);
		assert_eq!(&tail[2 + 6 + 2..2 + 6 + 6], &[0x00, 0x00, 0x00, 0x0a]);
		assert_eq!(&tail[2 + 6 + 6..2 + 6 + 6 + 2], &[0x00, 0x01]);
		Ok(())
	}

	#[test]
	fn call_order() -> Result<()> {
		let mut writer = ClassWriter::new(Compute::Nothing);
		let error = writer.visit_source(None, None).unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::IllegalState { expected: "visit", got: "visit_source" }));

		writer.visit(header("Foo"))?;
		writer.visit_nest_member("Foo$Bar".into())?;
		let error = writer.visit_nest_host("Bar".into()).unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::IllegalState { expected: "visit_end", got: "visit_nest_host" }));

		let error = writer.to_bytes().unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::IllegalState { expected: "visit_end", got: "to_bytes" }));

		writer.visit_end()?;
		let error = writer.visit_end().unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::IllegalState { expected: "to_bytes", got: "visit_end" }));
		Ok(())
	}

	#[test]
	fn experimental_api_computing_frames() {
		let mut writer = ClassWriter::new(Compute::Frames).with_api(Api::Asm10Experimental);
		let error = writer.visit(header("Foo")).unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::ExperimentalCompute { api: Api::Asm10Experimental }));

		let mut writer = ClassWriter::new(Compute::Maxs).with_api(Api::Asm10Experimental);
		assert!(writer.visit(header("Foo")).is_ok());
	}
}
