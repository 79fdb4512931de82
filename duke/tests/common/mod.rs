#![allow(dead_code)]

use std::ops::ControlFlow;
use anyhow::{bail, Result};
use java_string::JavaString;
use duke::{ClassReader, ClassWriter, Compute, ReadFlags};
use duke::class_writer::MethodWriter;
use duke::tree::access::{ACC_PUBLIC, ACC_STATIC, ACC_SUPER};
use duke::tree::annotation::ElementValue;
use duke::tree::attribute::Attribute;
use duke::tree::class::{ClassHeader, ConstantValue, InnerClass};
use duke::tree::code::{Instruction, Label, LabelGenerator, LocalVariable};
use duke::tree::frame::Frame;
use duke::tree::type_annotation::{TypePath, TypeReference};
use duke::tree::version::Version;
use duke::visitor::Api;
use duke::visitor::annotation::AnnotationVisitor;
use duke::visitor::class::ClassVisitor;
use duke::visitor::field::FieldVisitor;
use duke::visitor::method::MethodVisitor;
use duke::visitor::module::ModuleVisitor;

pub fn header(name: &str, version: Version) -> ClassHeader {
	ClassHeader {
		version,
		access: ACC_PUBLIC | ACC_SUPER,
		name: name.into(),
		signature: None,
		super_class: Some("java/lang/Object".into()),
		interfaces: Vec::new(),
	}
}

/// Adds a method whose code `body` visits, between `visit_code` and `visit_maxs`.
pub fn method<F>(writer: ClassWriter, access: u32, name: &str, descriptor: &str, maxs: (u16, u16), body: F) -> Result<ClassWriter>
where
	F: FnOnce(&mut MethodWriter) -> Result<()>,
{
	let ControlFlow::Continue((residual, mut method)) = writer.visit_method(access, name.into(), descriptor.into(), None, Vec::new())? else {
		bail!("method {name} was refused");
	};
	method.visit_code()?;
	body(&mut method)?;
	method.visit_maxs(maxs.0, maxs.1)?;
	method.visit_end()?;
	ClassWriter::finish_method(residual, method)
}

/// The class `Answer` with `static int f() { return 42; }`.
pub fn answer_class() -> Result<Vec<u8>> {
	let mut writer = ClassWriter::new(Compute::Nothing);
	writer.visit(header("Answer", Version::V1_8))?;
	writer.visit_source(Some("Answer.java".into()), None)?;
	let mut writer = method(writer, ACC_STATIC, "f", "()I", (1, 0), |m| {
		let start = m.new_label();
		m.visit_label(start)?;
		m.visit_line_number(3, start)?;
		m.visit_instruction(Instruction::BiPush(42))?;
		m.visit_instruction(Instruction::IReturn)
	})?;
	writer.visit_end()?;
	writer.to_bytes()
}

/// Reads a class with the flags, recording the events.
pub fn dump(bytes: &[u8], flags: ReadFlags) -> Result<Recorder> {
	ClassReader::new(bytes)?.accept(Recorder::default(), flags)
}

/// Records the events it's given, the frames also separately.
///
/// It's its own sub-visitor, with `()` as the residual.
#[derive(Debug, Default)]
pub struct Recorder {
	pub api: Api,
	pub events: Vec<String>,
	pub frames: Vec<Frame>,
	labels: LabelGenerator,
}

impl Recorder {
	pub fn with_api(api: Api) -> Recorder {
		Recorder { api, ..Recorder::default() }
	}

	fn record(&mut self, event: String) {
		self.events.push(event);
	}

	fn enter<R: Default>(mut self, event: String) -> Result<ControlFlow<Self, (R, Self)>> {
		self.record(event);
		Ok(ControlFlow::Continue((R::default(), self)))
	}

	fn leave(mut self, event: &str) -> Result<Self> {
		self.record(event.to_owned());
		Ok(self)
	}
}

impl ClassVisitor for Recorder {
	type ModuleVisitor = Recorder;
	type ModuleResidual = ();
	type AnnotationVisitor = Recorder;
	type AnnotationResidual = ();
	type FieldVisitor = Recorder;
	type FieldResidual = ();
	type MethodVisitor = Recorder;
	type MethodResidual = ();

	fn api(&self) -> Api {
		self.api
	}

	fn visit(&mut self, header: ClassHeader) -> Result<()> {
		self.record(format!("class {header:?}"));
		Ok(())
	}

	fn visit_source(&mut self, source: Option<JavaString>, debug: Option<JavaString>) -> Result<()> {
		self.record(format!("source {source:?} {debug:?}"));
		Ok(())
	}

	fn visit_module(self, name: JavaString, access: u16, version: Option<JavaString>) -> Result<ControlFlow<Self, (Self::ModuleResidual, Self::ModuleVisitor)>> {
		self.enter(format!("module {name} {access} {version:?}"))
	}

	fn finish_module(_: Self::ModuleResidual, module_visitor: Self::ModuleVisitor) -> Result<Self> {
		module_visitor.leave("end module")
	}

	fn visit_nest_host(&mut self, nest_host: JavaString) -> Result<()> {
		self.record(format!("nest host {nest_host}"));
		Ok(())
	}

	fn visit_outer_class(&mut self, owner: JavaString, name: Option<JavaString>, descriptor: Option<JavaString>) -> Result<()> {
		self.record(format!("outer class {owner} {name:?} {descriptor:?}"));
		Ok(())
	}

	fn visit_annotation(self, descriptor: JavaString, visible: bool) -> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		self.enter(format!("annotation {descriptor} {visible}"))
	}

	fn visit_type_annotation(self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>
	{
		self.enter(format!("type annotation {type_reference:?} {type_path:?} {descriptor} {visible}"))
	}

	fn finish_annotation(_: Self::AnnotationResidual, annotation_visitor: Self::AnnotationVisitor) -> Result<Self> {
		annotation_visitor.leave("end annotation")
	}

	fn visit_attribute(&mut self, attribute: Attribute) -> Result<()> {
		self.record(format!("attribute {attribute:?}"));
		Ok(())
	}

	fn visit_nest_member(&mut self, nest_member: JavaString) -> Result<()> {
		self.record(format!("nest member {nest_member}"));
		Ok(())
	}

	fn visit_permitted_subclass(&mut self, permitted_subclass: JavaString) -> Result<()> {
		self.record(format!("permitted subclass {permitted_subclass}"));
		Ok(())
	}

	fn visit_inner_class(&mut self, inner_class: InnerClass) -> Result<()> {
		self.record(format!("inner class {inner_class:?}"));
		Ok(())
	}

	fn visit_field(self, access: u32, name: JavaString, descriptor: JavaString, signature: Option<JavaString>, value: Option<ConstantValue>)
		-> Result<ControlFlow<Self, (Self::FieldResidual, Self::FieldVisitor)>>
	{
		self.enter(format!("field {access:#x} {name} {descriptor} {signature:?} {value:?}"))
	}

	fn finish_field(_: Self::FieldResidual, field_visitor: Self::FieldVisitor) -> Result<Self> {
		field_visitor.leave("end field")
	}

	fn visit_method(mut self, access: u32, name: JavaString, descriptor: JavaString, signature: Option<JavaString>, exceptions: Vec<JavaString>)
		-> Result<ControlFlow<Self, (Self::MethodResidual, Self::MethodVisitor)>>
	{
		self.labels = LabelGenerator::default();
		self.enter(format!("method {access:#x} {name} {descriptor} {signature:?} {exceptions:?}"))
	}

	fn finish_method(_: Self::MethodResidual, method_visitor: Self::MethodVisitor) -> Result<Self> {
		method_visitor.leave("end method")
	}

	fn visit_end(&mut self) -> Result<()> {
		self.record("end class".to_owned());
		Ok(())
	}
}

impl ModuleVisitor for Recorder {
	fn visit_main_class(&mut self, main_class: JavaString) -> Result<()> {
		self.record(format!("main class {main_class}"));
		Ok(())
	}

	fn visit_package(&mut self, package: JavaString) -> Result<()> {
		self.record(format!("package {package}"));
		Ok(())
	}

	fn visit_require(&mut self, module: JavaString, access: u16, version: Option<JavaString>) -> Result<()> {
		self.record(format!("require {module} {access:#x} {version:?}"));
		Ok(())
	}

	fn visit_export(&mut self, package: JavaString, access: u16, modules: Vec<JavaString>) -> Result<()> {
		self.record(format!("export {package} {access:#x} {modules:?}"));
		Ok(())
	}

	fn visit_open(&mut self, package: JavaString, access: u16, modules: Vec<JavaString>) -> Result<()> {
		self.record(format!("open {package} {access:#x} {modules:?}"));
		Ok(())
	}

	fn visit_use(&mut self, service: JavaString) -> Result<()> {
		self.record(format!("use {service}"));
		Ok(())
	}

	fn visit_provide(&mut self, service: JavaString, providers: Vec<JavaString>) -> Result<()> {
		self.record(format!("provide {service} {providers:?}"));
		Ok(())
	}
}

impl AnnotationVisitor for Recorder {
	type Residual = ();

	fn visit_value(&mut self, name: Option<JavaString>, value: ElementValue) -> Result<()> {
		self.record(format!("value {name:?} {value:?}"));
		Ok(())
	}

	fn visit_enum(&mut self, name: Option<JavaString>, descriptor: JavaString, value: JavaString) -> Result<()> {
		self.record(format!("enum {name:?} {descriptor} {value}"));
		Ok(())
	}

	fn visit_annotation(self, name: Option<JavaString>, descriptor: JavaString) -> Result<ControlFlow<Self, (Self::Residual, Self)>> {
		self.enter(format!("nested annotation {name:?} {descriptor}"))
	}

	fn visit_array(self, name: Option<JavaString>) -> Result<ControlFlow<Self, (Self::Residual, Self)>> {
		self.enter(format!("array {name:?}"))
	}

	fn finish_nested(_: Self::Residual, nested: Self) -> Result<Self> {
		nested.leave("end nested")
	}
}

impl FieldVisitor for Recorder {
	type AnnotationVisitor = Recorder;
	type AnnotationResidual = ();

	fn visit_annotation(self, descriptor: JavaString, visible: bool) -> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		self.enter(format!("annotation {descriptor} {visible}"))
	}

	fn visit_type_annotation(self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>
	{
		self.enter(format!("type annotation {type_reference:?} {type_path:?} {descriptor} {visible}"))
	}

	fn finish_annotation(_: Self::AnnotationResidual, annotation_visitor: Self::AnnotationVisitor) -> Result<Self> {
		annotation_visitor.leave("end annotation")
	}

	fn visit_attribute(&mut self, attribute: Attribute) -> Result<()> {
		self.record(format!("attribute {attribute:?}"));
		Ok(())
	}
}

impl MethodVisitor for Recorder {
	type AnnotationVisitor = Recorder;
	type AnnotationResidual = ();

	fn visit_parameter(&mut self, name: Option<JavaString>, access: u16) -> Result<()> {
		self.record(format!("parameter {name:?} {access:#x}"));
		Ok(())
	}

	fn visit_annotation_default(self) -> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		self.enter("annotation default".to_owned())
	}

	fn visit_annotation(self, descriptor: JavaString, visible: bool) -> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		self.enter(format!("annotation {descriptor} {visible}"))
	}

	fn visit_type_annotation(self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>
	{
		self.enter(format!("type annotation {type_reference:?} {type_path:?} {descriptor} {visible}"))
	}

	fn visit_annotable_parameter_count(&mut self, count: u8, visible: bool) -> Result<()> {
		self.record(format!("annotable parameters {count} {visible}"));
		Ok(())
	}

	fn visit_parameter_annotation(self, parameter: u8, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>
	{
		self.enter(format!("parameter annotation {parameter} {descriptor} {visible}"))
	}

	fn finish_annotation(_: Self::AnnotationResidual, annotation_visitor: Self::AnnotationVisitor) -> Result<Self> {
		annotation_visitor.leave("end annotation")
	}

	fn visit_attribute(&mut self, attribute: Attribute) -> Result<()> {
		self.record(format!("attribute {attribute:?}"));
		Ok(())
	}

	fn visit_code(&mut self) -> Result<()> {
		self.record("code".to_owned());
		Ok(())
	}

	fn new_label(&mut self) -> Label {
		self.labels.next_label()
	}

	fn visit_frame(&mut self, frame: Frame) -> Result<()> {
		self.record(format!("frame {frame:?}"));
		self.frames.push(frame);
		Ok(())
	}

	fn visit_instruction(&mut self, instruction: Instruction) -> Result<()> {
		self.record(format!("{instruction:?}"));
		Ok(())
	}

	fn visit_label(&mut self, label: Label) -> Result<()> {
		self.record(format!("label {}", label.id()));
		Ok(())
	}

	fn visit_insn_annotation(self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>
	{
		self.enter(format!("instruction annotation {type_reference:?} {type_path:?} {descriptor} {visible}"))
	}

	fn visit_try_catch_block(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<JavaString>) -> Result<()> {
		self.record(format!("try {} {} {} {catch_type:?}", start.id(), end.id(), handler.id()));
		Ok(())
	}

	fn visit_try_catch_annotation(self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>
	{
		self.enter(format!("try catch annotation {type_reference:?} {type_path:?} {descriptor} {visible}"))
	}

	fn visit_local_variable(&mut self, local_variable: LocalVariable) -> Result<()> {
		self.record(format!("local variable {local_variable:?}"));
		Ok(())
	}

	fn visit_local_variable_annotation(self, type_reference: TypeReference, type_path: TypePath, ranges: Vec<(Label, Label, u16)>, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>
	{
		self.enter(format!("local variable annotation {type_reference:?} {type_path:?} {ranges:?} {descriptor} {visible}"))
	}

	fn visit_line_number(&mut self, line: u16, start: Label) -> Result<()> {
		self.record(format!("line {line} {}", start.id()));
		Ok(())
	}

	fn visit_code_attribute(&mut self, attribute: Attribute) -> Result<()> {
		self.record(format!("code attribute {attribute:?}"));
		Ok(())
	}

	fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<()> {
		self.record(format!("maxs {max_stack} {max_locals}"));
		Ok(())
	}
}
