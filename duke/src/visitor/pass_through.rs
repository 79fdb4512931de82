//! An adapter forwarding all events to another visitor.
//!
//! It's the starting point for transformations: wrap the visitor, and intercept the events to change.

use std::ops::ControlFlow;
use anyhow::Result;
use java_string::JavaString;
use crate::tree::annotation::ElementValue;
use crate::tree::attribute::Attribute;
use crate::tree::class::{ClassHeader, ConstantValue, InnerClass, RawMember};
use crate::tree::code::{Instruction, Label, LocalVariable};
use crate::tree::frame::Frame;
use crate::tree::type_annotation::{TypePath, TypeReference};
use crate::visitor::annotation::AnnotationVisitor;
use crate::visitor::Api;
use crate::visitor::class::ClassVisitor;
use crate::visitor::field::FieldVisitor;
use crate::visitor::method::MethodVisitor;
use crate::visitor::module::ModuleVisitor;

/// Forwards every event to the inner visitor.
///
/// [`PassThrough::new`] also forwards the raw member copies offered by the reader, so reading into a
/// `PassThrough<ClassWriter>` keeps unchanged members byte for byte. [`PassThrough::reemitting`] declines them,
/// making the writer rebuild every member from its events.
#[derive(Debug, Clone, PartialEq)]
pub struct PassThrough<V> {
	inner: V,
	api: Api,
	forward_raw: bool,
}

/// The residual of a [`PassThrough`] while a sub-visitor is active.
#[derive(Debug)]
pub struct Residual<R> {
	inner: R,
	api: Api,
	forward_raw: bool,
}

impl<V> PassThrough<V> {
	pub fn new(inner: V) -> PassThrough<V> {
		PassThrough { inner, api: Api::default(), forward_raw: true }
	}

	/// Creates an adapter that declines raw member copies.
	pub fn reemitting(inner: V) -> PassThrough<V> {
		PassThrough { inner, api: Api::default(), forward_raw: false }
	}

	/// Sets the api the adapter reports.
	pub fn with_api(mut self, api: Api) -> PassThrough<V> {
		self.api = api;
		self
	}

	pub fn inner(&self) -> &V {
		&self.inner
	}

	pub fn into_inner(self) -> V {
		self.inner
	}

	fn wrap<R, S>(api: Api, forward_raw: bool, flow: ControlFlow<V, (R, S)>) -> ControlFlow<PassThrough<V>, (Residual<R>, PassThrough<S>)> {
		match flow {
			ControlFlow::Break(inner) => ControlFlow::Break(PassThrough { inner, api, forward_raw }),
			ControlFlow::Continue((residual, sub)) => ControlFlow::Continue((
				Residual { inner: residual, api, forward_raw },
				PassThrough { inner: sub, api, forward_raw },
			)),
		}
	}
}

impl<V: ClassVisitor> ClassVisitor for PassThrough<V> {
	type ModuleVisitor = PassThrough<V::ModuleVisitor>;
	type ModuleResidual = Residual<V::ModuleResidual>;
	type AnnotationVisitor = PassThrough<V::AnnotationVisitor>;
	type AnnotationResidual = Residual<V::AnnotationResidual>;
	type FieldVisitor = PassThrough<V::FieldVisitor>;
	type FieldResidual = Residual<V::FieldResidual>;
	type MethodVisitor = PassThrough<V::MethodVisitor>;
	type MethodResidual = Residual<V::MethodResidual>;

	fn api(&self) -> Api {
		self.api
	}

	fn visit(&mut self, header: ClassHeader) -> Result<()> {
		self.inner.visit(header)
	}

	fn visit_source(&mut self, source: Option<JavaString>, debug: Option<JavaString>) -> Result<()> {
		self.inner.visit_source(source, debug)
	}

	fn visit_module(self, name: JavaString, access: u16, version: Option<JavaString>)
			-> Result<ControlFlow<Self, (Self::ModuleResidual, Self::ModuleVisitor)>> {
		Ok(Self::wrap(self.api, self.forward_raw, self.inner.visit_module(name, access, version)?))
	}

	fn finish_module(this: Self::ModuleResidual, module_visitor: Self::ModuleVisitor) -> Result<Self> {
		let inner = V::finish_module(this.inner, module_visitor.inner)?;
		Ok(PassThrough { inner, api: this.api, forward_raw: this.forward_raw })
	}

	fn visit_nest_host(&mut self, nest_host: JavaString) -> Result<()> {
		self.inner.visit_nest_host(nest_host)
	}

	fn visit_outer_class(&mut self, owner: JavaString, name: Option<JavaString>, descriptor: Option<JavaString>) -> Result<()> {
		self.inner.visit_outer_class(owner, name, descriptor)
	}

	fn visit_annotation(self, descriptor: JavaString, visible: bool)
			-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		Ok(Self::wrap(self.api, self.forward_raw, self.inner.visit_annotation(descriptor, visible)?))
	}

	fn visit_type_annotation(self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
			-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		Ok(Self::wrap(self.api, self.forward_raw, self.inner.visit_type_annotation(type_reference, type_path, descriptor, visible)?))
	}

	fn finish_annotation(this: Self::AnnotationResidual, annotation_visitor: Self::AnnotationVisitor) -> Result<Self> {
		let inner = V::finish_annotation(this.inner, annotation_visitor.inner)?;
		Ok(PassThrough { inner, api: this.api, forward_raw: this.forward_raw })
	}

	fn visit_attribute(&mut self, attribute: Attribute) -> Result<()> {
		self.inner.visit_attribute(attribute)
	}

	fn visit_nest_member(&mut self, nest_member: JavaString) -> Result<()> {
		self.inner.visit_nest_member(nest_member)
	}

	fn visit_permitted_subclass(&mut self, permitted_subclass: JavaString) -> Result<()> {
		self.inner.visit_permitted_subclass(permitted_subclass)
	}

	fn visit_inner_class(&mut self, inner_class: InnerClass) -> Result<()> {
		self.inner.visit_inner_class(inner_class)
	}

	fn visit_field(self, access: u32, name: JavaString, descriptor: JavaString, signature: Option<JavaString>, value: Option<ConstantValue>)
			-> Result<ControlFlow<Self, (Self::FieldResidual, Self::FieldVisitor)>> {
		Ok(Self::wrap(self.api, self.forward_raw, self.inner.visit_field(access, name, descriptor, signature, value)?))
	}

	fn finish_field(this: Self::FieldResidual, field_visitor: Self::FieldVisitor) -> Result<Self> {
		let inner = V::finish_field(this.inner, field_visitor.inner)?;
		Ok(PassThrough { inner, api: this.api, forward_raw: this.forward_raw })
	}

	fn visit_method(self, access: u32, name: JavaString, descriptor: JavaString, signature: Option<JavaString>, exceptions: Vec<JavaString>)
			-> Result<ControlFlow<Self, (Self::MethodResidual, Self::MethodVisitor)>> {
		Ok(Self::wrap(self.api, self.forward_raw, self.inner.visit_method(access, name, descriptor, signature, exceptions)?))
	}

	fn finish_method(this: Self::MethodResidual, method_visitor: Self::MethodVisitor) -> Result<Self> {
		let inner = V::finish_method(this.inner, method_visitor.inner)?;
		Ok(PassThrough { inner, api: this.api, forward_raw: this.forward_raw })
	}

	fn visit_end(&mut self) -> Result<()> {
		self.inner.visit_end()
	}
}

impl<V: ModuleVisitor> ModuleVisitor for PassThrough<V> {
	fn visit_main_class(&mut self, main_class: JavaString) -> Result<()> {
		self.inner.visit_main_class(main_class)
	}

	fn visit_package(&mut self, package: JavaString) -> Result<()> {
		self.inner.visit_package(package)
	}

	fn visit_require(&mut self, module: JavaString, access: u16, version: Option<JavaString>) -> Result<()> {
		self.inner.visit_require(module, access, version)
	}

	fn visit_export(&mut self, package: JavaString, access: u16, modules: Vec<JavaString>) -> Result<()> {
		self.inner.visit_export(package, access, modules)
	}

	fn visit_open(&mut self, package: JavaString, access: u16, modules: Vec<JavaString>) -> Result<()> {
		self.inner.visit_open(package, access, modules)
	}

	fn visit_use(&mut self, service: JavaString) -> Result<()> {
		self.inner.visit_use(service)
	}

	fn visit_provide(&mut self, service: JavaString, providers: Vec<JavaString>) -> Result<()> {
		self.inner.visit_provide(service, providers)
	}

	fn visit_end(&mut self) -> Result<()> {
		self.inner.visit_end()
	}
}

impl<V: AnnotationVisitor> AnnotationVisitor for PassThrough<V> {
	type Residual = Residual<V::Residual>;

	fn visit_value(&mut self, name: Option<JavaString>, value: ElementValue) -> Result<()> {
		self.inner.visit_value(name, value)
	}

	fn visit_enum(&mut self, name: Option<JavaString>, descriptor: JavaString, value: JavaString) -> Result<()> {
		self.inner.visit_enum(name, descriptor, value)
	}

	fn visit_annotation(self, name: Option<JavaString>, descriptor: JavaString) -> Result<ControlFlow<Self, (Self::Residual, Self)>> {
		Ok(Self::wrap(self.api, self.forward_raw, self.inner.visit_annotation(name, descriptor)?))
	}

	fn visit_array(self, name: Option<JavaString>) -> Result<ControlFlow<Self, (Self::Residual, Self)>> {
		Ok(Self::wrap(self.api, self.forward_raw, self.inner.visit_array(name)?))
	}

	fn finish_nested(this: Self::Residual, nested: Self) -> Result<Self> {
		let inner = V::finish_nested(this.inner, nested.inner)?;
		Ok(PassThrough { inner, api: this.api, forward_raw: this.forward_raw })
	}

	fn visit_end(&mut self) -> Result<()> {
		self.inner.visit_end()
	}
}

impl<V: FieldVisitor> FieldVisitor for PassThrough<V> {
	type AnnotationVisitor = PassThrough<V::AnnotationVisitor>;
	type AnnotationResidual = Residual<V::AnnotationResidual>;

	fn visit_annotation(self, descriptor: JavaString, visible: bool)
			-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		Ok(Self::wrap(self.api, self.forward_raw, self.inner.visit_annotation(descriptor, visible)?))
	}

	fn visit_type_annotation(self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
			-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		Ok(Self::wrap(self.api, self.forward_raw, self.inner.visit_type_annotation(type_reference, type_path, descriptor, visible)?))
	}

	fn finish_annotation(this: Self::AnnotationResidual, annotation_visitor: Self::AnnotationVisitor) -> Result<Self> {
		let inner = V::finish_annotation(this.inner, annotation_visitor.inner)?;
		Ok(PassThrough { inner, api: this.api, forward_raw: this.forward_raw })
	}

	fn visit_attribute(&mut self, attribute: Attribute) -> Result<()> {
		self.inner.visit_attribute(attribute)
	}

	fn copy_raw(&mut self, raw: &RawMember<'_>) -> Result<bool> {
		if self.forward_raw {
			self.inner.copy_raw(raw)
		} else {
			Ok(false)
		}
	}

	fn visit_end(&mut self) -> Result<()> {
		self.inner.visit_end()
	}
}

impl<V: MethodVisitor> MethodVisitor for PassThrough<V> {
	type AnnotationVisitor = PassThrough<V::AnnotationVisitor>;
	type AnnotationResidual = Residual<V::AnnotationResidual>;

	fn visit_parameter(&mut self, name: Option<JavaString>, access: u16) -> Result<()> {
		self.inner.visit_parameter(name, access)
	}

	fn visit_annotation_default(self) -> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		Ok(Self::wrap(self.api, self.forward_raw, self.inner.visit_annotation_default()?))
	}

	fn visit_annotation(self, descriptor: JavaString, visible: bool)
			-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		Ok(Self::wrap(self.api, self.forward_raw, self.inner.visit_annotation(descriptor, visible)?))
	}

	fn visit_type_annotation(self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
			-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		Ok(Self::wrap(self.api, self.forward_raw, self.inner.visit_type_annotation(type_reference, type_path, descriptor, visible)?))
	}

	fn visit_annotable_parameter_count(&mut self, count: u8, visible: bool) -> Result<()> {
		self.inner.visit_annotable_parameter_count(count, visible)
	}

	fn visit_parameter_annotation(self, parameter: u8, descriptor: JavaString, visible: bool)
			-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		Ok(Self::wrap(self.api, self.forward_raw, self.inner.visit_parameter_annotation(parameter, descriptor, visible)?))
	}

	fn finish_annotation(this: Self::AnnotationResidual, annotation_visitor: Self::AnnotationVisitor) -> Result<Self> {
		let inner = V::finish_annotation(this.inner, annotation_visitor.inner)?;
		Ok(PassThrough { inner, api: this.api, forward_raw: this.forward_raw })
	}

	fn visit_attribute(&mut self, attribute: Attribute) -> Result<()> {
		self.inner.visit_attribute(attribute)
	}

	fn copy_raw(&mut self, raw: &RawMember<'_>) -> Result<bool> {
		if self.forward_raw {
			self.inner.copy_raw(raw)
		} else {
			Ok(false)
		}
	}

	fn visit_code(&mut self) -> Result<()> {
		self.inner.visit_code()
	}

	fn new_label(&mut self) -> Label {
		self.inner.new_label()
	}

	fn visit_frame(&mut self, frame: Frame) -> Result<()> {
		self.inner.visit_frame(frame)
	}

	fn visit_instruction(&mut self, instruction: Instruction) -> Result<()> {
		self.inner.visit_instruction(instruction)
	}

	fn visit_label(&mut self, label: Label) -> Result<()> {
		self.inner.visit_label(label)
	}

	fn visit_insn_annotation(self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
			-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		Ok(Self::wrap(self.api, self.forward_raw, self.inner.visit_insn_annotation(type_reference, type_path, descriptor, visible)?))
	}

	fn visit_try_catch_block(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<JavaString>) -> Result<()> {
		self.inner.visit_try_catch_block(start, end, handler, catch_type)
	}

	fn visit_try_catch_annotation(self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
			-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		Ok(Self::wrap(self.api, self.forward_raw, self.inner.visit_try_catch_annotation(type_reference, type_path, descriptor, visible)?))
	}

	fn visit_local_variable(&mut self, local_variable: LocalVariable) -> Result<()> {
		self.inner.visit_local_variable(local_variable)
	}

	fn visit_local_variable_annotation(self, type_reference: TypeReference, type_path: TypePath, ranges: Vec<(Label, Label, u16)>, descriptor: JavaString, visible: bool)
			-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		Ok(Self::wrap(self.api, self.forward_raw, self.inner.visit_local_variable_annotation(type_reference, type_path, ranges, descriptor, visible)?))
	}

	fn visit_line_number(&mut self, line: u16, start: Label) -> Result<()> {
		self.inner.visit_line_number(line, start)
	}

	fn visit_code_attribute(&mut self, attribute: Attribute) -> Result<()> {
		self.inner.visit_code_attribute(attribute)
	}

	fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<()> {
		self.inner.visit_maxs(max_stack, max_locals)
	}

	fn visit_end(&mut self) -> Result<()> {
		self.inner.visit_end()
	}
}
