use std::ops::ControlFlow;
use anyhow::Result;
use java_string::JavaString;
use crate::tree::attribute::Attribute;
use crate::tree::class::{ClassHeader, ConstantValue, InnerClass};
use crate::tree::type_annotation::{TypePath, TypeReference};
use crate::visitor::annotation::AnnotationVisitor;
use crate::visitor::Api;
use crate::visitor::field::FieldVisitor;
use crate::visitor::method::MethodVisitor;
use crate::visitor::module::ModuleVisitor;

/// A visitor for a class.
///
/// The methods must be called in this order:
/// - [`ClassVisitor::visit`],
/// - [`ClassVisitor::visit_source`] at most once,
/// - [`ClassVisitor::visit_module`] at most once,
/// - [`ClassVisitor::visit_nest_host`] at most once,
/// - [`ClassVisitor::visit_outer_class`] at most once,
/// - any of [`ClassVisitor::visit_annotation`], [`ClassVisitor::visit_type_annotation`] and
///   [`ClassVisitor::visit_attribute`],
/// - any of [`ClassVisitor::visit_nest_member`], [`ClassVisitor::visit_permitted_subclass`],
///   [`ClassVisitor::visit_inner_class`], [`ClassVisitor::visit_field`] and [`ClassVisitor::visit_method`],
/// - [`ClassVisitor::visit_end`].
pub trait ClassVisitor: Sized {
	type ModuleVisitor: ModuleVisitor;
	type ModuleResidual;
	type AnnotationVisitor: AnnotationVisitor;
	type AnnotationResidual;
	type FieldVisitor: FieldVisitor;
	type FieldResidual;
	type MethodVisitor: MethodVisitor;
	type MethodResidual;

	/// The version of the event contract this visitor implements.
	fn api(&self) -> Api {
		Api::default()
	}

	fn visit(&mut self, header: ClassHeader) -> Result<()>;

	/// Visits the `SourceFile` and the `SourceDebugExtension` attributes.
	fn visit_source(&mut self, source: Option<JavaString>, debug: Option<JavaString>) -> Result<()> {
		let _ = (source, debug);
		Ok(())
	}

	/// Visits the `Module` attribute, `version` is the version of the module.
	fn visit_module(self, name: JavaString, access: u16, version: Option<JavaString>)
		-> Result<ControlFlow<Self, (Self::ModuleResidual, Self::ModuleVisitor)>>;
	fn finish_module(this: Self::ModuleResidual, module_visitor: Self::ModuleVisitor) -> Result<Self>;

	fn visit_nest_host(&mut self, nest_host: JavaString) -> Result<()> {
		let _ = nest_host;
		Ok(())
	}

	/// Visits the `EnclosingMethod` attribute. `name` and `descriptor` are only present if the class is enclosed
	/// in a method or constructor.
	fn visit_outer_class(&mut self, owner: JavaString, name: Option<JavaString>, descriptor: Option<JavaString>) -> Result<()> {
		let _ = (owner, name, descriptor);
		Ok(())
	}

	fn visit_annotation(self, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>;
	fn visit_type_annotation(self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>;
	fn finish_annotation(this: Self::AnnotationResidual, annotation_visitor: Self::AnnotationVisitor) -> Result<Self>;

	/// Visits an attribute this library doesn't know.
	fn visit_attribute(&mut self, attribute: Attribute) -> Result<()> {
		let _ = attribute;
		Ok(())
	}

	fn visit_nest_member(&mut self, nest_member: JavaString) -> Result<()> {
		let _ = nest_member;
		Ok(())
	}

	fn visit_permitted_subclass(&mut self, permitted_subclass: JavaString) -> Result<()> {
		let _ = permitted_subclass;
		Ok(())
	}

	fn visit_inner_class(&mut self, inner_class: InnerClass) -> Result<()> {
		let _ = inner_class;
		Ok(())
	}

	fn visit_field(self, access: u32, name: JavaString, descriptor: JavaString, signature: Option<JavaString>, value: Option<ConstantValue>)
		-> Result<ControlFlow<Self, (Self::FieldResidual, Self::FieldVisitor)>>;
	fn finish_field(this: Self::FieldResidual, field_visitor: Self::FieldVisitor) -> Result<Self>;

	fn visit_method(self, access: u32, name: JavaString, descriptor: JavaString, signature: Option<JavaString>, exceptions: Vec<JavaString>)
		-> Result<ControlFlow<Self, (Self::MethodResidual, Self::MethodVisitor)>>;
	fn finish_method(this: Self::MethodResidual, method_visitor: Self::MethodVisitor) -> Result<Self>;

	fn visit_end(&mut self) -> Result<()>;
}
