use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::ControlFlow;
use anyhow::Result;
use java_string::JavaString;
use duke::tree::class::{ClassHeader, ConstantValue};
use duke::tree::type_annotation::{TypePath, TypeReference};
use duke::visitor::class::ClassVisitor;

/// Counts the members of a class, without looking into any of them.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Members {
	fields: usize,
	methods: usize,
	module: bool,
}

impl Display for Members {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		if self.module {
			write!(f, "module, ")?;
		}
		write!(f, "{} fields, {} methods", self.fields, self.methods)
	}
}

impl ClassVisitor for Members {
	type ModuleVisitor = Infallible;
	type ModuleResidual = Infallible;
	type AnnotationVisitor = Infallible;
	type AnnotationResidual = Infallible;
	type FieldVisitor = Infallible;
	type FieldResidual = Infallible;
	type MethodVisitor = Infallible;
	type MethodResidual = Infallible;

	fn visit(&mut self, _header: ClassHeader) -> Result<()> {
		Ok(())
	}

	fn visit_module(mut self, _name: JavaString, _access: u16, _version: Option<JavaString>)
		-> Result<ControlFlow<Self, (Self::ModuleResidual, Self::ModuleVisitor)>>
	{
		self.module = true;
		Ok(ControlFlow::Break(self))
	}

	fn finish_module(this: Self::ModuleResidual, _module_visitor: Self::ModuleVisitor) -> Result<Self> {
		match this {}
	}

	fn visit_annotation(self, _descriptor: JavaString, _visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>
	{
		Ok(ControlFlow::Break(self))
	}

	fn visit_type_annotation(self, _type_reference: TypeReference, _type_path: TypePath, _descriptor: JavaString, _visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>
	{
		Ok(ControlFlow::Break(self))
	}

	fn finish_annotation(this: Self::AnnotationResidual, _annotation_visitor: Self::AnnotationVisitor) -> Result<Self> {
		match this {}
	}

	fn visit_field(mut self, _access: u32, _name: JavaString, _descriptor: JavaString, _signature: Option<JavaString>, _value: Option<ConstantValue>)
		-> Result<ControlFlow<Self, (Self::FieldResidual, Self::FieldVisitor)>>
	{
		self.fields += 1;
		Ok(ControlFlow::Break(self))
	}

	fn finish_field(this: Self::FieldResidual, _field_visitor: Self::FieldVisitor) -> Result<Self> {
		match this {}
	}

	fn visit_method(mut self, _access: u32, _name: JavaString, _descriptor: JavaString, _signature: Option<JavaString>, _exceptions: Vec<JavaString>)
		-> Result<ControlFlow<Self, (Self::MethodResidual, Self::MethodVisitor)>>
	{
		self.methods += 1;
		Ok(ControlFlow::Break(self))
	}

	fn finish_method(this: Self::MethodResidual, _method_visitor: Self::MethodVisitor) -> Result<Self> {
		match this {}
	}

	fn visit_end(&mut self) -> Result<()> {
		Ok(())
	}
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use crate::members::Members;

	#[test]
	fn display() {
		let members = Members { fields: 1, methods: 2, module: false };
		assert_eq!(members.to_string(), "1 fields, 2 methods");
		let module = Members { module: true, ..Members::default() };
		assert_eq!(module.to_string(), "module, 0 fields, 0 methods");
	}
}
