use std::ops::ControlFlow;
use anyhow::Result;
use java_string::JavaString;
use crate::tree::attribute::Attribute;
use crate::tree::class::RawMember;
use crate::tree::type_annotation::{TypePath, TypeReference};
use crate::visitor::annotation::AnnotationVisitor;

pub trait FieldVisitor: Sized {
	type AnnotationVisitor: AnnotationVisitor;
	type AnnotationResidual;

	fn visit_annotation(self, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>;
	fn visit_type_annotation(self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>;
	fn finish_annotation(this: Self::AnnotationResidual, annotation_visitor: Self::AnnotationVisitor) -> Result<Self>;

	fn visit_attribute(&mut self, attribute: Attribute) -> Result<()> {
		let _ = attribute;
		Ok(())
	}

	/// Offers the attributes of the field as found in the class file being read.
	///
	/// Returns `true` if the visitor took them, then the reader only calls [`FieldVisitor::visit_end`] afterwards.
	/// Visitors changing the field in any way must return `false`.
	fn copy_raw(&mut self, raw: &RawMember<'_>) -> Result<bool> {
		let _ = raw;
		Ok(false)
	}

	fn visit_end(&mut self) -> Result<()> {
		Ok(())
	}
}
