use std::ops::ControlFlow;
use anyhow::Result;
use java_string::JavaString;
use crate::tree::annotation::ElementValue;

/// A visitor for the element values of an annotation, or for the elements of an array element value.
///
/// Inside annotations all elements have names, inside arrays and for `AnnotationDefault` they don't.
/// Nested annotations and arrays use the same visitor type.
pub trait AnnotationVisitor: Sized {
	type Residual;

	fn visit_value(&mut self, name: Option<JavaString>, value: ElementValue) -> Result<()>;

	/// Visits an enum constant, `descriptor` being the descriptor of the enum class.
	fn visit_enum(&mut self, name: Option<JavaString>, descriptor: JavaString, value: JavaString) -> Result<()>;

	fn visit_annotation(self, name: Option<JavaString>, descriptor: JavaString) -> Result<ControlFlow<Self, (Self::Residual, Self)>>;
	fn visit_array(self, name: Option<JavaString>) -> Result<ControlFlow<Self, (Self::Residual, Self)>>;
	/// Finishes a nested annotation or array.
	fn finish_nested(this: Self::Residual, nested: Self) -> Result<Self>;

	fn visit_end(&mut self) -> Result<()> {
		Ok(())
	}
}
