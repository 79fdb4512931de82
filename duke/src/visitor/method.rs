use std::ops::ControlFlow;
use anyhow::Result;
use java_string::JavaString;
use crate::tree::attribute::Attribute;
use crate::tree::class::RawMember;
use crate::tree::code::{Instruction, Label, LocalVariable};
use crate::tree::frame::Frame;
use crate::tree::type_annotation::{TypePath, TypeReference};
use crate::visitor::annotation::AnnotationVisitor;

/// A visitor for a method.
///
/// The methods must be called in this order:
/// - any of [`MethodVisitor::visit_parameter`], [`MethodVisitor::visit_annotation_default`],
///   [`MethodVisitor::visit_annotation`], [`MethodVisitor::visit_type_annotation`],
///   [`MethodVisitor::visit_annotable_parameter_count`], [`MethodVisitor::visit_parameter_annotation`] and
///   [`MethodVisitor::visit_attribute`],
/// - optionally [`MethodVisitor::visit_code`], followed by any of the code events and
///   [`MethodVisitor::visit_code_attribute`], and then [`MethodVisitor::visit_maxs`],
/// - [`MethodVisitor::visit_end`].
///
/// Among the code events, labels must be created with [`MethodVisitor::new_label`] of the same visitor.
/// [`MethodVisitor::visit_insn_annotation`] is about the instruction visited last,
/// [`MethodVisitor::visit_try_catch_annotation`] must come after the try catch block it's about.
pub trait MethodVisitor: Sized {
	type AnnotationVisitor: AnnotationVisitor;
	type AnnotationResidual;

	/// Visits an entry of the `MethodParameters` attribute.
	fn visit_parameter(&mut self, name: Option<JavaString>, access: u16) -> Result<()> {
		let _ = (name, access);
		Ok(())
	}

	/// Visits the `AnnotationDefault` attribute. The annotation visitor gets exactly one value, without a name.
	fn visit_annotation_default(self) -> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>;
	fn visit_annotation(self, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>;
	fn visit_type_annotation(self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>;

	/// Visits the number of parameters that can have annotations. This may be less than the number of parameters in
	/// the descriptor, for example for synthetic parameters.
	fn visit_annotable_parameter_count(&mut self, count: u8, visible: bool) -> Result<()> {
		let _ = (count, visible);
		Ok(())
	}
	fn visit_parameter_annotation(self, parameter: u8, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>;

	fn finish_annotation(this: Self::AnnotationResidual, annotation_visitor: Self::AnnotationVisitor) -> Result<Self>;

	fn visit_attribute(&mut self, attribute: Attribute) -> Result<()> {
		let _ = attribute;
		Ok(())
	}

	/// Offers the attributes of the method as found in the class file being read.
	///
	/// Returns `true` if the visitor took them, then the reader only calls [`MethodVisitor::visit_end`] afterwards.
	/// Visitors changing the method in any way must return `false`.
	fn copy_raw(&mut self, raw: &RawMember<'_>) -> Result<bool> {
		let _ = raw;
		Ok(false)
	}

	/// Starts the code of the method. Not called for abstract and native methods.
	fn visit_code(&mut self) -> Result<()>;

	/// Creates a new label, only valid for this visitor.
	fn new_label(&mut self) -> Label;

	/// Visits the frame at the next instruction.
	fn visit_frame(&mut self, frame: Frame) -> Result<()>;
	fn visit_instruction(&mut self, instruction: Instruction) -> Result<()>;
	/// Places a label at the next instruction.
	fn visit_label(&mut self, label: Label) -> Result<()>;

	fn visit_insn_annotation(self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>;

	/// Visits an exception handler covering `start` (inclusive) to `end` (exclusive). `catch_type` is `None` for
	/// `finally` blocks.
	fn visit_try_catch_block(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<JavaString>) -> Result<()>;
	fn visit_try_catch_annotation(self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>;

	fn visit_local_variable(&mut self, local_variable: LocalVariable) -> Result<()> {
		let _ = local_variable;
		Ok(())
	}
	/// Visits an annotation on the type of a local variable. `ranges` has entries of start label, end label and
	/// local variable index.
	fn visit_local_variable_annotation(self, type_reference: TypeReference, type_path: TypePath, ranges: Vec<(Label, Label, u16)>, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>;

	fn visit_line_number(&mut self, line: u16, start: Label) -> Result<()> {
		let _ = (line, start);
		Ok(())
	}

	/// Visits an attribute of the `Code` attribute this library doesn't interpret.
	///
	/// The content is kept as is. Bytecode offsets in it are not updated if the code changes, for example by branch
	/// widening.
	fn visit_code_attribute(&mut self, attribute: Attribute) -> Result<()> {
		let _ = attribute;
		Ok(())
	}

	fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<()>;

	fn visit_end(&mut self) -> Result<()> {
		Ok(())
	}
}
