//! Implementations of the sub-visitors for [`Infallible`], for visitors never continuing into some part of a class.
//!
//! A visitor that always answers with [`ControlFlow::Break`] can use [`Infallible`] as the sub-visitor and residual
//! type.

use std::convert::Infallible;
use std::ops::ControlFlow;
use anyhow::Result;
use java_string::JavaString;
use crate::tree::annotation::ElementValue;
use crate::tree::code::{Instruction, Label};
use crate::tree::frame::Frame;
use crate::tree::type_annotation::{TypePath, TypeReference};
use crate::visitor::annotation::AnnotationVisitor;
use crate::visitor::field::FieldVisitor;
use crate::visitor::method::MethodVisitor;
use crate::visitor::module::ModuleVisitor;

impl ModuleVisitor for Infallible {}

impl AnnotationVisitor for Infallible {
	type Residual = Infallible;

	fn visit_value(&mut self, _name: Option<JavaString>, _value: ElementValue) -> Result<()> {
		match *self {}
	}

	fn visit_enum(&mut self, _name: Option<JavaString>, _descriptor: JavaString, _value: JavaString) -> Result<()> {
		match *self {}
	}

	fn visit_annotation(self, _name: Option<JavaString>, _descriptor: JavaString) -> Result<ControlFlow<Self, (Self::Residual, Self)>> {
		match self {}
	}

	fn visit_array(self, _name: Option<JavaString>) -> Result<ControlFlow<Self, (Self::Residual, Self)>> {
		match self {}
	}

	fn finish_nested(this: Self::Residual, _nested: Self) -> Result<Self> {
		match this {}
	}
}

impl FieldVisitor for Infallible {
	type AnnotationVisitor = Infallible;
	type AnnotationResidual = Infallible;

	fn visit_annotation(self, _descriptor: JavaString, _visible: bool)
			-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		match self {}
	}

	fn visit_type_annotation(self, _type_reference: TypeReference, _type_path: TypePath, _descriptor: JavaString, _visible: bool)
			-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		match self {}
	}

	fn finish_annotation(this: Self::AnnotationResidual, _annotation_visitor: Self::AnnotationVisitor) -> Result<Self> {
		match this {}
	}
}

impl MethodVisitor for Infallible {
	type AnnotationVisitor = Infallible;
	type AnnotationResidual = Infallible;

	fn visit_annotation_default(self) -> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		match self {}
	}

	fn visit_annotation(self, _descriptor: JavaString, _visible: bool)
			-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		match self {}
	}

	fn visit_type_annotation(self, _type_reference: TypeReference, _type_path: TypePath, _descriptor: JavaString, _visible: bool)
			-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		match self {}
	}

	fn visit_parameter_annotation(self, _parameter: u8, _descriptor: JavaString, _visible: bool)
			-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		match self {}
	}

	fn finish_annotation(this: Self::AnnotationResidual, _annotation_visitor: Self::AnnotationVisitor) -> Result<Self> {
		match this {}
	}

	fn visit_code(&mut self) -> Result<()> {
		match *self {}
	}

	fn new_label(&mut self) -> Label {
		match *self {}
	}

	fn visit_frame(&mut self, _frame: Frame) -> Result<()> {
		match *self {}
	}

	fn visit_instruction(&mut self, _instruction: Instruction) -> Result<()> {
		match *self {}
	}

	fn visit_label(&mut self, _label: Label) -> Result<()> {
		match *self {}
	}

	fn visit_insn_annotation(self, _type_reference: TypeReference, _type_path: TypePath, _descriptor: JavaString, _visible: bool)
			-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		match self {}
	}

	fn visit_try_catch_block(&mut self, _start: Label, _end: Label, _handler: Label, _catch_type: Option<JavaString>) -> Result<()> {
		match *self {}
	}

	fn visit_try_catch_annotation(self, _type_reference: TypeReference, _type_path: TypePath, _descriptor: JavaString, _visible: bool)
			-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		match self {}
	}

	fn visit_local_variable_annotation(self, _type_reference: TypeReference, _type_path: TypePath, _ranges: Vec<(Label, Label, u16)>, _descriptor: JavaString, _visible: bool)
			-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		match self {}
	}

	fn visit_maxs(&mut self, _max_stack: u16, _max_locals: u16) -> Result<()> {
		match *self {}
	}
}
