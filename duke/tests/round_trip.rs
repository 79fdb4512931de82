use std::ops::ControlFlow;
use anyhow::{bail, Result};
use pretty_assertions::assert_eq;
use duke::{ClassReader, ClassWriter, Compute, ReadFlags};
use duke::class_writer::FieldWriter;
use duke::tree::access::{ACC_DEPRECATED, ACC_FINAL, ACC_PRIVATE, ACC_STATIC};
use duke::tree::annotation::ElementValue;
use duke::tree::attribute::Attribute;
use duke::tree::class::{ConstantValue, InnerClass};
use duke::tree::code::{FieldRef, Instruction, LocalVariable};
use duke::tree::version::Version;
use duke::visitor::annotation::AnnotationVisitor;
use duke::visitor::class::ClassVisitor;
use duke::visitor::field::FieldVisitor;
use duke::visitor::method::MethodVisitor;
use duke::visitor::pass_through::PassThrough;

mod common;

fn copy(bytes: &[u8], compute: Compute, flags: ReadFlags) -> Result<Vec<u8>> {
	let reader = ClassReader::new(bytes)?;
	reader.accept(ClassWriter::from_reader(&reader, compute)?, flags)?.to_bytes()
}

/// A class with a bit of everything: a constant, an annotated field, a loop with a local variable, and an inner
/// class.
fn rich_class() -> Result<Vec<u8>> {
	let mut writer = ClassWriter::new(Compute::Frames);
	writer.visit(common::header("Rich", Version::V1_8))?;
	writer.visit_source(Some("Rich.java".into()), None)?;
	writer.visit_inner_class(InnerClass { name: "Rich$Inner".into(), outer_name: Some("Rich".into()), inner_name: Some("Inner".into()), access: 0x8 })?;

	let ControlFlow::Continue((residual, mut field)) = writer.visit_field(ACC_STATIC | ACC_FINAL, "LIMIT".into(), "I".into(), None, Some(ConstantValue::Integer(100_000)))? else {
		bail!("field refused");
	};
	field.visit_end()?;
	writer = ClassWriter::finish_field(residual, field)?;

	let ControlFlow::Continue((residual, field)) = writer.visit_field(ACC_PRIVATE | ACC_DEPRECATED, "name".into(), "Ljava/lang/String;".into(), None, None)? else {
		bail!("field refused");
	};
	let ControlFlow::Continue((annotation_residual, mut annotation)) = field.visit_annotation("LMarker;".into(), true)? else {
		bail!("annotation refused");
	};
	annotation.visit_value(Some("value".into()), ElementValue::String("x".into()))?;
	let mut field = FieldWriter::finish_annotation(annotation_residual, annotation)?;
	field.visit_end()?;
	writer = ClassWriter::finish_field(residual, field)?;

	let mut writer = common::method(writer, ACC_STATIC, "sum", "(I)I", (0, 0), |m| {
		let start = m.new_label();
		let head = m.new_label();
		let end = m.new_label();
		m.visit_instruction(Instruction::IConst0)?;
		m.visit_instruction(Instruction::IStore(1))?;
		m.visit_label(start)?;
		m.visit_label(head)?;
		m.visit_instruction(Instruction::ILoad(0))?;
		m.visit_instruction(Instruction::IfLe(end))?;
		m.visit_instruction(Instruction::ILoad(1))?;
		m.visit_instruction(Instruction::GetStatic(FieldRef { class: "Rich".into(), name: "LIMIT".into(), descriptor: "I".into() }))?;
		m.visit_instruction(Instruction::IAdd)?;
		m.visit_instruction(Instruction::IStore(1))?;
		m.visit_instruction(Instruction::IInc(0, -1))?;
		m.visit_instruction(Instruction::Goto(head))?;
		m.visit_label(end)?;
		m.visit_instruction(Instruction::ILoad(1))?;
		m.visit_instruction(Instruction::IReturn)?;
		m.visit_local_variable(LocalVariable { name: "total".into(), descriptor: "I".into(), signature: None, start, end, index: 1 })
	})?;
	writer.visit_end()?;
	writer.to_bytes()
}

#[test]
fn answer_is_copied_unchanged() -> Result<()> {
	let bytes = common::answer_class()?;
	assert_eq!(copy(&bytes, Compute::Nothing, ReadFlags::empty())?, bytes);
	Ok(())
}

#[test]
fn rich_class_is_copied_unchanged() -> Result<()> {
	let bytes = rich_class()?;
	assert_eq!(copy(&bytes, Compute::Nothing, ReadFlags::empty())?, bytes);
	Ok(())
}

#[test]
fn rebuilt_members_are_the_same() -> Result<()> {
	let bytes = rich_class()?;
	let reader = ClassReader::new(&bytes)?;
	let writer = reader.accept(PassThrough::reemitting(ClassWriter::from_reader(&reader, Compute::Nothing)?), ReadFlags::empty())?;
	assert_eq!(writer.into_inner().to_bytes()?, bytes);
	Ok(())
}

#[test]
fn adapter_is_transparent() -> Result<()> {
	let bytes = rich_class()?;
	let reader = ClassReader::new(&bytes)?;
	let writer = reader.accept(PassThrough::reemitting(ClassWriter::new(Compute::Nothing)), ReadFlags::empty())?;
	let rewritten = writer.into_inner().to_bytes()?;

	assert_eq!(
		common::dump(&rewritten, ReadFlags::empty())?.events,
		common::dump(&bytes, ReadFlags::empty())?.events
	);
	Ok(())
}

#[test]
fn recomputing_is_stable() -> Result<()> {
	let bytes = rich_class()?;
	assert_eq!(copy(&bytes, Compute::Frames, ReadFlags::empty())?, bytes);
	assert_eq!(copy(&bytes, Compute::Maxs, ReadFlags::empty())?, bytes);
	Ok(())
}

#[test]
fn expanded_frames_compress_back() -> Result<()> {
	let bytes = rich_class()?;
	assert_eq!(copy(&bytes, Compute::Nothing, ReadFlags::EXPAND_FRAMES)?, bytes);

	let compressed = common::dump(&bytes, ReadFlags::empty())?;
	let expanded = common::dump(&bytes, ReadFlags::EXPAND_FRAMES)?;
	assert_eq!(compressed.frames.len(), expanded.frames.len());
	Ok(())
}

#[test]
fn skipping_debug_information() -> Result<()> {
	let bytes = rich_class()?;
	let without = copy(&bytes, Compute::Nothing, ReadFlags::SKIP_DEBUG)?;
	assert!(without.len() < bytes.len());

	let events = common::dump(&without, ReadFlags::empty())?.events;
	assert!(!events.iter().any(|event| event.starts_with("source") || event.starts_with("local variable")));
	Ok(())
}

/// `Answer.f` again, with an attribute in its code that nothing interprets.
fn vendor_class() -> Result<Vec<u8>> {
	let mut writer = ClassWriter::new(Compute::Nothing);
	writer.visit(common::header("Vendor", Version::V1_8))?;
	let mut writer = common::method(writer, ACC_STATIC, "f", "()I", (1, 0), |m| {
		m.visit_instruction(Instruction::BiPush(42))?;
		m.visit_instruction(Instruction::IReturn)?;
		m.visit_code_attribute(Attribute { name: "org.example.Profile".into(), content: vec![0, 1, 0xca, 0xfe] })
	})?;
	writer.visit_end()?;
	writer.to_bytes()
}

#[test]
fn unknown_code_attributes_are_kept() -> Result<()> {
	let bytes = vendor_class()?;
	let events = common::dump(&bytes, ReadFlags::empty())?.events;
	let position = |prefix: &str| events.iter().position(|event| event.starts_with(prefix));
	let attribute = position("code attribute").ok_or_else(|| anyhow::anyhow!("no code attribute in {events:?}"))?;
	assert!(events[attribute].contains("org.example.Profile"));
	assert!(position("IReturn") < Some(attribute));
	assert!(Some(attribute) < position("maxs"));

	assert_eq!(copy(&bytes, Compute::Nothing, ReadFlags::empty())?, bytes);
	assert_eq!(copy(&bytes, Compute::Frames, ReadFlags::empty())?, bytes);

	let reader = ClassReader::new(&bytes)?;
	let writer = reader.accept(PassThrough::reemitting(ClassWriter::new(Compute::Maxs)), ReadFlags::empty())?;
	assert_eq!(common::dump(&writer.into_inner().to_bytes()?, ReadFlags::empty())?.events, events);
	Ok(())
}
