use std::ops::ControlFlow;
use anyhow::{bail, Result};
use pretty_assertions::assert_eq;
use duke::{ClassError, ClassReader, ClassWriter, Compute, ReadFlags};
use duke::tree::access::ACC_STATIC;
use duke::tree::code::{Instruction, Label};
use duke::tree::version::Version;
use duke::visitor::Api;
use duke::visitor::class::ClassVisitor;
use duke::visitor::method::MethodVisitor;

mod common;
use common::Recorder;

fn kind(result: Result<impl Sized>) -> Option<ClassError> {
	match result {
		Ok(_) => None,
		Err(error) => ClassError::find(&error).cloned(),
	}
}

#[test]
fn nest_host_needs_asm7() -> Result<()> {
	let mut writer = ClassWriter::new(Compute::Nothing);
	writer.visit(common::header("Inner", Version::V1_8))?;
	writer.visit_nest_host("Outer".into())?;
	writer.visit_end()?;
	let bytes = writer.to_bytes()?;

	let reader = ClassReader::new(&bytes)?;
	assert_eq!(
		kind(reader.accept(Recorder::with_api(Api::Asm6), ReadFlags::empty())),
		Some(ClassError::UnsupportedApi { construct: "NestHost", min_version: Api::Asm7 })
	);

	let recorder = reader.accept(Recorder::with_api(Api::Asm7), ReadFlags::empty())?;
	assert!(recorder.events.contains(&"nest host Outer".to_owned()));
	Ok(())
}

#[test]
fn unknown_constant_pool_tag() -> Result<()> {
	let mut bytes = common::answer_class()?;
	// 10 bytes of header, then #1 "Answer" (1 + 2 + 6), #2 class (1 + 2), #3 "java/lang/Object" (1 + 2 + 16),
	// #4 class (1 + 2)
	let at = 10 + 9 + 3 + 19 + 3;
	bytes[at] = 99;
	assert_eq!(kind(ClassReader::new(&bytes)), Some(ClassError::BadConstantPoolTag { tag: 99, at }));
	Ok(())
}

#[test]
fn bad_magic() -> Result<()> {
	let mut bytes = common::answer_class()?;
	bytes[1] = 0x00;
	assert_eq!(kind(ClassReader::new(&bytes)), Some(ClassError::BadMagic { found: 0xca00babe }));
	Ok(())
}

#[test]
fn truncated_class() -> Result<()> {
	let bytes = common::answer_class()?;
	for length in [0, 9, 30, bytes.len() - 1] {
		let kind = kind(ClassReader::new(&bytes[..length]).and_then(|reader| reader.accept(Recorder::default(), ReadFlags::empty())));
		assert!(matches!(kind, Some(ClassError::Truncated { .. })), "{length} bytes gave {kind:?}");
	}
	Ok(())
}

#[test]
fn instruction_before_visit_code() -> Result<()> {
	let mut writer = ClassWriter::new(Compute::Nothing);
	writer.visit(common::header("Foo", Version::V1_8))?;
	let ControlFlow::Continue((_, mut method)) = writer.visit_method(0, "f".into(), "()V".into(), None, Vec::new())? else {
		bail!("method was refused");
	};
	assert_eq!(
		kind(method.visit_instruction(Instruction::Return)),
		Some(ClassError::IllegalState { expected: "visit_code", got: "visit_instruction" })
	);
	Ok(())
}

/// `static void f() { nop; return; }` with a try catch block over the labels `range` picks from the one before
/// `nop` and the one before `return`.
fn guarded(range: fn(Label, Label) -> (Label, Label)) -> Result<Vec<u8>> {
	let mut writer = ClassWriter::new(Compute::Nothing);
	writer.visit(common::header("Guarded", Version::V1_8))?;
	let mut writer = common::method(writer, ACC_STATIC, "f", "()V", (1, 0), |m| {
		let nop = m.new_label();
		let ret = m.new_label();
		let (start, end) = range(nop, ret);
		m.visit_label(nop)?;
		m.visit_instruction(Instruction::Nop)?;
		m.visit_label(ret)?;
		m.visit_instruction(Instruction::Return)?;
		m.visit_try_catch_block(start, end, ret, None)
	})?;
	writer.visit_end()?;
	writer.to_bytes()
}

#[test]
fn try_catch_ranges_must_cover_code() -> Result<()> {
	let empty = ClassError::BadExceptionHandler { index: 0, reason: "its range covers no instruction" };
	assert_eq!(kind(guarded(|nop, _| (nop, nop))), Some(empty.clone()));
	assert_eq!(kind(guarded(|nop, ret| (ret, nop))), Some(empty));

	let bytes = guarded(|nop, ret| (nop, ret))?;
	let events = common::dump(&bytes, ReadFlags::empty())?.events;
	assert!(events.iter().any(|event| event.starts_with("try ")), "{events:?}");
	Ok(())
}

#[test]
fn writing_unfinished_class() -> Result<()> {
	let mut writer = ClassWriter::new(Compute::Nothing);
	writer.visit(common::header("Foo", Version::V1_8))?;
	assert_eq!(kind(writer.to_bytes()), Some(ClassError::IllegalState { expected: "visit_end", got: "to_bytes" }));
	Ok(())
}
