use anyhow::Result;
use pretty_assertions::assert_eq;
use duke::{ClassError, ClassReader, ClassWriter, Compute, ReadFlags};
use duke::tree::access::ACC_STATIC;
use duke::tree::code::Instruction;
use duke::tree::frame::Frame;
use duke::tree::version::Version;
use duke::visitor::class::ClassVisitor;
use duke::visitor::method::MethodVisitor;

mod common;

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	haystack.windows(needle.len()).position(|window| window == needle)
}

fn long_goto(writer: ClassWriter) -> Result<ClassWriter> {
	common::method(writer, ACC_STATIC, "g", "()V", (0, 0), |m| {
		let target = m.new_label();
		m.visit_instruction(Instruction::Goto(target))?;
		for _ in 0..40_001 {
			m.visit_instruction(Instruction::Nop)?;
		}
		m.visit_label(target)?;
		m.visit_instruction(Instruction::Return)
	})
}

fn long_conditional(writer: ClassWriter) -> Result<ClassWriter> {
	common::method(writer, ACC_STATIC, "h", "(I)V", (1, 1), |m| {
		let target = m.new_label();
		m.visit_instruction(Instruction::ILoad(0))?;
		m.visit_instruction(Instruction::IfEq(target))?;
		for _ in 0..40_000 {
			m.visit_instruction(Instruction::Nop)?;
		}
		m.visit_label(target)?;
		m.visit_instruction(Instruction::Return)
	})
}

#[test]
fn goto_becomes_goto_w() -> Result<()> {
	let mut writer = ClassWriter::new(Compute::Nothing);
	writer.visit(common::header("Far", Version::V1_8))?;
	let mut writer = long_goto(writer)?;
	writer.visit_end()?;
	let bytes = writer.to_bytes()?;

	// code_length 40007, then goto_w with offset 40006
	assert!(find(&bytes, &[0x00, 0x00, 0x9c, 0x47, 0xc8, 0x00, 0x00, 0x9c, 0x46, 0x00]).is_some());

	let events = common::dump(&bytes, ReadFlags::empty())?.events;
	assert!(events.iter().any(|event| event.starts_with("Goto(")));
	Ok(())
}

#[test]
fn conditional_jumps_over_goto_w() -> Result<()> {
	let mut writer = ClassWriter::new(Compute::Nothing);
	writer.visit(common::header("Far", Version::V1_5))?;
	let mut writer = long_conditional(writer)?;
	writer.visit_end()?;
	let bytes = writer.to_bytes()?;

	// iload_0, ifne +8, goto_w +40005
	assert!(find(&bytes, &[0x1a, 0x9a, 0x00, 0x08, 0xc8, 0x00, 0x00, 0x9c, 0x45]).is_some());
	ClassReader::new(&bytes)?;
	Ok(())
}

#[test]
fn widened_conditional_gets_a_frame() -> Result<()> {
	let mut writer = ClassWriter::new(Compute::Frames);
	writer.visit(common::header("Far", Version::V1_8))?;
	let mut writer = long_conditional(writer)?;
	writer.visit_end()?;
	let bytes = writer.to_bytes()?;

	// one frame after the goto_w, one at the target
	let recorder = common::dump(&bytes, ReadFlags::empty())?;
	assert_eq!(recorder.frames, vec![Frame::Same, Frame::Same]);
	Ok(())
}

#[test]
fn widening_disabled() -> Result<()> {
	let mut writer = ClassWriter::new(Compute::Nothing).with_branch_widening(false);
	writer.visit(common::header("Far", Version::V1_8))?;
	let Err(error) = long_goto(writer) else {
		panic!("a jump too far was written without widening");
	};
	assert_eq!(ClassError::find(&error), Some(&ClassError::BranchOverflow { instruction: 0 }));
	Ok(())
}
