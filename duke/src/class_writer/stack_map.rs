//! Writing of the `StackMapTable` attribute.

use anyhow::{anyhow, bail, Context, Result};
use crate::{ClassError, ClassWrite};
use crate::class_constants::frame;
use crate::class_writer::assembler::Assembled;
use crate::class_writer::method::CodeBuffer;
use crate::class_writer::symbols::SymbolTable;
use crate::tree::frame::{Frame, VerificationType};

/// Picks the smallest frame shape describing `locals` and `stack` relative to the locals of the previous frame.
pub(crate) fn compress(previous: &[VerificationType], locals: &[VerificationType], stack: &[VerificationType]) -> Frame {
	match stack {
		[] if locals == previous => Frame::Same,
		[] if locals.len() < previous.len() && previous.len() - locals.len() <= 3 && previous.starts_with(locals) => {
			Frame::Chop((previous.len() - locals.len()) as u8)
		},
		[] if locals.len() > previous.len() && locals.len() - previous.len() <= 3 && locals.starts_with(previous) => {
			Frame::Append(locals[previous.len()..].to_vec())
		},
		[item] if locals == previous => Frame::SameLocals1StackItem(item.clone()),
		_ => Frame::Full { locals: locals.to_vec(), stack: stack.to_vec() },
	}
}

struct FrameWriter<'a> {
	symbols: &'a mut SymbolTable,
	code: &'a CodeBuffer,
	assembled: &'a Assembled,
}

impl FrameWriter<'_> {
	fn verification_type(&mut self, w: &mut Vec<u8>, verification_type: &VerificationType) -> Result<()> {
		match verification_type {
			VerificationType::Top => w.write_u8(frame::ITEM_TOP),
			VerificationType::Integer => w.write_u8(frame::ITEM_INTEGER),
			VerificationType::Float => w.write_u8(frame::ITEM_FLOAT),
			VerificationType::Double => w.write_u8(frame::ITEM_DOUBLE),
			VerificationType::Long => w.write_u8(frame::ITEM_LONG),
			VerificationType::Null => w.write_u8(frame::ITEM_NULL),
			VerificationType::UninitializedThis => w.write_u8(frame::ITEM_UNINITIALIZED_THIS),
			VerificationType::Object(class) => {
				w.write_u8(frame::ITEM_OBJECT)?;
				w.write_u16(self.symbols.put_class(class)?)
			},
			&VerificationType::Uninitialized(label) => {
				w.write_u8(frame::ITEM_UNINITIALIZED)?;
				w.write_u16(self.assembled.label_offset(self.code, label)?)
			},
		}
	}

	fn verification_types(&mut self, w: &mut Vec<u8>, verification_types: &[VerificationType]) -> Result<()> {
		for verification_type in verification_types {
			self.verification_type(w, verification_type)?;
		}
		Ok(())
	}

	fn frame(&mut self, w: &mut Vec<u8>, delta: u16, frame: &Frame) -> Result<()> {
		match frame {
			Frame::Same => {
				if delta <= frame::SAME_MAX as u16 {
					w.write_u8(delta as u8)
				} else {
					w.write_u8(frame::SAME_EXTENDED)?;
					w.write_u16(delta)
				}
			},
			Frame::SameLocals1StackItem(item) => {
				if delta <= (frame::SAME_LOCALS_1_STACK_ITEM_MAX - frame::SAME_LOCALS_1_STACK_ITEM) as u16 {
					w.write_u8(frame::SAME_LOCALS_1_STACK_ITEM + delta as u8)?;
				} else {
					w.write_u8(frame::SAME_LOCALS_1_STACK_ITEM_EXTENDED)?;
					w.write_u16(delta)?;
				}
				self.verification_type(w, item)
			},
			&Frame::Chop(k) => {
				if !(1..=3).contains(&k) {
					bail!("chop frames remove 1 to 3 locals, got {k}");
				}
				w.write_u8(frame::SAME_EXTENDED - k)?;
				w.write_u16(delta)
			},
			Frame::Append(locals) => {
				if !(1..=3).contains(&locals.len()) {
					bail!("append frames add 1 to 3 locals, got {}", locals.len());
				}
				w.write_u8(frame::SAME_EXTENDED + locals.len() as u8)?;
				w.write_u16(delta)?;
				self.verification_types(w, locals)
			},
			Frame::Full { locals, stack } | Frame::Expanded { locals, stack } => {
				w.write_u8(frame::FULL)?;
				w.write_u16(delta)?;
				w.write_usize_as_u16(locals.len()).with_context(|| anyhow!("too many locals in frame"))?;
				self.verification_types(w, locals)?;
				w.write_usize_as_u16(stack.len()).with_context(|| anyhow!("too many stack entries in frame"))?;
				self.verification_types(w, stack)
			},
		}
	}
}

/// Writes the content of the `StackMapTable` attribute.
///
/// `frames` are by instruction index. They're either all [`Frame::Expanded`], which get compressed against each
/// other starting with `initial_locals`, or all compressed, which are written as they are.
pub(crate) fn write_stack_map_table(
	w: &mut Vec<u8>,
	symbols: &mut SymbolTable,
	code: &CodeBuffer,
	assembled: &Assembled,
	frames: &[(usize, Frame)],
	initial_locals: &[VerificationType],
) -> Result<()> {
	let expanded = frames.first().is_some_and(|(_, frame)| matches!(frame, Frame::Expanded { .. }));

	let mut writer = FrameWriter { symbols, code, assembled };
	let mut previous_locals = initial_locals.to_vec();
	let mut previous_offset: Option<u16> = None;

	w.write_usize_as_u16(frames.len()).with_context(|| anyhow!("too many frames"))?;
	for (index, frame) in frames {
		if matches!(frame, Frame::Expanded { .. }) != expanded {
			bail!(ClassError::FrameInconsistent {
				instruction: *index,
				reason: "expanded and compressed frames are mixed".to_owned(),
			});
		}

		let offset = assembled.offset(*index)?;
		let delta = match previous_offset {
			None => offset,
			Some(previous) if offset > previous => offset - previous - 1,
			Some(_) => bail!(ClassError::FrameInconsistent {
				instruction: *index,
				reason: "frames must be at increasing offsets, one per instruction".to_owned(),
			}),
		};
		previous_offset = Some(offset);

		if let Frame::Expanded { locals, stack } = frame {
			let compressed = compress(&previous_locals, locals, stack);
			writer.frame(w, delta, &compressed)?;
			previous_locals.clone_from(locals);
		} else {
			writer.frame(w, delta, frame)?;
		}
	}
	Ok(())
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::ClassError;
	use crate::class_writer::assembler::assemble;
	use crate::class_writer::method::CodeBuffer;
	use crate::class_writer::stack_map::{compress, write_stack_map_table};
	use crate::class_writer::symbols::SymbolTable;
	use crate::tree::code::Instruction;
	use crate::tree::frame::{Frame, VerificationType};

	#[test]
	fn compression() {
		use VerificationType::*;
		assert_eq!(compress(&[Integer], &[Integer], &[]), Frame::Same);
		assert_eq!(compress(&[Integer, Long, Float], &[Integer], &[]), Frame::Chop(2));
		assert_eq!(compress(&[Integer], &[Integer, Double], &[]), Frame::Append(vec![Double]));
		assert_eq!(compress(&[Integer], &[Integer], &[Null]), Frame::SameLocals1StackItem(Null));
		assert_eq!(compress(&[Integer], &[Float], &[]), Frame::Full { locals: vec![Float], stack: vec![] });
		assert_eq!(
			compress(&[], &[Integer, Integer, Integer, Integer], &[]),
			Frame::Full { locals: vec![Integer, Integer, Integer, Integer], stack: vec![] }
		);
		assert_eq!(
			compress(&[Integer], &[Integer], &[Integer, Integer]),
			Frame::Full { locals: vec![Integer], stack: vec![Integer, Integer] }
		);
	}

	fn nops(n: usize) -> CodeBuffer {
		let mut code = CodeBuffer::default();
		code.instructions = vec![Instruction::Nop; n];
		code
	}

	#[test]
	fn offset_deltas() -> Result<()> {
		let code = nops(100);
		let mut symbols = SymbolTable::new();
		let assembled = assemble(&code, &mut symbols, true)?;
		let frames = vec![
			(3, Frame::Expanded { locals: vec![VerificationType::Integer], stack: vec![] }),
			(4, Frame::Expanded { locals: vec![VerificationType::Integer], stack: vec![VerificationType::Integer] }),
			(90, Frame::Expanded { locals: vec![], stack: vec![] }),
		];

		let mut w = Vec::new();
		write_stack_map_table(&mut w, &mut symbols, &code, &assembled, &frames, &[VerificationType::Integer])?;
		assert_eq!(w, vec![
			0x00, 0x03,
			3,
			64, 1,
			250, 0x00, 85,
		]);
		Ok(())
	}

	#[test]
	fn mixed_frames() -> Result<()> {
		let code = nops(10);
		let mut symbols = SymbolTable::new();
		let assembled = assemble(&code, &mut symbols, true)?;

		let frames = vec![(1, Frame::Same), (2, Frame::Expanded { locals: vec![], stack: vec![] })];
		let error = write_stack_map_table(&mut Vec::new(), &mut symbols, &code, &assembled, &frames, &[]).unwrap_err();
		assert!(matches!(ClassError::find(&error), Some(ClassError::FrameInconsistent { instruction: 2, .. })));

		let frames = vec![(2, Frame::Same), (2, Frame::Same)];
		let error = write_stack_map_table(&mut Vec::new(), &mut symbols, &code, &assembled, &frames, &[]).unwrap_err();
		assert!(matches!(ClassError::find(&error), Some(ClassError::FrameInconsistent { instruction: 2, .. })));
		Ok(())
	}
}
