use anyhow::{anyhow, bail, Context, Result};
use crate::{ByteReader, ClassError, ClassRead};
use crate::class_constants::frame;
use crate::class_reader::labels::Labels;
use crate::class_reader::pool::PoolRead;
use crate::tree::code::Label;
use crate::tree::frame::{Frame, VerificationType};

fn read_verification_type(
	r: &mut ByteReader,
	pool: &PoolRead,
	labels: &mut Labels,
	new_label: &mut impl FnMut() -> Label,
) -> Result<VerificationType> {
	let at = r.position();
	Ok(match r.read_u8()? {
		frame::ITEM_TOP => VerificationType::Top,
		frame::ITEM_INTEGER => VerificationType::Integer,
		frame::ITEM_FLOAT => VerificationType::Float,
		frame::ITEM_DOUBLE => VerificationType::Double,
		frame::ITEM_LONG => VerificationType::Long,
		frame::ITEM_NULL => VerificationType::Null,
		frame::ITEM_UNINITIALIZED_THIS => VerificationType::UninitializedThis,
		frame::ITEM_OBJECT => VerificationType::Object(pool.class_owned(r.read_u16()?)?),
		frame::ITEM_UNINITIALIZED => {
			let offset = r.read_u16()?;
			VerificationType::Uninitialized(labels.get_or_create(offset as i64, &mut *new_label)?)
		},
		tag => bail!(ClassError::Malformed { what: "verification type", tag, at }),
	})
}

fn read_verification_types(
	r: &mut ByteReader,
	pool: &PoolRead,
	labels: &mut Labels,
	new_label: &mut impl FnMut() -> Label,
	count: usize,
) -> Result<Vec<VerificationType>> {
	let mut types = Vec::with_capacity(count);
	for _ in 0..count {
		types.push(read_verification_type(r, pool, labels, new_label)?);
	}
	Ok(types)
}

/// Reads the entries of a `StackMapTable` attribute, returning the bytecode offset of each frame with it.
pub(crate) fn read_stack_map_table(
	r: &mut ByteReader,
	pool: &PoolRead,
	labels: &mut Labels,
	new_label: &mut impl FnMut() -> Label,
) -> Result<Vec<(usize, Frame)>> {
	let count = r.read_u16()?;
	let mut frames = Vec::with_capacity(count as usize);

	let mut previous: Option<usize> = None;
	for _ in 0..count {
		let at = r.position();
		let frame_type = r.read_u8()?;
		let (offset_delta, frame) = match frame_type {
			0..=frame::SAME_MAX => (frame_type as usize, Frame::Same),
			frame::SAME_LOCALS_1_STACK_ITEM..=frame::SAME_LOCALS_1_STACK_ITEM_MAX => {
				let stack = read_verification_type(r, pool, labels, new_label)?;
				((frame_type - frame::SAME_LOCALS_1_STACK_ITEM) as usize, Frame::SameLocals1StackItem(stack))
			},
			frame::SAME_LOCALS_1_STACK_ITEM_EXTENDED => {
				let offset_delta = r.read_u16_as_usize()?;
				let stack = read_verification_type(r, pool, labels, new_label)?;
				(offset_delta, Frame::SameLocals1StackItem(stack))
			},
			frame::CHOP_MIN..frame::SAME_EXTENDED => {
				(r.read_u16_as_usize()?, Frame::Chop(frame::SAME_EXTENDED - frame_type))
			},
			frame::SAME_EXTENDED => (r.read_u16_as_usize()?, Frame::Same),
			252..=frame::APPEND_MAX => {
				let offset_delta = r.read_u16_as_usize()?;
				let count = (frame_type - frame::SAME_EXTENDED) as usize;
				(offset_delta, Frame::Append(read_verification_types(r, pool, labels, new_label, count)?))
			},
			frame::FULL => {
				let offset_delta = r.read_u16_as_usize()?;
				let locals_count = r.read_u16_as_usize()?;
				let locals = read_verification_types(r, pool, labels, new_label, locals_count)?;
				let stack_count = r.read_u16_as_usize()?;
				let stack = read_verification_types(r, pool, labels, new_label, stack_count)?;
				(offset_delta, Frame::Full { locals, stack })
			},
			tag => bail!(ClassError::Malformed { what: "stack map frame", tag, at }),
		};

		let offset = match previous {
			None => offset_delta,
			Some(previous) => previous + offset_delta + 1,
		};
		previous = Some(offset);
		frames.push((offset, frame));
	}
	Ok(frames)
}

/// Turns the compressed frames of a method into [`Frame::Expanded`] ones, starting with the implicit frame
/// `initial_locals`.
pub(crate) fn expand_frames(initial_locals: Vec<VerificationType>, frames: Vec<(usize, Frame)>) -> Result<Vec<(usize, Frame)>> {
	let mut locals = initial_locals;
	let mut expanded = Vec::with_capacity(frames.len());

	for (offset, frame) in frames {
		let stack = match frame {
			Frame::Same => Vec::new(),
			Frame::SameLocals1StackItem(stack) => vec![stack],
			Frame::Chop(k) => {
				let k = k as usize;
				if k > locals.len() {
					bail!(ClassError::FrameInconsistent {
						instruction: offset,
						reason: format!("cannot chop {k} locals off a frame with {} locals", locals.len()),
					});
				}
				locals.truncate(locals.len() - k);
				Vec::new()
			},
			Frame::Append(appended) => {
				locals.extend(appended);
				Vec::new()
			},
			Frame::Full { locals: full_locals, stack } => {
				locals = full_locals;
				stack
			},
			Frame::Expanded { locals: expanded_locals, stack } => {
				locals = expanded_locals;
				stack
			},
		};
		expanded.push((offset, Frame::Expanded { locals: locals.clone(), stack }));
	}

	Ok(expanded)
}

/// Reads a `StackMapTable`, expanding the frames against `expand` if given.
pub(crate) fn read_frames(
	r: &mut ByteReader,
	pool: &PoolRead,
	labels: &mut Labels,
	new_label: &mut impl FnMut() -> Label,
	expand: Option<Vec<VerificationType>>,
) -> Result<Vec<(usize, Frame)>> {
	let frames = read_stack_map_table(r, pool, labels, new_label)
		.with_context(|| anyhow!("failed to read stack map table"))?;
	match expand {
		Some(initial_locals) => expand_frames(initial_locals, frames),
		None => Ok(frames),
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::{ByteReader, ClassError};
	use crate::class_reader::frames::{expand_frames, read_stack_map_table};
	use crate::class_reader::labels::Labels;
	use crate::class_reader::pool::PoolRead;
	use crate::tree::code::LabelGenerator;
	use crate::tree::frame::{Frame, VerificationType};

	fn empty_pool(bytes: &[u8]) -> Result<PoolRead<'_>> {
		let mut reader = ByteReader::new(bytes);
		PoolRead::scan(bytes, &mut reader)
	}

	#[test]
	fn offsets() -> Result<()> {
		let pool_bytes = [0x00, 0x01];
		let pool = empty_pool(&pool_bytes)?;
		let mut generator = LabelGenerator::default();
		let mut labels = Labels::new(100);

		let bytes = [
			0x00, 0x04,
			3,
			64 + 2, 1,
			252, 0x00, 0x05, 4,
			249, 0x00, 0x10,
		];
		let frames = read_stack_map_table(&mut ByteReader::new(&bytes), &pool, &mut labels, &mut || generator.next_label())?;
		assert_eq!(frames, vec![
			(3, Frame::Same),
			(6, Frame::SameLocals1StackItem(VerificationType::Integer)),
			(12, Frame::Append(vec![VerificationType::Long])),
			(29, Frame::Chop(2)),
		]);
		Ok(())
	}

	#[test]
	fn reserved_frame_type() -> Result<()> {
		let pool_bytes = [0x00, 0x01];
		let pool = empty_pool(&pool_bytes)?;
		let mut generator = LabelGenerator::default();
		let mut labels = Labels::new(100);

		let bytes = [0x00, 0x01, 200];
		let error = read_stack_map_table(&mut ByteReader::new(&bytes), &pool, &mut labels, &mut || generator.next_label()).unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::Malformed { what: "stack map frame", tag: 200, at: 2 }));
		Ok(())
	}

	#[test]
	fn expand() -> Result<()> {
		let initial = vec![VerificationType::Object("Foo".into())];
		let frames = vec![
			(3, Frame::Append(vec![VerificationType::Integer, VerificationType::Long])),
			(6, Frame::SameLocals1StackItem(VerificationType::Null)),
			(9, Frame::Chop(1)),
		];
		assert_eq!(expand_frames(initial, frames)?, vec![
			(3, Frame::Expanded {
				locals: vec![VerificationType::Object("Foo".into()), VerificationType::Integer, VerificationType::Long],
				stack: vec![],
			}),
			(6, Frame::Expanded {
				locals: vec![VerificationType::Object("Foo".into()), VerificationType::Integer, VerificationType::Long],
				stack: vec![VerificationType::Null],
			}),
			(9, Frame::Expanded {
				locals: vec![VerificationType::Object("Foo".into()), VerificationType::Integer],
				stack: vec![],
			}),
		]);

		let error = expand_frames(vec![], vec![(0, Frame::Chop(1))]).unwrap_err();
		assert!(matches!(ClassError::find(&error), Some(ClassError::FrameInconsistent { instruction: 0, .. })));
		Ok(())
	}
}
