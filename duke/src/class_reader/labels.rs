use anyhow::{bail, Result};
use crate::ClassError;
use crate::tree::code::Label;

/// Maps bytecode offsets of the method being read to [`Label`]s.
///
/// The length of the code is a valid offset too, for the ends of ranges.
pub(crate) struct Labels {
	labels: Vec<Option<Label>>,
}

impl Labels {
	pub(crate) fn new(code_length: usize) -> Labels {
		Labels {
			labels: vec![None; code_length + 1],
		}
	}

	/// Returns the label at `offset`, creating it with `new_label` if there's none yet.
	pub(crate) fn get_or_create(&mut self, offset: i64, new_label: impl FnOnce() -> Label) -> Result<Label> {
		let Some(slot) = usize::try_from(offset).ok().and_then(|offset| self.labels.get_mut(offset)) else {
			bail!(ClassError::BadLabelOffset { offset });
		};
		Ok(*slot.get_or_insert_with(new_label))
	}

	/// Returns the label for the range from `start` spanning `length` bytes.
	pub(crate) fn range(&mut self, start: u16, length: u16, mut new_label: impl FnMut() -> Label) -> Result<(Label, Label)> {
		let start_label = self.get_or_create(start as i64, &mut new_label)?;
		let end_label = self.get_or_create(start as i64 + length as i64, &mut new_label)?;
		Ok((start_label, end_label))
	}

	pub(crate) fn get(&self, offset: usize) -> Option<Label> {
		self.labels.get(offset).copied().flatten()
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::ClassError;
	use crate::class_reader::labels::Labels;
	use crate::tree::code::LabelGenerator;

	#[test]
	fn labels_are_shared() -> Result<()> {
		let mut generator = LabelGenerator::default();
		let mut labels = Labels::new(10);

		let a = labels.get_or_create(3, || generator.next_label())?;
		let b = labels.get_or_create(3, || generator.next_label())?;
		assert_eq!(a, b);
		assert_eq!(generator.len(), 1);

		let (start, end) = labels.range(3, 7, || generator.next_label())?;
		assert_eq!(start, a);
		assert_eq!(labels.get(10), Some(end));
		assert_eq!(labels.get(4), None);
		Ok(())
	}

	#[test]
	fn out_of_bounds() {
		let mut generator = LabelGenerator::default();
		let mut labels = Labels::new(10);

		let error = labels.get_or_create(11, || generator.next_label()).unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::BadLabelOffset { offset: 11 }));
		let error = labels.get_or_create(-1, || generator.next_label()).unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::BadLabelOffset { offset: -1 }));
	}
}
