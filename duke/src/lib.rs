//! A crate for reading, transforming and writing [Java Class Files](https://docs.oracle.com/javase/specs/jvms/se9/html/jvms-4.html)
//! as a stream of visitor events.
//!
//! The three parts are the [`ClassReader`], which walks the bytes of a class file and calls the methods of a
//! [`ClassVisitor`][visitor::class::ClassVisitor], any number of adapters in between, and the [`ClassWriter`], which
//! turns the events back into bytes.
//!
//! ```
//! # use anyhow::Result;
//! # fn main() -> Result<()> {
//! # let bytes = {
//! #     use duke::tree::access::{ACC_PUBLIC, ACC_SUPER};
//! #     use duke::tree::class::ClassHeader;
//! #     use duke::tree::version::Version;
//! #     use duke::visitor::class::ClassVisitor;
//! #     let mut writer = duke::ClassWriter::new(duke::Compute::Nothing);
//! #     writer.visit(ClassHeader {
//! #         version: Version::V1_8,
//! #         access: ACC_PUBLIC | ACC_SUPER,
//! #         name: "Foo".into(),
//! #         signature: None,
//! #         super_class: Some("java/lang/Object".into()),
//! #         interfaces: Vec::new(),
//! #     })?;
//! #     writer.visit_end()?;
//! #     writer.to_bytes()?
//! # };
//! use duke::{ClassReader, ClassWriter, Compute, ReadFlags};
//!
//! let reader = ClassReader::new(&bytes)?;
//! let writer = reader.accept(ClassWriter::from_reader(&reader, Compute::Nothing)?, ReadFlags::empty())?;
//! assert_eq!(writer.to_bytes()?, bytes);
//! # Ok(())
//! # }
//! ```

pub mod tree;
pub mod visitor;
pub mod class_reader;
pub mod class_writer;

mod class_constants;
mod error;
mod jstring;

use anyhow::{anyhow, bail, Context, Result};

pub use crate::class_reader::{ClassReader, ReadFlags};
pub use crate::class_writer::{ClassWriter, Compute};
pub use crate::class_writer::hierarchy::{ClassHierarchy, ObjectHierarchy, SuperClasses};
pub use crate::error::ClassError;
pub use crate::visitor::Api;

/// Big endian reading of the primitives a class file is made of.
///
/// Reading past the end of the data fails with [`ClassError::Truncated`].
pub trait ClassRead {
	/// The current position, as an offset from the start of the data.
	fn position(&self) -> usize;
	/// Moves to the absolute position `pos`.
	fn goto(&mut self, pos: usize) -> Result<()>;
	fn skip(&mut self, n: usize) -> Result<()> {
		let pos = self.position().checked_add(n)
			.ok_or_else(|| anyhow!(ClassError::Truncated { at_offset: self.position() }))?;
		self.goto(pos)
	}
	/// Runs `f` at position `pos`, restoring the current position afterwards.
	fn with_pos<T>(&mut self, pos: usize, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
		let marker = self.position();
		self.goto(pos)?;
		let r = f(self)?;
		self.goto(marker)?;
		Ok(r)
	}

	fn read_n<const N: usize>(&mut self) -> Result<[u8; N]>;
	fn read_u8(&mut self) -> Result<u8> {
		Ok(u8::from_be_bytes(self.read_n()?))
	}
	fn read_u16(&mut self) -> Result<u16> {
		Ok(u16::from_be_bytes(self.read_n()?))
	}
	fn read_u32(&mut self) -> Result<u32> {
		Ok(u32::from_be_bytes(self.read_n()?))
	}
	fn read_u64(&mut self) -> Result<u64> {
		Ok(u64::from_be_bytes(self.read_n()?))
	}
	fn read_i8(&mut self) -> Result<i8> {
		Ok(i8::from_be_bytes(self.read_n()?))
	}
	fn read_i16(&mut self) -> Result<i16> {
		Ok(i16::from_be_bytes(self.read_n()?))
	}
	fn read_i32(&mut self) -> Result<i32> {
		Ok(i32::from_be_bytes(self.read_n()?))
	}
	fn read_i64(&mut self) -> Result<i64> {
		Ok(i64::from_be_bytes(self.read_n()?))
	}

	fn read_u8_as_usize(&mut self) -> Result<usize> {
		Ok(self.read_u8()? as usize)
	}
	fn read_u16_as_usize(&mut self) -> Result<usize> {
		Ok(self.read_u16()? as usize)
	}
	fn read_u32_as_usize(&mut self) -> Result<usize> {
		Ok(self.read_u32()? as usize)
	}
	fn read_vec<T, S, E>(&mut self, get_size: S, mut get_element: E) -> Result<Vec<T>>
	where
		S: FnOnce(&mut Self) -> Result<usize>,
		E: FnMut(&mut Self) -> Result<T>,
	{
		let size = get_size(self)?;
		let mut vec = Vec::with_capacity(size);
		for _ in 0..size {
			vec.push(get_element(self)?);
		}
		Ok(vec)
	}
}

/// A cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
	bytes: &'a [u8],
	pos: usize,
}

impl<'a> ByteReader<'a> {
	pub fn new(bytes: &'a [u8]) -> ByteReader<'a> {
		ByteReader { bytes, pos: 0 }
	}

	/// Creates a reader positioned at `pos`. The position is only checked when reading.
	pub fn at(bytes: &'a [u8], pos: usize) -> ByteReader<'a> {
		ByteReader { bytes, pos }
	}

	/// Reads `n` bytes, borrowing them from the underlying data.
	pub fn read_slice(&mut self, n: usize) -> Result<&'a [u8]> {
		let slice = self.pos.checked_add(n)
			.and_then(|end| self.bytes.get(self.pos..end))
			.ok_or_else(|| anyhow!(ClassError::Truncated { at_offset: self.pos }))?;
		self.pos += n;
		Ok(slice)
	}

	/// Splits off a reader over the next `n` bytes and skips them in this reader.
	///
	/// The returned reader keeps the positions of this reader, but fails with [`ClassError::Truncated`] when reading
	/// past these `n` bytes.
	pub fn take(&mut self, n: usize) -> Result<ByteReader<'a>> {
		let start = self.pos;
		self.read_slice(n)?;
		Ok(ByteReader { bytes: &self.bytes[..start + n], pos: start })
	}

	pub fn remaining(&self) -> usize {
		self.bytes.len().saturating_sub(self.pos)
	}
}

impl ClassRead for ByteReader<'_> {
	fn position(&self) -> usize {
		self.pos
	}

	fn goto(&mut self, pos: usize) -> Result<()> {
		if pos > self.bytes.len() {
			bail!(ClassError::Truncated { at_offset: pos });
		}
		self.pos = pos;
		Ok(())
	}

	fn read_n<const N: usize>(&mut self) -> Result<[u8; N]> {
		let slice = self.read_slice(N)?;
		let mut buf = [0u8; N];
		buf.copy_from_slice(slice);
		Ok(buf)
	}
}

/// Big endian writing of the primitives a class file is made of.
pub trait ClassWrite {
	fn write_u8(&mut self, a: u8) -> Result<()> {
		self.write_u8_slice(&[a])
	}
	fn write_u16(&mut self, value: u16) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes())
	}
	fn write_u32(&mut self, value: u32) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes())
	}
	fn write_u64(&mut self, value: u64) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes())
	}
	fn write_i8(&mut self, value: i8) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes())
	}
	fn write_i16(&mut self, value: i16) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes())
	}
	fn write_i32(&mut self, value: i32) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes())
	}
	fn write_i64(&mut self, value: i64) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes())
	}

	fn write_usize_as_u8(&mut self, value: usize) -> Result<()> {
		self.write_u8(u8::try_from(value).with_context(|| anyhow!("failed to convert {value} to u8 for writing: value too large"))?)
	}
	fn write_usize_as_u16(&mut self, value: usize) -> Result<()> {
		self.write_u16(u16::try_from(value).with_context(|| anyhow!("failed to convert {value} to u16 for writing: value too large"))?)
	}
	fn write_usize_as_u32(&mut self, value: usize) -> Result<()> {
		self.write_u32(u32::try_from(value).with_context(|| anyhow!("failed to convert {value} to u32 for writing: value too large"))?)
	}

	fn write_u8_slice(&mut self, buf: &[u8]) -> Result<()>;
	fn write_slice<'t, T>(
		&mut self,
		slice: &'t [T],
		put_size: impl FnOnce(&mut Self, usize) -> Result<()>,
		mut put_element: impl FnMut(&mut Self, &'t T) -> Result<()>
	) -> Result<()> {
		put_size(self, slice.len())?;
		for value in slice {
			put_element(self, value)?;
		}
		Ok(())
	}
}

impl ClassWrite for Vec<u8> {
	fn write_u8_slice(&mut self, buf: &[u8]) -> Result<()> {
		self.extend_from_slice(buf);
		Ok(())
	}
}
