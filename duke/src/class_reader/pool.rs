use std::cell::OnceCell;
use anyhow::{anyhow, bail, Context, Result};
use java_string::{JavaStr, JavaString};
use crate::{jstring, ByteReader, ClassError, ClassRead};
use crate::class_constants::pool;
use crate::class_constants::pool::method_handle_reference;
use crate::tree::class::ConstantValue;
use crate::tree::code::{ConstantDynamic, FieldRef, Handle, InvokeDynamic, Loadable, MethodRef};

/// How deep constant dynamic entries may be nested in bootstrap method arguments.
const MAX_NESTING: usize = 32;

/// A bootstrap method as read from the `BootstrapMethods` attribute.
///
/// The handle and arguments stay constant pool indices, since arguments may be constant dynamic entries that refer to
/// other bootstrap methods.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BootstrapMethodRead {
	pub(crate) handle: u16,
	pub(crate) arguments: Vec<u16>,
}

/// The constant pool of a class file being read.
///
/// Only the tag and offset of each entry are known up front, everything else is decoded when asked for.
pub(crate) struct PoolRead<'a> {
	bytes: &'a [u8],
	/// The tag and the offset of the tag for each index. [`None`] for index zero and the upper halves of `Long` and
	/// `Double` entries.
	entries: Vec<Option<(u8, usize)>>,
	utf8: Vec<OnceCell<JavaString>>,
	/// The offset of the first entry.
	start: usize,
	/// The offset after the last entry.
	end: usize,
	pub(crate) bootstrap_methods: Vec<BootstrapMethodRead>,
}

impl<'a> PoolRead<'a> {
	/// Scans the constant pool, starting at the `constant_pool_count` the reader is positioned at.
	pub(crate) fn scan(bytes: &'a [u8], reader: &mut ByteReader<'a>) -> Result<PoolRead<'a>> {
		let count = reader.read_u16_as_usize()?;
		let start = reader.position();

		let mut entries = Vec::with_capacity(count.max(1));
		entries.push(None);
		while entries.len() < count {
			let at = reader.position();
			let tag = reader.read_u8()?;
			entries.push(Some((tag, at)));
			match tag {
				pool::UTF8 => {
					let length = reader.read_u16_as_usize()?;
					reader.skip(length)?;
				},
				pool::INTEGER | pool::FLOAT => reader.skip(4)?,
				pool::LONG | pool::DOUBLE => {
					reader.skip(8)?;
					if entries.len() < count {
						entries.push(None);
					}
				},
				pool::CLASS | pool::STRING | pool::METHOD_TYPE | pool::MODULE | pool::PACKAGE => reader.skip(2)?,
				pool::METHOD_HANDLE => reader.skip(3)?,
				pool::FIELD_REF | pool::METHOD_REF | pool::INTERFACE_METHOD_REF | pool::NAME_AND_TYPE |
				pool::DYNAMIC | pool::INVOKE_DYNAMIC => reader.skip(4)?,
				tag => bail!(ClassError::BadConstantPoolTag { tag, at }),
			}
		}

		let utf8 = (0..entries.len()).map(|_| OnceCell::new()).collect();

		Ok(PoolRead {
			bytes,
			entries,
			utf8,
			start,
			end: reader.position(),
			bootstrap_methods: Vec::new(),
		})
	}

	/// The bytes of all entries, not including the `constant_pool_count`.
	pub(crate) fn entry_bytes(&self) -> &'a [u8] {
		&self.bytes[self.start..self.end]
	}

	/// The `constant_pool_count`, one more than the highest index.
	pub(crate) fn count(&self) -> usize {
		self.entries.len()
	}

	/// The offset after the constant pool.
	pub(crate) fn end(&self) -> usize {
		self.end
	}

	/// Iterates over all entries with their index, tag and the offset of the data after the tag.
	pub(crate) fn iter(&self) -> impl Iterator<Item=(u16, u8, usize)> + '_ {
		self.entries.iter().enumerate()
			.filter_map(|(index, entry)| entry.map(|(tag, at)| (index as u16, tag, at + 1)))
	}

	/// Returns a reader positioned after the tag of the entry, checking that it has the expected tag.
	fn entry(&self, index: u16, expected: u8) -> Result<ByteReader<'a>> {
		match self.entries.get(index as usize) {
			Some(&Some((tag, at))) if tag == expected => Ok(ByteReader::at(self.bytes, at + 1)),
			Some(&Some((tag, _))) => bail!(ClassError::BadKind { index, expected: pool::name(expected), found: pool::name(tag) }),
			_ => bail!(ClassError::BadIndex { index }),
		}
	}

	fn tag(&self, index: u16) -> Result<u8> {
		match self.entries.get(index as usize) {
			Some(&Some((tag, _))) => Ok(tag),
			_ => bail!(ClassError::BadIndex { index }),
		}
	}

	/// Returns [`None`] if `index` is zero, otherwise returns [`Some`] of the result of the function `f`.
	pub(crate) fn optional<'s, T>(&'s self, index: u16, f: impl FnOnce(&'s Self, u16) -> Result<T>) -> Result<Option<T>> {
		if index == 0 {
			Ok(None)
		} else {
			Ok(Some(f(self, index)?))
		}
	}

	pub(crate) fn utf8(&self, index: u16) -> Result<&JavaStr> {
		let mut reader = self.entry(index, pool::UTF8)?;
		let cell = &self.utf8[index as usize];
		if let Some(string) = cell.get() {
			return Ok(string.as_java_str());
		}

		let length = reader.read_u16_as_usize()?;
		let string = jstring::decode(reader.read_slice(length)?)
			.with_context(|| anyhow!("failed to decode constant pool entry {index}"))?;
		Ok(cell.get_or_init(|| string).as_java_str())
	}

	pub(crate) fn utf8_owned(&self, index: u16) -> Result<JavaString> {
		self.utf8(index).map(ToOwned::to_owned)
	}

	fn indirect_utf8(&self, index: u16, tag: u8) -> Result<&JavaStr> {
		let name_index = self.entry(index, tag)?.read_u16()?;
		self.utf8(name_index)
			.with_context(|| anyhow!("failed to read name of {} entry {index}", pool::name(tag)))
	}

	pub(crate) fn class(&self, index: u16) -> Result<&JavaStr> {
		self.indirect_utf8(index, pool::CLASS)
	}

	pub(crate) fn class_owned(&self, index: u16) -> Result<JavaString> {
		self.class(index).map(ToOwned::to_owned)
	}

	pub(crate) fn string(&self, index: u16) -> Result<&JavaStr> {
		self.indirect_utf8(index, pool::STRING)
	}

	pub(crate) fn method_type(&self, index: u16) -> Result<&JavaStr> {
		self.indirect_utf8(index, pool::METHOD_TYPE)
	}

	pub(crate) fn module(&self, index: u16) -> Result<&JavaStr> {
		self.indirect_utf8(index, pool::MODULE)
	}

	pub(crate) fn package(&self, index: u16) -> Result<&JavaStr> {
		self.indirect_utf8(index, pool::PACKAGE)
	}

	pub(crate) fn integer(&self, index: u16) -> Result<i32> {
		self.entry(index, pool::INTEGER)?.read_i32()
	}

	pub(crate) fn float(&self, index: u16) -> Result<f32> {
		Ok(f32::from_bits(self.entry(index, pool::FLOAT)?.read_u32()?))
	}

	pub(crate) fn long(&self, index: u16) -> Result<i64> {
		self.entry(index, pool::LONG)?.read_i64()
	}

	pub(crate) fn double(&self, index: u16) -> Result<f64> {
		Ok(f64::from_bits(self.entry(index, pool::DOUBLE)?.read_u64()?))
	}

	pub(crate) fn name_and_type(&self, index: u16) -> Result<(&JavaStr, &JavaStr)> {
		let mut reader = self.entry(index, pool::NAME_AND_TYPE)?;
		let name = self.utf8(reader.read_u16()?)?;
		let descriptor = self.utf8(reader.read_u16()?)?;
		Ok((name, descriptor))
	}

	fn member_ref(&self, mut reader: ByteReader<'a>) -> Result<(JavaString, JavaString, JavaString)> {
		let class = self.class_owned(reader.read_u16()?)?;
		let (name, descriptor) = self.name_and_type(reader.read_u16()?)?;
		Ok((class, name.to_owned(), descriptor.to_owned()))
	}

	pub(crate) fn field_ref(&self, index: u16) -> Result<FieldRef> {
		let (class, name, descriptor) = self.member_ref(self.entry(index, pool::FIELD_REF)?)?;
		Ok(FieldRef { class, name, descriptor })
	}

	pub(crate) fn method_ref(&self, index: u16) -> Result<MethodRef> {
		let (class, name, descriptor) = self.member_ref(self.entry(index, pool::METHOD_REF)?)?;
		Ok(MethodRef { class, name, descriptor })
	}

	pub(crate) fn interface_method_ref(&self, index: u16) -> Result<MethodRef> {
		let (class, name, descriptor) = self.member_ref(self.entry(index, pool::INTERFACE_METHOD_REF)?)?;
		Ok(MethodRef { class, name, descriptor })
	}

	/// Reads a `Methodref` or an `InterfaceMethodref`, `true` indicating the latter.
	pub(crate) fn any_method_ref(&self, index: u16) -> Result<(MethodRef, bool)> {
		match self.tag(index)? {
			pool::INTERFACE_METHOD_REF => Ok((self.interface_method_ref(index)?, true)),
			_ => Ok((self.method_ref(index)?, false)),
		}
	}

	pub(crate) fn method_handle(&self, index: u16) -> Result<Handle> {
		let mut reader = self.entry(index, pool::METHOD_HANDLE)?;
		let at = reader.position();
		let kind = reader.read_u8()?;
		let reference = reader.read_u16()?;
		Ok(match kind {
			method_handle_reference::GET_FIELD => Handle::GetField(self.field_ref(reference)?),
			method_handle_reference::GET_STATIC => Handle::GetStatic(self.field_ref(reference)?),
			method_handle_reference::PUT_FIELD => Handle::PutField(self.field_ref(reference)?),
			method_handle_reference::PUT_STATIC => Handle::PutStatic(self.field_ref(reference)?),
			method_handle_reference::INVOKE_VIRTUAL => Handle::InvokeVirtual(self.method_ref(reference)?),
			method_handle_reference::INVOKE_STATIC => {
				let (method, interface) = self.any_method_ref(reference)?;
				Handle::InvokeStatic(method, interface)
			},
			method_handle_reference::INVOKE_SPECIAL => {
				let (method, interface) = self.any_method_ref(reference)?;
				Handle::InvokeSpecial(method, interface)
			},
			method_handle_reference::NEW_INVOKE_SPECIAL => Handle::NewInvokeSpecial(self.method_ref(reference)?),
			method_handle_reference::INVOKE_INTERFACE => Handle::InvokeInterface(self.interface_method_ref(reference)?),
			tag => bail!(ClassError::Malformed { what: "method handle kind", tag, at }),
		})
	}

	fn bootstrap(&self, index: u16, depth: usize) -> Result<(JavaString, JavaString, Handle, Vec<Loadable>)> {
		let tag = self.tag(index)?;
		let mut reader = self.entry(index, tag)?;
		let bootstrap_method_index = reader.read_u16()?;
		let (name, descriptor) = self.name_and_type(reader.read_u16()?)?;

		let bootstrap_method = self.bootstrap_methods.get(bootstrap_method_index as usize)
			.ok_or(ClassError::BadIndex { index: bootstrap_method_index })
			.with_context(|| anyhow!("{} entry {index} refers to a missing bootstrap method", pool::name(tag)))?;

		let handle = self.method_handle(bootstrap_method.handle)?;
		let arguments = bootstrap_method.arguments.iter()
			.map(|&argument| self.loadable_nested(argument, depth + 1))
			.collect::<Result<_>>()?;

		Ok((name.to_owned(), descriptor.to_owned(), handle, arguments))
	}

	pub(crate) fn invoke_dynamic(&self, index: u16) -> Result<InvokeDynamic> {
		self.entry(index, pool::INVOKE_DYNAMIC)?;
		let (name, descriptor, handle, arguments) = self.bootstrap(index, 0)?;
		Ok(InvokeDynamic { name, descriptor, handle, arguments })
	}

	fn dynamic(&self, index: u16, depth: usize) -> Result<ConstantDynamic> {
		self.entry(index, pool::DYNAMIC)?;
		let (name, descriptor, handle, arguments) = self.bootstrap(index, depth)?;
		Ok(ConstantDynamic { name, descriptor, handle, arguments })
	}

	pub(crate) fn loadable(&self, index: u16) -> Result<Loadable> {
		self.loadable_nested(index, 0)
	}

	fn loadable_nested(&self, index: u16, depth: usize) -> Result<Loadable> {
		if depth > MAX_NESTING {
			bail!(ClassError::TooLarge { what: "constant dynamic nesting" });
		}
		Ok(match self.tag(index)? {
			pool::INTEGER => Loadable::Integer(self.integer(index)?),
			pool::FLOAT => Loadable::Float(self.float(index)?),
			pool::LONG => Loadable::Long(self.long(index)?),
			pool::DOUBLE => Loadable::Double(self.double(index)?),
			pool::CLASS => Loadable::Class(self.class_owned(index)?),
			pool::STRING => Loadable::String(self.string(index)?.to_owned()),
			pool::METHOD_HANDLE => Loadable::MethodHandle(self.method_handle(index)?),
			pool::METHOD_TYPE => Loadable::MethodType(self.method_type(index)?.to_owned()),
			pool::DYNAMIC => Loadable::Dynamic(self.dynamic(index, depth)?),
			tag => bail!(ClassError::BadKind { index, expected: "loadable constant", found: pool::name(tag) }),
		})
	}

	pub(crate) fn constant_value(&self, index: u16) -> Result<ConstantValue> {
		Ok(match self.tag(index)? {
			pool::INTEGER => ConstantValue::Integer(self.integer(index)?),
			pool::FLOAT => ConstantValue::Float(self.float(index)?),
			pool::LONG => ConstantValue::Long(self.long(index)?),
			pool::DOUBLE => ConstantValue::Double(self.double(index)?),
			pool::STRING => ConstantValue::String(self.string(index)?.to_owned()),
			tag => bail!(ClassError::BadKind { index, expected: "constant value", found: pool::name(tag) }),
		})
	}
}
