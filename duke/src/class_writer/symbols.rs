use std::collections::HashMap;
use anyhow::{anyhow, bail, Context, Result};
use java_string::JavaStr;
use crate::{jstring, ByteReader, ClassError, ClassRead, ClassReader, ClassWrite};
use crate::class_constants::pool;
use crate::class_constants::pool::method_handle_reference;
use crate::tree::class::ConstantValue;
use crate::tree::code::{ConstantDynamic, FieldRef, Handle, InvokeDynamic, Loadable, MethodRef};

/// A constant pool entry as it's written, with other entries as indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolEntry {
	/// The modified UTF-8 bytes.
	Utf8(Vec<u8>),
	Integer(i32),
	/// The bits of the float, so that all `NaN`s stay distinct.
	Float(u32),
	Long(i64),
	Double(u64),
	Class { name_index: u16 },
	String { string_index: u16 },
	FieldRef { class_index: u16, name_and_type_index: u16 },
	MethodRef { class_index: u16, name_and_type_index: u16 },
	InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
	NameAndType { name_index: u16, descriptor_index: u16 },
	MethodHandle { reference_kind: u8, reference_index: u16 },
	MethodType { descriptor_index: u16 },
	Dynamic { bootstrap_method_index: u16, name_and_type_index: u16 },
	InvokeDynamic { bootstrap_method_index: u16, name_and_type_index: u16 },
	Module { name_index: u16 },
	Package { name_index: u16 },
}

impl PoolEntry {
	/// Reads an entry from the class file, the reader being positioned after the tag.
	fn read(tag: u8, r: &mut ByteReader) -> Result<PoolEntry> {
		Ok(match tag {
			pool::UTF8 => {
				let length = r.read_u16_as_usize()?;
				PoolEntry::Utf8(r.read_slice(length)?.to_vec())
			},
			pool::INTEGER => PoolEntry::Integer(r.read_i32()?),
			pool::FLOAT => PoolEntry::Float(r.read_u32()?),
			pool::LONG => PoolEntry::Long(r.read_i64()?),
			pool::DOUBLE => PoolEntry::Double(r.read_u64()?),
			pool::CLASS => PoolEntry::Class { name_index: r.read_u16()? },
			pool::STRING => PoolEntry::String { string_index: r.read_u16()? },
			pool::FIELD_REF => PoolEntry::FieldRef { class_index: r.read_u16()?, name_and_type_index: r.read_u16()? },
			pool::METHOD_REF => PoolEntry::MethodRef { class_index: r.read_u16()?, name_and_type_index: r.read_u16()? },
			pool::INTERFACE_METHOD_REF => PoolEntry::InterfaceMethodRef { class_index: r.read_u16()?, name_and_type_index: r.read_u16()? },
			pool::NAME_AND_TYPE => PoolEntry::NameAndType { name_index: r.read_u16()?, descriptor_index: r.read_u16()? },
			pool::METHOD_HANDLE => PoolEntry::MethodHandle { reference_kind: r.read_u8()?, reference_index: r.read_u16()? },
			pool::METHOD_TYPE => PoolEntry::MethodType { descriptor_index: r.read_u16()? },
			pool::DYNAMIC => PoolEntry::Dynamic { bootstrap_method_index: r.read_u16()?, name_and_type_index: r.read_u16()? },
			pool::INVOKE_DYNAMIC => PoolEntry::InvokeDynamic { bootstrap_method_index: r.read_u16()?, name_and_type_index: r.read_u16()? },
			pool::MODULE => PoolEntry::Module { name_index: r.read_u16()? },
			pool::PACKAGE => PoolEntry::Package { name_index: r.read_u16()? },
			tag => bail!(ClassError::BadConstantPoolTag { tag, at: r.position() - 1 }),
		})
	}

	fn tag(&self) -> u8 {
		match self {
			PoolEntry::Utf8(_) => pool::UTF8,
			PoolEntry::Integer(_) => pool::INTEGER,
			PoolEntry::Float(_) => pool::FLOAT,
			PoolEntry::Long(_) => pool::LONG,
			PoolEntry::Double(_) => pool::DOUBLE,
			PoolEntry::Class { .. } => pool::CLASS,
			PoolEntry::String { .. } => pool::STRING,
			PoolEntry::FieldRef { .. } => pool::FIELD_REF,
			PoolEntry::MethodRef { .. } => pool::METHOD_REF,
			PoolEntry::InterfaceMethodRef { .. } => pool::INTERFACE_METHOD_REF,
			PoolEntry::NameAndType { .. } => pool::NAME_AND_TYPE,
			PoolEntry::MethodHandle { .. } => pool::METHOD_HANDLE,
			PoolEntry::MethodType { .. } => pool::METHOD_TYPE,
			PoolEntry::Dynamic { .. } => pool::DYNAMIC,
			PoolEntry::InvokeDynamic { .. } => pool::INVOKE_DYNAMIC,
			PoolEntry::Module { .. } => pool::MODULE,
			PoolEntry::Package { .. } => pool::PACKAGE,
		}
	}

	/// `Long` and `Double` entries take up two indices.
	fn is_wide(&self) -> bool {
		matches!(self, PoolEntry::Long(_) | PoolEntry::Double(_))
	}

	fn write(&self, w: &mut Vec<u8>) -> Result<()> {
		w.write_u8(self.tag())?;
		match *self {
			PoolEntry::Utf8(ref bytes) => {
				w.write_usize_as_u16(bytes.len()).with_context(|| anyhow!("string constant too long"))?;
				w.write_u8_slice(bytes)?;
			},
			PoolEntry::Integer(value) => w.write_i32(value)?,
			PoolEntry::Float(bits) => w.write_u32(bits)?,
			PoolEntry::Long(value) => w.write_i64(value)?,
			PoolEntry::Double(bits) => w.write_u64(bits)?,
			PoolEntry::Class { name_index: index } |
			PoolEntry::String { string_index: index } |
			PoolEntry::MethodType { descriptor_index: index } |
			PoolEntry::Module { name_index: index } |
			PoolEntry::Package { name_index: index } => w.write_u16(index)?,
			PoolEntry::FieldRef { class_index: a, name_and_type_index: b } |
			PoolEntry::MethodRef { class_index: a, name_and_type_index: b } |
			PoolEntry::InterfaceMethodRef { class_index: a, name_and_type_index: b } |
			PoolEntry::NameAndType { name_index: a, descriptor_index: b } |
			PoolEntry::Dynamic { bootstrap_method_index: a, name_and_type_index: b } |
			PoolEntry::InvokeDynamic { bootstrap_method_index: a, name_and_type_index: b } => {
				w.write_u16(a)?;
				w.write_u16(b)?;
			},
			PoolEntry::MethodHandle { reference_kind, reference_index } => {
				w.write_u8(reference_kind)?;
				w.write_u16(reference_index)?;
			},
		}
		Ok(())
	}
}

/// A bootstrap method with its handle and arguments as constant pool indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BootstrapMethod {
	handle: u16,
	arguments: Vec<u16>,
}

/// The constant pool and the bootstrap methods of a class being written.
///
/// Each `put_*` method returns the index of an equal entry if there's one already, and adds a new entry otherwise.
#[derive(Debug, Clone)]
pub(crate) struct SymbolTable {
	entries: HashMap<PoolEntry, u16>,
	/// The `constant_pool_count`, one more than the highest index.
	count: usize,
	/// All entries, in the order they were added.
	bytes: Vec<u8>,
	/// The number of bytes inherited from a class reader.
	inherited: usize,
	bootstrap_methods: Vec<BootstrapMethod>,
	bootstrap_method_indices: HashMap<BootstrapMethod, u16>,
}

impl SymbolTable {
	pub(crate) fn new() -> SymbolTable {
		SymbolTable {
			entries: HashMap::new(),
			count: 1,
			bytes: Vec::new(),
			inherited: 0,
			bootstrap_methods: Vec::new(),
			bootstrap_method_indices: HashMap::new(),
		}
	}

	/// Creates a table starting with the entries and bootstrap methods of the class being read, keeping their indices.
	pub(crate) fn from_reader(reader: &ClassReader) -> Result<SymbolTable> {
		let source = reader.pool.entry_bytes();
		let mut table = SymbolTable {
			entries: HashMap::new(),
			count: reader.pool.count(),
			bytes: source.to_vec(),
			inherited: source.len(),
			bootstrap_methods: Vec::new(),
			bootstrap_method_indices: HashMap::new(),
		};

		// Offsets of the pool reader are offsets into the whole class file, the bytes there are the same.
		let whole = reader.bytes();
		for (index, tag, at) in reader.pool.iter() {
			let entry = PoolEntry::read(tag, &mut ByteReader::at(whole, at))
				.with_context(|| anyhow!("failed to copy constant pool entry {index}"))?;
			table.entries.entry(entry).or_insert(index);
		}

		for (index, method) in reader.pool.bootstrap_methods.iter().enumerate() {
			let method = BootstrapMethod { handle: method.handle, arguments: method.arguments.clone() };
			table.bootstrap_method_indices.entry(method.clone()).or_insert(index as u16);
			table.bootstrap_methods.push(method);
		}

		Ok(table)
	}

	/// Returns `true` if `pool` are exactly the entries this table inherited from a class reader, so that indices into
	/// `pool` are valid indices into this table.
	pub(crate) fn shares_pool(&self, pool: &[u8]) -> bool {
		self.inherited != 0 && self.inherited == pool.len() && self.bytes.starts_with(pool)
	}

	fn put(&mut self, entry: PoolEntry) -> Result<u16> {
		if let Some(&index) = self.entries.get(&entry) {
			return Ok(index);
		}

		let size = if entry.is_wide() { 2 } else { 1 };
		let index = self.count;
		if index + size > u16::MAX as usize {
			bail!(ClassError::TooLarge { what: "constant pool" });
		}

		entry.write(&mut self.bytes)?;
		self.count += size;
		let index = index as u16;
		self.entries.insert(entry, index);
		Ok(index)
	}

	/// Calls `f` for `Some`, and returns zero for `None`.
	pub(crate) fn put_optional<T: ?Sized>(&mut self, value: Option<&T>, f: impl FnOnce(&mut Self, &T) -> Result<u16>) -> Result<u16> {
		match value {
			Some(value) => f(self, value),
			None => Ok(0),
		}
	}

	pub(crate) fn put_utf8(&mut self, value: &JavaStr) -> Result<u16> {
		self.put(PoolEntry::Utf8(jstring::encode(value).into_owned()))
	}

	/// Adds the name of an attribute.
	pub(crate) fn put_name(&mut self, name: &str) -> Result<u16> {
		self.put_utf8(JavaStr::from_str(name))
	}

	pub(crate) fn put_integer(&mut self, value: i32) -> Result<u16> {
		self.put(PoolEntry::Integer(value))
	}

	pub(crate) fn put_float(&mut self, value: f32) -> Result<u16> {
		self.put(PoolEntry::Float(value.to_bits()))
	}

	pub(crate) fn put_long(&mut self, value: i64) -> Result<u16> {
		self.put(PoolEntry::Long(value))
	}

	pub(crate) fn put_double(&mut self, value: f64) -> Result<u16> {
		self.put(PoolEntry::Double(value.to_bits()))
	}

	pub(crate) fn put_class(&mut self, name: &JavaStr) -> Result<u16> {
		let name_index = self.put_utf8(name)?;
		self.put(PoolEntry::Class { name_index })
	}

	pub(crate) fn put_string(&mut self, value: &JavaStr) -> Result<u16> {
		let string_index = self.put_utf8(value)?;
		self.put(PoolEntry::String { string_index })
	}

	pub(crate) fn put_method_type(&mut self, descriptor: &JavaStr) -> Result<u16> {
		let descriptor_index = self.put_utf8(descriptor)?;
		self.put(PoolEntry::MethodType { descriptor_index })
	}

	pub(crate) fn put_module(&mut self, name: &JavaStr) -> Result<u16> {
		let name_index = self.put_utf8(name)?;
		self.put(PoolEntry::Module { name_index })
	}

	pub(crate) fn put_package(&mut self, name: &JavaStr) -> Result<u16> {
		let name_index = self.put_utf8(name)?;
		self.put(PoolEntry::Package { name_index })
	}

	pub(crate) fn put_name_and_type(&mut self, name: &JavaStr, descriptor: &JavaStr) -> Result<u16> {
		let name_index = self.put_utf8(name)?;
		let descriptor_index = self.put_utf8(descriptor)?;
		self.put(PoolEntry::NameAndType { name_index, descriptor_index })
	}

	pub(crate) fn put_field_ref(&mut self, field: &FieldRef) -> Result<u16> {
		let class_index = self.put_class(&field.class)?;
		let name_and_type_index = self.put_name_and_type(&field.name, &field.descriptor)?;
		self.put(PoolEntry::FieldRef { class_index, name_and_type_index })
	}

	/// Adds a `Methodref`, or an `InterfaceMethodref` if `interface` is `true`.
	pub(crate) fn put_method_ref(&mut self, method: &MethodRef, interface: bool) -> Result<u16> {
		let class_index = self.put_class(&method.class)?;
		let name_and_type_index = self.put_name_and_type(&method.name, &method.descriptor)?;
		if interface {
			self.put(PoolEntry::InterfaceMethodRef { class_index, name_and_type_index })
		} else {
			self.put(PoolEntry::MethodRef { class_index, name_and_type_index })
		}
	}

	pub(crate) fn put_method_handle(&mut self, handle: &Handle) -> Result<u16> {
		let (reference_kind, reference_index) = match handle {
			Handle::GetField(field) => (method_handle_reference::GET_FIELD, self.put_field_ref(field)?),
			Handle::GetStatic(field) => (method_handle_reference::GET_STATIC, self.put_field_ref(field)?),
			Handle::PutField(field) => (method_handle_reference::PUT_FIELD, self.put_field_ref(field)?),
			Handle::PutStatic(field) => (method_handle_reference::PUT_STATIC, self.put_field_ref(field)?),
			Handle::InvokeVirtual(method) => (method_handle_reference::INVOKE_VIRTUAL, self.put_method_ref(method, false)?),
			Handle::InvokeStatic(method, interface) => (method_handle_reference::INVOKE_STATIC, self.put_method_ref(method, *interface)?),
			Handle::InvokeSpecial(method, interface) => (method_handle_reference::INVOKE_SPECIAL, self.put_method_ref(method, *interface)?),
			Handle::NewInvokeSpecial(method) => (method_handle_reference::NEW_INVOKE_SPECIAL, self.put_method_ref(method, false)?),
			Handle::InvokeInterface(method) => (method_handle_reference::INVOKE_INTERFACE, self.put_method_ref(method, true)?),
		};
		self.put(PoolEntry::MethodHandle { reference_kind, reference_index })
	}

	/// Adds a bootstrap method, returning its index in the `BootstrapMethods` attribute.
	pub(crate) fn put_bootstrap_method(&mut self, handle: &Handle, arguments: &[Loadable]) -> Result<u16> {
		let handle = self.put_method_handle(handle)?;
		let arguments = arguments.iter()
			.map(|argument| self.put_loadable(argument))
			.collect::<Result<_>>()?;
		let method = BootstrapMethod { handle, arguments };

		if let Some(&index) = self.bootstrap_method_indices.get(&method) {
			return Ok(index);
		}
		let index = u16::try_from(self.bootstrap_methods.len())
			.map_err(|_| ClassError::TooLarge { what: "bootstrap methods" })?;
		self.bootstrap_method_indices.insert(method.clone(), index);
		self.bootstrap_methods.push(method);
		Ok(index)
	}

	pub(crate) fn put_dynamic(&mut self, dynamic: &ConstantDynamic) -> Result<u16> {
		let bootstrap_method_index = self.put_bootstrap_method(&dynamic.handle, &dynamic.arguments)?;
		let name_and_type_index = self.put_name_and_type(&dynamic.name, &dynamic.descriptor)?;
		self.put(PoolEntry::Dynamic { bootstrap_method_index, name_and_type_index })
	}

	pub(crate) fn put_invoke_dynamic(&mut self, invoke_dynamic: &InvokeDynamic) -> Result<u16> {
		let bootstrap_method_index = self.put_bootstrap_method(&invoke_dynamic.handle, &invoke_dynamic.arguments)?;
		let name_and_type_index = self.put_name_and_type(&invoke_dynamic.name, &invoke_dynamic.descriptor)?;
		self.put(PoolEntry::InvokeDynamic { bootstrap_method_index, name_and_type_index })
	}

	pub(crate) fn put_loadable(&mut self, loadable: &Loadable) -> Result<u16> {
		match loadable {
			Loadable::Integer(value) => self.put_integer(*value),
			Loadable::Float(value) => self.put_float(*value),
			Loadable::Long(value) => self.put_long(*value),
			Loadable::Double(value) => self.put_double(*value),
			Loadable::Class(name) => self.put_class(name),
			Loadable::String(value) => self.put_string(value),
			Loadable::MethodHandle(handle) => self.put_method_handle(handle),
			Loadable::MethodType(descriptor) => self.put_method_type(descriptor),
			Loadable::Dynamic(dynamic) => self.put_dynamic(dynamic),
		}
	}

	pub(crate) fn put_constant_value(&mut self, value: &ConstantValue) -> Result<u16> {
		match value {
			ConstantValue::Integer(value) => self.put_integer(*value),
			ConstantValue::Float(value) => self.put_float(*value),
			ConstantValue::Long(value) => self.put_long(*value),
			ConstantValue::Double(value) => self.put_double(*value),
			ConstantValue::String(value) => self.put_string(value),
		}
	}

	pub(crate) fn has_bootstrap_methods(&self) -> bool {
		!self.bootstrap_methods.is_empty()
	}

	/// Writes the `constant_pool_count` and `constant_pool` items.
	pub(crate) fn write_pool(&self, w: &mut Vec<u8>) -> Result<()> {
		w.write_usize_as_u16(self.count)?;
		w.write_u8_slice(&self.bytes)
	}

	/// Writes the content of the `BootstrapMethods` attribute.
	pub(crate) fn write_bootstrap_methods(&self, w: &mut Vec<u8>) -> Result<()> {
		w.write_slice(
			&self.bootstrap_methods,
			|w, size| w.write_usize_as_u16(size),
			|w, method| {
				w.write_u16(method.handle)?;
				w.write_slice(&method.arguments, |w, size| w.write_usize_as_u16(size), |w, &argument| w.write_u16(argument))
			}
		)
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use java_string::JavaStr;
	use pretty_assertions::assert_eq;
	use crate::ClassError;
	use crate::class_writer::symbols::SymbolTable;
	use crate::tree::code::{Handle, Loadable, MethodRef};

	#[test]
	fn interning() -> Result<()> {
		let mut table = SymbolTable::new();
		let a = table.put_class(JavaStr::from_str("A"))?;
		assert_eq!(a, 2); // the Utf8 entry comes first
		assert_eq!(table.put_utf8(JavaStr::from_str("A"))?, 1);
		assert_eq!(table.put_class(JavaStr::from_str("A"))?, a);

		assert_eq!(table.put_long(7)?, 3);
		assert_eq!(table.put_integer(7)?, 5);
		assert_eq!(table.put_float(f32::NAN)?, table.put_float(f32::NAN)?);
		assert_ne!(table.put_float(0.0)?, table.put_float(-0.0)?);

		let mut bytes = Vec::new();
		table.write_pool(&mut bytes)?;
		assert_eq!(&bytes[..9], &[0x00, 0x09, 0x01, 0x00, 0x01, b'A', 0x07, 0x00, 0x01]);
		Ok(())
	}

	#[test]
	fn bootstrap_methods() -> Result<()> {
		let mut table = SymbolTable::new();
		let handle = Handle::InvokeStatic(MethodRef {
			class: "java/lang/invoke/LambdaMetafactory".into(),
			name: "metafactory".into(),
			descriptor: "()V".into(),
		}, false);
		let first = table.put_bootstrap_method(&handle, &[Loadable::Integer(1)])?;
		let second = table.put_bootstrap_method(&handle, &[Loadable::Integer(2)])?;
		assert_eq!((first, second), (0, 1));
		assert_eq!(table.put_bootstrap_method(&handle, &[Loadable::Integer(1)])?, 0);
		assert!(table.has_bootstrap_methods());
		Ok(())
	}

	#[test]
	fn too_many_entries() -> Result<()> {
		let mut table = SymbolTable::new();
		for i in 0..(u16::MAX as i32 - 1) {
			table.put_integer(i)?;
		}
		let error = table.put_integer(-1).unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::TooLarge { what: "constant pool" }));
		Ok(())
	}
}
