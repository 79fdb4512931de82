use java_string::JavaString;
use crate::tree::version::Version;

/// The data passed to [`ClassVisitor::visit`][crate::visitor::class::ClassVisitor::visit].
#[derive(Debug, Clone, PartialEq)]
pub struct ClassHeader {
	pub version: Version,
	/// The access flags, see [`crate::tree::access`]. `Synthetic` and `Deprecated` attributes are folded in here.
	pub access: u32,
	pub name: JavaString,
	pub signature: Option<JavaString>,
	/// `None` only for `java/lang/Object` and for modules.
	pub super_class: Option<JavaString>,
	pub interfaces: Vec<JavaString>,
}

/// An entry of the `InnerClasses` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InnerClass {
	pub name: JavaString,
	pub outer_name: Option<JavaString>,
	pub inner_name: Option<JavaString>,
	pub access: u16,
}

/// The value of a `ConstantValue` attribute of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
	Integer(i32),
	Float(f32),
	Long(i64),
	Double(f64),
	String(JavaString),
}

/// The bytes of a field or method as found in the class file being read.
///
/// The reader offers these before emitting the events of the member, see
/// [`MethodVisitor::copy_raw`][crate::visitor::method::MethodVisitor::copy_raw]. A writer sharing the constant pool
/// with the reader may copy the attributes instead of rebuilding them.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMember<'a> {
	/// The entries of the constant pool the indices below point into.
	pub(crate) pool: &'a [u8],
	/// The access flags as given to the visitor, with `Synthetic` and `Deprecated` attributes folded in.
	pub(crate) access: u32,
	/// The `access_flags` item.
	pub(crate) access_flags: u16,
	pub(crate) name_index: u16,
	pub(crate) descriptor_index: u16,
	pub(crate) signature_index: Option<u16>,
	/// The `ConstantValue` of a field.
	pub(crate) constant_value_index: Option<u16>,
	/// The `Exceptions` of a method.
	pub(crate) exception_indices: Vec<u16>,
	/// Starts with the `attributes_count`, and includes all attributes.
	pub(crate) attributes: &'a [u8],
}
