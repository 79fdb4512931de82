use java_string::JavaString;

/// An attribute this library doesn't interpret, with its content as opaque bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
	pub name: JavaString,
	pub content: Vec<u8>,
}
