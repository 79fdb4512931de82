//! Parsing of field and method descriptors, as far as computing frames and stack sizes needs it.

use anyhow::{anyhow, bail, Context, Result};
use java_string::{JavaStr, JavaString};

/// A field type, as found in field descriptors and in the parameters of method descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
	B,
	C,
	D,
	F,
	I,
	J,
	S,
	Z,
	/// A class type, given by its internal name.
	Object(JavaString),
	/// An array type, given by its whole descriptor, like `[[I`.
	Array(JavaString),
}

impl Type {
	/// The number of local variable slots (or stack slots) a value of this type takes.
	pub fn size(&self) -> usize {
		match self {
			Type::D | Type::J => 2,
			_ => 1,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
	pub parameters: Vec<Type>,
	/// `None` for `void`.
	pub return_type: Option<Type>,
}

impl MethodDescriptor {
	/// The number of slots the parameters take, not including `this`.
	pub fn arguments_size(&self) -> usize {
		self.parameters.iter().map(Type::size).sum()
	}

	pub fn return_size(&self) -> usize {
		self.return_type.as_ref().map_or(0, Type::size)
	}
}

fn read_type(descriptor: &JavaStr, pos: &mut usize) -> Result<Type> {
	let bytes = descriptor.as_bytes();
	let start = *pos;

	while bytes.get(*pos) == Some(&b'[') {
		*pos += 1;
	}
	let dimensions = *pos - start;
	if dimensions > 255 {
		bail!("array type has more than 255 dimensions");
	}

	let tag = *bytes.get(*pos).ok_or_else(|| anyhow!("unexpected abrupt ending of descriptor"))?;
	*pos += 1;
	let element = match tag {
		b'B' => Type::B,
		b'C' => Type::C,
		b'D' => Type::D,
		b'F' => Type::F,
		b'I' => Type::I,
		b'J' => Type::J,
		b'S' => Type::S,
		b'Z' => Type::Z,
		b'L' => {
			let end = bytes[*pos..].iter().position(|&b| b == b';')
				.map(|len| *pos + len)
				.ok_or_else(|| anyhow!("class type doesn't end with `;`"))?;
			if end == *pos {
				bail!("empty class name");
			}
			let name = descriptor[*pos..end].to_owned();
			*pos = end + 1;
			Type::Object(name)
		},
		x => bail!("unexpected char {:?} in descriptor", x as char),
	};

	if dimensions > 0 {
		Ok(Type::Array(descriptor[start..*pos].to_owned()))
	} else {
		Ok(element)
	}
}

/// Parses a field descriptor, see the [grammar](https://docs.oracle.com/javase/specs/jvms/se9/html/jvms-4.html#jvms-4.3.2).
pub fn parse_field_descriptor(descriptor: &JavaStr) -> Result<Type> {
	let mut pos = 0;
	let t = read_type(descriptor, &mut pos)
		.with_context(|| anyhow!("failed to read field descriptor {descriptor:?}"))?;
	if pos != descriptor.len() {
		bail!("expected end of field descriptor {descriptor:?}, got {} bytes remaining", descriptor.len() - pos);
	}
	Ok(t)
}

/// Parses a method descriptor, see the [grammar](https://docs.oracle.com/javase/specs/jvms/se9/html/jvms-4.html#jvms-4.3.3).
pub fn parse_method_descriptor(descriptor: &JavaStr) -> Result<MethodDescriptor> {
	let bytes = descriptor.as_bytes();
	if bytes.first() != Some(&b'(') {
		bail!("method descriptor {descriptor:?} doesn't start with '('");
	}

	let mut pos = 1;
	let mut parameters = Vec::new();
	loop {
		match bytes.get(pos) {
			Some(b')') => {
				pos += 1;
				break;
			},
			Some(_) => {
				let t = read_type(descriptor, &mut pos)
					.with_context(|| anyhow!("failed to read parameter descriptor of {descriptor:?}"))?;
				parameters.push(t);
			},
			None => bail!("method descriptor {descriptor:?} has no ')'"),
		}
	}

	let return_type = if bytes.get(pos) == Some(&b'V') {
		pos += 1;
		None
	} else {
		Some(read_type(descriptor, &mut pos)
			.with_context(|| anyhow!("failed to read return descriptor of {descriptor:?}"))?)
	};

	if pos != descriptor.len() {
		bail!("expected end of method descriptor {descriptor:?}, got {} bytes remaining", descriptor.len() - pos);
	}

	Ok(MethodDescriptor { parameters, return_type })
}

/// Returns the internal name used for a class constant of the given array or class type.
///
/// Class constants of arrays use the descriptor, all others the internal name.
pub(crate) fn array_of(class: &JavaStr) -> JavaString {
	let mut s = JavaString::from("[");
	if class.starts_with('[') {
		s.push_java_str(class);
	} else {
		s.push('L');
		s.push_java_str(class);
		s.push(';');
	}
	s
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use java_string::JavaStr;
	use pretty_assertions::assert_eq;
	use crate::tree::descriptor::{array_of, MethodDescriptor, parse_field_descriptor, parse_method_descriptor, Type};

	#[test]
	fn field() -> Result<()> {
		assert_eq!(parse_field_descriptor(JavaStr::from_str("I"))?, Type::I);
		assert_eq!(parse_field_descriptor(JavaStr::from_str("Ljava/lang/Object;"))?, Type::Object("java/lang/Object".into()));
		assert_eq!(parse_field_descriptor(JavaStr::from_str("[[D"))?, Type::Array("[[D".into()));
		assert_eq!(parse_field_descriptor(JavaStr::from_str("[Ljava/lang/String;"))?, Type::Array("[Ljava/lang/String;".into()));

		assert!(parse_field_descriptor(JavaStr::from_str("V")).is_err());
		assert!(parse_field_descriptor(JavaStr::from_str("L;")).is_err());
		assert!(parse_field_descriptor(JavaStr::from_str("Ljava/lang/Object")).is_err());
		assert!(parse_field_descriptor(JavaStr::from_str("II")).is_err());
		Ok(())
	}

	#[test]
	fn method() -> Result<()> {
		let descriptor = parse_method_descriptor(JavaStr::from_str("(IJ[Ljava/lang/String;D)V"))?;
		assert_eq!(descriptor, MethodDescriptor {
			parameters: vec![Type::I, Type::J, Type::Array("[Ljava/lang/String;".into()), Type::D],
			return_type: None,
		});
		assert_eq!(descriptor.arguments_size(), 6);
		assert_eq!(descriptor.return_size(), 0);

		let descriptor = parse_method_descriptor(JavaStr::from_str("()J"))?;
		assert_eq!(descriptor.return_size(), 2);

		assert!(parse_method_descriptor(JavaStr::from_str("(I")).is_err());
		assert!(parse_method_descriptor(JavaStr::from_str("()")).is_err());
		assert!(parse_method_descriptor(JavaStr::from_str("()VV")).is_err());
		Ok(())
	}

	#[test]
	fn arrays() {
		assert_eq!(array_of(JavaStr::from_str("java/lang/Object")), "[Ljava/lang/Object;");
		assert_eq!(array_of(JavaStr::from_str("[I")), "[[I");
	}
}
