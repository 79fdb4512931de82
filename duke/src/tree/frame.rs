use anyhow::Result;
use java_string::{JavaStr, JavaString};
use crate::tree::access::ACC_STATIC;
use crate::tree::code::Label;
use crate::tree::descriptor::{parse_method_descriptor, Type};

/// A stack map frame, describing the types of the local variables and the operand stack at an instruction.
///
/// The compressed shapes describe the frame relative to the previous frame of the method (or to the implicit frame
/// derived from the method descriptor for the first one). The reader produces these unless
/// [`ReadFlags::EXPAND_FRAMES`][crate::ReadFlags::EXPAND_FRAMES] is given, then it produces [`Frame::Expanded`].
///
/// A method must not mix expanded and compressed frames.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
	/// Same locals as the previous frame, empty stack.
	Same,
	/// Same locals as the previous frame, one stack entry.
	SameLocals1StackItem(VerificationType),
	/// The previous frame with the last `1..=3` locals removed, empty stack.
	Chop(u8),
	/// The previous frame with `1..=3` locals added, empty stack.
	Append(Vec<VerificationType>),
	Full {
		locals: Vec<VerificationType>,
		stack: Vec<VerificationType>,
	},
	/// A frame not depending on the previous one.
	Expanded {
		locals: Vec<VerificationType>,
		stack: Vec<VerificationType>,
	},
}

/// The type of a local variable or stack entry.
///
/// [`VerificationType::Long`] and [`VerificationType::Double`] are one entry, but take two local variable slots or
/// stack slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VerificationType {
	Top,
	Integer,
	Float,
	Long,
	Double,
	Null,
	UninitializedThis,
	/// An object created by the `new` instruction at the label, whose constructor wasn't called yet.
	Uninitialized(Label),
	/// The internal name of a class, or the descriptor of an array.
	Object(JavaString),
}

impl VerificationType {
	pub(crate) fn size(&self) -> usize {
		match self {
			VerificationType::Long | VerificationType::Double => 2,
			_ => 1,
		}
	}
}

impl From<Type> for VerificationType {
	fn from(value: Type) -> Self {
		match value {
			Type::B | Type::C | Type::I | Type::S | Type::Z => VerificationType::Integer,
			Type::F => VerificationType::Float,
			Type::J => VerificationType::Long,
			Type::D => VerificationType::Double,
			Type::Object(name) => VerificationType::Object(name),
			Type::Array(descriptor) => VerificationType::Object(descriptor),
		}
	}
}

/// The locals of the implicit frame at the start of a method: `this` (uninitialized in constructors) for non static
/// methods, followed by the parameters.
pub(crate) fn initial_locals(class_name: &JavaStr, access: u32, name: &JavaStr, descriptor: &JavaStr) -> Result<Vec<VerificationType>> {
	let descriptor = parse_method_descriptor(descriptor)?;

	let mut locals = Vec::with_capacity(descriptor.parameters.len() + 1);
	if access & ACC_STATIC == 0 {
		if name.as_bytes() == b"<init>" {
			locals.push(VerificationType::UninitializedThis);
		} else {
			locals.push(VerificationType::Object(class_name.to_owned()));
		}
	}
	locals.extend(descriptor.parameters.into_iter().map(VerificationType::from));
	Ok(locals)
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use java_string::JavaStr;
	use pretty_assertions::assert_eq;
	use crate::tree::access::{ACC_PUBLIC, ACC_STATIC};
	use crate::tree::frame::{initial_locals, VerificationType};

	#[test]
	fn initial_frames() -> Result<()> {
		assert_eq!(
			initial_locals(JavaStr::from_str("Foo"), ACC_PUBLIC, JavaStr::from_str("<init>"), JavaStr::from_str("(J[ILjava/lang/String;)V"))?,
			vec![
				VerificationType::UninitializedThis,
				VerificationType::Long,
				VerificationType::Object("[I".into()),
				VerificationType::Object("java/lang/String".into()),
			]
		);
		assert_eq!(
			initial_locals(JavaStr::from_str("Foo"), ACC_PUBLIC, JavaStr::from_str("bar"), JavaStr::from_str("(ZF)D"))?,
			vec![VerificationType::Object("Foo".into()), VerificationType::Integer, VerificationType::Float]
		);
		assert_eq!(initial_locals(JavaStr::from_str("Foo"), ACC_STATIC, JavaStr::from_str("f"), JavaStr::from_str("()I"))?, vec![]);
		Ok(())
	}
}
