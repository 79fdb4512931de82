use thiserror::Error;
use crate::visitor::Api;

/// The kinds of errors reading or writing a class can fail with.
///
/// All functions of this crate return [`anyhow::Result`], with one of these as the root cause and context describing
/// the location attached to it. Use [`ClassError::find`] to get at the kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassError {
	#[error("bad magic {found:#010x}, expected 0xcafebabe")]
	BadMagic { found: u32 },
	#[error("unsupported class file version {major}.{minor}")]
	BadVersion { major: u16, minor: u16 },
	#[error("unknown constant pool tag {tag} at offset {at}")]
	BadConstantPoolTag { tag: u8, at: usize },
	#[error("unknown opcode {opcode:#04x} at bytecode offset {at}")]
	BadOpcode { opcode: u8, at: usize },
	#[error("unexpected end of data at offset {at_offset}")]
	Truncated { at_offset: usize },
	#[error("malformed modified utf8 string")]
	BadString,
	#[error("invalid constant pool index {index}")]
	BadIndex { index: u16 },
	#[error("constant pool entry {index} is a {found}, expected a {expected}")]
	BadKind { index: u16, expected: &'static str, found: &'static str },
	#[error("attribute {name} declares a length of {declared} bytes, but its content is {actual} bytes")]
	AttributeLengthMismatch { name: &'static str, declared: u32, actual: usize },
	#[error("bytecode offset {offset} is outside of the code")]
	BadLabelOffset { offset: i64 },
	#[error("unknown {what} tag {tag} at offset {at}")]
	Malformed { what: &'static str, tag: u8, at: usize },

	#[error("{construct} requires at least api {min_version:?}")]
	UnsupportedApi { construct: &'static str, min_version: Api },
	#[error("illegal visitor call order: expected {expected}, got {got}")]
	IllegalState { expected: &'static str, got: &'static str },
	#[error("label {label} was used but never placed in this method")]
	LabelUnresolved { label: u32 },
	#[error("exception handler {index} is invalid: {reason}")]
	BadExceptionHandler { index: usize, reason: &'static str },
	#[error("the branch of instruction {instruction} doesn't fit a 16 bit offset and branch widening is disabled")]
	BranchOverflow { instruction: usize },

	#[error("inconsistent frames at instruction {instruction}: {reason}")]
	FrameInconsistent { instruction: usize, reason: String },
	#[error("stack underflow at instruction {instruction}")]
	StackUnderflow { instruction: usize },
	#[error("cannot find the common super class of {a} and {b}")]
	HierarchyQueryFailed { a: String, b: String },
	#[error("{what} exceeds the limits of the class file format")]
	TooLarge { what: &'static str },
	#[error("computing frames is not supported for the experimental api {api:?}")]
	ExperimentalCompute { api: Api },
}

impl ClassError {
	/// Finds the [`ClassError`] in the chain of causes of `error`.
	pub fn find(error: &anyhow::Error) -> Option<&ClassError> {
		error.chain().find_map(|cause| cause.downcast_ref::<ClassError>())
	}
}
