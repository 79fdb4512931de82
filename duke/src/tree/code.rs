use anyhow::{bail, Result};
use java_string::JavaString;
use crate::class_constants::atype;
use crate::ClassError;

/// Represents a bytecode offset of an instruction using a method-local id.
///
/// Labels are created by [`MethodVisitor::new_label`][crate::visitor::method::MethodVisitor::new_label] and are only
/// valid in the method of the visitor that created them.
///
/// Note that the length of the code is also a valid position for a label. It's used for the end of exception handler
/// ranges and local variable ranges.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
	pub(crate) id: u32,
}

impl Label {
	pub fn id(self) -> u32 {
		self.id
	}
}

/// Hands out consecutive labels.
#[derive(Debug, Default, Clone)]
pub struct LabelGenerator {
	next: u32,
}

impl LabelGenerator {
	pub fn next_label(&mut self) -> Label {
		let label = Label { id: self.next };
		self.next += 1;
		label
	}

	/// The number of labels handed out so far.
	pub fn len(&self) -> u32 {
		self.next
	}

	pub fn is_empty(&self) -> bool {
		self.next == 0
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
	pub class: JavaString,
	pub name: JavaString,
	pub descriptor: JavaString,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
	pub class: JavaString,
	pub name: JavaString,
	pub descriptor: JavaString,
}

/// An entry of the `LocalVariableTable`, together with its signature from the `LocalVariableTypeTable`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable {
	pub name: JavaString,
	pub descriptor: JavaString,
	pub signature: Option<JavaString>,
	/// Inclusive.
	pub start: Label,
	/// Exclusive.
	pub end: Label,
	pub index: u16,
}

/// Represents an instruction of the JVM.
///
/// Each instruction can either:
/// - hold no additional data, like [`Instruction::Nop`],
/// - hold some immediate value, like [`Instruction::BiPush`],
/// - hold a local variable index, like [`Instruction::ILoad`] (note that this also represents the `iload_0` instruction
///   and the `wide` form),
/// - hold a [`Label`] for jumps, like [`Instruction::IfEq`],
/// - or hold other data the instruction needs.
///
/// `goto_w` and `jsr_w` are read as [`Instruction::Goto`] and [`Instruction::Jsr`], the writer picks the wide form
/// when the offset requires it.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
	Nop,
	AConstNull,
	IConstM1, IConst0, IConst1, IConst2, IConst3, IConst4, IConst5,
	LConst0, LConst1,
	FConst0, FConst1, FConst2,
	DConst0, DConst1,
	BiPush(i8),
	SiPush(i16),
	/// Represents `ldc`, `ldc_w` and `ldc2_w`.
	Ldc(Loadable),
	ILoad(u16), LLoad(u16), FLoad(u16), DLoad(u16), ALoad(u16),
	IALoad, LALoad, FALoad, DALoad, AALoad, BALoad, CALoad, SALoad,
	IStore(u16), LStore(u16), FStore(u16), DStore(u16), AStore(u16),
	IAStore, LAStore, FAStore, DAStore, AAStore, BAStore, CAStore, SAStore,
	Pop, Pop2,
	Dup, DupX1, DupX2,
	Dup2, Dup2X1, Dup2X2,
	Swap,
	IAdd, LAdd, FAdd, DAdd,
	ISub, LSub, FSub, DSub,
	IMul, LMul, FMul, DMul,
	IDiv, LDiv, FDiv, DDiv,
	IRem, LRem, FRem, DRem,
	INeg, LNeg, FNeg, DNeg,
	IShl, LShl,
	IShr, LShr,
	IUShr, LUShr,
	IAnd, LAnd,
	IOr, LOr,
	IXor, LXor,
	IInc(u16, i16),
	I2L, I2F, I2D,
	L2I, L2F, L2D,
	F2I, F2L, F2D,
	D2I, D2L, D2F,
	I2B, I2C, I2S,
	LCmp,
	FCmpL, FCmpG,
	DCmpL, DCmpG,
	IfEq(Label), IfNe(Label), IfLt(Label), IfGe(Label), IfGt(Label), IfLe(Label),
	IfICmpEq(Label), IfICmpNe(Label), IfICmpLt(Label), IfICmpGe(Label), IfICmpGt(Label), IfICmpLe(Label),
	IfACmpEq(Label), IfACmpNe(Label),
	Goto(Label),
	Jsr(Label),
	Ret(u16),
	TableSwitch {
		default: Label,
		low: i32,
		high: i32,
		table: Vec<Label>,
	},
	LookupSwitch {
		default: Label,
		/// Note that these must be ordered by key.
		pairs: Vec<(i32, Label)>,
	},
	IReturn, LReturn, FReturn, DReturn, AReturn,
	Return,
	GetStatic(FieldRef),
	PutStatic(FieldRef),
	GetField(FieldRef),
	PutField(FieldRef),
	InvokeVirtual(MethodRef),
	/// The bool is `true` iff it's on an interface, so if it referenced an `InterfaceMethodref` constant pool entry.
	InvokeSpecial(MethodRef, bool),
	/// The bool is `true` iff it's on an interface, so if it referenced an `InterfaceMethodref` constant pool entry.
	InvokeStatic(MethodRef, bool),
	/// `invokeinterface` always uses an `InterfaceMethodref` constant pool entry.
	InvokeInterface(MethodRef),
	InvokeDynamic(InvokeDynamic),
	New(JavaString),
	NewArray(ArrayType),
	ANewArray(JavaString),
	ArrayLength,
	AThrow,
	CheckCast(JavaString),
	InstanceOf(JavaString),
	MonitorEnter, MonitorExit,
	MultiANewArray(JavaString, u8),
	IfNull(Label), IfNonNull(Label),
}

impl Instruction {
	/// The jump target of a branch instruction, if this is one. Switches are not included.
	pub(crate) fn jump_target(&self) -> Option<Label> {
		match *self {
			Instruction::IfEq(label) | Instruction::IfNe(label) | Instruction::IfLt(label) |
			Instruction::IfGe(label) | Instruction::IfGt(label) | Instruction::IfLe(label) |
			Instruction::IfICmpEq(label) | Instruction::IfICmpNe(label) | Instruction::IfICmpLt(label) |
			Instruction::IfICmpGe(label) | Instruction::IfICmpGt(label) | Instruction::IfICmpLe(label) |
			Instruction::IfACmpEq(label) | Instruction::IfACmpNe(label) |
			Instruction::IfNull(label) | Instruction::IfNonNull(label) |
			Instruction::Goto(label) | Instruction::Jsr(label) => Some(label),
			_ => None,
		}
	}

	/// All labels this instruction jumps to.
	pub(crate) fn targets(&self) -> Vec<Label> {
		match self {
			Instruction::TableSwitch { default, table, .. } => {
				std::iter::once(*default).chain(table.iter().copied()).collect()
			},
			Instruction::LookupSwitch { default, pairs } => {
				std::iter::once(*default).chain(pairs.iter().map(|&(_, label)| label)).collect()
			},
			instruction => instruction.jump_target().into_iter().collect(),
		}
	}

	/// Returns `true` if execution never continues with the next instruction.
	pub(crate) fn is_unconditional(&self) -> bool {
		matches!(self,
			Instruction::Goto(_) | Instruction::Ret(_) |
			Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. } |
			Instruction::IReturn | Instruction::LReturn | Instruction::FReturn |
			Instruction::DReturn | Instruction::AReturn | Instruction::Return |
			Instruction::AThrow
		)
	}

	/// Returns `true` if this is a conditional jump.
	pub(crate) fn is_conditional(&self) -> bool {
		self.jump_target().is_some() && !matches!(self, Instruction::Goto(_) | Instruction::Jsr(_))
	}

	/// Returns `true` if this instruction needs a constant dynamic entry in the constant pool.
	pub(crate) fn uses_constant_dynamic(&self) -> bool {
		match self {
			Instruction::Ldc(loadable) => loadable.uses_constant_dynamic(),
			Instruction::InvokeDynamic(invoke_dynamic) => invoke_dynamic.arguments.iter().any(Loadable::uses_constant_dynamic),
			_ => false,
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Loadable {
	Integer(i32),
	Float(f32),
	Long(i64),
	Double(f64),
	Class(JavaString),
	String(JavaString),
	MethodHandle(Handle),
	MethodType(JavaString),
	Dynamic(ConstantDynamic),
}

impl Loadable {
	/// Returns `true` if this takes two slots on the operand stack, and needs `ldc2_w`.
	pub(crate) fn is_wide(&self) -> bool {
		match self {
			Loadable::Long(_) | Loadable::Double(_) => true,
			Loadable::Dynamic(dynamic) => dynamic.descriptor.starts_with('J') || dynamic.descriptor.starts_with('D'),
			_ => false,
		}
	}

	fn uses_constant_dynamic(&self) -> bool {
		matches!(self, Loadable::Dynamic(_))
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Handle {
	GetField(FieldRef),
	GetStatic(FieldRef),
	PutField(FieldRef),
	PutStatic(FieldRef),
	InvokeVirtual(MethodRef),
	/// The bool is `true` iff the reference is an `InterfaceMethodref`.
	InvokeStatic(MethodRef, bool),
	/// The bool is `true` iff the reference is an `InterfaceMethodref`.
	InvokeSpecial(MethodRef, bool),
	NewInvokeSpecial(MethodRef),
	InvokeInterface(MethodRef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDynamic {
	pub name: JavaString,
	pub descriptor: JavaString,
	pub handle: Handle,
	pub arguments: Vec<Loadable>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvokeDynamic {
	pub name: JavaString,
	pub descriptor: JavaString,
	pub handle: Handle,
	pub arguments: Vec<Loadable>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArrayType {
	Boolean,
	Char,
	Float,
	Double,
	Byte,
	Short,
	Int,
	Long,
}

impl ArrayType {
	pub(crate) fn from_atype(atype: u8, at: usize) -> Result<ArrayType> {
		match atype {
			atype::T_BOOLEAN => Ok(ArrayType::Boolean),
			atype::T_CHAR    => Ok(ArrayType::Char),
			atype::T_FLOAT   => Ok(ArrayType::Float),
			atype::T_DOUBLE  => Ok(ArrayType::Double),
			atype::T_BYTE    => Ok(ArrayType::Byte),
			atype::T_SHORT   => Ok(ArrayType::Short),
			atype::T_INT     => Ok(ArrayType::Int),
			atype::T_LONG    => Ok(ArrayType::Long),
			tag => bail!(ClassError::Malformed { what: "newarray atype", tag, at }),
		}
	}

	pub(crate) fn to_atype(self) -> u8 {
		match self {
			ArrayType::Boolean => atype::T_BOOLEAN,
			ArrayType::Char    => atype::T_CHAR,
			ArrayType::Float   => atype::T_FLOAT,
			ArrayType::Double  => atype::T_DOUBLE,
			ArrayType::Byte    => atype::T_BYTE,
			ArrayType::Short   => atype::T_SHORT,
			ArrayType::Int     => atype::T_INT,
			ArrayType::Long    => atype::T_LONG,
		}
	}

	/// The descriptor of an array with this element type.
	pub(crate) fn array_descriptor(self) -> &'static str {
		match self {
			ArrayType::Boolean => "[Z",
			ArrayType::Char    => "[C",
			ArrayType::Float   => "[F",
			ArrayType::Double  => "[D",
			ArrayType::Byte    => "[B",
			ArrayType::Short   => "[S",
			ArrayType::Int     => "[I",
			ArrayType::Long    => "[J",
		}
	}
}
