//! Turns the buffered instructions of a method into bytecode.
//!
//! # Branch offsets
//! The maximum size of the bytecode is [`u16::MAX`], but instructions like `goto` or `ifeq` store their branch offset
//! as an [`i16`]. A jump from the front to the end of a large method doesn't fit.
//!
//! `goto` and `jsr` have wide forms, `goto_w` and `jsr_w`, with an [`i32`] offset. Conditional jumps don't, so
//! for those the writer replaces
//! ```txt,ignore
//! L2: if_x Lx
//! L3: ...
//! ```
//! with
//! ```txt,ignore
//! L2: if_not_x L3
//!     goto_w Lx
//! L3: ...
//! ```
//! where `if_not_x` has branching and not branching swapped.
//!
//! Such a replacement is longer than the original, which moves later instructions, so other jumps across it may now
//! need the wide form too. The code is written in attempts: each attempt reserves space for the offsets and patches
//! them at the end. If an offset doesn't fit the space reserved for it, that instruction gets the wide form in the
//! next attempt. Tableswitch and lookupswitch always use [`i32`] offsets.

use std::collections::BTreeSet;
use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use crate::{ClassError, ClassWrite};
use crate::class_constants::opcode;
use crate::class_writer::method::CodeBuffer;
use crate::class_writer::symbols::SymbolTable;
use crate::tree::code::{Instruction, Label};
use crate::tree::descriptor::parse_method_descriptor;

/// The bytecode of a method.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Assembled {
	pub(crate) code: Vec<u8>,
	/// The bytecode offset of each instruction, with the length of the code at the end.
	pub(crate) offsets: Vec<usize>,
	/// The indices of the instructions that use the wide form of their jump.
	pub(crate) widened: BTreeSet<usize>,
}

impl Assembled {
	/// The bytecode offset of the instruction at `index`, where the length of the instructions is the end of the code.
	pub(crate) fn offset(&self, index: usize) -> Result<u16> {
		let offset = self.offsets.get(index).copied()
			.ok_or_else(|| anyhow!("no instruction at index {index}"))?;
		u16::try_from(offset).map_err(|_| anyhow!(ClassError::TooLarge { what: "code" }))
	}

	pub(crate) fn label_offset(&self, code: &CodeBuffer, label: Label) -> Result<u16> {
		self.offset(code.position(label)?)
	}
}

/// Stores the information necessary for later inserting a [`Label`] as an [`i16`] or [`i32`].
struct UnwrittenLabel {
	/// The bytecode position the branch offset is relative to.
	opcode_pos: usize,
	/// The index of the instruction being written.
	instruction_index: usize,
	label: Label,
	/// The position to put the resolved offset at.
	label_write_pos: usize,
	/// If true, use an [`i32`], if false use an [`i16`].
	wide: bool,
}

/// The opcode that branches exactly when `opcode` doesn't.
fn inverted(opcode: u8) -> u8 {
	match opcode {
		opcode::IFNULL => opcode::IFNONNULL,
		opcode::IFNONNULL => opcode::IFNULL,
		// ifeq/ifne, iflt/ifge, ... come in pairs
		opcode => ((opcode - opcode::IFEQ) ^ 1) + opcode::IFEQ,
	}
}

fn align_to_4_byte_boundary(w: &mut Vec<u8>) -> Result<()> {
	const PADDING: [u8; 3] = [0; 3];
	let padding = (4 - (w.len() & 0b11)) & 0b11;
	w.write_u8_slice(&PADDING[..padding])
}

/// One attempt at writing the code.
struct Attempt<'c> {
	wide: &'c BTreeSet<usize>,
	w: Vec<u8>,
	offsets: Vec<usize>,
	unwritten: Vec<UnwrittenLabel>,
}

impl Attempt<'_> {
	fn jump(&mut self, opcode_pos: usize, instruction_index: usize, label: Label, opcode: u8) -> Result<()> {
		let wide = self.wide.contains(&instruction_index);
		match opcode {
			opcode::GOTO | opcode::JSR if wide => {
				self.unwritten.push(UnwrittenLabel {
					opcode_pos,
					instruction_index,
					label,
					// +1 for this opcode
					label_write_pos: opcode_pos + 1,
					wide: true,
				});
				self.w.write_u8(if opcode == opcode::GOTO { opcode::GOTO_W } else { opcode::JSR_W })?;
				self.w.write_i32(i32::MAX)
			},
			_ if wide => {
				self.unwritten.push(UnwrittenLabel {
					// relative to the goto_w: +1 for the inverted opcode, +2 for its branch
					opcode_pos: opcode_pos + 1 + 2,
					instruction_index,
					label,
					// +1 for the inverted opcode, +2 for its branch, +1 for the goto_w opcode
					label_write_pos: opcode_pos + 1 + 2 + 1,
					wide: true,
				});
				self.w.write_u8(inverted(opcode))?;
				// target the instruction after the goto_w
				self.w.write_i16(1 + 2 + 1 + 4)?;
				self.w.write_u8(opcode::GOTO_W)?;
				self.w.write_i32(i32::MAX)
			},
			_ => {
				self.unwritten.push(UnwrittenLabel {
					opcode_pos,
					instruction_index,
					label,
					label_write_pos: opcode_pos + 1,
					wide: false,
				});
				self.w.write_u8(opcode)?;
				self.w.write_i16(i16::MAX)
			},
		}
	}

	/// Reserves an [`i32`] for a switch target.
	fn switch_target(&mut self, opcode_pos: usize, instruction_index: usize, label: Label) -> Result<()> {
		self.unwritten.push(UnwrittenLabel {
			opcode_pos,
			instruction_index,
			label,
			label_write_pos: self.w.len(),
			wide: true,
		});
		self.w.write_i32(i32::MAX)
	}

	fn local(&mut self, opcode: u8, short_base: u8, base: u8, index: u16) -> Result<()> {
		let w = &mut self.w;
		if index < 4 {
			w.write_u8(((opcode - base) << 2 | index as u8) + short_base)
		} else if let Ok(index) = u8::try_from(index) {
			w.write_u8(opcode)?;
			w.write_u8(index)
		} else {
			w.write_u8(opcode::WIDE)?;
			w.write_u8(opcode)?;
			w.write_u16(index)
		}
	}

	fn instruction(&mut self, symbols: &mut SymbolTable, opcode_pos: usize, instruction_index: usize, instruction: &Instruction) -> Result<()> {
		let w = &mut self.w;
		match instruction {
			Instruction::Nop => w.write_u8(opcode::NOP)?,
			Instruction::AConstNull => w.write_u8(opcode::ACONST_NULL)?,
			Instruction::IConstM1 => w.write_u8(opcode::ICONST_M1)?,
			Instruction::IConst0 => w.write_u8(opcode::ICONST_0)?,
			Instruction::IConst1 => w.write_u8(opcode::ICONST_1)?,
			Instruction::IConst2 => w.write_u8(opcode::ICONST_2)?,
			Instruction::IConst3 => w.write_u8(opcode::ICONST_3)?,
			Instruction::IConst4 => w.write_u8(opcode::ICONST_4)?,
			Instruction::IConst5 => w.write_u8(opcode::ICONST_5)?,
			Instruction::LConst0 => w.write_u8(opcode::LCONST_0)?,
			Instruction::LConst1 => w.write_u8(opcode::LCONST_1)?,
			Instruction::FConst0 => w.write_u8(opcode::FCONST_0)?,
			Instruction::FConst1 => w.write_u8(opcode::FCONST_1)?,
			Instruction::FConst2 => w.write_u8(opcode::FCONST_2)?,
			Instruction::DConst0 => w.write_u8(opcode::DCONST_0)?,
			Instruction::DConst1 => w.write_u8(opcode::DCONST_1)?,
			&Instruction::BiPush(byte) => {
				w.write_u8(opcode::BIPUSH)?;
				w.write_i8(byte)?;
			},
			&Instruction::SiPush(short) => {
				w.write_u8(opcode::SIPUSH)?;
				w.write_i16(short)?;
			},
			Instruction::Ldc(loadable) => {
				let index = symbols.put_loadable(loadable)?;
				if loadable.is_wide() {
					w.write_u8(opcode::LDC2_W)?;
					w.write_u16(index)?;
				} else if let Ok(index) = u8::try_from(index) {
					w.write_u8(opcode::LDC)?;
					w.write_u8(index)?;
				} else {
					w.write_u8(opcode::LDC_W)?;
					w.write_u16(index)?;
				}
			},
			&Instruction::ILoad(index) => self.local(opcode::ILOAD, opcode::ILOAD_0, opcode::ILOAD, index)?,
			&Instruction::LLoad(index) => self.local(opcode::LLOAD, opcode::ILOAD_0, opcode::ILOAD, index)?,
			&Instruction::FLoad(index) => self.local(opcode::FLOAD, opcode::ILOAD_0, opcode::ILOAD, index)?,
			&Instruction::DLoad(index) => self.local(opcode::DLOAD, opcode::ILOAD_0, opcode::ILOAD, index)?,
			&Instruction::ALoad(index) => self.local(opcode::ALOAD, opcode::ILOAD_0, opcode::ILOAD, index)?,
			Instruction::IALoad => w.write_u8(opcode::IALOAD)?,
			Instruction::LALoad => w.write_u8(opcode::LALOAD)?,
			Instruction::FALoad => w.write_u8(opcode::FALOAD)?,
			Instruction::DALoad => w.write_u8(opcode::DALOAD)?,
			Instruction::AALoad => w.write_u8(opcode::AALOAD)?,
			Instruction::BALoad => w.write_u8(opcode::BALOAD)?,
			Instruction::CALoad => w.write_u8(opcode::CALOAD)?,
			Instruction::SALoad => w.write_u8(opcode::SALOAD)?,
			&Instruction::IStore(index) => self.local(opcode::ISTORE, opcode::ISTORE_0, opcode::ISTORE, index)?,
			&Instruction::LStore(index) => self.local(opcode::LSTORE, opcode::ISTORE_0, opcode::ISTORE, index)?,
			&Instruction::FStore(index) => self.local(opcode::FSTORE, opcode::ISTORE_0, opcode::ISTORE, index)?,
			&Instruction::DStore(index) => self.local(opcode::DSTORE, opcode::ISTORE_0, opcode::ISTORE, index)?,
			&Instruction::AStore(index) => self.local(opcode::ASTORE, opcode::ISTORE_0, opcode::ISTORE, index)?,
			Instruction::IAStore => w.write_u8(opcode::IASTORE)?,
			Instruction::LAStore => w.write_u8(opcode::LASTORE)?,
			Instruction::FAStore => w.write_u8(opcode::FASTORE)?,
			Instruction::DAStore => w.write_u8(opcode::DASTORE)?,
			Instruction::AAStore => w.write_u8(opcode::AASTORE)?,
			Instruction::BAStore => w.write_u8(opcode::BASTORE)?,
			Instruction::CAStore => w.write_u8(opcode::CASTORE)?,
			Instruction::SAStore => w.write_u8(opcode::SASTORE)?,
			Instruction::Pop     => w.write_u8(opcode::POP)?,
			Instruction::Pop2    => w.write_u8(opcode::POP2)?,
			Instruction::Dup     => w.write_u8(opcode::DUP)?,
			Instruction::DupX1   => w.write_u8(opcode::DUP_X1)?,
			Instruction::DupX2   => w.write_u8(opcode::DUP_X2)?,
			Instruction::Dup2    => w.write_u8(opcode::DUP2)?,
			Instruction::Dup2X1  => w.write_u8(opcode::DUP2_X1)?,
			Instruction::Dup2X2  => w.write_u8(opcode::DUP2_X2)?,
			Instruction::Swap    => w.write_u8(opcode::SWAP)?,
			Instruction::IAdd    => w.write_u8(opcode::IADD)?,
			Instruction::LAdd    => w.write_u8(opcode::LADD)?,
			Instruction::FAdd    => w.write_u8(opcode::FADD)?,
			Instruction::DAdd    => w.write_u8(opcode::DADD)?,
			Instruction::ISub    => w.write_u8(opcode::ISUB)?,
			Instruction::LSub    => w.write_u8(opcode::LSUB)?,
			Instruction::FSub    => w.write_u8(opcode::FSUB)?,
			Instruction::DSub    => w.write_u8(opcode::DSUB)?,
			Instruction::IMul    => w.write_u8(opcode::IMUL)?,
			Instruction::LMul    => w.write_u8(opcode::LMUL)?,
			Instruction::FMul    => w.write_u8(opcode::FMUL)?,
			Instruction::DMul    => w.write_u8(opcode::DMUL)?,
			Instruction::IDiv    => w.write_u8(opcode::IDIV)?,
			Instruction::LDiv    => w.write_u8(opcode::LDIV)?,
			Instruction::FDiv    => w.write_u8(opcode::FDIV)?,
			Instruction::DDiv    => w.write_u8(opcode::DDIV)?,
			Instruction::IRem    => w.write_u8(opcode::IREM)?,
			Instruction::LRem    => w.write_u8(opcode::LREM)?,
			Instruction::FRem    => w.write_u8(opcode::FREM)?,
			Instruction::DRem    => w.write_u8(opcode::DREM)?,
			Instruction::INeg    => w.write_u8(opcode::INEG)?,
			Instruction::LNeg    => w.write_u8(opcode::LNEG)?,
			Instruction::FNeg    => w.write_u8(opcode::FNEG)?,
			Instruction::DNeg    => w.write_u8(opcode::DNEG)?,
			Instruction::IShl    => w.write_u8(opcode::ISHL)?,
			Instruction::LShl    => w.write_u8(opcode::LSHL)?,
			Instruction::IShr    => w.write_u8(opcode::ISHR)?,
			Instruction::LShr    => w.write_u8(opcode::LSHR)?,
			Instruction::IUShr   => w.write_u8(opcode::IUSHR)?,
			Instruction::LUShr   => w.write_u8(opcode::LUSHR)?,
			Instruction::IAnd    => w.write_u8(opcode::IAND)?,
			Instruction::LAnd    => w.write_u8(opcode::LAND)?,
			Instruction::IOr     => w.write_u8(opcode::IOR)?,
			Instruction::LOr     => w.write_u8(opcode::LOR)?,
			Instruction::IXor    => w.write_u8(opcode::IXOR)?,
			Instruction::LXor    => w.write_u8(opcode::LXOR)?,
			&Instruction::IInc(index, value) => {
				if let (Ok(index), Ok(value)) = (u8::try_from(index), i8::try_from(value)) {
					w.write_u8(opcode::IINC)?;
					w.write_u8(index)?;
					w.write_i8(value)?;
				} else {
					w.write_u8(opcode::WIDE)?;
					w.write_u8(opcode::IINC)?;
					w.write_u16(index)?;
					w.write_i16(value)?;
				}
			},
			Instruction::I2L   => w.write_u8(opcode::I2L)?,
			Instruction::I2F   => w.write_u8(opcode::I2F)?,
			Instruction::I2D   => w.write_u8(opcode::I2D)?,
			Instruction::L2I   => w.write_u8(opcode::L2I)?,
			Instruction::L2F   => w.write_u8(opcode::L2F)?,
			Instruction::L2D   => w.write_u8(opcode::L2D)?,
			Instruction::F2I   => w.write_u8(opcode::F2I)?,
			Instruction::F2L   => w.write_u8(opcode::F2L)?,
			Instruction::F2D   => w.write_u8(opcode::F2D)?,
			Instruction::D2I   => w.write_u8(opcode::D2I)?,
			Instruction::D2L   => w.write_u8(opcode::D2L)?,
			Instruction::D2F   => w.write_u8(opcode::D2F)?,
			Instruction::I2B   => w.write_u8(opcode::I2B)?,
			Instruction::I2C   => w.write_u8(opcode::I2C)?,
			Instruction::I2S   => w.write_u8(opcode::I2S)?,
			Instruction::LCmp  => w.write_u8(opcode::LCMP)?,
			Instruction::FCmpL => w.write_u8(opcode::FCMPL)?,
			Instruction::FCmpG => w.write_u8(opcode::FCMPG)?,
			Instruction::DCmpL => w.write_u8(opcode::DCMPL)?,
			Instruction::DCmpG => w.write_u8(opcode::DCMPG)?,
			&Instruction::IfEq(label) => self.jump(opcode_pos, instruction_index, label, opcode::IFEQ)?,
			&Instruction::IfNe(label) => self.jump(opcode_pos, instruction_index, label, opcode::IFNE)?,
			&Instruction::IfLt(label) => self.jump(opcode_pos, instruction_index, label, opcode::IFLT)?,
			&Instruction::IfGe(label) => self.jump(opcode_pos, instruction_index, label, opcode::IFGE)?,
			&Instruction::IfGt(label) => self.jump(opcode_pos, instruction_index, label, opcode::IFGT)?,
			&Instruction::IfLe(label) => self.jump(opcode_pos, instruction_index, label, opcode::IFLE)?,
			&Instruction::IfICmpEq(label) => self.jump(opcode_pos, instruction_index, label, opcode::IF_ICMPEQ)?,
			&Instruction::IfICmpNe(label) => self.jump(opcode_pos, instruction_index, label, opcode::IF_ICMPNE)?,
			&Instruction::IfICmpLt(label) => self.jump(opcode_pos, instruction_index, label, opcode::IF_ICMPLT)?,
			&Instruction::IfICmpGe(label) => self.jump(opcode_pos, instruction_index, label, opcode::IF_ICMPGE)?,
			&Instruction::IfICmpGt(label) => self.jump(opcode_pos, instruction_index, label, opcode::IF_ICMPGT)?,
			&Instruction::IfICmpLe(label) => self.jump(opcode_pos, instruction_index, label, opcode::IF_ICMPLE)?,
			&Instruction::IfACmpEq(label) => self.jump(opcode_pos, instruction_index, label, opcode::IF_ACMPEQ)?,
			&Instruction::IfACmpNe(label) => self.jump(opcode_pos, instruction_index, label, opcode::IF_ACMPNE)?,
			&Instruction::Goto(label) => self.jump(opcode_pos, instruction_index, label, opcode::GOTO)?,
			&Instruction::Jsr(label) => self.jump(opcode_pos, instruction_index, label, opcode::JSR)?,
			&Instruction::Ret(index) => {
				if let Ok(index) = u8::try_from(index) {
					w.write_u8(opcode::RET)?;
					w.write_u8(index)?;
				} else {
					w.write_u8(opcode::WIDE)?;
					w.write_u8(opcode::RET)?;
					w.write_u16(index)?;
				}
			},
			&Instruction::TableSwitch { default, low, high, ref table } => {
				if low > high {
					bail!("`low` must be lower or equal to `high`");
				}
				let n = (high as i64 - low as i64 + 1) as usize;
				if table.len() != n {
					bail!("`low` and `high` bounds don't span a range of the size of the table: table has {}, high and low define {n}", table.len());
				}

				w.write_u8(opcode::TABLESWITCH)?;
				align_to_4_byte_boundary(w)?;
				self.switch_target(opcode_pos, instruction_index, default)?;
				self.w.write_i32(low)?;
				self.w.write_i32(high)?;
				for &entry in table {
					self.switch_target(opcode_pos, instruction_index, entry)?;
				}
			},
			Instruction::LookupSwitch { default, pairs } => {
				if !pairs.windows(2).all(|x| x[0].0 < x[1].0) {
					bail!("`pairs` must be sorted by key");
				}

				w.write_u8(opcode::LOOKUPSWITCH)?;
				align_to_4_byte_boundary(w)?;
				self.switch_target(opcode_pos, instruction_index, *default)?;
				let n = i32::try_from(pairs.len())
					.with_context(|| anyhow!("`npairs` doesn't fit in i32, it's {:?}", pairs.len()))?;
				self.w.write_i32(n)?;
				for &(key, label) in pairs {
					self.w.write_i32(key)?;
					self.switch_target(opcode_pos, instruction_index, label)?;
				}
			},
			Instruction::IReturn => w.write_u8(opcode::IRETURN)?,
			Instruction::LReturn => w.write_u8(opcode::LRETURN)?,
			Instruction::FReturn => w.write_u8(opcode::FRETURN)?,
			Instruction::DReturn => w.write_u8(opcode::DRETURN)?,
			Instruction::AReturn => w.write_u8(opcode::ARETURN)?,
			Instruction::Return  => w.write_u8(opcode::RETURN)?,
			Instruction::GetStatic(field_ref) => {
				w.write_u8(opcode::GETSTATIC)?;
				w.write_u16(symbols.put_field_ref(field_ref)?)?;
			},
			Instruction::PutStatic(field_ref) => {
				w.write_u8(opcode::PUTSTATIC)?;
				w.write_u16(symbols.put_field_ref(field_ref)?)?;
			},
			Instruction::GetField(field_ref) => {
				w.write_u8(opcode::GETFIELD)?;
				w.write_u16(symbols.put_field_ref(field_ref)?)?;
			},
			Instruction::PutField(field_ref) => {
				w.write_u8(opcode::PUTFIELD)?;
				w.write_u16(symbols.put_field_ref(field_ref)?)?;
			},
			Instruction::InvokeVirtual(method_ref) => {
				w.write_u8(opcode::INVOKEVIRTUAL)?;
				w.write_u16(symbols.put_method_ref(method_ref, false)?)?;
			},
			&Instruction::InvokeSpecial(ref method_ref, interface) => {
				w.write_u8(opcode::INVOKESPECIAL)?;
				w.write_u16(symbols.put_method_ref(method_ref, interface)?)?;
			},
			&Instruction::InvokeStatic(ref method_ref, interface) => {
				w.write_u8(opcode::INVOKESTATIC)?;
				w.write_u16(symbols.put_method_ref(method_ref, interface)?)?;
			},
			Instruction::InvokeInterface(method_ref) => {
				let count = parse_method_descriptor(&method_ref.descriptor)?.arguments_size() + 1;
				w.write_u8(opcode::INVOKEINTERFACE)?;
				w.write_u16(symbols.put_method_ref(method_ref, true)?)?;
				w.write_usize_as_u8(count).with_context(|| anyhow!("too many arguments for invokeinterface"))?;
				w.write_u8(0)?; // zero
			},
			Instruction::InvokeDynamic(invoke_dynamic) => {
				w.write_u8(opcode::INVOKEDYNAMIC)?;
				w.write_u16(symbols.put_invoke_dynamic(invoke_dynamic)?)?;
				w.write_u8(0)?; // zero
				w.write_u8(0)?; // zero
			},
			Instruction::New(class) => {
				w.write_u8(opcode::NEW)?;
				w.write_u16(symbols.put_class(class)?)?;
			},
			Instruction::NewArray(array_type) => {
				w.write_u8(opcode::NEWARRAY)?;
				w.write_u8(array_type.to_atype())?;
			},
			Instruction::ANewArray(class) => {
				w.write_u8(opcode::ANEWARRAY)?;
				w.write_u16(symbols.put_class(class)?)?;
			},
			Instruction::ArrayLength => w.write_u8(opcode::ARRAYLENGTH)?,
			Instruction::AThrow      => w.write_u8(opcode::ATHROW)?,
			Instruction::CheckCast(class) => {
				w.write_u8(opcode::CHECKCAST)?;
				w.write_u16(symbols.put_class(class)?)?;
			},
			Instruction::InstanceOf(class) => {
				w.write_u8(opcode::INSTANCEOF)?;
				w.write_u16(symbols.put_class(class)?)?;
			},
			Instruction::MonitorEnter => w.write_u8(opcode::MONITORENTER)?,
			Instruction::MonitorExit  => w.write_u8(opcode::MONITOREXIT)?,
			&Instruction::MultiANewArray(ref class, dimensions) => {
				w.write_u8(opcode::MULTIANEWARRAY)?;
				w.write_u16(symbols.put_class(class)?)?;
				w.write_u8(dimensions)?;
			},
			&Instruction::IfNull(label) => self.jump(opcode_pos, instruction_index, label, opcode::IFNULL)?,
			&Instruction::IfNonNull(label) => self.jump(opcode_pos, instruction_index, label, opcode::IFNONNULL)?,
		}
		Ok(())
	}
}

fn put_i16_at(w: &mut [u8], pos: usize, value: i16) {
	w[pos..pos + 2].copy_from_slice(&value.to_be_bytes());
}

fn put_i32_at(w: &mut [u8], pos: usize, value: i32) {
	w[pos..pos + 4].copy_from_slice(&value.to_be_bytes());
}

/// Writes the instructions of `code`, interning the constants they use in `symbols`.
///
/// With `widen_branches` disabled, a jump that doesn't fit a 16 bit offset fails with
/// [`ClassError::BranchOverflow`].
pub(crate) fn assemble(code: &CodeBuffer, symbols: &mut SymbolTable, widen_branches: bool) -> Result<Assembled> {
	// Indices of our input instructions, these are constant over multiple write attempts.
	let mut wide: BTreeSet<usize> = BTreeSet::new();

	// Each run here is one attempt.
	'attempt: loop {
		let mut attempt = Attempt {
			wide: &wide,
			w: Vec::new(),
			offsets: Vec::with_capacity(code.instructions.len() + 1),
			unwritten: Vec::new(),
		};

		for (instruction_index, instruction) in code.instructions.iter().enumerate() {
			let opcode_pos = attempt.w.len();
			attempt.offsets.push(opcode_pos);
			attempt.instruction(symbols, opcode_pos, instruction_index, instruction)
				.with_context(|| anyhow!("while writing the instruction {instruction:?}"))?;
		}
		attempt.offsets.push(attempt.w.len());

		let Attempt { mut w, offsets, unwritten, .. } = attempt;
		for unwritten in unwritten {
			let target = offsets[code.position(unwritten.label)?];
			let branch = target as i64 - unwritten.opcode_pos as i64;

			if unwritten.wide {
				let branch = i32::try_from(branch).map_err(|_| anyhow!(ClassError::TooLarge { what: "code" }))?;
				put_i32_at(&mut w, unwritten.label_write_pos, branch);
			} else if let Ok(branch) = i16::try_from(branch) {
				put_i16_at(&mut w, unwritten.label_write_pos, branch);
			} else if widen_branches {
				// The branch doesn't fit into the space reserved for it, try again with the wide form.
				debug!("widening the jump of instruction {}", unwritten.instruction_index);
				wide.insert(unwritten.instruction_index);
				continue 'attempt;
			} else {
				bail!(ClassError::BranchOverflow { instruction: unwritten.instruction_index });
			}
		}

		if w.len() > u16::MAX as usize {
			bail!(ClassError::TooLarge { what: "code" });
		}

		return Ok(Assembled { code: w, offsets, widened: wide });
	}
}

/// Overwrites the instructions in `range` (instruction indices) with `nop`s followed by an `athrow`.
pub(crate) fn replace_with_athrow(assembled: &mut Assembled, range: std::ops::Range<usize>) {
	let start = assembled.offsets[range.start];
	let end = assembled.offsets[range.end];
	if end > start {
		assembled.code[start..end - 1].fill(opcode::NOP);
		assembled.code[end - 1] = opcode::ATHROW;
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::ClassError;
	use crate::class_writer::assembler::{assemble, inverted, replace_with_athrow};
	use crate::class_writer::method::CodeBuffer;
	use crate::class_writer::symbols::SymbolTable;
	use crate::class_constants::opcode;
	use crate::tree::code::{Instruction, Loadable};

	fn long_jump(jump: fn(crate::tree::code::Label) -> Instruction) -> CodeBuffer {
		let mut code = CodeBuffer::default();
		let target = code.labels.next_label();
		code.instructions.push(jump(target));
		code.instructions.extend(std::iter::repeat(Instruction::Nop).take(40001));
		code.label_positions.insert(target, code.instructions.len());
		code.instructions.push(Instruction::Return);
		code
	}

	#[test]
	fn inverted_opcodes() {
		assert_eq!(inverted(opcode::IFEQ), opcode::IFNE);
		assert_eq!(inverted(opcode::IFNE), opcode::IFEQ);
		assert_eq!(inverted(opcode::IF_ICMPLT), opcode::IF_ICMPGE);
		assert_eq!(inverted(opcode::IF_ACMPNE), opcode::IF_ACMPEQ);
		assert_eq!(inverted(opcode::IFNULL), opcode::IFNONNULL);
	}

	#[test]
	fn goto_widening() -> Result<()> {
		let code = long_jump(Instruction::Goto);
		let assembled = assemble(&code, &mut SymbolTable::new(), true)?;
		assert_eq!(&assembled.code[..5], &[0xc8, 0x00, 0x00, 0x9c, 0x46]);
		assert_eq!(assembled.code.len(), 5 + 40001 + 1);
		assert_eq!(assembled.widened.into_iter().collect::<Vec<_>>(), vec![0]);
		Ok(())
	}

	#[test]
	fn conditional_widening() -> Result<()> {
		let code = long_jump(Instruction::IfEq);
		let assembled = assemble(&code, &mut SymbolTable::new(), true)?;
		// ifne +8, goto_w to the return, 40001 - 3 bytes after the goto_w
		assert_eq!(&assembled.code[..8], &[opcode::IFNE, 0x00, 0x08, opcode::GOTO_W, 0x00, 0x00, 0x9c, 0x46]);
		assert_eq!(assembled.offsets[1], 8);
		Ok(())
	}

	#[test]
	fn widening_disabled() {
		let code = long_jump(Instruction::Goto);
		let error = assemble(&code, &mut SymbolTable::new(), false).unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::BranchOverflow { instruction: 0 }));
	}

	#[test]
	fn local_variable_forms() -> Result<()> {
		let mut code = CodeBuffer::default();
		code.instructions = vec![
			Instruction::ILoad(0),
			Instruction::ALoad(3),
			Instruction::DStore(2),
			Instruction::LLoad(7),
			Instruction::IStore(300),
			Instruction::IInc(1, -1),
			Instruction::IInc(1, 200),
		];
		let assembled = assemble(&code, &mut SymbolTable::new(), true)?;
		assert_eq!(assembled.code, vec![
			opcode::ILOAD_0,
			opcode::ALOAD_3,
			0x49, // dstore_2
			opcode::LLOAD, 7,
			opcode::WIDE, opcode::ISTORE, 0x01, 0x2c,
			opcode::IINC, 1, 0xff,
			opcode::WIDE, opcode::IINC, 0x00, 0x01, 0x00, 0xc8,
		]);
		Ok(())
	}

	#[test]
	fn switch_padding() -> Result<()> {
		let mut code = CodeBuffer::default();
		let default = code.labels.next_label();
		let one = code.labels.next_label();
		code.instructions = vec![
			Instruction::ILoad(0),
			Instruction::TableSwitch { default, low: 1, high: 1, table: vec![one] },
			Instruction::Return,
			Instruction::Return,
		];
		code.label_positions.insert(default, 2);
		code.label_positions.insert(one, 3);
		let assembled = assemble(&code, &mut SymbolTable::new(), true)?;
		// the tableswitch is at 1, two bytes of padding, default, low, high and one entry
		assert_eq!(assembled.offsets, vec![0, 1, 20, 21, 22]);
		assert_eq!(&assembled.code[1..20], &[
			opcode::TABLESWITCH, 0, 0,
			0, 0, 0, 19,
			0, 0, 0, 1,
			0, 0, 0, 1,
			0, 0, 0, 20,
		]);
		Ok(())
	}

	#[test]
	fn ldc_forms() -> Result<()> {
		let mut symbols = SymbolTable::new();
		let mut code = CodeBuffer::default();
		code.instructions = vec![
			Instruction::Ldc(Loadable::Integer(100_000)),
			Instruction::Ldc(Loadable::Long(1)),
		];
		let assembled = assemble(&code, &mut symbols, true)?;
		assert_eq!(assembled.code, vec![opcode::LDC, 1, opcode::LDC2_W, 0, 2]);

		for i in 0..300 {
			symbols.put_integer(i)?;
		}
		code.instructions = vec![Instruction::Ldc(Loadable::Integer(1_000_000))];
		let assembled = assemble(&code, &mut symbols, true)?;
		assert_eq!(assembled.code[0], opcode::LDC_W);
		Ok(())
	}

	#[test]
	fn unreachable_replacement() -> Result<()> {
		let mut code = CodeBuffer::default();
		code.instructions = vec![Instruction::Return, Instruction::ILoad(5), Instruction::IReturn];
		let mut assembled = assemble(&code, &mut SymbolTable::new(), true)?;
		replace_with_athrow(&mut assembled, 1..3);
		assert_eq!(assembled.code, vec![opcode::RETURN, opcode::NOP, opcode::NOP, opcode::ATHROW]);
		Ok(())
	}
}
