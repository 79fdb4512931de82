use std::collections::{BTreeMap, HashMap};
use std::ops::ControlFlow;
use anyhow::{anyhow, bail, Context, Result};
use java_string::{JavaStr, JavaString};
use log::trace;
use crate::{ByteReader, ClassError, ClassRead, ReadFlags};
use crate::class_constants::{attribute, opcode};
use crate::class_reader::annotation::{read_element_value_pairs, read_target, read_type_path, skip_element_value_pairs, TargetPosition};
use crate::class_reader::frames::read_frames;
use crate::class_reader::labels::Labels;
use crate::class_reader::pool::PoolRead;
use crate::class_reader::read_attribute;
use crate::tree::attribute::Attribute;
use crate::tree::code::{ArrayType, Instruction, Label, LocalVariable};
use crate::tree::frame::{initial_locals, Frame};
use crate::tree::type_annotation::{TypePath, TypeReference};
use crate::visitor::Api;
use crate::visitor::method::MethodVisitor;

/// The method whose code is read.
pub(crate) struct MethodInfo<'r> {
	pub(crate) class_name: &'r JavaStr,
	pub(crate) access: u32,
	pub(crate) name: &'r JavaStr,
	pub(crate) descriptor: &'r JavaStr,
	pub(crate) flags: ReadFlags,
	pub(crate) api: Api,
}

struct TryCatchBlock {
	start: Label,
	end: Label,
	handler: Label,
	catch_type: Option<JavaString>,
}

struct LocalVariableEntry {
	start_pc: u16,
	length: u16,
	index: u16,
	name: JavaString,
	descriptor: JavaString,
	start: Label,
	end: Label,
}

/// A type annotation inside the code, with the reader left at its element value pairs.
struct CodeTypeAnnotation<'a> {
	type_reference: TypeReference,
	type_path: TypePath,
	descriptor: JavaString,
	visible: bool,
	values: ByteReader<'a>,
}

#[derive(Default)]
struct CodeTypeAnnotations<'a> {
	/// By bytecode offset of the instruction.
	instructions: BTreeMap<usize, Vec<CodeTypeAnnotation<'a>>>,
	/// By index of the try catch block.
	try_catch_blocks: BTreeMap<u16, Vec<CodeTypeAnnotation<'a>>>,
	local_variables: Vec<(Vec<(Label, Label, u16)>, CodeTypeAnnotation<'a>)>,
}

/// Reads the content of a `Code` attribute into the method visitor, starting with
/// [`MethodVisitor::visit_code`] and ending with [`MethodVisitor::visit_maxs`].
pub(crate) fn read_code<'a, M: MethodVisitor>(r: &mut ByteReader<'a>, pool: &PoolRead<'a>, mut mv: M, method: &MethodInfo) -> Result<M> {
	let max_stack = r.read_u16()?;
	let max_locals = r.read_u16()?;
	let code_length = r.read_u32_as_usize()?;
	if code_length > u16::MAX as usize {
		bail!(ClassError::TooLarge { what: "code" });
	}
	let code = r.read_slice(code_length)?;

	let mut labels = Labels::new(code_length);
	let mut new_label = || mv.new_label();

	let instructions = decode_instructions(code, pool, &mut labels, &mut new_label)?;

	let try_catch_blocks = r.read_vec(
		|r| r.read_u16_as_usize(),
		|r| {
			let start = labels.get_or_create(r.read_u16()? as i64, &mut new_label)?;
			let end = labels.get_or_create(r.read_u16()? as i64, &mut new_label)?;
			let handler = labels.get_or_create(r.read_u16()? as i64, &mut new_label)?;
			let catch_type = pool.optional(r.read_u16()?, PoolRead::class_owned)?;
			Ok(TryCatchBlock { start, end, handler, catch_type })
		}
	).with_context(|| anyhow!("failed to read exception table"))?;

	let skip_debug = method.flags.contains(ReadFlags::SKIP_DEBUG);

	let mut lines: BTreeMap<usize, Vec<u16>> = BTreeMap::new();
	let mut local_variables = Vec::new();
	let mut local_variable_types: HashMap<(u16, u16, u16), JavaString> = HashMap::new();
	let mut frames: Vec<(usize, Frame)> = Vec::new();
	let mut type_annotations = CodeTypeAnnotations::default();
	let mut unknown = Vec::new();

	let attributes_count = r.read_u16()?;
	for _ in 0..attributes_count {
		let name = pool.utf8(r.read_u16()?)?;
		let length = r.read_u32()?;
		match name {
			name if skip_debug && (name == attribute::LINE_NUMBER_TABLE ||
				name == attribute::LOCAL_VARIABLE_TABLE || name == attribute::LOCAL_VARIABLE_TYPE_TABLE) => {
				r.skip(length as usize)?;
			},
			name if name == attribute::LINE_NUMBER_TABLE => {
				read_attribute(r, attribute::LINE_NUMBER_TABLE, length, |r| {
					let count = r.read_u16()?;
					for _ in 0..count {
						let start_pc = r.read_u16()?;
						let line = r.read_u16()?;
						labels.get_or_create(start_pc as i64, &mut new_label)?;
						lines.entry(start_pc as usize).or_default().push(line);
					}
					Ok(())
				})?;
			},
			name if name == attribute::LOCAL_VARIABLE_TABLE => {
				read_attribute(r, attribute::LOCAL_VARIABLE_TABLE, length, |r| {
					let count = r.read_u16()?;
					for _ in 0..count {
						let start_pc = r.read_u16()?;
						let length = r.read_u16()?;
						let name = pool.utf8_owned(r.read_u16()?)?;
						let descriptor = pool.utf8_owned(r.read_u16()?)?;
						let index = r.read_u16()?;
						let (start, end) = labels.range(start_pc, length, &mut new_label)?;
						local_variables.push(LocalVariableEntry { start_pc, length, index, name, descriptor, start, end });
					}
					Ok(())
				})?;
			},
			name if name == attribute::LOCAL_VARIABLE_TYPE_TABLE => {
				read_attribute(r, attribute::LOCAL_VARIABLE_TYPE_TABLE, length, |r| {
					let count = r.read_u16()?;
					for _ in 0..count {
						let start_pc = r.read_u16()?;
						let length = r.read_u16()?;
						let _name = r.read_u16()?;
						let signature = pool.utf8_owned(r.read_u16()?)?;
						let index = r.read_u16()?;
						local_variable_types.insert((start_pc, length, index), signature);
					}
					Ok(())
				})?;
			},
			name if name == attribute::STACK_MAP_TABLE && method.flags.contains(ReadFlags::SKIP_FRAMES) => {
				r.skip(length as usize)?;
			},
			name if name == attribute::STACK_MAP_TABLE => {
				let expand = if method.flags.contains(ReadFlags::EXPAND_FRAMES) {
					Some(initial_locals(method.class_name, method.access, method.name, method.descriptor)?)
				} else {
					None
				};
				frames = read_attribute(r, attribute::STACK_MAP_TABLE, length, |r| {
					read_frames(r, pool, &mut labels, &mut new_label, expand)
				})?;
			},
			name if name == attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS || name == attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
				method.api.check("TypeAnnotation", Api::Asm5)?;
				let (attribute_name, visible) = if name == attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS {
					(attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS, true)
				} else {
					(attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS, false)
				};
				read_attribute(r, attribute_name, length, |r| {
					read_code_type_annotations(r, pool, &mut labels, &mut new_label, visible, &mut type_annotations)
				})?;
			},
			name => {
				trace!("unknown code attribute {name} of method {}{}", method.name, method.descriptor);
				let content = r.read_slice(length as usize)?;
				unknown.push(Attribute { name: name.to_owned(), content: content.to_vec() });
			},
		}
	}

	mv.visit_code()?;

	for (index, block) in try_catch_blocks.into_iter().enumerate() {
		mv.visit_try_catch_block(block.start, block.end, block.handler, block.catch_type)?;
		for annotation in type_annotations.try_catch_blocks.remove(&(index as u16)).unwrap_or_default() {
			mv = emit_type_annotation(pool, mv, annotation, M::visit_try_catch_annotation)?;
		}
	}
	if let Some((&index, _)) = type_annotations.try_catch_blocks.first_key_value() {
		bail!("exception parameter annotation refers to try catch block {index}, but there are fewer blocks");
	}

	let mut frames = frames.into_iter().peekable();
	for (offset, instruction) in instructions {
		if let Some(label) = labels.get(offset) {
			mv.visit_label(label)?;
			for &line in lines.get(&offset).into_iter().flatten() {
				mv.visit_line_number(line, label)?;
			}
		}

		if let Some((frame_offset, frame)) = frames.next_if(|&(frame_offset, _)| frame_offset <= offset) {
			if frame_offset != offset {
				bail!(ClassError::BadLabelOffset { offset: frame_offset as i64 });
			}
			mv.visit_frame(frame)?;
		}

		if instruction.uses_constant_dynamic() {
			method.api.check("ConstantDynamic", Api::Asm7)?;
		}
		mv.visit_instruction(instruction)?;

		for annotation in type_annotations.instructions.remove(&offset).unwrap_or_default() {
			mv = emit_type_annotation(pool, mv, annotation, M::visit_insn_annotation)?;
		}
	}
	if let Some((frame_offset, _)) = frames.next() {
		bail!(ClassError::BadLabelOffset { offset: frame_offset as i64 });
	}
	if let Some((&offset, _)) = type_annotations.instructions.first_key_value() {
		bail!(ClassError::BadLabelOffset { offset: offset as i64 });
	}

	if let Some(label) = labels.get(code_length) {
		mv.visit_label(label)?;
	}

	for variable in local_variables {
		let signature = local_variable_types.remove(&(variable.start_pc, variable.length, variable.index));
		mv.visit_local_variable(LocalVariable {
			name: variable.name,
			descriptor: variable.descriptor,
			signature,
			start: variable.start,
			end: variable.end,
			index: variable.index,
		})?;
	}

	for (ranges, annotation) in type_annotations.local_variables {
		mv = emit_type_annotation(pool, mv, annotation, |mv, type_reference, type_path, descriptor, visible| {
			mv.visit_local_variable_annotation(type_reference, type_path, ranges, descriptor, visible)
		})?;
	}

	for attribute in unknown {
		mv.visit_code_attribute(attribute)?;
	}

	mv.visit_maxs(max_stack, max_locals)?;
	Ok(mv)
}

fn emit_type_annotation<'a, M: MethodVisitor>(
	pool: &PoolRead<'a>,
	mv: M,
	annotation: CodeTypeAnnotation<'a>,
	visit: impl FnOnce(M, TypeReference, TypePath, JavaString, bool) -> Result<ControlFlow<M, (M::AnnotationResidual, M::AnnotationVisitor)>>,
) -> Result<M> {
	match visit(mv, annotation.type_reference, annotation.type_path, annotation.descriptor, annotation.visible)? {
		ControlFlow::Continue((residual, visitor)) => {
			let mut r = annotation.values;
			let visitor = read_element_value_pairs(&mut r, pool, visitor)?;
			M::finish_annotation(residual, visitor)
		},
		ControlFlow::Break(mv) => Ok(mv),
	}
}

fn read_code_type_annotations<'a>(
	r: &mut ByteReader<'a>,
	pool: &PoolRead<'a>,
	labels: &mut Labels,
	new_label: &mut impl FnMut() -> Label,
	visible: bool,
	annotations: &mut CodeTypeAnnotations<'a>,
) -> Result<()> {
	let count = r.read_u16()?;
	for _ in 0..count {
		let at = r.position();
		let (type_reference, position) = read_target(r)?;
		let type_path = read_type_path(r)?;
		let descriptor = pool.utf8_owned(r.read_u16()?)?;
		let annotation = CodeTypeAnnotation { type_reference, type_path, descriptor, visible, values: r.clone() };
		skip_element_value_pairs(r)?;

		match (type_reference, position) {
			(TypeReference::ExceptionParameter { index }, _) => {
				annotations.try_catch_blocks.entry(index).or_default().push(annotation);
			},
			(_, TargetPosition::Offset(offset)) => {
				annotations.instructions.entry(offset as usize).or_default().push(annotation);
			},
			(_, TargetPosition::LocalVariables(table)) => {
				let ranges = table.into_iter()
					.map(|(start_pc, length, index)| {
						let (start, end) = labels.range(start_pc, length, &mut *new_label)?;
						Ok((start, end, index))
					})
					.collect::<Result<_>>()?;
				annotations.local_variables.push((ranges, annotation));
			},
			(type_reference, TargetPosition::None) => {
				bail!(ClassError::Malformed { what: "type annotation target in code", tag: type_reference.target_type(), at });
			},
		}
	}
	Ok(())
}

/// Decodes the bytecode, creating the labels for all jump targets.
fn decode_instructions(code: &[u8], pool: &PoolRead, labels: &mut Labels, new_label: &mut impl FnMut() -> Label) -> Result<Vec<(usize, Instruction)>> {
	// Positions of this reader are bytecode offsets, so the switch padding works out.
	let mut r = ByteReader::new(code);
	let mut instructions = Vec::new();

	while r.remaining() > 0 {
		let opcode_pos = r.position();
		let instruction = read_instruction(&mut r, opcode_pos, pool, labels, new_label)
			.with_context(|| anyhow!("failed to read instruction at bytecode offset {opcode_pos}"))?;
		instructions.push((opcode_pos, instruction));
	}

	Ok(instructions)
}

fn read_instruction(
	r: &mut ByteReader,
	opcode_pos: usize,
	pool: &PoolRead,
	labels: &mut Labels,
	new_label: &mut impl FnMut() -> Label,
) -> Result<Instruction> {
	let mut label = |branch: i64| labels.get_or_create(opcode_pos as i64 + branch, &mut *new_label);

	Ok(match r.read_u8()? {
		opcode::NOP         => Instruction::Nop,
		opcode::ACONST_NULL => Instruction::AConstNull,
		opcode::ICONST_M1   => Instruction::IConstM1,
		opcode::ICONST_0    => Instruction::IConst0,
		opcode::ICONST_1    => Instruction::IConst1,
		opcode::ICONST_2    => Instruction::IConst2,
		opcode::ICONST_3    => Instruction::IConst3,
		opcode::ICONST_4    => Instruction::IConst4,
		opcode::ICONST_5    => Instruction::IConst5,
		opcode::LCONST_0    => Instruction::LConst0,
		opcode::LCONST_1    => Instruction::LConst1,
		opcode::FCONST_0    => Instruction::FConst0,
		opcode::FCONST_1    => Instruction::FConst1,
		opcode::FCONST_2    => Instruction::FConst2,
		opcode::DCONST_0    => Instruction::DConst0,
		opcode::DCONST_1    => Instruction::DConst1,
		opcode::BIPUSH      => Instruction::BiPush(r.read_i8()?),
		opcode::SIPUSH      => Instruction::SiPush(r.read_i16()?),
		opcode::LDC         => Instruction::Ldc(pool.loadable(r.read_u8()? as u16)?),
		opcode::LDC_W       => Instruction::Ldc(pool.loadable(r.read_u16()?)?),
		opcode::LDC2_W      => Instruction::Ldc(pool.loadable(r.read_u16()?)?),
		opcode::ILOAD       => Instruction::ILoad(r.read_u8()? as u16),
		opcode::LLOAD       => Instruction::LLoad(r.read_u8()? as u16),
		opcode::FLOAD       => Instruction::FLoad(r.read_u8()? as u16),
		opcode::DLOAD       => Instruction::DLoad(r.read_u8()? as u16),
		opcode::ALOAD       => Instruction::ALoad(r.read_u8()? as u16),
		opcode @ opcode::ILOAD_0..=opcode::ALOAD_3 => {
			let shifted = opcode - opcode::ILOAD_0; // 0..=19
			let index = (shifted & 0b11) as u16;
			match shifted >> 2 {
				0 => Instruction::ILoad(index),
				1 => Instruction::LLoad(index),
				2 => Instruction::FLoad(index),
				3 => Instruction::DLoad(index),
				_ => Instruction::ALoad(index),
			}
		},
		opcode::IALOAD => Instruction::IALoad,
		opcode::LALOAD => Instruction::LALoad,
		opcode::FALOAD => Instruction::FALoad,
		opcode::DALOAD => Instruction::DALoad,
		opcode::AALOAD => Instruction::AALoad,
		opcode::BALOAD => Instruction::BALoad,
		opcode::CALOAD => Instruction::CALoad,
		opcode::SALOAD => Instruction::SALoad,
		opcode::ISTORE => Instruction::IStore(r.read_u8()? as u16),
		opcode::LSTORE => Instruction::LStore(r.read_u8()? as u16),
		opcode::FSTORE => Instruction::FStore(r.read_u8()? as u16),
		opcode::DSTORE => Instruction::DStore(r.read_u8()? as u16),
		opcode::ASTORE => Instruction::AStore(r.read_u8()? as u16),
		opcode @ opcode::ISTORE_0..=opcode::ASTORE_3 => {
			let shifted = opcode - opcode::ISTORE_0; // 0..=19
			let index = (shifted & 0b11) as u16;
			match shifted >> 2 {
				0 => Instruction::IStore(index),
				1 => Instruction::LStore(index),
				2 => Instruction::FStore(index),
				3 => Instruction::DStore(index),
				_ => Instruction::AStore(index),
			}
		},
		opcode::IASTORE => Instruction::IAStore,
		opcode::LASTORE => Instruction::LAStore,
		opcode::FASTORE => Instruction::FAStore,
		opcode::DASTORE => Instruction::DAStore,
		opcode::AASTORE => Instruction::AAStore,
		opcode::BASTORE => Instruction::BAStore,
		opcode::CASTORE => Instruction::CAStore,
		opcode::SASTORE => Instruction::SAStore,
		opcode::POP     => Instruction::Pop,
		opcode::POP2    => Instruction::Pop2,
		opcode::DUP     => Instruction::Dup,
		opcode::DUP_X1  => Instruction::DupX1,
		opcode::DUP_X2  => Instruction::DupX2,
		opcode::DUP2    => Instruction::Dup2,
		opcode::DUP2_X1 => Instruction::Dup2X1,
		opcode::DUP2_X2 => Instruction::Dup2X2,
		opcode::SWAP    => Instruction::Swap,
		opcode::IADD    => Instruction::IAdd,
		opcode::LADD    => Instruction::LAdd,
		opcode::FADD    => Instruction::FAdd,
		opcode::DADD    => Instruction::DAdd,
		opcode::ISUB    => Instruction::ISub,
		opcode::LSUB    => Instruction::LSub,
		opcode::FSUB    => Instruction::FSub,
		opcode::DSUB    => Instruction::DSub,
		opcode::IMUL    => Instruction::IMul,
		opcode::LMUL    => Instruction::LMul,
		opcode::FMUL    => Instruction::FMul,
		opcode::DMUL    => Instruction::DMul,
		opcode::IDIV    => Instruction::IDiv,
		opcode::LDIV    => Instruction::LDiv,
		opcode::FDIV    => Instruction::FDiv,
		opcode::DDIV    => Instruction::DDiv,
		opcode::IREM    => Instruction::IRem,
		opcode::LREM    => Instruction::LRem,
		opcode::FREM    => Instruction::FRem,
		opcode::DREM    => Instruction::DRem,
		opcode::INEG    => Instruction::INeg,
		opcode::LNEG    => Instruction::LNeg,
		opcode::FNEG    => Instruction::FNeg,
		opcode::DNEG    => Instruction::DNeg,
		opcode::ISHL    => Instruction::IShl,
		opcode::LSHL    => Instruction::LShl,
		opcode::ISHR    => Instruction::IShr,
		opcode::LSHR    => Instruction::LShr,
		opcode::IUSHR   => Instruction::IUShr,
		opcode::LUSHR   => Instruction::LUShr,
		opcode::IAND    => Instruction::IAnd,
		opcode::LAND    => Instruction::LAnd,
		opcode::IOR     => Instruction::IOr,
		opcode::LOR     => Instruction::LOr,
		opcode::IXOR    => Instruction::IXor,
		opcode::LXOR    => Instruction::LXor,
		opcode::IINC => {
			let index = r.read_u8()? as u16;
			let value = r.read_i8()?;
			Instruction::IInc(index, value as i16)
		},
		opcode::I2L   => Instruction::I2L,
		opcode::I2F   => Instruction::I2F,
		opcode::I2D   => Instruction::I2D,
		opcode::L2I   => Instruction::L2I,
		opcode::L2F   => Instruction::L2F,
		opcode::L2D   => Instruction::L2D,
		opcode::F2I   => Instruction::F2I,
		opcode::F2L   => Instruction::F2L,
		opcode::F2D   => Instruction::F2D,
		opcode::D2I   => Instruction::D2I,
		opcode::D2L   => Instruction::D2L,
		opcode::D2F   => Instruction::D2F,
		opcode::I2B   => Instruction::I2B,
		opcode::I2C   => Instruction::I2C,
		opcode::I2S   => Instruction::I2S,
		opcode::LCMP  => Instruction::LCmp,
		opcode::FCMPL => Instruction::FCmpL,
		opcode::FCMPG => Instruction::FCmpG,
		opcode::DCMPL => Instruction::DCmpL,
		opcode::DCMPG => Instruction::DCmpG,
		opcode::IFEQ      => Instruction::IfEq(    label(r.read_i16()? as i64)?),
		opcode::IFNE      => Instruction::IfNe(    label(r.read_i16()? as i64)?),
		opcode::IFLT      => Instruction::IfLt(    label(r.read_i16()? as i64)?),
		opcode::IFGE      => Instruction::IfGe(    label(r.read_i16()? as i64)?),
		opcode::IFGT      => Instruction::IfGt(    label(r.read_i16()? as i64)?),
		opcode::IFLE      => Instruction::IfLe(    label(r.read_i16()? as i64)?),
		opcode::IF_ICMPEQ => Instruction::IfICmpEq(label(r.read_i16()? as i64)?),
		opcode::IF_ICMPNE => Instruction::IfICmpNe(label(r.read_i16()? as i64)?),
		opcode::IF_ICMPLT => Instruction::IfICmpLt(label(r.read_i16()? as i64)?),
		opcode::IF_ICMPGE => Instruction::IfICmpGe(label(r.read_i16()? as i64)?),
		opcode::IF_ICMPGT => Instruction::IfICmpGt(label(r.read_i16()? as i64)?),
		opcode::IF_ICMPLE => Instruction::IfICmpLe(label(r.read_i16()? as i64)?),
		opcode::IF_ACMPEQ => Instruction::IfACmpEq(label(r.read_i16()? as i64)?),
		opcode::IF_ACMPNE => Instruction::IfACmpNe(label(r.read_i16()? as i64)?),
		opcode::GOTO      => Instruction::Goto(    label(r.read_i16()? as i64)?),
		opcode::JSR       => Instruction::Jsr(     label(r.read_i16()? as i64)?),
		opcode::RET       => Instruction::Ret(r.read_u8()? as u16),
		opcode::TABLESWITCH => {
			r.skip((4 - (opcode_pos + 1) % 4) % 4)?;

			let default = label(r.read_i32()? as i64)?;
			let low = r.read_i32()?;
			let high = r.read_i32()?;

			if low > high {
				bail!("in tableswitch `low` must be lower or equal to `high`, it's low={low:?} and high={high:?}");
			}

			let n = (high as i64 - low as i64 + 1) as usize;
			let mut table = Vec::with_capacity(n.min(r.remaining() / 4));
			for _ in 0..n {
				table.push(label(r.read_i32()? as i64)?);
			}

			Instruction::TableSwitch { default, low, high, table }
		},
		opcode::LOOKUPSWITCH => {
			r.skip((4 - (opcode_pos + 1) % 4) % 4)?;

			let default = label(r.read_i32()? as i64)?;

			let n = r.read_i32()?;
			if n < 0 {
				bail!("in lookupswitch the `npairs` must be positive, it's npairs={n:?}");
			}

			let mut pairs = Vec::with_capacity((n as usize).min(r.remaining() / 8));
			for _ in 0..n {
				let key = r.read_i32()?;
				pairs.push((key, label(r.read_i32()? as i64)?));
			}

			Instruction::LookupSwitch { default, pairs }
		},
		opcode::IRETURN => Instruction::IReturn,
		opcode::LRETURN => Instruction::LReturn,
		opcode::FRETURN => Instruction::FReturn,
		opcode::DRETURN => Instruction::DReturn,
		opcode::ARETURN => Instruction::AReturn,
		opcode::RETURN  => Instruction::Return,
		opcode::GETSTATIC => Instruction::GetStatic(pool.field_ref(r.read_u16()?)?),
		opcode::PUTSTATIC => Instruction::PutStatic(pool.field_ref(r.read_u16()?)?),
		opcode::GETFIELD  => Instruction::GetField(pool.field_ref(r.read_u16()?)?),
		opcode::PUTFIELD  => Instruction::PutField(pool.field_ref(r.read_u16()?)?),
		opcode::INVOKEVIRTUAL => Instruction::InvokeVirtual(pool.method_ref(r.read_u16()?)?),
		opcode::INVOKESPECIAL => {
			let (method_ref, is_interface) = pool.any_method_ref(r.read_u16()?)?;
			Instruction::InvokeSpecial(method_ref, is_interface)
		},
		opcode::INVOKESTATIC => {
			let (method_ref, is_interface) = pool.any_method_ref(r.read_u16()?)?;
			Instruction::InvokeStatic(method_ref, is_interface)
		},
		opcode::INVOKEINTERFACE => {
			let method_ref = pool.interface_method_ref(r.read_u16()?)?;
			let _count = r.read_u8()?;
			let _zero = r.read_u8()?;
			Instruction::InvokeInterface(method_ref)
		},
		opcode::INVOKEDYNAMIC => {
			let invoke_dynamic = pool.invoke_dynamic(r.read_u16()?)?;
			let _zero = r.read_u16()?;
			Instruction::InvokeDynamic(invoke_dynamic)
		},
		opcode::NEW          => Instruction::New(pool.class_owned(r.read_u16()?)?),
		opcode::NEWARRAY     => {
			let at = r.position();
			Instruction::NewArray(ArrayType::from_atype(r.read_u8()?, at)?)
		},
		opcode::ANEWARRAY    => Instruction::ANewArray(pool.class_owned(r.read_u16()?)?),
		opcode::ARRAYLENGTH  => Instruction::ArrayLength,
		opcode::ATHROW       => Instruction::AThrow,
		opcode::CHECKCAST    => Instruction::CheckCast(pool.class_owned(r.read_u16()?)?),
		opcode::INSTANCEOF   => Instruction::InstanceOf(pool.class_owned(r.read_u16()?)?),
		opcode::MONITORENTER => Instruction::MonitorEnter,
		opcode::MONITOREXIT  => Instruction::MonitorExit,
		opcode::WIDE => {
			let at = r.position();
			match r.read_u8()? {
				opcode::ILOAD  => Instruction::ILoad( r.read_u16()?),
				opcode::LLOAD  => Instruction::LLoad( r.read_u16()?),
				opcode::FLOAD  => Instruction::FLoad( r.read_u16()?),
				opcode::DLOAD  => Instruction::DLoad( r.read_u16()?),
				opcode::ALOAD  => Instruction::ALoad( r.read_u16()?),
				opcode::ISTORE => Instruction::IStore(r.read_u16()?),
				opcode::LSTORE => Instruction::LStore(r.read_u16()?),
				opcode::FSTORE => Instruction::FStore(r.read_u16()?),
				opcode::DSTORE => Instruction::DStore(r.read_u16()?),
				opcode::ASTORE => Instruction::AStore(r.read_u16()?),
				opcode::RET    => Instruction::Ret(   r.read_u16()?),
				opcode::IINC => {
					let index = r.read_u16()?;
					let value = r.read_i16()?;
					Instruction::IInc(index, value)
				},
				tag => bail!(ClassError::Malformed { what: "wide opcode", tag, at }),
			}
		},
		opcode::MULTIANEWARRAY => {
			let class = pool.class_owned(r.read_u16()?)?;
			let dimensions = r.read_u8()?;
			Instruction::MultiANewArray(class, dimensions)
		},
		opcode::IFNULL    => Instruction::IfNull(   label(r.read_i16()? as i64)?),
		opcode::IFNONNULL => Instruction::IfNonNull(label(r.read_i16()? as i64)?),
		opcode::GOTO_W    => Instruction::Goto(     label(r.read_i32()? as i64)?),
		opcode::JSR_W     => Instruction::Jsr(      label(r.read_i32()? as i64)?),
		opcode => bail!(ClassError::BadOpcode { opcode, at: opcode_pos }),
	})
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::{ByteReader, ClassError};
	use crate::class_reader::code::decode_instructions;
	use crate::class_reader::labels::Labels;
	use crate::class_reader::pool::PoolRead;
	use crate::tree::code::{Instruction, Label, LabelGenerator};

	fn decode(code: &[u8]) -> Result<Vec<(usize, Instruction)>> {
		let pool_bytes = [0x00, 0x01];
		let mut reader = ByteReader::new(&pool_bytes);
		let pool = PoolRead::scan(&pool_bytes, &mut reader)?;
		let mut generator = LabelGenerator::default();
		let mut labels = Labels::new(code.len());
		decode_instructions(code, &pool, &mut labels, &mut || generator.next_label())
	}

	#[test]
	fn short_forms_and_wide() -> Result<()> {
		let code = [
			0x1b,                         // iload_1
			0x4e,                         // astore_3
			0xc4, 0x15, 0x01, 0x00,       // wide iload 256
			0xc4, 0x84, 0x00, 0x02, 0xff, 0xfe, // wide iinc 2 -2
			0xac,                         // ireturn
		];
		assert_eq!(decode(&code)?, vec![
			(0, Instruction::ILoad(1)),
			(1, Instruction::AStore(3)),
			(2, Instruction::ILoad(256)),
			(6, Instruction::IInc(2, -2)),
			(12, Instruction::IReturn),
		]);
		Ok(())
	}

	#[test]
	fn branches_and_switch_padding() -> Result<()> {
		let code = [
			0x00,                   // 0: nop
			0xaa, 0x00, 0x00,       // 1: tableswitch, padded to 4
			0x00, 0x00, 0x00, 0x17, // default: 1 + 23 = 24
			0x00, 0x00, 0x00, 0x00, // low
			0x00, 0x00, 0x00, 0x00, // high
			0x00, 0x00, 0x00, 0x17, // 0 -> 24
			0xa7, 0xff, 0xec,       // 20: goto -20 -> 0
			0x00,                   // 23: nop
			0xb1,                   // 24: return
		];
		let instructions = decode(&code)?;
		assert_eq!(instructions.len(), 5);
		assert_eq!(instructions[1], (1, Instruction::TableSwitch {
			default: Label { id: 0 },
			low: 0,
			high: 0,
			table: vec![Label { id: 0 }],
		}));
		assert_eq!(instructions[2], (20, Instruction::Goto(Label { id: 1 })));
		Ok(())
	}

	#[test]
	fn bad_opcode() {
		let error = decode(&[0x00, 0x00, 0xcb]).unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::BadOpcode { opcode: 0xcb, at: 2 }));

		let error = decode(&[0xc4, 0x10, 0x00, 0x00]).unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::Malformed { what: "wide opcode", tag: 0x10, at: 1 }));
	}

	#[test]
	fn branch_outside_of_code() {
		let error = decode(&[0xa7, 0x00, 0x10]).unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::BadLabelOffset { offset: 16 }));
	}
}
