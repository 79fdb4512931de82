//! Computation of the maximum stack size, the number of locals and the stack map frames of a method.
//!
//! Both work on the buffered instructions, before they are assembled: positions are instruction indices, and labels
//! resolve to the index of the instruction they are placed before.

use std::collections::{BTreeSet, HashMap};
use std::ops::Range;
use anyhow::{anyhow, bail, Result};
use java_string::{JavaStr, JavaString};
use log::debug;
use crate::ClassError;
use crate::class_writer::hierarchy::ClassHierarchy;
use crate::class_writer::method::CodeBuffer;
use crate::tree::code::{Instruction, Label, Loadable};
use crate::tree::descriptor::{array_of, parse_field_descriptor, parse_method_descriptor};
use crate::tree::frame::{Frame, VerificationType};

const OBJECT: &str = "java/lang/Object";
const THROWABLE: &str = "java/lang/Throwable";

/// An exception handler with its range as instruction indices.
pub(crate) struct Handler<'c> {
	pub(crate) range: Range<usize>,
	pub(crate) handler: usize,
	pub(crate) catch_type: &'c JavaStr,
}

/// Resolves the try catch blocks of the method, in the order they were visited.
///
/// Each range must cover at least one instruction, and each handler must start at an instruction.
pub(crate) fn handlers(code: &CodeBuffer) -> Result<Vec<Handler<'_>>> {
	code.try_catch_blocks.iter().enumerate()
		.map(|(index, block)| {
			let range = code.position(block.start)?..code.position(block.end)?;
			if range.is_empty() {
				bail!(ClassError::BadExceptionHandler { index, reason: "its range covers no instruction" });
			}
			let handler = code.position(block.handler)?;
			if handler >= code.instructions.len() {
				bail!(ClassError::BadExceptionHandler { index, reason: "the handler is placed after the last instruction" });
			}
			let catch_type = block.catch_type.as_deref().unwrap_or(JavaStr::from_str(THROWABLE));
			Ok(Handler { range, handler, catch_type })
		})
		.collect()
}

/// The number of local variable slots the method uses: the parameters, and every slot an instruction touches.
fn max_locals(code: &CodeBuffer, initial_locals: &[VerificationType]) -> Result<u16> {
	let mut max_locals: usize = initial_locals.iter().map(VerificationType::size).sum();
	for instruction in &code.instructions {
		let end = match *instruction {
			Instruction::ILoad(n) | Instruction::FLoad(n) | Instruction::ALoad(n) |
			Instruction::IStore(n) | Instruction::FStore(n) | Instruction::AStore(n) |
			Instruction::IInc(n, _) | Instruction::Ret(n) => n as usize + 1,
			Instruction::LLoad(n) | Instruction::DLoad(n) |
			Instruction::LStore(n) | Instruction::DStore(n) => n as usize + 2,
			_ => continue,
		};
		max_locals = max_locals.max(end);
	}
	u16::try_from(max_locals).map_err(|_| anyhow!(ClassError::TooLarge { what: "max locals" }))
}

fn field_size(descriptor: &JavaStr) -> Result<usize> {
	Ok(parse_field_descriptor(descriptor)?.size())
}

/// The number of stack slots an instruction pops and pushes.
fn slot_effect(instruction: &Instruction) -> Result<(usize, usize)> {
	use Instruction::*;
	Ok(match instruction {
		Nop | IInc(..) | Goto(_) | Ret(_) | Return => (0, 0),
		AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 |
		FConst0 | FConst1 | FConst2 | BiPush(_) | SiPush(_) |
		ILoad(_) | FLoad(_) | ALoad(_) | Jsr(_) | New(_) => (0, 1),
		LConst0 | LConst1 | DConst0 | DConst1 | LLoad(_) | DLoad(_) => (0, 2),
		Ldc(loadable) => (0, if loadable.is_wide() { 2 } else { 1 }),
		IALoad | FALoad | AALoad | BALoad | CALoad | SALoad => (2, 1),
		LALoad | DALoad => (2, 2),
		IStore(_) | FStore(_) | AStore(_) | Pop => (1, 0),
		LStore(_) | DStore(_) | Pop2 => (2, 0),
		IAStore | FAStore | AAStore | BAStore | CAStore | SAStore => (3, 0),
		LAStore | DAStore => (4, 0),
		Dup => (1, 2),
		DupX1 => (2, 3),
		DupX2 => (3, 4),
		Dup2 => (2, 4),
		Dup2X1 => (3, 5),
		Dup2X2 => (4, 6),
		Swap => (2, 2),
		IAdd | ISub | IMul | IDiv | IRem | IShl | IShr | IUShr | IAnd | IOr | IXor |
		FAdd | FSub | FMul | FDiv | FRem | FCmpL | FCmpG => (2, 1),
		LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor |
		DAdd | DSub | DMul | DDiv | DRem => (4, 2),
		LShl | LShr | LUShr => (3, 2),
		LCmp | DCmpL | DCmpG => (4, 1),
		INeg | FNeg | I2F | F2I | I2B | I2C | I2S => (1, 1),
		LNeg | DNeg | L2D | D2L => (2, 2),
		I2L | I2D | F2L | F2D => (1, 2),
		L2I | L2F | D2I | D2F => (2, 1),
		IfEq(_) | IfNe(_) | IfLt(_) | IfGe(_) | IfGt(_) | IfLe(_) | IfNull(_) | IfNonNull(_) => (1, 0),
		IfICmpEq(_) | IfICmpNe(_) | IfICmpLt(_) | IfICmpGe(_) | IfICmpGt(_) | IfICmpLe(_) |
		IfACmpEq(_) | IfACmpNe(_) => (2, 0),
		TableSwitch { .. } | LookupSwitch { .. } => (1, 0),
		IReturn | FReturn | AReturn | AThrow | MonitorEnter | MonitorExit => (1, 0),
		LReturn | DReturn => (2, 0),
		GetStatic(field) => (0, field_size(&field.descriptor)?),
		PutStatic(field) => (field_size(&field.descriptor)?, 0),
		GetField(field) => (1, field_size(&field.descriptor)?),
		PutField(field) => (1 + field_size(&field.descriptor)?, 0),
		InvokeVirtual(method) | InvokeSpecial(method, _) | InvokeInterface(method) => {
			let descriptor = parse_method_descriptor(&method.descriptor)?;
			(1 + descriptor.arguments_size(), descriptor.return_size())
		},
		InvokeStatic(method, _) => {
			let descriptor = parse_method_descriptor(&method.descriptor)?;
			(descriptor.arguments_size(), descriptor.return_size())
		},
		InvokeDynamic(invoke_dynamic) => {
			let descriptor = parse_method_descriptor(&invoke_dynamic.descriptor)?;
			(descriptor.arguments_size(), descriptor.return_size())
		},
		NewArray(_) | ANewArray(_) | ArrayLength | CheckCast(_) | InstanceOf(_) => (1, 1),
		MultiANewArray(_, dimensions) => (*dimensions as usize, 1),
	})
}

/// Computes the maximum stack size and the number of locals.
///
/// Stack heights propagate along the branches, switches and exception handlers, starting with an empty stack at the
/// first instruction. Code that can't be reached doesn't count.
pub(crate) fn compute_maxs(code: &CodeBuffer, initial_locals: &[VerificationType]) -> Result<(u16, u16)> {
	let instructions = &code.instructions;
	let handlers = handlers(code)?;

	let mut heights: Vec<Option<usize>> = vec![None; instructions.len()];
	let mut work = Vec::new();
	if !instructions.is_empty() {
		heights[0] = Some(0);
		work.push(0);
	}

	let mut max_stack = 0;
	while let Some(index) = work.pop() {
		let Some(height) = heights[index] else { continue };
		let instruction = &instructions[index];

		let (pop, push) = slot_effect(instruction)?;
		let after = height.checked_sub(pop)
			.ok_or(ClassError::StackUnderflow { instruction: index })? + push;
		max_stack = max_stack.max(height).max(after);

		let mut successors = Vec::new();
		for target in instruction.targets() {
			successors.push((code.position(target)?, after));
		}
		if !instruction.is_unconditional() {
			// execution continues after a jsr once the subroutine returns, without the return address
			let height = if matches!(instruction, Instruction::Jsr(_)) { height } else { after };
			successors.push((index + 1, height));
		}
		for handler in handlers.iter().filter(|handler| handler.range.contains(&index)) {
			successors.push((handler.handler, 1));
		}

		for (successor, height) in successors {
			if successor < instructions.len() && heights[successor].is_none() {
				heights[successor] = Some(height);
				work.push(successor);
			}
		}
	}

	let max_stack = u16::try_from(max_stack).map_err(|_| anyhow!(ClassError::TooLarge { what: "max stack" }))?;
	Ok((max_stack, max_locals(code, initial_locals)?))
}

/// The element type of an array type, for `aaload`.
fn array_element(array: &VerificationType) -> VerificationType {
	match array {
		VerificationType::Null => VerificationType::Null,
		VerificationType::Object(descriptor) if descriptor.starts_with('[') => {
			match parse_field_descriptor(&descriptor[1..]) {
				Ok(element) => VerificationType::from(element),
				Err(_) => VerificationType::Object(JavaString::from(OBJECT)),
			}
		},
		_ => VerificationType::Object(JavaString::from(OBJECT)),
	}
}

/// Splits an array descriptor into the number of dimensions and the element descriptor. Class names have zero
/// dimensions.
fn dimensions(name: &JavaStr) -> (usize, &JavaStr) {
	let dimensions = name.as_bytes().iter().take_while(|&&b| b == b'[').count();
	(dimensions, &name[dimensions..])
}

fn object_array(dimensions: usize, class: &JavaStr) -> JavaString {
	let mut name = JavaString::from("[".repeat(dimensions));
	name.push('L');
	name.push_java_str(class);
	name.push(';');
	name
}

/// Merges two class or array types.
fn merge_objects(a: &JavaStr, b: &JavaStr, hierarchy: &dyn ClassHierarchy) -> Result<JavaString> {
	if a == b {
		return Ok(a.to_owned());
	}

	let (dimensions_a, element_a) = dimensions(a);
	let (dimensions_b, element_b) = dimensions(b);
	if dimensions_a == 0 && dimensions_b == 0 {
		return hierarchy.common_super_class(a, b);
	}

	let object_a = dimensions_a == 0 || element_a.starts_with('L');
	let object_b = dimensions_b == 0 || element_b.starts_with('L');
	if dimensions_a == dimensions_b && object_a && object_b {
		let class_a = &element_a[1..element_a.len() - 1];
		let class_b = &element_b[1..element_b.len() - 1];
		let common = hierarchy.common_super_class(class_a, class_b)?;
		return Ok(object_array(dimensions_a, &common));
	}

	// arrays of primitives are objects, so they count as one dimension less of an array of objects
	let dimensions_a = if object_a { dimensions_a } else { dimensions_a - 1 };
	let dimensions_b = if object_b { dimensions_b } else { dimensions_b - 1 };
	match dimensions_a.min(dimensions_b) {
		0 => Ok(JavaString::from(OBJECT)),
		dimensions => Ok(object_array(dimensions, JavaStr::from_str(OBJECT))),
	}
}

/// Merges two types, returning `None` if they have nothing in common.
fn merge(a: &VerificationType, b: &VerificationType, hierarchy: &dyn ClassHierarchy) -> Result<Option<VerificationType>> {
	Ok(match (a, b) {
		(a, b) if a == b => Some(a.clone()),
		(VerificationType::Null, VerificationType::Object(_)) => Some(b.clone()),
		(VerificationType::Object(_), VerificationType::Null) => Some(a.clone()),
		(VerificationType::Object(a), VerificationType::Object(b)) => Some(VerificationType::Object(merge_objects(a, b, hierarchy)?)),
		_ => None,
	})
}

/// Turns a list where `Long` and `Double` take two entries into one where they take one.
fn entries(slots: &[VerificationType]) -> Vec<VerificationType> {
	let mut entries = Vec::with_capacity(slots.len());
	let mut i = 0;
	while let Some(slot) = slots.get(i) {
		entries.push(slot.clone());
		i += slot.size();
	}
	entries
}

fn slots(entries: &[VerificationType]) -> Vec<VerificationType> {
	let mut slots = Vec::with_capacity(entries.len());
	for entry in entries {
		slots.push(entry.clone());
		if entry.size() == 2 {
			slots.push(VerificationType::Top);
		}
	}
	slots
}

/// The types of the locals and of the stack at an instruction, with `Long` and `Double` followed by a `Top` for
/// their second slot.
#[derive(Debug, Clone, PartialEq)]
struct State {
	locals: Vec<VerificationType>,
	stack: Vec<VerificationType>,
}

impl State {
	/// Removes trailing `Top` locals, unless they are the second slot of a `Long` or `Double`.
	fn normalize(&mut self) {
		while self.locals.last() == Some(&VerificationType::Top) {
			let len = self.locals.len();
			if len >= 2 && self.locals[len - 2].size() == 2 {
				break;
			}
			self.locals.pop();
		}
	}

	fn push(&mut self, value: VerificationType) {
		let wide = value.size() == 2;
		self.stack.push(value);
		if wide {
			self.stack.push(VerificationType::Top);
		}
	}

	fn pop_slot(&mut self, index: usize) -> Result<VerificationType> {
		self.stack.pop().ok_or_else(|| anyhow!(ClassError::StackUnderflow { instruction: index }))
	}

	fn pop_slots(&mut self, n: usize, index: usize) -> Result<()> {
		for _ in 0..n {
			self.pop_slot(index)?;
		}
		Ok(())
	}

	/// Pops one value, taking two slots for `Long` and `Double`.
	fn pop(&mut self, index: usize) -> Result<VerificationType> {
		let value = self.pop_slot(index)?;
		if value == VerificationType::Top && self.stack.last().is_some_and(|below| below.size() == 2) {
			return self.pop_slot(index);
		}
		Ok(value)
	}

	fn load(&self, local: u16) -> VerificationType {
		self.locals.get(local as usize).cloned().unwrap_or(VerificationType::Top)
	}

	fn store(&mut self, local: u16, value: VerificationType) {
		let local = local as usize;
		let wide = value.size() == 2;
		let end = local + value.size();
		if self.locals.len() < end {
			self.locals.resize(end, VerificationType::Top);
		}
		// overwriting the second slot of a long or double invalidates it
		if local > 0 && self.locals[local - 1].size() == 2 {
			self.locals[local - 1] = VerificationType::Top;
		}
		self.locals[local] = value;
		if wide {
			self.locals[local + 1] = VerificationType::Top;
		}
	}

	/// Replaces an uninitialized type everywhere after its constructor was called.
	fn initialize(&mut self, uninitialized: &VerificationType, initialized: &VerificationType) {
		for slot in self.locals.iter_mut().chain(self.stack.iter_mut()) {
			if slot == uninitialized {
				*slot = initialized.clone();
			}
		}
	}

	/// Merges `incoming` into `target`, returning `true` if `target` changed.
	fn merge_into(target: &mut Option<State>, incoming: &State, hierarchy: &dyn ClassHierarchy, index: usize) -> Result<bool> {
		let Some(current) = target else {
			*target = Some(incoming.clone());
			return Ok(true);
		};

		if current.stack.len() != incoming.stack.len() {
			bail!(ClassError::FrameInconsistent {
				instruction: index,
				reason: format!("stack heights {} and {} meet", current.stack.len(), incoming.stack.len()),
			});
		}
		let mut stack = Vec::with_capacity(current.stack.len());
		for (a, b) in current.stack.iter().zip(&incoming.stack) {
			let merged = merge(a, b, hierarchy)?.ok_or_else(|| anyhow!(ClassError::FrameInconsistent {
				instruction: index,
				reason: format!("stack entries {a:?} and {b:?} meet"),
			}))?;
			stack.push(merged);
		}

		let len = current.locals.len().max(incoming.locals.len());
		let mut locals = Vec::with_capacity(len);
		for i in 0..len {
			let a = current.locals.get(i).unwrap_or(&VerificationType::Top);
			let b = incoming.locals.get(i).unwrap_or(&VerificationType::Top);
			locals.push(merge(a, b, hierarchy)?.unwrap_or(VerificationType::Top));
		}
		for i in 0..len {
			if locals[i].size() == 2 && locals.get(i + 1) != Some(&VerificationType::Top) {
				locals[i] = VerificationType::Top;
			}
		}

		let mut merged = State { locals, stack };
		merged.normalize();
		if merged == *current {
			Ok(false)
		} else {
			*current = merged;
			Ok(true)
		}
	}
}

fn loadable_type(loadable: &Loadable) -> Result<VerificationType> {
	Ok(match loadable {
		Loadable::Integer(_) => VerificationType::Integer,
		Loadable::Float(_) => VerificationType::Float,
		Loadable::Long(_) => VerificationType::Long,
		Loadable::Double(_) => VerificationType::Double,
		Loadable::Class(_) => VerificationType::Object(JavaString::from("java/lang/Class")),
		Loadable::String(_) => VerificationType::Object(JavaString::from("java/lang/String")),
		Loadable::MethodHandle(_) => VerificationType::Object(JavaString::from("java/lang/invoke/MethodHandle")),
		Loadable::MethodType(_) => VerificationType::Object(JavaString::from("java/lang/invoke/MethodType")),
		Loadable::Dynamic(dynamic) => parse_field_descriptor(&dynamic.descriptor)?.into(),
	})
}

/// The object an invoke instruction is called on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Receiver {
	None,
	Instance,
	/// The uninitialized object an `<init>` method initializes.
	Constructor,
}

/// What executing instructions needs to know besides the state.
struct Simulation<'c> {
	class_name: &'c JavaStr,
	/// The class of each `new` instruction, by the label placed at it.
	new_classes: HashMap<Label, &'c JavaStr>,
	new_labels: &'c HashMap<usize, Label>,
}

impl Simulation<'_> {
	fn invoke(&self, state: &mut State, index: usize, descriptor: &JavaStr, receiver: Receiver) -> Result<()> {
		let descriptor = parse_method_descriptor(descriptor)?;
		state.pop_slots(descriptor.arguments_size(), index)?;
		match receiver {
			Receiver::None => {},
			Receiver::Instance => {
				state.pop(index)?;
			},
			Receiver::Constructor => {
				let receiver = state.pop(index)?;
				let initialized = match &receiver {
					VerificationType::UninitializedThis => VerificationType::Object(self.class_name.to_owned()),
					VerificationType::Uninitialized(label) => {
						let class = self.new_classes.get(label)
							.ok_or_else(|| anyhow!("uninitialized type of unknown new instruction"))?;
						VerificationType::Object((*class).to_owned())
					},
					_ => receiver.clone(),
				};
				state.initialize(&receiver, &initialized);
			},
		}
		if let Some(return_type) = descriptor.return_type {
			state.push(return_type.into());
		}
		Ok(())
	}

	/// Executes the instruction at `index` on `state`.
	fn execute(&self, state: &mut State, index: usize, instruction: &Instruction) -> Result<()> {
		use Instruction::*;
		use VerificationType as T;
		match instruction {
			Nop | Goto(_) | Return => {},
			Jsr(_) | Ret(_) => bail!(ClassError::FrameInconsistent {
				instruction: index,
				reason: "jsr and ret are not supported when computing frames".to_owned(),
			}),
			AConstNull => state.push(T::Null),
			IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 | BiPush(_) | SiPush(_) => state.push(T::Integer),
			LConst0 | LConst1 => state.push(T::Long),
			FConst0 | FConst1 | FConst2 => state.push(T::Float),
			DConst0 | DConst1 => state.push(T::Double),
			Ldc(loadable) => state.push(loadable_type(loadable)?),
			ILoad(_) => state.push(T::Integer),
			LLoad(_) => state.push(T::Long),
			FLoad(_) => state.push(T::Float),
			DLoad(_) => state.push(T::Double),
			ALoad(local) => {
				let value = state.load(*local);
				state.push(value);
			},
			IALoad | BALoad | CALoad | SALoad => {
				state.pop_slots(2, index)?;
				state.push(T::Integer);
			},
			LALoad => {
				state.pop_slots(2, index)?;
				state.push(T::Long);
			},
			FALoad => {
				state.pop_slots(2, index)?;
				state.push(T::Float);
			},
			DALoad => {
				state.pop_slots(2, index)?;
				state.push(T::Double);
			},
			AALoad => {
				state.pop_slot(index)?;
				let array = state.pop_slot(index)?;
				state.push(array_element(&array));
			},
			IStore(local) => {
				state.pop_slots(1, index)?;
				state.store(*local, T::Integer);
			},
			LStore(local) => {
				state.pop_slots(2, index)?;
				state.store(*local, T::Long);
			},
			FStore(local) => {
				state.pop_slots(1, index)?;
				state.store(*local, T::Float);
			},
			DStore(local) => {
				state.pop_slots(2, index)?;
				state.store(*local, T::Double);
			},
			AStore(local) => {
				let value = state.pop_slot(index)?;
				state.store(*local, value);
			},
			IAStore | FAStore | AAStore | BAStore | CAStore | SAStore => state.pop_slots(3, index)?,
			LAStore | DAStore => state.pop_slots(4, index)?,
			Pop => state.pop_slots(1, index)?,
			Pop2 => state.pop_slots(2, index)?,
			Dup => {
				let a = state.pop_slot(index)?;
				state.stack.extend([a.clone(), a]);
			},
			DupX1 => {
				let a = state.pop_slot(index)?;
				let b = state.pop_slot(index)?;
				state.stack.extend([a.clone(), b, a]);
			},
			DupX2 => {
				let a = state.pop_slot(index)?;
				let b = state.pop_slot(index)?;
				let c = state.pop_slot(index)?;
				state.stack.extend([a.clone(), c, b, a]);
			},
			Dup2 => {
				let a = state.pop_slot(index)?;
				let b = state.pop_slot(index)?;
				state.stack.extend([b.clone(), a.clone(), b, a]);
			},
			Dup2X1 => {
				let a = state.pop_slot(index)?;
				let b = state.pop_slot(index)?;
				let c = state.pop_slot(index)?;
				state.stack.extend([b.clone(), a.clone(), c, b, a]);
			},
			Dup2X2 => {
				let a = state.pop_slot(index)?;
				let b = state.pop_slot(index)?;
				let c = state.pop_slot(index)?;
				let d = state.pop_slot(index)?;
				state.stack.extend([b.clone(), a.clone(), d, c, b, a]);
			},
			Swap => {
				let a = state.pop_slot(index)?;
				let b = state.pop_slot(index)?;
				state.stack.extend([a, b]);
			},
			IAdd | ISub | IMul | IDiv | IRem | IShl | IShr | IUShr | IAnd | IOr | IXor => {
				state.pop_slots(2, index)?;
				state.push(T::Integer);
			},
			LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor => {
				state.pop_slots(4, index)?;
				state.push(T::Long);
			},
			LShl | LShr | LUShr => {
				state.pop_slots(3, index)?;
				state.push(T::Long);
			},
			FAdd | FSub | FMul | FDiv | FRem => {
				state.pop_slots(2, index)?;
				state.push(T::Float);
			},
			DAdd | DSub | DMul | DDiv | DRem => {
				state.pop_slots(4, index)?;
				state.push(T::Double);
			},
			INeg | I2B | I2C | I2S => {
				state.pop_slots(1, index)?;
				state.push(T::Integer);
			},
			LNeg | D2L => {
				state.pop_slots(2, index)?;
				state.push(T::Long);
			},
			FNeg | I2F => {
				state.pop_slots(1, index)?;
				state.push(T::Float);
			},
			DNeg | L2D => {
				state.pop_slots(2, index)?;
				state.push(T::Double);
			},
			IInc(local, _) => state.store(*local, T::Integer),
			I2L | F2L => {
				state.pop_slots(1, index)?;
				state.push(T::Long);
			},
			I2D | F2D => {
				state.pop_slots(1, index)?;
				state.push(T::Double);
			},
			L2I | D2I => {
				state.pop_slots(2, index)?;
				state.push(T::Integer);
			},
			L2F | D2F => {
				state.pop_slots(2, index)?;
				state.push(T::Float);
			},
			F2I | FCmpL | FCmpG => {
				state.pop_slots(if matches!(instruction, F2I) { 1 } else { 2 }, index)?;
				state.push(T::Integer);
			},
			LCmp | DCmpL | DCmpG => {
				state.pop_slots(4, index)?;
				state.push(T::Integer);
			},
			IfEq(_) | IfNe(_) | IfLt(_) | IfGe(_) | IfGt(_) | IfLe(_) | IfNull(_) | IfNonNull(_) |
			TableSwitch { .. } | LookupSwitch { .. } |
			IReturn | FReturn | AReturn | AThrow | MonitorEnter | MonitorExit => state.pop_slots(1, index)?,
			IfICmpEq(_) | IfICmpNe(_) | IfICmpLt(_) | IfICmpGe(_) | IfICmpGt(_) | IfICmpLe(_) |
			IfACmpEq(_) | IfACmpNe(_) | LReturn | DReturn => state.pop_slots(2, index)?,
			GetStatic(field) => state.push(parse_field_descriptor(&field.descriptor)?.into()),
			PutStatic(field) => state.pop_slots(field_size(&field.descriptor)?, index)?,
			GetField(field) => {
				state.pop_slots(1, index)?;
				state.push(parse_field_descriptor(&field.descriptor)?.into());
			},
			PutField(field) => state.pop_slots(field_size(&field.descriptor)? + 1, index)?,
			InvokeVirtual(method) | InvokeInterface(method) => self.invoke(state, index, &method.descriptor, Receiver::Instance)?,
			InvokeSpecial(method, _) => {
				let receiver = if method.name.as_bytes() == b"<init>" { Receiver::Constructor } else { Receiver::Instance };
				self.invoke(state, index, &method.descriptor, receiver)?
			},
			InvokeStatic(method, _) => self.invoke(state, index, &method.descriptor, Receiver::None)?,
			InvokeDynamic(invoke_dynamic) => self.invoke(state, index, &invoke_dynamic.descriptor, Receiver::None)?,
			New(_) => {
				let label = self.new_labels.get(&index)
					.ok_or_else(|| anyhow!("no label for new instruction {index}"))?;
				state.push(T::Uninitialized(*label));
			},
			NewArray(array_type) => {
				state.pop_slots(1, index)?;
				state.push(T::Object(JavaString::from(array_type.array_descriptor())));
			},
			ANewArray(class) => {
				state.pop_slots(1, index)?;
				state.push(T::Object(array_of(class)));
			},
			ArrayLength | InstanceOf(_) => {
				state.pop_slots(1, index)?;
				state.push(T::Integer);
			},
			CheckCast(class) => {
				state.pop_slots(1, index)?;
				state.push(T::Object(class.clone()));
			},
			MultiANewArray(descriptor, dimensions) => {
				state.pop_slots(*dimensions as usize, index)?;
				state.push(T::Object(descriptor.clone()));
			},
		}
		Ok(())
	}
}

/// The result of [`compute_frames`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ComputedFrames {
	pub(crate) max_stack: u16,
	pub(crate) max_locals: u16,
	/// [`Frame::Expanded`] frames, by the index of the instruction they are at.
	pub(crate) frames: Vec<(usize, Frame)>,
	/// Ranges of instructions that can't be reached. These must be replaced with `nop`s ending in an `athrow`.
	pub(crate) unreachable: Vec<Range<usize>>,
}

/// Computes the frames of a method with a data flow analysis over the types of the locals and the stack.
///
/// Frames are placed at every reachable branch target and exception handler, and after each conditional branch in
/// `widened` (as those jump over a `goto_w`). `new_labels` has the label of each `new` instruction.
pub(crate) fn compute_frames(
	code: &CodeBuffer,
	class_name: &JavaStr,
	initial_locals: &[VerificationType],
	hierarchy: &dyn ClassHierarchy,
	widened: &BTreeSet<usize>,
	new_labels: &HashMap<usize, Label>,
) -> Result<ComputedFrames> {
	let instructions = &code.instructions;
	let handlers = handlers(code)?;

	let mut new_classes = HashMap::new();
	for (&index, &label) in new_labels {
		if let Some(Instruction::New(class)) = instructions.get(index) {
			new_classes.insert(label, &**class);
		}
	}
	let simulation = Simulation { class_name, new_classes, new_labels };

	let mut states: Vec<Option<State>> = vec![None; instructions.len()];
	let mut work = BTreeSet::new();
	if !instructions.is_empty() {
		let mut initial = State { locals: slots(initial_locals), stack: Vec::new() };
		initial.normalize();
		states[0] = Some(initial);
		work.insert(0);
	}

	let mut max_stack = 0;
	while let Some(index) = work.pop_first() {
		let Some(before) = states[index].clone() else { continue };
		let instruction = &instructions[index];

		let mut after = before.clone();
		simulation.execute(&mut after, index, instruction)?;
		after.normalize();
		max_stack = max_stack.max(before.stack.len()).max(after.stack.len());

		let mut successors = Vec::new();
		for target in instruction.targets() {
			successors.push(code.position(target)?);
		}
		if !instruction.is_unconditional() {
			successors.push(index + 1);
		}
		for successor in successors {
			if successor < instructions.len() && State::merge_into(&mut states[successor], &after, hierarchy, successor)? {
				work.insert(successor);
			}
		}

		for handler in handlers.iter().filter(|handler| handler.range.contains(&index)) {
			let stack = vec![VerificationType::Object(handler.catch_type.to_owned())];
			max_stack = max_stack.max(1);
			let mut changed = false;
			for locals in [&before.locals, &after.locals] {
				let incoming = State { locals: locals.clone(), stack: stack.clone() };
				changed |= State::merge_into(&mut states[handler.handler], &incoming, hierarchy, handler.handler)?;
			}
			if changed {
				work.insert(handler.handler);
			}
		}
	}

	let mut points = BTreeSet::new();
	for (index, instruction) in instructions.iter().enumerate() {
		if states[index].is_none() {
			continue;
		}
		for target in instruction.targets() {
			points.insert(code.position(target)?);
		}
		if widened.contains(&index) && instruction.is_conditional() {
			points.insert(index + 1);
		}
	}
	points.extend(handlers.iter().map(|handler| handler.handler));

	let mut frames: Vec<(usize, Frame)> = points.into_iter()
		.filter_map(|index| states.get(index).cloned().flatten().map(|state| (index, state)))
		.map(|(index, state)| (index, Frame::Expanded { locals: entries(&state.locals), stack: entries(&state.stack) }))
		.collect();

	let mut unreachable = Vec::new();
	let mut index = 0;
	while index < instructions.len() {
		if states[index].is_some() {
			index += 1;
			continue;
		}
		let start = index;
		while index < instructions.len() && states[index].is_none() {
			index += 1;
		}
		debug!("instructions {start} to {index} are unreachable, replacing them with nops and athrow");
		unreachable.push(start..index);
		frames.push((start, Frame::Expanded {
			locals: Vec::new(),
			stack: vec![VerificationType::Object(JavaString::from(THROWABLE))],
		}));
		max_stack = max_stack.max(1);
	}
	frames.sort_by_key(|&(index, _)| index);

	Ok(ComputedFrames {
		max_stack: u16::try_from(max_stack).map_err(|_| anyhow!(ClassError::TooLarge { what: "max stack" }))?,
		max_locals: max_locals(code, initial_locals)?,
		frames,
		unreachable,
	})
}

/// Removes the unreachable instruction ranges from a handler range, giving the pieces that remain.
pub(crate) fn cut_range(range: Range<usize>, unreachable: &[Range<usize>]) -> Vec<Range<usize>> {
	let mut pieces = vec![range];
	for cut in unreachable {
		pieces = pieces.into_iter()
			.flat_map(|piece| {
				let before = piece.start..piece.end.min(cut.start);
				let after = piece.start.max(cut.end)..piece.end;
				[before, after]
			})
			.filter(|piece| piece.start < piece.end)
			.collect();
	}
	pieces
}

#[cfg(test)]
mod testing {
	use std::collections::{BTreeSet, HashMap};
	use anyhow::Result;
	use java_string::JavaStr;
	use pretty_assertions::assert_eq;
	use crate::ClassError;
	use crate::class_writer::frames::{compute_frames, compute_maxs, cut_range, handlers, merge_objects};
	use crate::class_writer::hierarchy::{ObjectHierarchy, SuperClasses};
	use crate::class_writer::method::{CodeBuffer, TryCatchBlock};
	use crate::tree::code::{Instruction, LabelGenerator, MethodRef};
	use crate::tree::frame::{Frame, VerificationType};

	fn merged(a: &str, b: &str) -> Result<String> {
		let mut classes = SuperClasses::new();
		classes.insert("B".into(), Some("A".into()), false);
		classes.insert("C".into(), Some("A".into()), false);
		classes.insert("A".into(), Some("java/lang/Object".into()), false);
		Ok(merge_objects(JavaStr::from_str(a), JavaStr::from_str(b), &classes)?.to_string())
	}

	#[test]
	fn merging_arrays() -> Result<()> {
		assert_eq!(merged("B", "C")?, "A");
		assert_eq!(merged("[LB;", "[LC;")?, "[LA;");
		assert_eq!(merged("[[LB;", "[LC;")?, "[Ljava/lang/Object;");
		assert_eq!(merged("[I", "[J")?, "java/lang/Object");
		assert_eq!(merged("[[I", "[[J")?, "[Ljava/lang/Object;");
		assert_eq!(merged("[I", "B")?, "java/lang/Object");
		Ok(())
	}

	/// `static int f(int x) { return x == 0 ? 1 : 2; }`
	fn conditional() -> CodeBuffer {
		let mut labels = LabelGenerator::default();
		let else_ = labels.next_label();
		let end = labels.next_label();
		let mut code = CodeBuffer::default();
		code.instructions = vec![
			Instruction::ILoad(0),
			Instruction::IfNe(else_),
			Instruction::IConst1,
			Instruction::Goto(end),
			Instruction::IConst2,
			Instruction::IReturn,
		];
		code.label_positions.insert(else_, 4);
		code.label_positions.insert(end, 5);
		code
	}

	#[test]
	fn maxs() -> Result<()> {
		let code = conditional();
		assert_eq!(compute_maxs(&code, &[VerificationType::Integer])?, (1, 1));

		let mut code = CodeBuffer::default();
		code.instructions = vec![Instruction::LConst0, Instruction::LStore(3), Instruction::Pop, Instruction::Return];
		let error = compute_maxs(&code, &[]).unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::StackUnderflow { instruction: 2 }));
		Ok(())
	}

	#[test]
	fn frames_at_targets() -> Result<()> {
		let code = conditional();
		let computed = compute_frames(&code, JavaStr::from_str("Foo"), &[VerificationType::Integer], &ObjectHierarchy, &BTreeSet::new(), &HashMap::new())?;
		assert_eq!(computed.max_stack, 1);
		assert_eq!(computed.max_locals, 1);
		assert_eq!(computed.frames, vec![
			(4, Frame::Expanded { locals: vec![VerificationType::Integer], stack: vec![] }),
			(5, Frame::Expanded { locals: vec![VerificationType::Integer], stack: vec![VerificationType::Integer] }),
		]);
		assert!(computed.unreachable.is_empty());
		Ok(())
	}

	#[test]
	fn unreachable_code() -> Result<()> {
		let mut labels = LabelGenerator::default();
		let start = labels.next_label();
		let end = labels.next_label();
		let handler = labels.next_label();
		let mut code = CodeBuffer::default();
		code.instructions = vec![
			Instruction::Return,
			Instruction::Nop,
			Instruction::Nop,
			Instruction::AThrow,
		];
		code.label_positions.insert(start, 0);
		code.label_positions.insert(end, 3);
		code.label_positions.insert(handler, 3);
		code.try_catch_blocks.push(TryCatchBlock { start, end, handler, catch_type: None });

		let computed = compute_frames(&code, JavaStr::from_str("Foo"), &[], &ObjectHierarchy, &BTreeSet::new(), &HashMap::new())?;
		assert_eq!(computed.unreachable, vec![1..3]);
		assert_eq!(computed.frames, vec![
			(1, Frame::Expanded { locals: vec![], stack: vec![VerificationType::Object("java/lang/Throwable".into())] }),
			(3, Frame::Expanded { locals: vec![], stack: vec![VerificationType::Object("java/lang/Throwable".into())] }),
		]);
		assert_eq!(cut_range(0..3, &computed.unreachable), vec![0..1]);
		assert_eq!(cut_range(0..5, &[1..3]), vec![0..1, 3..5]);
		Ok(())
	}

	#[test]
	fn constructor_initializes_this() -> Result<()> {
		let mut labels = LabelGenerator::default();
		let target = labels.next_label();
		let mut code = CodeBuffer::default();
		code.instructions = vec![
			Instruction::ALoad(0),
			Instruction::InvokeSpecial(MethodRef {
				class: "java/lang/Object".into(),
				name: "<init>".into(),
				descriptor: "()V".into(),
			}, false),
			Instruction::Goto(target),
			Instruction::Return,
		];
		code.label_positions.insert(target, 3);

		let computed = compute_frames(&code, JavaStr::from_str("Foo"), &[VerificationType::UninitializedThis], &ObjectHierarchy, &BTreeSet::new(), &HashMap::new())?;
		assert_eq!(computed.frames, vec![
			(3, Frame::Expanded { locals: vec![VerificationType::Object("Foo".into())], stack: vec![] }),
		]);
		Ok(())
	}

	#[test]
	fn inconsistent_stacks() {
		let mut labels = LabelGenerator::default();
		let join = labels.next_label();
		let mut code = CodeBuffer::default();
		code.instructions = vec![
			Instruction::IConst0,
			Instruction::ILoad(0),
			Instruction::IfEq(join),
			Instruction::Pop,
			Instruction::Nop,
			Instruction::Return,
		];
		code.label_positions.insert(join, 4);

		let error = compute_frames(&code, JavaStr::from_str("Foo"), &[VerificationType::Integer], &ObjectHierarchy, &BTreeSet::new(), &HashMap::new()).unwrap_err();
		assert!(matches!(ClassError::find(&error), Some(ClassError::FrameInconsistent { instruction: 4, .. })));
	}

	#[test]
	fn handler_ranges() -> Result<()> {
		let mut labels = LabelGenerator::default();
		let start = labels.next_label();
		let end = labels.next_label();
		let handler = labels.next_label();
		let mut code = CodeBuffer::default();
		code.instructions = vec![Instruction::Nop, Instruction::Return];
		code.label_positions.insert(start, 0);
		code.label_positions.insert(end, 1);
		code.label_positions.insert(handler, 1);
		code.try_catch_blocks.push(TryCatchBlock { start, end, handler, catch_type: Some("java/io/IOException".into()) });

		let resolved = handlers(&code)?;
		assert_eq!(resolved.len(), 1);
		assert_eq!((resolved[0].range.clone(), resolved[0].handler), (0..1, 1));
		assert_eq!(resolved[0].catch_type, JavaStr::from_str("java/io/IOException"));

		code.try_catch_blocks[0] = TryCatchBlock { start: end, end: start, handler, catch_type: None };
		let error = handlers(&code).err().unwrap();
		assert!(matches!(ClassError::find(&error), Some(ClassError::BadExceptionHandler { index: 0, .. })));

		code.label_positions.insert(handler, 2);
		code.try_catch_blocks[0] = TryCatchBlock { start, end, handler, catch_type: None };
		let error = handlers(&code).err().unwrap();
		assert!(matches!(ClassError::find(&error), Some(ClassError::BadExceptionHandler { index: 0, .. })));
		Ok(())
	}
}
