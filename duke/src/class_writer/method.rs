use std::collections::HashMap;
use std::ops::ControlFlow;
use anyhow::{anyhow, bail, Context as _, Result};
use java_string::JavaString;
use log::debug;
use crate::{ClassError, ClassWrite};
use crate::class_constants::attribute;
use crate::class_writer::{write_attribute, write_attribute_fix_length, write_unknown_attributes, Compute, Context};
use crate::class_writer::annotation::{annotation_prefix, code_type_annotation_prefix, type_annotation_prefix, AnnotationResidual, AnnotationTarget, AnnotationWriter, Annotations, CodeTarget, ParameterAnnotations};
use crate::class_writer::assembler::{assemble, replace_with_athrow, Assembled};
use crate::class_writer::frames::{compute_frames, compute_maxs, cut_range, handlers};
use crate::class_writer::stack_map::write_stack_map_table;
use crate::class_writer::symbols::SymbolTable;
use crate::tree::access::{ACC_DEPRECATED, ACC_SYNTHETIC};
use crate::tree::attribute::Attribute;
use crate::tree::class::RawMember;
use crate::tree::code::{Instruction, Label, LabelGenerator, LocalVariable};
use crate::tree::descriptor::parse_method_descriptor;
use crate::tree::frame::{initial_locals, Frame};
use crate::tree::type_annotation::{TypePath, TypeReference};
use crate::tree::version::Version;
use crate::visitor::method::MethodVisitor;

/// An exception handler, as given to [`MethodVisitor::visit_try_catch_block`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TryCatchBlock {
	pub(crate) start: Label,
	pub(crate) end: Label,
	pub(crate) handler: Label,
	pub(crate) catch_type: Option<JavaString>,
}

/// A type annotation inside code. The offsets it refers to are only known once the code is assembled.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CodeTypeAnnotation {
	pub(crate) target: CodeTarget,
	pub(crate) type_reference: TypeReference,
	pub(crate) visible: bool,
	/// The type path, the type index and the element value pairs.
	pub(crate) bytes: Vec<u8>,
}

/// The code events of a method, kept until the method ends.
///
/// Labels are positions between instructions: a label maps to the index of the instruction it's placed before, or to
/// the number of instructions if it's placed after the last one.
#[derive(Debug, Default)]
pub(crate) struct CodeBuffer {
	pub(crate) labels: LabelGenerator,
	pub(crate) instructions: Vec<Instruction>,
	pub(crate) label_positions: HashMap<Label, usize>,
	/// Frames by the index of the instruction they're at.
	pub(crate) frames: Vec<(usize, Frame)>,
	pub(crate) line_numbers: Vec<(u16, Label)>,
	pub(crate) try_catch_blocks: Vec<TryCatchBlock>,
	pub(crate) local_variables: Vec<LocalVariable>,
	pub(crate) type_annotations: Vec<CodeTypeAnnotation>,
	pub(crate) attributes: Vec<Attribute>,
	pub(crate) max_stack: u16,
	pub(crate) max_locals: u16,
}

impl CodeBuffer {
	pub(crate) fn position(&self, label: Label) -> Result<usize> {
		self.label_positions.get(&label).copied()
			.ok_or_else(|| anyhow!(ClassError::LabelUnresolved { label: label.id }))
	}

	fn place_label(&mut self, label: Label) -> Result<()> {
		if label.id >= self.labels.len() {
			bail!(ClassError::LabelUnresolved { label: label.id });
		}
		if self.label_positions.insert(label, self.instructions.len()).is_some() {
			bail!("label {} is placed twice", label.id);
		}
		Ok(())
	}

	/// Makes sure there's a label at each `new` instruction, returning them by instruction index.
	fn new_labels(&mut self) -> HashMap<usize, Label> {
		let mut labels_at: HashMap<usize, Label> = HashMap::new();
		for (&label, &index) in &self.label_positions {
			labels_at.entry(index)
				.and_modify(|existing| *existing = (*existing).min(label))
				.or_insert(label);
		}

		let mut new_labels = HashMap::new();
		for (index, instruction) in self.instructions.iter().enumerate() {
			if matches!(instruction, Instruction::New(_)) {
				let label = match labels_at.get(&index) {
					Some(&label) => label,
					None => {
						let label = self.labels.next_label();
						self.label_positions.insert(label, index);
						label
					},
				};
				new_labels.insert(index, label);
			}
		}
		new_labels
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
	Header,
	Code,
	Maxs,
	End,
}

/// Everything about a method except the [`Context`].
pub struct MethodState {
	access: u32,
	name: JavaString,
	descriptor: JavaString,
	signature: Option<JavaString>,
	exceptions: Vec<JavaString>,
	stage: Stage,
	/// The `method_info` as copied from a class reader.
	raw: Option<Vec<u8>>,
	parameters: Vec<(Option<JavaString>, u16)>,
	annotation_default: Option<Vec<u8>>,
	annotations: Annotations,
	/// Visible, then invisible.
	parameter_annotations: [ParameterAnnotations; 2],
	attributes: Vec<Attribute>,
	has_code: bool,
	code: CodeBuffer,
	/// The finished `method_info`.
	bytes: Vec<u8>,
}

impl MethodState {
	fn check_header(&self, got: &'static str) -> Result<()> {
		let expected = match self.stage {
			_ if self.raw.is_some() => "visit_end",
			Stage::Header => return Ok(()),
			Stage::Code => "visit_maxs",
			Stage::Maxs => "visit_end",
			Stage::End => "finish_method",
		};
		bail!(ClassError::IllegalState { expected, got })
	}

	fn check_code(&self, got: &'static str) -> Result<()> {
		let expected = match self.stage {
			_ if self.raw.is_some() => "visit_end",
			Stage::Code => return Ok(()),
			Stage::Header => "visit_code",
			Stage::Maxs => "visit_end",
			Stage::End => "finish_method",
		};
		bail!(ClassError::IllegalState { expected, got })
	}
}

/// Writes a method, created by [`ClassWriter`][crate::ClassWriter].
pub struct MethodWriter {
	context: Context,
	state: MethodState,
}

impl MethodWriter {
	pub(crate) fn new(context: Context, access: u32, name: JavaString, descriptor: JavaString, signature: Option<JavaString>, exceptions: Vec<JavaString>) -> MethodWriter {
		MethodWriter {
			context,
			state: MethodState {
				access,
				name,
				descriptor,
				signature,
				exceptions,
				stage: Stage::Header,
				raw: None,
				parameters: Vec::new(),
				annotation_default: None,
				annotations: Annotations::default(),
				parameter_annotations: Default::default(),
				attributes: Vec::new(),
				has_code: false,
				code: CodeBuffer::default(),
				bytes: Vec::new(),
			},
		}
	}

	/// Gives back the context and the `method_info`.
	pub(crate) fn finish(self) -> Result<(Context, Vec<u8>)> {
		if self.state.stage != Stage::End {
			bail!(ClassError::IllegalState { expected: "visit_end", got: "finish_method" });
		}
		Ok((self.context, self.state.bytes))
	}

	fn start_annotation(self, target: AnnotationTarget, prefix: Vec<u8>)
		-> Result<ControlFlow<Self, (AnnotationResidual<MethodState>, AnnotationWriter)>>
	{
		let annotation_writer = match target {
			AnnotationTarget::Default => AnnotationWriter::annotation_default(self.context),
			_ => AnnotationWriter::annotation(self.context, prefix),
		};
		Ok(ControlFlow::Continue((AnnotationResidual { parent: self.state, target }, annotation_writer)))
	}
}

impl MethodVisitor for MethodWriter {
	type AnnotationVisitor = AnnotationWriter;
	type AnnotationResidual = AnnotationResidual<MethodState>;

	fn visit_parameter(&mut self, name: Option<JavaString>, access: u16) -> Result<()> {
		self.state.check_header("visit_parameter")?;
		self.state.parameters.push((name, access));
		Ok(())
	}

	fn visit_annotation_default(self) -> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		self.state.check_header("visit_annotation_default")?;
		self.start_annotation(AnnotationTarget::Default, Vec::new())
	}

	fn visit_annotation(mut self, descriptor: JavaString, visible: bool) -> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>> {
		self.state.check_header("visit_annotation")?;
		let prefix = annotation_prefix(&mut self.context.symbols, &descriptor)?;
		self.start_annotation(AnnotationTarget::Plain { visible }, prefix)
	}

	fn visit_type_annotation(mut self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>
	{
		self.state.check_header("visit_type_annotation")?;
		let prefix = type_annotation_prefix(&mut self.context.symbols, type_reference, &type_path, &descriptor)?;
		self.start_annotation(AnnotationTarget::Type { visible }, prefix)
	}

	fn visit_annotable_parameter_count(&mut self, count: u8, visible: bool) -> Result<()> {
		self.state.check_header("visit_annotable_parameter_count")?;
		self.state.parameter_annotations[!visible as usize].count = Some(count);
		Ok(())
	}

	fn visit_parameter_annotation(mut self, parameter: u8, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>
	{
		self.state.check_header("visit_parameter_annotation")?;
		let prefix = annotation_prefix(&mut self.context.symbols, &descriptor)?;
		self.start_annotation(AnnotationTarget::Parameter { parameter, visible }, prefix)
	}

	fn finish_annotation(this: Self::AnnotationResidual, annotation_visitor: Self::AnnotationVisitor) -> Result<Self> {
		let (context, bytes) = annotation_visitor.finish()?;
		let mut state = this.parent;
		match this.target {
			AnnotationTarget::Plain { visible } => state.annotations.add(bytes, visible, false),
			AnnotationTarget::Type { visible } => state.annotations.add(bytes, visible, true),
			AnnotationTarget::Default => state.annotation_default = Some(bytes),
			AnnotationTarget::Parameter { parameter, visible } => {
				state.parameter_annotations[!visible as usize].annotations.push((parameter, bytes));
			},
			AnnotationTarget::Code { target, type_reference, visible } => {
				state.code.type_annotations.push(CodeTypeAnnotation { target, type_reference, visible, bytes });
			},
		}
		Ok(MethodWriter { context, state })
	}

	fn visit_attribute(&mut self, attribute: Attribute) -> Result<()> {
		self.state.check_header("visit_attribute")?;
		self.state.attributes.push(attribute);
		Ok(())
	}

	fn copy_raw(&mut self, raw: &RawMember<'_>) -> Result<bool> {
		let state = &self.state;
		if state.stage != Stage::Header || state.raw.is_some() || self.context.compute != Compute::Nothing
			|| raw.access != state.access || !self.context.symbols.shares_pool(raw.pool) {
			return Ok(false);
		}

		let symbols = &mut self.context.symbols;
		let exception_indices = state.exceptions.iter()
			.map(|exception| symbols.put_class(exception))
			.collect::<Result<Vec<_>>>()?;
		let same = raw.name_index == symbols.put_utf8(&state.name)?
			&& raw.descriptor_index == symbols.put_utf8(&state.descriptor)?
			&& raw.signature_index == state.signature.as_deref().map(|signature| symbols.put_utf8(signature)).transpose()?
			&& raw.exception_indices == exception_indices;
		if !same {
			return Ok(false);
		}

		debug!("copying method {}{} unchanged", state.name, state.descriptor);
		let mut bytes = Vec::with_capacity(6 + raw.attributes.len());
		bytes.write_u16(raw.access_flags)?;
		bytes.write_u16(raw.name_index)?;
		bytes.write_u16(raw.descriptor_index)?;
		bytes.write_u8_slice(raw.attributes)?;
		self.state.raw = Some(bytes);
		Ok(true)
	}

	fn visit_code(&mut self) -> Result<()> {
		self.state.check_header("visit_code")?;
		self.state.stage = Stage::Code;
		self.state.has_code = true;
		Ok(())
	}

	fn new_label(&mut self) -> Label {
		self.state.code.labels.next_label()
	}

	fn visit_frame(&mut self, frame: Frame) -> Result<()> {
		self.state.check_code("visit_frame")?;
		// computed frames replace the given ones
		if self.context.compute != Compute::Frames {
			let code = &mut self.state.code;
			code.frames.push((code.instructions.len(), frame));
		}
		Ok(())
	}

	fn visit_instruction(&mut self, instruction: Instruction) -> Result<()> {
		self.state.check_code("visit_instruction")?;
		self.state.code.instructions.push(instruction);
		Ok(())
	}

	fn visit_label(&mut self, label: Label) -> Result<()> {
		self.state.check_code("visit_label")?;
		self.state.code.place_label(label)
	}

	fn visit_insn_annotation(mut self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>
	{
		self.state.check_code("visit_insn_annotation")?;
		if !type_reference.is_instruction_target() {
			bail!("type annotation target {type_reference:?} isn't about an instruction");
		}
		let Some(index) = self.state.code.instructions.len().checked_sub(1) else {
			bail!(ClassError::IllegalState { expected: "visit_instruction", got: "visit_insn_annotation" });
		};
		let prefix = code_type_annotation_prefix(&mut self.context.symbols, &type_path, &descriptor)?;
		let target = AnnotationTarget::Code { target: CodeTarget::Instruction(index), type_reference, visible };
		self.start_annotation(target, prefix)
	}

	fn visit_try_catch_block(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<JavaString>) -> Result<()> {
		self.state.check_code("visit_try_catch_block")?;
		self.state.code.try_catch_blocks.push(TryCatchBlock { start, end, handler, catch_type });
		Ok(())
	}

	fn visit_try_catch_annotation(mut self, type_reference: TypeReference, type_path: TypePath, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>
	{
		self.state.check_code("visit_try_catch_annotation")?;
		let TypeReference::ExceptionParameter { index } = type_reference else {
			bail!("type annotation target {type_reference:?} isn't about an exception parameter");
		};
		if index as usize >= self.state.code.try_catch_blocks.len() {
			bail!("exception parameter annotation on try catch block {index}, but there are only {}", self.state.code.try_catch_blocks.len());
		}
		let prefix = code_type_annotation_prefix(&mut self.context.symbols, &type_path, &descriptor)?;
		let target = AnnotationTarget::Code { target: CodeTarget::TryCatch(index), type_reference, visible };
		self.start_annotation(target, prefix)
	}

	fn visit_local_variable(&mut self, local_variable: LocalVariable) -> Result<()> {
		self.state.check_code("visit_local_variable")?;
		self.state.code.local_variables.push(local_variable);
		Ok(())
	}

	fn visit_local_variable_annotation(mut self, type_reference: TypeReference, type_path: TypePath, ranges: Vec<(Label, Label, u16)>, descriptor: JavaString, visible: bool)
		-> Result<ControlFlow<Self, (Self::AnnotationResidual, Self::AnnotationVisitor)>>
	{
		self.state.check_code("visit_local_variable_annotation")?;
		if !matches!(type_reference, TypeReference::LocalVariable | TypeReference::ResourceVariable) {
			bail!("type annotation target {type_reference:?} isn't about a local variable");
		}
		let prefix = code_type_annotation_prefix(&mut self.context.symbols, &type_path, &descriptor)?;
		let target = AnnotationTarget::Code { target: CodeTarget::LocalVariable(ranges), type_reference, visible };
		self.start_annotation(target, prefix)
	}

	fn visit_line_number(&mut self, line: u16, start: Label) -> Result<()> {
		self.state.check_code("visit_line_number")?;
		self.state.code.line_numbers.push((line, start));
		Ok(())
	}

	fn visit_code_attribute(&mut self, attribute: Attribute) -> Result<()> {
		self.state.check_code("visit_code_attribute")?;
		self.state.code.attributes.push(attribute);
		Ok(())
	}

	fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<()> {
		self.state.check_code("visit_maxs")?;
		self.state.code.max_stack = max_stack;
		self.state.code.max_locals = max_locals;
		self.state.stage = Stage::Maxs;
		Ok(())
	}

	fn visit_end(&mut self) -> Result<()> {
		match self.state.stage {
			_ if self.state.raw.is_some() => {},
			Stage::Header | Stage::Maxs => {},
			Stage::Code => bail!(ClassError::IllegalState { expected: "visit_maxs", got: "visit_end" }),
			Stage::End => bail!(ClassError::IllegalState { expected: "finish_method", got: "visit_end" }),
		}
		self.state.bytes = write_method(&mut self.context, &mut self.state)
			.with_context(|| anyhow!("failed to write method {}{}", self.state.name, self.state.descriptor))?;
		self.state.stage = Stage::End;
		Ok(())
	}
}

/// The start offset and the length of a label range.
fn label_range(assembled: &Assembled, code: &CodeBuffer, start: Label, end: Label) -> Result<(u16, u16)> {
	let start = assembled.label_offset(code, start)?;
	let end = assembled.label_offset(code, end)?;
	let length = end.checked_sub(start)
		.ok_or_else(|| anyhow!("range ends at {end} before it starts at {start}"))?;
	Ok((start, length))
}

fn write_code_type_annotation(w: &mut Vec<u8>, annotation: &CodeTypeAnnotation, code: &CodeBuffer, assembled: &Assembled, handler_indices: &[Option<usize>]) -> Result<()> {
	w.write_u8(annotation.type_reference.target_type())?;
	match &annotation.target {
		&CodeTarget::Instruction(index) => {
			w.write_u16(assembled.offset(index)?)?;
			match annotation.type_reference {
				TypeReference::Cast { type_argument } |
				TypeReference::ConstructorInvocationTypeArgument { type_argument } |
				TypeReference::MethodInvocationTypeArgument { type_argument } |
				TypeReference::ConstructorReferenceTypeArgument { type_argument } |
				TypeReference::MethodReferenceTypeArgument { type_argument } => w.write_u8(type_argument)?,
				_ => {},
			}
		},
		CodeTarget::LocalVariable(ranges) => {
			w.write_slice(
				ranges,
				|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("too many local variable ranges")),
				|w, &(start, end, index)| {
					let (start, length) = label_range(assembled, code, start, end)?;
					w.write_u16(start)?;
					w.write_u16(length)?;
					w.write_u16(index)
				}
			)?;
		},
		&CodeTarget::TryCatch(index) => {
			let index = handler_indices.get(index as usize).copied().flatten()
				.ok_or_else(|| anyhow!("no exception handler {index}"))?;
			w.write_usize_as_u16(index)?;
		},
	}
	w.write_u8_slice(&annotation.bytes)
}

/// Writes the content of the `Code` attribute, computing what `context.compute` asks for.
fn write_code(context: &mut Context, method: &mut MethodState) -> Result<Vec<u8>> {
	let initial_locals = initial_locals(&context.class_name, method.access, &method.name, &method.descriptor)?;
	let frames_computed = context.compute == Compute::Frames && context.version.has_stack_map_frames();
	let new_labels = if frames_computed { method.code.new_labels() } else { HashMap::new() };
	let code = &method.code;
	let handlers = handlers(code)?;

	let mut assembled = assemble(code, &mut context.symbols, context.widen_branches)?;

	let (max_stack, max_locals, frames, unreachable) = match context.compute {
		Compute::Frames if frames_computed => {
			let computed = compute_frames(code, &context.class_name, &initial_locals, context.hierarchy.as_ref(), &assembled.widened, &new_labels)?;
			for range in &computed.unreachable {
				replace_with_athrow(&mut assembled, range.clone());
			}
			(computed.max_stack, computed.max_locals, computed.frames, computed.unreachable)
		},
		// before 1.6 there are no frames to compute
		Compute::Frames => {
			let (max_stack, max_locals) = compute_maxs(code, &initial_locals)?;
			(max_stack, max_locals, Vec::new(), Vec::new())
		},
		Compute::Maxs => {
			let (max_stack, max_locals) = compute_maxs(code, &initial_locals)?;
			(max_stack, max_locals, code.frames.clone(), Vec::new())
		},
		Compute::Nothing => (code.max_stack, code.max_locals, code.frames.clone(), Vec::new()),
	};

	// a widened conditional jump needs a new frame after it, which only computed frames have
	if !frames_computed && !frames.is_empty() {
		if let Some(&instruction) = assembled.widened.iter().find(|&&index| code.instructions[index].is_conditional()) {
			bail!(ClassError::BranchOverflow { instruction });
		}
	}

	let mut w = Vec::new();
	w.write_u16(max_stack)?;
	w.write_u16(max_locals)?;
	w.write_usize_as_u32(assembled.code.len())?;
	w.write_u8_slice(&assembled.code)?;

	// The handler ranges, without the unreachable code. The new index of each handler, for exception parameter
	// annotations.
	let mut handler_indices = Vec::with_capacity(code.try_catch_blocks.len());
	let mut exception_table = Vec::with_capacity(code.try_catch_blocks.len());
	for (block, resolved) in code.try_catch_blocks.iter().zip(&handlers) {
		let range = resolved.range.clone();
		let pieces = if unreachable.is_empty() { vec![range] } else { cut_range(range, &unreachable) };
		if pieces.is_empty() {
			debug!("removing an exception handler of {}{} that only covers unreachable code", method.name, method.descriptor);
			handler_indices.push(None);
			continue;
		}
		handler_indices.push(Some(exception_table.len()));

		let handler = assembled.label_offset(code, block.handler)?;
		let catch_type = context.symbols.put_optional(block.catch_type.as_deref(), SymbolTable::put_class)?;
		for piece in pieces {
			exception_table.push((assembled.offset(piece.start)?, assembled.offset(piece.end)?, handler, catch_type));
		}
	}
	w.write_slice(
		&exception_table,
		|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("too many exception handlers")),
		|w, &(start, end, handler, catch_type)| {
			w.write_u16(start)?;
			w.write_u16(end)?;
			w.write_u16(handler)?;
			w.write_u16(catch_type)
		}
	)?;

	let mut attribute_count = 0;
	let mut buffer = Vec::new();

	if !frames.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, &mut context.symbols, attribute::STACK_MAP_TABLE, |w, symbols| {
			write_stack_map_table(w, symbols, code, &assembled, &frames, &initial_locals)
		})?;
	}

	if !code.line_numbers.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, &mut context.symbols, attribute::LINE_NUMBER_TABLE, |w, _| {
			w.write_slice(
				&code.line_numbers,
				|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("too many line numbers")),
				|w, &(line, start)| {
					w.write_u16(assembled.label_offset(code, start)?)?;
					w.write_u16(line)
				}
			)
		})?;
	}

	if !code.local_variables.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, &mut context.symbols, attribute::LOCAL_VARIABLE_TABLE, |w, symbols| {
			w.write_slice(
				&code.local_variables,
				|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("too many local variables")),
				|w, variable| {
					let (start, length) = label_range(&assembled, code, variable.start, variable.end)?;
					w.write_u16(start)?;
					w.write_u16(length)?;
					w.write_u16(symbols.put_utf8(&variable.name)?)?;
					w.write_u16(symbols.put_utf8(&variable.descriptor)?)?;
					w.write_u16(variable.index)
				}
			)
		})?;
	}

	let typed: Vec<(&LocalVariable, &JavaString)> = code.local_variables.iter()
		.filter_map(|variable| Some((variable, variable.signature.as_ref()?)))
		.collect();
	if !typed.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, &mut context.symbols, attribute::LOCAL_VARIABLE_TYPE_TABLE, |w, symbols| {
			w.write_slice(
				&typed,
				|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("too many local variable types")),
				|w, &(variable, signature)| {
					let (start, length) = label_range(&assembled, code, variable.start, variable.end)?;
					w.write_u16(start)?;
					w.write_u16(length)?;
					w.write_u16(symbols.put_utf8(&variable.name)?)?;
					w.write_u16(symbols.put_utf8(signature)?)?;
					w.write_u16(variable.index)
				}
			)
		})?;
	}

	for (visible, name) in [(true, attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS), (false, attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS)] {
		let annotations: Vec<&CodeTypeAnnotation> = code.type_annotations.iter()
			.filter(|annotation| annotation.visible == visible)
			.filter(|annotation| match annotation.target {
				CodeTarget::TryCatch(index) => handler_indices.get(index as usize).is_some_and(Option::is_some),
				_ => true,
			})
			.collect();
		if annotations.is_empty() {
			continue;
		}
		attribute_count += 1;
		write_attribute(&mut buffer, &mut context.symbols, name, |w, _| {
			w.write_slice(
				&annotations,
				|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("too many type annotations")),
				|w, annotation| write_code_type_annotation(w, annotation, code, &assembled, &handler_indices)
			)
		})?;
	}

	attribute_count += write_unknown_attributes(&mut buffer, &mut context.symbols, &code.attributes)?;

	w.write_usize_as_u16(attribute_count).with_context(|| anyhow!("too many code attributes"))?;
	w.write_u8_slice(&buffer)?;
	Ok(w)
}

/// Writes the `method_info`.
fn write_method(context: &mut Context, method: &mut MethodState) -> Result<Vec<u8>> {
	if let Some(raw) = method.raw.take() {
		return Ok(raw);
	}

	let synthetic_attribute = method.access & ACC_SYNTHETIC != 0 && context.version < Version::V1_5;
	let mask = if synthetic_attribute { ACC_DEPRECATED | ACC_SYNTHETIC } else { ACC_DEPRECATED };

	let mut w = Vec::new();
	w.write_u16((method.access & !mask) as u16)?;
	w.write_u16(context.symbols.put_utf8(&method.name)?)?;
	w.write_u16(context.symbols.put_utf8(&method.descriptor)?)?;

	let mut attribute_count = 0;
	let mut buffer = Vec::new();

	if method.has_code {
		let content = write_code(context, method)?;
		attribute_count += 1;
		write_attribute(&mut buffer, &mut context.symbols, attribute::CODE, |w, _| w.write_u8_slice(&content))?;
	}
	let symbols = &mut context.symbols;

	if !method.exceptions.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, symbols, attribute::EXCEPTIONS, |w, symbols| {
			w.write_slice(
				&method.exceptions,
				|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("too many exceptions")),
				|w, exception| w.write_u16(symbols.put_class(exception)?)
			)
		})?;
	}
	if synthetic_attribute {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, symbols, attribute::SYNTHETIC, 0)?;
	}
	if let Some(signature) = &method.signature {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, symbols, attribute::SIGNATURE, 2)?;
		buffer.write_u16(symbols.put_utf8(signature)?)?;
	}
	if method.access & ACC_DEPRECATED != 0 {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, symbols, attribute::DEPRECATED, 0)?;
	}

	attribute_count += method.annotations.write_annotations(&mut buffer, symbols)?;

	let parameters = parse_method_descriptor(&method.descriptor)?.parameters.len();
	let parameter_attributes = [attribute::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS, attribute::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS];
	for (annotations, name) in method.parameter_annotations.iter().zip(parameter_attributes) {
		if !annotations.is_empty() {
			attribute_count += 1;
			write_attribute(&mut buffer, symbols, name, |w, _| annotations.write(w, parameters))?;
		}
	}

	attribute_count += method.annotations.write_type_annotations(&mut buffer, symbols)?;

	if let Some(annotation_default) = &method.annotation_default {
		attribute_count += 1;
		write_attribute(&mut buffer, symbols, attribute::ANNOTATION_DEFAULT, |w, _| w.write_u8_slice(annotation_default))?;
	}
	if !method.parameters.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, symbols, attribute::METHOD_PARAMETERS, |w, symbols| {
			w.write_slice(
				&method.parameters,
				|w, size| w.write_usize_as_u8(size).with_context(|| anyhow!("too many method parameters")),
				|w, (name, access)| {
					w.write_u16(symbols.put_optional(name.as_deref(), SymbolTable::put_utf8)?)?;
					w.write_u16(*access)
				}
			)
		})?;
	}

	attribute_count += write_unknown_attributes(&mut buffer, symbols, &method.attributes)?;

	w.write_usize_as_u16(attribute_count).with_context(|| anyhow!("too many attributes"))?;
	w.write_u8_slice(&buffer)?;
	Ok(w)
}

#[cfg(test)]
mod testing {
	use std::ops::ControlFlow;
	use anyhow::{bail, Result};
	use pretty_assertions::assert_eq;
	use crate::ClassError;
	use crate::class_constants::opcode;
	use crate::class_writer::{Compute, Context};
	use crate::class_writer::method::MethodWriter;
	use crate::tree::access::ACC_STATIC;
	use crate::tree::code::Instruction;
	use crate::tree::type_annotation::{TypePath, TypeReference};
	use crate::tree::version::Version;
	use crate::visitor::method::MethodVisitor;

	fn writer(compute: Compute) -> MethodWriter {
		let mut context = Context::new(compute);
		context.class_name = "Foo".into();
		context.version = Version::V1_8;
		MethodWriter::new(context, ACC_STATIC, "f".into(), "()I".into(), None, Vec::new())
	}

	#[test]
	fn code_events_need_visit_code() {
		let mut writer = writer(Compute::Nothing);
		let error = writer.visit_instruction(Instruction::Return).unwrap_err();
		assert_eq!(
			ClassError::find(&error),
			Some(&ClassError::IllegalState { expected: "visit_code", got: "visit_instruction" })
		);
	}

	#[test]
	fn call_order() -> Result<()> {
		let mut writer = writer(Compute::Nothing);
		writer.visit_code()?;
		let error = writer.visit_parameter(None, 0).unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::IllegalState { expected: "visit_maxs", got: "visit_parameter" }));

		let error = writer.visit_end().unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::IllegalState { expected: "visit_maxs", got: "visit_end" }));

		writer.visit_maxs(0, 0)?;
		let error = writer.visit_instruction(Instruction::Nop).unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::IllegalState { expected: "visit_end", got: "visit_instruction" }));
		Ok(())
	}

	#[test]
	fn labels() -> Result<()> {
		let mut writer = writer(Compute::Nothing);
		let label = writer.new_label();
		writer.visit_code()?;
		writer.visit_label(label)?;
		assert!(writer.visit_label(label).is_err());

		let mut other = self::writer(Compute::Nothing);
		let foreign = other.new_label();
		let mut writer = self::writer(Compute::Nothing);
		writer.visit_code()?;
		let error = writer.visit_label(foreign).unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::LabelUnresolved { label: 0 }));

		let mut writer = self::writer(Compute::Nothing);
		let unplaced = writer.new_label();
		writer.visit_code()?;
		writer.visit_instruction(Instruction::Goto(unplaced))?;
		writer.visit_maxs(0, 0)?;
		let error = writer.visit_end().unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::LabelUnresolved { label: 0 }));
		Ok(())
	}

	#[test]
	fn instruction_annotation_needs_instruction() -> Result<()> {
		let mut writer = writer(Compute::Nothing);
		writer.visit_code()?;
		let Err(error) = writer.visit_insn_annotation(TypeReference::New, TypePath::default(), "LA;".into(), true) else {
			bail!("annotation without instruction was accepted");
		};
		assert_eq!(
			ClassError::find(&error),
			Some(&ClassError::IllegalState { expected: "visit_instruction", got: "visit_insn_annotation" })
		);
		Ok(())
	}

	#[test]
	fn computed_maxs() -> Result<()> {
		let mut writer = writer(Compute::Maxs);
		writer.visit_code()?;
		writer.visit_instruction(Instruction::BiPush(42))?;
		writer.visit_instruction(Instruction::IReturn)?;
		writer.visit_maxs(0, 0)?;
		writer.visit_end()?;
		let (_, bytes) = writer.finish()?;

		// #1 "f", #2 "()I", #3 "Code"
		assert_eq!(bytes, vec![
			0x00, 0x08, 0x00, 0x01, 0x00, 0x02,
			0x00, 0x01,
			0x00, 0x03, 0x00, 0x00, 0x00, 0x0f,
			0x00, 0x01, 0x00, 0x00,
			0x00, 0x00, 0x00, 0x03, opcode::BIPUSH, 42, opcode::IRETURN,
			0x00, 0x00,
			0x00, 0x00,
		]);
		Ok(())
	}

	#[test]
	fn annotations_in_code() -> Result<()> {
		let mut writer = writer(Compute::Nothing);
		writer.visit_code()?;
		writer.visit_instruction(Instruction::New("A".into()))?;
		let ControlFlow::Continue((residual, annotation)) = writer.visit_insn_annotation(TypeReference::New, TypePath::default(), "LB;".into(), false)? else {
			bail!("annotation refused");
		};
		let mut writer = MethodWriter::finish_annotation(residual, annotation)?;
		writer.visit_instruction(Instruction::Pop)?;
		writer.visit_instruction(Instruction::Return)?;
		writer.visit_maxs(1, 0)?;
		writer.visit_end()?;
		let (_, bytes) = writer.finish()?;

		// #1 "LB;", #2 "f", #3 "()I", #4 "A", #5 class A, #6 "RuntimeInvisibleTypeAnnotations", #7 "Code"
		let code_attribute = &bytes[8..];
		assert_eq!(&code_attribute[..2], &[0x00, 0x07]);
		let annotation_attribute = &code_attribute[6 + 2 + 2 + 4 + 5 + 2 + 2..];
		assert_eq!(annotation_attribute, &[
			0x00, 0x06, 0x00, 0x00, 0x00, 0x0a,
			0x00, 0x01,
			0x44, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00,
		]);
		Ok(())
	}
}
