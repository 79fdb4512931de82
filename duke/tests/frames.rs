use anyhow::Result;
use pretty_assertions::assert_eq;
use duke::{ClassError, ClassReader, ClassWriter, Compute, ReadFlags};
use duke::class_writer::hierarchy::SuperClasses;
use duke::tree::access::{ACC_PRIVATE, ACC_STATIC, ACC_SYNTHETIC};
use duke::tree::code::{Handle, Instruction, InvokeDynamic, Loadable, MethodRef};
use duke::tree::frame::{Frame, VerificationType};
use duke::tree::version::Version;
use duke::visitor::class::ClassVisitor;
use duke::visitor::method::MethodVisitor;

mod common;

fn method_ref(class: &str, name: &str, descriptor: &str) -> MethodRef {
	MethodRef { class: class.into(), name: name.into(), descriptor: descriptor.into() }
}

/// `Runnable r = () -> {}; r.run();` as `invokedynamic` through the `LambdaMetafactory`.
fn run_lambda<M: MethodVisitor>(m: &mut M) -> Result<()> {
	let metafactory = method_ref(
		"java/lang/invoke/LambdaMetafactory",
		"metafactory",
		"(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;",
	);
	m.visit_instruction(Instruction::InvokeDynamic(InvokeDynamic {
		name: "run".into(),
		descriptor: "()Ljava/lang/Runnable;".into(),
		handle: Handle::InvokeStatic(metafactory, false),
		arguments: vec![
			Loadable::MethodType("()V".into()),
			Loadable::MethodHandle(Handle::InvokeStatic(method_ref("Lambda", "lambda$run$0", "()V"), false)),
			Loadable::MethodType("()V".into()),
		],
	}))?;
	m.visit_instruction(Instruction::InvokeInterface(method_ref("java/lang/Runnable", "run", "()V")))
}

/// Writes the class `Lambda` with `run`, whose code `body` is, and the lambda body. No frames are written.
fn lambda_class<F>(descriptor: &str, body: F) -> Result<Vec<u8>>
where
	F: FnOnce(&mut duke::class_writer::MethodWriter) -> Result<()>,
{
	let mut writer = ClassWriter::new(Compute::Nothing);
	writer.visit(common::header("Lambda", Version::V1_8))?;
	let writer = common::method(writer, ACC_STATIC, "run", descriptor, (1, 1), body)?;
	let mut writer = common::method(writer, ACC_PRIVATE | ACC_STATIC | ACC_SYNTHETIC, "lambda$run$0", "()V", (0, 0), |m| {
		m.visit_instruction(Instruction::Return)
	})?;
	writer.visit_end()?;
	writer.to_bytes()
}

fn recompute(bytes: &[u8]) -> Result<Vec<u8>> {
	let reader = ClassReader::new(bytes)?;
	reader.accept(ClassWriter::from_reader(&reader, Compute::Frames)?, ReadFlags::EXPAND_FRAMES)?.to_bytes()
}

#[test]
fn straight_lambda_has_no_frames() -> Result<()> {
	let bytes = lambda_class("()V", |m| {
		run_lambda(m)?;
		m.visit_instruction(Instruction::Return)
	})?;

	let recomputed = recompute(&bytes)?;
	assert_eq!(common::dump(&recomputed, ReadFlags::empty())?.frames, vec![]);
	Ok(())
}

#[test]
fn lambda_behind_a_branch() -> Result<()> {
	let bytes = lambda_class("(I)V", |m| {
		let skip = m.new_label();
		m.visit_instruction(Instruction::ILoad(0))?;
		m.visit_instruction(Instruction::IfEq(skip))?;
		run_lambda(m)?;
		m.visit_label(skip)?;
		m.visit_instruction(Instruction::Return)
	})?;

	let recomputed = recompute(&bytes)?;
	assert_eq!(common::dump(&recomputed, ReadFlags::empty())?.frames, vec![Frame::Same]);
	assert_eq!(recompute(&recomputed)?, recomputed);
	Ok(())
}

/// `static A pick(boolean b) { return b ? new B() : new C(); }`
fn pick(mut writer: ClassWriter) -> Result<Vec<u8>> {
	writer.visit(common::header("Pick", Version::V1_8))?;
	let mut writer = common::method(writer, ACC_STATIC, "pick", "(Z)LA;", (0, 0), |m| {
		let other = m.new_label();
		let end = m.new_label();
		m.visit_instruction(Instruction::ILoad(0))?;
		m.visit_instruction(Instruction::IfEq(other))?;
		m.visit_instruction(Instruction::New("B".into()))?;
		m.visit_instruction(Instruction::Dup)?;
		m.visit_instruction(Instruction::InvokeSpecial(method_ref("B", "<init>", "()V"), false))?;
		m.visit_instruction(Instruction::Goto(end))?;
		m.visit_label(other)?;
		m.visit_instruction(Instruction::New("C".into()))?;
		m.visit_instruction(Instruction::Dup)?;
		m.visit_instruction(Instruction::InvokeSpecial(method_ref("C", "<init>", "()V"), false))?;
		m.visit_label(end)?;
		m.visit_instruction(Instruction::AReturn)
	})?;
	writer.visit_end()?;
	writer.to_bytes()
}

fn hierarchy() -> SuperClasses {
	let mut classes = SuperClasses::new();
	classes.insert("A".into(), Some("java/lang/Object".into()), false);
	classes.insert("B".into(), Some("A".into()), false);
	classes.insert("C".into(), Some("A".into()), false);
	classes
}

#[test]
fn join_uses_the_hierarchy() -> Result<()> {
	let bytes = pick(ClassWriter::new(Compute::Frames).with_hierarchy(hierarchy()))?;
	let recorder = common::dump(&bytes, ReadFlags::empty())?;
	assert_eq!(recorder.frames, vec![
		Frame::Same,
		Frame::SameLocals1StackItem(VerificationType::Object("A".into())),
	]);
	assert!(recorder.events.contains(&"maxs 2 1".to_owned()));
	Ok(())
}

/// `static void guarded() { try { risky(); } catch (IOException e) {} }`
fn guarded(compute: Compute) -> Result<Vec<u8>> {
	let mut writer = ClassWriter::new(compute);
	writer.visit(common::header("Guarded", Version::V1_8))?;
	let mut writer = common::method(writer, ACC_STATIC, "guarded", "()V", (1, 0), |m| {
		let start = m.new_label();
		let end = m.new_label();
		let handler = m.new_label();
		m.visit_try_catch_block(start, end, handler, Some("java/io/IOException".into()))?;
		m.visit_label(start)?;
		m.visit_instruction(Instruction::InvokeStatic(method_ref("Guarded", "risky", "()V"), false))?;
		m.visit_label(end)?;
		m.visit_instruction(Instruction::Return)?;
		m.visit_label(handler)?;
		m.visit_instruction(Instruction::Pop)?;
		m.visit_instruction(Instruction::Return)
	})?;
	writer.visit_end()?;
	writer.to_bytes()
}

#[test]
fn handler_starts_with_the_caught_exception() -> Result<()> {
	let recorder = common::dump(&guarded(Compute::Frames)?, ReadFlags::empty())?;
	assert_eq!(recorder.frames, vec![
		Frame::SameLocals1StackItem(VerificationType::Object("java/io/IOException".into())),
	]);
	assert!(recorder.events.contains(&"maxs 1 0".to_owned()));
	Ok(())
}

#[test]
fn handler_after_the_last_instruction() -> Result<()> {
	for compute in [Compute::Frames, Compute::Maxs, Compute::Nothing] {
		let mut writer = ClassWriter::new(compute);
		writer.visit(common::header("Guarded", Version::V1_8))?;
		let result = common::method(writer, ACC_STATIC, "f", "()V", (0, 0), |m| {
			let start = m.new_label();
			let end = m.new_label();
			let handler = m.new_label();
			m.visit_label(start)?;
			m.visit_instruction(Instruction::Nop)?;
			m.visit_label(end)?;
			m.visit_instruction(Instruction::Return)?;
			m.visit_label(handler)?;
			m.visit_try_catch_block(start, end, handler, None)
		}).and_then(|mut writer| {
			writer.visit_end()?;
			writer.to_bytes()
		});

		let Err(error) = result else {
			panic!("handler after the code was written with {compute:?}");
		};
		assert_eq!(
			ClassError::find(&error),
			Some(&ClassError::BadExceptionHandler { index: 0, reason: "the handler is placed after the last instruction" })
		);
	}
	Ok(())
}

#[test]
fn join_without_hierarchy_is_object() -> Result<()> {
	let bytes = pick(ClassWriter::new(Compute::Frames))?;
	assert_eq!(common::dump(&bytes, ReadFlags::empty())?.frames, vec![
		Frame::Same,
		Frame::SameLocals1StackItem(VerificationType::Object("java/lang/Object".into())),
	]);
	Ok(())
}

#[test]
fn strict_hierarchy_fails_on_unknown_classes() {
	let mut classes = SuperClasses::new();
	classes.insert("A".into(), Some("java/lang/Object".into()), false);

	let Err(error) = pick(ClassWriter::new(Compute::Frames).with_hierarchy(classes)) else {
		panic!("unknown classes were joined");
	};
	assert!(matches!(ClassError::find(&error), Some(ClassError::HierarchyQueryFailed { .. })), "{error:?}");

	let lenient = SuperClasses::new().lenient();
	assert!(pick(ClassWriter::new(Compute::Frames).with_hierarchy(lenient)).is_ok());
}
