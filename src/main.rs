use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, error, info, LevelFilter};
use duke::{ClassError, ClassReader, ClassWriter, Compute, ReadFlags, SuperClasses};
use duke::visitor::pass_through::PassThrough;
use crate::inputs::ClassFile;
use crate::members::Members;

mod inputs;
mod members;

/// Reads class files, writes them back and reads the result again, reporting every class that doesn't survive.
#[derive(Debug, Parser)]
struct Cli {
	/// Be verbose.
	#[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
	verbose: u8,

	/// What the writer computes when re-emitting the classes.
	#[arg(long = "compute", value_enum, default_value_t)]
	compute: ComputeArg,

	/// Read the frames uncompressed before re-emitting.
	#[arg(long = "expand-frames")]
	expand_frames: bool,

	/// Fail on classes not found in the inputs, instead of treating them as direct subclasses of `java/lang/Object`.
	#[arg(long = "strict-hierarchy")]
	strict_hierarchy: bool,

	/// Class files, directories containing class files, or jars.
	#[arg(required = true)]
	paths: Vec<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum ComputeArg {
	Nothing,
	Maxs,
	#[default]
	Frames,
}

impl From<ComputeArg> for Compute {
	fn from(value: ComputeArg) -> Self {
		match value {
			ComputeArg::Nothing => Compute::Nothing,
			ComputeArg::Maxs => Compute::Maxs,
			ComputeArg::Frames => Compute::Frames,
		}
	}
}

fn setup_logging(verbose: u8) -> Result<()> {
	let level = match verbose {
		0 => LevelFilter::Warn,
		1 => LevelFilter::Info,
		2 => LevelFilter::Debug,
		_ => LevelFilter::Trace,
	};
	fern::Dispatch::new()
		.format(|out, message, record| {
			out.finish(format_args!("[{} {}] {}", record.level(), record.target(), message))
		})
		.level(level)
		.chain(std::io::stderr())
		.apply()
		.with_context(|| anyhow!("failed to set up logging"))
}

fn hierarchy(classes: &[ClassFile], strict: bool) -> SuperClasses {
	let mut hierarchy = if strict { SuperClasses::new() } else { SuperClasses::new().lenient() };
	for class in classes {
		// a class that can't be read fails later on, with a better message
		if let Ok(reader) = ClassReader::new(&class.bytes) {
			if let Err(e) = hierarchy.insert_class(&reader) {
				debug!("not adding {} to the hierarchy: {e:#}", class.name);
			}
		}
	}
	hierarchy
}

/// Checks one class, returning what to print for it.
fn verify(class: &ClassFile, cli: &Cli, hierarchy: &Rc<SuperClasses>) -> Result<String> {
	let bytes = class.bytes.as_slice();
	let reader = ClassReader::new(bytes)?;

	let copy = reader.accept(ClassWriter::from_reader(&reader, Compute::Nothing)?, ReadFlags::empty())
		.with_context(|| anyhow!("failed to copy the class"))?
		.to_bytes()?;
	if copy != bytes {
		bail!("copying the class without changes gave different bytes ({} instead of {} bytes)", copy.len(), bytes.len());
	}

	let flags = if cli.expand_frames { ReadFlags::EXPAND_FRAMES } else { ReadFlags::empty() };
	let writer = ClassWriter::new(cli.compute.into()).with_hierarchy(Rc::clone(hierarchy));
	let rewritten = reader.accept(PassThrough::reemitting(writer), flags)
		.with_context(|| anyhow!("failed to re-emit the class"))?
		.into_inner()
		.to_bytes()?;

	let reread = ClassReader::new(&rewritten)
		.with_context(|| anyhow!("failed to read the re-emitted class"))?;
	reread.accept(ClassWriter::from_reader(&reread, Compute::Nothing)?, ReadFlags::empty())
		.with_context(|| anyhow!("failed to read the re-emitted class"))?;

	let members = reread.accept(Members::default(), ReadFlags::SKIP_CODE)?;
	Ok(format!("{} ({}, {} -> {} bytes)", reread.class_name()?, members, bytes.len(), rewritten.len()))
}

fn main() -> Result<ExitCode> {
	let cli = Cli::parse();
	setup_logging(cli.verbose)?;

	let mut classes = Vec::new();
	for path in &cli.paths {
		inputs::collect(path, &mut classes)
			.with_context(|| anyhow!("failed to read classes from {path:?}"))?;
	}
	info!("found {} classes", classes.len());

	let hierarchy = Rc::new(hierarchy(&classes, cli.strict_hierarchy));

	let mut failed = 0;
	for class in &classes {
		match verify(class, &cli, &hierarchy) {
			Ok(summary) => println!("ok     {summary}"),
			Err(e) => {
				failed += 1;
				println!("FAILED {}: {e:#}", class.name);
				if let Some(kind) = ClassError::find(&e) {
					error!("{}: {kind:?}", class.name);
				}
			},
		}
	}

	println!("{} of {} classes passed", classes.len() - failed, classes.len());
	Ok(if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
