use std::fs::File;
use std::io::Read;
use std::path::Path;
use anyhow::{anyhow, Context, Result};
use log::trace;
use walkdir::WalkDir;
use zip::ZipArchive;

/// The bytes of a class file, and where it's from.
#[derive(Debug)]
pub(crate) struct ClassFile {
	pub(crate) name: String,
	pub(crate) bytes: Vec<u8>,
}

fn is_jar(path: &Path) -> bool {
	path.extension().is_some_and(|extension| extension == "jar" || extension == "zip")
}

fn is_class(path: &Path) -> bool {
	path.extension().is_some_and(|extension| extension == "class")
}

/// Adds the classes of a class file, a directory or a jar.
pub(crate) fn collect(path: &Path, classes: &mut Vec<ClassFile>) -> Result<()> {
	if path.is_dir() {
		for entry in WalkDir::new(path).sort_by_file_name() {
			let entry = entry.with_context(|| anyhow!("failed to walk directory {path:?}"))?;
			let entry_path = entry.path();
			if !entry.file_type().is_file() {
				continue;
			}
			if is_class(entry_path) {
				classes.push(read_class(entry_path)?);
			} else if is_jar(entry_path) {
				read_jar(entry_path, classes)?;
			}
		}
		Ok(())
	} else if is_jar(path) {
		read_jar(path, classes)
	} else {
		classes.push(read_class(path)?);
		Ok(())
	}
}

fn read_class(path: &Path) -> Result<ClassFile> {
	trace!("reading {path:?}");
	let bytes = std::fs::read(path).with_context(|| anyhow!("failed to read {path:?}"))?;
	Ok(ClassFile { name: path.display().to_string(), bytes })
}

fn read_jar(path: &Path, classes: &mut Vec<ClassFile>) -> Result<()> {
	trace!("reading jar {path:?}");
	let file = File::open(path).with_context(|| anyhow!("failed to open jar {path:?}"))?;
	let mut zip = ZipArchive::new(file).with_context(|| anyhow!("failed to read jar {path:?}"))?;

	for index in 0..zip.len() {
		let mut file = zip.by_index(index)?;
		if file.is_file() && file.name().ends_with(".class") {
			let mut bytes = Vec::new();
			file.read_to_end(&mut bytes)
				.with_context(|| anyhow!("failed to read {:?} from jar {path:?}", file.name()))?;
			classes.push(ClassFile { name: format!("{}!{}", path.display(), file.name()), bytes });
		}
	}
	Ok(())
}

#[cfg(test)]
mod testing {
	use std::path::Path;
	use crate::inputs::{is_class, is_jar};

	#[test]
	fn file_kinds() {
		assert!(is_jar(Path::new("lib/foo.jar")));
		assert!(is_jar(Path::new("foo.zip")));
		assert!(!is_jar(Path::new("Foo.class")));
		assert!(is_class(Path::new("a/b/Foo.class")));
		assert!(!is_class(Path::new("a/b/Foo.java")));
		assert!(!is_class(Path::new("class")));
	}
}
