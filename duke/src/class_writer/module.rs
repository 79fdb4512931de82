use anyhow::{anyhow, bail, Context as _, Result};
use java_string::{JavaStr, JavaString};
use crate::{ClassError, ClassWrite};
use crate::class_constants::attribute;
use crate::class_writer::{write_attribute, write_attribute_fix_length, Context};
use crate::class_writer::symbols::SymbolTable;
use crate::visitor::module::ModuleVisitor;

/// Exports and opens: the package, the flags, and the modules it's for.
type Export = (u16, u16, Vec<u16>);

/// The `Module`, `ModulePackages` and `ModuleMainClass` attributes, as indices into the constant pool.
#[derive(Debug, Default)]
pub(crate) struct ModuleAttributes {
	name: u16,
	access: u16,
	version: u16,
	requires: Vec<[u16; 3]>,
	exports: Vec<Export>,
	opens: Vec<Export>,
	uses: Vec<u16>,
	provides: Vec<(u16, Vec<u16>)>,
	packages: Vec<u16>,
	main_class: Option<u16>,
}

fn write_indices(w: &mut Vec<u8>, indices: &[u16], what: &str) -> Result<()> {
	w.write_slice(
		indices,
		|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("too many {what}")),
		|w, &index| w.write_u16(index)
	)
}

fn write_exports(w: &mut Vec<u8>, exports: &[Export], what: &str) -> Result<()> {
	w.write_slice(
		exports,
		|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("too many {what}")),
		|w, (package, access, modules)| {
			w.write_u16(*package)?;
			w.write_u16(*access)?;
			write_indices(w, modules, "modules")
		}
	)
}

impl ModuleAttributes {
	/// Writes the attributes, returning how many.
	pub(crate) fn write(&self, w: &mut Vec<u8>, symbols: &mut SymbolTable) -> Result<usize> {
		let mut attribute_count = 1;
		write_attribute(w, symbols, attribute::MODULE, |w, _| {
			w.write_u16(self.name)?;
			w.write_u16(self.access)?;
			w.write_u16(self.version)?;
			w.write_slice(
				&self.requires,
				|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("too many requires")),
				|w, require| {
					for &item in require {
						w.write_u16(item)?;
					}
					Ok(())
				}
			)?;
			write_exports(w, &self.exports, "exports")?;
			write_exports(w, &self.opens, "opens")?;
			write_indices(w, &self.uses, "uses")?;
			w.write_slice(
				&self.provides,
				|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("too many provides")),
				|w, (service, providers)| {
					w.write_u16(*service)?;
					write_indices(w, providers, "providers")
				}
			)
		})?;

		if !self.packages.is_empty() {
			attribute_count += 1;
			write_attribute(w, symbols, attribute::MODULE_PACKAGES, |w, _| write_indices(w, &self.packages, "packages"))?;
		}
		if let Some(main_class) = self.main_class {
			attribute_count += 1;
			write_attribute_fix_length(w, symbols, attribute::MODULE_MAIN_CLASS, 2)?;
			w.write_u16(main_class)?;
		}
		Ok(attribute_count)
	}
}

/// Writes the module of a `module-info` class, created by [`ClassWriter`][crate::ClassWriter].
pub struct ModuleWriter {
	context: Context,
	module: ModuleAttributes,
	ended: bool,
}

impl ModuleWriter {
	pub(crate) fn new(mut context: Context, name: &JavaStr, access: u16, version: Option<&JavaStr>) -> Result<ModuleWriter> {
		let symbols = &mut context.symbols;
		let module = ModuleAttributes {
			name: symbols.put_module(name)?,
			access,
			version: symbols.put_optional(version, SymbolTable::put_utf8)?,
			..ModuleAttributes::default()
		};
		Ok(ModuleWriter { context, module, ended: false })
	}

	pub(crate) fn finish(self) -> Result<(Context, ModuleAttributes)> {
		if !self.ended {
			bail!(ClassError::IllegalState { expected: "visit_end", got: "finish_module" });
		}
		Ok((self.context, self.module))
	}

	fn check(&self, got: &'static str) -> Result<()> {
		if self.ended {
			bail!(ClassError::IllegalState { expected: "finish_module", got });
		}
		Ok(())
	}

	fn modules(&mut self, modules: &[JavaString]) -> Result<Vec<u16>> {
		modules.iter().map(|module| self.context.symbols.put_module(module)).collect()
	}

	fn classes(&mut self, classes: &[JavaString]) -> Result<Vec<u16>> {
		classes.iter().map(|class| self.context.symbols.put_class(class)).collect()
	}
}

impl ModuleVisitor for ModuleWriter {
	fn visit_main_class(&mut self, main_class: JavaString) -> Result<()> {
		self.check("visit_main_class")?;
		if self.module.main_class.is_some() {
			bail!("a module has at most one main class");
		}
		self.module.main_class = Some(self.context.symbols.put_class(&main_class)?);
		Ok(())
	}

	fn visit_package(&mut self, package: JavaString) -> Result<()> {
		self.check("visit_package")?;
		let index = self.context.symbols.put_package(&package)?;
		self.module.packages.push(index);
		Ok(())
	}

	fn visit_require(&mut self, module: JavaString, access: u16, version: Option<JavaString>) -> Result<()> {
		self.check("visit_require")?;
		let symbols = &mut self.context.symbols;
		let module = symbols.put_module(&module)?;
		let version = symbols.put_optional(version.as_deref(), SymbolTable::put_utf8)?;
		self.module.requires.push([module, access, version]);
		Ok(())
	}

	fn visit_export(&mut self, package: JavaString, access: u16, modules: Vec<JavaString>) -> Result<()> {
		self.check("visit_export")?;
		let package = self.context.symbols.put_package(&package)?;
		let modules = self.modules(&modules)?;
		self.module.exports.push((package, access, modules));
		Ok(())
	}

	fn visit_open(&mut self, package: JavaString, access: u16, modules: Vec<JavaString>) -> Result<()> {
		self.check("visit_open")?;
		let package = self.context.symbols.put_package(&package)?;
		let modules = self.modules(&modules)?;
		self.module.opens.push((package, access, modules));
		Ok(())
	}

	fn visit_use(&mut self, service: JavaString) -> Result<()> {
		self.check("visit_use")?;
		let index = self.context.symbols.put_class(&service)?;
		self.module.uses.push(index);
		Ok(())
	}

	fn visit_provide(&mut self, service: JavaString, providers: Vec<JavaString>) -> Result<()> {
		self.check("visit_provide")?;
		if providers.is_empty() {
			bail!("service {service} is provided without any providers");
		}
		let service = self.context.symbols.put_class(&service)?;
		let providers = self.classes(&providers)?;
		self.module.provides.push((service, providers));
		Ok(())
	}

	fn visit_end(&mut self) -> Result<()> {
		self.check("visit_end")?;
		self.ended = true;
		Ok(())
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use java_string::JavaStr;
	use pretty_assertions::assert_eq;
	use crate::ClassError;
	use crate::class_writer::{Compute, Context};
	use crate::class_writer::module::ModuleWriter;
	use crate::visitor::module::ModuleVisitor;

	#[test]
	fn module_attributes() -> Result<()> {
		let mut writer = ModuleWriter::new(Context::new(Compute::Nothing), JavaStr::from_str("m"), 0, None)?;
		writer.visit_package("p".into())?;
		writer.visit_require("java.base".into(), 0x8000, None)?;
		writer.visit_export("p".into(), 0, Vec::new())?;
		writer.visit_end()?;
		let (mut context, module) = writer.finish()?;

		let mut w = Vec::new();
		assert_eq!(module.write(&mut w, &mut context.symbols)?, 2);
		// #1 "m", #2 module m, #3 "p", #4 package p, #5 "java.base", #6 module java.base, #7 "Module",
		// #8 "ModulePackages"
		assert_eq!(w, vec![
			0x00, 0x07, 0x00, 0x00, 0x00, 0x1c,
			0x00, 0x02, 0x00, 0x00, 0x00, 0x00,
			0x00, 0x01, 0x00, 0x06, 0x80, 0x00, 0x00, 0x00,
			0x00, 0x01, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00,
			0x00, 0x00,
			0x00, 0x00,
			0x00, 0x00,
			0x00, 0x08, 0x00, 0x00, 0x00, 0x04,
			0x00, 0x01, 0x00, 0x04,
		]);
		Ok(())
	}

	#[test]
	fn events_after_end() -> Result<()> {
		let mut writer = ModuleWriter::new(Context::new(Compute::Nothing), JavaStr::from_str("m"), 0, None)?;
		writer.visit_end()?;
		let error = writer.visit_use("S".into()).unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::IllegalState { expected: "finish_module", got: "visit_use" }));
		Ok(())
	}
}
