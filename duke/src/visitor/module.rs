use anyhow::Result;
use java_string::JavaString;

/// A visitor for the `Module`, `ModulePackages` and `ModuleMainClass` attributes.
///
/// The methods are called in the order they appear here, the ones after [`ModuleVisitor::visit_package`] any number
/// of times.
pub trait ModuleVisitor {
	fn visit_main_class(&mut self, main_class: JavaString) -> Result<()> {
		let _ = main_class;
		Ok(())
	}

	fn visit_package(&mut self, package: JavaString) -> Result<()> {
		let _ = package;
		Ok(())
	}

	fn visit_require(&mut self, module: JavaString, access: u16, version: Option<JavaString>) -> Result<()> {
		let _ = (module, access, version);
		Ok(())
	}

	/// An empty `modules` means the package is exported to all modules.
	fn visit_export(&mut self, package: JavaString, access: u16, modules: Vec<JavaString>) -> Result<()> {
		let _ = (package, access, modules);
		Ok(())
	}

	fn visit_open(&mut self, package: JavaString, access: u16, modules: Vec<JavaString>) -> Result<()> {
		let _ = (package, access, modules);
		Ok(())
	}

	fn visit_use(&mut self, service: JavaString) -> Result<()> {
		let _ = service;
		Ok(())
	}

	fn visit_provide(&mut self, service: JavaString, providers: Vec<JavaString>) -> Result<()> {
		let _ = (service, providers);
		Ok(())
	}

	fn visit_end(&mut self) -> Result<()> {
		Ok(())
	}
}
