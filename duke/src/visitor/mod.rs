//! The event model: visitors for classes and their parts.
//!
//! Visitors are consumed when a sub-visitor is requested, and handed back when it's finished:
//! `visit_x(self, ..)` returns either [`ControlFlow::Break`] with the visitor itself (meaning "not interested", the
//! producer skips the data) or [`ControlFlow::Continue`] with a residual and the sub-visitor. After driving the
//! sub-visitor, the producer calls `finish_x(residual, sub_visitor)` to get the visitor back.
//!
//! [`ControlFlow::Break`]: std::ops::ControlFlow::Break
//! [`ControlFlow::Continue`]: std::ops::ControlFlow::Continue

use anyhow::{bail, Result};
use crate::ClassError;

mod infallible;

pub mod class;
pub mod field;
pub mod method;
pub mod annotation;
pub mod module;
pub mod pass_through;

/// The version of the event contract a visitor implements.
///
/// The reader refuses to emit constructs a visitor can't know about, see [`Api::check`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Api {
	Asm4,
	/// Adds type annotations and method parameters.
	Asm5,
	/// Adds modules.
	Asm6,
	/// Adds nest mates and constant dynamic.
	Asm7,
	Asm8,
	/// Adds permitted subclasses.
	#[default]
	Asm9,
	Asm10Experimental,
}

impl Api {
	/// Fails with [`ClassError::UnsupportedApi`] if `self` is older than `min_version`.
	pub fn check(self, construct: &'static str, min_version: Api) -> Result<()> {
		if self < min_version {
			bail!(ClassError::UnsupportedApi { construct, min_version });
		}
		Ok(())
	}

	pub fn is_experimental(self) -> bool {
		self == Api::Asm10Experimental
	}
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use crate::visitor::Api;
	use crate::ClassError;

	#[test]
	fn check() {
		assert!(Api::Asm9.check("Module", Api::Asm6).is_ok());
		assert!(Api::Asm6.check("Module", Api::Asm6).is_ok());

		let error = Api::Asm6.check("NestHost", Api::Asm7).unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::UnsupportedApi { construct: "NestHost", min_version: Api::Asm7 }));
	}

	#[test]
	fn experimental() {
		assert!(Api::Asm10Experimental.is_experimental());
		assert!(!Api::default().is_experimental());
		assert!(Api::Asm10Experimental > Api::Asm9);
	}
}
