//! Answers to "what's the common super class of these two classes", as needed for merging frames.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use anyhow::{bail, Result};
use java_string::{JavaStr, JavaString};
use crate::{ClassError, ClassReader};
use crate::tree::access::ACC_INTERFACE;

const OBJECT: &str = "java/lang/Object";

/// Knows the super classes of classes.
///
/// The frame computation of the [`ClassWriter`][crate::ClassWriter] asks it when two different class types meet at
/// a branch target.
pub trait ClassHierarchy {
	/// Returns the internal name of the closest common super class of the classes `a` and `b`. If one of them is an
	/// interface, that's `java/lang/Object`.
	fn common_super_class(&self, a: &JavaStr, b: &JavaStr) -> Result<JavaString>;
}

impl<T: ClassHierarchy + ?Sized> ClassHierarchy for Rc<T> {
	fn common_super_class(&self, a: &JavaStr, b: &JavaStr) -> Result<JavaString> {
		(**self).common_super_class(a, b)
	}
}

impl<T: ClassHierarchy + ?Sized> ClassHierarchy for &T {
	fn common_super_class(&self, a: &JavaStr, b: &JavaStr) -> Result<JavaString> {
		(**self).common_super_class(a, b)
	}
}

/// The hierarchy used when none is given: two different classes meet at `java/lang/Object`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectHierarchy;

impl ClassHierarchy for ObjectHierarchy {
	fn common_super_class(&self, a: &JavaStr, b: &JavaStr) -> Result<JavaString> {
		if a == b {
			Ok(a.to_owned())
		} else {
			Ok(JavaString::from(OBJECT))
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ClassInfo {
	super_class: Option<JavaString>,
	interface: bool,
}

/// A hierarchy built from a set of known classes.
///
/// By default, asking about a class that isn't known fails with [`ClassError::HierarchyQueryFailed`]. A
/// [lenient][SuperClasses::lenient] hierarchy treats unknown classes as direct subclasses of `java/lang/Object`
/// instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuperClasses {
	classes: HashMap<JavaString, ClassInfo>,
	lenient: bool,
}

impl SuperClasses {
	pub fn new() -> SuperClasses {
		SuperClasses::default()
	}

	pub fn lenient(mut self) -> SuperClasses {
		self.lenient = true;
		self
	}

	pub fn insert(&mut self, name: JavaString, super_class: Option<JavaString>, interface: bool) {
		self.classes.insert(name, ClassInfo { super_class, interface });
	}

	/// Adds the class the reader reads.
	pub fn insert_class(&mut self, reader: &ClassReader) -> Result<()> {
		let name = reader.class_name()?.to_owned();
		let super_class = reader.super_name()?.map(ToOwned::to_owned);
		let interface = reader.access() as u32 & ACC_INTERFACE != 0;
		self.insert(name, super_class, interface);
		Ok(())
	}

	pub fn len(&self) -> usize {
		self.classes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.classes.is_empty()
	}

	fn info(&self, name: &JavaStr, a: &JavaStr, b: &JavaStr) -> Result<Option<&ClassInfo>> {
		if name == OBJECT {
			return Ok(None);
		}
		match self.classes.get(name) {
			Some(info) => Ok(Some(info)),
			None if self.lenient => Ok(None),
			None => bail!(ClassError::HierarchyQueryFailed { a: a.to_string(), b: b.to_string() }),
		}
	}

	/// The class itself, followed by its super classes, up to `java/lang/Object`.
	fn chain<'s>(&'s self, mut name: &'s JavaStr, a: &JavaStr, b: &JavaStr) -> Result<Vec<&'s JavaStr>> {
		let mut chain = vec![name];
		let mut seen = HashSet::from([name]);
		while let Some(info) = self.info(name, a, b)? {
			let Some(super_class) = info.super_class.as_deref() else { break };
			if !seen.insert(super_class) {
				bail!("class {name} is its own super class");
			}
			chain.push(super_class);
			name = super_class;
		}
		if name != OBJECT {
			chain.push(JavaStr::from_str(OBJECT));
		}
		Ok(chain)
	}

	fn is_interface(&self, name: &JavaStr, a: &JavaStr, b: &JavaStr) -> Result<bool> {
		Ok(self.info(name, a, b)?.is_some_and(|info| info.interface))
	}
}

impl ClassHierarchy for SuperClasses {
	fn common_super_class(&self, a: &JavaStr, b: &JavaStr) -> Result<JavaString> {
		if a == b {
			return Ok(a.to_owned());
		}
		if self.is_interface(a, a, b)? || self.is_interface(b, a, b)? {
			return Ok(JavaString::from(OBJECT));
		}

		let chain_b = self.chain(b, a, b)?;
		let common = self.chain(a, a, b)?.into_iter()
			.find(|class| chain_b.contains(class))
			.unwrap_or(JavaStr::from_str(OBJECT));
		Ok(common.to_owned())
	}
}
