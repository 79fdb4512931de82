//! Reading of class files.
//!
//! The [`ClassReader`] checks the header of a class file and scans its constant pool up front. Everything else is
//! decoded while [`ClassReader::accept`] walks the class and calls the methods of the visitor.

use std::ops::ControlFlow;
use anyhow::{anyhow, bail, Context, Result};
use bitflags::bitflags;
use java_string::{JavaStr, JavaString};
use log::trace;
use crate::{jstring, ByteReader, ClassError, ClassRead};
use crate::class_constants::{attribute, MAGIC};
use crate::class_reader::annotation::{read_annotations, read_element_value, read_type_annotations};
use crate::class_reader::code::{read_code, MethodInfo};
use crate::class_reader::pool::{BootstrapMethodRead, PoolRead};
use crate::tree::access::{ACC_DEPRECATED, ACC_SYNTHETIC};
use crate::tree::attribute::Attribute;
use crate::tree::class::{ClassHeader, InnerClass, RawMember};
use crate::tree::type_annotation::{TypePath, TypeReference};
use crate::tree::version::Version;
use crate::visitor::Api;
use crate::visitor::annotation::AnnotationVisitor;
use crate::visitor::class::ClassVisitor;
use crate::visitor::field::FieldVisitor;
use crate::visitor::method::MethodVisitor;
use crate::visitor::module::ModuleVisitor;

mod annotation;
mod code;
mod frames;
mod labels;
pub(crate) mod pool;

bitflags! {
	/// Options for [`ClassReader::accept`].
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub struct ReadFlags: u8 {
		/// Don't read the code of methods, [`MethodVisitor::visit_code`] is never called.
		const SKIP_CODE = 0x01;
		/// Don't read `SourceFile`, `SourceDebugExtension`, `LineNumberTable`, `LocalVariableTable`,
		/// `LocalVariableTypeTable` and `MethodParameters`.
		const SKIP_DEBUG = 0x02;
		/// Don't read `StackMapTable` attributes.
		const SKIP_FRAMES = 0x04;
		/// Visit all frames as [`Frame::Expanded`][crate::tree::frame::Frame::Expanded].
		const EXPAND_FRAMES = 0x08;
	}
}

/// Reads the content of an attribute of `length` bytes with `f`, checking that `f` consumes exactly these.
pub(crate) fn read_attribute<'a, T>(r: &mut ByteReader<'a>, name: &'static str, length: u32, f: impl FnOnce(&mut ByteReader<'a>) -> Result<T>) -> Result<T> {
	read_content(r.take(length as usize)?, name, f)
}

/// Like [`read_attribute`], for content already split off with [`ByteReader::take`].
fn read_content<'a, T>(mut content: ByteReader<'a>, name: &'static str, f: impl FnOnce(&mut ByteReader<'a>) -> Result<T>) -> Result<T> {
	let start = content.position();
	let declared = content.remaining();
	let value = f(&mut content)
		.with_context(|| anyhow!("failed to read {name} attribute at offset {start}"))?;
	if content.remaining() != 0 {
		bail!(ClassError::AttributeLengthMismatch { name, declared: declared as u32, actual: content.position() - start });
	}
	Ok(value)
}

/// Skips the `fields_count` and `fields` items, or the `methods_count` and `methods` items.
fn skip_members(r: &mut ByteReader) -> Result<()> {
	let count = r.read_u16()?;
	for _ in 0..count {
		r.skip(6)?;
		skip_attributes(r)?;
	}
	Ok(())
}

fn skip_attributes(r: &mut ByteReader) -> Result<()> {
	let count = r.read_u16()?;
	for _ in 0..count {
		r.skip(2)?;
		let length = r.read_u32_as_usize()?;
		r.skip(length)?;
	}
	Ok(())
}

fn read_classes(r: &mut ByteReader, pool: &PoolRead) -> Result<Vec<JavaString>> {
	r.read_vec(
		|r| r.read_u16_as_usize(),
		|r| pool.class_owned(r.read_u16()?)
	)
}

/// A reader for one class file.
///
/// Creating one checks the magic and the version and scans the constant pool. The reader can then
/// [accept][ClassReader::accept] any number of visitors.
pub struct ClassReader<'a> {
	bytes: &'a [u8],
	pub(crate) pool: PoolRead<'a>,
	version: Version,
	access: u16,
	this_class: u16,
	super_class: u16,
	interfaces: Vec<u16>,
	/// The offset of the `fields_count` item.
	fields: usize,
	/// The offset of the `methods_count` item.
	methods: usize,
	/// The offset of the `attributes_count` item of the class.
	attributes: usize,
}

impl<'a> ClassReader<'a> {
	pub fn new(bytes: &'a [u8]) -> Result<ClassReader<'a>> {
		let mut r = ByteReader::new(bytes);

		let magic = r.read_u32()?;
		if magic != MAGIC {
			bail!(ClassError::BadMagic { found: magic });
		}

		let minor = r.read_u16()?;
		let major = r.read_u16()?;
		let version = Version::new(major, minor).check_supported()?;

		let mut pool = PoolRead::scan(bytes, &mut r)
			.with_context(|| anyhow!("failed to read constant pool"))?;

		let access = r.read_u16()?;
		let this_class = r.read_u16()?;
		let super_class = r.read_u16()?;
		let interfaces = r.read_vec(|r| r.read_u16_as_usize(), |r| r.read_u16())?;

		let fields = r.position();
		skip_members(&mut r).with_context(|| anyhow!("failed to read fields"))?;
		let methods = r.position();
		skip_members(&mut r).with_context(|| anyhow!("failed to read methods"))?;
		let attributes = r.position();

		let attributes_count = r.read_u16()?;
		for _ in 0..attributes_count {
			let is_bootstrap_methods = pool.utf8(r.read_u16()?)? == attribute::BOOTSTRAP_METHODS;
			let length = r.read_u32()?;
			if is_bootstrap_methods {
				pool.bootstrap_methods = read_attribute(&mut r, attribute::BOOTSTRAP_METHODS, length, |r| {
					r.read_vec(
						|r| r.read_u16_as_usize(),
						|r| {
							let handle = r.read_u16()?;
							let arguments = r.read_vec(|r| r.read_u16_as_usize(), |r| r.read_u16())?;
							Ok(BootstrapMethodRead { handle, arguments })
						}
					)
				})?;
			} else {
				r.skip(length as usize)?;
			}
		}

		Ok(ClassReader { bytes, pool, version, access, this_class, super_class, interfaces, fields, methods, attributes })
	}

	/// The whole class file.
	pub fn bytes(&self) -> &'a [u8] {
		self.bytes
	}

	pub fn version(&self) -> Version {
		self.version
	}

	/// The `access_flags` item of the class.
	pub fn access(&self) -> u16 {
		self.access
	}

	pub fn class_name(&self) -> Result<&JavaStr> {
		self.pool.class(self.this_class)
	}

	pub fn super_name(&self) -> Result<Option<&JavaStr>> {
		self.pool.optional(self.super_class, PoolRead::class)
	}

	pub fn interfaces(&self) -> Result<Vec<&JavaStr>> {
		self.interfaces.iter()
			.map(|&index| self.pool.class(index))
			.collect()
	}

	/// Walks the class, calling the methods of the visitor, and gives the visitor back.
	pub fn accept<V: ClassVisitor>(&self, visitor: V, flags: ReadFlags) -> Result<V> {
		let class_name = self.class_name()?;
		trace!("reading class {class_name}");
		self.read_class(visitor, flags)
			.with_context(|| anyhow!("failed to read class {class_name}"))
	}

	fn read_class<V: ClassVisitor>(&self, mut visitor: V, flags: ReadFlags) -> Result<V> {
		let api = visitor.api();
		let pool = &self.pool;

		let mut attributes = ClassAttributes::default();

		let mut r = ByteReader::at(self.bytes, self.attributes);
		let attributes_count = r.read_u16()?;
		for _ in 0..attributes_count {
			let name = pool.utf8(r.read_u16()?)?;
			let length = r.read_u32()?;
			match name {
				name if name == attribute::SIGNATURE => {
					attributes.signature = Some(read_attribute(&mut r, attribute::SIGNATURE, length, |r| pool.utf8_owned(r.read_u16()?))?);
				},
				name if name == attribute::SOURCE_FILE => {
					attributes.source_file = Some(read_attribute(&mut r, attribute::SOURCE_FILE, length, |r| pool.utf8_owned(r.read_u16()?))?);
				},
				name if name == attribute::SOURCE_DEBUG_EXTENSION => {
					let content = r.read_slice(length as usize)?;
					attributes.source_debug_extension = Some(jstring::decode(content)
						.with_context(|| anyhow!("failed to read {} attribute", attribute::SOURCE_DEBUG_EXTENSION))?);
				},
				name if name == attribute::ENCLOSING_METHOD => {
					attributes.enclosing_method = Some(read_attribute(&mut r, attribute::ENCLOSING_METHOD, length, |r| {
						let owner = pool.class_owned(r.read_u16()?)?;
						let method = pool.optional(r.read_u16()?, PoolRead::name_and_type)?
							.map(|(name, descriptor)| (name.to_owned(), descriptor.to_owned()));
						Ok((owner, method))
					})?);
				},
				name if name == attribute::SYNTHETIC => {
					read_attribute(&mut r, attribute::SYNTHETIC, length, |_| Ok(()))?;
					attributes.synthetic = true;
				},
				name if name == attribute::DEPRECATED => {
					read_attribute(&mut r, attribute::DEPRECATED, length, |_| Ok(()))?;
					attributes.deprecated = true;
				},
				name if name == attribute::RUNTIME_VISIBLE_ANNOTATIONS => {
					attributes.annotations.visible = Some(r.take(length as usize)?);
				},
				name if name == attribute::RUNTIME_INVISIBLE_ANNOTATIONS => {
					attributes.annotations.invisible = Some(r.take(length as usize)?);
				},
				name if name == attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS => {
					attributes.annotations.type_visible = Some(r.take(length as usize)?);
				},
				name if name == attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
					attributes.annotations.type_invisible = Some(r.take(length as usize)?);
				},
				name if name == attribute::MODULE => {
					attributes.module = Some(r.take(length as usize)?);
				},
				name if name == attribute::MODULE_PACKAGES => {
					attributes.module_packages = Some(read_attribute(&mut r, attribute::MODULE_PACKAGES, length, |r| {
						r.read_vec(|r| r.read_u16_as_usize(), |r| Ok(pool.package(r.read_u16()?)?.to_owned()))
					})?);
				},
				name if name == attribute::MODULE_MAIN_CLASS => {
					attributes.module_main_class = Some(read_attribute(&mut r, attribute::MODULE_MAIN_CLASS, length, |r| pool.class_owned(r.read_u16()?))?);
				},
				name if name == attribute::NEST_HOST => {
					attributes.nest_host = Some(read_attribute(&mut r, attribute::NEST_HOST, length, |r| pool.class_owned(r.read_u16()?))?);
				},
				name if name == attribute::NEST_MEMBERS => {
					attributes.nest_members = Some(read_attribute(&mut r, attribute::NEST_MEMBERS, length, |r| read_classes(r, pool))?);
				},
				name if name == attribute::PERMITTED_SUBCLASSES => {
					attributes.permitted_subclasses = Some(read_attribute(&mut r, attribute::PERMITTED_SUBCLASSES, length, |r| read_classes(r, pool))?);
				},
				name if name == attribute::INNER_CLASSES => {
					attributes.inner_classes = read_attribute(&mut r, attribute::INNER_CLASSES, length, |r| {
						r.read_vec(
							|r| r.read_u16_as_usize(),
							|r| {
								let name = pool.class_owned(r.read_u16()?)?;
								let outer_name = pool.optional(r.read_u16()?, PoolRead::class_owned)?;
								let inner_name = pool.optional(r.read_u16()?, PoolRead::utf8_owned)?;
								let access = r.read_u16()?;
								Ok(InnerClass { name, outer_name, inner_name, access })
							}
						)
					})?;
				},
				name if name == attribute::BOOTSTRAP_METHODS => {
					// already read in ClassReader::new
					r.skip(length as usize)?;
				},
				name => {
					let content = r.read_slice(length as usize)?.to_vec();
					attributes.unknown.push(Attribute { name: name.to_owned(), content });
				},
			}
		}

		let mut access = self.access as u32;
		if attributes.synthetic {
			access |= ACC_SYNTHETIC;
		}
		if attributes.deprecated {
			access |= ACC_DEPRECATED;
		}

		visitor.visit(ClassHeader {
			version: self.version,
			access,
			name: self.class_name()?.to_owned(),
			signature: attributes.signature,
			super_class: self.super_name()?.map(ToOwned::to_owned),
			interfaces: self.interfaces()?.into_iter().map(ToOwned::to_owned).collect(),
		})?;

		if !flags.contains(ReadFlags::SKIP_DEBUG) && (attributes.source_file.is_some() || attributes.source_debug_extension.is_some()) {
			visitor.visit_source(attributes.source_file, attributes.source_debug_extension)?;
		}

		if let Some(content) = attributes.module {
			api.check("Module", Api::Asm6)?;
			visitor = read_content(content, attribute::MODULE, |r| {
				read_module(r, pool, visitor, attributes.module_main_class, attributes.module_packages)
			})?;
		}

		if let Some(nest_host) = attributes.nest_host {
			api.check("NestHost", Api::Asm7)?;
			visitor.visit_nest_host(nest_host)?;
		}

		if let Some((owner, method)) = attributes.enclosing_method {
			let (name, descriptor) = method.unzip();
			visitor.visit_outer_class(owner, name, descriptor)?;
		}

		visitor = attributes.annotations.read(pool, api, visitor,
			|v, descriptor, visible| v.visit_annotation(descriptor, visible),
			|v, type_reference, type_path, descriptor, visible| v.visit_type_annotation(type_reference, type_path, descriptor, visible),
			V::finish_annotation,
		)?;

		for attribute in attributes.unknown {
			visitor.visit_attribute(attribute)?;
		}

		if let Some(nest_members) = attributes.nest_members {
			api.check("NestMembers", Api::Asm7)?;
			for nest_member in nest_members {
				visitor.visit_nest_member(nest_member)?;
			}
		}

		if let Some(permitted_subclasses) = attributes.permitted_subclasses {
			api.check("PermittedSubclasses", Api::Asm9)?;
			for permitted_subclass in permitted_subclasses {
				visitor.visit_permitted_subclass(permitted_subclass)?;
			}
		}

		for inner_class in attributes.inner_classes {
			visitor.visit_inner_class(inner_class)?;
		}

		let mut r = ByteReader::at(self.bytes, self.fields);
		let fields_count = r.read_u16()?;
		for i in 0..fields_count {
			visitor = self.read_field(&mut r, visitor, flags, api)
				.with_context(|| anyhow!("failed to read field {i}"))?;
		}

		let mut r = ByteReader::at(self.bytes, self.methods);
		let methods_count = r.read_u16()?;
		for i in 0..methods_count {
			visitor = self.read_method(&mut r, visitor, flags, api)
				.with_context(|| anyhow!("failed to read method {i}"))?;
		}

		visitor.visit_end()?;
		Ok(visitor)
	}

	fn read_field<V: ClassVisitor>(&self, r: &mut ByteReader<'a>, visitor: V, flags: ReadFlags, api: Api) -> Result<V> {
		let pool = &self.pool;

		let access_flags = r.read_u16()?;
		let name_index = r.read_u16()?;
		let name = pool.utf8(name_index)?;
		let descriptor_index = r.read_u16()?;
		let descriptor = pool.utf8(descriptor_index)?;
		trace!("reading field {name}");

		let attributes_start = r.position();
		let mut attributes = MemberAttributes::default();
		let mut constant_value_index = None;

		let attributes_count = r.read_u16()?;
		for _ in 0..attributes_count {
			let attribute_name = pool.utf8(r.read_u16()?)?;
			let length = r.read_u32()?;
			if attribute_name == attribute::CONSTANT_VALUE {
				constant_value_index = Some(read_attribute(r, attribute::CONSTANT_VALUE, length, |r| r.read_u16())?);
			} else {
				attributes.read(r, pool, attribute_name, length)?;
			}
		}
		let raw_attributes = &self.bytes[attributes_start..r.position()];

		let access = attributes.fold_access(access_flags);
		let value = constant_value_index.map(|index| pool.constant_value(index)).transpose()?;
		let signature = attributes.signature;

		match visitor.visit_field(access, name.to_owned(), descriptor.to_owned(), signature, value)? {
			ControlFlow::Continue((residual, mut field_visitor)) => {
				let raw = RawMember {
					pool: pool.entry_bytes(),
					access,
					access_flags,
					name_index,
					descriptor_index,
					signature_index: attributes.signature_index,
					constant_value_index,
					exception_indices: Vec::new(),
					attributes: raw_attributes,
				};
				if !(flags.is_empty() && field_visitor.copy_raw(&raw)?) {
					field_visitor = attributes.annotations.read(pool, api, field_visitor,
						|v, descriptor, visible| v.visit_annotation(descriptor, visible),
						|v, type_reference, type_path, descriptor, visible| v.visit_type_annotation(type_reference, type_path, descriptor, visible),
						<V::FieldVisitor as FieldVisitor>::finish_annotation,
					)?;
					for attribute in attributes.unknown {
						field_visitor.visit_attribute(attribute)?;
					}
				}
				field_visitor.visit_end()?;
				V::finish_field(residual, field_visitor)
			},
			ControlFlow::Break(visitor) => Ok(visitor),
		}
	}

	fn read_method<V: ClassVisitor>(&self, r: &mut ByteReader<'a>, visitor: V, flags: ReadFlags, api: Api) -> Result<V> {
		let pool = &self.pool;

		let access_flags = r.read_u16()?;
		let name_index = r.read_u16()?;
		let name = pool.utf8(name_index)?;
		let descriptor_index = r.read_u16()?;
		let descriptor = pool.utf8(descriptor_index)?;
		trace!("reading method {name}{descriptor}");

		let attributes_start = r.position();
		let mut attributes = MemberAttributes::default();
		let mut exception_indices = Vec::new();
		let mut parameters = None;
		let mut annotation_default = None;
		let mut parameter_annotations = [None, None];
		let mut code = None;

		let attributes_count = r.read_u16()?;
		for _ in 0..attributes_count {
			let attribute_name = pool.utf8(r.read_u16()?)?;
			let length = r.read_u32()?;
			match attribute_name {
				name if name == attribute::CODE => {
					code = Some(r.take(length as usize)?);
				},
				name if name == attribute::EXCEPTIONS => {
					exception_indices = read_attribute(r, attribute::EXCEPTIONS, length, |r| {
						r.read_vec(|r| r.read_u16_as_usize(), |r| r.read_u16())
					})?;
				},
				name if name == attribute::METHOD_PARAMETERS => {
					parameters = Some(read_attribute(r, attribute::METHOD_PARAMETERS, length, |r| {
						r.read_vec(
							|r| r.read_u8_as_usize(),
							|r| {
								let name = pool.optional(r.read_u16()?, PoolRead::utf8_owned)?;
								let access = r.read_u16()?;
								Ok((name, access))
							}
						)
					})?);
				},
				name if name == attribute::ANNOTATION_DEFAULT => {
					annotation_default = Some(r.take(length as usize)?);
				},
				name if name == attribute::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS => {
					parameter_annotations[0] = Some(r.take(length as usize)?);
				},
				name if name == attribute::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS => {
					parameter_annotations[1] = Some(r.take(length as usize)?);
				},
				name => attributes.read(r, pool, name, length)?,
			}
		}
		let raw_attributes = &self.bytes[attributes_start..r.position()];

		let access = attributes.fold_access(access_flags);
		let exceptions = exception_indices.iter()
			.map(|&index| pool.class_owned(index))
			.collect::<Result<_>>()?;
		let signature = attributes.signature;

		let (residual, mut mv) = match visitor.visit_method(access, name.to_owned(), descriptor.to_owned(), signature, exceptions)? {
			ControlFlow::Continue(continued) => continued,
			ControlFlow::Break(visitor) => return Ok(visitor),
		};

		let raw = RawMember {
			pool: pool.entry_bytes(),
			access,
			access_flags,
			name_index,
			descriptor_index,
			signature_index: attributes.signature_index,
			constant_value_index: None,
			exception_indices,
			attributes: raw_attributes,
		};
		if flags.is_empty() && mv.copy_raw(&raw)? {
			mv.visit_end()?;
			return V::finish_method(residual, mv);
		}

		if let Some(parameters) = parameters.filter(|_| !flags.contains(ReadFlags::SKIP_DEBUG)) {
			api.check("MethodParameters", Api::Asm5)?;
			for (name, access) in parameters {
				mv.visit_parameter(name, access)?;
			}
		}

		if let Some(content) = annotation_default {
			mv = read_content(content, attribute::ANNOTATION_DEFAULT, |r| {
				match mv.visit_annotation_default()? {
					ControlFlow::Continue((residual, annotation_visitor)) => {
						let mut annotation_visitor = read_element_value(r, pool, None, annotation_visitor)?;
						annotation_visitor.visit_end()?;
						<V::MethodVisitor as MethodVisitor>::finish_annotation(residual, annotation_visitor)
					},
					ControlFlow::Break(mv) => {
						r.skip(r.remaining())?;
						Ok(mv)
					},
				}
			})?;
		}

		mv = attributes.annotations.read(pool, api, mv,
			|v, descriptor, visible| v.visit_annotation(descriptor, visible),
			|v, type_reference, type_path, descriptor, visible| v.visit_type_annotation(type_reference, type_path, descriptor, visible),
			<V::MethodVisitor as MethodVisitor>::finish_annotation,
		)?;

		for (content, visible) in parameter_annotations.into_iter().zip([true, false]) {
			let Some(content) = content else { continue };
			let name = if visible {
				attribute::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS
			} else {
				attribute::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS
			};
			mv = read_content(content, name, |r| {
				let count = r.read_u8()?;
				mv.visit_annotable_parameter_count(count, visible)?;
				for parameter in 0..count {
					mv = read_annotations(r, pool, mv,
						|mv, descriptor| mv.visit_parameter_annotation(parameter, descriptor, visible),
						<V::MethodVisitor as MethodVisitor>::finish_annotation,
					)?;
				}
				Ok(mv)
			})?;
		}

		for attribute in attributes.unknown {
			mv.visit_attribute(attribute)?;
		}

		if let Some(content) = code.filter(|_| !flags.contains(ReadFlags::SKIP_CODE)) {
			let info = MethodInfo {
				class_name: self.class_name()?,
				access,
				name,
				descriptor,
				flags,
				api,
			};
			mv = read_content(content, attribute::CODE, |r| read_code(r, pool, mv, &info))?;
		}

		mv.visit_end()?;
		V::finish_method(residual, mv)
	}
}

fn read_module<V: ClassVisitor>(
	r: &mut ByteReader,
	pool: &PoolRead,
	visitor: V,
	main_class: Option<JavaString>,
	packages: Option<Vec<JavaString>>,
) -> Result<V> {
	let name = pool.module(r.read_u16()?)?.to_owned();
	let access = r.read_u16()?;
	let version = pool.optional(r.read_u16()?, PoolRead::utf8_owned)?;

	let (residual, mut mv) = match visitor.visit_module(name, access, version)? {
		ControlFlow::Continue(continued) => continued,
		ControlFlow::Break(visitor) => {
			r.skip(r.remaining())?;
			return Ok(visitor);
		},
	};

	if let Some(main_class) = main_class {
		mv.visit_main_class(main_class)?;
	}
	for package in packages.into_iter().flatten() {
		mv.visit_package(package)?;
	}

	let requires_count = r.read_u16()?;
	for _ in 0..requires_count {
		let module = pool.module(r.read_u16()?)?.to_owned();
		let access = r.read_u16()?;
		let version = pool.optional(r.read_u16()?, PoolRead::utf8_owned)?;
		mv.visit_require(module, access, version)?;
	}

	let exports_count = r.read_u16()?;
	for _ in 0..exports_count {
		let package = pool.package(r.read_u16()?)?.to_owned();
		let access = r.read_u16()?;
		let modules = r.read_vec(|r| r.read_u16_as_usize(), |r| Ok(pool.module(r.read_u16()?)?.to_owned()))?;
		mv.visit_export(package, access, modules)?;
	}

	let opens_count = r.read_u16()?;
	for _ in 0..opens_count {
		let package = pool.package(r.read_u16()?)?.to_owned();
		let access = r.read_u16()?;
		let modules = r.read_vec(|r| r.read_u16_as_usize(), |r| Ok(pool.module(r.read_u16()?)?.to_owned()))?;
		mv.visit_open(package, access, modules)?;
	}

	for service in read_classes(r, pool)? {
		mv.visit_use(service)?;
	}

	let provides_count = r.read_u16()?;
	for _ in 0..provides_count {
		let service = pool.class_owned(r.read_u16()?)?;
		let providers = read_classes(r, pool)?;
		mv.visit_provide(service, providers)?;
	}

	mv.visit_end()?;
	V::finish_module(residual, mv)
}

/// The contents of the four kinds of annotation attributes, read once the visitor is ready for them.
#[derive(Default)]
struct Annotations<'a> {
	visible: Option<ByteReader<'a>>,
	invisible: Option<ByteReader<'a>>,
	type_visible: Option<ByteReader<'a>>,
	type_invisible: Option<ByteReader<'a>>,
}

impl<'a> Annotations<'a> {
	/// Reads the visible, then the invisible annotations, then the visible and invisible type annotations.
	fn read<P, A, R>(
		self,
		pool: &PoolRead<'a>,
		api: Api,
		mut parent: P,
		mut visit: impl FnMut(P, JavaString, bool) -> Result<ControlFlow<P, (R, A)>>,
		mut visit_type: impl FnMut(P, TypeReference, TypePath, JavaString, bool) -> Result<ControlFlow<P, (R, A)>>,
		finish: impl Fn(R, A) -> Result<P>,
	) -> Result<P>
	where
		A: AnnotationVisitor,
	{
		let annotations = [
			(self.visible, true, attribute::RUNTIME_VISIBLE_ANNOTATIONS),
			(self.invisible, false, attribute::RUNTIME_INVISIBLE_ANNOTATIONS),
		];
		for (content, visible, name) in annotations {
			if let Some(content) = content {
				parent = read_content(content, name, |r| {
					read_annotations(r, pool, parent, |p, descriptor| visit(p, descriptor, visible), &finish)
				})?;
			}
		}

		let type_annotations = [
			(self.type_visible, true, attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS),
			(self.type_invisible, false, attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS),
		];
		for (content, visible, name) in type_annotations {
			if let Some(content) = content {
				api.check("TypeAnnotation", Api::Asm5)?;
				parent = read_content(content, name, |r| {
					read_type_annotations(r, pool, parent,
						|p, type_reference, type_path, descriptor| visit_type(p, type_reference, type_path, descriptor, visible),
						&finish,
					)
				})?;
			}
		}

		Ok(parent)
	}
}

#[derive(Default)]
struct ClassAttributes<'a> {
	signature: Option<JavaString>,
	source_file: Option<JavaString>,
	source_debug_extension: Option<JavaString>,
	enclosing_method: Option<(JavaString, Option<(JavaString, JavaString)>)>,
	synthetic: bool,
	deprecated: bool,
	annotations: Annotations<'a>,
	module: Option<ByteReader<'a>>,
	module_packages: Option<Vec<JavaString>>,
	module_main_class: Option<JavaString>,
	nest_host: Option<JavaString>,
	nest_members: Option<Vec<JavaString>>,
	permitted_subclasses: Option<Vec<JavaString>>,
	inner_classes: Vec<InnerClass>,
	unknown: Vec<Attribute>,
}

/// The attributes fields and methods have in common.
#[derive(Default)]
struct MemberAttributes<'a> {
	signature_index: Option<u16>,
	signature: Option<JavaString>,
	synthetic: bool,
	deprecated: bool,
	annotations: Annotations<'a>,
	unknown: Vec<Attribute>,
}

impl<'a> MemberAttributes<'a> {
	fn read(&mut self, r: &mut ByteReader<'a>, pool: &PoolRead<'a>, name: &JavaStr, length: u32) -> Result<()> {
		match name {
			name if name == attribute::SIGNATURE => {
				let index = read_attribute(r, attribute::SIGNATURE, length, |r| r.read_u16())?;
				self.signature_index = Some(index);
				self.signature = Some(pool.utf8_owned(index)?);
			},
			name if name == attribute::SYNTHETIC => {
				read_attribute(r, attribute::SYNTHETIC, length, |_| Ok(()))?;
				self.synthetic = true;
			},
			name if name == attribute::DEPRECATED => {
				read_attribute(r, attribute::DEPRECATED, length, |_| Ok(()))?;
				self.deprecated = true;
			},
			name if name == attribute::RUNTIME_VISIBLE_ANNOTATIONS => {
				self.annotations.visible = Some(r.take(length as usize)?);
			},
			name if name == attribute::RUNTIME_INVISIBLE_ANNOTATIONS => {
				self.annotations.invisible = Some(r.take(length as usize)?);
			},
			name if name == attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS => {
				self.annotations.type_visible = Some(r.take(length as usize)?);
			},
			name if name == attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
				self.annotations.type_invisible = Some(r.take(length as usize)?);
			},
			name => {
				let content = r.read_slice(length as usize)?.to_vec();
				self.unknown.push(Attribute { name: name.to_owned(), content });
			},
		}
		Ok(())
	}

	fn fold_access(&self, access_flags: u16) -> u32 {
		let mut access = access_flags as u32;
		if self.synthetic {
			access |= ACC_SYNTHETIC;
		}
		if self.deprecated {
			access |= ACC_DEPRECATED;
		}
		access
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::{ClassError, ClassReader};
	use crate::tree::version::Version;

	/// A minimal class `A extends java/lang/Object` in version `major`.
	fn class_bytes(major: u16) -> Vec<u8> {
		let mut bytes = vec![0xca, 0xfe, 0xba, 0xbe, 0x00, 0x00];
		bytes.extend_from_slice(&major.to_be_bytes());
		bytes.extend_from_slice(&[
			0x00, 0x05,
			0x01, 0x00, 0x01, b'A',
			0x07, 0x00, 0x01,
			0x01, 0x00, 0x10,
		]);
		bytes.extend_from_slice(b"java/lang/Object");
		bytes.extend_from_slice(&[
			0x07, 0x00, 0x03,
			0x00, 0x21,
			0x00, 0x02,
			0x00, 0x04,
			0x00, 0x00,
			0x00, 0x00,
			0x00, 0x00,
			0x00, 0x00,
		]);
		bytes
	}

	#[test]
	fn header() -> Result<()> {
		let bytes = class_bytes(52);
		let reader = ClassReader::new(&bytes)?;
		assert_eq!(reader.version(), Version::V1_8);
		assert_eq!(reader.access(), 0x21);
		assert_eq!(reader.class_name()?, "A");
		assert_eq!(reader.super_name()?.map(|name| name.to_owned()), Some("java/lang/Object".into()));
		assert!(reader.interfaces()?.is_empty());
		Ok(())
	}

	#[test]
	fn bad_magic_and_version() {
		let mut bytes = class_bytes(52);
		bytes[0] = 0xcb;
		let error = ClassReader::new(&bytes).err().unwrap();
		assert_eq!(ClassError::find(&error), Some(&ClassError::BadMagic { found: 0xcbfe_babe }));

		let bytes = class_bytes(54);
		let error = ClassReader::new(&bytes).err().unwrap();
		assert_eq!(ClassError::find(&error), Some(&ClassError::BadVersion { major: 54, minor: 0 }));
	}

	#[test]
	fn truncated() {
		let bytes = class_bytes(52);
		let error = ClassReader::new(&bytes[..bytes.len() - 1]).err().unwrap();
		assert!(matches!(ClassError::find(&error), Some(ClassError::Truncated { .. })));
	}
}
