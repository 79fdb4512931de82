use std::ops::ControlFlow;
use anyhow::{anyhow, bail, Context, Result};
use java_string::JavaString;
use crate::{ByteReader, ClassError, ClassRead};
use crate::class_constants::type_annotation;
use crate::class_reader::pool::PoolRead;
use crate::tree::annotation::ElementValue;
use crate::tree::type_annotation::{TypePath, TypePathKind, TypeReference};
use crate::visitor::annotation::AnnotationVisitor;

/// The part of a type annotation target that refers to positions in the code.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TargetPosition {
	None,
	/// The bytecode offset of the annotated instruction.
	Offset(u16),
	/// Entries of start offset, length and local variable index.
	LocalVariables(Vec<(u16, u16, u16)>),
}

/// Reads the `target_type` and `target_info` items of a type annotation.
pub(crate) fn read_target(r: &mut ByteReader) -> Result<(TypeReference, TargetPosition)> {
	let at = r.position();
	let target_type = r.read_u8()?;
	Ok(match target_type {
		type_annotation::CLASS_TYPE_PARAMETER => (TypeReference::ClassTypeParameter { index: r.read_u8()? }, TargetPosition::None),
		type_annotation::METHOD_TYPE_PARAMETER => (TypeReference::MethodTypeParameter { index: r.read_u8()? }, TargetPosition::None),
		type_annotation::CLASS_EXTENDS => (TypeReference::ClassExtends { index: r.read_u16()? }, TargetPosition::None),
		type_annotation::CLASS_TYPE_PARAMETER_BOUND => {
			let type_parameter = r.read_u8()?;
			let bound = r.read_u8()?;
			(TypeReference::ClassTypeParameterBound { type_parameter, bound }, TargetPosition::None)
		},
		type_annotation::METHOD_TYPE_PARAMETER_BOUND => {
			let type_parameter = r.read_u8()?;
			let bound = r.read_u8()?;
			(TypeReference::MethodTypeParameterBound { type_parameter, bound }, TargetPosition::None)
		},
		type_annotation::FIELD => (TypeReference::Field, TargetPosition::None),
		type_annotation::METHOD_RETURN => (TypeReference::MethodReturn, TargetPosition::None),
		type_annotation::METHOD_RECEIVER => (TypeReference::MethodReceiver, TargetPosition::None),
		type_annotation::METHOD_FORMAL_PARAMETER => (TypeReference::MethodFormalParameter { index: r.read_u8()? }, TargetPosition::None),
		type_annotation::THROWS => (TypeReference::Throws { index: r.read_u16()? }, TargetPosition::None),
		type_annotation::LOCAL_VARIABLE | type_annotation::RESOURCE_VARIABLE => {
			let table = r.read_vec(
				|r| r.read_u16_as_usize(),
				|r| Ok((r.read_u16()?, r.read_u16()?, r.read_u16()?))
			)?;
			let type_reference = if target_type == type_annotation::LOCAL_VARIABLE {
				TypeReference::LocalVariable
			} else {
				TypeReference::ResourceVariable
			};
			(type_reference, TargetPosition::LocalVariables(table))
		},
		type_annotation::EXCEPTION_PARAMETER => (TypeReference::ExceptionParameter { index: r.read_u16()? }, TargetPosition::None),
		type_annotation::INSTANCE_OF => (TypeReference::InstanceOf, TargetPosition::Offset(r.read_u16()?)),
		type_annotation::NEW => (TypeReference::New, TargetPosition::Offset(r.read_u16()?)),
		type_annotation::CONSTRUCTOR_REFERENCE => (TypeReference::ConstructorReference, TargetPosition::Offset(r.read_u16()?)),
		type_annotation::METHOD_REFERENCE => (TypeReference::MethodReference, TargetPosition::Offset(r.read_u16()?)),
		type_annotation::CAST..=type_annotation::METHOD_REFERENCE_TYPE_ARGUMENT => {
			let offset = r.read_u16()?;
			let type_argument = r.read_u8()?;
			let type_reference = match target_type {
				type_annotation::CAST => TypeReference::Cast { type_argument },
				type_annotation::CONSTRUCTOR_INVOCATION_TYPE_ARGUMENT => TypeReference::ConstructorInvocationTypeArgument { type_argument },
				type_annotation::METHOD_INVOCATION_TYPE_ARGUMENT => TypeReference::MethodInvocationTypeArgument { type_argument },
				type_annotation::CONSTRUCTOR_REFERENCE_TYPE_ARGUMENT => TypeReference::ConstructorReferenceTypeArgument { type_argument },
				_ => TypeReference::MethodReferenceTypeArgument { type_argument },
			};
			(type_reference, TargetPosition::Offset(offset))
		},
		tag => bail!(ClassError::Malformed { what: "type annotation target", tag, at }),
	})
}

pub(crate) fn read_type_path(r: &mut ByteReader) -> Result<TypePath> {
	let path = r.read_vec(
		|r| r.read_u8_as_usize(),
		|r| {
			let at = r.position();
			let kind = r.read_u8()?;
			let type_argument_index = r.read_u8()?;
			TypePathKind::from_raw(kind, type_argument_index, at)
		}
	)?;
	Ok(TypePath { path })
}

/// Reads the `num_element_value_pairs` and `element_value_pairs` items of an annotation into the visitor, and
/// calls [`AnnotationVisitor::visit_end`].
pub(crate) fn read_element_value_pairs<A: AnnotationVisitor>(r: &mut ByteReader, pool: &PoolRead, mut visitor: A) -> Result<A> {
	let count = r.read_u16()?;
	for _ in 0..count {
		let name = pool.utf8_owned(r.read_u16()?)?;
		visitor = read_element_value(r, pool, Some(name), visitor)?;
	}
	visitor.visit_end()?;
	Ok(visitor)
}

pub(crate) fn skip_element_value_pairs(r: &mut ByteReader) -> Result<()> {
	let count = r.read_u16()?;
	for _ in 0..count {
		r.skip(2)?;
		skip_element_value(r)?;
	}
	Ok(())
}

/// Reads an element value into the visitor, giving it the name `name`.
pub(crate) fn read_element_value<A: AnnotationVisitor>(r: &mut ByteReader, pool: &PoolRead, name: Option<JavaString>, mut visitor: A) -> Result<A> {
	let at = r.position();
	let tag = r.read_u8()?;
	match tag {
		b'B' => visitor.visit_value(name, ElementValue::Byte(pool.integer(r.read_u16()?)? as i8))?,
		b'C' => visitor.visit_value(name, ElementValue::Char(pool.integer(r.read_u16()?)? as u16))?,
		b'D' => visitor.visit_value(name, ElementValue::Double(pool.double(r.read_u16()?)?))?,
		b'F' => visitor.visit_value(name, ElementValue::Float(pool.float(r.read_u16()?)?))?,
		b'I' => visitor.visit_value(name, ElementValue::Int(pool.integer(r.read_u16()?)?))?,
		b'J' => visitor.visit_value(name, ElementValue::Long(pool.long(r.read_u16()?)?))?,
		b'S' => visitor.visit_value(name, ElementValue::Short(pool.integer(r.read_u16()?)? as i16))?,
		b'Z' => visitor.visit_value(name, ElementValue::Boolean(pool.integer(r.read_u16()?)? != 0))?,
		b's' => visitor.visit_value(name, ElementValue::String(pool.utf8_owned(r.read_u16()?)?))?,
		b'c' => visitor.visit_value(name, ElementValue::Class(pool.utf8_owned(r.read_u16()?)?))?,
		b'e' => {
			let descriptor = pool.utf8_owned(r.read_u16()?)?;
			let value = pool.utf8_owned(r.read_u16()?)?;
			visitor.visit_enum(name, descriptor, value)?;
		},
		b'@' => {
			let descriptor = pool.utf8_owned(r.read_u16()?)?;
			visitor = match visitor.visit_annotation(name, descriptor)? {
				ControlFlow::Continue((residual, nested)) => {
					let nested = read_element_value_pairs(r, pool, nested)?;
					A::finish_nested(residual, nested)?
				},
				ControlFlow::Break(visitor) => {
					skip_element_value_pairs(r)?;
					visitor
				},
			};
		},
		b'[' => {
			visitor = match visitor.visit_array(name)? {
				ControlFlow::Continue((residual, mut nested)) => {
					let count = r.read_u16()?;
					for _ in 0..count {
						nested = read_element_value(r, pool, None, nested)?;
					}
					nested.visit_end()?;
					A::finish_nested(residual, nested)?
				},
				ControlFlow::Break(visitor) => {
					let count = r.read_u16()?;
					for _ in 0..count {
						skip_element_value(r)?;
					}
					visitor
				},
			};
		},
		tag => bail!(ClassError::Malformed { what: "element value", tag, at }),
	}
	Ok(visitor)
}

fn skip_element_value(r: &mut ByteReader) -> Result<()> {
	let at = r.position();
	match r.read_u8()? {
		b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => r.skip(2),
		b'e' => r.skip(4),
		b'@' => {
			r.skip(2)?;
			skip_element_value_pairs(r)
		},
		b'[' => {
			let count = r.read_u16()?;
			for _ in 0..count {
				skip_element_value(r)?;
			}
			Ok(())
		},
		tag => bail!(ClassError::Malformed { what: "element value", tag, at }),
	}
}

/// Reads the annotations of a `Runtime[In]VisibleAnnotations` or a `Runtime[In]VisibleParameterAnnotations`
/// attribute.
///
/// `visit` gets the descriptor of each annotation and asks the visitor for an annotation visitor, `finish` gives
/// the visitor back.
pub(crate) fn read_annotations<P, A, R>(
	r: &mut ByteReader,
	pool: &PoolRead,
	mut parent: P,
	mut visit: impl FnMut(P, JavaString) -> Result<ControlFlow<P, (R, A)>>,
	finish: impl Fn(R, A) -> Result<P>,
) -> Result<P>
where
	A: AnnotationVisitor,
{
	let count = r.read_u16()?;
	for i in 0..count {
		let descriptor = pool.utf8_owned(r.read_u16()?)?;
		parent = match visit(parent, descriptor)? {
			ControlFlow::Continue((residual, visitor)) => {
				let visitor = read_element_value_pairs(r, pool, visitor)
					.with_context(|| anyhow!("failed to read annotation {i}"))?;
				finish(residual, visitor)?
			},
			ControlFlow::Break(parent) => {
				skip_element_value_pairs(r)?;
				parent
			},
		};
	}
	Ok(parent)
}

/// Reads the annotations of a `Runtime[In]VisibleTypeAnnotations` attribute outside of code.
pub(crate) fn read_type_annotations<P, A, R>(
	r: &mut ByteReader,
	pool: &PoolRead,
	mut parent: P,
	mut visit: impl FnMut(P, TypeReference, TypePath, JavaString) -> Result<ControlFlow<P, (R, A)>>,
	finish: impl Fn(R, A) -> Result<P>,
) -> Result<P>
where
	A: AnnotationVisitor,
{
	let count = r.read_u16()?;
	for i in 0..count {
		let at = r.position();
		let (type_reference, position) = read_target(r)?;
		if position != TargetPosition::None {
			bail!(ClassError::Malformed { what: "type annotation target outside of code", tag: type_reference.target_type(), at });
		}
		let type_path = read_type_path(r)?;
		let descriptor = pool.utf8_owned(r.read_u16()?)?;
		parent = match visit(parent, type_reference, type_path, descriptor)? {
			ControlFlow::Continue((residual, visitor)) => {
				let visitor = read_element_value_pairs(r, pool, visitor)
					.with_context(|| anyhow!("failed to read type annotation {i}"))?;
				finish(residual, visitor)?
			},
			ControlFlow::Break(parent) => {
				skip_element_value_pairs(r)?;
				parent
			},
		};
	}
	Ok(parent)
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::{ByteReader, ClassError, ClassRead};
	use crate::class_reader::annotation::{read_target, read_type_path, skip_element_value, TargetPosition};
	use crate::tree::type_annotation::{TypePath, TypePathKind, TypeReference};

	#[test]
	fn targets() -> Result<()> {
		let bytes = [0x47, 0x00, 0x05, 0x01];
		let (type_reference, position) = read_target(&mut ByteReader::new(&bytes))?;
		assert_eq!(type_reference, TypeReference::Cast { type_argument: 1 });
		assert_eq!(position, TargetPosition::Offset(5));

		let bytes = [0x40, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04];
		let (type_reference, position) = read_target(&mut ByteReader::new(&bytes))?;
		assert_eq!(type_reference, TypeReference::LocalVariable);
		assert_eq!(position, TargetPosition::LocalVariables(vec![(2, 3, 4)]));

		let bytes = [0x20];
		let error = read_target(&mut ByteReader::new(&bytes)).unwrap_err();
		assert_eq!(ClassError::find(&error), Some(&ClassError::Malformed { what: "type annotation target", tag: 0x20, at: 0 }));
		Ok(())
	}

	#[test]
	fn type_path() -> Result<()> {
		let bytes = [0x02, 0x00, 0x00, 0x03, 0x01];
		let path = read_type_path(&mut ByteReader::new(&bytes))?;
		assert_eq!(path, TypePath { path: vec![TypePathKind::ArrayDeeper, TypePathKind::TypeArgument { index: 1 }] });
		Ok(())
	}

	#[test]
	fn skip_nested() -> Result<()> {
		// an array of an annotation with one int value, then an enum
		let bytes = [
			b'[', 0x00, 0x02,
			b'@', 0x00, 0x01, 0x00, 0x01, 0x00, 0x02, b'I', 0x00, 0x03,
			b'e', 0x00, 0x04, 0x00, 0x05,
		];
		let mut r = ByteReader::new(&bytes);
		skip_element_value(&mut r)?;
		assert_eq!(r.position(), bytes.len());
		Ok(())
	}
}
