use anyhow::{bail, Result};
use crate::class_constants::type_annotation;
use crate::ClassError;

/// States exactly on which type a type annotation is.
///
/// For annotations inside of code, the position is given by the visitor method: instruction annotations refer to the
/// last visited instruction, local variable annotations carry their ranges separately and exception parameter
/// annotations refer to the try catch block by index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TypeReference {
	/// On a type parameter of a generic class or interface.
	ClassTypeParameter { index: u8 },
	/// On a type parameter of a generic method or constructor.
	MethodTypeParameter { index: u8 },
	/// On the super class (`index` is [`u16::MAX`]) or on the super interface with the given index.
	ClassExtends { index: u16 },
	ClassTypeParameterBound { type_parameter: u8, bound: u8 },
	MethodTypeParameterBound { type_parameter: u8, bound: u8 },
	Field,
	MethodReturn,
	MethodReceiver,
	MethodFormalParameter { index: u8 },
	Throws { index: u16 },
	LocalVariable,
	ResourceVariable,
	/// On the exception parameter of the try catch block with the given index.
	ExceptionParameter { index: u16 },
	InstanceOf,
	New,
	ConstructorReference,
	MethodReference,
	Cast { type_argument: u8 },
	ConstructorInvocationTypeArgument { type_argument: u8 },
	MethodInvocationTypeArgument { type_argument: u8 },
	ConstructorReferenceTypeArgument { type_argument: u8 },
	MethodReferenceTypeArgument { type_argument: u8 },
}

impl TypeReference {
	pub(crate) fn target_type(self) -> u8 {
		match self {
			TypeReference::ClassTypeParameter { .. } => type_annotation::CLASS_TYPE_PARAMETER,
			TypeReference::MethodTypeParameter { .. } => type_annotation::METHOD_TYPE_PARAMETER,
			TypeReference::ClassExtends { .. } => type_annotation::CLASS_EXTENDS,
			TypeReference::ClassTypeParameterBound { .. } => type_annotation::CLASS_TYPE_PARAMETER_BOUND,
			TypeReference::MethodTypeParameterBound { .. } => type_annotation::METHOD_TYPE_PARAMETER_BOUND,
			TypeReference::Field => type_annotation::FIELD,
			TypeReference::MethodReturn => type_annotation::METHOD_RETURN,
			TypeReference::MethodReceiver => type_annotation::METHOD_RECEIVER,
			TypeReference::MethodFormalParameter { .. } => type_annotation::METHOD_FORMAL_PARAMETER,
			TypeReference::Throws { .. } => type_annotation::THROWS,
			TypeReference::LocalVariable => type_annotation::LOCAL_VARIABLE,
			TypeReference::ResourceVariable => type_annotation::RESOURCE_VARIABLE,
			TypeReference::ExceptionParameter { .. } => type_annotation::EXCEPTION_PARAMETER,
			TypeReference::InstanceOf => type_annotation::INSTANCE_OF,
			TypeReference::New => type_annotation::NEW,
			TypeReference::ConstructorReference => type_annotation::CONSTRUCTOR_REFERENCE,
			TypeReference::MethodReference => type_annotation::METHOD_REFERENCE,
			TypeReference::Cast { .. } => type_annotation::CAST,
			TypeReference::ConstructorInvocationTypeArgument { .. } => type_annotation::CONSTRUCTOR_INVOCATION_TYPE_ARGUMENT,
			TypeReference::MethodInvocationTypeArgument { .. } => type_annotation::METHOD_INVOCATION_TYPE_ARGUMENT,
			TypeReference::ConstructorReferenceTypeArgument { .. } => type_annotation::CONSTRUCTOR_REFERENCE_TYPE_ARGUMENT,
			TypeReference::MethodReferenceTypeArgument { .. } => type_annotation::METHOD_REFERENCE_TYPE_ARGUMENT,
		}
	}

	/// Returns `true` for the targets of annotations on instructions.
	pub(crate) fn is_instruction_target(self) -> bool {
		(type_annotation::INSTANCE_OF..=type_annotation::METHOD_REFERENCE_TYPE_ARGUMENT).contains(&self.target_type())
	}
}

/// One step of a [`TypePath`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TypePathKind {
	ArrayDeeper,
	NestedDeeper,
	WildcardBound,
	TypeArgument { index: u8 },
}

/// The location of the annotated type within the type named by the [`TypeReference`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TypePath {
	pub path: Vec<TypePathKind>,
}

impl TypePathKind {
	pub(crate) fn from_raw(kind: u8, type_argument_index: u8, at: usize) -> Result<TypePathKind> {
		Ok(match kind {
			0 => TypePathKind::ArrayDeeper,
			1 => TypePathKind::NestedDeeper,
			2 => TypePathKind::WildcardBound,
			3 => TypePathKind::TypeArgument { index: type_argument_index },
			tag => bail!(ClassError::Malformed { what: "type path kind", tag, at }),
		})
	}

	pub(crate) fn to_raw(self) -> (u8, u8) {
		match self {
			TypePathKind::ArrayDeeper => (0, 0),
			TypePathKind::NestedDeeper => (1, 0),
			TypePathKind::WildcardBound => (2, 0),
			TypePathKind::TypeArgument { index } => (3, index),
		}
	}
}
