//! Access flags of classes, fields, methods, inner classes, parameters and modules.
//!
//! Access flags are passed around as `u32`: the lower 16 bits are the flags of the class file, the upper bits are
//! flags only this library uses, like [`ACC_DEPRECATED`].

pub const ACC_PUBLIC: u32 = 0x0001;
pub const ACC_PRIVATE: u32 = 0x0002;
pub const ACC_PROTECTED: u32 = 0x0004;
pub const ACC_STATIC: u32 = 0x0008;
pub const ACC_FINAL: u32 = 0x0010;
pub const ACC_SUPER: u32 = 0x0020;
pub const ACC_SYNCHRONIZED: u32 = 0x0020;
pub const ACC_OPEN: u32 = 0x0020;
pub const ACC_TRANSITIVE: u32 = 0x0020;
pub const ACC_VOLATILE: u32 = 0x0040;
pub const ACC_BRIDGE: u32 = 0x0040;
pub const ACC_STATIC_PHASE: u32 = 0x0040;
pub const ACC_VARARGS: u32 = 0x0080;
pub const ACC_TRANSIENT: u32 = 0x0080;
pub const ACC_NATIVE: u32 = 0x0100;
pub const ACC_INTERFACE: u32 = 0x0200;
pub const ACC_ABSTRACT: u32 = 0x0400;
pub const ACC_STRICT: u32 = 0x0800;
pub const ACC_SYNTHETIC: u32 = 0x1000;
pub const ACC_ANNOTATION: u32 = 0x2000;
pub const ACC_ENUM: u32 = 0x4000;
pub const ACC_MANDATED: u32 = 0x8000;
pub const ACC_MODULE: u32 = 0x8000;

/// Set when the class, field or method carries a `Deprecated` attribute.
pub const ACC_DEPRECATED: u32 = 0x20000;
