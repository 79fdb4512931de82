//! Plain data passed along with the visitor events.

pub mod access;
pub mod annotation;
pub mod attribute;
pub mod class;
pub mod code;
pub mod descriptor;
pub mod frame;
pub mod type_annotation;
pub mod version;
