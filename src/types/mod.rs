//! Type-compatibility engine.
//!
//! Decides whether two port types may be connected ([`TypeRegistry::is_compatible`]),
//! converts values between types at runtime ([`TypeRegistry::convert`]), and
//! validates data against a type ([`TypeRegistry::validate`]). Rules are kept
//! sorted by descending priority; the first matching rule wins.

pub mod convert;
pub mod definition;
pub mod registry;
pub mod validate;

pub use definition::{
    ConversionKind, ConvertFn, Converter, TypeCategory, TypeDefinition, TypeRule, ValidateFn,
};
pub use registry::{Compatibility, TypeRegistry};
