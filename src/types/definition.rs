use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::NodeError;

/// How a value moves between two compatible types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionKind {
    /// Same type or universal type; no conversion needed.
    None,
    /// Safe, automatic conversion.
    Implicit,
    /// Lossy or fallible conversion the workflow author opted into.
    Explicit,
    /// Conversion performed by a registered function.
    Custom,
}

/// Broad classification of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeCategory {
    Primitive,
    Structured,
    Custom,
}

/// A registered port type.
///
/// `base_type` provides one level of inheritance per definition; chains are
/// followed transitively when checking compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub name: String,
    #[serde(default)]
    pub base_type: Option<String>,
    pub category: TypeCategory,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>, category: TypeCategory) -> Self {
        TypeDefinition {
            name: name.into(),
            base_type: None,
            category,
            properties: HashMap::new(),
        }
    }

    pub fn with_base(mut self, base_type: impl Into<String>) -> Self {
        self.base_type = Some(base_type.into());
        self
    }
}

/// Conversion function signature used by rules and converters.
pub type ConvertFn = dyn Fn(&Value) -> Result<Value, NodeError> + Send + Sync;

/// Custom validator signature: returns validity plus an optional message.
pub type ValidateFn = dyn Fn(&Value) -> (bool, Option<String>) + Send + Sync;

/// A compatibility rule from one source type to a set of target types.
#[derive(Clone)]
pub struct TypeRule {
    pub source_type: String,
    pub target_types: Vec<String>,
    pub bidirectional: bool,
    pub conversion: ConversionKind,
    pub convert_fn: Option<Arc<ConvertFn>>,
    pub priority: i32,
}

impl TypeRule {
    pub fn implicit(source_type: impl Into<String>, target_types: Vec<String>) -> Self {
        TypeRule {
            source_type: source_type.into(),
            target_types,
            bidirectional: false,
            conversion: ConversionKind::Implicit,
            convert_fn: None,
            priority: 0,
        }
    }

    pub fn explicit(source_type: impl Into<String>, target_types: Vec<String>) -> Self {
        TypeRule {
            conversion: ConversionKind::Explicit,
            ..TypeRule::implicit(source_type, target_types)
        }
    }

    pub fn custom(
        source_type: impl Into<String>,
        target_types: Vec<String>,
        convert_fn: Arc<ConvertFn>,
    ) -> Self {
        TypeRule {
            conversion: ConversionKind::Custom,
            convert_fn: Some(convert_fn),
            ..TypeRule::implicit(source_type, target_types)
        }
    }

    pub fn bidirectional(mut self) -> Self {
        self.bidirectional = true;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl fmt::Debug for TypeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRule")
            .field("source_type", &self.source_type)
            .field("target_types", &self.target_types)
            .field("bidirectional", &self.bidirectional)
            .field("conversion", &self.conversion)
            .field("has_convert_fn", &self.convert_fn.is_some())
            .field("priority", &self.priority)
            .finish()
    }
}

/// A standalone registered converter for one type pair.
#[derive(Clone)]
pub struct Converter {
    pub source_type: String,
    pub target_type: String,
    pub bidirectional: bool,
    pub convert_fn: Arc<ConvertFn>,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("source_type", &self.source_type)
            .field("target_type", &self.target_type)
            .field("bidirectional", &self.bidirectional)
            .finish()
    }
}
