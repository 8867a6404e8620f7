use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::definition::{
    ConversionKind, Converter, TypeCategory, TypeDefinition, TypeRule, ValidateFn,
};

/// The universal type: compatible with everything in both directions.
pub const ANY_TYPE: &str = "any";

/// Result of a compatibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compatibility {
    pub compatible: bool,
    pub conversion: ConversionKind,
}

impl Compatibility {
    fn yes(conversion: ConversionKind) -> Self {
        Compatibility {
            compatible: true,
            conversion,
        }
    }

    fn no() -> Self {
        Compatibility {
            compatible: false,
            conversion: ConversionKind::None,
        }
    }
}

/// Registry of type definitions, compatibility rules, converters, hierarchy
/// entries, and custom validators. Owned by whoever constructs it; nothing
/// here is process-global.
#[derive(Default)]
pub struct TypeRegistry {
    definitions: HashMap<String, TypeDefinition>,
    /// Kept sorted descending by priority; first match wins.
    rules: Vec<TypeRule>,
    converters: Vec<Converter>,
    hierarchy: HashMap<String, Vec<String>>,
    validators: HashMap<String, Arc<ValidateFn>>,
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("definitions", &self.definitions)
            .field("rules", &self.rules)
            .field("converters", &self.converters)
            .field("hierarchy", &self.hierarchy)
            .field("validators", &self.validators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TypeRegistry {
    /// An empty registry with no types, rules, or converters.
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    /// A registry pre-populated with the primitive types and their default
    /// coercion rules.
    pub fn with_builtin_types() -> Self {
        let mut registry = TypeRegistry::new();

        for name in [ANY_TYPE, "string", "number", "boolean"] {
            registry.register_type(TypeDefinition::new(name, TypeCategory::Primitive));
        }
        for name in ["object", "array"] {
            registry.register_type(TypeDefinition::new(name, TypeCategory::Structured));
        }

        registry.register_rule(
            TypeRule::implicit("number", vec!["string".to_string()]).with_priority(10),
        );
        registry.register_rule(
            TypeRule::implicit("boolean", vec!["string".to_string(), "number".to_string()])
                .with_priority(10),
        );
        registry.register_rule(
            TypeRule::explicit("string", vec!["number".to_string(), "boolean".to_string()])
                .with_priority(5),
        );

        registry
    }

    pub fn register_type(&mut self, definition: TypeDefinition) {
        self.definitions.insert(definition.name.clone(), definition);
    }

    pub fn register_rule(&mut self, rule: TypeRule) {
        self.rules.push(rule);
        // Stable sort: equal priorities keep registration order.
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    pub fn register_converter(&mut self, converter: Converter) {
        self.converters.push(converter);
    }

    /// Register explicit ancestors for a type, in addition to whatever its
    /// `base_type` chain provides.
    pub fn register_hierarchy(&mut self, type_name: impl Into<String>, ancestors: Vec<String>) {
        self.hierarchy.insert(type_name.into(), ancestors);
    }

    pub fn register_validator(&mut self, type_name: impl Into<String>, validator: Arc<ValidateFn>) {
        self.validators.insert(type_name.into(), validator);
    }

    pub fn get_type(&self, name: &str) -> Option<&TypeDefinition> {
        self.definitions.get(name)
    }

    pub(crate) fn validator(&self, name: &str) -> Option<&Arc<ValidateFn>> {
        self.validators.get(name)
    }

    /// Decide whether `source` may feed `target`.
    pub fn is_compatible(&self, source: &str, target: &str) -> Compatibility {
        let mut seen = HashSet::new();
        self.is_compatible_inner(source, target, &mut seen)
    }

    fn is_compatible_inner(
        &self,
        source: &str,
        target: &str,
        seen: &mut HashSet<String>,
    ) -> Compatibility {
        // 1. Identical types.
        if source == target {
            return Compatibility::yes(ConversionKind::None);
        }

        // 2. Universal type on either side.
        if source == ANY_TYPE || target == ANY_TYPE {
            return Compatibility::yes(ConversionKind::None);
        }

        // 3. Priority-ordered rule scan; first hit wins.
        if let Some(rule) = self.find_rule(source, target) {
            return Compatibility::yes(rule.conversion);
        }

        // 4. Registered converter pair.
        if self.find_converter(source, target).is_some() {
            return Compatibility::yes(ConversionKind::Custom);
        }

        // 5. Walk the source's base type. The seen-set guards against
        //    accidental base_type cycles in user-registered definitions.
        if seen.insert(source.to_string()) {
            if let Some(base) = self
                .definitions
                .get(source)
                .and_then(|def| def.base_type.as_deref())
            {
                let result = self.is_compatible_inner(base, target, seen);
                if result.compatible {
                    return result;
                }
            }
        }

        // 6. Target is a registered ancestor of source.
        let source_ancestors = self.ancestors_of(source);
        if source_ancestors.contains(target) {
            return Compatibility::yes(ConversionKind::Implicit);
        }

        // 7. Shared ancestor.
        let target_ancestors = self.ancestors_of(target);
        if !source_ancestors.is_disjoint(&target_ancestors) {
            return Compatibility::yes(ConversionKind::Implicit);
        }

        // 8. Nothing bridges the pair.
        Compatibility::no()
    }

    pub(crate) fn find_rule(&self, source: &str, target: &str) -> Option<&TypeRule> {
        self.rules.iter().find(|rule| {
            (rule.source_type == source && rule.target_types.iter().any(|t| t == target))
                || (rule.bidirectional
                    && rule.source_type == target
                    && rule.target_types.iter().any(|t| t == source))
        })
    }

    pub(crate) fn find_converter(&self, source: &str, target: &str) -> Option<&Converter> {
        self.converters.iter().find(|c| {
            (c.source_type == source && c.target_type == target)
                || (c.bidirectional && c.source_type == target && c.target_type == source)
        })
    }

    /// Transitive ancestors of a type: explicit hierarchy entries plus the
    /// `base_type` chain, followed recursively.
    pub(crate) fn ancestors_of(&self, type_name: &str) -> HashSet<String> {
        let mut result = HashSet::new();
        let mut queue = vec![type_name.to_string()];
        let mut visited = HashSet::new();

        while let Some(current) = queue.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(entries) = self.hierarchy.get(&current) {
                for ancestor in entries {
                    result.insert(ancestor.clone());
                    queue.push(ancestor.clone());
                }
            }
            if let Some(base) = self
                .definitions
                .get(&current)
                .and_then(|def| def.base_type.clone())
            {
                result.insert(base.clone());
                queue.push(base);
            }
        }

        result.remove(type_name);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_identity_always_compatible() {
        let registry = TypeRegistry::new();
        for t in ["string", "number", "whatever-custom"] {
            let result = registry.is_compatible(t, t);
            assert!(result.compatible);
            assert_eq!(result.conversion, ConversionKind::None);
        }
    }

    #[test]
    fn test_any_compatible_both_directions() {
        let registry = TypeRegistry::with_builtin_types();
        assert!(registry.is_compatible("any", "custom-record").compatible);
        assert!(registry.is_compatible("custom-record", "any").compatible);
    }

    #[test]
    fn test_rule_match_and_conversion_kind() {
        let registry = TypeRegistry::with_builtin_types();
        let result = registry.is_compatible("number", "string");
        assert!(result.compatible);
        assert_eq!(result.conversion, ConversionKind::Implicit);

        let result = registry.is_compatible("string", "number");
        assert!(result.compatible);
        assert_eq!(result.conversion, ConversionKind::Explicit);
    }

    #[test]
    fn test_rule_priority_first_match_wins() {
        let mut registry = TypeRegistry::new();
        registry.register_rule(
            TypeRule::explicit("a", vec!["b".to_string()]).with_priority(1),
        );
        registry.register_rule(
            TypeRule::implicit("a", vec!["b".to_string()]).with_priority(100),
        );
        let result = registry.is_compatible("a", "b");
        assert_eq!(result.conversion, ConversionKind::Implicit);
    }

    #[test]
    fn test_bidirectional_rule_reverse_match() {
        let mut registry = TypeRegistry::new();
        registry
            .register_rule(TypeRule::implicit("csv", vec!["table".to_string()]).bidirectional());
        assert!(registry.is_compatible("csv", "table").compatible);
        assert!(registry.is_compatible("table", "csv").compatible);
        assert!(!registry.is_compatible("table", "json").compatible);
    }

    #[test]
    fn test_converter_pair_match() {
        let mut registry = TypeRegistry::new();
        registry.register_converter(Converter {
            source_type: "celsius".to_string(),
            target_type: "fahrenheit".to_string(),
            bidirectional: false,
            convert_fn: Arc::new(|v: &Value| Ok(v.clone())),
        });
        let result = registry.is_compatible("celsius", "fahrenheit");
        assert!(result.compatible);
        assert_eq!(result.conversion, ConversionKind::Custom);
        assert!(!registry.is_compatible("fahrenheit", "celsius").compatible);
    }

    #[test]
    fn test_base_type_recursion() {
        let mut registry = TypeRegistry::with_builtin_types();
        registry.register_type(
            TypeDefinition::new("positive-number", TypeCategory::Custom).with_base("number"),
        );
        // positive-number -> string resolves through the number -> string rule
        let result = registry.is_compatible("positive-number", "string");
        assert!(result.compatible);
    }

    #[test]
    fn test_target_is_ancestor() {
        let mut registry = TypeRegistry::new();
        registry.register_hierarchy("jpeg", vec!["image".to_string()]);
        assert!(registry.is_compatible("jpeg", "image").compatible);
        assert!(!registry.is_compatible("image", "jpeg").compatible);
    }

    #[test]
    fn test_common_ancestor() {
        let mut registry = TypeRegistry::new();
        registry.register_hierarchy("jpeg", vec!["image".to_string()]);
        registry.register_hierarchy("png", vec!["image".to_string()]);
        assert!(registry.is_compatible("jpeg", "png").compatible);
    }

    #[test]
    fn test_incompatible_pair() {
        let registry = TypeRegistry::with_builtin_types();
        assert!(!registry.is_compatible("object", "number").compatible);
    }

    #[test]
    fn test_base_type_cycle_terminates() {
        let mut registry = TypeRegistry::new();
        registry.register_type(TypeDefinition::new("a", TypeCategory::Custom).with_base("b"));
        registry.register_type(TypeDefinition::new("b", TypeCategory::Custom).with_base("a"));
        assert!(!registry.is_compatible("a", "c").compatible);
    }
}
