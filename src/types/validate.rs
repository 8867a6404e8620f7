//! Data validation against registered types.

use serde_json::Value;

use super::registry::{TypeRegistry, ANY_TYPE};

impl TypeRegistry {
    /// Validate `data` against `type_name`.
    ///
    /// A registered custom validator takes precedence; built-in structural
    /// checks cover the primitives; otherwise the check recurses into the
    /// type's `base_type`. A type with nothing defined validates everything.
    pub fn validate(&self, data: &Value, type_name: &str) -> (bool, Option<String>) {
        if let Some(validator) = self.validator(type_name) {
            return validator(data);
        }

        match type_name {
            ANY_TYPE => (true, None),
            "string" => structural(data.is_string(), "string", data),
            "number" => structural(data.is_number(), "number", data),
            "boolean" => structural(data.is_boolean(), "boolean", data),
            "object" => structural(data.is_object(), "object", data),
            "array" => structural(data.is_array(), "array", data),
            _ => {
                if let Some(base) = self
                    .get_type(type_name)
                    .and_then(|def| def.base_type.as_deref())
                {
                    // 单层继承：继续校验基类型
                    self.validate(data, base)
                } else {
                    (true, None)
                }
            }
        }
    }
}

fn structural(valid: bool, expected: &str, data: &Value) -> (bool, Option<String>) {
    if valid {
        (true, None)
    } else {
        (
            false,
            Some(format!("expected {}, got {}", expected, json_type_name(data))),
        )
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
