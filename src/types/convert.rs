//! Runtime value conversion between port types.

use serde_json::{Number, Value};

use crate::error::NodeError;

use super::registry::{TypeRegistry, ANY_TYPE};

/// 字符串真值集合（不区分大小写）
const TRUTHY_STRINGS: [&str; 4] = ["true", "yes", "1", "y"];

impl TypeRegistry {
    /// Convert `data` from `source` to `target`.
    ///
    /// Identical types (and conversions into `any`) pass through unchanged.
    /// A matching rule or converter with a function is invoked; otherwise the
    /// basic coercions apply. When nothing resolves the conversion fails.
    pub fn convert(&self, data: &Value, source: &str, target: &str) -> Result<Value, NodeError> {
        if source == target || target == ANY_TYPE {
            return Ok(data.clone());
        }

        if let Some(rule) = self.find_rule(source, target) {
            if let Some(convert_fn) = &rule.convert_fn {
                return convert_fn(data);
            }
        }

        if let Some(converter) = self.find_converter(source, target) {
            return (converter.convert_fn)(data);
        }

        match target {
            "string" => Ok(Value::String(coerce_to_string(data))),
            "number" => coerce_to_number(data).map_err(|message| NodeError::Conversion {
                from: source.to_string(),
                to: target.to_string(),
                message,
            }),
            "boolean" => coerce_to_boolean(data).map_err(|message| NodeError::Conversion {
                from: source.to_string(),
                to: target.to_string(),
                message,
            }),
            _ => Err(NodeError::Conversion {
                from: source.to_string(),
                to: target.to_string(),
                message: "no conversion rule, converter, or coercion applies".to_string(),
            }),
        }
    }
}

/// 将 Value 转换为字符串
pub(crate) fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "".to_string(),
        other => other.to_string(),
    }
}

/// 将 Value 转换为数字（布尔映射为 1/0，字符串按数字解析）
pub(crate) fn coerce_to_number(value: &Value) -> Result<Value, String> {
    match value {
        Value::Number(n) => Ok(Value::Number(n.clone())),
        Value::Bool(b) => Ok(Value::Number(Number::from(if *b { 1 } else { 0 }))),
        Value::String(s) => {
            if let Ok(i) = s.trim().parse::<i64>() {
                return Ok(Value::Number(Number::from(i)));
            }
            let parsed = s
                .trim()
                .parse::<f64>()
                .map_err(|e| format!("cannot parse '{}' as number: {}", s, e))?;
            Number::from_f64(parsed)
                .map(Value::Number)
                .ok_or_else(|| format!("'{}' is not a finite number", s))
        }
        other => Err(format!("cannot coerce {:?} to number", other)),
    }
}

/// 将 Value 转换为布尔（字符串按真值集合判断，数字按非零判断）
pub(crate) fn coerce_to_boolean(value: &Value) -> Result<Value, String> {
    match value {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::String(s) => {
            let lowered = s.trim().to_ascii_lowercase();
            Ok(Value::Bool(TRUTHY_STRINGS.contains(&lowered.as_str())))
        }
        Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
        other => Err(format!("cannot coerce {:?} to boolean", other)),
    }
}
