//! Closed scalar value type for form fields and record cells.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// A form or cell value: string, number or boolean.
///
/// Anything else arriving from the wire (null, arrays, objects) is rejected by
/// [`ScalarValue::from_json`] instead of being coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Number(Number),
    Text(String),
}

impl ScalarValue {
    /// Convert a JSON value, returning `None` for non-scalar values
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// JSON representation sent to the table store
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::Text(s) => Value::String(s.clone()),
        }
    }

    /// Whether a cell value returned by the store holds this value.
    ///
    /// Text cells are compared against the rendered form of numbers and
    /// booleans, since form components deliver everything as strings.
    pub fn matches_cell(&self, cell: &Value) -> bool {
        match (self, cell) {
            (Self::Text(a), Value::String(b)) => a == b,
            (Self::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
            (Self::Bool(a), Value::Bool(b)) => a == b,
            (Self::Number(a), Value::String(b)) => *b == a.to_string() || numeric_eq(b, a),
            (_, Value::String(b)) => self.to_string() == *b,
            (Self::Text(a), Value::Number(b)) => *a == b.to_string() || numeric_eq(a, b),
            (Self::Text(a), Value::Bool(b)) => *a == b.to_string(),
            // Multi-value cells: any element matching counts
            (_, Value::Array(items)) => items.iter().any(|item| self.matches_cell(item)),
            _ => false,
        }
    }
}

/// `text` parses as a number equal to `number` ("3" and 3.0)
fn numeric_eq(text: &str, number: &Number) -> bool {
    match (text.trim().parse::<f64>(), number.as_f64()) {
        (Ok(a), Some(b)) => a == b,
        _ => false,
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(ScalarValue::from_json(&json!("E100")), Some(ScalarValue::from("E100")));
        assert_eq!(ScalarValue::from_json(&json!(3)), Some(ScalarValue::from(3)));
        assert_eq!(ScalarValue::from_json(&json!(true)), Some(ScalarValue::Bool(true)));
    }

    #[test]
    fn test_from_json_rejects_non_scalars() {
        assert_eq!(ScalarValue::from_json(&Value::Null), None);
        assert_eq!(ScalarValue::from_json(&json!(["a"])), None);
        assert_eq!(ScalarValue::from_json(&json!({"a": 1})), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(ScalarValue::from("已审批").to_string(), "已审批");
        assert_eq!(ScalarValue::from(3).to_string(), "3");
        assert_eq!(ScalarValue::Bool(false).to_string(), "false");
    }

    #[test]
    fn test_deserialize_yaml_literals() {
        let values: Vec<ScalarValue> = serde_yaml::from_str("[\"已审批\", 3, 2.5, true]").unwrap();
        assert_eq!(values[0], ScalarValue::from("已审批"));
        assert_eq!(values[1], ScalarValue::from(3));
        assert!(matches!(values[2], ScalarValue::Number(_)));
        assert_eq!(values[3], ScalarValue::Bool(true));
    }

    #[test]
    fn test_matches_cell_same_type() {
        assert!(ScalarValue::from("E100").matches_cell(&json!("E100")));
        assert!(!ScalarValue::from("E100").matches_cell(&json!("E101")));
        assert!(ScalarValue::from(3).matches_cell(&json!(3.0)));
    }

    #[test]
    fn test_matches_cell_across_types() {
        assert!(ScalarValue::from(100).matches_cell(&json!("100")));
        assert!(ScalarValue::from("100").matches_cell(&json!(100)));
        assert!(ScalarValue::from("true").matches_cell(&json!(true)));
        assert!(!ScalarValue::from("E100").matches_cell(&Value::Null));
    }

    #[test]
    fn test_matches_cell_text_against_float_cell() {
        assert!(ScalarValue::from("3").matches_cell(&json!(3.0)));
        assert!(ScalarValue::from(3).matches_cell(&json!("3.0")));
        assert!(!ScalarValue::from("3").matches_cell(&json!(3.5)));
        assert!(!ScalarValue::from("E3").matches_cell(&json!(3)));
    }

    #[test]
    fn test_matches_cell_multi_value() {
        assert!(ScalarValue::from("a").matches_cell(&json!(["b", "a"])));
        assert!(!ScalarValue::from("c").matches_cell(&json!(["b", "a"])));
    }
}
