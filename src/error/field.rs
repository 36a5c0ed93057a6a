//! Field-level validation failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One validation failure tied to a field (or to the whole object when `field` is `None`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: Option<String>,
    pub code: String,
    /// Usually a list; a non-list value is kept as-is and rendered verbatim.
    #[serde(default = "empty_args")]
    pub args: Value,
}

fn empty_args() -> Value {
    Value::Array(Vec::new())
}

impl FieldError {
    pub fn new(field: impl Into<String>, code: impl Into<String>, args: Vec<Value>) -> Self {
        FieldError {
            field: Some(field.into()),
            code: code.into(),
            args: Value::Array(args),
        }
    }

    /// Failure not bound to a single field.
    pub fn global(code: impl Into<String>, args: Vec<Value>) -> Self {
        FieldError {
            field: None,
            code: code.into(),
            args: Value::Array(args),
        }
    }

    pub fn with_raw_args(field: Option<String>, code: impl Into<String>, args: Value) -> Self {
        FieldError {
            field,
            code: code.into(),
            args,
        }
    }

    /// Coerce an error-like JSON object (`{field, code, args}`) into a field error.
    /// Missing parts fall back to `null` field, empty code and empty args.
    pub fn from_raw(raw: &Value) -> Self {
        let field = raw
            .get("field")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let code = raw
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let args = raw.get("args").cloned().unwrap_or_else(empty_args);
        FieldError { field, code, args }
    }

    /// Value reported to clients: first arg of a non-empty list, the raw args when
    /// they are not a list, nothing for an empty list.
    pub fn value(&self) -> Option<Value> {
        match &self.args {
            Value::Array(items) => items.first().cloned(),
            other => Some(other.clone()),
        }
    }

    pub fn field_name(&self) -> &str {
        self.field.as_deref().unwrap_or("null")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_is_first_arg() {
        let e = FieldError::new("email", "len", vec![json!(100), json!(3)]);
        assert_eq!(e.value(), Some(json!(100)));
    }

    #[test]
    fn empty_args_have_no_value() {
        let e = FieldError::new("email", "notNull", vec![]);
        assert_eq!(e.value(), None);
    }

    #[test]
    fn raw_args_are_reported_verbatim() {
        let e = FieldError::with_raw_args(Some("age".into()), "min", json!({ "min": 18 }));
        assert_eq!(e.value(), Some(json!({ "min": 18 })));
    }

    #[test]
    fn from_raw_fills_defaults() {
        let e = FieldError::from_raw(&json!({ "message": "boom" }));
        assert_eq!(e.field, None);
        assert_eq!(e.code, "");
        assert_eq!(e.args, json!([]));

        let e = FieldError::from_raw(&json!({ "field": "name", "code": "unique", "args": ["x"] }));
        assert_eq!(e.field.as_deref(), Some("name"));
        assert_eq!(e.code, "unique");
        assert_eq!(e.value(), Some(json!("x")));
    }
}
