//! Structured error taxonomy. Every variant renders a client body: an ordered list of
//! `{code, field, value}` entries.

use super::field::FieldError;
use super::AppError;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// One entry of an error body.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorEntry {
    pub code: String,
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Lookup produced no instance. `filters` are the criteria used for the lookup.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct NotFoundError {
    pub object_name: String,
    pub filters: Map<String, Value>,
    pub message: String,
}

impl NotFoundError {
    pub fn new(object_name: impl Into<String>, filters: Map<String, Value>) -> Self {
        let object_name = object_name.into();
        NotFoundError {
            message: format!("{} not found", object_name),
            object_name,
            filters,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// One entry per filter key. A filter value shaped `{code, value}` overrides the
    /// default `notFound` code and reports its inner value.
    pub fn body(&self) -> Vec<ErrorEntry> {
        self.filters
            .iter()
            .map(|(key, data)| {
                let code = data
                    .get("code")
                    .map(|c| match c {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| "notFound".to_string());
                let value = match data.get("value") {
                    Some(inner) if data.is_object() => inner.clone(),
                    _ => data.clone(),
                };
                ErrorEntry {
                    code: format!("{}.{}.{}.error", self.object_name, key, code),
                    field: Some(key.clone()),
                    value: Some(value),
                }
            })
            .collect()
    }

    /// Recover from a not-found failure with `fallback`; any other error is returned unchanged.
    pub fn recover<T>(
        result: Result<T, AppError>,
        fallback: impl FnOnce(NotFoundError) -> T,
    ) -> Result<T, AppError> {
        match result {
            Err(AppError::Api(ApiError::NotFound(e))) => Ok(fallback(e)),
            other => other,
        }
    }
}

/// Accumulated field-level failures for one object.
#[derive(Clone, Debug, Error)]
#[error("Validation error with \"{object_name}\"")]
pub struct ValidationError {
    pub object_name: String,
    errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn new(object_name: impl Into<String>, errors: Vec<FieldError>) -> Self {
        ValidationError {
            object_name: object_name.into(),
            errors,
        }
    }

    pub fn empty(object_name: impl Into<String>) -> Self {
        Self::new(object_name, Vec::new())
    }

    /// Build from untyped error-like objects. Anything but a list (including `null`)
    /// yields no errors.
    pub fn from_raw(object_name: impl Into<String>, raw: &Value) -> Self {
        let errors = match raw {
            Value::Array(items) => items.iter().map(FieldError::from_raw).collect(),
            _ => Vec::new(),
        };
        Self::new(object_name, errors)
    }

    pub fn add_field_error(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    pub fn add_error(&mut self, field: impl Into<String>, code: impl Into<String>, args: Vec<Value>) {
        self.errors.push(FieldError::new(field, code, args));
    }

    pub fn merge(&mut self, other: ValidationError) {
        self.errors.extend(other.errors);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn body(&self) -> Vec<ErrorEntry> {
        self.errors
            .iter()
            .map(|e| ErrorEntry {
                code: format!("{}.{}.{}.error", self.object_name, e.field_name(), e.code),
                field: e.field.clone(),
                value: e.value(),
            })
            .collect()
    }

    /// Fail with `self` when it carries errors, otherwise hand `value` through.
    pub fn check<T>(self, value: T) -> Result<T, ValidationError> {
        if self.has_errors() {
            Err(self)
        } else {
            Ok(value)
        }
    }
}

/// Caller lacks permission for the operation.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct ForbiddenError {
    pub message: String,
    pub args: Vec<Value>,
}

impl ForbiddenError {
    pub fn new(message: Option<String>, args: Vec<Value>) -> Self {
        ForbiddenError {
            message: message.unwrap_or_else(|| "Permission error".to_string()),
            args,
        }
    }

    pub fn body(&self) -> Vec<ErrorEntry> {
        vec![ErrorEntry {
            code: "authorization.token.invalid.error".to_string(),
            field: Some("token".to_string()),
            value: Some(Value::Array(self.args.clone())),
        }]
    }
}

/// Request carries no usable credentials.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct AuthorizationError {
    pub message: String,
    pub args: Vec<Value>,
}

impl AuthorizationError {
    pub fn new(message: Option<String>, args: Vec<Value>) -> Self {
        AuthorizationError {
            message: message.unwrap_or_else(|| "Authorization error".to_string()),
            args,
        }
    }

    pub fn body(&self) -> Vec<ErrorEntry> {
        vec![ErrorEntry {
            code: "authorization.token.missing.error".to_string(),
            field: Some("token".to_string()),
            value: Some(Value::Array(self.args.clone())),
        }]
    }
}

#[derive(Clone, Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Forbidden(#[from] ForbiddenError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    /// Any other controlled failure; renders an empty body.
    #[error("{message}")]
    Generic { error_type: String, message: String },
}

impl ApiError {
    pub fn generic(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Generic {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::generic("BadRequestError", message)
    }

    pub fn error_type(&self) -> &str {
        match self {
            ApiError::NotFound(_) => "NotFoundError",
            ApiError::Validation(_) => "ValidationError",
            ApiError::Forbidden(_) => "ForbiddenError",
            ApiError::Authorization(_) => "AuthorizationError",
            ApiError::Generic { error_type, .. } => error_type,
        }
    }

    pub fn body(&self) -> Vec<ErrorEntry> {
        match self {
            ApiError::NotFound(e) => e.body(),
            ApiError::Validation(e) => e.body(),
            ApiError::Forbidden(e) => e.body(),
            ApiError::Authorization(e) => e.body(),
            ApiError::Generic { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filters(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn not_found_body_lists_each_filter() {
        let e = NotFoundError::new("User", filters(json!({ "id": 7, "email": "a@b.c" })));
        assert_eq!(e.to_string(), "User not found");
        let body = e.body();
        assert_eq!(body.len(), 2);
        assert_eq!(body[0].code, "User.id.notFound.error");
        assert_eq!(body[0].field.as_deref(), Some("id"));
        assert_eq!(body[0].value, Some(json!(7)));
        assert_eq!(body[1].code, "User.email.notFound.error");
    }

    #[test]
    fn not_found_filter_may_carry_its_own_code() {
        let e = NotFoundError::new("User", filters(json!({ "token": { "code": "expired", "value": "abc" } })));
        let body = e.body();
        assert_eq!(body[0].code, "User.token.expired.error");
        assert_eq!(body[0].value, Some(json!("abc")));
    }

    #[test]
    fn validation_body_formats_codes() {
        let mut e = ValidationError::empty("User");
        assert!(!e.has_errors());
        e.add_error("email", "notNull", vec![]);
        e.add_error("username", "maxLength", vec![json!(100)]);
        let body = e.body();
        assert_eq!(body.len(), 2);
        assert_eq!(body[0].code, "User.email.notNull.error");
        assert_eq!(body[0].value, None);
        assert_eq!(body[1].code, "User.username.maxLength.error");
        assert_eq!(body[1].value, Some(json!(100)));
    }

    #[test]
    fn validation_body_omits_value_when_args_empty() {
        let e = ValidationError::new("User", vec![FieldError::new("email", "notNull", vec![])]);
        let rendered = serde_json::to_value(e.body()).unwrap();
        assert_eq!(rendered, json!([{ "code": "User.email.notNull.error", "field": "email" }]));
    }

    #[test]
    fn validation_from_raw_coerces_and_ignores_non_lists() {
        let e = ValidationError::from_raw("User", &json!([{ "field": "email", "code": "unique" }, {}]));
        assert_eq!(e.errors().len(), 2);
        assert_eq!(e.errors()[1].field, None);
        assert!(!ValidationError::from_raw("User", &Value::Null).has_errors());
        assert!(!ValidationError::from_raw("User", &json!({ "field": "x" })).has_errors());
    }

    #[test]
    fn merge_appends_in_order() {
        let mut a = ValidationError::new("User", vec![FieldError::new("a", "x", vec![])]);
        let b = ValidationError::new("Other", vec![FieldError::new("b", "y", vec![])]);
        a.merge(b);
        let fields: Vec<_> = a.errors().iter().map(|e| e.field_name().to_string()).collect();
        assert_eq!(fields, vec!["a", "b"]);
        assert_eq!(a.body()[1].code, "User.b.y.error");
    }

    #[test]
    fn check_passes_value_through_when_clean() {
        assert_eq!(ValidationError::empty("User").check(5).unwrap(), 5);
        let mut dirty = ValidationError::empty("User");
        dirty.add_error("email", "format", vec![]);
        assert!(dirty.check(5).is_err());
    }

    #[test]
    fn recover_only_catches_not_found() {
        let missing: Result<i32, AppError> = Err(NotFoundError::new("User", Map::new()).into());
        assert_eq!(NotFoundError::recover(missing, |_| 0).unwrap(), 0);

        let invalid: Result<i32, AppError> = Err(ValidationError::empty("User").into());
        assert!(NotFoundError::recover(invalid, |_| 0).is_err());

        assert_eq!(NotFoundError::recover(Ok(3), |_| 0).unwrap(), 3);
    }

    #[test]
    fn token_errors_have_fixed_bodies() {
        let f = ApiError::from(ForbiddenError::new(None, vec![json!("admin")]));
        assert_eq!(f.error_type(), "ForbiddenError");
        assert_eq!(f.body()[0].code, "authorization.token.invalid.error");
        assert_eq!(f.body()[0].value, Some(json!(["admin"])));

        let a = ApiError::from(AuthorizationError::new(Some("no token".into()), vec![]));
        assert_eq!(a.to_string(), "no token");
        assert_eq!(a.body()[0].code, "authorization.token.missing.error");
        assert_eq!(a.body()[0].field.as_deref(), Some("token"));
    }

    #[test]
    fn generic_errors_render_no_entries() {
        let e = ApiError::bad_request("body must be a JSON object");
        assert_eq!(e.error_type(), "BadRequestError");
        assert!(e.body().is_empty());
    }
}
