//! Schema-level validation of an instance against its model's field definitions.
//! Every failing rule is collected; nothing short-circuits.

use crate::error::FieldError;
use crate::model::{EntityInstance, EntityModel, FieldDef, FieldKind, FieldRules};
use regex::Regex;
use serde_json::{json, Value};

/// Validate all model fields of `instance`. Unknown keys are ignored.
pub fn validate_instance(model: &EntityModel, instance: &EntityInstance) -> Vec<FieldError> {
    let mut errors = Vec::new();
    for field in &model.fields {
        let value = instance.get(&field.name).filter(|v| !v.is_null());
        match value {
            None => {
                if !field.nullable && !field.store_supplied() {
                    errors.push(FieldError::new(&field.name, "notNull", vec![]));
                }
            }
            Some(v) => validate_field(field, v, &mut errors),
        }
    }
    errors
}

fn validate_field(field: &FieldDef, v: &Value, errors: &mut Vec<FieldError>) {
    if !kind_matches(field.kind, v) {
        errors.push(FieldError::new(
            &field.name,
            "type",
            vec![serde_json::to_value(field.kind).unwrap_or(Value::Null)],
        ));
        return;
    }
    check_rules(&field.name, v, &field.rules, errors);
}

fn kind_matches(kind: FieldKind, v: &Value) -> bool {
    match kind {
        FieldKind::Integer | FieldKind::BigInt => match v {
            Value::Number(n) => n.is_i64() || n.is_u64(),
            Value::String(s) => s.trim().parse::<i64>().is_ok(),
            _ => false,
        },
        FieldKind::Float | FieldKind::Decimal => match v {
            Value::Number(_) => true,
            Value::String(s) => s.trim().parse::<f64>().is_ok(),
            _ => false,
        },
        FieldKind::Boolean => match v {
            Value::Bool(_) => true,
            Value::String(s) => matches!(s.as_str(), "true" | "false"),
            _ => false,
        },
        FieldKind::String | FieldKind::Text => v.is_string(),
        FieldKind::Uuid => v.as_str().map(|s| uuid::Uuid::parse_str(s).is_ok()).unwrap_or(false),
        FieldKind::Timestamp => v
            .as_str()
            .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
            .unwrap_or(false),
        FieldKind::Date => v
            .as_str()
            .map(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok())
            .unwrap_or(false),
        FieldKind::Json => true,
    }
}

fn check_rules(col: &str, v: &Value, rule: &FieldRules, errors: &mut Vec<FieldError>) {
    if let Some(format) = &rule.format {
        if let Some(s) = v.as_str() {
            if !format_matches(format, s) {
                errors.push(FieldError::new(col, "format", vec![json!(format)]));
            }
        }
    }
    if let Some(max) = rule.max_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() > max as usize {
                errors.push(FieldError::new(col, "maxLength", vec![json!(max)]));
            }
        }
    }
    if let Some(min) = rule.min_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() < min as usize {
                errors.push(FieldError::new(col, "minLength", vec![json!(min)]));
            }
        }
    }
    if let Some(ref pattern) = rule.pattern {
        if let Some(s) = v.as_str() {
            let matched = Regex::new(pattern).map(|re| re.is_match(s)).unwrap_or(false);
            if !matched {
                errors.push(FieldError::new(col, "pattern", vec![json!(pattern)]));
            }
        }
    }
    if let Some(ref allowed) = rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            errors.push(FieldError::new(col, "allowed", vec![Value::Array(allowed.clone())]));
        }
    }
    if let Some(min) = rule.minimum {
        if let Some(n) = as_f64(v) {
            if n < min {
                errors.push(FieldError::new(col, "minimum", vec![json!(min)]));
            }
        }
    }
    if let Some(max) = rule.maximum {
        if let Some(n) = as_f64(v) {
            if n > max {
                errors.push(FieldError::new(col, "maximum", vec![json!(max)]));
            }
        }
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn format_matches(format: &str, s: &str) -> bool {
    match format.to_lowercase().as_str() {
        "email" => {
            let mut parts = s.splitn(2, '@');
            let local = parts.next().unwrap_or_default();
            let domain = parts.next().unwrap_or_default();
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        "uuid" => uuid::Uuid::parse_str(s).is_ok(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn model() -> EntityModel {
        EntityModel::new("User", "user")
            .field(FieldDef::new("id", FieldKind::Integer).primary_key().auto_increment())
            .field(FieldDef::new("email", FieldKind::String).not_null().format("email").max_length(100))
            .field(FieldDef::new("username", FieldKind::String).not_null().min_length(3))
            .field(FieldDef::new("age", FieldKind::Integer).range(Some(0.0), Some(150.0)))
            .field(FieldDef::new("role", FieldKind::String).allowed(vec![json!("admin"), json!("member")]))
    }

    fn instance(v: Value) -> EntityInstance {
        EntityInstance::built("User", v.as_object().cloned().unwrap_or_else(Map::new))
    }

    #[test]
    fn valid_instance_has_no_errors() {
        let i = instance(json!({ "email": "a@b.io", "username": "alice", "age": 30, "role": "admin" }));
        assert!(validate_instance(&model(), &i).is_empty());
    }

    #[test]
    fn auto_increment_key_may_be_missing_but_required_fields_may_not() {
        let errors = validate_instance(&model(), &instance(json!({})));
        let codes: Vec<_> = errors.iter().map(|e| (e.field_name().to_string(), e.code.clone())).collect();
        assert_eq!(
            codes,
            vec![
                ("email".to_string(), "notNull".to_string()),
                ("username".to_string(), "notNull".to_string())
            ]
        );
    }

    #[test]
    fn collects_every_rule_failure() {
        let i = instance(json!({ "email": "nope", "username": "al", "age": 200, "role": "root" }));
        let codes: Vec<_> = validate_instance(&model(), &i).into_iter().map(|e| e.code).collect();
        assert_eq!(codes, vec!["format", "minLength", "maximum", "allowed"]);
    }

    #[test]
    fn wrong_type_skips_value_rules() {
        let i = instance(json!({ "email": 5, "username": "alice" }));
        let errors = validate_instance(&model(), &i);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "type");
        assert_eq!(errors[0].value(), Some(json!("string")));
    }

    #[test]
    fn numeric_strings_pass_integer_fields() {
        let i = instance(json!({ "email": "a@b.io", "username": "alice", "age": "42" }));
        assert!(validate_instance(&model(), &i).is_empty());
    }
}
