//! Parameter binding. Every value travels as text and the statement casts it to the
//! column type (`$n::integer`), so one bind type covers every field kind.

use serde_json::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;

/// Text form of a JSON value; `None` binds SQL NULL.
pub fn text_param(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => Some(v.to_string()),
    }
}

/// Prepare `sql` with `params` bound in placeholder order.
pub fn bind_all<'q>(sql: &'q str, params: &[Value]) -> Query<'q, Postgres, PgArguments> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, p| query.bind(text_param(p)))
}
