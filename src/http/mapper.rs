//! Error-to-HTTP mapping: status by error type, `{message, errors}` body, and the
//! not-found handler for unmatched routes.

use crate::error::{AppError, NotFoundError};
use crate::http::dispatch::{Reply, ResponseSlot};
use crate::telemetry;
use axum::extract::OriginalUri;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Map, Value};

const INTERNAL_MESSAGE: &str = "Internal Server Error";

/// 404 for not-found, 412 for validation, 400 for any other taxonomy error, 500 otherwise.
pub fn status_for(err: &AppError) -> StatusCode {
    match err.as_api().map(|api| api.error_type()) {
        Some("NotFoundError") => StatusCode::NOT_FOUND,
        Some("ValidationError") => StatusCode::PRECONDITION_FAILED,
        Some(_) => StatusCode::BAD_REQUEST,
        None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn render(err: &AppError) -> Value {
    match err.as_api() {
        Some(api) => json!({ "message": api.to_string(), "errors": api.body() }),
        None => {
            let message = err.to_string();
            let message = if message.is_empty() { INTERNAL_MESSAGE.to_string() } else { message };
            json!({ "message": message, "errors": [] })
        }
    }
}

/// Log `err`, then respond through `slot` unless a response was already sent.
/// Returns whether this call produced the response.
pub fn handle_error(err: &AppError, slot: &ResponseSlot) -> bool {
    telemetry::log_error(err);
    if slot.is_sent() {
        return false;
    }
    slot.send(Reply::new(status_for(err), Some(render(err))))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let slot = ResponseSlot::default();
        handle_error(&self, &slot);
        match slot.take() {
            Some(reply) => reply.into_response(),
            None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// Fallback for unmatched routes: not-found on object `path` with the requested url.
pub async fn not_found(OriginalUri(uri): OriginalUri) -> Response {
    let mut filters = Map::new();
    filters.insert("url".to_string(), Value::String(uri.to_string()));
    AppError::from(NotFoundError::new("path", filters)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, FieldError, ForbiddenError, ValidationError};
    use crate::error::ProviderError;

    #[test]
    fn statuses_follow_error_type() {
        let not_found = AppError::from(NotFoundError::new("User", Map::new()));
        assert_eq!(status_for(&not_found), StatusCode::NOT_FOUND);
        let invalid = AppError::from(ValidationError::empty("User"));
        assert_eq!(status_for(&invalid), StatusCode::PRECONDITION_FAILED);
        let forbidden = AppError::from(ForbiddenError::new(None, vec![]));
        assert_eq!(status_for(&forbidden), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&AppError::from(ApiError::bad_request("x"))), StatusCode::BAD_REQUEST);
        let db = AppError::from(ProviderError::Poisoned);
        assert_eq!(status_for(&db), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn renders_message_and_errors() {
        let err = AppError::from(ValidationError::new(
            "User",
            vec![FieldError::new("email", "notNull", vec![])],
        ));
        assert_eq!(
            render(&err),
            json!({
                "message": "Validation error with \"User\"",
                "errors": [{ "code": "User.email.notNull.error", "field": "email" }]
            })
        );

        let internal = AppError::Internal(String::new());
        assert_eq!(render(&internal), json!({ "message": "Internal Server Error", "errors": [] }));
    }

    #[test]
    fn second_mapping_is_a_no_op() {
        let slot = ResponseSlot::default();
        let err = AppError::from(NotFoundError::new("User", Map::new()));
        assert!(handle_error(&err, &slot));
        assert!(!handle_error(&err, &slot));
        let reply = slot.take().unwrap();
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert!(slot.take().is_none());
        assert!(!handle_error(&AppError::Internal("late".into()), &slot));
    }
}
