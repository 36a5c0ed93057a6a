//! Logging setup and error logging.

use crate::error::AppError;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over `default_filter`.
/// Safe to call more than once; later calls are ignored.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Log a failure: taxonomy errors with message and body, anything else with its display text.
pub fn log_error(err: &AppError) {
    match err.as_api() {
        Some(api) => {
            let body = serde_json::to_string(&api.body()).unwrap_or_default();
            tracing::error!(error_type = %api.error_type(), errors = %body, "{}", api);
        }
        None => tracing::error!(error = ?err, "{}", err),
    }
}
