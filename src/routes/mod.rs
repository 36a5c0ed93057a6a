//! Application router: controllers under the API prefix, not-found fallback, body limit and
//! request tracing.

use crate::config::AppConfig;
use crate::handlers;
use crate::http::{not_found, DispatchOptions, Routes};
use crate::state::AppState;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub fn app(state: AppState, config: &AppConfig) -> Router {
    app_with_options(state, config, DispatchOptions::default())
}

/// Same as [`app`] with custom success statuses or a body templater.
pub fn app_with_options(state: AppState, config: &AppConfig, options: DispatchOptions) -> Router {
    let api = handlers::routes(Routes::new(options)).into_router();
    let router = if config.api_prefix.is_empty() {
        api
    } else {
        Router::new().nest(&config.api_prefix, api)
    };
    router
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(config.body_limit)),
        )
        .with_state(state)
}
