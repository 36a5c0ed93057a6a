//! Demo server: `/status` and the `/user` CRUD API under the configured prefix.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Without `DATABASE_URL` the data lives in memory; set `DATABASE_SYNC=true` to create tables.

use rest_scaffold::{connect_provider, serve, telemetry, user_model, AppConfig, AppState, ModelRegistry};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    telemetry::init(&config.log_filter);

    let registry = Arc::new(ModelRegistry::new(vec![user_model()])?);
    let provider = connect_provider(&config, registry).await?;
    tracing::info!(port = config.port, prefix = %config.api_prefix, "starting");
    serve(&config, AppState::new(provider)).await?;
    Ok(())
}
