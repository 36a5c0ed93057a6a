//! Process wiring: pick the persistence provider and run the HTTP server until ctrl-c.

use crate::config::AppConfig;
use crate::error::AppError;
use crate::migration;
use crate::model::ModelRegistry;
use crate::provider::{MemoryProvider, PersistenceProvider, PgProvider};
use crate::routes;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Postgres when `database_url` is set (creating missing tables if `sync_schema`),
/// the in-memory store otherwise.
pub async fn connect_provider(
    config: &AppConfig,
    registry: Arc<ModelRegistry>,
) -> Result<Arc<dyn PersistenceProvider>, AppError> {
    match &config.database_url {
        Some(url) => {
            let provider = PgProvider::connect(url, config.max_connections, registry.clone()).await?;
            if config.sync_schema {
                if let Some(pool) = provider.pool() {
                    migration::sync(pool, &registry).await?;
                }
            }
            tracing::info!(max_connections = config.max_connections, "connected to postgres");
            Ok(Arc::new(provider))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store");
            Ok(Arc::new(MemoryProvider::new(registry)))
        }
    }
}

/// Serve the API on `0.0.0.0:<port>`. Closes the provider after a graceful shutdown.
pub async fn serve(config: &AppConfig, state: AppState) -> Result<(), AppError> {
    let provider = state.provider.clone();
    let app = routes::app(state, config);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{}{}", listener.local_addr()?, config.api_prefix);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    provider.close().await;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
