//! Persistence provider capability set consumed by the CRUD layer.

mod memory;
mod postgres;

pub use memory::MemoryProvider;
pub use postgres::PgProvider;

use crate::error::{AppError, ProviderError};
use crate::filter::{QueryDescriptor, QueryParams};
use crate::model::{validate_instance, EntityInstance, EntityModel, ModelRegistry};
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Rows of one page plus the total number of matching rows.
#[derive(Clone, Debug, Serialize)]
pub struct Page {
    pub count: u64,
    pub rows: Vec<EntityInstance>,
}

#[async_trait]
pub trait PersistenceProvider: Send + Sync {
    /// Models this provider stores. Association metadata is resolved here.
    fn registry(&self) -> &Arc<ModelRegistry>;

    async fn find_all(
        &self,
        model: &EntityModel,
        query: &QueryDescriptor,
    ) -> ProviderResult<Vec<EntityInstance>>;

    async fn find_and_count_all(
        &self,
        model: &EntityModel,
        query: &QueryDescriptor,
    ) -> ProviderResult<Page>;

    async fn find_one(
        &self,
        model: &EntityModel,
        query: &QueryDescriptor,
    ) -> ProviderResult<Option<EntityInstance>>;

    /// Unsaved instance; no I/O.
    fn build(&self, model: &EntityModel, fields: QueryParams) -> EntityInstance {
        EntityInstance::built(&model.name, fields)
    }

    /// Schema-level validation. Fails with `ProviderError::Validation` listing every field failure.
    async fn validate(&self, model: &EntityModel, instance: &EntityInstance) -> ProviderResult<()> {
        let errors = validate_instance(model, instance);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::Validation {
                model: model.name.clone(),
                errors,
            })
        }
    }

    /// Insert a built instance or write the changed fields of a persisted one.
    async fn save(&self, model: &EntityModel, instance: EntityInstance)
        -> ProviderResult<EntityInstance>;

    async fn destroy(&self, model: &EntityModel, instance: EntityInstance)
        -> ProviderResult<EntityInstance>;

    /// Start a transaction; work done through the returned scope commits or rolls back together.
    async fn begin(&self) -> ProviderResult<Box<dyn ProviderTransaction>>;

    /// Release connections. Called once on shutdown.
    async fn close(&self) {}
}

#[async_trait]
pub trait ProviderTransaction: Send {
    /// Provider bound to this transaction.
    fn provider(&self) -> Arc<dyn PersistenceProvider>;

    async fn commit(self: Box<Self>) -> ProviderResult<()>;

    async fn rollback(self: Box<Self>) -> ProviderResult<()>;
}

/// Run `work` inside one provider transaction when `transactional`, otherwise directly
/// against `provider`. The transaction commits on `Ok` and rolls back on `Err`.
pub async fn with_transaction<T, F, Fut>(
    provider: Arc<dyn PersistenceProvider>,
    transactional: bool,
    work: F,
) -> Result<T, AppError>
where
    F: FnOnce(Arc<dyn PersistenceProvider>) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    if !transactional {
        return work(provider).await;
    }
    let tx = provider.begin().await?;
    match work(tx.provider()).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
