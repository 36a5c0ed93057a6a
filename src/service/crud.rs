//! Generic CRUD service: the query filter builder composed with a persistence provider and a
//! validation pipeline. Every operation is a default trait method, so a service overrides only
//! what it needs (typically `validate` or `create`).

use crate::error::{AppError, NotFoundError, ProviderError, ValidationError};
use crate::filter::{FilterBuilder, QueryDescriptor, QueryParams, UnknownKeys, RESERVED_KEYS};
use crate::model::{EntityInstance, EntityModel, ModelRegistry};
use crate::provider::{with_transaction, Page, PersistenceProvider};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

/// Primary-key lookup value: one scalar used for every key field, or a keyed object
/// (required for composite keys).
#[derive(Clone, Debug, PartialEq)]
pub enum RecordId {
    Scalar(Value),
    Keyed(Map<String, Value>),
}

impl RecordId {
    /// Where-map holding exactly the model's primary-key fields.
    pub fn key_map(&self, model: &EntityModel) -> Map<String, Value> {
        model
            .primary_keys()
            .into_iter()
            .map(|k| {
                let v = match self {
                    RecordId::Scalar(v) => v.clone(),
                    RecordId::Keyed(m) => m.get(k).cloned().unwrap_or(Value::Null),
                };
                (k.to_string(), v)
            })
            .collect()
    }
}

impl From<Value> for RecordId {
    fn from(v: Value) -> Self {
        match v {
            Value::Object(m) => RecordId::Keyed(m),
            other => RecordId::Scalar(other),
        }
    }
}

impl From<Map<String, Value>> for RecordId {
    fn from(m: Map<String, Value>) -> Self {
        RecordId::Keyed(m)
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Scalar(Value::from(id))
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId::Scalar(Value::from(id))
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        RecordId::Scalar(Value::String(id))
    }
}

/// What a service is bound to: one model and the provider that stores it.
#[derive(Clone)]
pub struct ServiceContext {
    model: Arc<EntityModel>,
    provider: Arc<dyn PersistenceProvider>,
    unknown_keys: UnknownKeys,
}

impl ServiceContext {
    pub fn new(provider: Arc<dyn PersistenceProvider>, model_name: &str) -> Result<Self, ProviderError> {
        let model = provider.registry().require(model_name)?.clone();
        Ok(ServiceContext {
            model,
            provider,
            unknown_keys: UnknownKeys::default(),
        })
    }

    /// Reject filter keys that are neither fields, associations nor operators.
    pub fn strict(mut self) -> Self {
        self.unknown_keys = UnknownKeys::Reject;
        self
    }

    pub fn model(&self) -> &EntityModel {
        &self.model
    }

    pub fn provider(&self) -> &Arc<dyn PersistenceProvider> {
        &self.provider
    }

    pub fn registry(&self) -> &ModelRegistry {
        self.provider.registry()
    }

    /// Same model, different provider (e.g. one bound to a transaction).
    pub fn with_provider(&self, provider: Arc<dyn PersistenceProvider>) -> Self {
        ServiceContext {
            model: self.model.clone(),
            provider,
            unknown_keys: self.unknown_keys,
        }
    }

    /// Run `work` with a context bound to one provider transaction when `transactional`,
    /// otherwise with this context's provider.
    pub async fn transaction<T, F, Fut>(&self, transactional: bool, work: F) -> Result<T, AppError>
    where
        F: FnOnce(ServiceContext) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        with_transaction(self.provider.clone(), transactional, |provider| {
            work(self.with_provider(provider))
        })
        .await
    }
}

#[async_trait]
pub trait Crud: Send + Sync {
    fn context(&self) -> &ServiceContext;

    /// Query descriptor for `params`, pagination included.
    fn filter(&self, params: Option<&QueryParams>) -> Result<QueryDescriptor, AppError> {
        let ctx = self.context();
        let query = FilterBuilder::new(ctx.registry())
            .unknown_keys(ctx.unknown_keys)
            .build(params, ctx.model())?;
        tracing::debug!(model = %ctx.model().name, query = ?query, "filter");
        Ok(query)
    }

    async fn list(&self, params: &QueryParams) -> Result<Vec<EntityInstance>, AppError> {
        let query = self.filter(Some(params))?;
        let ctx = self.context();
        Ok(ctx.provider().find_all(ctx.model(), &query).await?)
    }

    async fn list_and_count(&self, params: &QueryParams) -> Result<Page, AppError> {
        let query = self.filter(Some(params))?;
        let ctx = self.context();
        Ok(ctx.provider().find_and_count_all(ctx.model(), &query).await?)
    }

    /// Lookup strictly by primary key.
    async fn read(&self, id: &RecordId) -> Result<EntityInstance, AppError> {
        let ctx = self.context();
        let key = id.key_map(ctx.model());
        let query = QueryDescriptor::with_where(key.clone());
        match ctx.provider().find_one(ctx.model(), &query).await? {
            Some(instance) => Ok(instance),
            None => Err(NotFoundError::new(ctx.model().name.clone(), key).into()),
        }
    }

    /// First instance matching `params`.
    async fn find(&self, params: &QueryParams) -> Result<EntityInstance, AppError> {
        let query = self.filter(Some(params))?;
        let ctx = self.context();
        match ctx.provider().find_one(ctx.model(), &query).await? {
            Some(instance) => Ok(instance),
            None => {
                let filters = params
                    .iter()
                    .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Err(NotFoundError::new(ctx.model().name.clone(), filters).into())
            }
        }
    }

    /// Unsaved instance; nothing is persisted.
    fn create(&self, fields: QueryParams) -> EntityInstance {
        let ctx = self.context();
        ctx.provider().build(ctx.model(), fields)
    }

    /// Custom validation hook. Receives the schema-level failures and returns the full set.
    async fn validate(
        &self,
        _instance: &EntityInstance,
        errors: ValidationError,
    ) -> Result<ValidationError, AppError> {
        Ok(errors)
    }

    /// Schema validation, then the `validate` hook; fails with every collected field error at once.
    async fn validate_instance(&self, instance: &EntityInstance) -> Result<(), AppError> {
        let ctx = self.context();
        let mut errors = ValidationError::empty(ctx.model().name.clone());
        match ctx.provider().validate(ctx.model(), instance).await {
            Ok(()) => {}
            Err(ProviderError::Validation { errors: failures, .. }) => {
                for failure in failures {
                    errors.add_field_error(failure);
                }
            }
            Err(other) => return Err(other.into()),
        }
        let errors = self.validate(instance, errors).await?;
        Ok(errors.check(())?)
    }

    /// create, validate, persist.
    async fn save(&self, fields: QueryParams) -> Result<EntityInstance, AppError> {
        let instance = self.create(fields);
        self.validate_instance(&instance).await?;
        let ctx = self.context();
        Ok(ctx.provider().save(ctx.model(), instance).await?)
    }

    /// Read and apply `fields` in memory; not persisted.
    async fn edit(&self, id: &RecordId, fields: QueryParams) -> Result<EntityInstance, AppError> {
        let mut instance = self.read(id).await?;
        instance.set(fields);
        Ok(instance)
    }

    /// edit, validate, persist.
    async fn update(&self, id: &RecordId, fields: QueryParams) -> Result<EntityInstance, AppError> {
        let instance = self.edit(id, fields).await?;
        self.validate_instance(&instance).await?;
        let ctx = self.context();
        Ok(ctx.provider().save(ctx.model(), instance).await?)
    }

    async fn delete(&self, id: &RecordId) -> Result<EntityInstance, AppError> {
        let instance = self.read(id).await?;
        let ctx = self.context();
        Ok(ctx.provider().destroy(ctx.model(), instance).await?)
    }
}

/// Default service: every operation as provided by `Crud`.
#[derive(Clone)]
pub struct CrudService {
    ctx: ServiceContext,
}

impl CrudService {
    pub fn new(provider: Arc<dyn PersistenceProvider>, model_name: &str) -> Result<Self, ProviderError> {
        Ok(CrudService {
            ctx: ServiceContext::new(provider, model_name)?,
        })
    }

    pub fn from_context(ctx: ServiceContext) -> Self {
        CrudService { ctx }
    }

    /// Run `work` with a copy of this service bound to one transaction (see `ServiceContext::transaction`).
    pub async fn transaction<T, F, Fut>(&self, transactional: bool, work: F) -> Result<T, AppError>
    where
        F: FnOnce(CrudService) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        self.ctx
            .transaction(transactional, |ctx| work(CrudService::from_context(ctx)))
            .await
    }
}

impl Crud for CrudService {
    fn context(&self) -> &ServiceContext {
        &self.ctx
    }
}
