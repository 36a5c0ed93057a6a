//! PostgreSQL provider: compiles query descriptors with `crate::sql` and runs them on a pool
//! or inside one open transaction.

use super::{Page, PersistenceProvider, ProviderResult, ProviderTransaction};
use crate::error::ProviderError;
use crate::filter::QueryDescriptor;
use crate::model::{EntityInstance, EntityModel, InstanceState, ModelRegistry};
use crate::sql::{self, bind_all, QueryBuf};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Postgres, Row, Transaction, TypeInfo};
use std::sync::Arc;
use tokio::sync::Mutex;

type SharedTx = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

enum PgExecutor {
    Pool(PgPool),
    Tx(SharedTx),
}

pub struct PgProvider {
    registry: Arc<ModelRegistry>,
    exec: PgExecutor,
}

impl PgProvider {
    pub fn new(pool: PgPool, registry: Arc<ModelRegistry>) -> Self {
        PgProvider {
            registry,
            exec: PgExecutor::Pool(pool),
        }
    }

    pub async fn connect(url: &str, max_connections: u32, registry: Arc<ModelRegistry>) -> ProviderResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool, registry))
    }

    /// Pool behind this provider; `None` inside a transaction.
    pub fn pool(&self) -> Option<&PgPool> {
        match &self.exec {
            PgExecutor::Pool(pool) => Some(pool),
            PgExecutor::Tx(_) => None,
        }
    }

    async fn fetch_all(&self, q: &QueryBuf) -> ProviderResult<Vec<PgRow>> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let query = bind_all(&q.sql, &q.params);
        match &self.exec {
            PgExecutor::Pool(pool) => Ok(query.fetch_all(pool).await?),
            PgExecutor::Tx(tx) => {
                let mut guard = tx.lock().await;
                let conn = guard.as_mut().ok_or_else(finished)?;
                Ok(query.fetch_all(&mut **conn).await?)
            }
        }
    }

    async fn fetch_optional(&self, q: &QueryBuf) -> ProviderResult<Option<PgRow>> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let query = bind_all(&q.sql, &q.params);
        match &self.exec {
            PgExecutor::Pool(pool) => Ok(query.fetch_optional(pool).await?),
            PgExecutor::Tx(tx) => {
                let mut guard = tx.lock().await;
                let conn = guard.as_mut().ok_or_else(finished)?;
                Ok(query.fetch_optional(&mut **conn).await?)
            }
        }
    }

    async fn write_one(&self, model: &EntityModel, q: &QueryBuf) -> ProviderResult<Option<Map<String, Value>>> {
        match self.fetch_optional(q).await {
            Ok(row) => Ok(row.as_ref().map(row_to_map)),
            Err(ProviderError::Db(e)) => Err(constraint_error(model, e)),
            Err(e) => Err(e),
        }
    }

    fn instances(model: &EntityModel, rows: &[PgRow]) -> Vec<EntityInstance> {
        rows.iter()
            .map(|r| EntityInstance::persisted(&model.name, row_to_map(r)))
            .collect()
    }
}

fn finished() -> ProviderError {
    ProviderError::Transaction("transaction already finished".into())
}

/// Unique and primary-key violations become `Constraint`; anything else stays a database error.
fn constraint_error(model: &EntityModel, e: sqlx::Error) -> ProviderError {
    let field = e
        .as_database_error()
        .filter(|d| d.is_unique_violation())
        .map(|d| d.constraint().unwrap_or("unique").to_string());
    match field {
        Some(field) => ProviderError::Constraint {
            model: model.name.clone(),
            field,
        },
        None => ProviderError::Db(e),
    }
}

#[async_trait]
impl PersistenceProvider for PgProvider {
    fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    async fn find_all(&self, model: &EntityModel, query: &QueryDescriptor) -> ProviderResult<Vec<EntityInstance>> {
        let q = sql::select(&self.registry, model, query)?;
        let rows = self.fetch_all(&q).await?;
        Ok(Self::instances(model, &rows))
    }

    async fn find_and_count_all(&self, model: &EntityModel, query: &QueryDescriptor) -> ProviderResult<Page> {
        let counted = sql::count(&self.registry, model, query)?;
        let count = match self.fetch_optional(&counted).await? {
            Some(row) => row.try_get::<i64, _>("count")?.max(0) as u64,
            None => 0,
        };
        let rows = self.find_all(model, query).await?;
        Ok(Page { count, rows })
    }

    async fn find_one(&self, model: &EntityModel, query: &QueryDescriptor) -> ProviderResult<Option<EntityInstance>> {
        let mut query = query.clone();
        query.limit = Some(1);
        let q = sql::select(&self.registry, model, &query)?;
        let row = self.fetch_optional(&q).await?;
        Ok(row.map(|r| EntityInstance::persisted(&model.name, row_to_map(&r))))
    }

    async fn save(&self, model: &EntityModel, mut instance: EntityInstance) -> ProviderResult<EntityInstance> {
        let q = match instance.state() {
            InstanceState::Destroyed => {
                return Err(ProviderError::InvalidState {
                    model: model.name.clone(),
                    state: InstanceState::Destroyed.as_str(),
                })
            }
            InstanceState::Built => sql::insert(model, instance.values())?,
            InstanceState::Persisted => {
                let changes: Map<String, Value> = instance
                    .changed()
                    .filter_map(|k| instance.get(k).map(|v| (k.to_string(), v.clone())))
                    .collect();
                sql::update(model, &instance.primary_key(model), &changes)?
            }
        };
        let row = self.write_one(model, &q).await?.ok_or_else(|| ProviderError::InvalidState {
            model: model.name.clone(),
            state: "stale",
        })?;
        instance.mark_persisted(row);
        Ok(instance)
    }

    async fn destroy(&self, model: &EntityModel, mut instance: EntityInstance) -> ProviderResult<EntityInstance> {
        let q = sql::delete(model, &instance.primary_key(model))?;
        self.fetch_optional(&q).await?;
        instance.mark_destroyed();
        Ok(instance)
    }

    async fn begin(&self) -> ProviderResult<Box<dyn ProviderTransaction>> {
        let PgExecutor::Pool(pool) = &self.exec else {
            return Err(ProviderError::Transaction("nested transactions are not supported".into()));
        };
        let tx: SharedTx = Arc::new(Mutex::new(Some(pool.begin().await?)));
        let scoped = Arc::new(PgProvider {
            registry: self.registry.clone(),
            exec: PgExecutor::Tx(tx.clone()),
        });
        Ok(Box::new(PgTransaction { tx, scoped }))
    }

    async fn close(&self) {
        if let PgExecutor::Pool(pool) = &self.exec {
            pool.close().await;
        }
    }
}

struct PgTransaction {
    tx: SharedTx,
    scoped: Arc<PgProvider>,
}

#[async_trait]
impl ProviderTransaction for PgTransaction {
    fn provider(&self) -> Arc<dyn PersistenceProvider> {
        self.scoped.clone()
    }

    async fn commit(self: Box<Self>) -> ProviderResult<()> {
        let tx = self.tx.lock().await.take().ok_or_else(finished)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> ProviderResult<()> {
        let tx = self.tx.lock().await.take().ok_or_else(finished)?;
        tx.rollback().await?;
        Ok(())
    }
}

fn row_to_map(row: &PgRow) -> Map<String, Value> {
    row.columns()
        .iter()
        .map(|col| {
            let name = col.name();
            let value = cell_to_value(row, name, col.type_info().name());
            (name.to_string(), value)
        })
        .collect()
}

/// Decode one cell by its PostgreSQL type; unreadable cells become `null`.
fn cell_to_value(row: &PgRow, name: &str, pg_type: &str) -> Value {
    let decoded = match pg_type {
        "INT2" => row.try_get::<Option<i16>, _>(name).map(|v| v.map(Value::from)),
        "INT4" => row.try_get::<Option<i32>, _>(name).map(|v| v.map(Value::from)),
        "INT8" => row.try_get::<Option<i64>, _>(name).map(|v| v.map(Value::from)),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(name)
            .map(|v| v.and_then(|n| serde_json::Number::from_f64(n as f64)).map(Value::Number)),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(name)
            .map(|v| v.and_then(serde_json::Number::from_f64).map(Value::Number)),
        "BOOL" => row.try_get::<Option<bool>, _>(name).map(|v| v.map(Value::Bool)),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(name)
            .map(|v| v.map(|u| Value::String(u.to_string()))),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)
            .map(|v| v.map(|d| Value::String(d.to_rfc3339()))),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(name)
            .map(|v| v.map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(name)
            .map(|v| v.map(|d| Value::String(d.format("%Y-%m-%d").to_string()))),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(name),
        _ => row.try_get::<Option<String>, _>(name).map(|v| v.map(Value::String)),
    };
    match decoded {
        Ok(value) => value.unwrap_or(Value::Null),
        Err(e) => {
            tracing::warn!(column = %name, pg_type = %pg_type, error = %e, "undecodable column");
            Value::Null
        }
    }
}
