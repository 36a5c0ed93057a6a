#![allow(dead_code)]

use async_trait::async_trait;
use rest_scaffold::filter::QueryDescriptor;
use rest_scaffold::model::{Association, EntityInstance, EntityModel, FieldDef, FieldKind, ModelRegistry};
use rest_scaffold::provider::{MemoryProvider, Page, PersistenceProvider, ProviderResult, ProviderTransaction};
use rest_scaffold::user_model;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};

pub fn obj(v: Value) -> Map<String, Value> {
    v.as_object().cloned().expect("object")
}

/// User, a composite-key Membership, and Author/Post.
pub fn registry() -> Arc<ModelRegistry> {
    let membership = EntityModel::new("Membership", "membership")
        .field(FieldDef::new("group_id", FieldKind::Integer).primary_key())
        .field(FieldDef::new("user_id", FieldKind::Integer).primary_key())
        .field(FieldDef::new("role", FieldKind::String));
    let author = EntityModel::new("Author", "author")
        .field(FieldDef::new("id", FieldKind::Integer).primary_key().auto_increment())
        .field(FieldDef::new("name", FieldKind::String).not_null())
        .association(Association::has_many("posts", "Post", "author_id"));
    let post = EntityModel::new("Post", "post")
        .field(FieldDef::new("id", FieldKind::Integer).primary_key().auto_increment())
        .field(FieldDef::new("title", FieldKind::String).not_null())
        .field(FieldDef::new("author_id", FieldKind::Integer))
        .association(Association::belongs_to("author", "Author", "author_id"));
    Arc::new(ModelRegistry::new(vec![user_model(), membership, author, post]).expect("registry"))
}

/// Memory provider that records which operations ran and the last query it received.
pub struct RecordingProvider {
    inner: MemoryProvider,
    calls: Mutex<Vec<&'static str>>,
    last_query: Mutex<Option<QueryDescriptor>>,
}

impl RecordingProvider {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        RecordingProvider {
            inner: MemoryProvider::new(registry),
            calls: Mutex::new(Vec::new()),
            last_query: Mutex::new(None),
        }
    }

    pub fn seed(&self, table: &str, row: Value) {
        self.inner.insert_raw(table, obj(row)).expect("seed");
    }

    pub fn rows(&self, table: &str) -> Vec<Map<String, Value>> {
        self.inner.rows(table).expect("rows")
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn last_query(&self) -> Option<QueryDescriptor> {
        self.last_query.lock().expect("last query").clone()
    }

    fn record(&self, call: &'static str, query: Option<&QueryDescriptor>) {
        self.calls.lock().expect("calls").push(call);
        if let Some(q) = query {
            *self.last_query.lock().expect("last query") = Some(q.clone());
        }
    }
}

#[async_trait]
impl PersistenceProvider for RecordingProvider {
    fn registry(&self) -> &Arc<ModelRegistry> {
        self.inner.registry()
    }

    async fn find_all(&self, model: &EntityModel, query: &QueryDescriptor) -> ProviderResult<Vec<EntityInstance>> {
        self.record("find_all", Some(query));
        self.inner.find_all(model, query).await
    }

    async fn find_and_count_all(&self, model: &EntityModel, query: &QueryDescriptor) -> ProviderResult<Page> {
        self.record("find_and_count_all", Some(query));
        self.inner.find_and_count_all(model, query).await
    }

    async fn find_one(&self, model: &EntityModel, query: &QueryDescriptor) -> ProviderResult<Option<EntityInstance>> {
        self.record("find_one", Some(query));
        self.inner.find_one(model, query).await
    }

    async fn validate(&self, model: &EntityModel, instance: &EntityInstance) -> ProviderResult<()> {
        self.record("validate", None);
        self.inner.validate(model, instance).await
    }

    async fn save(&self, model: &EntityModel, instance: EntityInstance) -> ProviderResult<EntityInstance> {
        self.record("save", None);
        self.inner.save(model, instance).await
    }

    async fn destroy(&self, model: &EntityModel, instance: EntityInstance) -> ProviderResult<EntityInstance> {
        self.record("destroy", None);
        self.inner.destroy(model, instance).await
    }

    async fn begin(&self) -> ProviderResult<Box<dyn ProviderTransaction>> {
        self.record("begin", None);
        self.inner.begin().await
    }
}
