//! Shared application state for all routes. Built once at startup and passed in explicitly.

use crate::model::ModelRegistry;
use crate::provider::PersistenceProvider;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn PersistenceProvider>,
}

impl AppState {
    pub fn new(provider: Arc<dyn PersistenceProvider>) -> Self {
        AppState { provider }
    }

    pub fn registry(&self) -> &ModelRegistry {
        self.provider.registry()
    }
}
