//! REST API scaffold: generic CRUD services over a relational model layer, a structured
//! error taxonomy and a small HTTP adapter.

pub mod config;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod http;
pub mod migration;
pub mod model;
pub mod provider;
pub mod routes;
pub mod server;
pub mod service;
pub mod sql;
pub mod state;
pub mod telemetry;

pub use config::AppConfig;
pub use error::{
    ApiError, AppError, AuthorizationError, ConfigError, FieldError, ForbiddenError, NotFoundError, ProviderError,
    ValidationError,
};
pub use filter::{build_filter, offset_limit, QueryDescriptor, QueryParams};
pub use model::{EntityInstance, EntityModel, FieldDef, FieldKind, ModelRegistry};
pub use provider::{MemoryProvider, Page, PersistenceProvider, PgProvider};
pub use routes::{app, app_with_options};
pub use server::{connect_provider, serve};
pub use service::{user_model, Crud, CrudService, RecordId, ServiceContext, UserService};
pub use state::AppState;
