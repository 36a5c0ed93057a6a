//! Relational model layer: entity schemas, the association registry, live instances
//! and schema-level validation.

mod instance;
mod registry;
mod schema;
mod validate;

pub use instance::{EntityInstance, InstanceState};
pub use registry::ModelRegistry;
pub use schema::{Association, Cardinality, EntityModel, FieldDef, FieldKind, FieldRules, Through};
pub use validate::validate_instance;
