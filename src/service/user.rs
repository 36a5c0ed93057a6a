//! Example user service: default CRUD with the password encoded on `create`.

use crate::error::ProviderError;
use crate::filter::QueryParams;
use crate::model::{EntityInstance, EntityModel, FieldDef, FieldKind};
use crate::provider::PersistenceProvider;
use crate::service::{Crud, ServiceContext};
use serde_json::Value;
use std::sync::Arc;

pub const USER_MODEL: &str = "User";

pub fn user_model() -> EntityModel {
    EntityModel::new(USER_MODEL, "user")
        .field(FieldDef::new("id", FieldKind::Integer).primary_key().auto_increment())
        .field(
            FieldDef::new("email", FieldKind::String)
                .max_length(100)
                .not_null()
                .unique()
                .format("email"),
        )
        .field(
            FieldDef::new("username", FieldKind::String)
                .max_length(100)
                .not_null()
                .unique(),
        )
        .field(FieldDef::new("password", FieldKind::String).max_length(100))
}

// TODO: hash with a password KDF (argon2) before storing; values are kept as given for now.
fn encode_password(raw: &str) -> String {
    raw.to_string()
}

#[derive(Clone)]
pub struct UserService {
    ctx: ServiceContext,
}

impl UserService {
    pub fn new(provider: Arc<dyn PersistenceProvider>) -> Result<Self, ProviderError> {
        Ok(UserService {
            ctx: ServiceContext::new(provider, USER_MODEL)?,
        })
    }
}

impl Crud for UserService {
    fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    fn create(&self, mut fields: QueryParams) -> EntityInstance {
        if let Some(Value::String(raw)) = fields.get("password") {
            let encoded = encode_password(raw);
            fields.insert("password".to_string(), Value::String(encoded));
        }
        self.ctx.provider().build(self.ctx.model(), fields)
    }
}
