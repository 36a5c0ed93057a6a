//! Typed errors: the client-facing taxonomy plus provider, schema and config failures.
//! HTTP mapping lives in `http::mapper`.

mod field;
mod taxonomy;

pub use field::FieldError;
pub use taxonomy::{
    ApiError, AuthorizationError, ErrorEntry, ForbiddenError, NotFoundError, ValidationError,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Model registration failures, raised before any request is served.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("duplicate model: {0}")]
    DuplicateModel(String),
    #[error("model {0} declares no primary key")]
    NoPrimaryKey(String),
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate association '{alias}' on {model}")]
    DuplicateAssociation { model: String, alias: String },
}

/// Failures raised by a persistence provider. Never part of the taxonomy: they map to 500.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("validation failed for {model}")]
    Validation { model: String, errors: Vec<FieldError> },
    #[error("constraint violated on {model}.{field}")]
    Constraint { model: String, field: String },
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("unknown field '{field}' on {model}")]
    UnknownField { model: String, field: String },
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("{model} instance is {state}")]
    InvalidState { model: String, state: &'static str },
    #[error("transaction: {0}")]
    Transaction(String),
    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// The taxonomy error, if this failure is a controlled one.
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            AppError::Api(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::Api(ApiError::NotFound(_)))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Api(ApiError::Validation(_)))
    }
}

impl From<NotFoundError> for AppError {
    fn from(e: NotFoundError) -> Self {
        AppError::Api(ApiError::NotFound(e))
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Api(ApiError::Validation(e))
    }
}

impl From<ForbiddenError> for AppError {
    fn from(e: ForbiddenError) -> Self {
        AppError::Api(ApiError::Forbidden(e))
    }
}

impl From<AuthorizationError> for AppError {
    fn from(e: AuthorizationError) -> Self {
        AppError::Api(ApiError::Authorization(e))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Provider(ProviderError::Db(e))
    }
}

impl From<SchemaError> for AppError {
    fn from(e: SchemaError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Internal(e.to_string())
    }
}
