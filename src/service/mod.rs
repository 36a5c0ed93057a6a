//! CRUD services: the generic `Crud` capability and the example user service.

mod crud;
mod user;
pub use crud::{Crud, CrudService, RecordId, ServiceContext};
pub use user::{user_model, UserService, USER_MODEL};
