//! Parameterized SQL for the PostgreSQL provider: identifiers come from registered models only,
//! values always travel as parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::{bind_all, text_param};
