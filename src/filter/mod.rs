//! Query filter engine: turns untyped query parameters into a structured query descriptor.

mod builder;
mod descriptor;
pub mod query_string;

pub use builder::{build_filter, offset_limit, FilterBuilder, UnknownKeys, REQUIRED_KEY, RESERVED_KEYS};
pub use descriptor::{
    is_operator_map, logical_branches, IncludeDescriptor, OrderDirection, OrderItem, QueryDescriptor,
    QueryParams,
};
