//! HTTP adapter: dispatch contract for handlers and error-to-response mapping.

pub mod dispatch;
pub mod mapper;

pub use dispatch::{
    dispatch, DispatchOptions, Reply, RequestContext, RequestInfo, ResponseSlot, Routes, StatusCodes, Templater,
};
pub use mapper::{handle_error, not_found, render, status_for};
