//! s3cache HTTP API
//!
//! This crate provides the Axum-based HTTP surface of the proxy: the
//! read-through object routes plus health and metrics endpoints.

pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppState, MetricsHandle};
