//! # newsfeat-api
//!
//! HTTP façade and process wiring for the newsfeat extraction pipeline.
//!
//! The binary connects the store, the broker and the enrichment client,
//! starts the queue consumer with the extraction pipeline as its handler, and
//! serves manual trigger, publish, health and metrics endpoints.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::AppConfig;
pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, HealthProbe, ServiceProbe};
