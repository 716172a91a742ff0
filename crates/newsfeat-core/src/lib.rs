//! # newsfeat-core
//!
//! Core types, traits, and shared primitives for the newsfeat pipeline.
//!
//! Every other crate in the workspace depends on this one for the error
//! taxonomy, the domain models, the collaborator traits, the rate limiter,
//! and the metric counter sets.

pub mod defaults;
pub mod error;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, FailureKind, Result};
pub use metrics::{
    Counter, EnrichmentMetrics, EnrichmentMetricsSnapshot, QueueMetrics, QueueMetricsSnapshot,
};
pub use models::*;
pub use rate_limit::RateLimiter;
pub use traits::*;
