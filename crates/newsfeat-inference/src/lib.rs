//! # newsfeat-inference
//!
//! Enrichment client for the newsfeat pipeline.
//!
//! Sends an article to an OpenAI-compatible chat endpoint (xAI Grok by
//! default), decodes the JSON reply and passes it through a strict
//! validation gate before handing back a typed
//! [`ExtractedFeatures`](newsfeat_core::ExtractedFeatures).
//!
//! ## Example
//!
//! ```rust,ignore
//! use newsfeat_core::FeatureExtractor;
//! use newsfeat_inference::GrokClient;
//!
//! let client = GrokClient::from_env()?;
//! client.connect().await?;
//! let features = client.extract_features(&article.content, &article.title).await?;
//! ```

pub mod grok;
pub mod prompt;
pub mod schema;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use grok::{GrokClient, GrokConfig, GrokErrorCode};
pub use schema::{validate_features, REQUIRED_FIELDS};
