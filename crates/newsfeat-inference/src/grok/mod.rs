//! xAI Grok backend (OpenAI-compatible chat completions).

mod client;
pub mod error;
pub mod parse;
pub mod types;

pub use client::{GrokClient, GrokConfig};
pub use error::GrokErrorCode;
