//! # newsfeat-jobs
//!
//! Message-driven processing for the newsfeat pipeline.
//!
//! This crate provides:
//! - An AMQP work queue with a dead-letter queue and delayed retries
//! - The extraction pipeline that turns one queued article into stored features
//! - A background worker with graceful shutdown
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use newsfeat_jobs::{ExtractionPipeline, QueueConfig, QueueManager, QueueWorker};
//!
//! let queue = Arc::new(QueueManager::new(QueueConfig::from_env()?));
//! queue.connect().await?;
//!
//! let pipeline = Arc::new(ExtractionPipeline::new(articles, features, extractor));
//! pipeline.mark_ready();
//!
//! let handle = QueueWorker::new(queue.clone(), pipeline).start();
//! // ...
//! handle.shutdown().await?;
//! queue.disconnect().await;
//! ```

pub mod pipeline;
pub mod queue;
pub mod worker;

pub use pipeline::ExtractionPipeline;
pub use queue::{
    publish_batch, BatchReport, MessageOutcome, QueueConfig, QueueManager, RedeliveryPolicy,
    RetryScheduler,
};
pub use worker::{QueueWorker, WorkSource, WorkerHandle, WorkerLiveness};
