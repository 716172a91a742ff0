//! Core traits for the pipeline's collaborators.
//!
//! The store, the enrichment API and the queue sit behind these interfaces so
//! the orchestrator and the consumer loop can be exercised with in-memory
//! implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::*;

// =============================================================================
// STORE
// =============================================================================

/// Read access to articles and their processing status.
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Fetch an article. `Ok(None)` when the id does not exist.
    async fn fetch_by_id(&self, id: ArticleId) -> Result<Option<Article>>;

    /// Set the processing status. Setting the same status twice is harmless.
    async fn update_status(&self, id: ArticleId, status: ArticleStatus) -> Result<()>;
}

/// Request for persisting one extraction result.
#[derive(Debug, Clone)]
pub struct CreateFeaturesRequest {
    pub article_id: ArticleId,
    pub features: ExtractedFeatures,
    pub model_version: String,
    /// When the extraction finished.
    pub extraction_date: DateTime<Utc>,
    pub processing_time_ms: i64,
}

/// Append-only storage of extraction results.
#[async_trait]
pub trait FeatureRepository: Send + Sync {
    /// Insert a record and mark the article `success` in one transaction.
    ///
    /// Returns the surrogate id of the new record.
    async fn insert_with_status(&self, req: CreateFeaturesRequest) -> Result<i64>;

    /// All records for an article, oldest first.
    async fn list_for_article(&self, article_id: ArticleId) -> Result<Vec<StoredFeatures>>;
}

// =============================================================================
// ENRICHMENT
// =============================================================================

/// Turns article text into validated features.
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    /// Extract features from an article body and title.
    async fn extract_features(&self, text: &str, title: &str) -> Result<ExtractedFeatures>;

    /// Model identifier used for requests.
    fn model_name(&self) -> &str;
}

// =============================================================================
// QUEUE
// =============================================================================

/// Processes one unit of work taken from the queue.
///
/// The consumer only sees the boolean: `true` acknowledges the delivery,
/// `false` sends it down the retry/dead-letter path.
#[async_trait]
pub trait WorkHandler: Send + Sync {
    async fn handle(&self, article_id: ArticleId, retry_count: u32) -> bool;
}

/// Enqueues work items.
#[async_trait]
pub trait WorkPublisher: Send + Sync {
    async fn publish(&self, article_id: ArticleId, retry_count: u32) -> Result<()>;
}
