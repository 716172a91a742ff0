//! Extraction pipeline: one article from id to stored features.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use newsfeat_core::defaults;
use newsfeat_core::{
    ArticleId, ArticleRepository, ArticleStatus, CreateFeaturesRequest, Error, FailureKind,
    FeatureExtractor, FeatureRepository, Result, WorkHandler,
};

/// Runs fetch, extract and persist for a single article.
///
/// Every failure collapses to `false` after being classified and logged; the
/// queue decides whether the item is retried.
pub struct ExtractionPipeline {
    articles: Arc<dyn ArticleRepository>,
    features: Arc<dyn FeatureRepository>,
    extractor: Arc<dyn FeatureExtractor>,
    model_version: String,
    ready: AtomicBool,
}

impl ExtractionPipeline {
    /// Create a pipeline. It refuses work until [`mark_ready`](Self::mark_ready).
    pub fn new(
        articles: Arc<dyn ArticleRepository>,
        features: Arc<dyn FeatureRepository>,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Self {
        Self {
            articles,
            features,
            extractor,
            model_version: defaults::MODEL_VERSION.to_string(),
            ready: AtomicBool::new(false),
        }
    }

    /// Tag stored with every record.
    pub fn with_model_version(mut self, model_version: impl Into<String>) -> Self {
        self.model_version = model_version.into();
        self
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    /// Allow processing once every connection is up.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn mark_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Process one article. `true` when its features were stored.
    pub async fn extract_and_save(&self, article_id: ArticleId) -> bool {
        if !self.is_ready() {
            error!(
                subsystem = "jobs",
                component = "pipeline",
                article_id,
                "Pipeline not initialized, refusing work"
            );
            return false;
        }

        let start = Instant::now();
        match self.run(article_id, start).await {
            Ok(record_id) => {
                info!(
                    subsystem = "jobs",
                    component = "pipeline",
                    op = "extract_and_save",
                    article_id,
                    record_id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Features extracted and stored"
                );
                true
            }
            Err(e) => {
                self.record_failure(article_id, &e).await;
                false
            }
        }
    }

    async fn run(&self, article_id: ArticleId, start: Instant) -> Result<i64> {
        if let Err(e) = self
            .articles
            .update_status(article_id, ArticleStatus::Processing)
            .await
        {
            warn!(
                subsystem = "jobs",
                component = "pipeline",
                article_id,
                error = %e,
                "Could not mark article processing"
            );
        }

        let article = self
            .articles
            .fetch_by_id(article_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("article {}", article_id)))?;

        if article.content.trim().is_empty() {
            return Err(Error::Validation(format!(
                "article {} has no content",
                article_id
            )));
        }

        let features = self
            .extractor
            .extract_features(&article.content, &article.title)
            .await?;

        let request = CreateFeaturesRequest {
            article_id,
            features,
            model_version: self.model_version.clone(),
            extraction_date: Utc::now(),
            processing_time_ms: start.elapsed().as_millis() as i64,
        };
        self.features.insert_with_status(request).await
    }

    async fn record_failure(&self, article_id: ArticleId, err: &Error) {
        let kind = err.kind();
        if kind.is_terminal() {
            error!(
                subsystem = "jobs",
                component = "pipeline",
                article_id,
                failure = kind.as_str(),
                error = %err,
                "Extraction failed permanently"
            );
        } else {
            warn!(
                subsystem = "jobs",
                component = "pipeline",
                article_id,
                failure = kind.as_str(),
                error = %err,
                "Extraction failed"
            );
        }

        if kind == FailureKind::NotFound {
            return;
        }
        if let Err(e) = self
            .articles
            .update_status(article_id, ArticleStatus::Failed)
            .await
        {
            warn!(
                subsystem = "jobs",
                component = "pipeline",
                article_id,
                error = %e,
                "Could not mark article failed"
            );
        }
    }
}

#[async_trait]
impl WorkHandler for ExtractionPipeline {
    async fn handle(&self, article_id: ArticleId, retry_count: u32) -> bool {
        info!(
            subsystem = "jobs",
            component = "pipeline",
            article_id,
            retry_count,
            "Handling work item"
        );
        self.extract_and_save(article_id).await
    }
}
