//! Shared handler state and the health probe seam.

use std::sync::Arc;

use async_trait::async_trait;

use newsfeat_core::{ArticleRepository, EnrichmentMetrics, QueueMetrics, WorkPublisher};
use newsfeat_db::Database;
use newsfeat_inference::GrokClient;
use newsfeat_jobs::{ExtractionPipeline, QueueManager, WorkerLiveness};

/// Liveness of each runtime component.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn database(&self) -> bool;
    async fn queue(&self) -> bool;
    async fn enrichment(&self) -> bool;
    fn consumer_running(&self) -> bool;
}

/// Probe over the real components.
pub struct ServiceProbe {
    pub db: Arc<Database>,
    pub queue: Arc<QueueManager>,
    pub grok: Arc<GrokClient>,
    pub worker: Option<WorkerLiveness>,
}

#[async_trait]
impl HealthProbe for ServiceProbe {
    async fn database(&self) -> bool {
        self.db.pool.is_initialized().await && self.db.ping().await.is_ok()
    }

    async fn queue(&self) -> bool {
        self.queue.is_connected().await
    }

    async fn enrichment(&self) -> bool {
        self.grok.is_connected().await
    }

    fn consumer_running(&self) -> bool {
        self.worker.as_ref().map(|w| w.is_running()).unwrap_or(false)
    }
}

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ExtractionPipeline>,
    pub publisher: Arc<dyn WorkPublisher>,
    pub articles: Arc<dyn ArticleRepository>,
    pub probe: Arc<dyn HealthProbe>,
    pub queue_metrics: Arc<QueueMetrics>,
    pub enrichment_metrics: Arc<EnrichmentMetrics>,
    pub queue_name: String,
}
