//! Shutdown ordering between the consume loop and the pipeline.

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use common::InMemoryStore;
use newsfeat_core::{ArticleStatus, Result, WorkHandler};
use newsfeat_inference::mock::MockExtractor;
use newsfeat_jobs::{ExtractionPipeline, QueueWorker, WorkSource};

/// Holds one delivery that is only handled once shutdown has begun.
#[derive(Default)]
struct LateDelivery {
    handled: Mutex<Option<bool>>,
}

#[async_trait]
impl WorkSource for LateDelivery {
    async fn run(
        self: Arc<Self>,
        handler: Arc<dyn WorkHandler>,
        cancel: CancellationToken,
    ) -> Result<()> {
        cancel.cancelled().await;
        let ok = handler.handle(1, 0).await;
        *self.handled.lock().unwrap() = Some(ok);
        Ok(())
    }
}

#[tokio::test]
async fn test_in_flight_delivery_completes_during_shutdown() {
    let store = Arc::new(InMemoryStore::default().with_article(1, "Başlık", "İçerik"));
    let pipeline = Arc::new(ExtractionPipeline::new(
        store.clone(),
        store.clone(),
        Arc::new(MockExtractor::new()),
    ));
    pipeline.mark_ready();

    let source = Arc::new(LateDelivery::default());
    let worker = QueueWorker::new(source.clone(), pipeline.clone()).start();

    worker.shutdown_and_close(&pipeline).await.unwrap();

    assert_eq!(*source.handled.lock().unwrap(), Some(true));
    assert_eq!(store.records().len(), 1);
    assert_eq!(
        store.status_history(1),
        vec![ArticleStatus::Processing, ArticleStatus::Success]
    );
    assert!(!pipeline.is_ready());
}

#[tokio::test]
async fn test_closed_pipeline_refuses_later_work() {
    let store = Arc::new(InMemoryStore::default().with_article(1, "Başlık", "İçerik"));
    let pipeline = Arc::new(ExtractionPipeline::new(
        store.clone(),
        store.clone(),
        Arc::new(MockExtractor::new()),
    ));
    pipeline.mark_ready();

    let worker = QueueWorker::new(Arc::new(LateDelivery::default()), pipeline.clone()).start();
    worker.shutdown_and_close(&pipeline).await.unwrap();

    assert!(!pipeline.handle(1, 1).await);
    assert_eq!(store.records().len(), 1);
}
