//! Route tests against in-memory collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use newsfeat_api::{router, AppState, HealthProbe};
use newsfeat_core::{
    Article, ArticleId, ArticleRepository, ArticleStatus, CreateFeaturesRequest,
    EnrichmentMetrics, Error, FeatureRepository, QueueMetrics, Result, StoredFeatures,
    WorkPublisher,
};
use newsfeat_inference::mock::MockExtractor;
use newsfeat_jobs::ExtractionPipeline;

// ============================================================================
// FIXTURES
// ============================================================================

#[derive(Default)]
struct Store {
    articles: Mutex<HashMap<ArticleId, Article>>,
    statuses: Mutex<Vec<(ArticleId, ArticleStatus)>>,
    records: Mutex<Vec<StoredFeatures>>,
}

impl Store {
    fn with_article(self, id: ArticleId) -> Self {
        self.articles.lock().unwrap().insert(
            id,
            Article {
                id,
                title: "Borsa güne yükselişle başladı".to_string(),
                content: "BIST 100 endeksi açılışta yüzde 1 değer kazandı.".to_string(),
                source: None,
                published_date: None,
            },
        );
        self
    }

    fn last_status(&self, id: ArticleId) -> Option<ArticleStatus> {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(a, _)| *a == id)
            .map(|(_, s)| *s)
    }
}

#[async_trait]
impl ArticleRepository for Store {
    async fn fetch_by_id(&self, id: ArticleId) -> Result<Option<Article>> {
        Ok(self.articles.lock().unwrap().get(&id).cloned())
    }

    async fn update_status(&self, id: ArticleId, status: ArticleStatus) -> Result<()> {
        self.statuses.lock().unwrap().push((id, status));
        Ok(())
    }
}

#[async_trait]
impl FeatureRepository for Store {
    async fn insert_with_status(&self, req: CreateFeaturesRequest) -> Result<i64> {
        let mut records = self.records.lock().unwrap();
        let id = records.len() as i64 + 1;
        records.push(StoredFeatures {
            id,
            article_id: req.article_id,
            features: req.features,
            extraction_date: req.extraction_date,
            model_version: req.model_version,
            processing_time_ms: req.processing_time_ms,
        });
        self.statuses
            .lock()
            .unwrap()
            .push((req.article_id, ArticleStatus::Success));
        Ok(id)
    }

    async fn list_for_article(&self, article_id: ArticleId) -> Result<Vec<StoredFeatures>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.article_id == article_id)
            .cloned()
            .collect())
    }
}

/// Publisher that refuses the ids it was told to.
#[derive(Default)]
struct Publisher {
    refuse: HashSet<ArticleId>,
    published: Mutex<Vec<ArticleId>>,
}

#[async_trait]
impl WorkPublisher for Publisher {
    async fn publish(&self, article_id: ArticleId, _retry_count: u32) -> Result<()> {
        if self.refuse.contains(&article_id) {
            return Err(Error::Publish("broker unavailable".into()));
        }
        self.published.lock().unwrap().push(article_id);
        Ok(())
    }
}

struct Probe {
    database: bool,
    queue: bool,
    enrichment: bool,
    consumer: bool,
}

impl Probe {
    fn all_up() -> Self {
        Self {
            database: true,
            queue: true,
            enrichment: true,
            consumer: true,
        }
    }
}

#[async_trait]
impl HealthProbe for Probe {
    async fn database(&self) -> bool {
        self.database
    }

    async fn queue(&self) -> bool {
        self.queue
    }

    async fn enrichment(&self) -> bool {
        self.enrichment
    }

    fn consumer_running(&self) -> bool {
        self.consumer
    }
}

struct Harness {
    app: Router,
    store: Arc<Store>,
    publisher: Arc<Publisher>,
    queue_metrics: Arc<QueueMetrics>,
}

fn harness(store: Store, publisher: Publisher, probe: Probe) -> Harness {
    let store = Arc::new(store);
    let publisher = Arc::new(publisher);
    let queue_metrics = Arc::new(QueueMetrics::new());

    let pipeline = Arc::new(ExtractionPipeline::new(
        store.clone(),
        store.clone(),
        Arc::new(MockExtractor::new()),
    ));
    pipeline.mark_ready();

    let state = AppState {
        pipeline,
        publisher: publisher.clone(),
        articles: store.clone(),
        probe: Arc::new(probe),
        queue_metrics: queue_metrics.clone(),
        enrichment_metrics: Arc::new(EnrichmentMetrics::new()),
        queue_name: "news_processing".to_string(),
    };

    Harness {
        app: router(state),
        store,
        publisher,
        queue_metrics,
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

// ============================================================================
// SYSTEM
// ============================================================================

#[tokio::test]
async fn test_root_lists_endpoints() {
    let h = harness(Store::default(), Publisher::default(), Probe::all_up());
    let (status, body) = send(&h.app, "GET", "/", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    assert_eq!(
        body["endpoints"]["extraction"]["queue_batch"],
        "POST /api/queue/batch"
    );
}

#[tokio::test]
async fn test_health_all_components_up() {
    let h = harness(Store::default(), Publisher::default(), Probe::all_up());
    let (status, body) = send(&h.app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"]["database"]["status"], "healthy");
    assert_eq!(body["components"]["queue"]["connected"], true);
    assert_eq!(body["components"]["consumer"]["status"], "running");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_health_degraded_when_broker_down() {
    let probe = Probe {
        queue: false,
        consumer: false,
        ..Probe::all_up()
    };
    let h = harness(Store::default(), Publisher::default(), probe);
    let (status, body) = send(&h.app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["components"]["queue"]["status"], "unhealthy");
    assert_eq!(body["components"]["consumer"]["active"], false);
    assert_eq!(body["components"]["enrichment"]["status"], "healthy");
}

#[tokio::test]
async fn test_metrics_report_both_counter_sets() {
    let h = harness(Store::default(), Publisher::default(), Probe::all_up());
    h.queue_metrics.messages_consumed.inc();
    h.queue_metrics.messages_consumed.inc();

    let (status, body) = send(&h.app, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue"]["messages_consumed"], 2);
    assert_eq!(body["queue"]["connected"], true);
    assert_eq!(body["enrichment"]["requests_sent"], 0);

    let (status, body) = send(&h.app, "GET", "/metrics/enrichment", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_tokens_used"], 0);
}

// ============================================================================
// EXTRACTION
// ============================================================================

#[tokio::test]
async fn test_manual_extract_stores_features() {
    let h = harness(
        Store::default().with_article(7),
        Publisher::default(),
        Probe::all_up(),
    );
    let (status, body) = send(&h.app, "POST", "/api/extract/7", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["article_id"], 7);
    assert_eq!(h.store.records.lock().unwrap().len(), 1);
    assert_eq!(h.store.last_status(7), Some(ArticleStatus::Success));
}

#[tokio::test]
async fn test_manual_extract_missing_article_is_500() {
    let h = harness(Store::default(), Publisher::default(), Probe::all_up());
    let (status, body) = send(&h.app, "POST", "/api/extract/404", None).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("404"));
    assert!(h.store.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_queue_article_marks_queued() {
    let h = harness(Store::default(), Publisher::default(), Probe::all_up());
    let (status, body) = send(&h.app, "POST", "/api/queue/12", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue"], "news_processing");
    assert_eq!(*h.publisher.published.lock().unwrap(), vec![12]);
    assert_eq!(h.store.last_status(12), Some(ArticleStatus::Queued));
}

#[tokio::test]
async fn test_queue_article_publish_failure_is_503() {
    let publisher = Publisher {
        refuse: HashSet::from([12]),
        ..Publisher::default()
    };
    let h = harness(Store::default(), publisher, Probe::all_up());
    let (status, body) = send(&h.app, "POST", "/api/queue/12", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
    assert_eq!(h.store.last_status(12), None);
}

#[tokio::test]
async fn test_queue_batch_reports_partial_failure() {
    let publisher = Publisher {
        refuse: HashSet::from([2]),
        ..Publisher::default()
    };
    let h = harness(Store::default(), publisher, Probe::all_up());
    let (status, body) = send(&h.app, "POST", "/api/queue/batch", Some(json!([1, 2, 3]))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["queued"], 2);
    assert_eq!(body["failed"], 1);
    assert_eq!(body["failed_ids"], json!([2]));
    assert_eq!(*h.publisher.published.lock().unwrap(), vec![1, 3]);
    assert_eq!(h.store.last_status(2), None);
    assert_eq!(h.store.last_status(3), Some(ArticleStatus::Queued));
}

#[tokio::test]
async fn test_queue_batch_rejects_non_numeric_body() {
    let h = harness(Store::default(), Publisher::default(), Probe::all_up());
    let (status, _) = send(&h.app, "POST", "/api/queue/batch", Some(json!(["a"]))).await;

    assert!(status.is_client_error());
    assert!(h.publisher.published.lock().unwrap().is_empty());
}
