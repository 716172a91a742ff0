//! HTTP routes.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use newsfeat_core::defaults;
use newsfeat_core::{ArticleId, ArticleStatus};
use newsfeat_jobs::publish_batch;

use crate::error::ApiError;
use crate::state::AppState;

/// Generates UUIDv7 request IDs (time-ordered for log correlation).
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Build the router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        // System
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/metrics/enrichment", get(enrichment_metrics))
        // Extraction
        .route("/api/extract/:article_id", post(manual_extract))
        .route("/api/queue/batch", post(queue_batch))
        .route("/api/queue/:article_id", post(queue_article))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .with_state(state)
}

// =============================================================================
// SYSTEM
// =============================================================================

async fn root() -> impl IntoResponse {
    Json(json!({
        "service": defaults::SERVICE_NAME,
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "system": {
                "root": "GET /",
                "health": "GET /health",
                "metrics": "GET /metrics",
                "enrichment_metrics": "GET /metrics/enrichment"
            },
            "extraction": {
                "manual_extract": "POST /api/extract/{article_id}",
                "queue_article": "POST /api/queue/{article_id}",
                "queue_batch": "POST /api/queue/batch"
            }
        }
    }))
}

fn component(healthy: bool) -> serde_json::Value {
    json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "connected": healthy,
    })
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.probe.database().await;
    let queue = state.probe.queue().await;
    let enrichment = state.probe.enrichment().await;
    let consumer = state.probe.consumer_running();

    let all_healthy = database && queue && enrichment && consumer;

    Json(json!({
        "status": if all_healthy { "healthy" } else { "degraded" },
        "components": {
            "database": component(database),
            "queue": component(queue),
            "enrichment": component(enrichment),
            "consumer": {
                "status": if consumer { "running" } else { "stopped" },
                "active": consumer,
            },
        },
        "timestamp": chrono::Utc::now(),
    }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let connected = state.probe.queue().await;
    Json(json!({
        "queue": state.queue_metrics.snapshot(connected),
        "enrichment": state.enrichment_metrics.snapshot(),
    }))
}

async fn enrichment_metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.enrichment_metrics.snapshot())
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Run the pipeline synchronously, bypassing the queue.
async fn manual_extract(
    State(state): State<AppState>,
    Path(article_id): Path<ArticleId>,
) -> Result<impl IntoResponse, ApiError> {
    info!(subsystem = "api", op = "manual_extract", article_id, "Manual extraction requested");

    if !state.pipeline.extract_and_save(article_id).await {
        return Err(ApiError::Internal(format!(
            "Article {} could not be processed",
            article_id
        )));
    }

    Ok(Json(json!({
        "success": true,
        "message": format!("Article {} processed and stored", article_id),
        "article_id": article_id,
    })))
}

async fn queue_article(
    State(state): State<AppState>,
    Path(article_id): Path<ArticleId>,
) -> Result<impl IntoResponse, ApiError> {
    info!(subsystem = "api", op = "queue_article", article_id, "Queueing article");

    state.publisher.publish(article_id, 0).await?;
    mark_queued(&state, article_id).await;

    Ok(Json(json!({
        "success": true,
        "message": format!("Article {} queued", article_id),
        "article_id": article_id,
        "queue": state.queue_name,
    })))
}

async fn queue_batch(
    State(state): State<AppState>,
    Json(article_ids): Json<Vec<ArticleId>>,
) -> impl IntoResponse {
    info!(
        subsystem = "api",
        op = "queue_batch",
        count = article_ids.len(),
        "Queueing batch"
    );

    let report = publish_batch(state.publisher.as_ref(), &article_ids).await;
    for &article_id in article_ids.iter().filter(|id| !report.failed_ids.contains(*id)) {
        mark_queued(&state, article_id).await;
    }

    Json(json!({
        "success": true,
        "total": article_ids.len(),
        "queued": report.queued,
        "failed": report.failed,
        "failed_ids": report.failed_ids,
    }))
}

async fn mark_queued(state: &AppState, article_id: ArticleId) {
    if let Err(e) = state
        .articles
        .update_status(article_id, ArticleStatus::Queued)
        .await
    {
        warn!(
            subsystem = "api",
            article_id,
            error = %e,
            "Could not mark article queued"
        );
    }
}
