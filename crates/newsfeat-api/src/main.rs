//! newsfeat service binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};

use newsfeat_api::telemetry::{self, LogConfig};
use newsfeat_api::{router, AppConfig, AppState, ServiceProbe};
use newsfeat_core::{EnrichmentMetrics, QueueMetrics};
use newsfeat_db::Database;
use newsfeat_inference::GrokClient;
use newsfeat_jobs::{ExtractionPipeline, QueueManager, QueueWorker};

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let log_config = LogConfig::from_env();
    let _log_guard = telemetry::init(&log_config);
    info!(
        format = ?log_config.format,
        file = ?log_config.file,
        "Logging initialized"
    );

    let config = AppConfig::from_env()?;
    info!(
        model = %config.grok.model,
        model_version = %config.model_version,
        queue = %config.queue.queue_name,
        "Starting newsfeat"
    );

    // ========== STARTUP ==========

    let db = Arc::new(
        Database::connect_with(config.database.clone(), config.pool.clone()).await?,
    );
    info!(subsystem = "database", "Connected");

    let run_migrations = std::env::var("RUN_MIGRATIONS")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);
    if run_migrations {
        db.migrate().await?;
        info!(subsystem = "database", "Migrations applied");
    }

    let queue_metrics = Arc::new(QueueMetrics::new());
    let queue = Arc::new(QueueManager::with_metrics(
        config.queue.clone(),
        queue_metrics.clone(),
    ));
    queue.connect().await?;

    let enrichment_metrics = Arc::new(EnrichmentMetrics::new());
    let grok = Arc::new(GrokClient::with_metrics(
        config.grok.clone(),
        enrichment_metrics.clone(),
    ));
    grok.connect().await?;

    let pipeline = Arc::new(
        ExtractionPipeline::new(db.articles.clone(), db.features.clone(), grok.clone())
            .with_model_version(config.model_version.clone()),
    );
    pipeline.mark_ready();

    let worker = QueueWorker::new(queue.clone(), pipeline.clone()).start();
    info!("System ready");

    let state = AppState {
        pipeline,
        publisher: queue.clone(),
        articles: db.articles.clone(),
        probe: Arc::new(ServiceProbe {
            db: db.clone(),
            queue: queue.clone(),
            grok: grok.clone(),
            worker: Some(worker.liveness()),
        }),
        queue_metrics,
        enrichment_metrics,
        queue_name: config.queue.queue_name.clone(),
    };
    let app = router(state.clone());

    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // ========== SHUTDOWN ==========

    if let Err(e) = worker.shutdown_and_close(&state.pipeline).await {
        warn!(error = %e, "Worker stopped with error");
    }
    grok.disconnect().await;
    queue.disconnect().await;
    db.close().await;
    info!("Shutdown complete");

    Ok(())
}
