//! Background consumer task and its control handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use newsfeat_core::{Error, Result, WorkHandler};

use crate::pipeline::ExtractionPipeline;
use crate::queue::QueueManager;

/// A source of work that runs a consume loop until cancelled.
#[async_trait]
pub trait WorkSource: Send + Sync + 'static {
    async fn run(
        self: Arc<Self>,
        handler: Arc<dyn WorkHandler>,
        cancel: CancellationToken,
    ) -> Result<()>;
}

#[async_trait]
impl WorkSource for QueueManager {
    async fn run(
        self: Arc<Self>,
        handler: Arc<dyn WorkHandler>,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.consume(handler, cancel).await
    }
}

/// Spawns the consumer loop.
pub struct QueueWorker<S: WorkSource> {
    source: Arc<S>,
    handler: Arc<dyn WorkHandler>,
}

impl<S: WorkSource> QueueWorker<S> {
    pub fn new(source: Arc<S>, handler: Arc<dyn WorkHandler>) -> Self {
        Self { source, handler }
    }

    /// Start consuming on a background task.
    pub fn start(self) -> WorkerHandle {
        let cancel = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(true));

        let task_cancel = cancel.clone();
        let task_running = running.clone();
        let join = tokio::spawn(async move {
            info!(subsystem = "jobs", component = "worker", "Worker started");
            let result = self.source.run(self.handler, task_cancel).await;
            task_running.store(false, Ordering::SeqCst);
            match &result {
                Ok(()) => info!(subsystem = "jobs", component = "worker", "Worker stopped"),
                Err(e) => error!(
                    subsystem = "jobs",
                    component = "worker",
                    error = %e,
                    "Worker exited with error"
                ),
            }
            result
        });

        WorkerHandle {
            cancel,
            running,
            join,
        }
    }
}

/// Cloneable view of whether a worker's consume loop is alive.
#[derive(Debug, Clone)]
pub struct WorkerLiveness(Arc<AtomicBool>);

impl WorkerLiveness {
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
    join: JoinHandle<Result<()>>,
}

impl WorkerHandle {
    /// Whether the consume loop is still alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Liveness flag that outlives the handle.
    pub fn liveness(&self) -> WorkerLiveness {
        WorkerLiveness(self.running.clone())
    }

    /// Token shared with the consume loop.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal the loop to stop and wait for the in-flight delivery to settle.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.join
            .await
            .map_err(|e| Error::Internal(format!("worker task failed: {}", e)))?
    }

    /// Shut the worker down, then stop `pipeline` from taking more work.
    ///
    /// The pipeline stays ready until the consume loop has returned, so a
    /// delivery already in flight is processed instead of being rejected.
    pub async fn shutdown_and_close(self, pipeline: &ExtractionPipeline) -> Result<()> {
        let result = self.shutdown().await;
        pipeline.mark_not_ready();
        result
    }
}
