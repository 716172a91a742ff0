//! Delayed republishing of failed work items.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use newsfeat_core::{ArticleId, WorkPublisher};

/// Owns the timers for pending republishes.
///
/// Each scheduled retry runs as its own task, so a long backoff never holds
/// up the consumer. Cancelling the token aborts every pending republish; the
/// rejected copy of each one remains in the dead-letter queue.
pub struct RetryScheduler {
    publisher: Arc<dyn WorkPublisher>,
    cancel: CancellationToken,
    pending: Arc<AtomicUsize>,
}

impl RetryScheduler {
    pub fn new(publisher: Arc<dyn WorkPublisher>, cancel: CancellationToken) -> Self {
        Self {
            publisher,
            cancel,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Republish `article_id` with `retry_count` after `delay`.
    pub fn schedule(&self, article_id: ArticleId, retry_count: u32, delay: Duration) {
        let publisher = self.publisher.clone();
        let cancel = self.cancel.clone();
        let pending = self.pending.clone();

        pending.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(
                        subsystem = "jobs",
                        component = "retry",
                        article_id,
                        retry_count,
                        "Pending republish aborted by shutdown"
                    );
                }
                _ = tokio::time::sleep(delay) => {
                    match publisher.publish(article_id, retry_count).await {
                        Ok(()) => info!(
                            subsystem = "jobs",
                            component = "retry",
                            article_id,
                            retry_count,
                            "Republished for retry"
                        ),
                        Err(e) => error!(
                            subsystem = "jobs",
                            component = "retry",
                            article_id,
                            retry_count,
                            error = %e,
                            "Republish failed, item remains dead-lettered"
                        ),
                    }
                }
            }
            pending.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Republishes still waiting on their timer.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Abort all pending republishes.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
