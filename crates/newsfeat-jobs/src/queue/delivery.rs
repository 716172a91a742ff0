//! Settlement of a single delivery.
//!
//! A delivery moves through one pass of this state machine:
//!
//! ```text
//! RECEIVED -> PROCESSING -> ACKED
//!                        -> NACK_RETRY     (republished later with retry_count + 1)
//!                        -> NACK_TERMINAL  (dead-lettered, retry budget spent)
//!          -> NACK_PARSE_ERROR             (dead-lettered, body undecodable)
//! any ack/nack failure   -> UNSETTLED      (broker redelivers after channel loss)
//! ```
//!
//! Every nack is issued without requeue so the broker routes the rejected copy
//! to the dead-letter queue. Retries are fresh publishes, never requeues.

use std::time::Duration;

use async_trait::async_trait;
use lapin::acker::Acker;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use tracing::{error, info, warn};

use newsfeat_core::{ArticleId, Error, QueueMetrics, Result, WorkHandler};

use super::message;

/// Broker-side settlement of one delivery.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Positive acknowledgement.
    async fn acknowledge(&self) -> Result<()>;

    /// Negative acknowledgement without requeue.
    async fn reject(&self) -> Result<()>;
}

#[async_trait]
impl Acknowledger for Acker {
    async fn acknowledge(&self) -> Result<()> {
        self.ack(BasicAckOptions::default())
            .await
            .map_err(|e| Error::Queue(format!("ack failed: {}", e)))
    }

    async fn reject(&self) -> Result<()> {
        self.nack(BasicNackOptions {
            multiple: false,
            requeue: false,
        })
        .await
        .map_err(|e| Error::Queue(format!("nack failed: {}", e)))
    }
}

/// Retry budget for failed work items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    /// Highest retry count that is still republished from.
    pub max_retries: u32,
    /// Delay before the first republish.
    pub base_delay: Duration,
}

impl RedeliveryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Whether an item that failed at `retry_count` gets another attempt.
    pub fn allows_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Delay before republishing an item that failed at `retry_count`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        retry_delay(self.base_delay, retry_count)
    }
}

/// `base * 2^retry_count`, saturating.
pub fn retry_delay(base: Duration, retry_count: u32) -> Duration {
    base.saturating_mul(1u32.checked_shl(retry_count).unwrap_or(u32::MAX))
}

/// Terminal state of one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Processed and acknowledged.
    Acked { article_id: ArticleId },
    /// Rejected; a copy with `next_retry_count` is due after `delay`.
    Retry {
        article_id: ArticleId,
        next_retry_count: u32,
        delay: Duration,
    },
    /// Rejected with the retry budget spent.
    DeadLettered {
        article_id: ArticleId,
        retry_count: u32,
    },
    /// Body could not be decoded; rejected on first sight.
    Malformed { reason: String },
    /// The ack or nack call itself failed.
    Unsettled {
        article_id: Option<ArticleId>,
        error: String,
    },
}

impl MessageOutcome {
    pub fn article_id(&self) -> Option<ArticleId> {
        match self {
            MessageOutcome::Acked { article_id }
            | MessageOutcome::Retry { article_id, .. }
            | MessageOutcome::DeadLettered { article_id, .. } => Some(*article_id),
            MessageOutcome::Malformed { .. } => None,
            MessageOutcome::Unsettled { article_id, .. } => *article_id,
        }
    }
}

/// Decode, dispatch and settle one delivery.
///
/// The caller is responsible for acting on [`MessageOutcome::Retry`].
pub async fn process_delivery<A>(
    body: &[u8],
    acker: &A,
    handler: &dyn WorkHandler,
    policy: &RedeliveryPolicy,
    metrics: &QueueMetrics,
) -> MessageOutcome
where
    A: Acknowledger + ?Sized,
{
    let item = match message::decode(body) {
        Ok(item) => item,
        Err(e) => {
            metrics.parse_errors.inc();
            error!(
                subsystem = "jobs",
                component = "queue",
                op = "handle_message",
                error = %e,
                body_len = body.len(),
                "Undecodable message, dead-lettering"
            );
            return match acker.reject().await {
                Ok(()) => MessageOutcome::Malformed {
                    reason: e.to_string(),
                },
                Err(settle) => unsettled(metrics, None, settle),
            };
        }
    };

    let article_id = item.article_id;
    let retry_count = item.retry_count;

    info!(
        subsystem = "jobs",
        component = "queue",
        op = "handle_message",
        article_id,
        retry_count,
        "Processing message"
    );

    if handler.handle(article_id, retry_count).await {
        return match acker.acknowledge().await {
            Ok(()) => {
                metrics.messages_consumed.inc();
                info!(
                    subsystem = "jobs",
                    component = "queue",
                    article_id,
                    "Message acknowledged"
                );
                MessageOutcome::Acked { article_id }
            }
            Err(settle) => unsettled(metrics, Some(article_id), settle),
        };
    }

    if let Err(settle) = acker.reject().await {
        return unsettled(metrics, Some(article_id), settle);
    }

    if policy.allows_retry(retry_count) {
        metrics.messages_retried.inc();
        let delay = policy.delay_for(retry_count);
        warn!(
            subsystem = "jobs",
            component = "queue",
            article_id,
            retry_count,
            max_retries = policy.max_retries,
            delay_secs = delay.as_secs(),
            "Processing failed, scheduling retry"
        );
        MessageOutcome::Retry {
            article_id,
            next_retry_count: retry_count + 1,
            delay,
        }
    } else {
        metrics.messages_dead_lettered.inc();
        error!(
            subsystem = "jobs",
            component = "queue",
            article_id,
            retry_count,
            "Retry budget spent, message dead-lettered"
        );
        MessageOutcome::DeadLettered {
            article_id,
            retry_count,
        }
    }
}

fn unsettled(metrics: &QueueMetrics, article_id: Option<ArticleId>, err: Error) -> MessageOutcome {
    metrics.consume_errors.inc();
    error!(
        subsystem = "jobs",
        component = "queue",
        article_id = ?article_id,
        error = %err,
        "Delivery left unsettled"
    );
    MessageOutcome::Unsettled {
        article_id,
        error: err.to_string(),
    }
}
