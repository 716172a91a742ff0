//! Operational counters.
//!
//! Counter sets are plain owned objects handed around as `Arc`s. There is no
//! process-global registry; a restart (or `reset()` in tests) starts from zero.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

// =============================================================================
// QUEUE
// =============================================================================

/// Counters maintained by the queue manager.
#[derive(Debug, Default)]
pub struct QueueMetrics {
    pub messages_published: Counter,
    pub messages_consumed: Counter,
    pub publish_errors: Counter,
    pub consume_errors: Counter,
    pub reconnections: Counter,
    pub rate_limit_hits: Counter,
    pub messages_retried: Counter,
    pub messages_dead_lettered: Counter,
    pub parse_errors: Counter,
}

/// Point-in-time view of [`QueueMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueMetricsSnapshot {
    pub messages_published: u64,
    pub messages_consumed: u64,
    pub publish_errors: u64,
    pub consume_errors: u64,
    pub reconnections: u64,
    pub rate_limit_hits: u64,
    pub messages_retried: u64,
    pub messages_dead_lettered: u64,
    pub parse_errors: u64,
    pub connected: bool,
    pub timestamp: DateTime<Utc>,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the counters. `connected` is supplied by the owner.
    pub fn snapshot(&self, connected: bool) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            messages_published: self.messages_published.get(),
            messages_consumed: self.messages_consumed.get(),
            publish_errors: self.publish_errors.get(),
            consume_errors: self.consume_errors.get(),
            reconnections: self.reconnections.get(),
            rate_limit_hits: self.rate_limit_hits.get(),
            messages_retried: self.messages_retried.get(),
            messages_dead_lettered: self.messages_dead_lettered.get(),
            parse_errors: self.parse_errors.get(),
            connected,
            timestamp: Utc::now(),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.messages_published,
            &self.messages_consumed,
            &self.publish_errors,
            &self.consume_errors,
            &self.reconnections,
            &self.rate_limit_hits,
            &self.messages_retried,
            &self.messages_dead_lettered,
            &self.parse_errors,
        ] {
            counter.reset();
        }
    }
}

// =============================================================================
// ENRICHMENT
// =============================================================================

/// Counters maintained by the enrichment client.
#[derive(Debug, Default)]
pub struct EnrichmentMetrics {
    pub requests_sent: Counter,
    pub requests_success: Counter,
    pub requests_failed: Counter,
    pub rate_limit_hits: Counter,
    pub parse_errors: Counter,
    pub total_tokens_used: Counter,
}

/// Point-in-time view of [`EnrichmentMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentMetricsSnapshot {
    pub requests_sent: u64,
    pub requests_success: u64,
    pub requests_failed: u64,
    pub rate_limit_hits: u64,
    pub parse_errors: u64,
    pub total_tokens_used: u64,
    pub timestamp: DateTime<Utc>,
}

impl EnrichmentMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> EnrichmentMetricsSnapshot {
        EnrichmentMetricsSnapshot {
            requests_sent: self.requests_sent.get(),
            requests_success: self.requests_success.get(),
            requests_failed: self.requests_failed.get(),
            rate_limit_hits: self.rate_limit_hits.get(),
            parse_errors: self.parse_errors.get(),
            total_tokens_used: self.total_tokens_used.get(),
            timestamp: Utc::now(),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.requests_sent,
            &self.requests_success,
            &self.requests_failed,
            &self.rate_limit_hits,
            &self.parse_errors,
            &self.total_tokens_used,
        ] {
            counter.reset();
        }
    }
}
