//! Bounded retry with exponential backoff and jitter for store operations.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use newsfeat_core::defaults;

/// How store operations are retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first try included.
    pub max_attempts: u32,
    /// Cap on the exponential part of the delay.
    pub max_delay: Duration,
    /// Exclusive upper bound of the random jitter added to each delay.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::DB_RETRY_ATTEMPTS,
            max_delay: Duration::from_secs(defaults::DB_RETRY_MAX_DELAY_SECS),
            max_jitter: Duration::from_millis(defaults::DB_RETRY_JITTER_MS),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before the attempt following the zero-based `attempt`,
    /// without jitter: `min(max_delay, 2^attempt s)`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let secs = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.max_delay)
    }

    /// Backoff with jitter in `[0, max_jitter)` added.
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        };
        self.base_delay(attempt) + jitter
    }
}

/// Run `f` until it succeeds, fails with a non-transient error, or the
/// attempt budget is spent. Returns the last error on exhaustion.
pub async fn retry_transient<T, E, F, Fut>(
    policy: &RetryPolicy,
    op: &str,
    is_transient: fn(&E) -> bool,
    mut f: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if !is_transient(&e) => return Err(e),
            Err(e) if attempt + 1 >= policy.max_attempts => {
                error!(
                    subsystem = "database",
                    component = "retry",
                    op,
                    attempts = attempt + 1,
                    error = %e,
                    "All attempts failed"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_with_jitter(attempt);
                warn!(
                    subsystem = "database",
                    component = "retry",
                    op,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Whether a database error is worth retrying.
///
/// Transport failures, pool exhaustion, connection-class SQLSTATEs,
/// serialization failures, deadlocks, server shutdown and connection limits.
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|code| is_transient_sqlstate(&code)),
        _ => false,
    }
}

fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08")
        || matches!(code, "40001" | "40P01" | "57P01" | "57P02" | "57P03" | "53300")
}
