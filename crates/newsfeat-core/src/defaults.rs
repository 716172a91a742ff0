//! Centralized default constants for the newsfeat pipeline.
//!
//! Every `from_env()` constructor in the workspace falls back to these values
//! when the corresponding environment variable is unset.

// =============================================================================
// DATABASE
// =============================================================================

/// Default PostgreSQL port when the URL is assembled from parts.
pub const DATABASE_PORT: u16 = 5432;

/// Minimum pooled connections kept open.
pub const DB_POOL_MIN_CONNECTIONS: u32 = 2;

/// Maximum pooled connections.
pub const DB_POOL_MAX_CONNECTIONS: u32 = 20;

/// Seconds to wait for a free pooled connection.
pub const DB_POOL_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Seconds before an idle pooled connection is closed.
pub const DB_POOL_IDLE_TIMEOUT_SECS: u64 = 600;

/// Maximum lifetime of a pooled connection in seconds.
pub const DB_POOL_MAX_LIFETIME_SECS: u64 = 1800;

/// Server-side statement timeout in seconds.
pub const DB_STATEMENT_TIMEOUT_SECS: u64 = 60;

/// Attempts for a retried store operation (first try included).
pub const DB_RETRY_ATTEMPTS: u32 = 3;

/// Upper bound on the exponential part of the store retry delay.
pub const DB_RETRY_MAX_DELAY_SECS: u64 = 8;

/// Exclusive upper bound of the random jitter added to each store retry.
pub const DB_RETRY_JITTER_MS: u64 = 250;

// =============================================================================
// ENRICHMENT (xAI Grok, OpenAI-compatible)
// =============================================================================

/// Default API base URL.
pub const XAI_BASE_URL: &str = "https://api.x.ai/v1";

/// Default chat model.
pub const XAI_MODEL: &str = "grok-4-fast-non-reasoning";

/// Maximum completion tokens per request.
pub const XAI_MAX_TOKENS: u32 = 2000;

/// Sampling temperature. Kept low for deterministic extraction.
pub const XAI_TEMPERATURE: f32 = 0.1;

/// Per-request timeout in seconds.
pub const XAI_TIMEOUT_SECS: u64 = 30;

/// Send+parse attempts per extraction.
pub const XAI_MAX_RETRIES: u32 = 3;

/// Base of the exponential backoff between enrichment attempts.
pub const XAI_BACKOFF_BASE_MS: u64 = 1000;

/// Maximum concurrent in-flight enrichment requests.
pub const XAI_MAX_CONCURRENT: usize = 10;

/// Idle keep-alive connections kept per host.
pub const XAI_MAX_IDLE_PER_HOST: usize = 5;

/// Enrichment requests allowed per rate-limit period.
pub const GROK_RATE_LIMIT_REQUESTS: u32 = 4;

/// Enrichment rate-limit period in seconds.
pub const GROK_RATE_LIMIT_PERIOD_SECS: u64 = 60;

/// Article body characters sent to the model.
pub const ARTICLE_CONTENT_MAX_CHARS: usize = 5000;

/// Raw response characters kept in a parse error.
pub const RAW_RESPONSE_PREVIEW_CHARS: usize = 5000;

/// Title placeholder when the article has none.
pub const EMPTY_TITLE_PLACEHOLDER: &str = "Baslik yok";

// =============================================================================
// QUEUE (AMQP)
// =============================================================================

/// Primary work queue name. The dead-letter queue is `<name>_dlq`.
pub const QUEUE_NAME: &str = "feature_extraction";

/// Suffix appended to the primary queue name for the dead-letter queue.
pub const DLQ_SUFFIX: &str = "_dlq";

/// In-flight cap per consumer.
pub const WORKER_PREFETCH_COUNT: u16 = 1;

/// Republish budget per work item.
pub const MAX_RETRY_COUNT: u32 = 3;

/// Base retry delay in seconds, doubled per retry.
pub const RETRY_DELAY_SECS: u64 = 60;

/// Publish rate-limit requests per period. Zero disables publish throttling.
pub const QUEUE_RATE_LIMIT_REQUESTS: u32 = 0;

/// Publish rate-limit period in seconds.
pub const QUEUE_RATE_LIMIT_PERIOD_SECS: u64 = 60;

/// AMQP heartbeat in seconds.
pub const AMQP_HEARTBEAT_SECS: u16 = 60;

/// AMQP connection timeout in seconds.
pub const AMQP_CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Delay between reconnection attempts in seconds.
pub const AMQP_RECONNECT_INTERVAL_SECS: u64 = 5;

/// Capacity of the per-message outcome broadcast channel.
pub const QUEUE_EVENT_CAPACITY: usize = 256;

// =============================================================================
// PIPELINE / SERVICE
// =============================================================================

/// Version tag stored with every extracted record.
pub const MODEL_VERSION: &str = "grok-beta";

/// HTTP bind host.
pub const SERVER_HOST: &str = "0.0.0.0";

/// HTTP bind port.
pub const SERVER_PORT: u16 = 8000;

/// Service name reported by the root endpoint.
pub const SERVICE_NAME: &str = "feature-extraction";
