//! Grok (xAI) chat-completions client with a strict validation gate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, error, info, warn};

use newsfeat_core::defaults;
use newsfeat_core::{
    EnrichmentMetrics, EnrichmentMetricsSnapshot, Error, ExtractedFeatures, FailureKind,
    FeatureExtractor, RateLimiter, Result,
};

use super::error::GrokErrorCode;
use super::parse::decode_content;
use super::types::*;
use crate::prompt::{render_extraction_prompt, SYSTEM_PROMPT};
use crate::schema::validate_features;

/// Configuration for the Grok client.
#[derive(Debug, Clone)]
pub struct GrokConfig {
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// Chat model.
    pub model: String,
    /// Maximum completion tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Send+parse attempts per extraction.
    pub max_retries: u32,
    /// Backoff before retry `n` is `backoff_base * 2^n`.
    pub backoff_base: Duration,
    /// Requests allowed per `rate_limit_period`. Zero disables throttling.
    pub rate_limit_requests: u32,
    pub rate_limit_period: Duration,
    /// Maximum in-flight requests.
    pub max_concurrent: usize,
    /// Idle keep-alive connections kept per host.
    pub max_idle_per_host: usize,
}

impl GrokConfig {
    /// Configuration with defaults for everything but the key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: defaults::XAI_BASE_URL.to_string(),
            model: defaults::XAI_MODEL.to_string(),
            max_tokens: defaults::XAI_MAX_TOKENS,
            temperature: defaults::XAI_TEMPERATURE,
            timeout: Duration::from_secs(defaults::XAI_TIMEOUT_SECS),
            max_retries: defaults::XAI_MAX_RETRIES,
            backoff_base: Duration::from_millis(defaults::XAI_BACKOFF_BASE_MS),
            rate_limit_requests: defaults::GROK_RATE_LIMIT_REQUESTS,
            rate_limit_period: Duration::from_secs(defaults::GROK_RATE_LIMIT_PERIOD_SECS),
            max_concurrent: defaults::XAI_MAX_CONCURRENT,
            max_idle_per_host: defaults::XAI_MAX_IDLE_PER_HOST,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `XAI_API_KEY` | required |
    /// | `XAI_BASE_URL` | `https://api.x.ai/v1` |
    /// | `XAI_MODEL` | `grok-4-fast-non-reasoning` |
    /// | `XAI_MAX_TOKENS` | 2000 |
    /// | `XAI_TEMPERATURE` | 0.1 |
    /// | `XAI_TIMEOUT` | 30 (seconds) |
    /// | `XAI_MAX_RETRIES` | 3 |
    /// | `GROK_RATE_LIMIT_REQUESTS` | 4 |
    /// | `GROK_RATE_LIMIT_PERIOD` | 60 (seconds) |
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("XAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("XAI_API_KEY is not set".to_string()))?;

        let mut config = Self::new(api_key);
        if let Ok(url) = std::env::var("XAI_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = std::env::var("XAI_MODEL") {
            config.model = model;
        }
        config.max_tokens = env_parse("XAI_MAX_TOKENS").unwrap_or(config.max_tokens);
        config.temperature = env_parse("XAI_TEMPERATURE").unwrap_or(config.temperature);
        if let Some(secs) = env_parse::<u64>("XAI_TIMEOUT") {
            config.timeout = Duration::from_secs(secs);
        }
        config.max_retries = env_parse("XAI_MAX_RETRIES").unwrap_or(config.max_retries);
        config.rate_limit_requests =
            env_parse("GROK_RATE_LIMIT_REQUESTS").unwrap_or(config.rate_limit_requests);
        if let Some(secs) = env_parse::<u64>("GROK_RATE_LIMIT_PERIOD") {
            config.rate_limit_period = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Client for the xAI chat-completions endpoint.
///
/// The HTTP client is created lazily by [`GrokClient::connect`] (or the first
/// extraction) and dropped by [`GrokClient::disconnect`].
pub struct GrokClient {
    config: GrokConfig,
    http: RwLock<Option<Client>>,
    permits: Semaphore,
    limiter: RateLimiter,
    metrics: Arc<EnrichmentMetrics>,
}

impl GrokClient {
    /// Create a client with its own counter set.
    pub fn new(config: GrokConfig) -> Self {
        Self::with_metrics(config, Arc::new(EnrichmentMetrics::new()))
    }

    /// Create a client that reports into an existing counter set.
    pub fn with_metrics(config: GrokConfig, metrics: Arc<EnrichmentMetrics>) -> Self {
        let limiter = RateLimiter::new(config.rate_limit_requests, config.rate_limit_period);
        Self {
            permits: Semaphore::new(config.max_concurrent.max(1)),
            limiter,
            metrics,
            http: RwLock::new(None),
            config,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(GrokConfig::from_env()?))
    }

    pub fn config(&self) -> &GrokConfig {
        &self.config
    }

    /// Counter set shared with whoever reports on it.
    pub fn metrics_handle(&self) -> Arc<EnrichmentMetrics> {
        self.metrics.clone()
    }

    pub fn metrics(&self) -> EnrichmentMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Build the pooled HTTP client if it does not exist yet.
    pub async fn connect(&self) -> Result<()> {
        let mut http = self.http.write().await;
        if http.is_some() {
            return Ok(());
        }

        let client = Client::builder()
            .timeout(self.config.timeout)
            .pool_max_idle_per_host(self.config.max_idle_per_host)
            .build()
            .map_err(|e| Error::Connection(format!("failed to create HTTP client: {}", e)))?;
        *http = Some(client);

        info!(
            subsystem = "inference",
            component = "grok",
            op = "connect",
            base_url = %self.config.base_url,
            model = %self.config.model,
            timeout_secs = self.config.timeout.as_secs(),
            "HTTP client started"
        );
        Ok(())
    }

    /// Drop the HTTP client. Idempotent.
    pub async fn disconnect(&self) {
        if self.http.write().await.take().is_some() {
            info!(
                subsystem = "inference",
                component = "grok",
                op = "disconnect",
                "HTTP client closed"
            );
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.http.read().await.is_some()
    }

    async fn client(&self) -> Result<Client> {
        if let Some(client) = self.http.read().await.as_ref() {
            return Ok(client.clone());
        }
        self.connect().await?;
        self.http
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::Connection("HTTP client closed during connect".to_string()))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.config
            .backoff_base
            .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
    }

    /// One request: send, check status, decode, validate.
    async fn send_request(&self, http: &Client, text: &str, title: &str) -> Result<ExtractedFeatures> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Internal("request semaphore closed".to_string()))?;

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(render_extraction_prompt(title, text)),
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat::json_object(),
        };

        self.metrics.requests_sent.inc();
        let start = Instant::now();

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let code = GrokErrorCode::from_status(status.as_u16());
            return Err(code.into_error(status.as_u16(), &body));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("response body is not valid JSON: {}", e)))?;

        if let Some(usage) = &parsed.usage {
            self.metrics.total_tokens_used.add(usage.total_tokens);
            debug!(
                subsystem = "inference",
                component = "grok",
                tokens = usage.total_tokens,
                total_tokens = self.metrics.total_tokens_used.get(),
                "Token usage"
            );
        }

        let content = parsed
            .choices
            .and_then(|choices| choices.into_iter().next())
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::Parse("response has no 'choices'".to_string()))?;

        let decoded = match decode_content(&content) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.metrics.parse_errors.inc();
                return Err(e);
            }
        };
        if decoded.recovered_from_fence {
            self.metrics.parse_errors.inc();
            warn!(
                subsystem = "inference",
                component = "grok",
                "Response was wrapped in a code fence"
            );
        }

        let features = validate_features(&decoded.value)?;

        debug!(
            subsystem = "inference",
            component = "grok",
            duration_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
        Ok(features)
    }
}

/// HTTP status failures follow the Grok status classification; everything
/// else goes by failure kind.
fn is_retryable(err: &Error) -> bool {
    match err {
        Error::Api { status, .. } => GrokErrorCode::from_status(*status).is_retryable(),
        _ => matches!(err.kind(), FailureKind::TransientApi | FailureKind::Connection),
    }
}

#[async_trait]
impl FeatureExtractor for GrokClient {
    async fn extract_features(&self, text: &str, title: &str) -> Result<ExtractedFeatures> {
        let http = self.client().await?;

        if self.limiter.acquire().await.is_some() {
            self.metrics.rate_limit_hits.inc();
        }

        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 1;
        loop {
            info!(
                subsystem = "inference",
                component = "grok",
                op = "extract_features",
                attempt,
                max_attempts,
                "Feature extraction started"
            );

            match self.send_request(&http, text, title).await {
                Ok(features) => {
                    self.metrics.requests_success.inc();
                    info!(
                        subsystem = "inference",
                        component = "grok",
                        op = "extract_features",
                        attempt,
                        "Feature extraction completed"
                    );
                    return Ok(features);
                }
                Err(e) => {
                    self.metrics.requests_failed.inc();

                    if !is_retryable(&e) {
                        error!(
                            subsystem = "inference",
                            component = "grok",
                            failure = e.kind().as_str(),
                            error = %e,
                            "Non-retryable enrichment failure"
                        );
                        return Err(e);
                    }
                    if attempt >= max_attempts {
                        error!(
                            subsystem = "inference",
                            component = "grok",
                            attempts = attempt,
                            error = %e,
                            "Enrichment retries exhausted"
                        );
                        return Err(e);
                    }

                    let wait = self.backoff(attempt);
                    warn!(
                        subsystem = "inference",
                        component = "grok",
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Retrying enrichment request"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
