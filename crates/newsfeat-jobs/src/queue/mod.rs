//! AMQP work queue with dead-lettering and delayed retries.
//!
//! Topology: a durable primary queue whose rejected messages are routed
//! through the default exchange to `<queue>_dlq`. Work items are published
//! persistently with publisher confirms. Deliveries are settled by
//! [`delivery::process_delivery`]; failures below the retry budget are
//! republished with an incremented `retry_count` by a [`RetryScheduler`].

pub mod delivery;
pub mod message;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ConfirmSelectOptions,
    QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::uri::AMQPUri;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use newsfeat_core::defaults;
use newsfeat_core::{
    ArticleId, Error, QueueMetrics, QueueMetricsSnapshot, RateLimiter, Result, WorkHandler,
    WorkItem, WorkPublisher,
};

pub use delivery::{process_delivery, Acknowledger, MessageOutcome, RedeliveryPolicy};
pub use retry::RetryScheduler;

/// Configuration for the queue manager.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// AMQP connection URI.
    pub url: String,
    /// Primary queue name. The dead-letter queue is derived from it.
    pub queue_name: String,
    /// Maximum unacknowledged deliveries in flight.
    pub prefetch_count: u16,
    /// Highest retry count that is still republished from.
    pub max_retry_count: u32,
    /// Base delay before a republish.
    pub retry_delay: Duration,
    /// Publishes allowed per `rate_limit_period`. Zero disables throttling.
    pub rate_limit_requests: u32,
    pub rate_limit_period: Duration,
    /// Broker heartbeat interval in seconds.
    pub heartbeat: u16,
    pub connection_timeout: Duration,
    /// Pause between reconnection attempts.
    pub reconnect_interval: Duration,
}

impl QueueConfig {
    /// Configuration with defaults for everything but the URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            queue_name: defaults::QUEUE_NAME.to_string(),
            prefetch_count: defaults::WORKER_PREFETCH_COUNT,
            max_retry_count: defaults::MAX_RETRY_COUNT,
            retry_delay: Duration::from_secs(defaults::RETRY_DELAY_SECS),
            rate_limit_requests: defaults::QUEUE_RATE_LIMIT_REQUESTS,
            rate_limit_period: Duration::from_secs(defaults::QUEUE_RATE_LIMIT_PERIOD_SECS),
            heartbeat: defaults::AMQP_HEARTBEAT_SECS,
            connection_timeout: Duration::from_secs(defaults::AMQP_CONNECTION_TIMEOUT_SECS),
            reconnect_interval: Duration::from_secs(defaults::AMQP_RECONNECT_INTERVAL_SECS),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `RABBITMQ_URL` | required |
    /// | `RABBITMQ_QUEUE_NAME` | `feature_extraction` |
    /// | `WORKER_PREFETCH_COUNT` | 1 |
    /// | `MAX_RETRY_COUNT` | 3 |
    /// | `RETRY_DELAY` | 60 (seconds) |
    /// | `RABBITMQ_RATE_LIMIT_REQUESTS` | 0 (disabled) |
    /// | `RABBITMQ_RATE_LIMIT_PERIOD` | 60 (seconds) |
    /// | `RABBITMQ_HEARTBEAT` | 60 (seconds) |
    /// | `RABBITMQ_CONNECTION_TIMEOUT` | 30 (seconds) |
    /// | `RABBITMQ_RECONNECT_INTERVAL` | 5 (seconds) |
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("RABBITMQ_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::Config("RABBITMQ_URL is not set".to_string()))?;

        let mut config = Self::new(url);
        if let Ok(name) = std::env::var("RABBITMQ_QUEUE_NAME") {
            if !name.is_empty() {
                config.queue_name = name;
            }
        }
        config.prefetch_count = env_parse::<u16>("WORKER_PREFETCH_COUNT")
            .unwrap_or(config.prefetch_count)
            .max(1);
        config.max_retry_count = env_parse("MAX_RETRY_COUNT").unwrap_or(config.max_retry_count);
        if let Some(secs) = env_parse::<u64>("RETRY_DELAY") {
            config.retry_delay = Duration::from_secs(secs);
        }
        config.rate_limit_requests =
            env_parse("RABBITMQ_RATE_LIMIT_REQUESTS").unwrap_or(config.rate_limit_requests);
        if let Some(secs) = env_parse::<u64>("RABBITMQ_RATE_LIMIT_PERIOD") {
            config.rate_limit_period = Duration::from_secs(secs);
        }
        config.heartbeat = env_parse("RABBITMQ_HEARTBEAT").unwrap_or(config.heartbeat);
        if let Some(secs) = env_parse::<u64>("RABBITMQ_CONNECTION_TIMEOUT") {
            config.connection_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("RABBITMQ_RECONNECT_INTERVAL") {
            config.reconnect_interval = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Name of the dead-letter queue.
    pub fn dlq_name(&self) -> String {
        format!("{}{}", self.queue_name, defaults::DLQ_SUFFIX)
    }

    pub fn redelivery_policy(&self) -> RedeliveryPolicy {
        RedeliveryPolicy::new(self.max_retry_count, self.retry_delay)
    }

    /// Arguments routing rejected messages of the primary queue to the DLQ.
    fn primary_queue_arguments(&self) -> FieldTable {
        let mut args = FieldTable::default();
        args.insert(
            ShortString::from("x-dead-letter-exchange"),
            AMQPValue::LongString(LongString::from("")),
        );
        args.insert(
            ShortString::from("x-dead-letter-routing-key"),
            AMQPValue::LongString(LongString::from(self.dlq_name())),
        );
        args
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

struct Link {
    connection: Connection,
    channel: Channel,
}

/// Durable work queue on an AMQP 0-9-1 broker.
pub struct QueueManager {
    config: QueueConfig,
    link: RwLock<Option<Link>>,
    limiter: RateLimiter,
    metrics: Arc<QueueMetrics>,
    events: broadcast::Sender<MessageOutcome>,
}

impl QueueManager {
    /// Create a manager with its own counter set. Does not connect.
    pub fn new(config: QueueConfig) -> Self {
        Self::with_metrics(config, Arc::new(QueueMetrics::new()))
    }

    /// Create a manager that reports into an existing counter set.
    pub fn with_metrics(config: QueueConfig, metrics: Arc<QueueMetrics>) -> Self {
        let limiter = RateLimiter::new(config.rate_limit_requests, config.rate_limit_period);
        let (events, _) = broadcast::channel(defaults::QUEUE_EVENT_CAPACITY);
        Self {
            config,
            link: RwLock::new(None),
            limiter,
            metrics,
            events,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Open the connection and channel, then declare the topology.
    pub async fn connect(&self) -> Result<()> {
        let mut uri: AMQPUri = self
            .config
            .url
            .parse()
            .map_err(|e: String| Error::Config(format!("invalid RABBITMQ_URL: {}", e)))?;
        uri.query.heartbeat = Some(self.config.heartbeat);
        uri.query.connection_timeout = Some(self.config.connection_timeout.as_millis() as u64);

        let connection = Connection::connect_uri(uri, ConnectionProperties::default())
            .await
            .map_err(|e| Error::Connection(format!("broker connection failed: {}", e)))?;

        connection.on_error(|err| {
            error!(
                subsystem = "jobs",
                component = "queue",
                error = %err,
                "Broker connection error"
            );
        });

        let channel = match self.open_channel(&connection).await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = connection.close(200, "Bye").await;
                return Err(e);
            }
        };

        *self.link.write().await = Some(Link {
            connection,
            channel,
        });

        info!(
            subsystem = "jobs",
            component = "queue",
            op = "connect",
            queue = %self.config.queue_name,
            dlq = %self.config.dlq_name(),
            prefetch = self.config.prefetch_count,
            "Connected to broker"
        );
        Ok(())
    }

    async fn open_channel(&self, connection: &Connection) -> Result<Channel> {
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| Error::Connection(format!("channel open failed: {}", e)))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| Error::Queue(format!("confirm mode failed: {}", e)))?;
        channel
            .basic_qos(self.config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| Error::Queue(format!("prefetch setup failed: {}", e)))?;

        let durable = QueueDeclareOptions {
            durable: true,
            exclusive: false,
            auto_delete: false,
            ..QueueDeclareOptions::default()
        };
        channel
            .queue_declare(&self.config.dlq_name(), durable, FieldTable::default())
            .await
            .map_err(|e| Error::Queue(format!("dead-letter queue declare failed: {}", e)))?;
        channel
            .queue_declare(
                &self.config.queue_name,
                durable,
                self.config.primary_queue_arguments(),
            )
            .await
            .map_err(|e| Error::Queue(format!("queue declare failed: {}", e)))?;

        Ok(channel)
    }

    /// Close channel and connection. Never fails.
    pub async fn disconnect(&self) {
        let Some(link) = self.link.write().await.take() else {
            return;
        };

        if let Err(e) = link.channel.close(200, "Bye").await {
            warn!(
                subsystem = "jobs",
                component = "queue",
                error = %e,
                "Error closing channel"
            );
        }
        if let Err(e) = link.connection.close(200, "Bye").await {
            warn!(
                subsystem = "jobs",
                component = "queue",
                error = %e,
                "Error closing connection"
            );
        }
        info!(
            subsystem = "jobs",
            component = "queue",
            op = "disconnect",
            "Disconnected from broker"
        );
    }

    pub async fn is_connected(&self) -> bool {
        self.link
            .read()
            .await
            .as_ref()
            .map(|link| link.connection.status().connected())
            .unwrap_or(false)
    }

    /// Counter snapshot including the connection state.
    pub async fn metrics(&self) -> QueueMetricsSnapshot {
        self.metrics.snapshot(self.is_connected().await)
    }

    pub fn metrics_handle(&self) -> Arc<QueueMetrics> {
        self.metrics.clone()
    }

    /// Subscribe to per-delivery outcomes.
    pub fn events(&self) -> broadcast::Receiver<MessageOutcome> {
        self.events.subscribe()
    }

    async fn channel(&self) -> Option<Channel> {
        self.link
            .read()
            .await
            .as_ref()
            .filter(|link| link.channel.status().connected())
            .map(|link| link.channel.clone())
    }

    async fn try_publish(&self, article_id: ArticleId, retry_count: u32) -> Result<()> {
        let channel = self
            .channel()
            .await
            .ok_or_else(|| Error::Publish("not connected to broker".to_string()))?;

        if self.limiter.acquire().await.is_some() {
            self.metrics.rate_limit_hits.inc();
        }

        let item = WorkItem::new(article_id, retry_count);
        let payload = message::encode(&item)?;
        let properties = BasicProperties::default()
            .with_delivery_mode(message::PERSISTENT)
            .with_content_type(ShortString::from(message::CONTENT_TYPE))
            .with_headers(message::headers(&item));

        let confirmation = channel
            .basic_publish(
                "",
                &self.config.queue_name,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| Error::Publish(e.to_string()))?
            .await
            .map_err(|e| Error::Publish(e.to_string()))?;

        if confirmation.is_nack() {
            return Err(Error::Publish("broker refused the message".to_string()));
        }
        Ok(())
    }

    /// Consume until `cancel` fires.
    ///
    /// Lost connections are re-established every `reconnect_interval`. A
    /// delivery being handled is always settled before cancellation is
    /// observed. Pending republishes are aborted on return.
    pub async fn consume(
        self: &Arc<Self>,
        handler: Arc<dyn WorkHandler>,
        cancel: CancellationToken,
    ) -> Result<()> {
        if !self.is_connected().await {
            return Err(Error::Queue("consumer started without a connection".to_string()));
        }

        let publisher: Arc<dyn WorkPublisher> = self.clone();
        let scheduler = RetryScheduler::new(publisher, cancel.child_token());

        info!(
            subsystem = "jobs",
            component = "queue",
            op = "consume",
            queue = %self.config.queue_name,
            "Consumer started"
        );

        loop {
            match self.consume_until_lost(handler.as_ref(), &scheduler, &cancel).await {
                Ok(()) => break,
                Err(e) => {
                    warn!(
                        subsystem = "jobs",
                        component = "queue",
                        error = %e,
                        "Consumer lost its connection"
                    );
                    if !self.reconnect(&cancel).await {
                        break;
                    }
                }
            }
        }

        scheduler.shutdown();
        info!(
            subsystem = "jobs",
            component = "queue",
            op = "consume",
            "Consumer stopped"
        );
        Ok(())
    }

    /// Returns `Ok` on cancellation and `Err` when the delivery stream ends.
    async fn consume_until_lost(
        &self,
        handler: &dyn WorkHandler,
        scheduler: &RetryScheduler,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let channel = self
            .channel()
            .await
            .ok_or_else(|| Error::Queue("channel closed".to_string()))?;

        let tag = format!("{}-{}", defaults::SERVICE_NAME, uuid::Uuid::new_v4());
        let mut consumer = channel
            .basic_consume(
                &self.config.queue_name,
                &tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Queue(format!("basic.consume failed: {}", e)))?;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                next = consumer.next() => match next {
                    Some(Ok(delivery)) => {
                        self.handle_message(delivery, handler, scheduler).await;
                    }
                    Some(Err(e)) => {
                        self.metrics.consume_errors.inc();
                        return Err(Error::Queue(format!("delivery stream failed: {}", e)));
                    }
                    None => return Err(Error::Queue("delivery stream ended".to_string())),
                },
            }
        }
    }

    /// Reconnect until it succeeds. Returns `false` if cancelled first.
    async fn reconnect(&self, cancel: &CancellationToken) -> bool {
        self.disconnect().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.config.reconnect_interval) => {}
            }

            match self.connect().await {
                Ok(()) => {
                    self.metrics.reconnections.inc();
                    info!(
                        subsystem = "jobs",
                        component = "queue",
                        reconnections = self.metrics.reconnections.get(),
                        "Reconnected to broker"
                    );
                    return true;
                }
                Err(e) => warn!(
                    subsystem = "jobs",
                    component = "queue",
                    error = %e,
                    retry_in_secs = self.config.reconnect_interval.as_secs(),
                    "Reconnect attempt failed"
                ),
            }
        }
    }

    /// Settle one delivery and schedule its retry if needed.
    pub async fn handle_message(
        &self,
        delivery: Delivery,
        handler: &dyn WorkHandler,
        scheduler: &RetryScheduler,
    ) -> MessageOutcome {
        let policy = self.config.redelivery_policy();
        let outcome =
            process_delivery(&delivery.data, &delivery.acker, handler, &policy, &self.metrics)
                .await;

        if let MessageOutcome::Retry {
            article_id,
            next_retry_count,
            delay,
        } = &outcome
        {
            scheduler.schedule(*article_id, *next_retry_count, *delay);
        }

        let _ = self.events.send(outcome.clone());
        outcome
    }
}

#[async_trait]
impl WorkPublisher for QueueManager {
    async fn publish(&self, article_id: ArticleId, retry_count: u32) -> Result<()> {
        match self.try_publish(article_id, retry_count).await {
            Ok(()) => {
                self.metrics.messages_published.inc();
                debug!(
                    subsystem = "jobs",
                    component = "queue",
                    op = "publish",
                    article_id,
                    retry_count,
                    "Message published"
                );
                Ok(())
            }
            Err(e) => {
                self.metrics.publish_errors.inc();
                error!(
                    subsystem = "jobs",
                    component = "queue",
                    op = "publish",
                    article_id,
                    retry_count,
                    error = %e,
                    "Publish failed"
                );
                Err(e)
            }
        }
    }
}

/// Result of publishing several articles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub queued: usize,
    pub failed: usize,
    pub failed_ids: Vec<ArticleId>,
}

/// Publish each id with `retry_count = 0`, continuing past failures.
pub async fn publish_batch(publisher: &dyn WorkPublisher, article_ids: &[ArticleId]) -> BatchReport {
    let mut report = BatchReport::default();
    for &article_id in article_ids {
        match publisher.publish(article_id, 0).await {
            Ok(()) => report.queued += 1,
            Err(_) => {
                report.failed += 1;
                report.failed_ids.push(article_id);
            }
        }
    }
    info!(
        subsystem = "jobs",
        component = "queue",
        op = "publish_batch",
        queued = report.queued,
        failed = report.failed,
        "Batch published"
    );
    report
}
