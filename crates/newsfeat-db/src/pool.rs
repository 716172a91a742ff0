//! Database connection pool management.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use newsfeat_core::defaults;
use newsfeat_core::{Error, Result};

/// Pool configuration options.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to maintain.
    pub min_connections: u32,
    /// Time to wait for a free connection.
    pub acquire_timeout: Duration,
    /// Idle connection timeout duration.
    pub idle_timeout: Duration,
    /// Maximum connection lifetime.
    pub max_lifetime: Option<Duration>,
    /// Server-side statement timeout applied to every session.
    pub statement_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::DB_POOL_MAX_CONNECTIONS,
            min_connections: defaults::DB_POOL_MIN_CONNECTIONS,
            acquire_timeout: Duration::from_secs(defaults::DB_POOL_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(defaults::DB_POOL_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(defaults::DB_POOL_MAX_LIFETIME_SECS)),
            statement_timeout: Duration::from_secs(defaults::DB_STATEMENT_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from the environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DATABASE_MAX_CONNECTIONS` | 20 |
    /// | `DATABASE_MIN_CONNECTIONS` | 2 |
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.max_connections = n;
        }
        if let Some(n) = std::env::var("DATABASE_MIN_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.min_connections = n;
        }
        config
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the minimum number of connections.
    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    /// Set the acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the statement timeout.
    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }
}

/// Create a new PostgreSQL connection pool with custom configuration.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let connect_options = PgConnectOptions::from_str(database_url)
        .map_err(|e| Error::Config(format!("invalid DATABASE_URL: {}", e)))?;
    create_pool_with_options(connect_options, config).await
}

/// Create a pool from already-built connect options.
pub async fn create_pool_with_options(
    connect_options: PgConnectOptions,
    config: PoolConfig,
) -> Result<PgPool> {
    let start = Instant::now();

    info!(
        subsystem = "database",
        component = "pool",
        op = "create",
        host = connect_options.get_host(),
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        statement_timeout_secs = config.statement_timeout.as_secs(),
        "Creating database connection pool"
    );

    let statement_timeout_ms = config.statement_timeout.as_millis().to_string();
    let connect_options =
        connect_options.options([("statement_timeout", statement_timeout_ms.as_str())]);

    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout);

    if let Some(max_lifetime) = config.max_lifetime {
        options = options.max_lifetime(max_lifetime);
    }

    let pool = options
        .connect_with(connect_options)
        .await
        .map_err(|e| Error::Connection(format!("database unreachable: {}", e)))?;

    info!(
        subsystem = "database",
        component = "pool",
        op = "established",
        pool_size = pool.size(),
        pool_idle = pool.num_idle(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
    Ok(pool)
}

/// Log current pool health metrics.
///
/// Warns if idle connections drop to zero (potential exhaustion).
pub fn log_pool_metrics(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle();

    debug!(
        subsystem = "database",
        component = "pool",
        op = "metrics",
        pool_size = size,
        pool_idle = idle,
        "Pool health check"
    );

    if idle == 0 && size > 0 {
        warn!(
            subsystem = "database",
            component = "pool",
            pool_size = size,
            "Connection pool has no idle connections"
        );
    }
}

// =============================================================================
// SINGLETON CELL
// =============================================================================

/// Process-wide slot holding at most one shared resource.
///
/// Readers take the shared lock and clone the `Arc`. Initialization happens
/// under the exclusive lock with a re-check, so concurrent first callers all
/// observe the single instance built by whichever got the lock first. A
/// failed initializer leaves the slot empty for the next caller.
pub struct PoolCell<P> {
    slot: RwLock<Option<Arc<P>>>,
}

impl<P> Default for PoolCell<P> {
    fn default() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }
}

impl<P> PoolCell<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current instance, if initialized.
    pub async fn get(&self) -> Option<Arc<P>> {
        self.slot.read().await.clone()
    }

    /// Return the instance, creating it with `init` if the slot is empty.
    pub async fn get_or_try_init<F, Fut, E>(&self, init: F) -> std::result::Result<Arc<P>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<P, E>>,
    {
        if let Some(existing) = self.slot.read().await.as_ref() {
            return Ok(existing.clone());
        }

        let mut slot = self.slot.write().await;
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }

        let created = Arc::new(init().await?);
        *slot = Some(created.clone());
        Ok(created)
    }

    /// Remove and return the instance, leaving the slot empty.
    pub async fn take(&self) -> Option<Arc<P>> {
        self.slot.write().await.take()
    }
}

/// Where a [`SharedPool`] connects to.
#[derive(Debug, Clone)]
enum ConnectTarget {
    Url(String),
    Options(PgConnectOptions),
}

/// Lazily created PostgreSQL pool shared by every repository in the process.
pub struct SharedPool {
    target: ConnectTarget,
    config: PoolConfig,
    cell: PoolCell<PgPool>,
}

impl SharedPool {
    pub fn new(database_url: impl Into<String>, config: PoolConfig) -> Self {
        Self::with_target(ConnectTarget::Url(database_url.into()), config)
    }

    /// Pool over connect options assembled field by field.
    pub fn with_options(options: PgConnectOptions, config: PoolConfig) -> Self {
        Self::with_target(ConnectTarget::Options(options), config)
    }

    fn with_target(target: ConnectTarget, config: PoolConfig) -> Self {
        Self {
            target,
            config,
            cell: PoolCell::new(),
        }
    }

    /// Get the pool, connecting on first use.
    pub async fn get(&self) -> Result<Arc<PgPool>> {
        let target = &self.target;
        let config = self.config.clone();
        self.cell
            .get_or_try_init(move || async move {
                match target {
                    ConnectTarget::Url(url) => create_pool_with_config(url, config).await,
                    ConnectTarget::Options(options) => {
                        create_pool_with_options(options.clone(), config).await
                    }
                }
            })
            .await
    }

    /// Whether the pool has been created and not yet closed.
    pub async fn is_initialized(&self) -> bool {
        self.cell.get().await.is_some()
    }

    /// Close the pool. A later `get()` reconnects.
    pub async fn close(&self) {
        if let Some(pool) = self.cell.take().await {
            pool.close().await;
            info!(
                subsystem = "database",
                component = "pool",
                op = "close",
                "Database connection pool closed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.statement_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::new()
            .max_connections(5)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(3))
            .statement_timeout(Duration::from_secs(10));

        assert_eq!(config.max_connections, 5);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.acquire_timeout, Duration::from_secs(3));
        assert_eq!(config.statement_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_concurrent_initializers_observe_one_instance() {
        let cell = Arc::new(PoolCell::<String>::new());
        let inits = Arc::new(AtomicUsize::new(0));

        let spawn_init = |cell: Arc<PoolCell<String>>, inits: Arc<AtomicUsize>| {
            tokio::spawn(async move {
                cell.get_or_try_init(move || async move {
                    inits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<_, Error>("pool".to_string())
                })
                .await
                .unwrap()
            })
        };

        let a = spawn_init(cell.clone(), inits.clone());
        let b = spawn_init(cell.clone(), inits.clone());
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(inits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_init_leaves_cell_empty() {
        let cell = PoolCell::<u32>::new();
        let err = cell
            .get_or_try_init(|| async { Err::<u32, _>(Error::Connection("refused".into())) })
            .await;
        assert!(err.is_err());
        assert!(cell.get().await.is_none());

        let value = cell
            .get_or_try_init(|| async { Ok::<_, Error>(7) })
            .await
            .unwrap();
        assert_eq!(*value, 7);
    }

    #[tokio::test]
    async fn test_take_clears_cell() {
        let cell = PoolCell::<u32>::new();
        let first = cell
            .get_or_try_init(|| async { Ok::<_, Error>(1) })
            .await
            .unwrap();
        let taken = cell.take().await.unwrap();
        assert!(Arc::ptr_eq(&first, &taken));
        assert!(cell.get().await.is_none());
    }

    #[tokio::test]
    async fn test_shared_pool_rejects_invalid_url() {
        let shared = SharedPool::new("not a url", PoolConfig::default());
        let err = shared.get().await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!shared.is_initialized().await);
    }

    #[tokio::test]
    async fn test_shared_pool_from_options_reports_unreachable_server() {
        let options = PgConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .username("app")
            .password("p@ss/w:rd")
            .database("news");
        let config = PoolConfig::new()
            .min_connections(0)
            .acquire_timeout(Duration::from_millis(500));
        let shared = SharedPool::with_options(options, config);

        let err = shared.get().await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)), "{:?}", err);
        assert!(!shared.is_initialized().await);
    }
}
