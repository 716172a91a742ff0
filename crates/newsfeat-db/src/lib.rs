//! # newsfeat-db
//!
//! PostgreSQL store gateway for the newsfeat pipeline.
//!
//! This crate provides:
//! - A process-wide connection pool created once under an exclusive initializer
//! - Bounded retry with backoff and jitter for transient store failures
//! - Repositories for articles (`news`) and extracted features
//!
//! ## Example
//!
//! ```rust,ignore
//! use newsfeat_db::{Database, PoolConfig};
//! use newsfeat_core::ArticleRepository;
//!
//! let db = Database::connect("postgres://localhost/news", PoolConfig::default()).await?;
//! let article = db.articles.fetch_by_id(123).await?;
//! db.close().await;
//! ```

pub mod articles;
pub mod features;
pub mod pool;
pub mod retry;

#[cfg(test)]
pub mod test_fixtures;

use std::sync::Arc;

pub use articles::PgArticleRepository;
pub use features::PgFeatureRepository;
pub use pool::{
    create_pool_with_config, create_pool_with_options, log_pool_metrics, PoolCell, PoolConfig,
    SharedPool,
};
pub use sqlx::postgres::PgConnectOptions;
pub use retry::{is_transient, retry_transient, RetryPolicy};

#[cfg(feature = "migrations")]
use newsfeat_core::Error;
use newsfeat_core::Result;

/// Database bundle: the shared pool plus every repository built on it.
pub struct Database {
    /// The shared connection pool.
    pub pool: Arc<SharedPool>,
    /// Article reads and status updates.
    pub articles: Arc<PgArticleRepository>,
    /// Append-only feature storage.
    pub features: Arc<PgFeatureRepository>,
}

impl Database {
    /// Create a Database over a shared pool without connecting.
    pub fn new(pool: Arc<SharedPool>) -> Self {
        Self {
            articles: Arc::new(PgArticleRepository::new(pool.clone())),
            features: Arc::new(PgFeatureRepository::new(pool.clone())),
            pool,
        }
    }

    /// Create a Database and open the pool immediately.
    pub async fn connect(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = Arc::new(SharedPool::new(url, config));
        pool.get().await?;
        Ok(Self::new(pool))
    }

    /// Like [`Database::connect`], from connect options instead of a URL.
    pub async fn connect_with(options: PgConnectOptions, config: PoolConfig) -> Result<Self> {
        let pool = Arc::new(SharedPool::with_options(options, config));
        pool.get().await?;
        Ok(Self::new(pool))
    }

    /// Connect to test database (for integration tests).
    #[cfg(test)]
    pub async fn connect_test() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| crate::test_fixtures::DEFAULT_TEST_DATABASE_URL.to_string());
        Self::connect(&database_url, PoolConfig::default()).await
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        let pool = self.pool.get().await?;
        sqlx::migrate!("../../migrations")
            .run(pool.as_ref())
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Round-trip a trivial query. Used by the health report.
    pub async fn ping(&self) -> Result<()> {
        let pool = self.pool.get().await?;
        sqlx::query("SELECT 1").execute(pool.as_ref()).await?;
        log_pool_metrics(&pool);
        Ok(())
    }

    /// Close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
