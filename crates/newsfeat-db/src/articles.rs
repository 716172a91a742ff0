//! Article repository implementation.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::Row;
use tracing::{debug, warn};

use newsfeat_core::{Article, ArticleId, ArticleRepository, ArticleStatus, Error, Result};

use crate::pool::SharedPool;
use crate::retry::{is_transient, retry_transient, RetryPolicy};

/// PostgreSQL implementation of ArticleRepository over the `news` table.
pub struct PgArticleRepository {
    pool: Arc<SharedPool>,
    retry: RetryPolicy,
}

impl PgArticleRepository {
    pub fn new(pool: Arc<SharedPool>) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy (tests use a policy without retries).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl ArticleRepository for PgArticleRepository {
    async fn fetch_by_id(&self, id: ArticleId) -> Result<Option<Article>> {
        let pool = self.pool.get().await?;

        let row = retry_transient(&self.retry, "fetch_article", is_transient, || {
            sqlx::query(
                r#"
                SELECT id, title, content, source, published_date
                FROM news
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(pool.as_ref())
        })
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            warn!(
                subsystem = "database",
                component = "articles",
                article_id = id,
                "Article not found"
            );
            return Ok(None);
        };

        let article = Article {
            id: row.get("id"),
            title: row.get::<Option<String>, _>("title").unwrap_or_default(),
            content: row.get::<Option<String>, _>("content").unwrap_or_default(),
            source: row.get("source"),
            published_date: row.get("published_date"),
        };

        debug!(
            subsystem = "database",
            component = "articles",
            article_id = id,
            source = article.source.as_deref().unwrap_or(""),
            "Article fetched"
        );
        Ok(Some(article))
    }

    async fn update_status(&self, id: ArticleId, status: ArticleStatus) -> Result<()> {
        let pool = self.pool.get().await?;

        let result = retry_transient(&self.retry, "update_article_status", is_transient, || {
            sqlx::query(
                r#"
                UPDATE news
                SET status = $1, updated_at = NOW()
                WHERE id = $2
                "#,
            )
            .bind(status.as_str())
            .bind(id)
            .execute(pool.as_ref())
        })
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            warn!(
                subsystem = "database",
                component = "articles",
                article_id = id,
                status = %status,
                "Status update matched no article"
            );
        } else {
            debug!(
                subsystem = "database",
                component = "articles",
                article_id = id,
                status = %status,
                "Article status updated"
            );
        }
        Ok(())
    }
}
