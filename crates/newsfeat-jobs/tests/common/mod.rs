//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use newsfeat_core::{
    Article, ArticleId, ArticleRepository, ArticleStatus, CreateFeaturesRequest, Error,
    FeatureRepository, Result, StoredFeatures, WorkItem, WorkPublisher,
};
use newsfeat_jobs::queue::Acknowledger;

// ============================================================================
// STORE
// ============================================================================

#[derive(Default)]
pub struct InMemoryStore {
    articles: Mutex<HashMap<ArticleId, Article>>,
    statuses: Mutex<HashMap<ArticleId, Vec<ArticleStatus>>>,
    records: Mutex<Vec<StoredFeatures>>,
}

impl InMemoryStore {
    pub fn with_article(self, id: ArticleId, title: &str, content: &str) -> Self {
        self.articles.lock().unwrap().insert(
            id,
            Article {
                id,
                title: title.to_string(),
                content: content.to_string(),
                source: Some("test".to_string()),
                published_date: None,
            },
        );
        self
    }

    pub fn status_history(&self, id: ArticleId) -> Vec<ArticleStatus> {
        self.statuses
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn records(&self) -> Vec<StoredFeatures> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArticleRepository for InMemoryStore {
    async fn fetch_by_id(&self, id: ArticleId) -> Result<Option<Article>> {
        Ok(self.articles.lock().unwrap().get(&id).cloned())
    }

    async fn update_status(&self, id: ArticleId, status: ArticleStatus) -> Result<()> {
        self.statuses
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .push(status);
        Ok(())
    }
}

#[async_trait]
impl FeatureRepository for InMemoryStore {
    async fn insert_with_status(&self, req: CreateFeaturesRequest) -> Result<i64> {
        let id = {
            let mut records = self.records.lock().unwrap();
            let id = records.len() as i64 + 1;
            records.push(StoredFeatures {
                id,
                article_id: req.article_id,
                features: req.features,
                extraction_date: req.extraction_date,
                model_version: req.model_version,
                processing_time_ms: req.processing_time_ms,
            });
            id
        };
        self.update_status(req.article_id, ArticleStatus::Success)
            .await?;
        Ok(id)
    }

    async fn list_for_article(&self, article_id: ArticleId) -> Result<Vec<StoredFeatures>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.article_id == article_id)
            .cloned()
            .collect())
    }
}

// ============================================================================
// BROKER
// ============================================================================

/// Publisher that hands every item to the test as a decoded work item.
pub struct ChannelPublisher(pub mpsc::UnboundedSender<WorkItem>);

#[async_trait]
impl WorkPublisher for ChannelPublisher {
    async fn publish(&self, article_id: ArticleId, retry_count: u32) -> Result<()> {
        self.0
            .send(WorkItem::new(article_id, retry_count))
            .map_err(|_| Error::Publish("receiver dropped".into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Ack,
    Reject,
}

/// Acknowledger recording each settlement.
#[derive(Default)]
pub struct RecordingAcker {
    settled: Mutex<Vec<Settled>>,
}

impl RecordingAcker {
    pub fn settled(&self) -> Vec<Settled> {
        self.settled.lock().unwrap().clone()
    }
}

#[async_trait]
impl Acknowledger for RecordingAcker {
    async fn acknowledge(&self) -> Result<()> {
        self.settled.lock().unwrap().push(Settled::Ack);
        Ok(())
    }

    async fn reject(&self) -> Result<()> {
        self.settled.lock().unwrap().push(Settled::Reject);
        Ok(())
    }
}
