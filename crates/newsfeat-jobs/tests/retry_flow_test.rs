//! End-to-end retry behaviour of the consumer path.
//!
//! A broker stand-in feeds published work items back through
//! `process_delivery` and the `RetryScheduler`, with the tokio clock paused
//! so the real backoff delays can be measured.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use common::{ChannelPublisher, InMemoryStore, RecordingAcker, Settled};
use newsfeat_core::{ArticleStatus, QueueMetrics, WorkPublisher};
use newsfeat_inference::mock::MockExtractor;
use newsfeat_jobs::queue::{message, process_delivery, MessageOutcome, RedeliveryPolicy};
use newsfeat_jobs::{ExtractionPipeline, RetryScheduler};

#[tokio::test(start_paused = true)]
async fn test_missing_article_is_retried_then_dead_lettered() {
    let store = Arc::new(InMemoryStore::default());
    let extractor = MockExtractor::new();
    let pipeline = ExtractionPipeline::new(store.clone(), store.clone(), Arc::new(extractor.clone()));
    pipeline.mark_ready();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let publisher: Arc<dyn WorkPublisher> = Arc::new(ChannelPublisher(tx));
    let scheduler = RetryScheduler::new(publisher.clone(), CancellationToken::new());
    let policy = RedeliveryPolicy::new(3, Duration::from_secs(60));
    let metrics = QueueMetrics::new();

    let start = Instant::now();
    publisher.publish(123, 0).await.unwrap();

    let mut deliveries = Vec::new();
    let mut outcomes = Vec::new();
    loop {
        let item = rx.recv().await.unwrap();
        deliveries.push((item.retry_count, start.elapsed()));

        let acker = RecordingAcker::default();
        let body = message::encode(&item).unwrap();
        let outcome = process_delivery(&body, &acker, &pipeline, &policy, &metrics).await;
        assert_eq!(acker.settled(), vec![Settled::Reject]);

        let dead_lettered = matches!(outcome, MessageOutcome::DeadLettered { .. });
        match &outcome {
            MessageOutcome::Retry {
                article_id,
                next_retry_count,
                delay,
            } => scheduler.schedule(*article_id, *next_retry_count, *delay),
            MessageOutcome::DeadLettered { .. } => {}
            other => panic!("unexpected outcome {:?}", other),
        }
        outcomes.push(outcome);
        if dead_lettered {
            break;
        }
    }

    let counts: Vec<u32> = deliveries.iter().map(|(c, _)| *c).collect();
    assert_eq!(counts, vec![0, 1, 2, 3]);

    // Each republish waits at least retry_delay * 2^retry_count.
    let gaps: Vec<Duration> = deliveries.windows(2).map(|w| w[1].1 - w[0].1).collect();
    assert!(gaps[0] >= Duration::from_secs(60));
    assert!(gaps[1] >= Duration::from_secs(120));
    assert!(gaps[2] >= Duration::from_secs(240));
    assert!(gaps[0] < gaps[1] && gaps[1] < gaps[2]);

    assert_eq!(
        outcomes.last(),
        Some(&MessageOutcome::DeadLettered {
            article_id: 123,
            retry_count: 3
        })
    );

    // Nothing further is republished after dead-lettering.
    let extra = tokio::time::timeout(Duration::from_secs(3600), rx.recv()).await;
    assert!(extra.is_err());
    assert_eq!(scheduler.pending(), 0);

    assert_eq!(metrics.messages_retried.get(), 3);
    assert_eq!(metrics.messages_dead_lettered.get(), 1);
    assert_eq!(metrics.messages_consumed.get(), 0);

    assert!(extractor.calls().is_empty());
    assert!(store.records().is_empty());
    assert!(!store.status_history(123).contains(&ArticleStatus::Failed));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers_on_retry() {
    use newsfeat_core::FailureKind;
    use newsfeat_inference::mock::MockOutcome;

    let store = Arc::new(InMemoryStore::default().with_article(7, "Başlık", "Haber metni"));
    let extractor = MockExtractor::new().then(MockOutcome::Fail(FailureKind::TransientApi));
    let pipeline = ExtractionPipeline::new(store.clone(), store.clone(), Arc::new(extractor.clone()));
    pipeline.mark_ready();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let publisher: Arc<dyn WorkPublisher> = Arc::new(ChannelPublisher(tx));
    let scheduler = RetryScheduler::new(publisher.clone(), CancellationToken::new());
    let policy = RedeliveryPolicy::new(3, Duration::from_secs(60));
    let metrics = QueueMetrics::new();

    publisher.publish(7, 0).await.unwrap();

    let first = rx.recv().await.unwrap();
    let outcome = process_delivery(
        &message::encode(&first).unwrap(),
        &RecordingAcker::default(),
        &pipeline,
        &policy,
        &metrics,
    )
    .await;
    match outcome {
        MessageOutcome::Retry {
            article_id,
            next_retry_count,
            delay,
        } => scheduler.schedule(article_id, next_retry_count, delay),
        other => panic!("expected retry, got {:?}", other),
    }

    let second = rx.recv().await.unwrap();
    assert_eq!(second.retry_count, 1);
    let acker = RecordingAcker::default();
    let outcome = process_delivery(
        &message::encode(&second).unwrap(),
        &acker,
        &pipeline,
        &policy,
        &metrics,
    )
    .await;

    assert_eq!(outcome, MessageOutcome::Acked { article_id: 7 });
    assert_eq!(acker.settled(), vec![Settled::Ack]);
    assert_eq!(store.records().len(), 1);
    assert_eq!(
        store.status_history(7),
        vec![
            ArticleStatus::Processing,
            ArticleStatus::Failed,
            ArticleStatus::Processing,
            ArticleStatus::Success,
        ]
    );
    assert_eq!(extractor.calls().len(), 2);
}

#[tokio::test]
async fn test_unparsable_body_is_dead_lettered_on_first_delivery() {
    let store = Arc::new(InMemoryStore::default());
    let pipeline = ExtractionPipeline::new(store.clone(), store, Arc::new(MockExtractor::new()));
    pipeline.mark_ready();
    let metrics = QueueMetrics::new();
    let acker = RecordingAcker::default();

    let outcome = process_delivery(
        br#"{"retry_count": 0}"#,
        &acker,
        &pipeline,
        &RedeliveryPolicy::new(3, Duration::from_secs(60)),
        &metrics,
    )
    .await;

    assert!(matches!(outcome, MessageOutcome::Malformed { .. }));
    assert_eq!(acker.settled(), vec![Settled::Reject]);
    assert_eq!(metrics.parse_errors.get(), 1);
    assert_eq!(metrics.messages_retried.get(), 0);
}
