//! Streaming word count.
//!
//! `GET /add?message=...` publishes raw text to a topic. A job drains the
//! topic in micro-batches, counts space-separated words per batch, and merges
//! each batch into a shared accumulator that `GET /get` snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use parking_lot::RwLock;
use tessera_core::ServiceError;
use tessera_server::{HandlerError, HandlerRegistry, Reply, Router};
use tokio::time::MissedTickBehavior;

use crate::broker::{Broker, BrokerError, Record};
use crate::task::BackgroundTask;

/// A word -> count map that only grows.
#[derive(Debug, Default)]
pub struct LongMapAccumulator {
    values: RwLock<BTreeMap<String, u64>>,
}

impl LongMapAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `count` to `key`.
    pub fn add(&self, key: &str, count: u64) {
        *self.values.write().entry(key.to_string()).or_insert(0) += count;
    }

    /// Adds every entry of `other`.
    pub fn merge(&self, other: &BTreeMap<String, u64>) {
        let mut values = self.values.write();
        for (key, count) in other {
            *values.entry(key.clone()).or_insert(0) += count;
        }
    }

    /// A copy of the current counts.
    pub fn current_values(&self) -> BTreeMap<String, u64> {
        self.values.read().clone()
    }
}

/// Counts the words of one batch. Words are separated by single spaces;
/// empty tokens are ignored.
pub fn count_words<'a, I>(messages: I) -> BTreeMap<String, u64>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts = BTreeMap::new();
    for message in messages {
        for word in message.split(' ').filter(|w| !w.is_empty()) {
            *counts.entry(word.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

fn process_batch(records: &[Record], accumulator: &LongMapAccumulator) {
    if records.is_empty() {
        return;
    }
    let counts = count_words(records.iter().map(|r| r.payload.as_str()));
    tracing::debug!(records = records.len(), words = counts.len(), "Word-count batch");
    accumulator.merge(&counts);
}

/// The micro-batch job feeding a [`LongMapAccumulator`].
#[derive(Debug)]
pub struct WordCountJob {
    broker: Arc<Broker>,
    topic: String,
    interval: Duration,
    accumulator: Arc<LongMapAccumulator>,
    task: BackgroundTask,
}

impl WordCountJob {
    /// A job reading `topic` every `interval`.
    pub fn new(
        broker: Arc<Broker>,
        topic: impl Into<String>,
        interval: Duration,
        accumulator: Arc<LongMapAccumulator>,
    ) -> Self {
        Self {
            broker,
            topic: topic.into(),
            interval,
            accumulator,
            task: BackgroundTask::new("wordcount-job"),
        }
    }

    /// Subscribes and starts batching. The broker must be running.
    pub async fn start(&self) -> Result<(), BrokerError> {
        let mut subscription = self.broker.subscribe(&self.topic).await?;
        let accumulator = Arc::clone(&self.accumulator);
        let interval = self.interval;

        self.task.start(move |shutdown| async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = shutdown.recv() => {
                        process_batch(&subscription.drain().await, &accumulator);
                        break;
                    }
                    _ = ticker.tick() => {
                        process_batch(&subscription.drain().await, &accumulator);
                    }
                }
            }
        });
        Ok(())
    }

    /// Processes what is buffered and stops.
    pub async fn stop(&self) {
        self.task.stop().await;
    }
}

/// Publishes messages and reports accumulated counts.
#[derive(Debug, Clone)]
pub struct WordCountService {
    broker: Arc<Broker>,
    topic: String,
    accumulator: Arc<LongMapAccumulator>,
}

impl WordCountService {
    /// Publishes to `topic` and reads `accumulator`.
    pub fn new(
        broker: Arc<Broker>,
        topic: impl Into<String>,
        accumulator: Arc<LongMapAccumulator>,
    ) -> Self {
        Self {
            broker,
            topic: topic.into(),
            accumulator,
        }
    }

    /// Publishes one message.
    pub async fn add(&self, message: &str) -> Result<(), BrokerError> {
        self.broker.publish(&self.topic, None, message).await?;
        Ok(())
    }

    /// Counts so far.
    pub fn current_values(&self) -> BTreeMap<String, u64> {
        self.accumulator.current_values()
    }

    /// Routes and handlers.
    pub fn routes(&self) -> (Router, HandlerRegistry) {
        let mut router = Router::new();
        router.add_route(Method::GET, "/add", "wordcount.add");
        router.add_route(Method::GET, "/get", "wordcount.get");

        let mut handlers = HandlerRegistry::new();

        let svc = self.clone();
        handlers.register_raw("wordcount.add", move |ctx, _body| {
            let svc = svc.clone();
            async move {
                let message = ctx
                    .query()
                    .get("message")
                    .ok_or_else(|| ServiceError::validation("Missing parameter: message"))?;
                svc.add(message)
                    .await
                    .map_err(|e| ServiceError::internal_with_source("publish failed", e))?;
                Ok::<_, HandlerError>(Reply::empty())
            }
        });

        let svc = self.clone();
        handlers.register_no_body("wordcount.get", move |_ctx| {
            let values = svc.current_values();
            async move { Ok::<_, HandlerError>(values) }
        });

        (router, handlers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_words() {
        let counts = count_words(["a b a", "b  c"]);
        assert_eq!(counts["a"], 2);
        assert_eq!(counts["b"], 2);
        assert_eq!(counts["c"], 1);
        assert!(!counts.contains_key(""));
    }

    #[test]
    fn test_accumulator_add_and_merge() {
        let acc = LongMapAccumulator::new();
        assert!(acc.current_values().is_empty());
        acc.add("a", 1);
        acc.merge(&count_words(["a b"]));
        let values = acc.current_values();
        assert_eq!(values["a"], 2);
        assert_eq!(values["b"], 1);
    }

    #[tokio::test]
    async fn test_job_accumulates_batches() {
        let broker = Arc::new(Broker::new());
        broker.start().await.unwrap();
        broker.create_topic("words").await.unwrap();

        let acc = Arc::new(LongMapAccumulator::new());
        let job = WordCountJob::new(
            Arc::clone(&broker),
            "words",
            Duration::from_millis(10),
            Arc::clone(&acc),
        );
        job.start().await.unwrap();

        let svc = WordCountService::new(Arc::clone(&broker), "words", Arc::clone(&acc));
        svc.add("hello world").await.unwrap();
        svc.add("hello").await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while svc.current_values().get("hello") != Some(&2) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(svc.current_values()["world"], 1);

        job.stop().await;
        broker.stop().await;
    }

    #[tokio::test]
    async fn test_burst_within_one_interval_is_fully_counted() {
        let broker = Arc::new(Broker::new());
        broker.start().await.unwrap();
        broker.create_topic("words").await.unwrap();

        let acc = Arc::new(LongMapAccumulator::new());
        let job = WordCountJob::new(
            Arc::clone(&broker),
            "words",
            Duration::from_millis(1000),
            Arc::clone(&acc),
        );
        job.start().await.unwrap();

        let svc = WordCountService::new(Arc::clone(&broker), "words", Arc::clone(&acc));
        let burst = crate::broker::TOPIC_CAPACITY * 2;
        for _ in 0..burst {
            svc.add("hello").await.unwrap();
        }

        job.stop().await;
        assert_eq!(svc.current_values().get("hello"), Some(&(burst as u64)));
        broker.stop().await;
    }
}
