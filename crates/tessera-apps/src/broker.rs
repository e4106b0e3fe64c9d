//! An in-process topic broker.
//!
//! Each topic is a broadcast channel plus an append-only log file in the
//! broker's data directory. Records published before a subscriber attaches
//! are only in the log; subscribers see records from the moment they
//! subscribe. A subscriber that falls more than the channel capacity behind
//! catches up from the log, so it still sees every record exactly once.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Mutex};

/// Records a topic's channel buffers per subscriber.
pub(crate) const TOPIC_CAPACITY: usize = 1024;

/// Broker failures.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker has not been started or was stopped.
    #[error("broker is not running")]
    NotRunning,

    /// The topic was never created.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// Log file failure.
    #[error("broker I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record encoding failure.
    #[error("record codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// A published record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Topic the record was published to.
    pub topic: String,
    /// Position in the topic, starting at 0.
    pub offset: u64,
    /// Partitioning key.
    pub key: Option<String>,
    /// Encoded payload.
    pub payload: String,
    /// Publish time in epoch milliseconds.
    pub timestamp: i64,
}

#[derive(Debug)]
struct Topic {
    sender: broadcast::Sender<Record>,
    next_offset: u64,
    log: PathBuf,
}

#[derive(Debug)]
enum DataDir {
    Temporary(TempDir),
    Configured(PathBuf),
}

impl DataDir {
    fn path(&self) -> &Path {
        match self {
            Self::Temporary(dir) => dir.path(),
            Self::Configured(path) => path,
        }
    }
}

#[derive(Debug)]
struct Running {
    dir: DataDir,
    topics: HashMap<String, Topic>,
}

/// A minimal topic broker with `start`/`stop` lifecycle.
#[derive(Debug, Default)]
pub struct Broker {
    configured_dir: Option<PathBuf>,
    running: Mutex<Option<Running>>,
}

impl Broker {
    /// A broker that keeps its logs in a temporary directory removed on stop.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A broker that keeps its logs in `dir`, which survives stop.
    #[must_use]
    pub fn with_data_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            configured_dir: Some(dir.into()),
            running: Mutex::new(None),
        }
    }

    /// Prepares the data directory. Starting a running broker is a no-op.
    pub async fn start(&self) -> Result<(), BrokerError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let dir = match &self.configured_dir {
            Some(path) => {
                tokio::fs::create_dir_all(path).await?;
                DataDir::Configured(path.clone())
            }
            None => DataDir::Temporary(tempfile::Builder::new().prefix("broker").tempdir()?),
        };
        tracing::info!(dir = %dir.path().display(), "Using broker directory");

        *running = Some(Running {
            dir,
            topics: HashMap::new(),
        });
        Ok(())
    }

    /// Closes every topic and releases the data directory.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        let path = running.dir.path().to_path_buf();
        drop(running.topics);
        if let DataDir::Temporary(dir) = running.dir {
            if let Err(e) = dir.close() {
                tracing::warn!(dir = %path.display(), error = %e, "Unable to delete broker directory");
            }
        }
        tracing::info!(dir = %path.display(), "Broker stopped");
    }

    /// Returns `true` between `start` and `stop`.
    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// The data directory while running.
    pub async fn data_dir(&self) -> Option<PathBuf> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|r| r.dir.path().to_path_buf())
    }

    /// Creates `name` if it does not exist.
    pub async fn create_topic(&self, name: &str) -> Result<(), BrokerError> {
        let mut guard = self.running.lock().await;
        let running = guard.as_mut().ok_or(BrokerError::NotRunning)?;
        if !running.topics.contains_key(name) {
            let log = running.dir.path().join(format!("{name}.log"));
            // Offsets continue from a log left by an earlier run.
            let next_offset = match tokio::fs::read_to_string(&log).await {
                Ok(contents) => contents.lines().count() as u64,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
                Err(e) => return Err(e.into()),
            };
            let (sender, _) = broadcast::channel(TOPIC_CAPACITY);
            running.topics.insert(
                name.to_string(),
                Topic {
                    sender,
                    next_offset,
                    log,
                },
            );
            tracing::debug!(topic = name, next_offset, "Topic created");
        }
        Ok(())
    }

    /// Appends a record and returns its offset.
    pub async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: impl Into<String>,
    ) -> Result<u64, BrokerError> {
        let mut guard = self.running.lock().await;
        let running = guard.as_mut().ok_or(BrokerError::NotRunning)?;
        let entry = running
            .topics
            .get_mut(topic)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;

        let record = Record {
            topic: topic.to_string(),
            offset: entry.next_offset,
            key: key.map(ToString::to_string),
            payload: payload.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&entry.log)
            .await?;
        file.write_all(&line).await?;

        entry.next_offset += 1;
        // Nobody listening is fine; the record is in the log.
        let _ = entry.sender.send(record.clone());
        Ok(record.offset)
    }

    /// Subscribes to records published from now on.
    pub async fn subscribe(&self, topic: &str) -> Result<Subscription, BrokerError> {
        let guard = self.running.lock().await;
        let running = guard.as_ref().ok_or(BrokerError::NotRunning)?;
        let entry = running
            .topics
            .get(topic)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;
        Ok(Subscription {
            topic: topic.to_string(),
            receiver: entry.sender.subscribe(),
            log: entry.log.clone(),
            next_offset: entry.next_offset,
            replayed: VecDeque::new(),
        })
    }
}

/// A live feed of one topic.
///
/// Delivers records in offset order starting at the topic's offset when the
/// subscription was made.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    receiver: broadcast::Receiver<Record>,
    log: PathBuf,
    next_offset: u64,
    replayed: VecDeque<Record>,
}

impl Subscription {
    /// Next record, or `None` once the broker stops.
    pub async fn recv(&mut self) -> Option<Record> {
        loop {
            if let Some(record) = self.replayed.pop_front() {
                return Some(record);
            }
            match self.receiver.recv().await {
                Ok(record) => {
                    if let Some(record) = self.accept(record) {
                        return Some(record);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => self.catch_up(skipped).await,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Every record available now, without waiting for new ones.
    pub async fn drain(&mut self) -> Vec<Record> {
        let mut records: Vec<Record> = self.replayed.drain(..).collect();
        loop {
            match self.receiver.try_recv() {
                Ok(record) => records.extend(self.accept(record)),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    self.catch_up(skipped).await;
                    records.extend(self.replayed.drain(..));
                }
                Err(_) => return records,
            }
        }
    }

    /// The subscribed topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Drops records already delivered through the log.
    fn accept(&mut self, record: Record) -> Option<Record> {
        if record.offset < self.next_offset {
            return None;
        }
        self.next_offset = record.offset + 1;
        Some(record)
    }

    /// Queues every logged record from `next_offset` on.
    ///
    /// A record reaches the log before the channel, so the log holds at
    /// least everything the channel dropped. A trailing line still being
    /// written is left for the channel to deliver.
    async fn catch_up(&mut self, skipped: u64) {
        tracing::debug!(topic = %self.topic, skipped, from = self.next_offset, "Subscriber lagged, reading log");
        let contents = match tokio::fs::read_to_string(&self.log).await {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(topic = %self.topic, error = %e, "Unable to read topic log");
                return;
            }
        };
        for line in contents.lines() {
            let Ok(record) = serde_json::from_str::<Record>(line) else {
                break;
            };
            if let Some(record) = self.accept(record) {
                self.replayed.push_back(record);
            }
        }
    }
}
