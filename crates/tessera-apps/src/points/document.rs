//! A file-backed document collection.
//!
//! Documents are stored one JSON object per line in `<dir>/<name>.jsonl`.
//! Every mutation is announced on an operation log that observers can
//! subscribe to.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::sync::{broadcast, Mutex};

const OPLOG_CAPACITY: usize = 1024;

/// Errors raised by a [`DocumentCollection`].
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Filesystem failure.
    #[error("collection I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document failed to encode or decode.
    #[error("document codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Kind of mutation recorded in the operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OplogOp {
    /// A document was inserted.
    Insert,
    /// The collection was dropped.
    Drop,
}

/// One operation-log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OplogEntry {
    /// `<database>.<collection>`-style namespace.
    pub namespace: String,
    /// What happened.
    pub op: OplogOp,
}

#[derive(Debug)]
struct State {
    count: u64,
}

/// An append-only JSON-lines collection.
#[derive(Debug)]
pub struct DocumentCollection {
    name: String,
    path: PathBuf,
    state: Mutex<State>,
    oplog: broadcast::Sender<OplogEntry>,
}

impl DocumentCollection {
    /// Opens (or creates) the collection `name` in `dir`.
    pub async fn open(dir: impl AsRef<Path>, name: &str) -> Result<Self, DocumentError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{name}.jsonl"));

        let mut count = 0;
        if fs::try_exists(&path).await? {
            let mut lines = BufReader::new(File::open(&path).await?).lines();
            while let Some(line) = lines.next_line().await? {
                if !line.trim().is_empty() {
                    count += 1;
                }
            }
        }

        let (oplog, _) = broadcast::channel(OPLOG_CAPACITY);
        Ok(Self {
            name: name.to_string(),
            path,
            state: Mutex::new(State { count }),
            oplog,
        })
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one document.
    pub async fn insert_one<T: Serialize + Sync>(&self, document: &T) -> Result<(), DocumentError> {
        let mut line = serde_json::to_vec(document)?;
        line.push(b'\n');

        let mut state = self.state.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        state.count += 1;
        drop(state);

        self.publish(OplogOp::Insert);
        Ok(())
    }

    /// Number of documents.
    pub async fn count(&self) -> u64 {
        self.state.lock().await.count
    }

    /// Streams every document in insertion order.
    pub async fn find<T: DeserializeOwned>(&self) -> Result<Cursor<T>, DocumentError> {
        let _state = self.state.lock().await;
        let lines = match File::open(&self.path).await {
            Ok(file) => Some(BufReader::new(file).lines()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(Cursor {
            lines,
            _marker: PhantomData,
        })
    }

    /// Removes every document.
    pub async fn drop_collection(&self) -> Result<(), DocumentError> {
        let mut state = self.state.lock().await;
        match fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        state.count = 0;
        drop(state);

        self.publish(OplogOp::Drop);
        Ok(())
    }

    /// Subscribes to the operation log.
    pub fn subscribe(&self) -> broadcast::Receiver<OplogEntry> {
        self.oplog.subscribe()
    }

    fn publish(&self, op: OplogOp) {
        // No subscribers is fine.
        let _ = self.oplog.send(OplogEntry {
            namespace: format!("tessera.{}", self.name),
            op,
        });
    }
}

/// A forward-only cursor over a collection.
#[derive(Debug)]
pub struct Cursor<T> {
    lines: Option<Lines<BufReader<File>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Cursor<T> {
    /// Next document, or `None` at the end.
    pub async fn next(&mut self) -> Option<Result<T, DocumentError>> {
        let lines = self.lines.as_mut()?;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return Some(serde_json::from_str(&line).map_err(Into::into)),
                Ok(None) => return None,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        n: u32,
    }

    #[tokio::test]
    async fn test_insert_find_drop() {
        let dir = tempfile::tempdir().unwrap();
        let collection = DocumentCollection::open(dir.path(), "docs").await.unwrap();
        let mut oplog = collection.subscribe();

        collection.insert_one(&Doc { n: 1 }).await.unwrap();
        collection.insert_one(&Doc { n: 2 }).await.unwrap();
        assert_eq!(collection.count().await, 2);
        assert_eq!(oplog.recv().await.unwrap().op, OplogOp::Insert);

        let mut cursor = collection.find::<Doc>().await.unwrap();
        assert_eq!(cursor.next().await.unwrap().unwrap(), Doc { n: 1 });
        assert_eq!(cursor.next().await.unwrap().unwrap(), Doc { n: 2 });
        assert!(cursor.next().await.is_none());

        collection.drop_collection().await.unwrap();
        assert_eq!(collection.count().await, 0);
        assert!(collection.find::<Doc>().await.unwrap().next().await.is_none());
    }

    #[tokio::test]
    async fn test_reopen_counts_existing() {
        let dir = tempfile::tempdir().unwrap();
        {
            let collection = DocumentCollection::open(dir.path(), "docs").await.unwrap();
            collection.insert_one(&Doc { n: 7 }).await.unwrap();
        }
        let reopened = DocumentCollection::open(dir.path(), "docs").await.unwrap();
        assert_eq!(reopened.count().await, 1);
        assert_eq!(reopened.name(), "docs");
    }
}
