//! Point store backends.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast::error::RecvError;

use super::document::DocumentCollection;
use super::selector::{select_nearest, NearestSelector};
use super::{Point, PointsError};
use crate::task::BackgroundTask;

/// Storage for points with a k-nearest query.
#[async_trait]
pub trait PointStore: Send + Sync {
    /// Appends a point.
    async fn add_point(&self, point: Point) -> Result<(), PointsError>;

    /// Removes every point.
    async fn clear(&self) -> Result<(), PointsError>;

    /// The `k` stored points nearest to `from`, nearest first.
    ///
    /// Fails with [`PointsError::KTooLarge`] when fewer than `k` points are
    /// stored at the time of the call.
    async fn get_nearest_points(&self, from: Point, k: usize) -> Result<Vec<Point>, PointsError>;
}

/// Points held in a lock-guarded vector.
#[derive(Debug, Default)]
pub struct MemoryPointStore {
    points: RwLock<Vec<Point>>,
}

impl MemoryPointStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored points.
    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    /// Returns `true` when no points are stored.
    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }
}

#[async_trait]
impl PointStore for MemoryPointStore {
    async fn add_point(&self, point: Point) -> Result<(), PointsError> {
        self.points.write().push(point);
        Ok(())
    }

    async fn clear(&self) -> Result<(), PointsError> {
        self.points.write().clear();
        Ok(())
    }

    async fn get_nearest_points(&self, from: Point, k: usize) -> Result<Vec<Point>, PointsError> {
        let points = self.points.read();
        if points.len() < k {
            return Err(PointsError::k_too_large(k));
        }
        Ok(select_nearest(from, k, points.iter().copied()))
    }
}

/// Points persisted in a [`DocumentCollection`].
///
/// [`start`](Self::start) empties the collection and resets the clock used
/// by [`points_per_second`](Self::points_per_second).
#[derive(Debug)]
pub struct DocumentPointStore {
    collection: Arc<DocumentCollection>,
    started_at: Mutex<Instant>,
}

impl DocumentPointStore {
    /// Wraps an opened collection.
    pub fn new(collection: Arc<DocumentCollection>) -> Self {
        Self {
            collection,
            started_at: Mutex::new(Instant::now()),
        }
    }

    /// The backing collection.
    pub fn collection(&self) -> &Arc<DocumentCollection> {
        &self.collection
    }

    /// Drops the collection and restarts the rate clock.
    pub async fn start(&self) -> Result<(), PointsError> {
        self.collection.drop_collection().await?;
        *self.started_at.lock() = Instant::now();
        tracing::info!(path = %self.collection.path().display(), "Point collection reset");
        Ok(())
    }

    /// Number of stored points.
    pub async fn count_points(&self) -> u64 {
        self.collection.count().await
    }

    /// Points stored per second since [`start`](Self::start).
    pub async fn points_per_second(&self) -> f64 {
        let count = self.count_points().await;
        let elapsed_ms = self.started_at.lock().elapsed().as_millis().max(1);
        count as f64 * 1000.0 / elapsed_ms as f64
    }
}

#[async_trait]
impl PointStore for DocumentPointStore {
    async fn add_point(&self, point: Point) -> Result<(), PointsError> {
        self.collection.insert_one(&point).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), PointsError> {
        self.collection.drop_collection().await?;
        Ok(())
    }

    async fn get_nearest_points(&self, from: Point, k: usize) -> Result<Vec<Point>, PointsError> {
        let count = self.collection.count().await;
        if count < k as u64 {
            return Err(PointsError::k_too_large(k));
        }

        let mut selector = NearestSelector::new(from, k);
        let mut cursor = self.collection.find::<Point>().await?;
        while let Some(point) = cursor.next().await {
            selector.push(point?);
        }
        Ok(selector.finish())
    }
}

/// Logs the storage status after every change to the point collection.
#[derive(Debug)]
pub struct StatusReporter {
    store: Arc<DocumentPointStore>,
    task: BackgroundTask,
}

impl StatusReporter {
    /// Creates a stopped reporter.
    pub fn new(store: Arc<DocumentPointStore>) -> Self {
        Self {
            store,
            task: BackgroundTask::new("points-status-reporter"),
        }
    }

    /// Subscribes to the operation log and starts logging.
    pub fn start(&self) {
        let store = Arc::clone(&self.store);
        let mut oplog = store.collection().subscribe();
        self.task.start(move |shutdown| async move {
            loop {
                tokio::select! {
                    () = shutdown.recv() => break,
                    entry = oplog.recv() => match entry {
                        Ok(entry) => {
                            let points = store.count_points().await;
                            let rate = store.points_per_second().await;
                            tracing::info!(
                                namespace = %entry.namespace,
                                points,
                                "Storage status: {points} points; {rate:.3} points/sec"
                            );
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "Status reporter lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    /// Stops logging.
    pub async fn stop(&self) {
        self.task.stop().await;
    }

    /// Returns `true` while the reporter is running.
    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn document_store(dir: &tempfile::TempDir) -> DocumentPointStore {
        let collection = DocumentCollection::open(dir.path(), "points").await.unwrap();
        DocumentPointStore::new(Arc::new(collection))
    }

    #[tokio::test]
    async fn test_memory_store_k_too_large_after_clear() {
        let store = MemoryPointStore::new();
        store.add_point(Point::new(1.0, 1.0)).await.unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.is_empty());

        let err = store
            .get_nearest_points(Point::new(0.0, 0.0), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, PointsError::KTooLarge { k: 1 }));
    }

    #[tokio::test]
    async fn test_document_store_nearest() {
        let dir = tempfile::tempdir().unwrap();
        let store = document_store(&dir).await;
        store.start().await.unwrap();

        store.add_point(Point::new(1.0, 1.0)).await.unwrap();
        store.add_point(Point::new(5.0, 5.0)).await.unwrap();
        let origin = Point::new(0.0, 0.0);

        assert_eq!(
            store.get_nearest_points(origin, 1).await.unwrap(),
            vec![Point::new(1.0, 1.0)]
        );
        assert_eq!(
            store.get_nearest_points(origin, 2).await.unwrap(),
            vec![Point::new(1.0, 1.0), Point::new(5.0, 5.0)]
        );
        assert!(matches!(
            store.get_nearest_points(origin, 3).await,
            Err(PointsError::KTooLarge { k: 3 })
        ));
    }

    #[tokio::test]
    async fn test_start_resets_collection() {
        let dir = tempfile::tempdir().unwrap();
        let store = document_store(&dir).await;
        store.add_point(Point::new(1.0, 1.0)).await.unwrap();
        assert_eq!(store.count_points().await, 1);

        store.start().await.unwrap();
        assert_eq!(store.count_points().await, 0);
        assert!(store.points_per_second().await.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_reporter_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(document_store(&dir).await);
        let reporter = StatusReporter::new(Arc::clone(&store));

        reporter.start();
        assert!(reporter.is_running());
        store.add_point(Point::new(2.0, 2.0)).await.unwrap();
        reporter.stop().await;
        assert!(!reporter.is_running());
    }
}
