//! Nearest-point service.
//!
//! Points are exchanged over the RPC-over-HTTP convention:
//! `POST /points/{message}` with the message's named parameters as a JSON
//! object.
//!
//! | Message | Body | Result |
//! |---|---|---|
//! | `addPoint` | `{"point":{"x":1.0,"y":1.0}}` | `null` |
//! | `clear` | empty | `null` |
//! | `getNearestPoints` | `{"from":{"x":0.0,"y":0.0},"k":2}` | `[{"x":..,"y":..}]` |

mod document;
mod selector;
mod store;

use std::sync::Arc;

use http::Method;
use serde::{Deserialize, Serialize};
use tessera_core::ServiceError;
use tessera_server::{HandlerError, HandlerRegistry, Router};
use thiserror::Error;

pub use document::{Cursor, DocumentCollection, DocumentError, OplogEntry, OplogOp};
pub use selector::{select_nearest, NearestSelector};
pub use store::{DocumentPointStore, MemoryPointStore, PointStore, StatusReporter};

/// A point in the plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Point {
    /// Creates a point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to `other`.
    #[must_use]
    pub fn squared_distance(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Point store failures.
#[derive(Debug, Error)]
pub enum PointsError {
    /// Fewer than `k` points are stored.
    #[error("k is too large")]
    KTooLarge {
        /// The requested count.
        k: usize,
    },

    /// The document backend failed.
    #[error(transparent)]
    Storage(#[from] DocumentError),
}

impl PointsError {
    /// Creates a [`PointsError::KTooLarge`].
    #[must_use]
    pub const fn k_too_large(k: usize) -> Self {
        Self::KTooLarge { k }
    }
}

impl From<PointsError> for ServiceError {
    fn from(err: PointsError) -> Self {
        match err {
            PointsError::KTooLarge { k } => ServiceError::domain("K_TOO_LARGE", "k is too large")
                .with_details(serde_json::json!({ "k": k })),
            PointsError::Storage(e) => ServiceError::internal_with_source("point storage failed", e),
        }
    }
}

impl From<PointsError> for HandlerError {
    fn from(err: PointsError) -> Self {
        HandlerError::Service(err.into())
    }
}

#[derive(Debug, Deserialize)]
struct AddPointRequest {
    point: Point,
}

#[derive(Debug, Deserialize)]
struct NearestRequest {
    from: Point,
    k: i64,
}

/// Serves a [`PointStore`].
#[derive(Clone)]
pub struct PointsService {
    store: Arc<dyn PointStore>,
}

impl std::fmt::Debug for PointsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointsService").finish_non_exhaustive()
    }
}

impl PointsService {
    /// Serves `store`.
    pub fn new(store: Arc<dyn PointStore>) -> Self {
        Self { store }
    }

    /// Appends a point.
    pub async fn add_point(&self, point: Point) -> Result<(), PointsError> {
        self.store.add_point(point).await
    }

    /// Removes every point.
    pub async fn clear(&self) -> Result<(), PointsError> {
        self.store.clear().await
    }

    /// The `k` points nearest to `from`.
    pub async fn get_nearest_points(&self, from: Point, k: usize) -> Result<Vec<Point>, PointsError> {
        self.store.get_nearest_points(from, k).await
    }

    /// Routes and handlers, relative to the service's mount prefix.
    pub fn routes(&self) -> (Router, HandlerRegistry) {
        let mut router = Router::new();
        router.add_route(Method::POST, "/points/addPoint", "points.addPoint");
        router.add_route(Method::POST, "/points/clear", "points.clear");
        router.add_route(Method::POST, "/points/getNearestPoints", "points.getNearestPoints");

        let mut handlers = HandlerRegistry::new();

        let svc = self.clone();
        handlers.register("points.addPoint", move |_ctx, req: AddPointRequest| {
            let svc = svc.clone();
            async move {
                svc.add_point(req.point).await?;
                Ok::<_, HandlerError>(())
            }
        });

        let svc = self.clone();
        handlers.register_no_body("points.clear", move |_ctx| {
            let svc = svc.clone();
            async move {
                svc.clear().await?;
                Ok::<_, HandlerError>(())
            }
        });

        let svc = self.clone();
        handlers.register("points.getNearestPoints", move |_ctx, req: NearestRequest| {
            let svc = svc.clone();
            async move {
                let k = usize::try_from(req.k)
                    .ok()
                    .filter(|k| *k >= 1)
                    .ok_or_else(|| ServiceError::validation("k must be at least 1"))?;
                Ok::<_, HandlerError>(svc.get_nearest_points(req.from, k).await?)
            }
        });

        (router, handlers)
    }
}
