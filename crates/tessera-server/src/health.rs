//! Liveness and readiness endpoints.
//!
//! - `GET /health` always answers while the process is up.
//! - `GET /ready` answers 200 only after startup hooks completed, while every
//!   registered check passes, and before shutdown begins.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    /// Always `"healthy"` while the server answers.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Seconds since the server was built.
    pub uptime_seconds: u64,
}

/// Liveness reporter.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    service: String,
    version: String,
    start_time: Instant,
}

impl HealthCheck {
    /// Creates a liveness reporter for the named service.
    #[must_use]
    pub fn new(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
            start_time: Instant::now(),
        }
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            service: self.service.clone(),
            version: self.version.clone(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Returns the service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Returns the service version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

/// Body of `GET /ready`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadinessStatus {
    /// Overall readiness.
    pub ready: bool,
    /// Result of each named check.
    pub checks: BTreeMap<String, bool>,
}

type ReadinessCheckFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Readiness reporter.
///
/// ```rust
/// use tessera_server::ReadinessCheck;
///
/// let readiness = ReadinessCheck::new().add_check("broker", || true);
/// assert!(!readiness.is_ready());
/// readiness.set_ready(true);
/// assert!(readiness.is_ready());
/// ```
#[derive(Clone)]
pub struct ReadinessCheck {
    checks: Vec<(String, ReadinessCheckFn)>,
    ready: Arc<AtomicBool>,
}

impl std::fmt::Debug for ReadinessCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessCheck")
            .field("checks", &self.checks.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("ready", &self.ready.load(Ordering::SeqCst))
            .finish()
    }
}

impl ReadinessCheck {
    /// Creates a reporter that is not ready until [`set_ready`](Self::set_ready) is called.
    #[must_use]
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Adds a named check.
    #[must_use]
    pub fn add_check<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.checks.push((name.into(), Arc::new(check)));
        self
    }

    /// Whether the server should receive traffic.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && self.checks.iter().all(|(_, check)| check())
    }

    /// Evaluates every check.
    #[must_use]
    pub fn status(&self) -> ReadinessStatus {
        let checks: BTreeMap<String, bool> = self
            .checks
            .iter()
            .map(|(name, check)| (name.clone(), check()))
            .collect();
        let ready = self.ready.load(Ordering::SeqCst) && checks.values().all(|&v| v);
        ReadinessStatus { ready, checks }
    }

    /// Flips the lifecycle flag; the server sets it after startup and clears it on shutdown.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

impl Default for ReadinessCheck {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status() {
        let health = HealthCheck::new("tessera", "0.1.0");
        let status = health.status();
        assert_eq!(status.status, "healthy");
        assert_eq!(status.service, "tessera");
        assert_eq!(health.version(), "0.1.0");
    }

    #[test]
    fn test_readiness_starts_unready() {
        let readiness = ReadinessCheck::new();
        assert!(!readiness.is_ready());
        readiness.set_ready(true);
        assert!(readiness.is_ready());
    }

    #[test]
    fn test_failing_check_blocks_readiness() {
        let readiness = ReadinessCheck::new()
            .add_check("broker", || true)
            .add_check("graph", || false);
        readiness.set_ready(true);

        let status = readiness.status();
        assert!(!status.ready);
        assert_eq!(status.checks.get("broker"), Some(&true));
        assert_eq!(status.checks.get("graph"), Some(&false));
    }

    #[test]
    fn test_clones_share_flag() {
        let readiness = ReadinessCheck::new();
        let clone = readiness.clone();
        clone.set_ready(true);
        assert!(readiness.is_ready());
    }
}
