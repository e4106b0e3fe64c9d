//! Stoppable background tasks.

use std::future::Future;

use parking_lot::Mutex;
use tessera_server::ShutdownSignal;
use tokio::task::JoinHandle;

/// A single background loop started and stopped by lifecycle hooks.
///
/// The loop receives a [`ShutdownSignal`] and is expected to return once it
/// fires. Starting an already running task is a no-op.
#[derive(Debug)]
pub struct BackgroundTask {
    name: &'static str,
    running: Mutex<Option<(ShutdownSignal, JoinHandle<()>)>>,
}

impl BackgroundTask {
    /// Creates a stopped task.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            running: Mutex::new(None),
        }
    }

    /// Spawns the loop if it is not already running.
    pub fn start<F, Fut>(&self, body: F)
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock();
        if running.is_some() {
            return;
        }
        let signal = ShutdownSignal::new();
        let handle = tokio::spawn(body(signal.clone()));
        tracing::debug!(task = self.name, "Background task started");
        *running = Some((signal, handle));
    }

    /// Returns `true` while the loop is running.
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Signals the loop and waits for it to return.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        if let Some((signal, handle)) = running {
            signal.trigger();
            if let Err(e) = handle.await {
                tracing::warn!(task = self.name, error = %e, "Background task ended abnormally");
            }
            tracing::debug!(task = self.name, "Background task stopped");
        }
    }
}
