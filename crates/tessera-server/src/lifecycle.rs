//! Startup and shutdown hooks.
//!
//! Services with background work (the broker, the message consumer, the
//! word-count job, the point-store reporter) register a pair of hooks here
//! instead of starting themselves. Startup hooks run in registration order
//! before the listener accepts connections; shutdown hooks run in reverse
//! order once the listener has stopped and connections have drained.
//!
//! A hook receives the container mutably but returns a `'static` future, so
//! it resolves what it needs first and then moves it into the async block:
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera_server::Lifecycle;
//!
//! struct Broker;
//! impl Broker {
//!     async fn start(&self) {}
//! }
//!
//! let lifecycle = Lifecycle::new().on_startup_named("broker", |container| {
//!     let broker = container.resolve::<Broker>();
//!     async move {
//!         if let Some(broker) = broker {
//!             broker.start().await;
//!         }
//!         Ok(())
//!     }
//! });
//! assert_eq!(lifecycle.startup_hook_count(), 1);
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tessera_core::di::Container;
use thiserror::Error;

/// A lifecycle hook failure.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// A startup hook failed; later hooks were not run.
    #[error("Startup hook failed: {0}")]
    StartupFailed(String),

    /// One or more shutdown hooks failed.
    #[error("Shutdown hook failed: {0}")]
    ShutdownFailed(String),

    /// Error raised by a hook body.
    #[error("Lifecycle hook error: {message}")]
    HookError {
        /// Error message
        message: String,
        /// Underlying cause
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl LifecycleError {
    /// Creates a hook error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self::HookError {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a hook error wrapping a cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::HookError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for lifecycle hooks.
pub type LifecycleResult<T = ()> = Result<T, LifecycleError>;

/// A boxed lifecycle hook.
pub type LifecycleHook = Arc<
    dyn Fn(&mut Container) -> Pin<Box<dyn Future<Output = LifecycleResult> + Send + '_>>
        + Send
        + Sync,
>;

/// Ordered startup and shutdown hooks.
#[must_use]
pub struct Lifecycle {
    startup_hooks: Vec<(String, LifecycleHook)>,
    shutdown_hooks: Vec<(String, LifecycleHook)>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field(
                "startup_hooks",
                &self.startup_hooks.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field(
                "shutdown_hooks",
                &self.shutdown_hooks.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Lifecycle {
    /// Creates an empty lifecycle.
    pub fn new() -> Self {
        Self {
            startup_hooks: Vec::new(),
            shutdown_hooks: Vec::new(),
        }
    }

    /// Registers an anonymous startup hook.
    pub fn on_startup<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(&mut Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LifecycleResult> + Send + 'static,
    {
        let name = format!("startup_{}", self.startup_hooks.len());
        self.on_startup_named(name, hook)
    }

    /// Registers a named startup hook. The name appears in logs and errors.
    pub fn on_startup_named<F, Fut>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&mut Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LifecycleResult> + Send + 'static,
    {
        let hook: LifecycleHook = Arc::new(move |container| Box::pin(hook(container)));
        self.startup_hooks.push((name.into(), hook));
        self
    }

    /// Registers an anonymous shutdown hook.
    pub fn on_shutdown<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(&mut Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LifecycleResult> + Send + 'static,
    {
        let name = format!("shutdown_{}", self.shutdown_hooks.len());
        self.on_shutdown_named(name, hook)
    }

    /// Registers a named shutdown hook.
    pub fn on_shutdown_named<F, Fut>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&mut Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LifecycleResult> + Send + 'static,
    {
        let hook: LifecycleHook = Arc::new(move |container| Box::pin(hook(container)));
        self.shutdown_hooks.push((name.into(), hook));
        self
    }

    /// Returns the number of startup hooks.
    #[must_use]
    pub fn startup_hook_count(&self) -> usize {
        self.startup_hooks.len()
    }

    /// Returns the number of shutdown hooks.
    #[must_use]
    pub fn shutdown_hook_count(&self) -> usize {
        self.shutdown_hooks.len()
    }

    /// Runs startup hooks in registration order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::StartupFailed`] naming the failed hook.
    pub async fn run_startup(&self, container: &mut Container) -> LifecycleResult {
        for (name, hook) in &self.startup_hooks {
            tracing::debug!(hook = %name, "Running startup hook");
            if let Err(e) = hook(container).await {
                tracing::error!(hook = %name, error = %e, "Startup hook failed");
                return Err(LifecycleError::StartupFailed(format!(
                    "Hook '{name}' failed: {e}"
                )));
            }
        }
        Ok(())
    }

    /// Runs every shutdown hook in reverse order, collecting failures.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ShutdownFailed`] summarizing every failed hook.
    pub async fn run_shutdown(&self, container: &mut Container) -> LifecycleResult {
        let mut errors: Vec<String> = Vec::new();

        for (name, hook) in self.shutdown_hooks.iter().rev() {
            tracing::debug!(hook = %name, "Running shutdown hook");
            if let Err(e) = hook(container).await {
                tracing::error!(hook = %name, error = %e, "Shutdown hook failed");
                errors.push(format!("{name}: {e}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::ShutdownFailed(errors.join("; ")))
        }
    }

    /// Appends another lifecycle's hooks after this one's.
    pub fn merge(mut self, other: Self) -> Self {
        self.startup_hooks.extend(other.startup_hooks);
        self.shutdown_hooks.extend(other.shutdown_hooks);
        self
    }
}
