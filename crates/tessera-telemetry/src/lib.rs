//! Structured logging for Tessera services.
//!
//! Every service logs through `tracing`; this crate installs the subscriber.
//! JSON output is the default, with a pretty human-readable format for local
//! development. Filters follow `EnvFilter` syntax, so
//! `tessera_apps::points=debug,info` works as a level.
//!
//! ```rust,ignore
//! use tessera_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(points = 3, "Storage status");
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
