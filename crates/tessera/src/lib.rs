//! # Tessera
//!
//! One HTTP server hosting a set of small services (nearest points, an
//! employee registry with two protocol versions, messaging, streaming word
//! count, a person graph, OAuth2 tokens, echo, greeting), each enabled and
//! mounted through configuration.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tessera::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().with_development().load()?;
//!     init_logging(&config.telemetry.logging.to_log_config())?;
//!
//!     build_server(&config).await?.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Crates
//!
//! | Crate | Contents |
//! |---|---|
//! | [`core`] | request context, errors, caller identity, DI container |
//! | [`server`] | hyper server, router, handlers, bearer guard, lifecycle |
//! | [`config`] | TOML/JSON/env configuration |
//! | [`telemetry`] | tracing subscriber setup |
//! | [`apps`] | the services and their assembly |

#![doc(html_root_url = "https://docs.rs/tessera/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

pub use tessera_apps as apps;
pub use tessera_config as config;
pub use tessera_core as core;
pub use tessera_server as server;
pub use tessera_telemetry as telemetry;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_VAR: &str = "TESSERA_CONFIG";

/// Configuration file used when [`CONFIG_PATH_VAR`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "tessera.toml";

/// The configuration file to load: `$TESSERA_CONFIG`, or `tessera.toml`.
#[must_use]
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_VAR)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Loads the configuration the binary runs with.
///
/// Sources, lowest precedence first: built-in defaults, the optional file at
/// `path`, a `.env` file, then `TESSERA__*` environment variables.
///
/// # Errors
///
/// Returns an error if a source cannot be read or the result is invalid.
pub fn load_config(path: &Path) -> Result<config::TesseraConfig, config::ConfigError> {
    config::ConfigLoader::new()
        .with_optional_file(path)?
        .with_dotenv()?
        .with_env_prefix(config::DEFAULT_ENV_PREFIX)
        .load()
}

/// Common imports.
pub mod prelude {
    pub use tessera_apps::{build_server, AssemblyError};
    pub use tessera_config::{ConfigLoader, TesseraConfig};
    pub use tessera_core::{CallerIdentity, RequestContext, ServiceError};
    pub use tessera_server::{Server, ShutdownSignal};
    pub use tessera_telemetry::{init_logging, LogConfig};
}
