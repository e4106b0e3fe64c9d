//! # Tessera Config
//!
//! Typed, layered configuration for the Tessera server and the services it
//! hosts.
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//!
//! [telemetry.logging]
//! format = "pretty"
//!
//! [apps.points]
//! backend = "document"
//!
//! [apps.graph]
//! mount = "/graph"
//! ```
//!
//! Scalar keys can be overridden from the environment as
//! `TESSERA__SECTION__KEY`, e.g. `TESSERA__APPS__GRAPH__ENABLED=false`.

#![doc(html_root_url = "https://docs.rs/tessera-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod apps;
mod config;
mod error;
mod loader;
mod schema;

pub use apps::{
    AppsConfig, BrokerConfig, Dispatch, EchoConfig, EmployeesConfig, GraphConfig,
    GreetingConfig, MessagingConfig, OAuth2Config, OAuthClientConfig, PointBackend,
    PointsConfig, WordCountConfig,
};
pub use config::TesseraConfig;
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{LogFormat, LoggingConfig, ServerConfig, TelemetryConfig};
