//! Server and telemetry sections.
//!
//! Every struct rejects unknown fields so a misspelled key fails loudly
//! instead of silently falling back to a default.

use serde::{Deserialize, Serialize};
use tessera_telemetry::LogConfig;

/// `[server]`: listener and request handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `0.0.0.0:8080`.
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Seconds to wait for in-flight connections on shutdown.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Cap on concurrent connections; unlimited when absent.
    #[serde(default)]
    pub max_connections: Option<usize>,
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

const fn default_shutdown_timeout_secs() -> u64 {
    30
}

const fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            request_timeout_ms: default_request_timeout_ms(),
            max_connections: None,
        }
    }
}

/// `[telemetry]`: service identity and logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Name reported by `/health`.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Version reported by `/health`; the crate version when absent.
    #[serde(default)]
    pub service_version: Option<String>,

    /// Deployment environment label.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// `[telemetry.logging]`
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_service_name() -> String {
    "tessera".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            service_version: None,
            environment: default_environment(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

/// `[telemetry.logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Install a subscriber at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `EnvFilter` directive.
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// ANSI colors for pretty output.
    #[serde(default = "default_true")]
    pub ansi_enabled: bool,

    /// Include file and line in events.
    #[serde(default)]
    pub include_location: bool,
}

const fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_level(),
            format: LogFormat::Json,
            ansi_enabled: true,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    /// Converts into the subscriber settings understood by `tessera-telemetry`.
    #[must_use]
    pub fn to_log_config(&self) -> LogConfig {
        let json = self.format == LogFormat::Json;
        LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            json_format: json,
            ansi: !json && self.ansi_enabled,
            span_events: false,
            file_line_info: self.include_location,
            include_target: true,
        }
    }
}
