//! The root configuration.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::apps::{AppsConfig, Dispatch};
use crate::error::ConfigError;
use crate::schema::{LogFormat, LoggingConfig, ServerConfig, TelemetryConfig};

/// Complete Tessera configuration.
///
/// # Example
///
/// ```
/// use tessera_config::TesseraConfig;
///
/// let config = TesseraConfig::development();
/// assert!(config.validate().is_ok());
/// assert_eq!(config.server.http_addr, "127.0.0.1:8080");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TesseraConfig {
    /// `[server]`
    #[serde(default)]
    pub server: ServerConfig,

    /// `[telemetry]`
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// `[apps]`
    #[serde(default)]
    pub apps: AppsConfig,
}

impl TesseraConfig {
    /// Local development: loopback listener, pretty debug logs.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.server.http_addr = "127.0.0.1:8080".to_string();
        config.telemetry.logging = LoggingConfig {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            include_location: true,
            ..LoggingConfig::default()
        };
        config
    }

    /// Production: all interfaces, JSON logs at info.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.telemetry.environment = "production".to_string();
        config.telemetry.logging.ansi_enabled = false;
        config
    }

    /// Parsed listener address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if `server.http_addr` is not a
    /// socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.http_addr.parse().map_err(|e| {
            ConfigError::invalid_value("server.http_addr", format!("{e}: {}", self.server.http_addr))
        })
    }

    /// Graceful shutdown timeout.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }

    /// Base URL registered for `service` in `[apps.directory]`.
    #[must_use]
    pub fn directory_url(&self, service: &str) -> Option<&str> {
        self.apps.directory.get(service).map(String::as_str)
    }

    /// Checks values and cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.server.shutdown_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "server.shutdown_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "server.request_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.server.max_connections == Some(0) {
            return Err(ConfigError::invalid_value(
                "server.max_connections",
                "must be greater than zero when set",
            ));
        }
        if self.telemetry.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "telemetry.logging.level",
                "must not be empty",
            ));
        }

        for service in AppsConfig::SERVICES {
            if let Some((_, mount)) = self.apps.toggles(service) {
                if !mount.starts_with('/') {
                    return Err(ConfigError::invalid_value(
                        format!("apps.{service}.mount"),
                        format!("must start with '/': {mount}"),
                    ));
                }
            }
        }

        // Word count and graph both route /add and /get.
        let wordcount = &self.apps.wordcount;
        let graph = &self.apps.graph;
        if wordcount.enabled && graph.enabled && same_mount(&wordcount.mount, &graph.mount) {
            return Err(ConfigError::validation_error(format!(
                "apps.wordcount and apps.graph share mount {} and both define /add and /get",
                graph.mount
            )));
        }

        if wordcount.batch_interval_ms == 0 {
            return Err(ConfigError::invalid_value(
                "apps.wordcount.batch_interval_ms",
                "must be greater than zero",
            ));
        }
        if wordcount.topic.is_empty() || self.apps.messaging.topic.is_empty() {
            return Err(ConfigError::validation_error("broker topics must be named"));
        }

        self.validate_oauth2()?;

        if self.apps.employees.enabled && self.apps.employees.dispatch == Dispatch::Remote {
            self.validate_directory_entry("employees")?;
        }
        if self.apps.echo.enabled && self.apps.echo.dispatch == Dispatch::Remote {
            self.validate_directory_entry("echo")?;
        }
        for (service, url) in &self.apps.directory {
            if !is_http_url(url) {
                return Err(ConfigError::invalid_value(
                    format!("apps.directory.{service}"),
                    format!("not an http(s) URL: {url}"),
                ));
            }
        }

        Ok(())
    }

    fn validate_oauth2(&self) -> Result<(), ConfigError> {
        let oauth = &self.apps.oauth2;
        if !oauth.enabled {
            return Ok(());
        }
        if oauth.access_token_validity_secs == 0 || oauth.refresh_token_validity_secs == 0 {
            return Err(ConfigError::invalid_value(
                "apps.oauth2",
                "token validity must be greater than zero",
            ));
        }
        let mut seen = HashSet::new();
        for client in &oauth.clients {
            if !seen.insert(client.client_id.as_str()) {
                return Err(ConfigError::validation_error(format!(
                    "duplicate OAuth2 client id: {}",
                    client.client_id
                )));
            }
        }
        Ok(())
    }

    fn validate_directory_entry(&self, service: &str) -> Result<(), ConfigError> {
        if self.directory_url(service).is_none() {
            return Err(ConfigError::validation_error(format!(
                "apps.{service}.dispatch is remote but apps.directory.{service} is not set"
            )));
        }
        Ok(())
    }
}

fn same_mount(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

fn is_http_url(url: &str) -> bool {
    url.strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .is_some_and(|rest| !rest.is_empty())
}
