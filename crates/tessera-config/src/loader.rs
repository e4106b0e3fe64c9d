//! Layered configuration loading.
//!
//! Later layers override earlier ones:
//!
//! 1. defaults (or a preset)
//! 2. a TOML or JSON file
//! 3. a `.env` file, which only feeds the next layer
//! 4. `PREFIX__SECTION__KEY` environment variables
//! 5. validation

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::apps::{Dispatch, PointBackend};
use crate::schema::LogFormat;
use crate::{ConfigError, TesseraConfig};

/// Default environment prefix.
pub const DEFAULT_ENV_PREFIX: &str = "TESSERA";

/// Builds a [`TesseraConfig`] from layered sources.
///
/// # Example
///
/// ```no_run
/// use tessera_config::ConfigLoader;
///
/// # fn main() -> Result<(), tessera_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("tessera.toml")?
///     .with_dotenv()?
///     .with_env_prefix("TESSERA")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: TesseraConfig,
    env_prefix: Option<String>,
    source: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Starts from [`TesseraConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: TesseraConfig::default(),
            env_prefix: None,
            source: None,
        }
    }

    /// Starts from the development preset.
    ///
    /// ```
    /// use tessera_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = TesseraConfig::development();
        self
    }

    /// Starts from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = TesseraConfig::production();
        self
    }

    /// Loads a `.toml` or `.json` file, chosen by extension.
    ///
    /// Sections absent from the file keep their defaults; unknown keys are
    /// rejected.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file is missing, unreadable or invalid.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        self.config = Self::parse_file(&content, path)?;
        self.source = Some(path.to_path_buf());
        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), but a missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads configuration text in the given format (`toml` or `json`).
    ///
    /// ```
    /// use tessera_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[apps.graph]\nmount = \"/people\"", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    /// assert_eq!(config.apps.graph.mount, "/people");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for an unknown format or invalid content.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_ascii_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            other => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {other}"
                )))
            }
        };
        Ok(self)
    }

    /// Enables `PREFIX__SECTION__KEY` overrides.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_ascii_uppercase());
        self
    }

    /// Loads `.env` from the working directory into the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DotenvError`] if `.env` exists but is malformed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::DotenvError(e.to_string())),
        }
    }

    /// The file the configuration was read from, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if an override does not parse or validation
    /// fails.
    pub fn load(mut self) -> Result<TesseraConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let marker = format!("{prefix}__");
            let mut vars: Vec<(String, String)> =
                env::vars().filter(|(key, _)| key.starts_with(&marker)).collect();
            vars.sort();
            for (key, value) in vars {
                self.apply_env_var(&key, &value, &prefix)?;
            }
        }
        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration without overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> TesseraConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<TesseraConfig, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(serde_json::from_str(content)?),
            Some("toml") | None => Ok(toml::from_str(content)?),
            Some(other) => Err(ConfigError::validation_error(format!(
                "unsupported configuration file extension: .{other}"
            ))),
        }
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(rest) = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
        else {
            return Ok(());
        };
        let parts: Vec<String> = rest.split("__").map(str::to_ascii_lowercase).collect();
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["server", "http_addr"] => config.server.http_addr = value.to_string(),
            ["server", "shutdown_timeout_secs"] => {
                config.server.shutdown_timeout_secs = parse_num(key, value)?;
            }
            ["server", "request_timeout_ms"] => {
                config.server.request_timeout_ms = parse_num(key, value)?;
            }
            ["server", "max_connections"] => {
                config.server.max_connections = if value.is_empty() {
                    None
                } else {
                    Some(parse_num(key, value)?)
                };
            }

            ["telemetry", "service_name"] => config.telemetry.service_name = value.to_string(),
            ["telemetry", "service_version"] => {
                config.telemetry.service_version = Some(value.to_string());
            }
            ["telemetry", "environment"] => config.telemetry.environment = value.to_string(),
            ["telemetry", "logging", "enabled"] => {
                config.telemetry.logging.enabled = parse_bool_var(key, value)?;
            }
            ["telemetry", "logging", "level"] => {
                config.telemetry.logging.level = value.to_string();
            }
            ["telemetry", "logging", "format"] => {
                config.telemetry.logging.format = match value.to_ascii_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => return Err(ConfigError::env_parse_error(key, "expected json or pretty")),
                };
            }
            ["telemetry", "logging", "ansi_enabled"] => {
                config.telemetry.logging.ansi_enabled = parse_bool_var(key, value)?;
            }
            ["telemetry", "logging", "include_location"] => {
                config.telemetry.logging.include_location = parse_bool_var(key, value)?;
            }

            ["apps", "directory", service] => {
                config
                    .apps
                    .directory
                    .insert((*service).to_string(), value.to_string());
            }
            ["apps", "broker", "data_dir"] => {
                config.apps.broker.data_dir = Some(PathBuf::from(value));
            }
            ["apps", "points", "backend"] => {
                config.apps.points.backend = match value.to_ascii_lowercase().as_str() {
                    "memory" => PointBackend::Memory,
                    "document" => PointBackend::Document,
                    _ => {
                        return Err(ConfigError::env_parse_error(key, "expected memory or document"))
                    }
                };
            }
            ["apps", "points", "data_dir"] => {
                config.apps.points.data_dir = Some(PathBuf::from(value));
            }
            ["apps", "points", "report_status"] => {
                config.apps.points.report_status = parse_bool_var(key, value)?;
            }
            ["apps", "employees", "dispatch"] => {
                config.apps.employees.dispatch = parse_dispatch(key, value)?;
            }
            ["apps", "echo", "dispatch"] => {
                config.apps.echo.dispatch = parse_dispatch(key, value)?;
            }
            ["apps", "messaging", "topic"] => config.apps.messaging.topic = value.to_string(),
            ["apps", "wordcount", "topic"] => config.apps.wordcount.topic = value.to_string(),
            ["apps", "wordcount", "batch_interval_ms"] => {
                config.apps.wordcount.batch_interval_ms = parse_num(key, value)?;
            }
            ["apps", "oauth2", "user_password"] => {
                config.apps.oauth2.user_password = value.to_string();
            }
            ["apps", "oauth2", "access_token_validity_secs"] => {
                config.apps.oauth2.access_token_validity_secs = parse_num(key, value)?;
            }
            ["apps", "oauth2", "refresh_token_validity_secs"] => {
                config.apps.oauth2.refresh_token_validity_secs = parse_num(key, value)?;
            }
            ["apps", "greeting", "template"] => config.apps.greeting.template = value.to_string(),
            ["apps", "greeting", "default_name"] => {
                config.apps.greeting.default_name = value.to_string();
            }
            ["apps", service, "enabled"] => {
                let (enabled, _) = config
                    .apps
                    .toggles_mut(service)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "unknown service"))?;
                *enabled = parse_bool_var(key, value)?;
            }
            ["apps", service, "mount"] => {
                let (_, mount) = config
                    .apps
                    .toggles_mut(service)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "unknown service"))?;
                *mount = value.to_string();
            }

            _ => {
                return Err(ConfigError::env_parse_error(key, "unknown configuration key"));
            }
        }
        Ok(())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_bool_var(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| ConfigError::env_parse_error(key, e.to_string()))
}

fn parse_dispatch(key: &str, value: &str) -> Result<Dispatch, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "local" => Ok(Dispatch::Local),
        "remote" => Ok(Dispatch::Remote),
        _ => Err(ConfigError::env_parse_error(key, "expected local or remote")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn apply(loader: &mut ConfigLoader, key: &str, value: &str) -> Result<(), ConfigError> {
        loader.apply_env_var(key, value, DEFAULT_ENV_PREFIX)
    }

    #[test]
    fn test_defaults_load() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, TesseraConfig::default());
    }

    #[test]
    fn test_production_preset() {
        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.telemetry.environment, "production");
        assert_eq!(config.telemetry.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [server]
            http_addr = "127.0.0.1:3000"

            [apps.points]
            backend = "document"

            [apps.wordcount]
            batch_interval_ms = 250
            "#
        )
        .unwrap();

        let loader = ConfigLoader::new().with_file(file.path()).unwrap();
        assert_eq!(loader.source(), Some(file.path()));
        let config = loader.load().unwrap();
        assert_eq!(config.server.http_addr, "127.0.0.1:3000");
        assert_eq!(config.apps.points.backend, PointBackend::Document);
        assert_eq!(config.apps.wordcount.batch_interval_ms, 250);
        assert_eq!(config.apps.graph.mount, "/graph");
    }

    #[test]
    fn test_json_string() {
        let config = ConfigLoader::new()
            .with_string(r#"{"apps":{"echo":{"enabled":false}}}"#, "json")
            .unwrap()
            .load()
            .unwrap();
        assert!(!config.apps.echo.enabled);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = ConfigLoader::new().with_string("[apps.points]\nbackend_kind = 1", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_missing_and_optional_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("tessera.toml");

        assert!(matches!(
            ConfigLoader::new().with_file(&missing),
            Err(ConfigError::FileNotFound { .. })
        ));
        let loader = ConfigLoader::new().with_optional_file(&missing).unwrap();
        assert!(loader.source().is_none());
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(ConfigLoader::new().with_file(file.path()).is_err());
    }

    #[test]
    fn test_env_server_and_logging() {
        let mut loader = ConfigLoader::new();
        apply(&mut loader, "TESSERA__SERVER__HTTP_ADDR", "0.0.0.0:9000").unwrap();
        apply(&mut loader, "TESSERA__SERVER__MAX_CONNECTIONS", "64").unwrap();
        apply(&mut loader, "TESSERA__TELEMETRY__LOGGING__FORMAT", "pretty").unwrap();
        let config = loader.load_unvalidated();
        assert_eq!(config.server.http_addr, "0.0.0.0:9000");
        assert_eq!(config.server.max_connections, Some(64));
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_env_app_toggles() {
        let mut loader = ConfigLoader::new();
        apply(&mut loader, "TESSERA__APPS__GRAPH__ENABLED", "false").unwrap();
        apply(&mut loader, "TESSERA__APPS__POINTS__MOUNT", "/geo").unwrap();
        apply(&mut loader, "TESSERA__APPS__ECHO__DISPATCH", "remote").unwrap();
        apply(&mut loader, "TESSERA__APPS__DIRECTORY__ECHO", "http://echo:8080").unwrap();
        let config = loader.load_unvalidated();
        assert!(!config.apps.graph.enabled);
        assert_eq!(config.apps.points.mount, "/geo");
        assert_eq!(config.apps.echo.dispatch, Dispatch::Remote);
        assert_eq!(config.directory_url("echo"), Some("http://echo:8080"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_parse_errors() {
        let mut loader = ConfigLoader::new();
        assert!(apply(&mut loader, "TESSERA__APPS__POINTS__ENABLED", "maybe").is_err());
        assert!(apply(&mut loader, "TESSERA__SERVER__REQUEST_TIMEOUT_MS", "soon").is_err());
        assert!(apply(&mut loader, "TESSERA__APPS__NOPE__ENABLED", "true").is_err());
        assert!(apply(&mut loader, "TESSERA__APPS__ECHO__DISPATCH", "carrier-pigeon").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("nah"), None);
    }
}
