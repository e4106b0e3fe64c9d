//! `[apps.*]`: one section per hosted service.
//!
//! Every service section carries `enabled` and `mount`. The mount is the path
//! prefix the service's router is attached under.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a client reaches a service: in-process or over HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dispatch {
    /// Call the in-process instance.
    #[default]
    Local,
    /// POST to the base URL registered in `[apps.directory]`.
    Remote,
}

/// Where points are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointBackend {
    /// A lock-guarded vector.
    #[default]
    Memory,
    /// A JSON-lines document collection on disk.
    Document,
}

const fn default_true() -> bool {
    true
}

fn root_mount() -> String {
    "/".to_string()
}

/// `[apps]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppsConfig {
    /// Nearest-point service.
    #[serde(default)]
    pub points: PointsConfig,
    /// Employee registry over the current and legacy protocols.
    #[serde(default)]
    pub employees: EmployeesConfig,
    /// The in-process broker shared by messaging and word count.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Message producer and consumer.
    #[serde(default)]
    pub messaging: MessagingConfig,
    /// Word-count streaming job.
    #[serde(default)]
    pub wordcount: WordCountConfig,
    /// Person graph.
    #[serde(default)]
    pub graph: GraphConfig,
    /// OAuth2 token service and bearer guard.
    #[serde(default)]
    pub oauth2: OAuth2Config,
    /// Echo service and its proxy.
    #[serde(default)]
    pub echo: EchoConfig,
    /// Greeting page.
    #[serde(default)]
    pub greeting: GreetingConfig,
    /// Service name to base URL, used by remote dispatch.
    #[serde(default)]
    pub directory: BTreeMap<String, String>,
}

impl AppsConfig {
    /// Names of every service section, in assembly order.
    pub const SERVICES: [&'static str; 8] = [
        "points",
        "employees",
        "messaging",
        "wordcount",
        "graph",
        "oauth2",
        "echo",
        "greeting",
    ];

    /// Returns `(enabled, mount)` for a service section.
    #[must_use]
    pub fn toggles(&self, service: &str) -> Option<(bool, &str)> {
        let (enabled, mount) = match service {
            "points" => (self.points.enabled, &self.points.mount),
            "employees" => (self.employees.enabled, &self.employees.mount),
            "messaging" => (self.messaging.enabled, &self.messaging.mount),
            "wordcount" => (self.wordcount.enabled, &self.wordcount.mount),
            "graph" => (self.graph.enabled, &self.graph.mount),
            "oauth2" => (self.oauth2.enabled, &self.oauth2.mount),
            "echo" => (self.echo.enabled, &self.echo.mount),
            "greeting" => (self.greeting.enabled, &self.greeting.mount),
            _ => return None,
        };
        Some((enabled, mount.as_str()))
    }

    /// Mutable `(enabled, mount)` for a service section.
    pub fn toggles_mut(&mut self, service: &str) -> Option<(&mut bool, &mut String)> {
        match service {
            "points" => Some((&mut self.points.enabled, &mut self.points.mount)),
            "employees" => Some((&mut self.employees.enabled, &mut self.employees.mount)),
            "messaging" => Some((&mut self.messaging.enabled, &mut self.messaging.mount)),
            "wordcount" => Some((&mut self.wordcount.enabled, &mut self.wordcount.mount)),
            "graph" => Some((&mut self.graph.enabled, &mut self.graph.mount)),
            "oauth2" => Some((&mut self.oauth2.enabled, &mut self.oauth2.mount)),
            "echo" => Some((&mut self.echo.enabled, &mut self.echo.mount)),
            "greeting" => Some((&mut self.greeting.enabled, &mut self.greeting.mount)),
            _ => None,
        }
    }
}

/// `[apps.points]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PointsConfig {
    /// Serve the service.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Route prefix.
    #[serde(default = "root_mount")]
    pub mount: String,
    /// Storage backend.
    #[serde(default)]
    pub backend: PointBackend,
    /// Directory for the document backend; a temporary one when absent.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Log the storage status after every document mutation.
    #[serde(default = "default_true")]
    pub report_status: bool,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mount: root_mount(),
            backend: PointBackend::Memory,
            data_dir: None,
            report_status: true,
        }
    }
}

/// `[apps.employees]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmployeesConfig {
    /// Serve the service.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Route prefix.
    #[serde(default = "root_mount")]
    pub mount: String,
    /// How the legacy bridge reaches the current registry.
    #[serde(default)]
    pub dispatch: Dispatch,
}

impl Default for EmployeesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mount: root_mount(),
            dispatch: Dispatch::Local,
        }
    }
}

/// `[apps.broker]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    /// Topic log directory; a temporary one, removed on stop, when absent.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// `[apps.messaging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessagingConfig {
    /// Serve the service.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Route prefix.
    #[serde(default = "root_mount")]
    pub mount: String,
    /// Topic user messages are published to.
    #[serde(default = "default_message_topic")]
    pub topic: String,
}

fn default_message_topic() -> String {
    "user-messages".to_string()
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mount: root_mount(),
            topic: default_message_topic(),
        }
    }
}

/// `[apps.wordcount]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WordCountConfig {
    /// Serve the service.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Route prefix.
    #[serde(default = "default_wordcount_mount")]
    pub mount: String,
    /// Topic raw messages are published to.
    #[serde(default = "default_words_topic")]
    pub topic: String,
    /// Micro-batch interval in milliseconds.
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,
}

fn default_wordcount_mount() -> String {
    "/wordcount".to_string()
}

fn default_words_topic() -> String {
    "words".to_string()
}

const fn default_batch_interval_ms() -> u64 {
    1000
}

impl Default for WordCountConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mount: default_wordcount_mount(),
            topic: default_words_topic(),
            batch_interval_ms: default_batch_interval_ms(),
        }
    }
}

/// `[apps.graph]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphConfig {
    /// Serve the service.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Route prefix.
    #[serde(default = "default_graph_mount")]
    pub mount: String,
}

fn default_graph_mount() -> String {
    "/graph".to_string()
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mount: default_graph_mount(),
        }
    }
}

/// A registered OAuth2 client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OAuthClientConfig {
    /// Client id.
    pub client_id: String,
    /// Client secret.
    pub secret: String,
    /// Granted authorities.
    #[serde(default)]
    pub authorities: Vec<String>,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl OAuthClientConfig {
    fn new(client_id: &str, secret: &str, authority: &str, scopes: &[&str]) -> Self {
        Self {
            client_id: client_id.to_string(),
            secret: secret.to_string(),
            authorities: vec![authority.to_string()],
            scopes: scopes.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

fn default_clients() -> Vec<OAuthClientConfig> {
    vec![
        OAuthClientConfig::new(
            "trusted-client",
            "trusted-client-password",
            "ROLE_CLIENT",
            &["read", "write", "trust"],
        ),
        OAuthClientConfig::new(
            "untrusted-client",
            "untrusted-client-password",
            "ROLE_UNTRUSTED_CLIENT",
            &["read", "write"],
        ),
    ]
}

/// `[apps.oauth2]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OAuth2Config {
    /// Serve the token endpoints and guard the protected routes.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Route prefix.
    #[serde(default = "root_mount")]
    pub mount: String,
    /// Password accepted for every username.
    #[serde(default = "default_user_password")]
    pub user_password: String,
    /// Access token lifetime in seconds.
    #[serde(default = "default_access_validity")]
    pub access_token_validity_secs: u64,
    /// Refresh token lifetime in seconds.
    #[serde(default = "default_refresh_validity")]
    pub refresh_token_validity_secs: u64,
    /// Registered clients.
    #[serde(default = "default_clients")]
    pub clients: Vec<OAuthClientConfig>,
}

fn default_user_password() -> String {
    "password".to_string()
}

const fn default_access_validity() -> u64 {
    12 * 60 * 60
}

const fn default_refresh_validity() -> u64 {
    30 * 24 * 60 * 60
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            enabled: true,
            mount: root_mount(),
            user_password: default_user_password(),
            access_token_validity_secs: default_access_validity(),
            refresh_token_validity_secs: default_refresh_validity(),
            clients: default_clients(),
        }
    }
}

/// `[apps.echo]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EchoConfig {
    /// Serve the service.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Route prefix.
    #[serde(default = "root_mount")]
    pub mount: String,
    /// How `/proxy` reaches the echo service.
    #[serde(default)]
    pub dispatch: Dispatch,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mount: root_mount(),
            dispatch: Dispatch::Local,
        }
    }
}

/// `[apps.greeting]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GreetingConfig {
    /// Serve the service.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Route prefix.
    #[serde(default = "root_mount")]
    pub mount: String,
    /// Page template; `{name}` is replaced by the escaped name.
    #[serde(default = "default_template")]
    pub template: String,
    /// Name used when the query omits one.
    #[serde(default = "default_name")]
    pub default_name: String,
}

fn default_template() -> String {
    "Hello, {name}!".to_string()
}

fn default_name() -> String {
    "Thomas".to_string()
}

impl Default for GreetingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mount: root_mount(),
            template: default_template(),
            default_name: default_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mounts() {
        let apps = AppsConfig::default();
        assert_eq!(apps.toggles("wordcount"), Some((true, "/wordcount")));
        assert_eq!(apps.toggles("graph"), Some((true, "/graph")));
        assert_eq!(apps.toggles("points"), Some((true, "/")));
        assert_eq!(apps.toggles("nope"), None);
    }

    #[test]
    fn test_default_clients() {
        let oauth = OAuth2Config::default();
        assert_eq!(oauth.clients.len(), 2);
        assert_eq!(oauth.clients[0].client_id, "trusted-client");
        assert!(oauth.clients[0].scopes.contains(&"trust".to_string()));
        assert!(!oauth.clients[1].scopes.contains(&"trust".to_string()));
        assert_eq!(oauth.access_token_validity_secs, 43_200);
    }

    #[test]
    fn test_parse_apps_section() {
        let apps: AppsConfig = toml::from_str(
            r#"
            [points]
            backend = "document"
            data_dir = "/var/lib/tessera/points"

            [echo]
            dispatch = "remote"

            [directory]
            echo = "http://127.0.0.1:9090"
            "#,
        )
        .unwrap();
        assert_eq!(apps.points.backend, PointBackend::Document);
        assert_eq!(apps.echo.dispatch, Dispatch::Remote);
        assert_eq!(apps.directory["echo"], "http://127.0.0.1:9090");
        assert_eq!(apps.greeting.template, "Hello, {name}!");
    }

    #[test]
    fn test_toggles_mut() {
        let mut apps = AppsConfig::default();
        let (enabled, mount) = apps.toggles_mut("graph").unwrap();
        *enabled = false;
        *mount = "/people".to_string();
        assert_eq!(apps.toggles("graph"), Some((false, "/people")));
    }
}
