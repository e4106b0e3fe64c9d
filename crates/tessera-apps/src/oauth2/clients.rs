//! Registered OAuth2 clients.

use indexmap::IndexMap;
use tessera_config::OAuthClientConfig;
use tessera_core::ClientIdentity;

use super::OAuthError;

/// A registered client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientDetails {
    /// Client id.
    pub client_id: String,
    secret: String,
    /// Authorities granted to the client itself.
    pub authorities: Vec<String>,
    /// Scopes tokens issued to the client carry.
    pub scopes: Vec<String>,
}

impl ClientDetails {
    /// A client with the given credentials and grants.
    pub fn new(
        client_id: impl Into<String>,
        secret: impl Into<String>,
        authorities: Vec<String>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            secret: secret.into(),
            authorities,
            scopes,
        }
    }

    /// The identity attached to requests made with this client's tokens.
    pub fn identity(&self) -> ClientIdentity {
        ClientIdentity {
            id: self.client_id.clone(),
            authorities: self.authorities.clone(),
            scopes: self.scopes.clone(),
        }
    }
}

impl From<&OAuthClientConfig> for ClientDetails {
    fn from(config: &OAuthClientConfig) -> Self {
        Self::new(
            config.client_id.clone(),
            config.secret.clone(),
            config.authorities.clone(),
            config.scopes.clone(),
        )
    }
}

/// Client lookup and secret check.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: IndexMap<String, ClientDetails>,
}

impl ClientRegistry {
    /// Loads the configured clients. A repeated id replaces the earlier one.
    pub fn from_config(clients: &[OAuthClientConfig]) -> Self {
        clients.iter().map(ClientDetails::from).collect()
    }

    /// Looks a client up.
    pub fn load(&self, client_id: &str) -> Option<&ClientDetails> {
        self.clients.get(client_id)
    }

    /// Checks a client's secret.
    pub fn authenticate(&self, client_id: &str, secret: &str) -> Result<&ClientDetails, OAuthError> {
        self.load(client_id)
            .filter(|client| client.secret == secret)
            .ok_or(OAuthError::BadClientCredentials)
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no client is registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl FromIterator<ClientDetails> for ClientRegistry {
    fn from_iter<I: IntoIterator<Item = ClientDetails>>(iter: I) -> Self {
        Self {
            clients: iter
                .into_iter()
                .map(|client| (client.client_id.clone(), client))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_config::OAuth2Config;

    #[test]
    fn test_default_clients() {
        let registry = ClientRegistry::from_config(&OAuth2Config::default().clients);
        assert_eq!(registry.len(), 2);

        let trusted = registry
            .authenticate("trusted-client", "trusted-client-password")
            .unwrap();
        assert_eq!(trusted.authorities, vec!["ROLE_CLIENT"]);
        assert!(trusted.scopes.contains(&"trust".to_string()));

        let untrusted = registry.load("untrusted-client").unwrap();
        assert!(!untrusted.scopes.contains(&"trust".to_string()));
    }

    #[test]
    fn test_bad_credentials() {
        let registry = ClientRegistry::from_config(&OAuth2Config::default().clients);
        assert_eq!(
            registry.authenticate("trusted-client", "wrong"),
            Err(OAuthError::BadClientCredentials)
        );
        assert_eq!(
            registry.authenticate("nobody", "trusted-client-password"),
            Err(OAuthError::BadClientCredentials)
        );
    }
}
