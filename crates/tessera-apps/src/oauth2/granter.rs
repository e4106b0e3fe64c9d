//! Grant types.

use std::sync::Arc;

use tessera_core::ClientIdentity;

use super::clients::ClientRegistry;
use super::tokens::{AccessToken, OAuth2Authentication, TokenServices};
use super::users::UserDetailsService;
use super::OAuthError;

/// A token request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// `client_credentials`: a token for the client alone.
    ClientCredentials {
        /// The already authenticated client.
        client_id: String,
    },
    /// `password`: a token for a user acting through a client.
    Password {
        /// The client, as identified by its own bearer token.
        client: ClientIdentity,
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
}

impl Grant {
    /// The grant type name.
    #[must_use]
    pub const fn grant_type(&self) -> &'static str {
        match self {
            Self::ClientCredentials { .. } => "client_credentials",
            Self::Password { .. } => "password",
        }
    }
}

/// Turns grants into tokens.
#[derive(Debug, Clone)]
pub struct TokenGranter {
    clients: Arc<ClientRegistry>,
    users: Arc<UserDetailsService>,
    tokens: Arc<TokenServices>,
}

impl TokenGranter {
    /// A granter over the given registries.
    pub fn new(
        clients: Arc<ClientRegistry>,
        users: Arc<UserDetailsService>,
        tokens: Arc<TokenServices>,
    ) -> Self {
        Self {
            clients,
            users,
            tokens,
        }
    }

    /// Issues a token for `grant`.
    pub fn grant(&self, grant: Grant) -> Result<AccessToken, OAuthError> {
        let grant_type = grant.grant_type();
        let token = match grant {
            Grant::ClientCredentials { client_id } => {
                let client = self
                    .clients
                    .load(&client_id)
                    .ok_or(OAuthError::BadClientCredentials)?;
                let authentication = OAuth2Authentication {
                    client: client.identity(),
                    user: None,
                };
                self.tokens.create_access_token(authentication, false)
            }
            Grant::Password {
                client,
                username,
                password,
            } => {
                let user = self.users.authenticate(&username, &password)?;
                let authentication = OAuth2Authentication {
                    client,
                    user: Some(user.identity()),
                };
                self.tokens.create_access_token(authentication, true)
            }
        };
        tracing::debug!(grant_type, expiration = token.expiration, "Token granted");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tessera_config::OAuth2Config;

    fn granter() -> TokenGranter {
        TokenGranter::new(
            Arc::new(ClientRegistry::from_config(&OAuth2Config::default().clients)),
            Arc::new(UserDetailsService::new("password")),
            Arc::new(TokenServices::new(
                Duration::from_secs(60),
                Duration::from_secs(600),
            )),
        )
    }

    #[test]
    fn test_client_credentials() {
        let granter = granter();
        let token = granter
            .grant(Grant::ClientCredentials {
                client_id: "trusted-client".to_string(),
            })
            .unwrap();
        assert!(token.refresh_token.is_none());
        let auth = granter.tokens.load_authentication(&token.value).unwrap();
        assert_eq!(auth.client.id, "trusted-client");
        assert!(auth.user.is_none());

        assert_eq!(
            granter.grant(Grant::ClientCredentials {
                client_id: "ghost".to_string()
            }),
            Err(OAuthError::BadClientCredentials)
        );
    }

    #[test]
    fn test_password_grant() {
        let granter = granter();
        let client = granter.clients.load("trusted-client").unwrap().identity();
        let grant = Grant::Password {
            client: client.clone(),
            username: "amy".to_string(),
            password: "password".to_string(),
        };
        assert_eq!(grant.grant_type(), "password");
        let token = granter.grant(grant).unwrap();
        assert!(token.refresh_token.is_some());

        let auth = granter.tokens.load_authentication(&token.value).unwrap();
        assert_eq!(auth.user.unwrap().id, "amy");

        let bad = granter.grant(Grant::Password {
            client,
            username: "amy".to_string(),
            password: "wrong".to_string(),
        });
        assert_eq!(bad, Err(OAuthError::BadUserCredentials));
    }
}
