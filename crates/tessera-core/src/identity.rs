//! Caller identity.
//!
//! A bearer token resolves to an OAuth2 client and, for tokens issued through
//! the password grant, a user acting through that client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ServiceError;

/// The OAuth2 client a token was issued to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    /// Client id, e.g. `trusted-client`.
    pub id: String,
    /// Granted authorities such as `ROLE_CLIENT`.
    pub authorities: Vec<String>,
    /// Granted scopes such as `trust`.
    pub scopes: Vec<String>,
}

/// The end user a token was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Username.
    pub id: String,
    /// Granted authorities such as `ROLE_USER`.
    pub authorities: Vec<String>,
}

/// Who is behind a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallerIdentity {
    /// No credentials presented.
    #[default]
    Anonymous,
    /// A client token without a user.
    Client(ClientIdentity),
    /// A user token, always issued through a client.
    User {
        /// The client the user authenticated through.
        client: ClientIdentity,
        /// The user.
        user: UserIdentity,
    },
}

impl CallerIdentity {
    /// Returns the client, if any.
    #[must_use]
    pub fn client(&self) -> Option<&ClientIdentity> {
        match self {
            Self::Anonymous => None,
            Self::Client(client) | Self::User { client, .. } => Some(client),
        }
    }

    /// Returns the user, if any.
    #[must_use]
    pub fn user(&self) -> Option<&UserIdentity> {
        match self {
            Self::User { user, .. } => Some(user),
            _ => None,
        }
    }

    /// Whether the client holds `authority`.
    #[must_use]
    pub fn client_has_authority(&self, authority: &str) -> bool {
        self.client()
            .is_some_and(|c| c.authorities.iter().any(|a| a == authority))
    }

    /// Whether the client was granted `scope`.
    #[must_use]
    pub fn client_has_scope(&self, scope: &str) -> bool {
        self.client()
            .is_some_and(|c| c.scopes.iter().any(|s| s == scope))
    }

    /// Whether the user holds `authority`.
    #[must_use]
    pub fn user_has_authority(&self, authority: &str) -> bool {
        self.user()
            .is_some_and(|u| u.authorities.iter().any(|a| a == authority))
    }

    /// Identifier for log lines; never contains token material.
    #[must_use]
    pub fn log_id(&self) -> String {
        match self {
            Self::Anonymous => "anonymous".to_string(),
            Self::Client(c) => format!("client:{}", c.id),
            Self::User { client, user } => format!("user:{}@{}", user.id, client.id),
        }
    }
}

/// Resolves a bearer token to a caller.
///
/// Implemented by the OAuth2 service and consulted by the server's bearer
/// guard for routes that carry an access policy.
#[async_trait]
pub trait TokenAuthenticator: Send + Sync {
    /// Authenticates `token`, failing with an authentication error when the
    /// token is unknown or expired.
    async fn authenticate(&self, token: &str) -> Result<CallerIdentity, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trusted_client() -> ClientIdentity {
        ClientIdentity {
            id: "trusted-client".to_string(),
            authorities: vec!["ROLE_CLIENT".to_string()],
            scopes: vec!["read".to_string(), "trust".to_string()],
        }
    }

    #[test]
    fn test_anonymous_has_nothing() {
        let identity = CallerIdentity::Anonymous;
        assert!(identity.client().is_none());
        assert!(!identity.client_has_authority("ROLE_CLIENT"));
        assert!(!identity.user_has_authority("ROLE_USER"));
        assert_eq!(identity.log_id(), "anonymous");
    }

    #[test]
    fn test_client_identity() {
        let identity = CallerIdentity::Client(trusted_client());
        assert!(identity.client_has_authority("ROLE_CLIENT"));
        assert!(identity.client_has_scope("trust"));
        assert!(!identity.client_has_scope("write"));
        assert!(identity.user().is_none());
    }

    #[test]
    fn test_user_identity_exposes_client() {
        let identity = CallerIdentity::User {
            client: trusted_client(),
            user: UserIdentity {
                id: "test".to_string(),
                authorities: vec!["ROLE_USER".to_string()],
            },
        };
        assert!(identity.user_has_authority("ROLE_USER"));
        assert!(identity.client_has_authority("ROLE_CLIENT"));
        assert_eq!(identity.log_id(), "user:test@trusted-client");
    }
}
