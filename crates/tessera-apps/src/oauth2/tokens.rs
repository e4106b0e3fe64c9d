//! Token issuance and storage.
//!
//! Access and refresh tokens are random UUIDs. Each maps to the
//! [`OAuth2Authentication`] it was issued for and carries an expiration in
//! epoch milliseconds. Expired tokens are removed when they are next read.

use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tessera_core::{CallerIdentity, ClientIdentity, UserIdentity};
use uuid::Uuid;

use super::OAuthError;

/// What a token stands for: a client, and the user it acts for if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Authentication {
    /// The client the token was issued to.
    pub client: ClientIdentity,
    /// The user, for password-grant tokens.
    pub user: Option<UserIdentity>,
}

impl OAuth2Authentication {
    /// Converts into the identity attached to requests.
    pub fn into_caller(self) -> CallerIdentity {
        match self.user {
            Some(user) => CallerIdentity::User {
                client: self.client,
                user,
            },
            None => CallerIdentity::Client(self.client),
        }
    }
}

/// An issued access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    /// Token value.
    pub value: String,
    /// Expiration, epoch milliseconds.
    pub expiration: i64,
    /// Refresh token, for password-grant tokens.
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredAccess {
    authentication: OAuth2Authentication,
    expiration: i64,
    refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredRefresh {
    authentication: OAuth2Authentication,
    expiration: i64,
    access_token: String,
}

/// In-memory token maps.
#[derive(Debug, Default)]
pub struct TokenStore {
    access: DashMap<String, StoredAccess>,
    refresh: DashMap<String, StoredRefresh>,
}

impl TokenStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live access tokens.
    pub fn access_token_count(&self) -> usize {
        self.access.len()
    }

    /// Number of live refresh tokens.
    pub fn refresh_token_count(&self) -> usize {
        self.refresh.len()
    }

    /// Drops every token that expired at or before `now`.
    fn purge_expired(&self, now: i64) {
        self.access.retain(|_, stored| stored.expiration > now);
        self.refresh.retain(|_, stored| stored.expiration > now);
    }

    fn read_access(&self, token: &str, now: i64) -> Result<OAuth2Authentication, OAuthError> {
        let stored = self
            .access
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(OAuthError::InvalidToken)?;
        if stored.expiration <= now {
            self.access.remove(token);
            return Err(OAuthError::ExpiredToken);
        }
        Ok(stored.authentication)
    }

    fn read_refresh(&self, token: &str, now: i64) -> Result<StoredRefresh, OAuthError> {
        let stored = self
            .refresh
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(OAuthError::InvalidRefreshToken)?;
        if stored.expiration <= now {
            self.refresh.remove(token);
            self.access.remove(&stored.access_token);
            return Err(OAuthError::InvalidRefreshToken);
        }
        Ok(stored)
    }
}

/// Issues, refreshes and resolves tokens.
#[derive(Debug)]
pub struct TokenServices {
    store: TokenStore,
    access_validity: Duration,
    refresh_validity: Duration,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expires_in(now: i64, validity: Duration) -> i64 {
    now.saturating_add(i64::try_from(validity.as_millis()).unwrap_or(i64::MAX))
}

fn new_token() -> String {
    Uuid::new_v4().to_string()
}

impl TokenServices {
    /// Tokens valid for the given durations.
    pub fn new(access_validity: Duration, refresh_validity: Duration) -> Self {
        Self {
            store: TokenStore::new(),
            access_validity,
            refresh_validity,
        }
    }

    /// The backing store.
    pub const fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Issues an access token, plus a refresh token when `refreshable`.
    pub fn create_access_token(
        &self,
        authentication: OAuth2Authentication,
        refreshable: bool,
    ) -> AccessToken {
        let now = now_millis();
        self.store.purge_expired(now);
        let value = new_token();
        let refresh_token = refreshable.then(|| {
            let refresh = new_token();
            self.store.refresh.insert(
                refresh.clone(),
                StoredRefresh {
                    authentication: authentication.clone(),
                    expiration: expires_in(now, self.refresh_validity),
                    access_token: value.clone(),
                },
            );
            refresh
        });

        let expiration = expires_in(now, self.access_validity);
        self.store.access.insert(
            value.clone(),
            StoredAccess {
                authentication,
                expiration,
                refresh_token: refresh_token.clone(),
            },
        );
        AccessToken {
            value,
            expiration,
            refresh_token,
        }
    }

    /// Exchanges a refresh token held by `client_id` for a new access token.
    /// The refresh token stays the same; the access token it last produced
    /// is revoked.
    pub fn refresh_access_token(
        &self,
        refresh_token: &str,
        client_id: &str,
    ) -> Result<AccessToken, OAuthError> {
        let now = now_millis();
        let stored = self.store.read_refresh(refresh_token, now)?;
        if stored.authentication.client.id != client_id {
            return Err(OAuthError::InvalidRefreshToken);
        }

        self.store.access.remove(&stored.access_token);

        let value = new_token();
        let expiration = expires_in(now, self.access_validity);
        self.store.access.insert(
            value.clone(),
            StoredAccess {
                authentication: stored.authentication,
                expiration,
                refresh_token: Some(refresh_token.to_string()),
            },
        );
        if let Some(mut entry) = self.store.refresh.get_mut(refresh_token) {
            entry.access_token = value.clone();
        }

        Ok(AccessToken {
            value,
            expiration,
            refresh_token: Some(refresh_token.to_string()),
        })
    }

    /// Resolves an access token.
    pub fn load_authentication(&self, token: &str) -> Result<OAuth2Authentication, OAuthError> {
        self.store.read_access(token, now_millis())
    }

    /// Revokes an access token and its refresh token.
    pub fn revoke(&self, token: &str) -> bool {
        match self.store.access.remove(token) {
            Some((_, stored)) => {
                if let Some(refresh) = stored.refresh_token {
                    self.store.refresh.remove(&refresh);
                }
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(id: &str) -> ClientIdentity {
        ClientIdentity {
            id: id.to_string(),
            authorities: vec!["ROLE_CLIENT".to_string()],
            scopes: vec!["trust".to_string()],
        }
    }

    fn user_auth() -> OAuth2Authentication {
        OAuth2Authentication {
            client: client("trusted-client"),
            user: Some(UserIdentity {
                id: "amy".to_string(),
                authorities: vec!["ROLE_USER".to_string()],
            }),
        }
    }

    fn services() -> TokenServices {
        TokenServices::new(Duration::from_secs(60), Duration::from_secs(600))
    }

    #[test]
    fn test_client_token_has_no_refresh() {
        let services = services();
        let auth = OAuth2Authentication {
            client: client("trusted-client"),
            user: None,
        };
        let token = services.create_access_token(auth.clone(), false);
        assert!(token.refresh_token.is_none());
        assert!(token.expiration > now_millis());
        assert!(Uuid::parse_str(&token.value).is_ok());
        assert_eq!(services.load_authentication(&token.value).unwrap(), auth);
        assert!(matches!(
            services.load_authentication(&token.value).unwrap().into_caller(),
            CallerIdentity::Client(_)
        ));
    }

    #[test]
    fn test_unknown_token() {
        assert_eq!(
            services().load_authentication("1234-abcd"),
            Err(OAuthError::InvalidToken)
        );
    }

    #[test]
    fn test_refresh_rotates_access_token() {
        let services = services();
        let first = services.create_access_token(user_auth(), true);
        let refresh = first.refresh_token.clone().unwrap();

        let second = services
            .refresh_access_token(&refresh, "trusted-client")
            .unwrap();
        assert_ne!(second.value, first.value);
        assert_eq!(second.refresh_token.as_deref(), Some(refresh.as_str()));
        assert_eq!(
            services.load_authentication(&first.value),
            Err(OAuthError::InvalidToken)
        );
        assert_eq!(services.load_authentication(&second.value).unwrap(), user_auth());

        let third = services
            .refresh_access_token(&refresh, "trusted-client")
            .unwrap();
        assert!(services.load_authentication(&second.value).is_err());
        assert!(services.load_authentication(&third.value).is_ok());
        assert_eq!(services.store().access_token_count(), 1);
    }

    #[test]
    fn test_refresh_bound_to_client() {
        let services = services();
        let token = services.create_access_token(user_auth(), true);
        let refresh = token.refresh_token.unwrap();
        assert_eq!(
            services.refresh_access_token(&refresh, "other-client"),
            Err(OAuthError::InvalidRefreshToken)
        );
        assert_eq!(
            services.refresh_access_token("nope", "trusted-client"),
            Err(OAuthError::InvalidRefreshToken)
        );
    }

    #[test]
    fn test_expired_tokens_are_removed() {
        let services = TokenServices::new(Duration::ZERO, Duration::ZERO);
        let token = services.create_access_token(user_auth(), true);
        assert_eq!(
            services.load_authentication(&token.value),
            Err(OAuthError::ExpiredToken)
        );
        assert_eq!(services.store().access_token_count(), 0);

        let refresh = token.refresh_token.unwrap();
        assert!(services.refresh_access_token(&refresh, "trusted-client").is_err());
        assert_eq!(services.store().refresh_token_count(), 0);
    }

    #[test]
    fn test_issuing_sweeps_unread_expired_tokens() {
        let services = TokenServices::new(Duration::ZERO, Duration::ZERO);
        let auth = OAuth2Authentication {
            client: client("trusted-client"),
            user: None,
        };
        for _ in 0..5 {
            services.create_access_token(auth.clone(), false);
        }
        services.create_access_token(user_auth(), true);
        assert_eq!(services.store().access_token_count(), 1);
        assert_eq!(services.store().refresh_token_count(), 1);

        let live = TokenServices::new(Duration::from_secs(60), Duration::from_secs(600));
        live.create_access_token(auth.clone(), false);
        live.create_access_token(auth, false);
        assert_eq!(live.store().access_token_count(), 2);
    }

    #[test]
    fn test_revoke() {
        let services = services();
        let token = services.create_access_token(user_auth(), true);
        assert!(services.revoke(&token.value));
        assert!(!services.revoke(&token.value));
        assert_eq!(services.store().refresh_token_count(), 0);
    }
}
