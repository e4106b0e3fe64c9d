//! OAuth2 token service.
//!
//! A minimal authorization server: clients trade their secret for a client
//! token, trusted clients trade a user's password for a refreshable user
//! token, and [`AuthenticationManager`] resolves tokens for the server's
//! bearer guard.
//!
//! | Route | Guard | Body | Result |
//! |---|---|---|---|
//! | `POST /client/authenticate` | none | `{"clientId","clientSecret"}` | `{"accessToken","clientId","expiration"}` |
//! | `POST /user/authenticate` | client `ROLE_CLIENT` + `trust` | `{"username","password"}` | `{"accessToken","username","expiration","refreshToken"}` |
//! | `POST /user/refresh` | client `ROLE_CLIENT` + `trust` | `{"refreshToken"}` | `{"accessToken","expiration","refreshToken"}` |
//! | `GET /user/get` | user `ROLE_USER` | none | `{"username","isActive":true}` |

mod clients;
mod granter;
mod tokens;
mod users;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::Method;
use serde::{Deserialize, Serialize};
use tessera_config::OAuth2Config;
use tessera_core::{CallerIdentity, ClientIdentity, RequestContext, ServiceError, TokenAuthenticator};
use tessera_server::{AccessPolicy, HandlerError, HandlerRegistry, Router};
use thiserror::Error;

pub use clients::{ClientDetails, ClientRegistry};
pub use granter::{Grant, TokenGranter};
pub use tokens::{AccessToken, OAuth2Authentication, TokenServices, TokenStore};
pub use users::{UserDetails, UserDetailsService, ROLE_USER};

/// Authority a client needs to authenticate users.
pub const ROLE_CLIENT: &str = "ROLE_CLIENT";

/// Authentication failures. All render as 401.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OAuthError {
    /// Unknown client or wrong secret.
    #[error("Bad client credentials")]
    BadClientCredentials,

    /// Wrong user password.
    #[error("Bad user credentials")]
    BadUserCredentials,

    /// The access token is not known.
    #[error("Invalid access token")]
    InvalidToken,

    /// The access token has expired.
    #[error("Access token expired")]
    ExpiredToken,

    /// The refresh token is unknown, expired, or held by another client.
    #[error("Invalid refresh token")]
    InvalidRefreshToken,
}

impl From<OAuthError> for ServiceError {
    fn from(err: OAuthError) -> Self {
        ServiceError::authentication(err.to_string())
    }
}

impl From<OAuthError> for HandlerError {
    fn from(err: OAuthError) -> Self {
        HandlerError::Service(err.into())
    }
}

/// Resolves bearer tokens for guarded routes.
#[derive(Debug, Clone)]
pub struct AuthenticationManager {
    tokens: Arc<TokenServices>,
}

impl AuthenticationManager {
    /// Resolves tokens issued by `tokens`.
    pub fn new(tokens: Arc<TokenServices>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl TokenAuthenticator for AuthenticationManager {
    async fn authenticate(&self, token: &str) -> Result<CallerIdentity, ServiceError> {
        self.tokens
            .load_authentication(token)
            .map(OAuth2Authentication::into_caller)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                e.into()
            })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientCredentials {
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientToken {
    access_token: String,
    client_id: String,
    expiration: i64,
}

#[derive(Debug, Deserialize)]
struct UserCredentials {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserToken {
    access_token: String,
    username: String,
    expiration: i64,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshedToken {
    access_token: String,
    expiration: i64,
    refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserInfo {
    username: String,
    is_active: bool,
}

fn calling_client(ctx: &RequestContext) -> Result<ClientIdentity, ServiceError> {
    ctx.identity()
        .client()
        .cloned()
        .ok_or_else(|| ServiceError::authentication("no client token"))
}

/// The token endpoints.
#[derive(Debug, Clone)]
pub struct OAuth2Service {
    clients: Arc<ClientRegistry>,
    tokens: Arc<TokenServices>,
    granter: TokenGranter,
}

impl OAuth2Service {
    /// Builds the registries from configuration.
    pub fn from_config(config: &OAuth2Config) -> Self {
        let clients = Arc::new(ClientRegistry::from_config(&config.clients));
        let users = Arc::new(UserDetailsService::new(config.user_password.clone()));
        let tokens = Arc::new(TokenServices::new(
            Duration::from_secs(config.access_token_validity_secs),
            Duration::from_secs(config.refresh_token_validity_secs),
        ));
        let granter = TokenGranter::new(Arc::clone(&clients), users, Arc::clone(&tokens));
        Self {
            clients,
            tokens,
            granter,
        }
    }

    /// The authenticator backing the bearer guard.
    pub fn authenticator(&self) -> Arc<AuthenticationManager> {
        Arc::new(AuthenticationManager::new(Arc::clone(&self.tokens)))
    }

    /// Token services, shared with the authenticator.
    pub fn tokens(&self) -> &Arc<TokenServices> {
        &self.tokens
    }

    /// Client-credentials login.
    pub fn authenticate_client(&self, client_id: &str, secret: &str) -> Result<AccessToken, OAuthError> {
        self.clients.authenticate(client_id, secret)?;
        let token = self.granter.grant(Grant::ClientCredentials {
            client_id: client_id.to_string(),
        })?;
        tracing::info!(client_id, "Client authenticated");
        Ok(token)
    }

    /// Password login through an authenticated client.
    pub fn authenticate_user(
        &self,
        client: ClientIdentity,
        username: &str,
        password: &str,
    ) -> Result<AccessToken, OAuthError> {
        let client_id = client.id.clone();
        let token = self.granter.grant(Grant::Password {
            client,
            username: username.to_string(),
            password: password.to_string(),
        })?;
        tracing::info!(%client_id, username, "User authenticated");
        Ok(token)
    }

    /// Routes and handlers.
    pub fn routes(&self) -> (Router, HandlerRegistry) {
        let mut router = Router::new();
        router.add_route(Method::POST, "/client/authenticate", "oauth2.client.authenticate");
        router.add_guarded_route(
            Method::POST,
            "/user/authenticate",
            "oauth2.user.authenticate",
            AccessPolicy::client_role(ROLE_CLIENT),
        );
        router.add_guarded_route(
            Method::POST,
            "/user/refresh",
            "oauth2.user.refresh",
            AccessPolicy::client_role(ROLE_CLIENT),
        );
        router.add_guarded_route(
            Method::GET,
            "/user/get",
            "oauth2.user.get",
            AccessPolicy::user_role(ROLE_USER),
        );

        let mut handlers = HandlerRegistry::new();

        let svc = self.clone();
        handlers.register(
            "oauth2.client.authenticate",
            move |_ctx, req: ClientCredentials| {
                let result = svc.authenticate_client(&req.client_id, &req.client_secret);
                async move {
                    let token = result?;
                    Ok::<_, HandlerError>(ClientToken {
                        access_token: token.value,
                        client_id: req.client_id,
                        expiration: token.expiration,
                    })
                }
            },
        );

        let svc = self.clone();
        handlers.register("oauth2.user.authenticate", move |ctx, req: UserCredentials| {
            let result = calling_client(&ctx).map(|client| {
                svc.authenticate_user(client, &req.username, &req.password)
            });
            async move {
                let token = result??;
                Ok::<_, HandlerError>(UserToken {
                    access_token: token.value,
                    username: req.username,
                    expiration: token.expiration,
                    refresh_token: token.refresh_token,
                })
            }
        });

        let svc = self.clone();
        handlers.register("oauth2.user.refresh", move |ctx, req: RefreshRequest| {
            let result = calling_client(&ctx)
                .map(|client| svc.tokens.refresh_access_token(&req.refresh_token, &client.id));
            async move {
                let token = result??;
                Ok::<_, HandlerError>(RefreshedToken {
                    access_token: token.value,
                    expiration: token.expiration,
                    refresh_token: token.refresh_token,
                })
            }
        });

        handlers.register_no_body("oauth2.user.get", |ctx| {
            let user = ctx
                .identity()
                .user()
                .map(|user| user.id.clone())
                .ok_or_else(|| ServiceError::authentication("no user token"));
            async move {
                Ok::<_, HandlerError>(UserInfo {
                    username: user?,
                    is_active: true,
                })
            }
        });

        (router, handlers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn service() -> OAuth2Service {
        OAuth2Service::from_config(&OAuth2Config::default())
    }

    #[tokio::test]
    async fn test_authenticator_resolves_user_token() {
        let svc = service();
        let client = svc
            .clients
            .authenticate("trusted-client", "trusted-client-password")
            .unwrap()
            .identity();
        let token = svc.authenticate_user(client, "amy", "password").unwrap();

        let identity = svc.authenticator().authenticate(&token.value).await.unwrap();
        assert!(identity.user_has_authority(ROLE_USER));
        assert!(identity.client_has_authority(ROLE_CLIENT));
        assert_eq!(identity.user().unwrap().id, "amy");
    }

    #[tokio::test]
    async fn test_unknown_token_is_401() {
        let err = service()
            .authenticator()
            .authenticate("1234-abcd")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_bad_client_secret() {
        assert_eq!(
            service().authenticate_client("trusted-client", "nope"),
            Err(OAuthError::BadClientCredentials)
        );
    }

    #[test]
    fn test_routes_are_guarded() {
        let (router, handlers) = service().routes();
        let m = router.match_route(&Method::POST, "/user/authenticate").unwrap();
        assert_eq!(m.policy(), Some(&AccessPolicy::client_role(ROLE_CLIENT)));
        let m = router.match_route(&Method::POST, "/client/authenticate").unwrap();
        assert!(m.policy().is_none());
        assert_eq!(handlers.len(), 4);
    }
}
