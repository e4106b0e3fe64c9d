//! Bearer-token access control.
//!
//! A route may carry an [`AccessPolicy`]. Before such a route's handler runs,
//! the [`BearerGuard`] authenticates the `Authorization: Bearer` token and
//! checks the policy. Every failure is an authentication error, which the
//! server renders as a bodyless 401.

use std::sync::Arc;

use tessera_core::{CallerIdentity, RequestContext, ServiceError, TokenAuthenticator};

/// Requirements a caller must meet to reach a guarded route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    client_authority: Option<String>,
    scope: Option<String>,
    user_authority: Option<String>,
}

impl AccessPolicy {
    /// Requires any valid token.
    #[must_use]
    pub fn authenticated() -> Self {
        Self::default()
    }

    /// Requires a client token holding `authority` and the `trust` scope.
    #[must_use]
    pub fn client_role(authority: impl Into<String>) -> Self {
        Self::default()
            .with_client_authority(authority)
            .with_scope("trust")
    }

    /// Requires a user token whose user holds `authority`.
    #[must_use]
    pub fn user_role(authority: impl Into<String>) -> Self {
        Self::default().with_user_authority(authority)
    }

    /// Adds a client authority requirement.
    #[must_use]
    pub fn with_client_authority(mut self, authority: impl Into<String>) -> Self {
        self.client_authority = Some(authority.into());
        self
    }

    /// Adds a client scope requirement.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Adds a user authority requirement.
    #[must_use]
    pub fn with_user_authority(mut self, authority: impl Into<String>) -> Self {
        self.user_authority = Some(authority.into());
        self
    }

    /// Checks an authenticated caller against the policy.
    ///
    /// # Errors
    ///
    /// Returns an authorization error naming the first unmet requirement.
    pub fn check(&self, identity: &CallerIdentity) -> Result<(), ServiceError> {
        if let Some(authority) = &self.client_authority {
            if !identity.client_has_authority(authority) {
                return Err(ServiceError::authorization(format!(
                    "client lacks authority {authority}"
                )));
            }
        }
        if let Some(scope) = &self.scope {
            if !identity.client_has_scope(scope) {
                return Err(ServiceError::authorization(format!(
                    "client lacks scope {scope}"
                )));
            }
        }
        if let Some(authority) = &self.user_authority {
            if !identity.user_has_authority(authority) {
                return Err(ServiceError::authorization(format!(
                    "user lacks authority {authority}"
                )));
            }
        }
        Ok(())
    }
}

/// Authenticates bearer tokens for guarded routes.
#[derive(Clone)]
pub struct BearerGuard {
    authenticator: Arc<dyn TokenAuthenticator>,
}

impl std::fmt::Debug for BearerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerGuard").finish_non_exhaustive()
    }
}

impl BearerGuard {
    /// Creates a guard backed by `authenticator`.
    #[must_use]
    pub fn new(authenticator: Arc<dyn TokenAuthenticator>) -> Self {
        Self { authenticator }
    }

    /// Authenticates the request and checks `policy`, returning the caller.
    ///
    /// # Errors
    ///
    /// Returns an authentication error if the token is missing, unknown or
    /// does not satisfy the policy.
    pub async fn authorize(
        &self,
        ctx: &RequestContext,
        policy: &AccessPolicy,
    ) -> Result<CallerIdentity, ServiceError> {
        let token = ctx
            .bearer_token()
            .ok_or_else(|| ServiceError::authentication("missing bearer token"))?;
        let identity = self.authenticator.authenticate(token).await?;
        policy.check(&identity)?;
        Ok(identity)
    }
}
