//! End-user lookup.

use tessera_core::UserIdentity;

use super::OAuthError;

/// Authority every user is granted.
pub const ROLE_USER: &str = "ROLE_USER";

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDetails {
    /// Username.
    pub username: String,
    /// Granted authorities.
    pub authorities: Vec<String>,
}

impl UserDetails {
    /// The identity attached to requests made with this user's tokens.
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.username.clone(),
            authorities: self.authorities.clone(),
        }
    }
}

/// Accepts any username paired with the one configured password.
#[derive(Debug, Clone)]
pub struct UserDetailsService {
    password: String,
}

impl UserDetailsService {
    /// Users authenticate with `password`.
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }

    /// Loads `username`. Every name exists.
    pub fn load_user(&self, username: &str) -> UserDetails {
        UserDetails {
            username: username.to_string(),
            authorities: vec![ROLE_USER.to_string()],
        }
    }

    /// Checks a username and password.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<UserDetails, OAuthError> {
        if username.is_empty() || password != self.password {
            return Err(OAuthError::BadUserCredentials);
        }
        Ok(self.load_user(username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_user_with_password() {
        let users = UserDetailsService::new("password");
        let user = users.authenticate("amy", "password").unwrap();
        assert_eq!(user.username, "amy");
        assert_eq!(user.authorities, vec![ROLE_USER]);
        assert_eq!(
            users.authenticate("amy", "guess"),
            Err(OAuthError::BadUserCredentials)
        );
        assert!(users.authenticate("", "password").is_err());
    }
}
