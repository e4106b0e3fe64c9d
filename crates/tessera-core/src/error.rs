//! Error types for Tessera.
//!
//! [`ServiceError`] is the single error type that handlers hand back to the
//! server. Service crates keep their own narrow `thiserror` enums and convert
//! into it with `From`, so the server only has to know how to render one type.
//!
//! | `ErrorCategory` | HTTP status |
//! |---|---|
//! | `Validation` | 400 |
//! | `Domain` | 400 |
//! | `Conflict` | 400 |
//! | `Authentication` | 401 |
//! | `Authorization` | 401 |
//! | `NotFound` | 404 |
//! | `Internal` | 500 |
//! | `External` | 502 |
//! | `Timeout` | 504 |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Categories of errors for classification and rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Request validation errors (malformed input, missing parameters).
    Validation,
    /// Explicitly modeled domain failures the caller can recover from.
    Domain,
    /// Invalid or missing credentials.
    Authentication,
    /// Valid credentials without the required role or scope.
    Authorization,
    /// Resource not found.
    NotFound,
    /// Uniqueness or state conflict.
    Conflict,
    /// Internal server errors.
    Internal,
    /// Downstream service failures.
    External,
    /// Request timeout.
    Timeout,
}

impl ErrorCategory {
    /// Returns the HTTP status code for this category.
    ///
    /// Authorization failures are reported as 401 like authentication
    /// failures; the bearer guard does not distinguish the two to callers.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Validation | Self::Domain | Self::Conflict => StatusCode::BAD_REQUEST,
            Self::Authentication | Self::Authorization => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::External => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

/// Standard error type for Tessera services.
///
/// # Example
///
/// ```
/// use tessera_core::{ErrorCategory, ServiceError};
///
/// let err = ServiceError::domain("K_TOO_LARGE", "k is too large")
///     .with_details(serde_json::json!({ "k": 3 }));
/// assert_eq!(err.category(), ErrorCategory::Domain);
/// assert_eq!(err.status_code().as_u16(), 400);
/// ```
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Request validation failed.
    #[error("{message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// A modeled domain failure, rendered with its own code and details.
    #[error("{message}")]
    Domain {
        /// Machine-readable code, e.g. `K_TOO_LARGE`.
        code: String,
        /// Human-readable error message.
        message: String,
        /// Structured context for the caller.
        details: Option<serde_json::Value>,
    },

    /// Authentication failed.
    #[error("Authentication error: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
    },

    /// Authenticated, but lacking a role or scope.
    #[error("Authorization denied: {message}")]
    Authorization {
        /// Human-readable error message.
        message: String,
    },

    /// Resource not found.
    #[error("Not found: {message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
        /// The type of resource that was not found.
        resource_type: Option<String>,
        /// The identifier of the resource.
        resource_id: Option<String>,
    },

    /// Conflict, such as a unique index violation.
    #[error("Conflict: {message}")]
    Conflict {
        /// Human-readable error message.
        message: String,
    },

    /// Internal server error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Downstream service error.
    #[error("External service error: {message}")]
    External {
        /// Human-readable error message.
        message: String,
        /// The name of the external service.
        service: Option<String>,
    },

    /// Request timeout.
    #[error("Timeout: {message}")]
    Timeout {
        /// Human-readable error message.
        message: String,
    },
}

impl ServiceError {
    /// Creates a validation error with a message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a domain error with a machine-readable code.
    #[must_use]
    pub fn domain(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Domain {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Attaches structured details to a domain error. Other variants are
    /// returned unchanged.
    #[must_use]
    pub fn with_details(self, value: serde_json::Value) -> Self {
        match self {
            Self::Domain { code, message, .. } => Self::Domain {
                code,
                message,
                details: Some(value),
            },
            other => other,
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates an authorization error.
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            resource_type: None,
            resource_id: None,
        }
    }

    /// Creates a not found error with resource context.
    #[must_use]
    pub fn not_found_resource(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        let resource_type = resource_type.into();
        let resource_id = resource_id.into();
        Self::NotFound {
            message: format!("{resource_type} '{resource_id}' not found"),
            resource_type: Some(resource_type),
            resource_id: Some(resource_id),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a downstream service error.
    #[must_use]
    pub fn external(message: impl Into<String>, service: Option<impl Into<String>>) -> Self {
        Self::External {
            message: message.into(),
            service: service.map(Into::into),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Domain { .. } => ErrorCategory::Domain,
            Self::Authentication { .. } => ErrorCategory::Authentication,
            Self::Authorization { .. } => ErrorCategory::Authorization,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::Internal { .. } => ErrorCategory::Internal,
            Self::External { .. } => ErrorCategory::External,
            Self::Timeout { .. } => ErrorCategory::Timeout,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }

    /// Whether the response for this error carries no body.
    ///
    /// Credential failures are reported by status alone.
    #[must_use]
    pub const fn is_bodyless(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Authentication | ErrorCategory::Authorization
        )
    }

    /// Converts this error to a serializable error envelope.
    #[must_use]
    pub fn to_envelope(&self, request_id: Option<&str>) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.error_code(),
                message: self.to_string(),
                category: self.category(),
                details: self.error_details(),
            },
            request_id: request_id.map(ToString::to_string),
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub fn error_code(&self) -> String {
        match self {
            Self::Domain { code, .. } => return code.clone(),
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Authentication { .. } => "AUTHENTICATION_ERROR",
            Self::Authorization { .. } => "AUTHORIZATION_DENIED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            Self::Internal { .. } => "INTERNAL_ERROR",
            Self::External { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
        }
        .to_string()
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Domain { details, .. } => details.clone(),
            Self::NotFound {
                resource_type: Some(rt),
                resource_id: Some(rid),
                ..
            } => Some(serde_json::json!({
                "resource_type": rt,
                "resource_id": rid
            })),
            Self::External {
                service: Some(svc), ..
            } => Some(serde_json::json!({ "service": svc })),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::validation(err.to_string())
    }
}

/// Serializable error envelope for HTTP responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
    /// The request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error detail within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Error category.
    pub category: ErrorCategory,
    /// Additional error details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_envelope_carries_details() {
        let error = ServiceError::domain("K_TOO_LARGE", "k is too large")
            .with_details(serde_json::json!({ "k": 3 }));
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);

        let envelope = error.to_envelope(None);
        assert_eq!(envelope.error.code, "K_TOO_LARGE");
        assert_eq!(envelope.error.message, "k is too large");
        assert_eq!(envelope.error.category, ErrorCategory::Domain);
        assert_eq!(envelope.error.details.unwrap()["k"], 3);
    }

    #[test]
    fn test_with_details_ignores_non_domain() {
        let error = ServiceError::internal("boom").with_details(serde_json::json!(1));
        assert!(error.to_envelope(None).error.details.is_none());
    }

    #[test]
    fn test_credential_errors_are_bodyless_401() {
        let authn = ServiceError::authentication("missing token");
        let authz = ServiceError::authorization("ROLE_USER required");
        assert_eq!(authn.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(authz.status_code(), StatusCode::UNAUTHORIZED);
        assert!(authn.is_bodyless());
        assert!(authz.is_bodyless());
        assert!(!ServiceError::validation("x").is_bodyless());
    }

    #[test]
    fn test_conflict_maps_to_bad_request() {
        let error = ServiceError::conflict("name already exists");
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(error.error_code(), "CONFLICT");
    }

    #[test]
    fn test_not_found_resource() {
        let error = ServiceError::not_found_resource("Person", "zoe");
        assert_eq!(error.category(), ErrorCategory::NotFound);
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert!(error.to_string().contains("zoe"));
    }

    #[test]
    fn test_external_error_names_service() {
        let error = ServiceError::external("connection refused", Some("echo"));
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
        let envelope = error.to_envelope(Some("req-1"));
        assert_eq!(envelope.error.details.unwrap()["service"], "echo");
        assert_eq!(envelope.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn test_envelope_serialization() {
        let error = ServiceError::not_found("no such person");
        let json = serde_json::to_string(&error.to_envelope(Some("req-456"))).unwrap();
        assert!(json.contains("\"code\":\"NOT_FOUND\""));
        assert!(json.contains("\"request_id\":\"req-456\""));
        assert!(json.contains("\"category\":\"not_found\""));
    }

    #[test]
    fn test_json_error_converts_to_validation() {
        let parse: Result<u32, _> = serde_json::from_str("nope");
        let error: ServiceError = parse.unwrap_err().into();
        assert_eq!(error.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_all_categories_map_to_error_status() {
        let categories = [
            ErrorCategory::Validation,
            ErrorCategory::Domain,
            ErrorCategory::Authentication,
            ErrorCategory::Authorization,
            ErrorCategory::NotFound,
            ErrorCategory::Conflict,
            ErrorCategory::Internal,
            ErrorCategory::External,
            ErrorCategory::Timeout,
        ];
        for category in categories {
            let status = category.default_status_code();
            assert!(status.is_client_error() || status.is_server_error());
        }
    }
}
