//! Handler registration and dispatch.
//!
//! Handlers are registered against an operation ID and stored type-erased.
//! Three registration styles cover the services:
//!
//! - [`HandlerRegistry::register`]: JSON body in, JSON body out.
//! - [`HandlerRegistry::register_no_body`]: no body, JSON out.
//! - [`HandlerRegistry::register_raw`]: the handler reads the context and raw
//!   body itself and chooses status, content type and body. Used by the
//!   query-string and plain-text services.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use tessera_core::{RequestContext, ServiceError};
use thiserror::Error;

/// A handler's response, before the server adds framing headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// HTTP status.
    pub status: StatusCode,
    /// `Content-Type`, omitted when `None`.
    pub content_type: Option<&'static str>,
    /// Response body.
    pub body: Bytes,
}

impl Reply {
    /// 200 with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Serialization`] if `value` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, HandlerError> {
        let body =
            serde_json::to_vec(value).map_err(|e| HandlerError::Serialization(e.to_string()))?;
        Ok(Self {
            status: StatusCode::OK,
            content_type: Some("application/json"),
            body: Bytes::from(body),
        })
    }

    /// 200 with a `text/plain` body.
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: Some("text/plain; charset=utf-8"),
            body: Bytes::from(body.into()),
        }
    }

    /// 200 with an empty body.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            status: StatusCode::OK,
            content_type: None,
            body: Bytes::new(),
        }
    }

    /// Replaces the status.
    #[must_use]
    pub const fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

/// Boxed handler future.
pub type BoxedHandlerResult = Pin<Box<dyn Future<Output = Result<Reply, HandlerError>> + Send>>;

/// A type-erased handler.
pub type ErasedHandler = Arc<dyn Fn(RequestContext, Bytes) -> BoxedHandlerResult + Send + Sync>;

/// Errors raised while running a handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The request body did not decode.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// The response did not encode.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The service reported an error.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Any other failure.
    #[error("Handler error: {0}")]
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Converts into the service error the server renders.
    #[must_use]
    pub fn into_service_error(self) -> ServiceError {
        match self {
            Self::Deserialization(message) => {
                ServiceError::validation(format!("Invalid request body: {message}"))
            }
            Self::Serialization(message) => ServiceError::internal(message),
            Self::Service(err) => err,
            Self::Custom(err) => ServiceError::internal(err.to_string()),
        }
    }
}

/// Error returned by [`HandlerRegistry::invoke`].
#[derive(Debug, Error)]
pub enum InvokeError {
    /// No handler is registered for the operation.
    #[error("No handler registered for operation '{0}'")]
    HandlerNotFound(String),

    /// The handler ran and failed.
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Maps operation IDs to handlers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, ErasedHandler>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("operations", &self.operation_ids())
            .finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a JSON handler. An empty body decodes as JSON `null`.
    pub fn register<Req, Res, F, Fut>(&mut self, operation_id: impl Into<String>, handler: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
        F: Fn(RequestContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Res, HandlerError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |ctx: RequestContext, body: Bytes| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let body: &[u8] = if body.is_empty() { b"null" } else { &body };
                let request: Req = serde_json::from_slice(body)
                    .map_err(|e| HandlerError::Deserialization(e.to_string()))?;
                let response = handler(ctx, request).await?;
                Reply::json(&response)
            })
        });
        self.handlers.insert(operation_id.into(), erased);
    }

    /// Registers a handler that ignores the request body.
    pub fn register_no_body<Res, F, Fut>(&mut self, operation_id: impl Into<String>, handler: F)
    where
        Res: Serialize + Send + 'static,
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Res, HandlerError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |ctx: RequestContext, _body: Bytes| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let response = handler(ctx).await?;
                Reply::json(&response)
            })
        });
        self.handlers.insert(operation_id.into(), erased);
    }

    /// Registers a handler that builds its own [`Reply`].
    pub fn register_raw<F, Fut>(&mut self, operation_id: impl Into<String>, handler: F)
    where
        F: Fn(RequestContext, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
    {
        let erased: ErasedHandler =
            Arc::new(move |ctx: RequestContext, body: Bytes| Box::pin(handler(ctx, body)));
        self.handlers.insert(operation_id.into(), erased);
    }

    /// Moves every handler of `other` into this registry.
    pub fn merge(&mut self, other: Self) {
        self.handlers.extend(other.handlers);
    }

    /// Looks up a handler.
    #[must_use]
    pub fn get(&self, operation_id: &str) -> Option<&ErasedHandler> {
        self.handlers.get(operation_id)
    }

    /// Checks if a handler is registered for an operation.
    #[must_use]
    pub fn contains(&self, operation_id: &str) -> bool {
        self.handlers.contains_key(operation_id)
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered operation IDs, sorted.
    #[must_use]
    pub fn operation_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Runs the handler for `operation_id`.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::HandlerNotFound`] for an unknown operation and
    /// [`InvokeError::Handler`] when the handler fails.
    pub async fn invoke(
        &self,
        operation_id: &str,
        ctx: RequestContext,
        body: Bytes,
    ) -> Result<Reply, InvokeError> {
        let handler = self
            .handlers
            .get(operation_id)
            .ok_or_else(|| InvokeError::HandlerNotFound(operation_id.to_string()))?;
        Ok(handler(ctx, body).await?)
    }
}
