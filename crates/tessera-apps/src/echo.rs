//! Echo service and the proxy that calls it.
//!
//! `POST /example/echo` with `{"message": "..."}` returns the message as a
//! JSON string. `GET /proxy?message=...` calls the echo service through an
//! [`EchoClient`] (in-process or over HTTP) and returns the reply as plain
//! text. When a bearer guard is configured both routes require a user token.

use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use serde::Deserialize;
use serde_json::json;
use tessera_core::ServiceError;
use tessera_server::{AccessPolicy, HandlerError, HandlerRegistry, Reply, Router};

/// The echo protocol.
#[async_trait]
pub trait Echo: Send + Sync {
    /// Returns `message` unchanged.
    async fn echo(&self, message: &str) -> Result<String, ServiceError>;
}

/// In-process echo.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoService;

#[async_trait]
impl Echo for EchoService {
    async fn echo(&self, message: &str) -> Result<String, ServiceError> {
        Ok(message.to_string())
    }
}

/// Echo reached over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteEcho {
    http: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl RemoteEcho {
    /// `base_url` is the remote echo service's mount point.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token: None,
        }
    }

    /// The same endpoint, called with `token`.
    #[must_use]
    pub fn with_bearer_token(&self, token: Option<&str>) -> Self {
        Self {
            bearer_token: token.map(str::to_string),
            ..self.clone()
        }
    }
}

#[async_trait]
impl Echo for RemoteEcho {
    async fn echo(&self, message: &str) -> Result<String, ServiceError> {
        let url = format!("{}/example/echo", self.base_url);
        let external = |e: reqwest::Error| ServiceError::external(e.to_string(), Some("echo"));

        let mut request = self.http.post(&url).json(&json!({ "message": message }));
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(external)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::external(
                format!("echo returned {status}"),
                Some("echo"),
            ));
        }
        response.json().await.map_err(external)
    }
}

/// Echo, local or remote.
#[derive(Debug, Clone)]
pub enum EchoClient {
    /// The echo service in this process.
    Local(Arc<EchoService>),
    /// An echo service reached through the service directory.
    Remote(RemoteEcho),
}

impl EchoClient {
    /// Echoes on behalf of a caller holding `token`. Remote calls forward it.
    pub async fn echo_as(&self, message: &str, token: Option<&str>) -> Result<String, ServiceError> {
        match self {
            Self::Local(service) => service.echo(message).await,
            Self::Remote(remote) => remote.with_bearer_token(token).echo(message).await,
        }
    }
}

#[async_trait]
impl Echo for EchoClient {
    async fn echo(&self, message: &str) -> Result<String, ServiceError> {
        self.echo_as(message, None).await
    }
}

#[derive(Debug, Deserialize)]
struct EchoRequest {
    message: String,
}

/// Routes for the echo endpoint and the proxy.
#[derive(Debug, Clone)]
pub struct EchoRoutes {
    service: Arc<EchoService>,
    client: EchoClient,
    policy: Option<AccessPolicy>,
}

impl EchoRoutes {
    /// Serves `service` and proxies through `client`.
    pub fn new(service: Arc<EchoService>, client: EchoClient) -> Self {
        Self {
            service,
            client,
            policy: None,
        }
    }

    /// Guards both routes with `policy`.
    #[must_use]
    pub fn guarded(mut self, policy: AccessPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Routes and handlers.
    pub fn routes(&self) -> (Router, HandlerRegistry) {
        let mut router = Router::new();
        for (method, path, operation_id) in [
            (Method::POST, "/example/echo", "echo.echo"),
            (Method::GET, "/proxy", "echo.proxy"),
        ] {
            match &self.policy {
                Some(policy) => router.add_guarded_route(method, path, operation_id, policy.clone()),
                None => router.add_route(method, path, operation_id),
            }
        }

        let mut handlers = HandlerRegistry::new();

        let service = Arc::clone(&self.service);
        handlers.register("echo.echo", move |_ctx, req: EchoRequest| {
            let service = Arc::clone(&service);
            async move { Ok::<_, HandlerError>(service.echo(&req.message).await?) }
        });

        let client = self.client.clone();
        handlers.register_raw("echo.proxy", move |ctx, _body| {
            let client = client.clone();
            async move {
                let message = ctx
                    .query()
                    .get("message")
                    .ok_or_else(|| ServiceError::validation("Missing parameter: message"))?;
                let reply = client.echo_as(message, ctx.bearer_token()).await?;
                Ok::<_, HandlerError>(Reply::text(reply))
            }
        });

        (router, handlers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_echo() {
        let client = EchoClient::Local(Arc::new(EchoService));
        assert_eq!(client.echo("Test Message").await.unwrap(), "Test Message");
    }

    #[tokio::test]
    async fn test_remote_echo_unreachable() {
        let client = EchoClient::Remote(RemoteEcho::new(reqwest::Client::new(), "http://127.0.0.1:9"));
        let err = client.echo_as("hi", Some("token")).await.unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_guarded_routes() {
        let routes = EchoRoutes::new(
            Arc::new(EchoService),
            EchoClient::Local(Arc::new(EchoService)),
        )
        .guarded(AccessPolicy::user_role("ROLE_USER"));
        let (router, handlers) = routes.routes();
        let m = router.match_route(&Method::GET, "/proxy").unwrap();
        assert!(m.policy().is_some());
        assert!(handlers.contains("echo.echo"));
    }
}
