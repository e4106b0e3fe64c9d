//! HTTP server.
//!
//! One hyper http1 connection task per accepted socket. Each request is
//! collected into memory, routed, optionally authorized by the bearer guard,
//! and handed to its registered handler. `GET /health` and `GET /ready` are
//! answered by the server itself.
//!
//! Startup hooks run before the first connection is accepted. Shutdown hooks
//! run after the accept loop stops and open connections have drained (or the
//! shutdown timeout elapsed).

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tessera_core::di::Container;
use tessera_core::{QueryParams, RequestContext, RequestId, ServiceError, TokenAuthenticator};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Semaphore};
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::guard::BearerGuard;
use crate::handler::{HandlerRegistry, InvokeError, Reply};
use crate::health::{HealthCheck, ReadinessCheck};
use crate::lifecycle::{Lifecycle, LifecycleError};
use crate::router::Router;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// HTTP response body type.
pub type ResponseBody = Full<Bytes>;

/// HTTP response type.
pub type HttpResponse = Response<ResponseBody>;

/// Header carrying the per-request ID on every response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Server failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address was invalid or could not be bound.
    #[error("Bind error: {0}")]
    Bind(String),

    /// Socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lifecycle hook failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// The Tessera HTTP server.
pub struct Server {
    config: ServerConfig,
    router: Router,
    handlers: HandlerRegistry,
    guard: Option<BearerGuard>,
    lifecycle: Lifecycle,
    container: Mutex<Container>,
    health: HealthCheck,
    readiness: ReadinessCheck,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("routes", &self.router.route_count())
            .field("handlers", &self.handlers.len())
            .field("guarded", &self.guard.is_some())
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the router.
    #[must_use]
    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// Returns the handler registry.
    #[must_use]
    pub const fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Returns the liveness reporter.
    #[must_use]
    pub const fn health(&self) -> &HealthCheck {
        &self.health
    }

    /// Returns the readiness reporter.
    #[must_use]
    pub const fn readiness(&self) -> &ReadinessCheck {
        &self.readiness
    }

    /// Returns the service container shared with lifecycle hooks.
    #[must_use]
    pub const fn container(&self) -> &Mutex<Container> {
        &self.container
    }

    /// Runs startup hooks and marks the server ready.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Lifecycle`] if a startup hook fails.
    pub async fn start(&self) -> Result<(), ServerError> {
        let mut container = self.container.lock().await;
        self.lifecycle.run_startup(&mut container).await?;
        self.readiness.set_ready(true);
        tracing::info!(
            hooks = self.lifecycle.startup_hook_count(),
            "Startup complete"
        );
        Ok(())
    }

    /// Marks the server not ready and runs shutdown hooks.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Lifecycle`] if any shutdown hook fails.
    pub async fn stop(&self) -> Result<(), ServerError> {
        self.readiness.set_ready(false);
        let mut container = self.container.lock().await;
        self.lifecycle.run_shutdown(&mut container).await?;
        tracing::info!("Shutdown hooks complete");
        Ok(())
    }

    /// Binds the configured address and serves until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if binding or a lifecycle hook fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Binds the configured address and serves until `shutdown` triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if binding or a lifecycle hook fails.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self.config.socket_addr().map_err(|e| {
            ServerError::Bind(format!("Invalid address '{}': {e}", self.config.http_addr()))
        })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(format!("Failed to bind to {addr}: {e}")))?;
        self.run_with_listener(listener, shutdown).await
    }

    /// Serves on an already-bound listener until `shutdown` triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if a lifecycle hook fails. Startup failures abort
    /// before any connection is accepted.
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let server = Arc::new(self);
        server.start().await?;

        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "Server listening");

        let tracker = ConnectionTracker::new();
        let limit = server
            .config
            .max_connections()
            .map(|max| Arc::new(Semaphore::new(max)));

        loop {
            let permit = match &limit {
                Some(semaphore) => tokio::select! {
                    permit = Arc::clone(semaphore).acquire_owned() => permit.ok(),
                    () = shutdown.recv() => break,
                },
                None => None,
            };

            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, remote_addr)) => {
                        let server = Arc::clone(&server);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server.handle_connection(stream, remote_addr, shutdown).await {
                                tracing::debug!(remote_addr = %remote_addr, error = %e, "Connection error");
                            }
                            drop(permit);
                            drop(token);
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                },
                () = shutdown.recv() => break,
            }
        }

        tracing::info!(
            active = tracker.active_connections(),
            timeout = ?server.config.shutdown_timeout(),
            "Shutdown signal received, draining connections"
        );
        server.readiness.set_ready(false);
        drop(listener);

        if tokio::time::timeout(server.config.shutdown_timeout(), tracker.wait_for_shutdown())
            .await
            .is_err()
        {
            tracing::warn!(
                active = tracker.active_connections(),
                "Shutdown timeout reached with connections still open"
            );
        }

        server.stop().await?;
        tracing::info!("Server stopped");
        Ok(())
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: tokio::net::TcpStream,
        remote_addr: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let server = Arc::clone(&self);
        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle_request(req, remote_addr).await) }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.recv() => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        }
    }

    async fn handle_request(&self, req: Request<Incoming>, remote_addr: SocketAddr) -> HttpResponse {
        let (parts, body) = req.into_parts();
        let collected = tokio::time::timeout(self.config.request_timeout(), body.collect()).await;
        let body = match collected {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) => {
                return error_response(&ServiceError::validation(format!(
                    "Failed to read request body: {e}"
                )))
            }
            Err(_) => {
                return error_response(&ServiceError::timeout("Request body collection timed out"))
            }
        };
        self.dispatch(Request::from_parts(parts, body), Some(remote_addr))
            .await
    }

    /// Routes and handles a fully buffered request.
    ///
    /// This is the whole request path minus socket I/O, so in-process tests
    /// drive the server through it directly.
    pub async fn dispatch(&self, req: Request<Bytes>, remote_addr: Option<SocketAddr>) -> HttpResponse {
        let request_id = RequestId::new();
        let (parts, body) = req.into_parts();
        let method = parts.method.clone();
        let path = parts.uri.path().to_string();
        let span = tracing::info_span!("request", request_id = %request_id, method = %method, path = %path);

        async move {
            let ctx = RequestContext::with_request_id(request_id)
                .with_target(parts.method, parts.uri.path())
                .with_query(QueryParams::parse(parts.uri.query().unwrap_or_default()))
                .with_headers(parts.headers)
                .with_remote_addr(remote_addr);

            let mut response = match (&method, path.as_str()) {
                (&Method::GET, "/health") => self.handle_health(),
                (&Method::GET, "/ready") => self.handle_ready(),
                _ => {
                    match tokio::time::timeout(self.config.request_timeout(), self.route(ctx, body))
                        .await
                    {
                        Ok(response) => response,
                        Err(_) => error_response(&ServiceError::timeout("Handler execution timed out")),
                    }
                }
            };

            if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            tracing::debug!(status = response.status().as_u16(), "Request completed");
            response
        }
        .instrument(span)
        .await
    }

    async fn route(&self, ctx: RequestContext, body: Bytes) -> HttpResponse {
        let Some(route_match) = self.router.match_route(ctx.method(), ctx.path()) else {
            return error_response(&ServiceError::not_found(format!(
                "No route for {} {}",
                ctx.method(),
                ctx.path()
            )));
        };

        let operation_id = route_match.operation_id().to_string();
        let policy = route_match.policy().cloned();
        let mut ctx = ctx
            .with_operation_id(operation_id.clone())
            .with_path_params(route_match.into_params());

        if let Some(policy) = policy {
            let Some(guard) = &self.guard else {
                return error_response(&ServiceError::authentication(
                    "route is guarded but no authenticator is configured",
                ));
            };
            match guard.authorize(&ctx, &policy).await {
                Ok(identity) => ctx.set_identity(identity),
                Err(e) => return error_response(&e),
            }
        }

        tracing::debug!(operation_id = %operation_id, caller = %ctx.identity().log_id(), "Dispatching");

        match self.handlers.invoke(&operation_id, ctx, body).await {
            Ok(reply) => reply_response(reply),
            Err(InvokeError::HandlerNotFound(op)) => error_response(&ServiceError::internal(
                format!("No handler registered for operation '{op}'"),
            )),
            Err(InvokeError::Handler(e)) => error_response(&e.into_service_error()),
        }
    }

    fn handle_health(&self) -> HttpResponse {
        let body = serde_json::to_vec(&self.health.status()).unwrap_or_default();
        build_response(StatusCode::OK, Some("application/json"), Bytes::from(body))
    }

    fn handle_ready(&self) -> HttpResponse {
        let status = self.readiness.status();
        let code = if status.ready {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        let body = serde_json::to_vec(&status).unwrap_or_default();
        build_response(code, Some("application/json"), Bytes::from(body))
    }
}

fn build_response(status: StatusCode, content_type: Option<&'static str>, body: Bytes) -> HttpResponse {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    response
}

fn reply_response(reply: Reply) -> HttpResponse {
    build_response(reply.status, reply.content_type, reply.body)
}

fn error_response(err: &ServiceError) -> HttpResponse {
    let status = err.status_code();
    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), error = %err, "Request failed");
    } else {
        tracing::debug!(status = status.as_u16(), error = %err, "Request rejected");
    }

    if err.is_bodyless() {
        return build_response(status, None, Bytes::new());
    }
    let body = serde_json::to_vec(&err.to_envelope(None)).unwrap_or_default();
    build_response(status, Some("application/json"), Bytes::from(body))
}

/// Builder for [`Server`].
#[derive(Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    router: Router,
    handlers: HandlerRegistry,
    authenticator: Option<Arc<dyn TokenAuthenticator>>,
    lifecycle: Lifecycle,
    container: Container,
    readiness: ReadinessCheck,
    service_name: Option<String>,
    service_version: Option<String>,
}

impl ServerBuilder {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the router.
    #[must_use]
    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Sets the handler registry.
    #[must_use]
    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Sets the authenticator behind the bearer guard.
    #[must_use]
    pub fn authenticator(mut self, authenticator: Arc<dyn TokenAuthenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Sets the lifecycle hooks.
    #[must_use]
    pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Sets the service container.
    #[must_use]
    pub fn container(mut self, container: Container) -> Self {
        self.container = container;
        self
    }

    /// Sets the readiness reporter, e.g. one with service checks added.
    #[must_use]
    pub fn readiness(mut self, readiness: ReadinessCheck) -> Self {
        self.readiness = readiness;
        self
    }

    /// Sets the service name reported by `/health`.
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Sets the service version reported by `/health`.
    #[must_use]
    pub fn service_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = Some(version.into());
        self
    }

    /// Builds the server.
    #[must_use]
    pub fn build(self) -> Server {
        let health = HealthCheck::new(
            self.service_name.unwrap_or_else(|| "tessera".to_string()),
            self.service_version
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
        );
        Server {
            config: self.config,
            router: self.router,
            handlers: self.handlers,
            guard: self.authenticator.map(BearerGuard::new),
            lifecycle: self.lifecycle,
            container: Mutex::new(self.container),
            health,
            readiness: self.readiness,
        }
    }
}
