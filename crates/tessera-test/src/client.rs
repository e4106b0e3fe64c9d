//! In-memory client.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use serde::Serialize;
use tessera_server::Server;

use crate::error::TestError;
use crate::request::TestRequestBuilder;
use crate::response::TestResponse;

/// Drives a [`Server`] without a socket.
///
/// Requests go through [`Server::dispatch`], so routing, the bearer guard,
/// timeouts and error rendering behave as they do over the wire.
#[derive(Clone)]
#[must_use]
pub struct TestClient {
    server: Arc<Server>,
    default_headers: Vec<(String, String)>,
    remote_addr: Option<SocketAddr>,
}

impl std::fmt::Debug for TestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClient")
            .field("default_headers", &self.default_headers)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

impl TestClient {
    /// Wraps a server. Lifecycle hooks are not run.
    pub fn new(server: Server) -> Self {
        Self::from_arc(Arc::new(server))
    }

    /// Wraps a shared server.
    pub fn from_arc(server: Arc<Server>) -> Self {
        Self {
            server,
            default_headers: Vec::new(),
            remote_addr: Some(SocketAddr::from(([127, 0, 0, 1], 50_000))),
        }
    }

    /// Wraps a server and runs its startup hooks.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Lifecycle`] if a startup hook fails.
    pub async fn started(server: Server) -> Result<Self, TestError> {
        let client = Self::new(server);
        client
            .server
            .start()
            .await
            .map_err(|e| TestError::Lifecycle(e.to_string()))?;
        Ok(client)
    }

    /// Runs the server's shutdown hooks.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Lifecycle`] if a shutdown hook fails.
    pub async fn shutdown(&self) -> Result<(), TestError> {
        self.server
            .stop()
            .await
            .map_err(|e| TestError::Lifecycle(e.to_string()))
    }

    /// The wrapped server.
    #[must_use]
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Adds a header sent with every request.
    pub fn with_default_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Sets the peer address the server sees.
    pub const fn with_remote_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.remote_addr = addr;
        self
    }

    /// Starts a GET request.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::GET, uri)
    }

    /// Starts a POST request.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::POST, uri)
    }

    /// Starts a request with any method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        let mut builder = TestRequestBuilder::new(method, uri);
        for (name, value) in &self.default_headers {
            builder = builder.header(name, value);
        }
        TestClientRequest {
            client: self,
            builder,
        }
    }
}

/// A request bound to a [`TestClient`].
#[must_use]
#[derive(Debug)]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    builder: TestRequestBuilder,
}

impl TestClientRequest<'_> {
    /// Sets a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Sets `Authorization: Bearer <token>`.
    pub fn bearer_token(mut self, token: impl AsRef<str>) -> Self {
        self.builder = self.builder.bearer_token(token);
        self
    }

    /// Appends a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.builder = self.builder.query(key, value);
        self
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.builder = self.builder.body(body);
        self
    }

    /// Sets a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.builder = self.builder.json(value);
        self
    }

    /// Dispatches the request.
    ///
    /// # Errors
    ///
    /// Returns a [`TestError`] if the request could not be built or the
    /// response body could not be read.
    pub async fn send(self) -> Result<TestResponse, TestError> {
        let request = self.builder.build()?;
        let response = self
            .client
            .server
            .dispatch(request, self.client.remote_addr)
            .await;
        TestResponse::from_http(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use tessera_server::{HandlerError, HandlerRegistry, Reply, Router};

    fn server() -> Server {
        let mut router = Router::new();
        router.add_route(Method::GET, "/", "greet");
        router.add_route(Method::POST, "/count", "count");
        router.add_route(Method::GET, "/caller", "caller");

        let mut handlers = HandlerRegistry::new();
        handlers.register_raw("greet", |ctx, _body| async move {
            let name = ctx.query().get("name").unwrap_or("Thomas").to_string();
            Ok::<_, HandlerError>(Reply::text(format!("Hello, {name}!")))
        });
        handlers.register_no_body("count", |_ctx| async { Ok::<_, HandlerError>(0) });
        handlers.register_raw("caller", |ctx, _body| async move {
            let caller = ctx.header("x-caller").unwrap_or("anonymous").to_string();
            Ok::<_, HandlerError>(Reply::text(caller))
        });

        Server::builder().router(router).handlers(handlers).build()
    }

    #[tokio::test]
    async fn test_query_request() {
        let client = TestClient::new(server());
        let res = client.get("/").query("name", "Amy").send().await.unwrap();
        res.assert_status(StatusCode::OK).assert_text("Hello, Amy!");
        assert!(res.request_id().is_some());
    }

    #[tokio::test]
    async fn test_json_request() {
        let client = TestClient::new(server());
        client
            .post("/count")
            .send()
            .await
            .unwrap()
            .assert_status(StatusCode::OK)
            .assert_json(&serde_json::json!(0));
    }

    #[tokio::test]
    async fn test_lifecycle_marks_ready() {
        let client = TestClient::started(server()).await.unwrap();
        client
            .get("/ready")
            .send()
            .await
            .unwrap()
            .assert_status(StatusCode::OK);

        client.shutdown().await.unwrap();
        client
            .get("/ready")
            .send()
            .await
            .unwrap()
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_default_headers() {
        let client = TestClient::new(server()).with_default_header("x-caller", "amy");
        client
            .get("/caller")
            .send()
            .await
            .unwrap()
            .assert_status(StatusCode::OK)
            .assert_header("content-type", "text/plain; charset=utf-8")
            .assert_text("amy");
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let client = TestClient::new(server());
        client
            .get("/missing")
            .send()
            .await
            .unwrap()
            .assert_status(StatusCode::NOT_FOUND);
    }
}
