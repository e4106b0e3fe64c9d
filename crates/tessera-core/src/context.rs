//! Request context types.
//!
//! The server builds a [`RequestContext`] for every routed request and hands it
//! to the handler together with the raw body.

use crate::identity::CallerIdentity;
use http::{HeaderMap, Method};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::Instant;
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new time-ordered request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decoded query string, keeping repeated keys and their order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    /// Parses a raw `application/x-www-form-urlencoded` query string.
    ///
    /// Undecodable input yields an empty set rather than an error; handlers
    /// report missing parameters themselves.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self(serde_urlencoded::from_str(raw).unwrap_or_default())
    }

    /// Returns the first value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value for `key`, in query order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Groups values by key.
    #[must_use]
    pub fn to_multimap(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (k, v) in &self.0 {
            map.entry(k.clone()).or_default().push(v.clone());
        }
        map
    }

    /// Returns `true` when no parameters were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Per-request state handed to handlers.
///
/// # Example
///
/// ```
/// use tessera_core::{QueryParams, RequestContext};
///
/// let ctx = RequestContext::new().with_query(QueryParams::parse("name=Amy"));
/// assert_eq!(ctx.query().get("name"), Some("Amy"));
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: RequestId,
    identity: CallerIdentity,
    operation_id: Option<String>,
    method: Method,
    path: String,
    query: QueryParams,
    path_params: HashMap<String, String>,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    started_at: Instant,
}

impl RequestContext {
    /// Creates a new context with a fresh request ID and an anonymous caller.
    #[must_use]
    pub fn new() -> Self {
        Self::with_request_id(RequestId::new())
    }

    /// Creates a new context with the specified request ID.
    #[must_use]
    pub fn with_request_id(request_id: RequestId) -> Self {
        Self {
            request_id,
            identity: CallerIdentity::Anonymous,
            operation_id: None,
            method: Method::GET,
            path: "/".to_string(),
            query: QueryParams::default(),
            path_params: HashMap::new(),
            headers: HeaderMap::new(),
            remote_addr: None,
            started_at: Instant::now(),
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the caller identity.
    #[must_use]
    pub const fn identity(&self) -> &CallerIdentity {
        &self.identity
    }

    /// Sets the caller identity.
    pub fn set_identity(&mut self, identity: CallerIdentity) {
        self.identity = identity;
    }

    /// Returns a new context with the specified identity.
    #[must_use]
    pub fn with_identity(mut self, identity: CallerIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Returns the operation ID if set.
    #[must_use]
    pub fn operation_id(&self) -> Option<&str> {
        self.operation_id.as_deref()
    }

    /// Returns a new context with the specified operation ID.
    #[must_use]
    pub fn with_operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = Some(operation_id.into());
        self
    }

    /// Returns the HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path as received, before mount prefixes are stripped.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns a new context with the given method and path.
    #[must_use]
    pub fn with_target(mut self, method: Method, path: impl Into<String>) -> Self {
        self.method = method;
        self.path = path.into();
        self
    }

    /// Returns the decoded query parameters.
    #[must_use]
    pub const fn query(&self) -> &QueryParams {
        &self.query
    }

    /// Returns a new context with the given query parameters.
    #[must_use]
    pub fn with_query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    /// Returns a path parameter captured by the router.
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// Returns a new context with the router's captured path parameters.
    #[must_use]
    pub fn with_path_params(mut self, params: HashMap<String, String>) -> Self {
        self.path_params = params;
        self
    }

    /// Returns the request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a new context with the given headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Returns the peer address, if known.
    #[must_use]
    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Returns a new context with the given peer address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.remote_addr = addr;
        self
    }

    /// Returns the bearer token from the `Authorization` header.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.header(http::header::AUTHORIZATION.as_str())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_request_id_new_generates_unique_ids() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn test_request_id_display() {
        assert_eq!(RequestId::new().to_string().len(), 36);
    }

    #[test]
    fn test_query_params_keep_repeated_keys() {
        let query = QueryParams::parse("a=1&b=two%20words&a=3");
        assert_eq!(query.get("a"), Some("1"));
        assert_eq!(query.get("b"), Some("two words"));
        assert_eq!(query.get_all("a").collect::<Vec<_>>(), vec!["1", "3"]);

        let map = query.to_multimap();
        assert_eq!(map["a"], vec!["1", "3"]);
        assert_eq!(map["b"], vec!["two words"]);
    }

    #[test]
    fn test_query_params_plus_is_space() {
        let query = QueryParams::parse("message=hello+world");
        assert_eq!(query.get("message"), Some("hello world"));
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc-123"));
        let ctx = RequestContext::new().with_headers(headers);
        assert_eq!(ctx.bearer_token(), Some("abc-123"));
    }

    #[test]
    fn test_bearer_token_rejects_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic dXNlcjpwdw=="));
        let ctx = RequestContext::new().with_headers(headers);
        assert!(ctx.bearer_token().is_none());
        assert!(RequestContext::new().bearer_token().is_none());
    }

    #[test]
    fn test_context_builders() {
        let addr: SocketAddr = "10.0.0.7:51234".parse().unwrap();
        let ctx = RequestContext::new()
            .with_operation_id("graph.add")
            .with_target(Method::POST, "/message")
            .with_remote_addr(Some(addr));
        assert_eq!(ctx.operation_id(), Some("graph.add"));
        assert_eq!(ctx.method(), Method::POST);
        assert_eq!(ctx.path(), "/message");
        assert_eq!(ctx.remote_addr(), Some(addr));
        assert!(matches!(ctx.identity(), CallerIdentity::Anonymous));

        let ctx = ctx.with_identity(CallerIdentity::Client(crate::ClientIdentity {
            id: "trusted-client".to_string(),
            authorities: vec!["ROLE_CLIENT".to_string()],
            scopes: vec!["trust".to_string()],
        }));
        assert_eq!(ctx.identity().client().map(|c| c.id.as_str()), Some("trusted-client"));
    }
}
