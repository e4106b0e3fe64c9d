//! Request routing and path matching.
//!
//! Routes map a method and a path template to an operation ID; the handler
//! registry maps operation IDs to handlers. Templates use `{name}` segments
//! for path parameters.
//!
//! Each service builds its own router relative to `/` and the application
//! assembly mounts it under the service's configured prefix:
//!
//! ```rust
//! use http::Method;
//! use tessera_server::Router;
//!
//! let mut graph = Router::new();
//! graph.add_route(Method::GET, "/add", "graph.add");
//!
//! let mut root = Router::new();
//! root.mount("/graph", graph);
//!
//! let m = root.match_route(&Method::GET, "/graph/add").unwrap();
//! assert_eq!(m.operation_id(), "graph.add");
//! assert!(root.match_route(&Method::GET, "/add").is_none());
//! ```

use std::collections::HashMap;

use http::Method;

use crate::guard::AccessPolicy;

/// A matched route with extracted path parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    operation_id: String,
    params: HashMap<String, String>,
    policy: Option<AccessPolicy>,
}

impl RouteMatch {
    /// Returns the operation ID for this route.
    #[must_use]
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// Returns the extracted path parameters.
    #[must_use]
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Returns a specific path parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Returns the access policy guarding this route, if any.
    #[must_use]
    pub const fn policy(&self) -> Option<&AccessPolicy> {
        self.policy.as_ref()
    }

    pub(crate) fn into_params(self) -> HashMap<String, String> {
        self.params
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Literal(String),
    Param(String),
}

fn parse_segments(pattern: &str) -> Vec<PathSegment> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => PathSegment::Param(name.to_string()),
            None => PathSegment::Literal(s.to_string()),
        })
        .collect()
}

#[derive(Debug, Clone)]
struct Route {
    method: Method,
    segments: Vec<PathSegment>,
    operation_id: String,
    policy: Option<AccessPolicy>,
}

impl Route {
    fn match_path(&self, path_segments: &[&str]) -> Option<HashMap<String, String>> {
        if path_segments.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (pattern, actual) in self.segments.iter().zip(path_segments) {
            match pattern {
                PathSegment::Literal(expected) if expected != actual => return None,
                PathSegment::Literal(_) => {}
                PathSegment::Param(name) => {
                    params.insert(name.clone(), (*actual).to_string());
                }
            }
        }
        Some(params)
    }

    fn pattern(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                PathSegment::Literal(s) => out.push_str(s),
                PathSegment::Param(name) => {
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                }
            }
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }
}

/// HTTP request router. The first matching route wins.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Adds an unguarded route.
    pub fn add_route(
        &mut self,
        method: Method,
        pattern: impl AsRef<str>,
        operation_id: impl Into<String>,
    ) {
        self.push(method, pattern.as_ref(), operation_id.into(), None);
    }

    /// Adds a route that requires a bearer token satisfying `policy`.
    pub fn add_guarded_route(
        &mut self,
        method: Method,
        pattern: impl AsRef<str>,
        operation_id: impl Into<String>,
        policy: AccessPolicy,
    ) {
        self.push(method, pattern.as_ref(), operation_id.into(), Some(policy));
    }

    fn push(
        &mut self,
        method: Method,
        pattern: &str,
        operation_id: String,
        policy: Option<AccessPolicy>,
    ) {
        self.routes.push(Route {
            method,
            segments: parse_segments(pattern),
            operation_id,
            policy,
        });
    }

    /// Moves every route of `other` under `prefix`.
    ///
    /// A prefix of `""` or `"/"` mounts at the root.
    pub fn mount(&mut self, prefix: &str, other: Self) {
        let prefix = parse_segments(prefix);
        for mut route in other.routes {
            let mut segments = prefix.clone();
            segments.append(&mut route.segments);
            route.segments = segments;
            self.routes.push(route);
        }
    }

    /// Returns the number of registered routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Matches an incoming request.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| {
                route.match_path(&path_segments).map(|params| RouteMatch {
                    operation_id: route.operation_id.clone(),
                    params,
                    policy: route.policy.clone(),
                })
            })
    }

    /// Checks if an operation ID is routed.
    #[must_use]
    pub fn has_operation(&self, operation_id: &str) -> bool {
        self.routes.iter().any(|r| r.operation_id == operation_id)
    }

    /// Lists `(method, pattern, operation_id)` for every route, in match order.
    #[must_use]
    pub fn describe(&self) -> Vec<(Method, String, String)> {
        self.routes
            .iter()
            .map(|r| (r.method.clone(), r.pattern(), r.operation_id.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_param_routes() {
        let mut router = Router::new();
        router.add_route(Method::POST, "/points/{message}", "points.rpc");
        router.add_route(Method::GET, "/", "greeting.greet");

        let m = router.match_route(&Method::POST, "/points/addPoint").unwrap();
        assert_eq!(m.operation_id(), "points.rpc");
        assert_eq!(m.param("message"), Some("addPoint"));

        let root = router.match_route(&Method::GET, "/").unwrap();
        assert_eq!(root.operation_id(), "greeting.greet");
        assert!(root.params().is_empty());
    }

    #[test]
    fn test_method_and_length_must_match() {
        let mut router = Router::new();
        router.add_route(Method::POST, "/points/{message}", "points.rpc");

        assert!(router.match_route(&Method::GET, "/points/clear").is_none());
        assert!(router.match_route(&Method::POST, "/points").is_none());
        assert!(router.match_route(&Method::POST, "/points/a/b").is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let mut router = Router::new();
        router.add_route(Method::GET, "/user/get", "oauth2.user.get");
        router.add_route(Method::GET, "/user/{id}", "other");

        let m = router.match_route(&Method::GET, "/user/get").unwrap();
        assert_eq!(m.operation_id(), "oauth2.user.get");
    }

    #[test]
    fn test_mount_keeps_policy() {
        let mut oauth = Router::new();
        oauth.add_guarded_route(
            Method::GET,
            "/get",
            "oauth2.user.get",
            AccessPolicy::user_role("ROLE_USER"),
        );

        let mut root = Router::new();
        root.mount("/user", oauth);
        root.mount("/", Router::new());

        let m = root.match_route(&Method::GET, "/user/get").unwrap();
        assert_eq!(m.policy(), Some(&AccessPolicy::user_role("ROLE_USER")));
        assert_eq!(
            root.describe(),
            vec![(Method::GET, "/user/get".to_string(), "oauth2.user.get".to_string())]
        );
    }

    #[test]
    fn test_trailing_slash_is_ignored() {
        let mut router = Router::new();
        router.add_route(Method::GET, "/wordcount/get", "wordcount.get");
        assert!(router.match_route(&Method::GET, "/wordcount/get/").is_some());
        assert!(router.has_operation("wordcount.get"));
        assert!(!router.has_operation("wordcount.add"));
    }
}
