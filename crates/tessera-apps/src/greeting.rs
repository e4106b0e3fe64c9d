//! Template-rendered greeting.

use http::Method;
use tessera_config::GreetingConfig;
use tessera_server::{HandlerError, HandlerRegistry, Reply, Router};

/// Renders a greeting template.
#[derive(Debug, Clone)]
pub struct GreetingService {
    template: String,
    default_name: String,
}

impl GreetingService {
    /// `template` holds a `{name}` placeholder.
    pub fn new(template: impl Into<String>, default_name: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            default_name: default_name.into(),
        }
    }

    /// Builds the service from its configuration section.
    pub fn from_config(config: &GreetingConfig) -> Self {
        Self::new(config.template.clone(), config.default_name.clone())
    }

    /// Greets `name`, or the default name. The name is HTML-escaped.
    pub fn greet(&self, name: Option<&str>) -> String {
        let name = name.unwrap_or(&self.default_name);
        self.template.replace("{name}", &escape_html(name))
    }

    /// Routes and handlers.
    pub fn routes(&self) -> (Router, HandlerRegistry) {
        let mut router = Router::new();
        router.add_route(Method::GET, "/", "greeting.greet");

        let mut handlers = HandlerRegistry::new();
        let svc = self.clone();
        handlers.register_raw("greeting.greet", move |ctx, _body| {
            let body = svc.greet(ctx.query().get("name"));
            async move { Ok::<_, HandlerError>(Reply::text(body)) }
        });
        (router, handlers)
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greet() {
        let svc = GreetingService::from_config(&GreetingConfig::default());
        assert_eq!(svc.greet(Some("Amy")), "Hello, Amy!");
        assert_eq!(svc.greet(None), "Hello, Thomas!");
    }

    #[test]
    fn test_name_is_escaped() {
        let svc = GreetingService::new("<p>{name}</p>", "x");
        assert_eq!(
            svc.greet(Some("<b>Tom & \"Jerry\"</b>")),
            "<p>&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;/b&gt;</p>"
        );
    }
}
