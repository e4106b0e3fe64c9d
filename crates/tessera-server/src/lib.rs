//! # Tessera Server
//!
//! The HTTP host shared by every Tessera service:
//!
//! - HTTP/1.1 via hyper, one task per connection
//! - Path-template routing with mountable sub-routers
//! - Bearer-token guard for routes that carry an [`AccessPolicy`]
//! - Startup/shutdown lifecycle hooks over a DI container
//! - Graceful shutdown and health/readiness endpoints
//!
//! ## Example
//!
//! ```rust,no_run
//! use http::Method;
//! use tessera_server::{HandlerError, HandlerRegistry, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.add_route(Method::GET, "/count", "count");
//!
//!     let mut handlers = HandlerRegistry::new();
//!     handlers.register_no_body("count", |_ctx| async { Ok::<_, HandlerError>(0) });
//!
//!     Server::builder()
//!         .router(router)
//!         .handlers(handlers)
//!         .build()
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/tessera-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod guard;
mod handler;
mod health;
mod lifecycle;
mod router;
mod server;
pub mod shutdown;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use guard::{AccessPolicy, BearerGuard};
pub use handler::{
    BoxedHandlerResult, ErasedHandler, HandlerError, HandlerRegistry, InvokeError, Reply,
};
pub use health::{HealthCheck, HealthStatus, ReadinessCheck, ReadinessStatus};
pub use lifecycle::{Lifecycle, LifecycleError, LifecycleHook, LifecycleResult};
pub use router::{RouteMatch, Router};
pub use server::{HttpResponse, ResponseBody, Server, ServerBuilder, ServerError, REQUEST_ID_HEADER};
pub use shutdown::ShutdownSignal;
