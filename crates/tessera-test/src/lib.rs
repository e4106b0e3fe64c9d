//! # Tessera Test
//!
//! In-memory testing for Tessera servers. Requests are handed straight to
//! [`tessera_server::Server::dispatch`], so no port is bound.
//!
//! ```rust,ignore
//! use tessera_test::TestClient;
//!
//! #[tokio::test]
//! async fn greets() {
//!     let client = TestClient::started(build_server()).await.unwrap();
//!     client
//!         .get("/")
//!         .query("name", "Amy")
//!         .send()
//!         .await
//!         .unwrap()
//!         .assert_text("Hello, Amy!");
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/tessera-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use request::TestRequestBuilder;
pub use response::TestResponse;
