//! # Tessera Core
//!
//! Foundational types shared by the Tessera server and its services:
//!
//! - [`RequestContext`] - per-request state (id, caller, query, headers, remote address)
//! - [`CallerIdentity`] - the authenticated client and user behind a request
//! - [`ServiceError`] - the error type every service converts into
//! - [`di::Container`] - type-keyed registry of shared service instances
//! - [`TokenAuthenticator`] - seam between the server's bearer guard and a token store

#![doc(html_root_url = "https://docs.rs/tessera-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
pub mod di;
mod error;
mod identity;

pub use context::{QueryParams, RequestContext, RequestId};
pub use error::{ErrorCategory, ErrorDetail, ErrorEnvelope, ServiceError};
pub use identity::{CallerIdentity, ClientIdentity, TokenAuthenticator, UserIdentity};
