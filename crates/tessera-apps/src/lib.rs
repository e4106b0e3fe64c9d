//! # Tessera Apps
//!
//! The services Tessera hosts, and the in-process stand-ins for the
//! infrastructure they talk to:
//!
//! | Service | Routes | Backed by |
//! |---|---|---|
//! | [`points`] | `POST /points/{message}` | memory or [`points::DocumentCollection`] |
//! | [`employees`] | `POST /current/{message}`, `GET /legacy/{message}` | [`employees::EmployeeRegistry`] |
//! | [`messaging`] | `POST /message` | [`broker::Broker`] |
//! | [`wordcount`] | `GET /add`, `GET /get` | [`broker::Broker`] |
//! | [`graph`] | `GET /add`, `/get`, `/betweenAges`, ... | [`graph::PersonGraph`] |
//! | [`oauth2`] | `/client/authenticate`, `/user/*` | [`oauth2::TokenServices`] |
//! | [`echo`] | `POST /example/echo`, `GET /proxy` | [`directory::ServiceDirectory`] |
//! | [`greeting`] | `GET /` | template |
//!
//! [`build_server`] turns a [`tessera_config::TesseraConfig`] into a ready
//! [`tessera_server::Server`].

#![doc(html_root_url = "https://docs.rs/tessera-apps/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod assembly;
pub mod broker;
pub mod directory;
pub mod echo;
pub mod employees;
pub mod graph;
pub mod greeting;
pub mod messaging;
pub mod oauth2;
pub mod points;
mod task;
pub mod wordcount;

pub use assembly::{build_server, AssemblyError, ScratchDir};
pub use task::BackgroundTask;
