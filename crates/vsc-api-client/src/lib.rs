//! VSC API Client - Rust client for the VSC Core HTTP API
//!
//! This crate provides:
//! - Endpoint resolution through DNS SRV discovery with a plain-name fallback
//! - A blocking HTTP executor with Basic or plain-header credentials
//! - Typed errors decoded from the server's error responses
//! - `VscApiClient`, a facade with one method per API operation

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod http;
pub mod model;
pub mod resolver;

pub use client::VscApiClient;
pub use config::{CredentialMode, VscClientConfig};
pub use error::{RawHttpError, Result, VscError};
pub use http::{Method, Reply, RequestSpec, VscHttpClient};
pub use model::{ForwardRule, JobStopOptions, ListFormat};
pub use resolver::{EndpointCandidate, ServiceLocator, SystemServiceLocator};
