//! # transfernet
//!
//! An embeddable asynchronous HTTP client built around a single-reactor
//! transfer lifecycle engine.
//!
//! Callers create requests, submit them, and receive the result through a
//! future without blocking their own thread. One background reactor thread
//! multiplexes every exchange over a pluggable transport, enforces an
//! admission ceiling, drives each response through a strict state machine and
//! applies three independent timeout policies.
//!
//! ## Features
//!
//! - **Admission Control**: at most `max_active_requests` transfers in flight (default 8)
//! - **Lifecycle State Machine**: idempotent, lock-checked transitions
//! - **Timeouts**: connection, network (stall) and total transfer
//! - **Cooperative Abort**: immediate state change, handle released on the reactor
//! - **Transport Seam**: HTTP/1.1 over tokio, hyper and BoringSSL by default
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use transfernet::http::HttpMethod;
//! use transfernet::service::{HttpService, ServiceConfig};
//!
//! fn main() -> Result<(), transfernet::base::neterror::NetError> {
//!     let service = HttpService::hyper()?;
//!     service.initialize(&ServiceConfig::new().with_base_url("https://example.com"), true)?;
//!
//!     let request = service.create_request(HttpMethod::Get, "/");
//!     let response = service.send_request_and_wait(&request)?;
//!     println!("Status: {}", response.status_code());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error codes, transfer states and timeout policy
//! - [`http`] - Headers, requests, responses and the response future
//! - [`service`] - The reactor-backed service and its configuration
//! - [`transport`] - The transport capability surface and its hyper implementation

pub mod base;
pub mod http;
pub mod service;
pub mod transport;

pub use crate::base::neterror::NetError;
pub use crate::base::timeout::HttpTimeout;
pub use crate::base::transferstate::TransferState;
pub use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransfer, ResponseFuture};
pub use crate::service::{HttpService, ServiceConfig};
