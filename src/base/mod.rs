//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): Network error codes
//! - [`TransferState`](transferstate::TransferState): Response lifecycle states
//! - [`HttpTimeout`](timeout::HttpTimeout): Connection, network and transfer timeouts

pub mod context;
pub mod neterror;
pub mod timeout;
pub mod transferstate;
