//! Transport Module
//!
//! The capability surface the reactor drives: attach a configured transfer to
//! a multiplexer, wait for activity, perform pending I/O, drain completion
//! events and query post-completion metadata.
//!
//! # Architecture
//!
//! The [`Transport`] trait is the only seam between the lifecycle engine and
//! the code that performs socket I/O, TLS and DNS. The reactor thread owns the
//! transport exclusively; nothing else ever touches a [`TransferKey`].
//! Received bytes are pushed back into the engine through the
//! [`TransferSink`] registered with each transfer, always from inside
//! [`Transport::perform`].
//!
//! [`HyperTransport`] is the production implementation.

mod hypertransport;
pub mod tls;

pub use self::hypertransport::HyperTransport;

use crate::base::neterror::NetError;
use crate::http::method::HttpMethod;
use bytes::Bytes;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Handle of one attached transfer, unique within its transport.
pub type TransferKey = u64;

/// Everything a transport needs to start one exchange.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub method: HttpMethod,
    /// Fully resolved target.
    pub url: Url,
    /// Sent only for verbs that carry a body.
    pub body: Option<Bytes>,
    /// Serialized request headers, in order.
    pub headers: Vec<(String, String)>,
    /// `0` disables redirect following.
    pub max_redirects: u32,
    /// `Accept-Encoding` token list.
    pub accept_encoding: Option<String>,
    pub verify_peer: bool,
    pub verify_host: bool,
    pub ca_bundle: Option<PathBuf>,
}

/// Metadata available once a transfer has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferInfo {
    pub status_code: u16,
    pub local_ip: Option<IpAddr>,
    pub primary_ip: Option<IpAddr>,
}

/// A finished transfer, successful or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub key: TransferKey,
    pub result: Result<(), NetError>,
}

/// Receiver of raw header lines and body chunks for one transfer.
///
/// Returning `false` asks the transport to abort the transfer; it then
/// reports a failed [`Completion`] for it.
pub trait TransferSink: Send + Sync {
    fn on_header_line(&self, line: &[u8]) -> bool;

    fn on_body_chunk(&self, chunk: &[u8]) -> bool;
}

/// A multiplexer of concurrent HTTP transfers.
pub trait Transport: Send {
    /// Create a transfer from `options` and register it with the multiplexer.
    fn attach(
        &mut self,
        options: TransferOptions,
        sink: Arc<dyn TransferSink>,
    ) -> Result<TransferKey, NetError>;

    /// Remove a transfer and release its resources. Unknown keys are ignored.
    fn detach(&mut self, key: TransferKey);

    /// Block until there is activity or `timeout` elapses.
    fn wait(&mut self, timeout: Duration);

    /// Dispatch pending activity to sinks. Returns the number of transfers
    /// still running.
    fn perform(&mut self) -> usize;

    /// Take every completion recorded since the last call.
    fn drain_completions(&mut self) -> Vec<Completion>;

    /// Post-completion metadata of a transfer that has not been detached yet.
    fn transfer_info(&self, key: TransferKey) -> Option<TransferInfo>;
}
