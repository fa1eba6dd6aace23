//! HTTP response: lifecycle state machine, raw header-line parsing and body
//! accumulation.
//!
//! Every transition is checked against the current state under the response
//! lock before anything is mutated. A transition whose precondition does not
//! hold is a no-op that returns `false`, which makes duplicate transport
//! callbacks harmless. Entering a terminal state seals the transfer and
//! resolves the response's promise, exactly once.

use crate::base::neterror::NetError;
use crate::base::timeout::HttpTimeout;
use crate::base::transferstate::TransferState;
use crate::http::future::ResponseFuture;
use crate::http::headers::{CONTENT_LENGTH, DATE};
use crate::http::method::HttpMethod;
use crate::http::transfer::sealed::TransferAccess;
use crate::http::transfer::{HttpTransfer, Transfer, TransferId};
use crate::transport::{TransferInfo, TransferSink};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::oneshot;

/// Status lines start with this token, e.g. `HTTP/1.1 200 OK`.
const STATUS_LINE_TOKEN: &str = "HTTP/";

/// Upper bound on capacity pre-reserved from a declared `Content-Length`.
const MAX_BODY_RESERVE: usize = 16 * 1024 * 1024;

/// Progress notification: (bytes received so far, expected size or 0).
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

struct ResponseState {
    transfer: Transfer,
    status_code: u16,
    state: TransferState,
    connection_initiated: Option<Instant>,
    connection_established: Option<Instant>,
    last_received: Option<Instant>,
    transfer_completed: Option<Instant>,
    local_address: Option<IpAddr>,
    primary_address: Option<IpAddr>,
    last_received_header_name: Option<String>,
    total_raw_header_bytes: usize,
    declared_content_length: Option<u64>,
    expected_body_size: u64,
    error_message: Option<String>,
    promise: Option<oneshot::Sender<Arc<HttpResponse>>>,
}

/// The response half of an exchange, created by the service when a request
/// is submitted.
pub struct HttpResponse {
    id: TransferId,
    request_id: TransferId,
    method: HttpMethod,
    progress: Option<ProgressCallback>,
    inner: Mutex<ResponseState>,
}

impl HttpResponse {
    /// Create a response paired with `request_id`, plus the future its
    /// terminal transition resolves.
    pub(crate) fn new(
        id: TransferId,
        request_id: TransferId,
        method: HttpMethod,
        progress: Option<ProgressCallback>,
    ) -> (Arc<Self>, ResponseFuture) {
        let (tx, rx) = oneshot::channel();
        let response = Arc::new(Self {
            id,
            request_id,
            method,
            progress,
            inner: Mutex::new(ResponseState {
                transfer: Transfer::new(),
                status_code: 0,
                state: TransferState::None,
                connection_initiated: None,
                connection_established: None,
                last_received: None,
                transfer_completed: None,
                local_address: None,
                primary_address: None,
                last_received_header_name: None,
                total_raw_header_bytes: 0,
                declared_content_length: None,
                expected_body_size: 0,
                error_message: None,
                promise: Some(tx),
            }),
        });
        (response, ResponseFuture::new(rx))
    }

    fn lock(&self) -> MutexGuard<'_, ResponseState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Id of the request this response belongs to.
    pub fn request_id(&self) -> TransferId {
        self.request_id
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    // =========================================================================
    // Read surface
    // =========================================================================

    /// `0` until a status line has been parsed.
    pub fn status_code(&self) -> u16 {
        self.lock().status_code
    }

    pub fn state(&self) -> TransferState {
        self.lock().state
    }

    pub fn is_completed(&self) -> bool {
        self.state() == TransferState::Completed
    }

    pub fn is_failure(&self) -> bool {
        self.state().is_failed()
    }

    pub fn is_done(&self) -> bool {
        self.state().is_done()
    }

    pub fn is_timed_out(&self) -> bool {
        self.state().is_timed_out()
    }

    pub fn error_message(&self) -> Option<String> {
        self.lock().error_message.clone()
    }

    pub fn etag(&self) -> Option<String> {
        self.lock().transfer.headers().etag().map(str::to_owned)
    }

    /// The `Date` header parsed as an HTTP-date (IMF-fixdate).
    pub fn date(&self) -> Option<OffsetDateTime> {
        let value = self.header(DATE)?;
        parse_http_date(&value)
    }

    pub fn local_address(&self) -> Option<IpAddr> {
        self.lock().local_address
    }

    pub fn primary_address(&self) -> Option<IpAddr> {
        self.lock().primary_address
    }

    pub fn total_raw_header_bytes(&self) -> usize {
        self.lock().total_raw_header_bytes
    }

    /// Declared `Content-Length`, or 0 when absent or for `HEAD`.
    pub fn expected_body_size(&self) -> u64 {
        self.lock().expected_body_size
    }

    /// Body decoded as UTF-8.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body().to_vec()).map_err(|_| NetError::InvalidUtf8)
    }

    /// Body deserialized as JSON.
    #[cfg(feature = "json")]
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, NetError> {
        self.with_transfer(|t| serde_json::from_slice(t.body()))
            .map_err(|_| NetError::JsonParseError)
    }

    pub fn connection_initiated_at(&self) -> Option<Instant> {
        self.lock().connection_initiated
    }

    pub fn connection_established_at(&self) -> Option<Instant> {
        self.lock().connection_established
    }

    pub fn last_received_at(&self) -> Option<Instant> {
        self.lock().last_received
    }

    pub fn transfer_completed_at(&self) -> Option<Instant> {
        self.lock().transfer_completed
    }

    /// Time from admission to the first header line.
    pub fn connection_duration(&self) -> Option<Duration> {
        let state = self.lock();
        Some(state.connection_established?.duration_since(state.connection_initiated?))
    }

    /// Time from the first header line to completion.
    pub fn transfer_duration(&self) -> Option<Duration> {
        let state = self.lock();
        Some(state.transfer_completed?.duration_since(state.connection_established?))
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// `None -> Connecting`.
    pub fn set_connecting(&self) -> bool {
        let mut state = self.lock();
        if state.state != TransferState::None {
            return false;
        }
        state.state = TransferState::Connecting;
        state.connection_initiated = Some(Instant::now());
        true
    }

    /// `Connecting -> ReceivingHeaders`.
    pub fn set_receiving_headers(&self) -> bool {
        Self::enter_receiving_headers(&mut self.lock())
    }

    /// `ReceivingHeaders -> ReceivingData`.
    pub fn set_receiving_data(&self) -> bool {
        let mut state = self.lock();
        if state.state != TransferState::ReceivingHeaders {
            return false;
        }
        state.state = TransferState::ReceivingData;
        true
    }

    /// `Receiving -> Completed`.
    pub fn set_completed(self: &Arc<Self>) -> bool {
        let mut state = self.lock();
        if !state.state.is_receiving() {
            return false;
        }
        state.transfer_completed = Some(Instant::now());
        self.finish(&mut state, TransferState::Completed, None);
        true
    }

    pub fn set_aborted(self: &Arc<Self>) -> bool {
        self.fail_if_started(TransferState::Aborted, None)
    }

    pub fn set_connection_timed_out(self: &Arc<Self>, message: impl Into<String>) -> bool {
        self.fail_if_started(TransferState::ConnectionTimedOut, Some(message.into()))
    }

    pub fn set_network_timed_out(self: &Arc<Self>, message: impl Into<String>) -> bool {
        self.fail_if_started(TransferState::NetworkTimedOut, Some(message.into()))
    }

    pub fn set_transfer_timed_out(self: &Arc<Self>, message: impl Into<String>) -> bool {
        self.fail_if_started(TransferState::TransferTimedOut, Some(message.into()))
    }

    /// Any non-terminal state `-> Error`.
    pub fn set_error(self: &Arc<Self>, message: impl Into<String>) -> bool {
        let mut state = self.lock();
        if state.state.is_done() {
            return false;
        }
        self.finish(&mut state, TransferState::Error, Some(message.into()));
        true
    }

    /// Abort a response whose request is still waiting for admission.
    pub(crate) fn cancel_pending(self: &Arc<Self>) -> bool {
        let mut state = self.lock();
        if state.state != TransferState::None {
            return false;
        }
        self.finish(&mut state, TransferState::Aborted, None);
        true
    }

    fn fail_if_started(self: &Arc<Self>, to: TransferState, message: Option<String>) -> bool {
        let mut state = self.lock();
        if state.state == TransferState::None || state.state.is_done() {
            return false;
        }
        self.finish(&mut state, to, message);
        true
    }

    fn enter_receiving_headers(state: &mut ResponseState) -> bool {
        if state.state != TransferState::Connecting {
            return false;
        }
        let now = Instant::now();
        state.state = TransferState::ReceivingHeaders;
        state.connection_established = Some(now);
        state.last_received = Some(now);
        true
    }

    /// Enter a terminal state: seal, then resolve the promise.
    fn finish(self: &Arc<Self>, state: &mut ResponseState, to: TransferState, message: Option<String>) {
        state.state = to;
        if message.is_some() {
            state.error_message = message;
        }
        state.transfer.seal();
        tracing::debug!(id = self.id, request = self.request_id, state = %to, "response finished");
        if let Some(promise) = state.promise.take() {
            let _ = promise.send(Arc::clone(self));
        }
    }

    // =========================================================================
    // Driven by the reactor
    // =========================================================================

    /// Apply a transport completion. On success the transport's status code
    /// is taken as ground truth and the body is checked against the declared
    /// `Content-Length`.
    pub fn complete(self: &Arc<Self>, result: Result<TransferInfo, NetError>) -> bool {
        let mut state = self.lock();
        if state.state.is_done() {
            return false;
        }

        let info = match result {
            Ok(info) => info,
            Err(e) => {
                let message = state
                    .error_message
                    .take()
                    .unwrap_or_else(|| format!("Transfer failed: {e}"));
                self.finish(&mut state, TransferState::Error, Some(message));
                return true;
            }
        };

        if info.status_code != 0 {
            state.status_code = info.status_code;
        }
        state.local_address = info.local_ip;
        state.primary_address = info.primary_ip;

        if self.method != HttpMethod::Head {
            if let Some(declared) = state.declared_content_length {
                let received = state.transfer.body_len() as u64;
                if declared != received {
                    let message = format!(
                        "Body size mismatch: Content-Length declared {declared} bytes but {received} bytes were received"
                    );
                    self.finish(&mut state, TransferState::Error, Some(message));
                    return true;
                }
            }
        }

        if !state.state.is_receiving() {
            let message = "Transfer finished without a response".to_string();
            self.finish(&mut state, TransferState::Error, Some(message));
            return true;
        }

        state.transfer_completed = Some(Instant::now());
        self.finish(&mut state, TransferState::Completed, None);
        true
    }

    /// Evaluate the three timeout policies at `now`. Returns the timed-out
    /// state when one fired and the transition was applied.
    pub fn check_timeouts(self: &Arc<Self>, timeout: &HttpTimeout, now: Instant) -> Option<TransferState> {
        let (current, initiated, established, last) = {
            let state = self.lock();
            (
                state.state,
                state.connection_initiated,
                state.connection_established,
                state.last_received,
            )
        };
        let since = |at: Option<Instant>| at.map(|t| now.saturating_duration_since(t));

        if current == TransferState::Connecting {
            let elapsed = since(initiated)?;
            if HttpTimeout::exceeded(timeout.connection, elapsed) {
                let message = format!("Connection timed out after {} ms", elapsed.as_millis());
                return self
                    .set_connection_timed_out(message)
                    .then_some(TransferState::ConnectionTimedOut);
            }
            return None;
        }

        if !current.is_receiving() {
            return None;
        }

        if let Some(stalled) = since(last) {
            if HttpTimeout::exceeded(timeout.network, stalled) {
                let message = format!("No data received for {} ms", stalled.as_millis());
                return self
                    .set_network_timed_out(message)
                    .then_some(TransferState::NetworkTimedOut);
            }
        }

        if let Some(elapsed) = since(established) {
            if HttpTimeout::exceeded(timeout.transfer, elapsed) {
                let message = format!("Transfer timed out after {} ms", elapsed.as_millis());
                return self
                    .set_transfer_timed_out(message)
                    .then_some(TransferState::TransferTimedOut);
            }
        }

        None
    }

    // =========================================================================
    // Header and body accumulation
    // =========================================================================

    /// Feed one raw header line as received from the wire.
    pub fn receive_header_line(&self, raw: &[u8]) -> bool {
        let mut state = self.lock();
        if state.state.is_done() {
            return false;
        }
        if state.state == TransferState::Connecting {
            Self::enter_receiving_headers(&mut state);
        }
        if !state.state.is_receiving() {
            return false;
        }

        state.total_raw_header_bytes += raw.len();
        state.last_received = Some(Instant::now());

        let text = String::from_utf8_lossy(raw);
        let line = text.trim_end_matches(['\r', '\n']);

        match self.parse_header_line(&mut state, line) {
            Ok(()) => true,
            Err(message) => {
                tracing::debug!(id = self.id, line = %line, "{message}");
                // Reported as Error once the transport completes the transfer.
                state.error_message = Some(message);
                false
            }
        }
    }

    fn parse_header_line(&self, state: &mut ResponseState, line: &str) -> Result<(), String> {
        if line.starts_with(STATUS_LINE_TOKEN) {
            let code = line
                .split_whitespace()
                .nth(1)
                .and_then(|c| c.parse::<u16>().ok())
                .filter(|c| (100..=999).contains(c))
                .ok_or_else(|| format!("Malformed status line: {line}"))?;
            state.transfer.headers_mut().clear();
            state.status_code = code;
            state.last_received_header_name = None;
            state.declared_content_length = None;
            state.expected_body_size = 0;
            return Ok(());
        }

        if line.starts_with([' ', '\t']) {
            let name = state
                .last_received_header_name
                .clone()
                .ok_or_else(|| "Folded header line without a preceding header".to_string())?;
            state.transfer.headers_mut().append_to(&name, line.trim());
            return Ok(());
        }

        if line.is_empty() {
            return Ok(());
        }

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| format!("Malformed header line: {line}"))?;
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() {
            return Err(format!("Malformed header line: {line}"));
        }

        if name.eq_ignore_ascii_case(CONTENT_LENGTH) {
            let declared = value
                .parse::<u64>()
                .map_err(|_| format!("Invalid Content-Length: {value}"))?;
            if self.method != HttpMethod::Head {
                state.declared_content_length = Some(declared);
                state.expected_body_size = declared;
                let reserve = usize::try_from(declared).unwrap_or(usize::MAX).min(MAX_BODY_RESERVE);
                state.transfer.reserve_body(reserve);
            }
        }

        state.transfer.headers_mut().set(name, value);
        state.last_received_header_name = Some(name.to_string());
        Ok(())
    }

    /// Append one body chunk and notify the progress callback.
    pub fn receive_body_chunk(&self, chunk: &[u8]) -> bool {
        let (received, expected) = {
            let mut state = self.lock();
            if state.state == TransferState::ReceivingHeaders {
                state.state = TransferState::ReceivingData;
            }
            if state.state != TransferState::ReceivingData {
                return false;
            }
            if !state.transfer.append_body(chunk) {
                return false;
            }
            state.last_received = Some(Instant::now());
            (state.transfer.body_len() as u64, state.expected_body_size)
        };

        if let Some(progress) = &self.progress {
            progress(received, expected);
        }
        true
    }
}

impl HttpTransfer for HttpResponse {
    fn id(&self) -> TransferId {
        self.id
    }
}

impl TransferAccess for HttpResponse {
    fn with_transfer<R>(&self, f: impl FnOnce(&Transfer) -> R) -> R {
        f(&self.lock().transfer)
    }

    fn with_transfer_mut<R>(&self, f: impl FnOnce(&mut Transfer) -> R) -> R {
        f(&mut self.lock().transfer)
    }
}

impl TransferSink for HttpResponse {
    fn on_header_line(&self, line: &[u8]) -> bool {
        self.receive_header_line(line)
    }

    fn on_body_chunk(&self, chunk: &[u8]) -> bool {
        self.receive_body_chunk(chunk)
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("HttpResponse")
            .field("id", &self.id)
            .field("request_id", &self.request_id)
            .field("status_code", &state.status_code)
            .field("state", &state.state)
            .field("body_len", &state.transfer.body_len())
            .field("error_message", &state.error_message)
            .finish()
    }
}

/// Parse an IMF-fixdate such as `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    let format = time::format_description::parse(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT",
    )
    .ok()?;
    time::PrimitiveDateTime::parse(value.trim(), &format)
        .ok()
        .map(|dt| dt.assume_utc())
}
