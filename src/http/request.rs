//! HTTP request configuration and transport setup.

use crate::base::neterror::NetError;
use crate::base::timeout::HttpTimeout;
use crate::http::headers::{CONTENT_LENGTH, IF_MATCH, IF_NONE_MATCH};
use crate::http::method::{AcceptedEncodings, HttpMethod};
use crate::http::response::{HttpResponse, ProgressCallback};
use crate::http::transfer::sealed::TransferAccess;
use crate::http::transfer::{HttpTransfer, Transfer, TransferId};
use crate::service::config::ResolvedConfig;
use crate::transport::{TransferKey, TransferOptions, TransferSink, Transport};
use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use url::Url;

/// Headers the transport writes itself.
const TRANSPORT_MANAGED_HEADERS: &[&str] = &["Host", CONTENT_LENGTH];

struct RequestState {
    transfer: Transfer,
    method: HttpMethod,
    url: String,
    accepted_encodings: AcceptedEncodings,
    timeout: HttpTimeout,
    max_redirects: u32,
    progress: Option<ProgressCallback>,
    response_id: Option<TransferId>,
    request_initiated: Option<Instant>,
    transfer_started: Option<Instant>,
}

/// A request created by
/// [`HttpService::create_request`](crate::service::HttpService::create_request).
///
/// Configuration is accepted until the request is submitted; from then on
/// every setter returns `false`.
pub struct HttpRequest {
    id: TransferId,
    service_id: u64,
    inner: Mutex<RequestState>,
}

impl HttpRequest {
    pub(crate) fn new(
        id: TransferId,
        service_id: u64,
        method: HttpMethod,
        url: &str,
        config: &ResolvedConfig,
    ) -> Self {
        let mut transfer = Transfer::new();
        let headers = transfer.headers_mut();
        headers.set_user_agent(&config.user_agent);
        if let Some(token) = &config.bearer_token {
            headers.set_bearer_authorization(token);
        } else if let Some(auth) = &config.basic_auth {
            headers.set_basic_authorization(&auth.user, &auth.password);
        }

        Self {
            id,
            service_id,
            inner: Mutex::new(RequestState {
                transfer,
                method,
                url: url.trim().to_string(),
                accepted_encodings: AcceptedEncodings::NONE,
                timeout: config.timeout,
                max_redirects: config.max_redirects,
                progress: None,
                response_id: None,
                request_initiated: None,
                transfer_started: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RequestState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` unless the request has been submitted.
    fn configure(&self, f: impl FnOnce(&mut RequestState)) -> bool {
        let mut state = self.lock();
        if state.transfer.is_sealed() {
            return false;
        }
        f(&mut state);
        true
    }

    pub(crate) fn service_id(&self) -> u64 {
        self.service_id
    }

    pub fn method(&self) -> HttpMethod {
        self.lock().method
    }

    pub fn url(&self) -> String {
        self.lock().url.clone()
    }

    pub fn accepted_encodings(&self) -> AcceptedEncodings {
        self.lock().accepted_encodings
    }

    pub fn timeout(&self) -> HttpTimeout {
        self.lock().timeout
    }

    pub fn maximum_redirects(&self) -> u32 {
        self.lock().max_redirects
    }

    /// Id of the attached response, once submitted.
    pub fn response_id(&self) -> Option<TransferId> {
        self.lock().response_id
    }

    pub fn is_initiated(&self) -> bool {
        self.lock().response_id.is_some()
    }

    pub fn request_initiated_at(&self) -> Option<Instant> {
        self.lock().request_initiated
    }

    pub fn transfer_started_at(&self) -> Option<Instant> {
        self.lock().transfer_started
    }

    pub(crate) fn progress_callback(&self) -> Option<ProgressCallback> {
        self.lock().progress.clone()
    }

    pub fn set_method(&self, method: HttpMethod) -> bool {
        self.configure(|s| s.method = method)
    }

    pub fn set_url(&self, url: &str) -> bool {
        self.configure(|s| s.url = url.trim().to_string())
    }

    pub fn set_accepted_encoding_types(&self, encodings: AcceptedEncodings) -> bool {
        self.configure(|s| s.accepted_encodings = encodings)
    }

    pub fn set_if_none_match_etag(&self, etag: &str) -> bool {
        self.set_header(IF_NONE_MATCH, etag)
    }

    pub fn set_if_match_etag(&self, etag: &str) -> bool {
        self.set_header(IF_MATCH, etag)
    }

    pub fn set_timeout(&self, timeout: HttpTimeout) -> bool {
        self.configure(|s| s.timeout = timeout)
    }

    pub fn set_connection_timeout(&self, timeout: Duration) -> bool {
        self.configure(|s| s.timeout.connection = timeout)
    }

    pub fn set_network_timeout(&self, timeout: Duration) -> bool {
        self.configure(|s| s.timeout.network = timeout)
    }

    pub fn set_transfer_timeout(&self, timeout: Duration) -> bool {
        self.configure(|s| s.timeout.transfer = timeout)
    }

    /// `0` disables redirect following.
    pub fn set_maximum_redirects(&self, max_redirects: u32) -> bool {
        self.configure(|s| s.max_redirects = max_redirects)
    }

    /// An empty user agent suppresses the header entirely.
    pub fn set_user_agent(&self, user_agent: &str) -> bool {
        self.with_transfer_mut(|t| t.headers_mut().set_user_agent(user_agent))
    }

    pub fn set_basic_authorization(&self, user: &str, password: &str) -> bool {
        self.with_transfer_mut(|t| t.headers_mut().set_basic_authorization(user, password))
    }

    pub fn set_bearer_authorization(&self, token: &str) -> bool {
        self.with_transfer_mut(|t| t.headers_mut().set_bearer_authorization(token))
    }

    /// Serialize `value` as the body and mark it `application/json`.
    #[cfg(feature = "json")]
    pub fn set_json_body<T: serde::Serialize>(&self, value: &T) -> bool {
        let body = match serde_json::to_vec(value) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(id = self.id, error = %e, "cannot serialize JSON body");
                return false;
            }
        };
        self.with_transfer_mut(|t| {
            t.set_body(&body) && t.headers_mut().set_content_type("application/json", None)
        })
    }

    /// Receive `(bytes so far, expected size)` as body chunks arrive.
    pub fn set_progress_callback<F>(&self, callback: F) -> bool
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        self.configure(|s| s.progress = Some(Arc::new(callback)))
    }

    /// Attach `response` and seal the request. Succeeds once, and only for a
    /// response created for this request.
    pub fn set_response(&self, response: &HttpResponse) -> bool {
        let mut state = self.lock();
        if state.response_id.is_some() || response.request_id() != self.id {
            return false;
        }
        state.response_id = Some(response.id());
        state.request_initiated = Some(Instant::now());
        state.transfer.seal();
        true
    }

    /// Build the transport options and attach the transfer. Called by the
    /// reactor only.
    pub(crate) fn start_transfer(
        &self,
        config: &ResolvedConfig,
        transport: &mut dyn Transport,
        sink: Arc<dyn TransferSink>,
    ) -> Result<TransferKey, NetError> {
        let options = {
            let state = self.lock();
            let url = resolve_url(config.base_url.as_ref(), &state.url)?;

            let body = state
                .method
                .carries_body()
                .then(|| Bytes::copy_from_slice(state.transfer.body()));

            let headers = state
                .transfer
                .headers()
                .iter()
                .filter(|(name, value)| {
                    !value.is_empty()
                        && !TRANSPORT_MANAGED_HEADERS
                            .iter()
                            .any(|managed| managed.eq_ignore_ascii_case(name))
                })
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect();

            TransferOptions {
                method: state.method,
                url,
                body,
                headers,
                max_redirects: state.max_redirects,
                accept_encoding: state.accepted_encodings.header_value(),
                verify_peer: true,
                verify_host: true,
                ca_bundle: config.ca_bundle.clone(),
            }
        };

        tracing::debug!(id = self.id, method = %options.method, url = %options.url, "starting transfer");
        let key = transport.attach(options, sink)?;
        self.lock().transfer_started = Some(Instant::now());
        Ok(key)
    }
}

impl HttpTransfer for HttpRequest {
    fn id(&self) -> TransferId {
        self.id
    }
}

impl TransferAccess for HttpRequest {
    fn with_transfer<R>(&self, f: impl FnOnce(&Transfer) -> R) -> R {
        f(&self.lock().transfer)
    }

    fn with_transfer_mut<R>(&self, f: impl FnOnce(&mut Transfer) -> R) -> R {
        f(&mut self.lock().transfer)
    }
}

impl std::fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("HttpRequest")
            .field("id", &self.id)
            .field("method", &state.method)
            .field("url", &state.url)
            .field("response_id", &state.response_id)
            .finish()
    }
}

/// Join `path` onto `base`, unless `path` is already an absolute URL.
pub(crate) fn resolve_url(base: Option<&Url>, path: &str) -> Result<Url, NetError> {
    if let Ok(url) = Url::parse(path) {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(NetError::DisallowedUrlScheme);
        }
        return Ok(url);
    }

    let base = base.ok_or(NetError::InvalidUrl)?;
    if base.cannot_be_a_base() {
        return Err(NetError::InvalidUrl);
    }

    let (rest, fragment) = match path.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (path, None),
    };
    let (relative, query) = match rest.split_once('?') {
        Some((relative, query)) => (relative, Some(query)),
        None => (rest, None),
    };

    // The base query is kept and the path's own query appended to it.
    let query = match (base.query().filter(|q| !q.is_empty()), query.filter(|q| !q.is_empty())) {
        (Some(base_query), Some(query)) => Some(format!("{base_query}&{query}")),
        (base_query, query) => base_query.or(query).map(str::to_owned),
    };

    let mut url = base.clone();
    let joined_path = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        relative.trim_start_matches('/')
    );
    url.set_path(&joined_path);
    url.set_query(query.as_deref());
    url.set_fragment(fragment);
    Ok(url)
}
