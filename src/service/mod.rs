//! HTTP Service
//!
//! [`HttpService`] owns the configuration, the work queues and a single
//! background reactor thread that drives every transfer through the
//! [`Transport`]. Caller threads create and configure requests, submit them,
//! and receive a [`ResponseFuture`] that resolves exactly once.
//!
//! ```rust,ignore
//! use transfernet::http::HttpMethod;
//! use transfernet::service::{HttpService, ServiceConfig};
//!
//! let service = HttpService::hyper()?;
//! service.initialize(&ServiceConfig::new().with_base_url("https://api.example.com"), true)?;
//!
//! let request = service.create_request(HttpMethod::Get, "/status");
//! let response = service.send_request_and_wait(&request)?;
//! println!("{} {}", response.status_code(), response.text()?);
//! ```

pub mod config;
mod reactor;

pub use self::config::{BasicAuth, ResolvedConfig, ServiceConfig};

use self::reactor::{Exchange, Shared};
use crate::base::neterror::NetError;
use crate::http::future::ResponseFuture;
use crate::http::method::HttpMethod;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::transfer::HttpTransfer;
use crate::transport::{HyperTransport, Transport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

static NEXT_SERVICE_ID: AtomicU64 = AtomicU64::new(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An asynchronous HTTP client driven by one reactor thread.
pub struct HttpService {
    shared: Arc<Shared>,
    reactor: Mutex<Option<JoinHandle<Box<dyn Transport>>>>,
    /// Parked here while the reactor is not running.
    transport: Mutex<Option<Box<dyn Transport>>>,
}

impl HttpService {
    /// Create a service over `transport`. Call [`initialize`](Self::initialize)
    /// before submitting requests.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            shared: Arc::new(Shared::new(NEXT_SERVICE_ID.fetch_add(1, Ordering::Relaxed))),
            reactor: Mutex::new(None),
            transport: Mutex::new(Some(Box::new(transport))),
        }
    }

    /// Create a service over the hyper/BoringSSL transport.
    pub fn hyper() -> Result<Self, NetError> {
        Ok(Self::new(HyperTransport::new()?))
    }

    /// Validate and apply `config`, optionally starting the reactor.
    pub fn initialize(&self, config: &ServiceConfig, auto_start: bool) -> Result<(), NetError> {
        let resolved = config.resolve()?;
        tracing::debug!(
            service = self.shared.service_id,
            base_url = ?resolved.base_url.as_ref().map(|u| u.as_str()),
            ceiling = resolved.max_active_requests,
            "initializing"
        );

        {
            let mut work = self.shared.lock_work();
            work.ceiling = resolved.max_active_requests;
        }
        self.shared.set_config(resolved);
        self.shared.initialized.store(true, Ordering::SeqCst);
        self.shared.notify();

        if auto_start {
            self.start()?;
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Spawn the reactor thread. Starting a running service is a no-op.
    pub fn start(&self) -> Result<(), NetError> {
        if !self.is_initialized() {
            return Err(NetError::ServiceNotInitialized);
        }

        let mut reactor = lock(&self.reactor);
        if reactor.is_some() {
            return Ok(());
        }
        let transport = lock(&self.transport)
            .take()
            .ok_or(NetError::TransportUnavailable)?;

        self.shared.stop_requested.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("http-reactor".into())
            .spawn(move || reactor::run(shared, transport))
            .map_err(|e| {
                tracing::warn!(error = %e, "failed to spawn reactor thread");
                self.shared.running.store(false, Ordering::SeqCst);
                NetError::TransportUnavailable
            })?;

        *reactor = Some(handle);
        Ok(())
    }

    /// Abort every pending and active transfer and join the reactor.
    pub fn stop(&self) {
        let Some(handle) = lock(&self.reactor).take() else {
            return;
        };

        {
            let _work = self.shared.lock_work();
            self.shared.stop_requested.store(true, Ordering::SeqCst);
            self.shared.running.store(false, Ordering::SeqCst);
            self.shared.notify();
        }

        match handle.join() {
            Ok(transport) => *lock(&self.transport) = Some(transport),
            Err(_) => tracing::warn!(service = self.shared.service_id, "reactor thread panicked"),
        }
    }

    /// Change the admission ceiling. Zero is rejected.
    pub fn set_maximum_active_requests(&self, max: usize) -> bool {
        if max == 0 {
            return false;
        }
        self.shared.lock_work().ceiling = max;
        self.shared.notify();
        true
    }

    pub fn maximum_active_requests(&self) -> usize {
        self.shared.lock_work().ceiling
    }

    /// Create a request carrying the service defaults.
    pub fn create_request(&self, method: HttpMethod, url: &str) -> Arc<HttpRequest> {
        let config = self.shared.config();
        let request = Arc::new(HttpRequest::new(
            self.shared.next_id(),
            self.shared.service_id,
            method,
            url,
            &config,
        ));
        self.shared.lock_work().requests.push(Arc::downgrade(&request));
        request
    }

    /// Submit `request`. The future resolves once the response is done.
    pub fn send_request(&self, request: &Arc<HttpRequest>) -> Result<ResponseFuture, NetError> {
        if !self.is_initialized() {
            return Err(NetError::ServiceNotInitialized);
        }
        if !self.is_running() {
            return Err(NetError::ServiceNotRunning);
        }
        if request.service_id() != self.shared.service_id {
            return Err(NetError::ForeignRequest);
        }
        if request.is_initiated() {
            return Err(NetError::RequestAlreadyInitiated);
        }

        let (response, future) = HttpResponse::new(
            self.shared.next_id(),
            request.id(),
            request.method(),
            request.progress_callback(),
        );

        // Checked again under the work lock so a concurrent stop cannot strand
        // the exchange in the pending queue.
        let mut work = self.shared.lock_work();
        if !self.is_running() {
            return Err(NetError::ServiceNotRunning);
        }
        if !request.set_response(&response) {
            return Err(NetError::RequestAlreadyInitiated);
        }
        work.exchanges.insert(
            request.id(),
            Exchange {
                request: Arc::clone(request),
                response,
                key: None,
            },
        );
        work.pending.push_back(request.id());
        tracing::debug!(request = request.id(), pending = work.pending.len(), "queued");
        self.shared.notify();
        Ok(future)
    }

    /// Submit `request` and block until its response is done.
    ///
    /// Must not be called from inside an async runtime.
    pub fn send_request_and_wait(
        &self,
        request: &Arc<HttpRequest>,
    ) -> Result<Arc<HttpResponse>, NetError> {
        self.send_request(request)?.wait()
    }

    /// Abort a submitted request whose response is not done yet.
    ///
    /// The response turns `Aborted` immediately; the transport handle is
    /// released on the reactor's next iteration.
    pub fn abort_request(&self, request: &HttpRequest) -> bool {
        if request.service_id() != self.shared.service_id || !request.is_initiated() {
            return false;
        }

        let mut work = self.shared.lock_work();
        let request_id = request.id();
        let Some(exchange) = work.exchanges.get(&request_id) else {
            return false;
        };
        let response = Arc::clone(&exchange.response);
        let key = exchange.key;

        match key {
            None => {
                if !response.cancel_pending() {
                    return false;
                }
                work.pending.retain(|id| *id != request_id);
            }
            Some(key) => {
                if !response.set_aborted() {
                    return false;
                }
                work.active.remove(&key);
                work.aborted.push_back(key);
            }
        }
        work.exchanges.remove(&request_id);
        tracing::debug!(request = request_id, "aborted");
        self.shared.notify();
        true
    }

    /// The response paired with `request` while its exchange is in flight.
    pub fn response_for(&self, request: &HttpRequest) -> Option<Arc<HttpResponse>> {
        let work = self.shared.lock_work();
        work.exchanges
            .get(&request.id())
            .map(|e| Arc::clone(&e.response))
    }

    /// Every live request created by this service.
    pub fn requests(&self) -> Vec<Arc<HttpRequest>> {
        self.shared
            .lock_work()
            .requests
            .iter()
            .filter_map(|weak| weak.upgrade())
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.lock_work().pending.len()
    }

    pub fn active_count(&self) -> usize {
        self.shared.lock_work().active.len()
    }
}

impl Drop for HttpService {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for HttpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpService")
            .field("id", &self.shared.service_id)
            .field("initialized", &self.is_initialized())
            .field("running", &self.is_running())
            .finish()
    }
}
