//! Work queues and the reactor loop.
//!
//! The reactor thread is the only code that touches the transport. Caller
//! threads only push work onto [`WorkQueues`] and signal the condition
//! variable. The work lock is never held while the transport dispatches
//! callbacks, so sinks and progress callbacks may call back into the service.

use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::transfer::{HttpTransfer, TransferId};
use crate::service::config::ResolvedConfig;
use crate::transport::{Completion, TransferKey, Transport};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

/// Bounded wait on the transport while transfers are active.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Back-off while there is queued work but nothing in flight.
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// One submitted request and its response, owned by the service until the
/// exchange finishes.
pub(crate) struct Exchange {
    pub request: Arc<HttpRequest>,
    pub response: Arc<HttpResponse>,
    /// Set once admitted.
    pub key: Option<TransferKey>,
}

pub(crate) struct WorkQueues {
    /// Admission ceiling on `active`.
    pub ceiling: usize,
    /// Every request ever created, pruned lazily.
    pub requests: Vec<Weak<HttpRequest>>,
    /// In-flight exchanges keyed by request id.
    pub exchanges: HashMap<TransferId, Exchange>,
    /// Submitted but not yet started, FIFO.
    pub pending: VecDeque<TransferId>,
    /// Started, keyed by transport handle.
    pub active: HashMap<TransferKey, TransferId>,
    /// Aborted transfers whose handle still needs detaching.
    pub aborted: VecDeque<TransferKey>,
}

impl WorkQueues {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            requests: Vec::new(),
            exchanges: HashMap::new(),
            pending: VecDeque::new(),
            active: HashMap::new(),
            aborted: VecDeque::new(),
        }
    }

    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.active.is_empty() && self.aborted.is_empty()
    }

    fn can_admit(&self) -> bool {
        !self.pending.is_empty() && self.active.len() < self.ceiling
    }

    fn prune_requests(&mut self) {
        self.requests.retain(|weak| weak.strong_count() > 0);
    }

    /// Forget an active transfer, returning its response.
    fn finish_active(&mut self, key: TransferKey) -> Option<Arc<HttpResponse>> {
        let request_id = self.active.remove(&key)?;
        self.exchanges.remove(&request_id).map(|e| e.response)
    }
}

/// State shared between an [`HttpService`](super::HttpService) and its reactor.
pub(crate) struct Shared {
    pub service_id: u64,
    next_transfer_id: AtomicU64,
    pub initialized: AtomicBool,
    pub running: AtomicBool,
    pub stop_requested: AtomicBool,
    config: RwLock<ResolvedConfig>,
    work: Mutex<WorkQueues>,
    wake: Condvar,
}

impl Shared {
    pub fn new(service_id: u64) -> Self {
        let config = ResolvedConfig::default();
        let ceiling = config.max_active_requests;
        Self {
            service_id,
            next_transfer_id: AtomicU64::new(1),
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            config: RwLock::new(config),
            work: Mutex::new(WorkQueues::new(ceiling)),
            wake: Condvar::new(),
        }
    }

    pub fn next_id(&self) -> TransferId {
        self.next_transfer_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn config(&self) -> ResolvedConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_config(&self, config: ResolvedConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    pub fn lock_work(&self) -> MutexGuard<'_, WorkQueues> {
        self.work.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake the reactor. Callers hold the work lock or have just released it.
    pub fn notify(&self) {
        self.wake.notify_all();
    }
}

/// Reactor thread body. Returns the transport so the service can restart.
pub(crate) fn run(shared: Arc<Shared>, mut transport: Box<dyn Transport>) -> Box<dyn Transport> {
    tracing::debug!(service = shared.service_id, "reactor started");

    loop {
        if shared.stop_requested.load(Ordering::SeqCst) {
            shutdown(&shared, transport.as_mut());
            break;
        }

        let config = shared.config();
        let (aborted, has_active) = {
            let mut work = shared.lock_work();
            work.prune_requests();
            admit(&mut work, &config, transport.as_mut());
            let aborted = std::mem::take(&mut work.aborted);
            (aborted, !work.active.is_empty())
        };

        for key in aborted {
            transport.detach(key);
        }

        if has_active {
            transport.wait(POLL_INTERVAL);
            transport.perform();
            for completion in transport.drain_completions() {
                complete(&shared, transport.as_mut(), completion);
            }
            enforce_timeouts(&shared, transport.as_mut(), Instant::now());
        }

        let work = shared.lock_work();
        if shared.stop_requested.load(Ordering::SeqCst) || !work.active.is_empty() {
            continue;
        }
        if work.can_admit() || !work.aborted.is_empty() {
            drop(shared.wake.wait_timeout(work, IDLE_BACKOFF));
            continue;
        }
        let _idle = shared
            .wake
            .wait_while(work, |w| {
                !shared.stop_requested.load(Ordering::SeqCst) && !w.can_admit() && w.is_idle()
            })
            .unwrap_or_else(PoisonError::into_inner);
    }

    tracing::debug!(service = shared.service_id, "reactor stopped");
    transport
}

/// Start pending transfers while below the ceiling.
fn admit(work: &mut WorkQueues, config: &ResolvedConfig, transport: &mut dyn Transport) {
    while work.active.len() < work.ceiling {
        let Some(request_id) = work.pending.pop_front() else {
            break;
        };
        let Some(exchange) = work.exchanges.get_mut(&request_id) else {
            continue;
        };

        let response = Arc::clone(&exchange.response);
        if !response.set_connecting() {
            work.exchanges.remove(&request_id);
            continue;
        }

        match exchange
            .request
            .start_transfer(config, transport, Arc::<HttpResponse>::clone(&response))
        {
            Ok(key) => {
                exchange.key = Some(key);
                work.active.insert(key, request_id);
                tracing::debug!(request = request_id, key, active = work.active.len(), "admitted");
            }
            Err(e) => {
                tracing::warn!(request = request_id, error = %e, "failed to start transfer");
                work.exchanges.remove(&request_id);
                response.set_error(format!("Failed to start transfer: {e}"));
            }
        }
    }
}

fn complete(shared: &Shared, transport: &mut dyn Transport, completion: Completion) {
    let Completion { key, result } = completion;
    let response = shared.lock_work().finish_active(key);

    if let Some(response) = response {
        let result = result.map(|()| transport.transfer_info(key).unwrap_or_default());
        if let Err(e) = &result {
            tracing::debug!(response = response.id(), error = %e, "transfer failed");
        }
        response.complete(result);
    }
    transport.detach(key);
}

/// Apply every active transfer's timeout policies at `now`.
fn enforce_timeouts(shared: &Shared, transport: &mut dyn Transport, now: Instant) {
    let active: Vec<(TransferKey, Arc<HttpRequest>, Arc<HttpResponse>)> = {
        let work = shared.lock_work();
        work.active
            .iter()
            .filter_map(|(key, id)| {
                let exchange = work.exchanges.get(id)?;
                Some((*key, Arc::clone(&exchange.request), Arc::clone(&exchange.response)))
            })
            .collect()
    };

    for (key, request, response) in active {
        let Some(state) = response.check_timeouts(&request.timeout(), now) else {
            continue;
        };
        tracing::debug!(response = response.id(), %state, "transfer timed out");
        shared.lock_work().finish_active(key);
        transport.detach(key);
    }
}

/// Abort everything and release every transport handle.
fn shutdown(shared: &Shared, transport: &mut dyn Transport) {
    let (pending, active, aborted) = {
        let mut guard = shared.lock_work();
        let work = &mut *guard;
        let pending: Vec<_> = work
            .pending
            .drain(..)
            .filter_map(|id| work.exchanges.remove(&id))
            .collect();
        let active: Vec<_> = work
            .active
            .drain()
            .filter_map(|(key, id)| work.exchanges.remove(&id).map(|e| (key, e.response)))
            .collect();
        let aborted: Vec<_> = work.aborted.drain(..).collect();
        work.exchanges.clear();
        (pending, active, aborted)
    };

    for exchange in pending {
        exchange.response.cancel_pending();
    }
    for (key, response) in active {
        response.set_aborted();
        transport.detach(key);
    }
    for key in aborted {
        transport.detach(key);
    }
}
