//! A scripted in-memory transport for driving the service deterministically.
//!
//! Tests queue header lines, body chunks and completions through a
//! [`ScriptHandle`]; the reactor delivers them on its next `perform()`.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use transfernet::transport::{
    Completion, TransferInfo, TransferKey, TransferOptions, TransferSink, Transport,
};
use transfernet::NetError;

enum Step {
    Header(TransferKey, Vec<u8>),
    Body(TransferKey, Vec<u8>),
    Finish(TransferKey, Result<TransferInfo, NetError>),
}

#[derive(Default)]
struct ScriptState {
    next_key: TransferKey,
    attached: Vec<(TransferKey, TransferOptions)>,
    sinks: HashMap<TransferKey, Arc<dyn TransferSink>>,
    running: HashMap<TransferKey, bool>,
    detached: Vec<TransferKey>,
    max_simultaneous: usize,
    steps: VecDeque<Step>,
    info: HashMap<TransferKey, TransferInfo>,
    completions: Vec<Completion>,
    fail_attach: Option<NetError>,
}

/// Test-side view of a [`ScriptedTransport`].
#[derive(Clone, Default)]
pub struct ScriptHandle(Arc<Mutex<ScriptState>>);

/// A [`Transport`] that only does what its [`ScriptHandle`] tells it to.
pub struct ScriptedTransport(Arc<Mutex<ScriptState>>);

pub fn scripted() -> (ScriptedTransport, ScriptHandle) {
    let handle = ScriptHandle::default();
    (ScriptedTransport(Arc::clone(&handle.0)), handle)
}

fn lock(state: &Mutex<ScriptState>) -> MutexGuard<'_, ScriptState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl ScriptHandle {
    /// Keys of every transfer attached so far, in attach order.
    pub fn attached_keys(&self) -> Vec<TransferKey> {
        lock(&self.0).attached.iter().map(|(k, _)| *k).collect()
    }

    pub fn attached_urls(&self) -> Vec<String> {
        lock(&self.0)
            .attached
            .iter()
            .map(|(_, o)| o.url.to_string())
            .collect()
    }

    pub fn options(&self, key: TransferKey) -> Option<TransferOptions> {
        lock(&self.0)
            .attached
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, o)| o.clone())
    }

    pub fn is_detached(&self, key: TransferKey) -> bool {
        lock(&self.0).detached.contains(&key)
    }

    /// Highest number of transfers attached at the same time.
    pub fn max_simultaneous(&self) -> usize {
        lock(&self.0).max_simultaneous
    }

    pub fn fail_next_attach(&self, error: NetError) {
        lock(&self.0).fail_attach = Some(error);
    }

    /// Block until `n` transfers have been attached; returns the `n`th key.
    pub fn wait_for_attach(&self, n: usize) -> TransferKey {
        assert!(
            wait_until(Duration::from_secs(5), || self.attached_keys().len() >= n),
            "transfer {n} was never attached"
        );
        self.attached_keys()[n - 1]
    }

    pub fn header(&self, key: TransferKey, line: &str) {
        lock(&self.0)
            .steps
            .push_back(Step::Header(key, line.as_bytes().to_vec()));
    }

    pub fn body(&self, key: TransferKey, chunk: &[u8]) {
        lock(&self.0).steps.push_back(Step::Body(key, chunk.to_vec()));
    }

    pub fn finish(&self, key: TransferKey, status_code: u16) {
        let info = TransferInfo {
            status_code,
            local_ip: Some("127.0.0.1".parse().unwrap()),
            primary_ip: Some("127.0.0.1".parse().unwrap()),
        };
        lock(&self.0).steps.push_back(Step::Finish(key, Ok(info)));
    }

    pub fn fail(&self, key: TransferKey, error: NetError) {
        lock(&self.0).steps.push_back(Step::Finish(key, Err(error)));
    }

    /// Queue a complete `200 OK` exchange with a `Content-Length` body.
    pub fn respond_ok(&self, key: TransferKey, body: &[u8]) {
        self.header(key, "HTTP/1.1 200 OK\r\n");
        self.header(key, &format!("Content-Length: {}\r\n", body.len()));
        self.header(key, "\r\n");
        if !body.is_empty() {
            self.body(key, body);
        }
        self.finish(key, 200);
    }
}

impl Transport for ScriptedTransport {
    fn attach(
        &mut self,
        options: TransferOptions,
        sink: Arc<dyn TransferSink>,
    ) -> Result<TransferKey, NetError> {
        let mut state = lock(&self.0);
        if let Some(error) = state.fail_attach.take() {
            return Err(error);
        }
        state.next_key += 1;
        let key = state.next_key;
        state.attached.push((key, options));
        state.sinks.insert(key, sink);
        state.running.insert(key, true);
        state.max_simultaneous = state.max_simultaneous.max(state.sinks.len());
        Ok(key)
    }

    fn detach(&mut self, key: TransferKey) {
        let mut state = lock(&self.0);
        if state.sinks.remove(&key).is_some() {
            state.detached.push(key);
        }
        state.running.remove(&key);
        state.info.remove(&key);
    }

    fn wait(&mut self, timeout: Duration) {
        if lock(&self.0).steps.is_empty() {
            std::thread::sleep(timeout.min(Duration::from_millis(1)));
        }
    }

    fn perform(&mut self) -> usize {
        loop {
            let (step, sink) = {
                let mut state = lock(&self.0);
                let Some(step) = state.steps.pop_front() else {
                    break;
                };
                let key = match &step {
                    Step::Header(k, _) | Step::Body(k, _) | Step::Finish(k, _) => *k,
                };
                if state.running.get(&key) != Some(&true) {
                    continue;
                }
                let sink = state.sinks.get(&key).cloned();
                (step, sink)
            };

            match step {
                Step::Header(key, line) => {
                    if let Some(sink) = sink {
                        if !sink.on_header_line(&line) {
                            self.refuse(key);
                        }
                    }
                }
                Step::Body(key, chunk) => {
                    if let Some(sink) = sink {
                        if !sink.on_body_chunk(&chunk) {
                            self.refuse(key);
                        }
                    }
                }
                Step::Finish(key, result) => {
                    let mut state = lock(&self.0);
                    state.running.insert(key, false);
                    let result = result.map(|info| {
                        state.info.insert(key, info);
                    });
                    state.completions.push(Completion { key, result });
                }
            }
        }

        lock(&self.0).running.values().filter(|r| **r).count()
    }

    fn drain_completions(&mut self) -> Vec<Completion> {
        std::mem::take(&mut lock(&self.0).completions)
    }

    fn transfer_info(&self, key: TransferKey) -> Option<TransferInfo> {
        lock(&self.0).info.get(&key).copied()
    }
}

impl ScriptedTransport {
    fn refuse(&self, key: TransferKey) {
        let mut state = lock(&self.0);
        state.running.insert(key, false);
        state.completions.push(Completion {
            key,
            result: Err(NetError::TransferAborted),
        });
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
