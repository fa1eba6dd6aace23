//! Production transport: HTTP/1.1 over TCP or BoringSSL, driven by tokio.
//!
//! Each attached transfer runs as its own task on a private runtime. Tasks
//! never touch engine state; they push header lines, body chunks and their
//! final result into a channel that [`Transport::perform`] drains on the
//! reactor thread.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::transport::tls;
use crate::transport::{
    Completion, TransferInfo, TransferKey, TransferOptions, TransferSink, Transport,
};
use boring::ssl::SslConnector;
use bytes::Bytes;
use http::header::{ACCEPT_ENCODING, HOST, LOCATION};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use url::{Host, Position, Url};

const WORKER_THREADS: usize = 2;

enum Event {
    HeaderLine(TransferKey, Bytes),
    BodyChunk(TransferKey, Bytes),
    Finished(TransferKey, Result<TransferInfo, NetError>),
}

struct AttachedTransfer {
    task: JoinHandle<()>,
    sink: Arc<dyn TransferSink>,
    finished: bool,
    info: Option<TransferInfo>,
}

/// Connector cache key: peer verification flag and CA bundle location.
type ConnectorKey = (bool, Option<PathBuf>);

/// A [`Transport`] backed by hyper's HTTP/1.1 client connection and BoringSSL.
pub struct HyperTransport {
    runtime: Option<Runtime>,
    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
    backlog: VecDeque<Event>,
    transfers: HashMap<TransferKey, AttachedTransfer>,
    completions: Vec<Completion>,
    connectors: HashMap<ConnectorKey, SslConnector>,
    next_key: TransferKey,
}

impl HyperTransport {
    pub fn new() -> Result<Self, NetError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(WORKER_THREADS)
            .thread_name("transfernet-io")
            .enable_all()
            .build()
            .map_err(|e| {
                tracing::warn!(error = %e, "failed to build transport runtime");
                NetError::TransportUnavailable
            })?;
        let (events_tx, events_rx) = mpsc::channel();

        Ok(Self {
            runtime: Some(runtime),
            events_tx,
            events_rx,
            backlog: VecDeque::new(),
            transfers: HashMap::new(),
            completions: Vec::new(),
            connectors: HashMap::new(),
            next_key: 1,
        })
    }

    fn connector_for(&mut self, options: &TransferOptions) -> Result<SslConnector, NetError> {
        let key = (options.verify_peer, options.ca_bundle.clone());
        if let Some(connector) = self.connectors.get(&key) {
            return Ok(connector.clone());
        }
        let connector = tls::build_connector(options.verify_peer, options.ca_bundle.as_deref())?;
        self.connectors.insert(key, connector.clone());
        Ok(connector)
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::HeaderLine(key, line) => {
                tracing::trace!(key, line = %String::from_utf8_lossy(&line).trim_end(), "header");
                self.deliver(key, |sink| sink.on_header_line(&line));
            }
            Event::BodyChunk(key, chunk) => {
                tracing::trace!(key, len = chunk.len(), "body chunk");
                self.deliver(key, |sink| sink.on_body_chunk(&chunk));
            }
            Event::Finished(key, result) => {
                let Some(transfer) = self.transfers.get_mut(&key) else {
                    return;
                };
                if transfer.finished {
                    return;
                }
                transfer.finished = true;
                let result = match result {
                    Ok(info) => {
                        transfer.info = Some(info);
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                self.completions.push(Completion { key, result });
            }
        }
    }

    /// Hand data to a sink; a refusal aborts the task and completes the transfer.
    fn deliver(&mut self, key: TransferKey, f: impl FnOnce(&dyn TransferSink) -> bool) {
        let Some(transfer) = self.transfers.get_mut(&key) else {
            return;
        };
        if transfer.finished {
            return;
        }
        if !f(transfer.sink.as_ref()) {
            tracing::debug!(key, "sink refused data, aborting transfer");
            transfer.task.abort();
            transfer.finished = true;
            self.completions.push(Completion {
                key,
                result: Err(NetError::TransferAborted),
            });
        }
    }
}

impl Transport for HyperTransport {
    fn attach(
        &mut self,
        options: TransferOptions,
        sink: Arc<dyn TransferSink>,
    ) -> Result<TransferKey, NetError> {
        let connector = match options.url.scheme() {
            "https" => Some(self.connector_for(&options)?),
            "http" => None,
            _ => return Err(NetError::DisallowedUrlScheme),
        };
        let runtime = self.runtime.as_ref().ok_or(NetError::TransportUnavailable)?;

        let key = self.next_key;
        self.next_key += 1;

        let events = self.events_tx.clone();
        let task = runtime.spawn(async move {
            let result = fetch(key, &options, connector.as_ref(), &events).await;
            if let Err(e) = &result {
                tracing::debug!(key, url = %options.url, error = %e, "transfer failed");
            }
            let _ = events.send(Event::Finished(key, result));
        });

        self.transfers.insert(
            key,
            AttachedTransfer {
                task,
                sink,
                finished: false,
                info: None,
            },
        );
        Ok(key)
    }

    fn detach(&mut self, key: TransferKey) {
        if let Some(transfer) = self.transfers.remove(&key) {
            transfer.task.abort();
        }
    }

    fn wait(&mut self, timeout: Duration) {
        if !self.backlog.is_empty() {
            return;
        }
        if let Ok(event) = self.events_rx.recv_timeout(timeout) {
            self.backlog.push_back(event);
        }
    }

    fn perform(&mut self) -> usize {
        while let Some(event) = self.backlog.pop_front() {
            self.dispatch(event);
        }
        while let Ok(event) = self.events_rx.try_recv() {
            self.dispatch(event);
        }
        self.transfers.values().filter(|t| !t.finished).count()
    }

    fn drain_completions(&mut self) -> Vec<Completion> {
        std::mem::take(&mut self.completions)
    }

    fn transfer_info(&self, key: TransferKey) -> Option<TransferInfo> {
        self.transfers.get(&key).and_then(|t| t.info)
    }
}

impl Drop for HyperTransport {
    fn drop(&mut self) {
        for (_, transfer) in self.transfers.drain() {
            transfer.task.abort();
        }
        // Safe to call from inside another runtime, unlike a plain drop.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("transfers", &self.transfers.len())
            .field("pending_completions", &self.completions.len())
            .field("cached_connectors", &self.connectors.len())
            .finish()
    }
}

/// Run one exchange, following redirects, streaming everything into `events`.
async fn fetch(
    key: TransferKey,
    options: &TransferOptions,
    connector: Option<&SslConnector>,
    events: &mpsc::Sender<Event>,
) -> Result<TransferInfo, NetError> {
    let mut url = options.url.clone();
    let mut method: Method = options.method.into();
    let mut body = options.body.clone();
    let mut redirects = 0u32;

    loop {
        let (tcp, host) = connect_tcp(&url).await?;
        let _ = tcp.set_nodelay(true);
        let local_ip = tcp.local_addr().ok().map(|a| a.ip());
        let primary_ip = tcp.peer_addr().ok().map(|a| a.ip());

        let request = build_request(&url, &method, body.clone(), options)?;
        let response = match url.scheme() {
            "https" => {
                let connector = connector.ok_or(NetError::SslProtocolError)?;
                let config = tls::configure_for_host(connector, &host, options.verify_host)?;
                let stream = tokio_boring::connect(config, &host, tcp).await.map_err(|e| {
                    tracing::debug!(host = %host, error = %e, "TLS handshake failed");
                    NetError::SslProtocolError
                })?;
                send_request(stream, request).await?
            }
            "http" => send_request(tcp, request).await?,
            _ => return Err(NetError::DisallowedUrlScheme),
        };

        emit_head(key, &response, events)?;

        let status = response.status();
        if options.max_redirects > 0 && status.is_redirection() {
            if let Some(location) = response.headers().get(LOCATION) {
                if redirects >= options.max_redirects {
                    return Err(NetError::TooManyRedirects);
                }
                redirects += 1;
                let location = location.to_str().map_err(|_| NetError::InvalidRedirect)?;
                url = url.join(location).map_err(|_| NetError::InvalidRedirect)?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(NetError::InvalidRedirect);
                }
                if status == StatusCode::SEE_OTHER
                    || (method == Method::POST
                        && matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND))
                {
                    method = Method::GET;
                    body = None;
                }
                tracing::debug!(key, url = %url, redirects, "following redirect");
                continue;
            }
        }

        let mut incoming = response.into_body();
        while let Some(frame) = incoming.frame().await {
            let frame = frame.map_err(|e| {
                tracing::debug!(key, error = %e, "body read failed");
                NetError::HttpBodyError
            })?;
            if let Ok(data) = frame.into_data() {
                if !data.is_empty() {
                    events
                        .send(Event::BodyChunk(key, data))
                        .map_err(|_| NetError::TransferAborted)?;
                }
            }
        }

        return Ok(TransferInfo {
            status_code: status.as_u16(),
            local_ip,
            primary_ip,
        });
    }
}

/// Open the TCP connection for `url`.
///
/// Returns the stream with the bare host name used for TLS. IP literals are
/// connected to directly and come back without IPv6 brackets.
async fn connect_tcp(url: &Url) -> Result<(TcpStream, String), NetError> {
    let port = url.port_or_known_default().ok_or(NetError::InvalidUrl)?;
    let ip: IpAddr = match url.host().ok_or(NetError::InvalidUrl)? {
        Host::Domain(domain) => {
            let tcp = TcpStream::connect((domain, port))
                .await
                .connection_context(domain, port)?;
            return Ok((tcp, domain.to_string()));
        }
        Host::Ipv4(ip) => ip.into(),
        Host::Ipv6(ip) => ip.into(),
    };
    let host = ip.to_string();
    let tcp = TcpStream::connect(SocketAddr::new(ip, port))
        .await
        .connection_context(&host, port)?;
    Ok((tcp, host))
}

fn build_request(
    url: &Url,
    method: &Method,
    body: Option<Bytes>,
    options: &TransferOptions,
) -> Result<Request<Full<Bytes>>, NetError> {
    let target = &url[Position::BeforePath..Position::AfterQuery];
    let authority = &url[Position::BeforeHost..Position::AfterPort];

    let mut builder = Request::builder()
        .method(method.clone())
        .uri(target)
        .header(HOST, authority);

    let mut has_accept_encoding = false;
    for (name, value) in &options.headers {
        has_accept_encoding |= name.eq_ignore_ascii_case(ACCEPT_ENCODING.as_str());
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let (false, Some(encodings)) = (has_accept_encoding, &options.accept_encoding) {
        builder = builder.header(ACCEPT_ENCODING, encodings.as_str());
    }

    builder
        .body(Full::new(body.unwrap_or_default()))
        .map_err(|_| NetError::InvalidHeader)
}

async fn send_request<IO>(
    io: IO,
    request: Request<Full<Bytes>>,
) -> Result<Response<Incoming>, NetError>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = http1::handshake(TokioIo::new(io))
        .await
        .map_err(|_| NetError::ConnectionFailed)?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!(error = %e, "connection closed with error");
        }
    });

    sender.send_request(request).await.map_err(|e| {
        tracing::debug!(error = %e, "request failed");
        if e.is_incomplete_message() {
            NetError::EmptyResponse
        } else if e.is_parse() {
            NetError::InvalidHttpResponse
        } else {
            NetError::ConnectionClosed
        }
    })
}

/// Re-synthesize the raw status and header lines of a parsed response.
fn emit_head(
    key: TransferKey,
    response: &Response<Incoming>,
    events: &mpsc::Sender<Event>,
) -> Result<(), NetError> {
    let send = |line: Vec<u8>| {
        events
            .send(Event::HeaderLine(key, Bytes::from(line)))
            .map_err(|_| NetError::TransferAborted)
    };

    let status = response.status();
    send(
        format!(
            "{:?} {} {}\r\n",
            response.version(),
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
        .into_bytes(),
    )?;

    for (name, value) in response.headers() {
        let mut line = Vec::with_capacity(name.as_str().len() + value.len() + 4);
        line.extend_from_slice(name.as_str().as_bytes());
        line.extend_from_slice(b": ");
        line.extend_from_slice(value.as_bytes());
        line.extend_from_slice(b"\r\n");
        send(line)?;
    }

    send(b"\r\n".to_vec())
}
