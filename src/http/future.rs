use crate::base::neterror::NetError;
use crate::http::response::HttpResponse;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Resolves with the response once it reaches a terminal state.
///
/// Await it from async code, or call [`ResponseFuture::wait`] from a plain
/// thread. If the owning service is dropped before the exchange finishes the
/// future resolves with [`NetError::ConnectionAborted`].
#[derive(Debug)]
pub struct ResponseFuture {
    rx: oneshot::Receiver<Arc<HttpResponse>>,
}

impl ResponseFuture {
    pub(crate) fn new(rx: oneshot::Receiver<Arc<HttpResponse>>) -> Self {
        Self { rx }
    }

    /// Block the current thread until the response is done.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> Result<Arc<HttpResponse>, NetError> {
        self.rx.blocking_recv().map_err(|_| NetError::ConnectionAborted)
    }

    /// Non-blocking check; `None` while the exchange is still running.
    pub fn try_take(&mut self) -> Option<Result<Arc<HttpResponse>, NetError>> {
        match self.rx.try_recv() {
            Ok(response) => Some(Ok(response)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(NetError::ConnectionAborted)),
        }
    }
}

impl Future for ResponseFuture {
    type Output = Result<Arc<HttpResponse>, NetError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| NetError::ConnectionAborted))
    }
}
