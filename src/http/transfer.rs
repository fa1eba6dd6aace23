//! State shared by requests and responses: an id, a header collection and a body.

use crate::http::headers::{HeaderCase, HttpHeaders};
use bytes::{Bytes, BytesMut};

/// Unique, monotonically assigned identifier of a request or response.
pub type TransferId = u64;

/// Headers and body of one side of an exchange.
///
/// Sealing latches the headers read-only and freezes the body.
#[derive(Debug, Default)]
pub struct Transfer {
    headers: HttpHeaders,
    body: BytesMut,
    sealed: bool,
}

impl Transfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    /// Mutable access; the collection enforces its own read-only latch.
    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Replace the body wholesale.
    pub fn set_body(&mut self, body: impl AsRef<[u8]>) -> bool {
        if self.sealed {
            return false;
        }
        self.body.clear();
        self.body.extend_from_slice(body.as_ref());
        true
    }

    pub fn append_body(&mut self, chunk: &[u8]) -> bool {
        if self.sealed {
            return false;
        }
        self.body.extend_from_slice(chunk);
        true
    }

    pub fn reserve_body(&mut self, additional: usize) {
        if !self.sealed {
            self.body.reserve(additional);
        }
    }

    pub fn body_capacity(&self) -> usize {
        self.body.capacity()
    }

    pub fn body_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.body)
    }

    pub fn seal(&mut self) {
        self.sealed = true;
        self.headers.set_read_only();
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

pub(crate) mod sealed {
    use super::Transfer;

    /// Locked access to the [`Transfer`] behind a request or response.
    ///
    /// The closure runs with the owner's lock held and must not call back
    /// into the same object.
    pub trait TransferAccess {
        fn with_transfer<R>(&self, f: impl FnOnce(&Transfer) -> R) -> R;

        fn with_transfer_mut<R>(&self, f: impl FnOnce(&mut Transfer) -> R) -> R;
    }
}

/// Common accessors of [`HttpRequest`](crate::http::HttpRequest) and
/// [`HttpResponse`](crate::http::HttpResponse).
///
/// Every accessor takes the object's lock for the duration of one call and
/// releases it before returning. The locked [`Transfer`] itself is not
/// reachable from outside the crate:
///
/// ```compile_fail
/// use transfernet::http::HttpTransfer;
///
/// fn peek(response: &transfernet::HttpResponse) -> usize {
///     response.with_transfer(|t| t.body_len())
/// }
/// ```
pub trait HttpTransfer: sealed::TransferAccess {
    fn id(&self) -> TransferId;

    fn is_read_only(&self) -> bool {
        self.with_transfer(|t| t.is_sealed())
    }

    fn header(&self, name: &str) -> Option<String> {
        self.with_transfer(|t| t.headers().get(name).map(str::to_owned))
    }

    fn has_header(&self, name: &str) -> bool {
        self.with_transfer(|t| t.headers().has(name))
    }

    /// Snapshot of the whole header collection.
    fn headers(&self) -> HttpHeaders {
        self.with_transfer(|t| t.headers().clone())
    }

    fn set_header(&self, name: &str, value: &str) -> bool {
        self.with_transfer_mut(|t| t.headers_mut().set(name, value))
    }

    fn remove_header(&self, name: &str) -> bool {
        self.with_transfer_mut(|t| t.headers_mut().remove(name))
    }

    fn clear_headers(&self) -> bool {
        self.with_transfer_mut(|t| t.headers_mut().clear())
    }

    fn set_header_case(&self, case: HeaderCase) -> bool {
        self.with_transfer_mut(|t| t.headers_mut().set_header_case(case))
    }

    fn content_type(&self) -> Option<String> {
        self.with_transfer(|t| t.headers().content_type().map(str::to_owned))
    }

    fn charset(&self) -> Option<String> {
        self.with_transfer(|t| t.headers().charset().map(str::to_owned))
    }

    fn set_content_type(&self, media_type: &str, charset: Option<&str>) -> bool {
        self.with_transfer_mut(|t| t.headers_mut().set_content_type(media_type, charset))
    }

    fn user_agent(&self) -> Option<String> {
        self.with_transfer(|t| t.headers().user_agent().map(str::to_owned))
    }

    fn authorization(&self) -> Option<String> {
        self.with_transfer(|t| t.headers().authorization().map(str::to_owned))
    }

    fn body(&self) -> Bytes {
        self.with_transfer(|t| t.body_bytes())
    }

    fn body_len(&self) -> usize {
        self.with_transfer(|t| t.body_len())
    }

    fn set_body(&self, body: &[u8]) -> bool {
        self.with_transfer_mut(|t| t.set_body(body))
    }
}
