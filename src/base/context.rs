//! Ergonomic error context helpers.
//!
//! Provides extension traits for adding context to `Result` types,
//! converting IO errors into `NetError` variants while logging the
//! underlying cause.

use crate::base::neterror::NetError;
use std::io;

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Add connection context to an IO error.
    ///
    /// # Example
    /// ```ignore
    /// use transfernet::base::context::IoResultExt;
    ///
    /// let stream = TcpStream::connect((host, port)).await
    ///     .connection_context(host, port)?;
    /// ```
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::debug!(host = %host, port, error = %e, "connection failed");
            net_error_from_io(&e)
        })
    }
}

/// Map an IO error kind onto the closest network error.
pub fn net_error_from_io(error: &io::Error) -> NetError {
    match error.kind() {
        io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
        io::ErrorKind::ConnectionReset => NetError::ConnectionReset,
        io::ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
        io::ErrorKind::TimedOut => NetError::ConnectionTimedOut,
        io::ErrorKind::NotFound => NetError::NameNotResolved,
        io::ErrorKind::AddrNotAvailable => NetError::AddressUnreachable,
        io::ErrorKind::UnexpectedEof => NetError::ConnectionClosed,
        _ => NetError::ConnectionFailed,
    }
}
