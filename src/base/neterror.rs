use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum NetError {
    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("SSL protocol error")]
    SslProtocolError,
    #[error("Address unreachable")]
    AddressUnreachable,
    #[error("Connection timed out")]
    ConnectionTimedOut,

    // Certificate Errors
    #[error("Certificate authority invalid")]
    CertAuthorityInvalid,

    // HTTP Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Disallowed URL scheme")]
    DisallowedUrlScheme,
    #[error("Invalid redirect")]
    InvalidRedirect,
    #[error("Too many redirects")]
    TooManyRedirects,
    #[error("Empty response")]
    EmptyResponse,
    #[error("Invalid HTTP response")]
    InvalidHttpResponse,

    // Body and header handling
    #[error("Invalid header")]
    InvalidHeader,
    #[error("HTTP body error")]
    HttpBodyError,
    #[error("Invalid UTF-8 in body")]
    InvalidUtf8,
    #[error("JSON parse error")]
    JsonParseError,

    // Service lifecycle
    #[error("Service not initialized")]
    ServiceNotInitialized,
    #[error("Service not running")]
    ServiceNotRunning,
    #[error("Request already initiated")]
    RequestAlreadyInitiated,
    #[error("Request belongs to another service")]
    ForeignRequest,
    #[error("Invalid configuration")]
    InvalidConfiguration,
    #[error("Transport unavailable")]
    TransportUnavailable,
    #[error("Transfer aborted by receiver")]
    TransferAborted,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed => -104,
            NetError::NameNotResolved => -105,
            NetError::SslProtocolError => -107,
            NetError::AddressUnreachable => -109,
            NetError::ConnectionTimedOut => -118,

            NetError::CertAuthorityInvalid => -202,

            NetError::InvalidUrl => -300,
            NetError::DisallowedUrlScheme => -301,
            NetError::InvalidRedirect => -303,
            NetError::TooManyRedirects => -310,
            NetError::EmptyResponse => -324,
            NetError::InvalidHttpResponse => -370,

            // Crate-specific codes start at -900
            NetError::InvalidHeader => -900,
            NetError::HttpBodyError => -901,
            NetError::InvalidUtf8 => -902,
            NetError::JsonParseError => -903,
            NetError::ServiceNotInitialized => -910,
            NetError::ServiceNotRunning => -911,
            NetError::RequestAlreadyInitiated => -912,
            NetError::ForeignRequest => -913,
            NetError::InvalidConfiguration => -914,
            NetError::TransportUnavailable => -915,
            NetError::TransferAborted => -916,
            NetError::Unknown(code) => *code,
        }
    }

    /// Whether this error was caused by the caller rather than the network.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            NetError::InvalidUrl
                | NetError::DisallowedUrlScheme
                | NetError::ServiceNotInitialized
                | NetError::ServiceNotRunning
                | NetError::RequestAlreadyInitiated
                | NetError::ForeignRequest
                | NetError::InvalidConfiguration
                | NetError::TransportUnavailable
        )
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -103 => NetError::ConnectionAborted,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -107 => NetError::SslProtocolError,
            -109 => NetError::AddressUnreachable,
            -118 => NetError::ConnectionTimedOut,

            -202 => NetError::CertAuthorityInvalid,

            -300 => NetError::InvalidUrl,
            -301 => NetError::DisallowedUrlScheme,
            -303 => NetError::InvalidRedirect,
            -310 => NetError::TooManyRedirects,
            -324 => NetError::EmptyResponse,
            -370 => NetError::InvalidHttpResponse,

            -900 => NetError::InvalidHeader,
            -901 => NetError::HttpBodyError,
            -902 => NetError::InvalidUtf8,
            -903 => NetError::JsonParseError,
            -910 => NetError::ServiceNotInitialized,
            -911 => NetError::ServiceNotRunning,
            -912 => NetError::RequestAlreadyInitiated,
            -913 => NetError::ForeignRequest,
            -914 => NetError::InvalidConfiguration,
            -915 => NetError::TransportUnavailable,
            -916 => NetError::TransferAborted,
            _ => NetError::Unknown(code),
        }
    }
}
