//! Request verbs and the accepted-encoding bitmask.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    Head,
    #[default]
    Get,
    Patch,
    Put,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Head => "HEAD",
            HttpMethod::Get => "GET",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Verbs whose request body is sent to the server.
    pub fn carries_body(self) -> bool {
        matches!(self, HttpMethod::Patch | HttpMethod::Put | HttpMethod::Post)
    }
}

impl From<HttpMethod> for http::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Head => http::Method::HEAD,
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Patch => http::Method::PATCH,
            HttpMethod::Put => http::Method::PUT,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Delete => http::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content codings a request is willing to accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AcceptedEncodings(u8);

impl AcceptedEncodings {
    pub const NONE: Self = Self(0);
    pub const IDENTITY: Self = Self(1 << 0);
    pub const DEFLATE: Self = Self(1 << 1);
    pub const GZIP: Self = Self(1 << 2);
    pub const BROTLI: Self = Self(1 << 3);
    pub const ZSTANDARD: Self = Self(1 << 4);
    pub const ALL: Self = Self(0b1_1111);

    const NAMES: [(Self, &'static str); 5] = [
        (Self::GZIP, "gzip"),
        (Self::DEFLATE, "deflate"),
        (Self::BROTLI, "br"),
        (Self::ZSTANDARD, "zstd"),
        (Self::IDENTITY, "identity"),
    ];

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Token list for the `Accept-Encoding` header, `None` when nothing is selected.
    pub fn header_value(self) -> Option<String> {
        let tokens: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        (!tokens.is_empty()).then(|| tokens.join(", "))
    }
}

impl BitOr for AcceptedEncodings {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AcceptedEncodings {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_verbs() {
        assert!(HttpMethod::Post.carries_body());
        assert!(HttpMethod::Put.carries_body());
        assert!(HttpMethod::Patch.carries_body());
        assert!(!HttpMethod::Get.carries_body());
        assert!(!HttpMethod::Head.carries_body());
        assert!(!HttpMethod::Delete.carries_body());
    }

    #[test]
    fn test_encoding_header_value() {
        let enc = AcceptedEncodings::GZIP | AcceptedEncodings::BROTLI;
        assert_eq!(enc.header_value().as_deref(), Some("gzip, br"));
        assert_eq!(AcceptedEncodings::NONE.header_value(), None);
        assert_eq!(
            AcceptedEncodings::ALL.header_value().as_deref(),
            Some("gzip, deflate, br, zstd, identity")
        );
    }

    #[test]
    fn test_truncate_unknown_bits() {
        let enc = AcceptedEncodings::from_bits_truncate(0xFF);
        assert_eq!(enc, AcceptedEncodings::ALL);
    }
}
