use base64::{engine::general_purpose, Engine as _};

pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const USER_AGENT: &str = "User-Agent";
pub const AUTHORIZATION: &str = "Authorization";
pub const ETAG: &str = "ETag";
pub const DATE: &str = "Date";
pub const IF_MATCH: &str = "If-Match";
pub const IF_NONE_MATCH: &str = "If-None-Match";

/// How header names are normalized when stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderCase {
    /// Keep the name exactly as supplied.
    #[default]
    Original,
    /// `CONTENT-TYPE`
    Upper,
    /// `content-type`
    Lower,
    /// `Content-Type`
    HeaderCase,
}

impl HeaderCase {
    /// Apply this normalization to a header name.
    pub fn apply(self, name: &str) -> String {
        match self {
            HeaderCase::Original => name.to_string(),
            HeaderCase::Upper => name.to_ascii_uppercase(),
            HeaderCase::Lower => name.to_ascii_lowercase(),
            HeaderCase::HeaderCase => name
                .split('-')
                .map(|word| {
                    let mut chars: Vec<char> = word.chars().collect();
                    if let Some(first) = chars.first_mut() {
                        *first = first.to_ascii_uppercase();
                    }
                    for c in chars.iter_mut().skip(1) {
                        *c = c.to_ascii_lowercase();
                    }
                    chars.into_iter().collect::<String>()
                })
                .collect::<Vec<_>>()
                .join("-"),
        }
    }
}

/// Header collection with a configurable key normalization and a read-only latch.
///
/// Lookups are case-insensitive regardless of the stored casing. Once
/// [`set_read_only`](Self::set_read_only) has been called every mutator
/// returns `false` and leaves the collection untouched.
#[derive(Debug, Clone, Default)]
pub struct HttpHeaders {
    /// Headers as (normalized_name, value) pairs
    headers: Vec<(String, String)>,
    case: HeaderCase,
    read_only: bool,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_case(case: HeaderCase) -> Self {
        Self {
            case,
            ..Self::default()
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.headers[i].1.as_str())
    }

    /// Insert or replace a header. Replacing keeps the original position.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        if self.read_only || name.is_empty() {
            return false;
        }
        let value = value.into();
        match self.position(name) {
            Some(i) => self.headers[i].1 = value,
            None => self.headers.push((self.case.apply(name), value)),
        }
        true
    }

    /// Append a folded continuation to an existing header value.
    pub fn append_to(&mut self, name: &str, continuation: &str) -> bool {
        if self.read_only {
            return false;
        }
        let Some(i) = self.position(name) else {
            return false;
        };
        let value = &mut self.headers[i].1;
        if !value.is_empty() && !continuation.is_empty() {
            value.push(' ');
        }
        value.push_str(continuation);
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        if self.read_only {
            return false;
        }
        match self.position(name) {
            Some(i) => {
                self.headers.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) -> bool {
        if self.read_only {
            return false;
        }
        self.headers.clear();
        true
    }

    pub fn header_case(&self) -> HeaderCase {
        self.case
    }

    /// Re-key every existing entry under the new normalization.
    pub fn set_header_case(&mut self, case: HeaderCase) -> bool {
        if self.read_only {
            return false;
        }
        self.case = case;
        for (name, _) in self.headers.iter_mut() {
            *name = case.apply(name);
        }
        true
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Latch the collection. There is no way back.
    pub fn set_read_only(&mut self) {
        self.read_only = true;
    }

    /// Media type of the `Content-Type` header, without parameters.
    pub fn content_type(&self) -> Option<&str> {
        self.get(CONTENT_TYPE)
            .and_then(|v| v.split(';').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// `charset=` parameter of the `Content-Type` header.
    pub fn charset(&self) -> Option<&str> {
        self.get(CONTENT_TYPE)?.split(';').skip(1).find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches('"'))
        })
    }

    pub fn set_content_type(&mut self, media_type: &str, charset: Option<&str>) -> bool {
        let value = match charset {
            Some(cs) => format!("{media_type}; charset={cs}"),
            None => media_type.to_string(),
        };
        self.set(CONTENT_TYPE, value)
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.get(USER_AGENT)
    }

    pub fn set_user_agent(&mut self, user_agent: &str) -> bool {
        self.set(USER_AGENT, user_agent)
    }

    pub fn authorization(&self) -> Option<&str> {
        self.get(AUTHORIZATION)
    }

    pub fn set_basic_authorization(&mut self, user: &str, password: &str) -> bool {
        self.set(AUTHORIZATION, basic_auth_token(user, password))
    }

    pub fn set_bearer_authorization(&mut self, token: &str) -> bool {
        self.set(AUTHORIZATION, format!("Bearer {token}"))
    }

    pub fn etag(&self) -> Option<&str> {
        self.get(ETAG)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

/// `Basic <base64(user:password)>`
pub fn basic_auth_token(user: &str, password: &str) -> String {
    let encoded = general_purpose::STANDARD.encode(format!("{user}:{password}"));
    format!("Basic {encoded}")
}
