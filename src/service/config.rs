//! Service configuration.
//!
//! Every field is optional; an absent field inherits the built-in default.
//! Configurations are usually built in code or loaded from JSON:
//!
//! ```json
//! {
//!     "base_url": "https://api.example.com/v1",
//!     "connection_timeout_ms": 5000,
//!     "max_redirects": 3,
//!     "ca_bundle_path": "/etc/ssl/certs"
//! }
//! ```

use crate::base::neterror::NetError;
use crate::base::timeout::HttpTimeout;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_MAX_REDIRECTS: u32 = 8;
pub const DEFAULT_MAX_ACTIVE_REQUESTS: usize = 8;

/// User agent sent when the configuration does not name one.
pub fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Credentials for HTTP Basic authentication.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BasicAuth {
    pub user: String,
    pub password: String,
}

/// Input configuration passed to
/// [`HttpService::initialize`](crate::service::HttpService::initialize).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub base_url: Option<String>,
    pub connection_timeout_ms: Option<u64>,
    pub network_timeout_ms: Option<u64>,
    pub transfer_timeout_ms: Option<u64>,
    pub max_redirects: Option<u32>,
    /// CA bundle file or certificate directory.
    pub ca_bundle_path: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub bearer_token: Option<String>,
    pub basic_auth: Option<BasicAuth>,
    pub max_active_requests: Option<usize>,
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self, NetError> {
        serde_json::from_str(text).map_err(|e| {
            tracing::warn!(error = %e, "rejecting service configuration");
            NetError::InvalidConfiguration
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, NetError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "cannot read service configuration");
            NetError::InvalidConfiguration
        })?;
        Self::from_json(&text)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = Some(max_redirects);
        self
    }

    pub fn with_ca_bundle_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle_path = Some(path.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some(BasicAuth {
            user: user.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_max_active_requests(mut self, max: usize) -> Self {
        self.max_active_requests = Some(max);
        self
    }

    /// Validate and fill in defaults.
    pub fn resolve(&self) -> Result<ResolvedConfig, NetError> {
        let base_url = match self.base_url.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let url = Url::parse(raw).map_err(|_| NetError::InvalidUrl)?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(NetError::InvalidUrl);
                }
                Some(url)
            }
        };

        let max_active_requests = self.max_active_requests.unwrap_or(DEFAULT_MAX_ACTIVE_REQUESTS);
        if max_active_requests == 0 {
            return Err(NetError::InvalidConfiguration);
        }

        let defaults = HttpTimeout::default();
        let timeout = HttpTimeout {
            connection: self
                .connection_timeout_ms
                .map_or(defaults.connection, Duration::from_millis),
            network: self
                .network_timeout_ms
                .map_or(defaults.network, Duration::from_millis),
            transfer: self
                .transfer_timeout_ms
                .map_or(defaults.transfer, Duration::from_millis),
        };

        Ok(ResolvedConfig {
            base_url,
            timeout,
            max_redirects: self.max_redirects.unwrap_or(DEFAULT_MAX_REDIRECTS),
            ca_bundle: self.ca_bundle_path.clone(),
            user_agent: self.user_agent.clone().unwrap_or_else(default_user_agent),
            bearer_token: self.bearer_token.clone(),
            basic_auth: self.basic_auth.clone(),
            max_active_requests,
        })
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// A validated configuration with every default applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub base_url: Option<Url>,
    pub timeout: HttpTimeout,
    pub max_redirects: u32,
    pub ca_bundle: Option<PathBuf>,
    pub user_agent: String,
    pub bearer_token: Option<String>,
    pub basic_auth: Option<BasicAuth>,
    pub max_active_requests: usize,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: HttpTimeout::default(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            ca_bundle: None,
            user_agent: default_user_agent(),
            bearer_token: None,
            basic_auth: None,
            max_active_requests: DEFAULT_MAX_ACTIVE_REQUESTS,
        }
    }
}
