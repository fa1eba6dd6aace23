//! Timeout policy shared by the service (defaults) and requests (overrides).

use std::time::Duration;

pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(30);

/// The three timeout policies applied to every active transfer.
///
/// A zero duration disables the corresponding check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeout {
    /// Measured from entering `Connecting`; fires only while connecting.
    pub connection: Duration,
    /// Measured from the most recent byte received; fires only while receiving.
    pub network: Duration,
    /// Measured from connection establishment; fires only while receiving.
    pub transfer: Duration,
}

impl Default for HttpTimeout {
    fn default() -> Self {
        Self {
            connection: DEFAULT_CONNECTION_TIMEOUT,
            network: DEFAULT_NETWORK_TIMEOUT,
            transfer: Duration::ZERO,
        }
    }
}

impl HttpTimeout {
    /// A policy with every check disabled.
    pub const fn disabled() -> Self {
        Self {
            connection: Duration::ZERO,
            network: Duration::ZERO,
            transfer: Duration::ZERO,
        }
    }

    /// Whether `elapsed` exceeds `limit`, treating a zero limit as disabled.
    pub fn exceeded(limit: Duration, elapsed: Duration) -> bool {
        !limit.is_zero() && elapsed >= limit
    }
}
