use std::fmt;

/// The lifecycle state of a response.
///
/// `None -> Connecting -> ReceivingHeaders -> ReceivingData -> Completed`,
/// with the failure states reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransferState {
    /// Paired with a request but not yet admitted by the reactor.
    #[default]
    None,

    /// Admitted; the transport is resolving, connecting and sending.
    Connecting,

    /// The status line or a header line has been received.
    ReceivingHeaders,

    /// At least one body chunk has been received.
    ReceivingData,

    /// The transport reported success and the body matched its declared size.
    Completed,

    /// Cancelled by the caller or by service shutdown.
    Aborted,

    /// No response started within the connection timeout.
    ConnectionTimedOut,

    /// No bytes arrived within the network timeout.
    NetworkTimedOut,

    /// The whole exchange exceeded the transfer timeout.
    TransferTimedOut,

    /// Protocol or transport failure.
    Error,
}

impl TransferState {
    pub fn is_receiving(self) -> bool {
        matches!(self, TransferState::ReceivingHeaders | TransferState::ReceivingData)
    }

    pub fn is_timed_out(self) -> bool {
        matches!(
            self,
            TransferState::ConnectionTimedOut
                | TransferState::NetworkTimedOut
                | TransferState::TransferTimedOut
        )
    }

    pub fn is_failed(self) -> bool {
        self == TransferState::Aborted || self.is_timed_out() || self == TransferState::Error
    }

    /// Terminal: no further mutation or promise resolution happens.
    pub fn is_done(self) -> bool {
        self == TransferState::Completed || self.is_failed()
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferState::None => "None",
            TransferState::Connecting => "Connecting",
            TransferState::ReceivingHeaders => "ReceivingHeaders",
            TransferState::ReceivingData => "ReceivingData",
            TransferState::Completed => "Completed",
            TransferState::Aborted => "Aborted",
            TransferState::ConnectionTimedOut => "ConnectionTimedOut",
            TransferState::NetworkTimedOut => "NetworkTimedOut",
            TransferState::TransferTimedOut => "TransferTimedOut",
            TransferState::Error => "Error",
        };
        write!(f, "{name}")
    }
}
