//! Error types for the relay library.

use std::time::Duration;

/// Errors that can occur in the relay library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Input**: [`MissingAddress`](Self::MissingAddress) — `start` without a receiver address.
/// - **Receiver**: [`ReceiverNotFound`](Self::ReceiverNotFound),
///   [`Command`](Self::Command), [`Discovery`](Self::Discovery).
/// - **Transcoder**: [`Spawn`](Self::Spawn).
/// - **Host**: [`Io`](Self::Io), [`PublicHost`](Self::PublicHost).
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `start` was called without a (non-blank) receiver address.
    #[error("missing receiver address")]
    MissingAddress,

    /// No device advertising the target address showed up during the discovery window.
    #[error("receiver {address} not found within {timeout:?}")]
    ReceiverNotFound { address: String, timeout: Duration },

    /// The receiver rejected or failed a control command.
    #[error("receiver {action} command failed: {reason}")]
    Command {
        action: &'static str,
        reason: String,
    },

    /// The discovery mechanism could not be started at all.
    #[error("discovery error: {0}")]
    Discovery(String),

    /// The transcoding process could not be launched.
    #[error("failed to spawn transcoder {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// No routable local address to advertise in the playlist URL.
    #[error("could not determine public host: {0}")]
    PublicHost(String),
}

impl RelayError {
    pub(crate) fn command(action: &'static str, reason: impl ToString) -> Self {
        Self::Command {
            action,
            reason: reason.to_string(),
        }
    }
}

/// Convenience alias for `Result<T, RelayError>`.
pub type Result<T> = std::result::Result<T, RelayError>;
