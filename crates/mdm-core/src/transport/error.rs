//! Transport failure kinds.

use thiserror::Error;

/// Why a transfer failed. Everything except `Aborted` is subject to the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Network-level failure (connection refused/reset, DNS, short read).
    #[error("connection failed: {0}")]
    Connection(String),
    /// Connect or transfer timed out (including stalled low-speed transfers).
    #[error("timed out: {0}")]
    Timeout(String),
    /// TLS handshake or certificate validation failed.
    #[error("TLS validation failed: {0}")]
    Tls(String),
    /// Server answered with an error status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Aborted locally (cancel).
    #[error("transfer aborted")]
    Aborted,
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Aborted)
    }
}
