//! Network transport seam.
//!
//! The orchestrator does not speak HTTP. It asks a `Transport` to start or
//! abort transfers and reacts to the `TransportEvent`s the transport posts on
//! the event channel: body chunks, progress, completion, failure.

mod classify;
mod curl_transport;
mod error;

pub use classify::{classify_curl_error, classify_http_status};
pub use curl_transport::CurlTransport;
pub use error::TransportError;

use std::fmt;

/// Identifies one network transfer. Allocated by the orchestrator; a retry gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(pub u64);

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A GET to stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub id: TransferId,
    pub url: String,
    /// Extra request headers (e.g. `Authorization`).
    pub headers: Vec<(String, String)>,
}

/// Lifecycle notifications for a transfer, in the order the transport observed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A chunk of the response body.
    Data { id: TransferId, chunk: Vec<u8> },
    /// Byte counters; observability only.
    Progress {
        id: TransferId,
        received: u64,
        total: Option<u64>,
    },
    /// Body fully received with a success status.
    Finished { id: TransferId },
    /// Transfer failed (connection, HTTP status, TLS validation, abort).
    Failed { id: TransferId, error: TransportError },
}

impl TransportEvent {
    pub fn id(&self) -> TransferId {
        match self {
            TransportEvent::Data { id, .. }
            | TransportEvent::Progress { id, .. }
            | TransportEvent::Finished { id }
            | TransportEvent::Failed { id, .. } => *id,
        }
    }
}

/// Starts and aborts streaming transfers; events are posted asynchronously.
pub trait Transport: Send {
    /// Begin streaming `request`. Must not block on the transfer itself.
    fn start(&mut self, request: TransferRequest) -> Result<(), TransportError>;

    /// Abort a transfer. Unknown or finished ids are ignored.
    fn abort(&mut self, id: TransferId);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn start(&mut self, request: TransferRequest) -> Result<(), TransportError> {
        (**self).start(request)
    }

    fn abort(&mut self, id: TransferId) {
        (**self).abort(id)
    }
}
