//! Events delivered to the orchestrator's execution context.
//!
//! Transfer threads and the hash worker never touch orchestrator state; they
//! post one of these onto the event channel and the owning loop applies it.

use crate::hasher::HashOutcome;
use crate::transport::TransportEvent;

#[derive(Debug)]
pub enum Event {
    Transport(TransportEvent),
    Hashed(HashOutcome),
}

impl From<TransportEvent> for Event {
    fn from(e: TransportEvent) -> Self {
        Event::Transport(e)
    }
}

impl From<HashOutcome> for Event {
    fn from(o: HashOutcome) -> Self {
        Event::Hashed(o)
    }
}

/// Queued events before senders block. Body chunks are at most a curl
/// buffer each, so this also caps how much of a body sits in memory.
pub const EVENT_CAPACITY: usize = 64;

pub type EventSender = tokio::sync::mpsc::Sender<Event>;
pub type EventReceiver = tokio::sync::mpsc::Receiver<Event>;

/// Create the event channel shared by the transport, the hash worker and the orchestrator.
///
/// Transfer and worker threads send with `blocking_send`, so a slow consumer
/// stalls the producers instead of buffering without limit.
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::channel(EVENT_CAPACITY)
}
