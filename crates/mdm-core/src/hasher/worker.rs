//! Dedicated hashing thread with its own request queue.

use std::sync::mpsc;
use std::thread::JoinHandle;

use crate::event::{Event, EventSender};

use super::{hash_and_save, HashRequest};

/// Handle to the hash-and-commit thread. Requests are processed in order;
/// each outcome is posted to the event channel, never returned directly.
/// Dropping the handle closes the queue and joins the thread.
pub struct HashWorker {
    queue: Option<mpsc::Sender<HashRequest>>,
    thread: Option<JoinHandle<()>>,
}

impl HashWorker {
    pub fn spawn(events: EventSender) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<HashRequest>();
        let thread = std::thread::Builder::new()
            .name("mdm-hash".to_string())
            .spawn(move || {
                while let Ok(request) = rx.recv() {
                    let outcome = hash_and_save(request);
                    if events.blocking_send(Event::Hashed(outcome)).is_err() {
                        tracing::debug!("event channel closed, hash worker exiting");
                        break;
                    }
                }
            })?;
        Ok(Self {
            queue: Some(tx),
            thread: Some(thread),
        })
    }

    /// Queue a request. On failure the request is handed back so the caller can clean up.
    pub fn submit(&self, request: HashRequest) -> Result<(), HashRequest> {
        match &self.queue {
            Some(tx) => tx.send(request).map_err(|e| e.0),
            None => Err(request),
        }
    }
}

impl Drop for HashWorker {
    fn drop(&mut self) {
        drop(self.queue.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("hash worker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{digest_path, ExpectedDigest, HashAlgorithm};
    use crate::storage::{temp_path, TempFile};
    use crate::transport::TransferId;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[tokio::test]
    async fn outcome_arrives_on_event_channel() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = crate::event::channel();
        let worker = HashWorker::spawn(tx).unwrap();

        let final_path = dir.path().join("model.bin");
        let mut temp = TempFile::create(&temp_path(&final_path)).unwrap();
        temp.append(b"payload").unwrap();
        let staged = temp.close().unwrap();
        let hex = digest_path(staged.path(), HashAlgorithm::Md5).unwrap();

        worker
            .submit(HashRequest {
                id: TransferId(7),
                expected: ExpectedDigest::md5(hex),
                final_path: final_path.clone(),
                staged,
                abort: Arc::new(AtomicBool::new(false)),
            })
            .unwrap();

        match rx.recv().await {
            Some(Event::Hashed(outcome)) => {
                assert_eq!(outcome.id, TransferId(7));
                assert!(outcome.is_installed());
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(final_path.exists());
        drop(worker);
    }
}
