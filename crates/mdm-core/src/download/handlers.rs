//! Event handlers: everything the transport and the hash worker report back.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::event::Event;
use crate::hasher::{HashOutcome, HashRequest};
use crate::release::{ManifestError, MAX_MANIFEST_BYTES};
use crate::storage;
use crate::transport::{TransferId, TransportError, TransportEvent};

use super::record::{ActiveDownload, PendingStart, Phase, Retired};
use super::{DownloadError, DownloadState, Downloader, FailureKind, Notification, ProgressStats};

impl Downloader {
    /// Apply one event. Events for unknown (cancelled, finished) transfers are dropped.
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Transport(TransportEvent::Data { id, chunk }) => self.on_data(id, &chunk),
            Event::Transport(TransportEvent::Progress {
                id,
                received,
                total,
            }) => self.on_progress(id, received, total),
            Event::Transport(TransportEvent::Finished { id }) => self.on_finished(id),
            Event::Transport(TransportEvent::Failed { id, error }) => self.on_failed(id, error),
            Event::Hashed(outcome) => self.on_hashed(outcome),
        }
    }

    fn is_manifest(&self, id: TransferId) -> bool {
        self.manifest.as_ref().map(|m| m.id) == Some(id)
    }

    fn on_data(&mut self, id: TransferId, chunk: &[u8]) {
        if self.is_manifest(id) {
            self.on_manifest_data(id, chunk);
            return;
        }
        let Some(record) = self.active.get_mut(&id) else {
            tracing::trace!(transfer = %id, "data for unknown transfer");
            return;
        };
        let written = match &mut record.phase {
            Phase::Downloading(temp) => temp.append(chunk),
            Phase::Verifying { .. } => return,
        };
        if let Err(e) = written {
            self.transport.abort(id);
            if let Some(record) = self.active.remove(&id) {
                let message = format!("write {}: {}", record.temp_path.display(), e);
                self.fail_storage(record, message);
            }
        }
    }

    fn on_progress(&mut self, id: TransferId, received: u64, total: Option<u64>) {
        let Some(record) = self.active.get_mut(&id) else {
            return;
        };
        record.received = received;
        record.total = total;
        let stats = ProgressStats::new(received, total, record.started_at.elapsed());
        let model = record.model.clone();
        self.notify(Notification::Progress { model, stats });
    }

    fn on_finished(&mut self, id: TransferId) {
        if self.is_manifest(id) {
            self.on_manifest_finished();
            return;
        }
        let Some(mut record) = self.active.remove(&id) else {
            tracing::debug!(transfer = %id, "completion for unknown transfer");
            return;
        };
        let abort = Arc::new(AtomicBool::new(false));
        let phase = std::mem::replace(
            &mut record.phase,
            Phase::Verifying {
                abort: Arc::clone(&abort),
            },
        );
        let temp = match phase {
            Phase::Downloading(temp) => temp,
            other => {
                record.phase = other;
                self.active.insert(id, record);
                return;
            }
        };

        let staged = match temp.close() {
            Ok(staged) => staged,
            Err(e) => {
                let message = format!("close {}: {}", record.temp_path.display(), e);
                self.fail_storage(record, message);
                return;
            }
        };
        let request = HashRequest {
            id,
            expected: record.entry.digest.clone(),
            final_path: record.final_path.clone(),
            staged,
            abort,
        };
        if let Err(request) = self.worker.submit(request) {
            if let Err(e) = request.staged.discard() {
                tracing::warn!(transfer = %id, "could not delete staged file: {}", e);
            }
            self.fail_storage(record, "hash worker is not running".to_string());
            return;
        }

        let elapsed = record.started_at.elapsed();
        tracing::debug!(model = %record.model, transfer = %id, bytes = record.received, "verifying");
        self.notify(Notification::Verifying {
            model: record.model.clone(),
            elapsed,
        });
        self.active.insert(id, record);
    }

    fn on_failed(&mut self, id: TransferId, error: TransportError) {
        if self.is_manifest(id) {
            self.manifest = None;
            let e = ManifestError::from(error);
            tracing::warn!(transfer = %id, "{}", e);
            self.notify(Notification::ManifestFailed {
                message: e.to_string(),
            });
            return;
        }
        let Some(record) = self.active.remove(&id) else {
            tracing::debug!(transfer = %id, "failure for unknown transfer: {}", error);
            return;
        };
        tracing::warn!(model = %record.model, transfer = %id, attempt = record.attempt, "transfer failed: {}", error);
        let retired = self.retire(record);
        if error.is_retryable() {
            self.retry_or_fail(retired, error.to_string());
        } else {
            self.retries.clear_retry(&retired.entry.filename);
            self.fail(
                retired.model,
                retired.entry.filename,
                retired.attempt,
                FailureKind::Transport,
                error.to_string(),
            );
        }
    }

    fn on_hashed(&mut self, outcome: HashOutcome) {
        let HashOutcome {
            id,
            final_path,
            result,
        } = outcome;
        if let Some(drain) = self.draining.remove(&id) {
            // Cancelled while verifying: undo an install that slipped through,
            // unless it replaced a copy that was installed before.
            if result.is_ok() {
                if drain.had_installed {
                    tracing::info!(transfer = %id, path = %final_path.display(), "keeping verified artifact after cancel");
                } else {
                    tracing::info!(transfer = %id, path = %final_path.display(), "removing artifact installed after cancel");
                    if let Err(e) = storage::remove_if_exists(&final_path) {
                        tracing::warn!(path = %final_path.display(), "could not remove artifact: {}", e);
                    }
                }
            }
            if let Some(pending) = drain.restart {
                self.start_pending(pending);
            }
            return;
        }
        let Some(record) = self.active.remove(&id) else {
            tracing::debug!(transfer = %id, "hash outcome for unknown transfer");
            return;
        };
        match result {
            Ok(()) => {
                self.retries.clear_retry(record.filename());
                tracing::info!(model = %record.model, path = %final_path.display(), "model installed");
                self.outcomes
                    .insert(record.model.clone(), DownloadState::Installed);
                self.notify(Notification::Installed {
                    model: record.model,
                    path: final_path,
                });
            }
            Err(e) if e.is_integrity() => {
                let retired = self.retire(record);
                self.retry_or_fail(retired, e.to_string());
            }
            Err(e) => self.fail_storage(record, e.to_string()),
        }
    }

    /// Begin a start that was queued behind a cancelled verification.
    fn start_pending(&mut self, pending: PendingStart) {
        let PendingStart {
            model,
            entry,
            credential,
        } = pending;
        let filename = entry.filename.clone();
        tracing::debug!(model = %model, "starting queued download");
        if let Err(e) = self.begin_attempt(model.clone(), entry, credential, 1) {
            let kind = start_failure_kind(&e);
            self.fail(model, filename, 1, kind, e.to_string());
        }
    }

    fn on_manifest_data(&mut self, id: TransferId, chunk: &[u8]) {
        let Some(fetch) = self.manifest.as_mut() else {
            return;
        };
        if fetch.body.len() + chunk.len() > MAX_MANIFEST_BYTES {
            self.manifest = None;
            self.transport.abort(id);
            let e = ManifestError::TooLarge {
                limit: MAX_MANIFEST_BYTES,
            };
            tracing::warn!(transfer = %id, "{}", e);
            self.notify(Notification::ManifestFailed {
                message: e.to_string(),
            });
            return;
        }
        fetch.body.extend_from_slice(chunk);
    }

    fn on_manifest_finished(&mut self) {
        let Some(fetch) = self.manifest.take() else {
            return;
        };
        match self.releases.apply_manifest(&fetch.body) {
            Ok(releases) => {
                tracing::info!(releases, "release manifest updated");
                self.publish_release_state();
                self.notify(Notification::ManifestUpdated { releases });
            }
            Err(e) => {
                tracing::warn!("release manifest rejected: {}", e);
                self.notify(Notification::ManifestFailed {
                    message: e.to_string(),
                });
            }
        }
    }

    /// Push the cache's answers to the watch channels, notifying only on change.
    fn publish_release_state(&self) {
        let info = self.releases.release_info().cloned();
        let info_changed = self.release_info.send_if_modified(|current| {
            if *current == info {
                return false;
            }
            *current = info.clone();
            true
        });
        if info_changed {
            self.notify(Notification::ReleaseInfoChanged(info));
        }

        let newer = self.releases.has_newer_release();
        let newer_changed = self.newer_release.send_if_modified(|current| {
            if *current == newer {
                return false;
            }
            *current = newer;
            true
        });
        if newer_changed {
            self.notify(Notification::HasNewerReleaseChanged(newer));
        }
    }

    /// Retry a failed attempt while the tracker allows it, otherwise give up.
    fn retry_or_fail(&mut self, retired: Retired, reason: String) {
        let Retired {
            model,
            entry,
            credential,
            attempt,
        } = retired;
        let filename = entry.filename.clone();
        if !self.retries.should_retry(&filename) {
            self.fail(model, filename, attempt, FailureKind::RetriesExhausted, reason);
            return;
        }
        let attempt = attempt + 1;
        tracing::info!(model = %model, attempt, "retrying: {}", reason);
        self.outcomes
            .insert(model.clone(), DownloadState::FailedRetryable);
        self.notify(Notification::Retrying {
            model: model.clone(),
            attempt,
            reason,
        });

        if let Err(e) = self.begin_attempt(model.clone(), entry, credential, attempt) {
            self.retries.clear_retry(&filename);
            let kind = start_failure_kind(&e);
            self.fail(model, filename, attempt, kind, e.to_string());
        }
    }

    fn fail_storage(&mut self, record: ActiveDownload, message: String) {
        self.retries.clear_retry(record.filename());
        let retired = self.retire(record);
        self.fail(
            retired.model,
            retired.entry.filename,
            retired.attempt,
            FailureKind::Storage,
            message,
        );
    }

    fn fail(
        &mut self,
        model: String,
        filename: String,
        attempt: u32,
        kind: FailureKind,
        message: String,
    ) {
        tracing::error!(model = %model, attempt, ?kind, "download failed: {}", message);
        self.outcomes
            .insert(model.clone(), DownloadState::FailedTerminal);
        self.notify(Notification::Failed {
            model,
            filename,
            kind,
            message,
        });
    }

    fn retire(&self, record: ActiveDownload) -> Retired {
        let temp_path = record.temp_path.clone();
        let (retired, cleanup) = record.retire();
        if let Err(e) = cleanup {
            tracing::warn!(path = %temp_path.display(), "could not delete temp file: {}", e);
        }
        retired
    }
}

fn start_failure_kind(e: &DownloadError) -> FailureKind {
    match e {
        DownloadError::Storage { .. } => FailureKind::Storage,
        _ => FailureKind::Transport,
    }
}
