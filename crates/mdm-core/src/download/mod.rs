//! Download orchestrator.
//!
//! Owns the active-download table, retry counters and release cache, and
//! drives each artifact through download → verify → install. All mutation
//! happens on the caller's execution context: public operations and
//! `handle_event` take `&mut self`, while transfer threads and the hash
//! worker only post `Event`s. See `service` for the task that owns it.

mod error;
mod handlers;
mod notify;
mod progress;
mod record;

pub use error::DownloadError;
pub use notify::{FailureKind, Notification};
pub use progress::ProgressStats;
pub use record::DownloadState;

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Instant;

use semver::Version;
use tokio::sync::{broadcast, watch};
use url::Url;

use crate::app_state::AppState;
use crate::catalog::{CatalogEntry, ModelCatalog};
use crate::config::MdmConfig;
use crate::event::EventSender;
use crate::hasher::HashWorker;
use crate::release::{ReleaseCache, ReleaseInfo};
use crate::retry::RetryTracker;
use crate::storage::{self, TempFile};
use crate::transport::{TransferId, TransferRequest, Transport};

use self::record::{ActiveDownload, Draining, PendingStart, Phase};

const NOTIFY_CAPACITY: usize = 1024;

/// Fixed inputs of a `Downloader`.
#[derive(Debug, Clone)]
pub struct DownloaderSettings {
    pub models_dir: PathBuf,
    /// Artifact base URL; must end with `/` for filenames to be appended.
    pub base_url: Url,
    pub manifest_url: String,
    /// Retry ceiling (attempts per artifact, including the first).
    pub max_attempts: u32,
    /// Running application version, compared against the release manifest.
    pub app_version: Version,
    pub app_state: AppState,
}

impl DownloaderSettings {
    pub fn from_config(cfg: &MdmConfig, app_version: Version) -> anyhow::Result<Self> {
        Ok(Self {
            models_dir: cfg.resolved_models_dir()?,
            base_url: Url::parse(&cfg.base_url)?,
            manifest_url: cfg.manifest_url.clone(),
            max_attempts: cfg.max_attempts(),
            app_version,
            app_state: AppState::open_default()?,
        })
    }
}

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A download for the same destination is already running; nothing was done.
    AlreadyActive,
}

/// Manifest transfer in flight: body is buffered in memory.
#[derive(Debug)]
struct ManifestFetch {
    id: TransferId,
    body: Vec<u8>,
}

pub struct Downloader {
    settings: DownloaderSettings,
    transport: Box<dyn Transport>,
    catalog: Box<dyn ModelCatalog>,
    worker: HashWorker,
    active: HashMap<TransferId, ActiveDownload>,
    retries: RetryTracker,
    releases: ReleaseCache,
    manifest: Option<ManifestFetch>,
    /// Cancelled while verifying; the worker's outcome for these is still due.
    draining: HashMap<TransferId, Draining>,
    /// Last known state per model once its record is gone.
    outcomes: HashMap<String, DownloadState>,
    next_id: u64,
    notifications: broadcast::Sender<Notification>,
    release_info: watch::Sender<Option<ReleaseInfo>>,
    newer_release: watch::Sender<bool>,
}

impl Downloader {
    /// Build the orchestrator and spawn its hash worker, which posts outcomes to `events`.
    pub fn new(
        settings: DownloaderSettings,
        transport: Box<dyn Transport>,
        catalog: Box<dyn ModelCatalog>,
        events: EventSender,
    ) -> std::io::Result<Self> {
        let worker = HashWorker::spawn(events)?;
        let (notifications, _) = broadcast::channel(NOTIFY_CAPACITY);
        let (release_info, _) = watch::channel(None);
        let (newer_release, _) = watch::channel(false);
        Ok(Self {
            retries: RetryTracker::new(settings.max_attempts),
            releases: ReleaseCache::new(settings.app_version.clone()),
            settings,
            transport,
            catalog,
            worker,
            active: HashMap::new(),
            manifest: None,
            draining: HashMap::new(),
            outcomes: HashMap::new(),
            next_id: 1,
            notifications,
            release_info,
            newer_release,
        })
    }

    /// Start fetching `model_id` into the model directory.
    pub fn download_model(&mut self, model_id: &str) -> Result<StartOutcome, DownloadError> {
        self.start(model_id, None)
    }

    /// Like `download_model`, sending `credential` as a bearer token.
    pub fn install_model(
        &mut self,
        model_id: &str,
        credential: &str,
    ) -> Result<StartOutcome, DownloadError> {
        self.start(model_id, Some(credential.to_string()))
    }

    /// Abort the active download for `model_id`, deleting its `.part` file.
    /// No-op if nothing is active for it.
    pub fn cancel_download(&mut self, model_id: &str) -> Result<(), DownloadError> {
        let Some(id) = self.find_by_model(model_id) else {
            if !self.cancel_pending(model_id) {
                tracing::debug!(model = model_id, "cancel: no active download");
            }
            return Ok(());
        };
        let Some(record) = self.active.remove(&id) else {
            return Ok(());
        };
        self.retries.clear_retry(record.filename());
        match &record.phase {
            Phase::Downloading(_) => self.transport.abort(id),
            Phase::Verifying { abort } => abort.store(true, Ordering::Release),
        }
        if matches!(record.phase, Phase::Verifying { .. }) {
            self.draining.insert(
                id,
                Draining {
                    filename: record.filename().to_string(),
                    had_installed: record.had_installed,
                    restart: None,
                },
            );
        }
        let temp_path = record.temp_path.clone();
        let (retired, cleanup) = record.retire();
        let model = retired.model;
        tracing::info!(model = %model, transfer = %id, "download cancelled");
        self.outcomes.insert(model.clone(), DownloadState::Cancelled);
        self.notify(Notification::Cancelled { model });
        cleanup.map_err(DownloadError::storage(&temp_path))
    }

    /// Delete the installed artifact for `model_id`. A missing file is not an error.
    pub fn remove_model(&mut self, model_id: &str) -> Result<(), DownloadError> {
        let entry = self.lookup(model_id)?;
        let final_path = self.settings.models_dir.join(&entry.filename);
        storage::remove_if_exists(&final_path).map_err(DownloadError::storage(&final_path))?;
        self.outcomes.remove(model_id);
        tracing::info!(model = model_id, path = %final_path.display(), "model removed");
        Ok(())
    }

    /// True if this application version has not been started before. Read-only.
    pub fn is_first_start(&self) -> bool {
        self.settings
            .app_state
            .is_first_start(&self.settings.app_version.to_string())
    }

    /// Fetch the release manifest. The cache is updated when the transfer finishes;
    /// a fetch already in flight makes this a no-op.
    pub fn update_release_notes(&mut self) -> Result<(), DownloadError> {
        if self.manifest.is_some() {
            return Ok(());
        }
        let id = self.allocate_id();
        self.transport.start(TransferRequest {
            id,
            url: self.settings.manifest_url.clone(),
            headers: Vec::new(),
        })?;
        self.manifest = Some(ManifestFetch {
            id,
            body: Vec::new(),
        });
        tracing::debug!(transfer = %id, url = %self.settings.manifest_url, "fetching release manifest");
        Ok(())
    }

    pub fn release_info(&self) -> Option<ReleaseInfo> {
        self.release_info.borrow().clone()
    }

    pub fn has_newer_release(&self) -> bool {
        *self.newer_release.borrow()
    }

    pub fn watch_release_info(&self) -> watch::Receiver<Option<ReleaseInfo>> {
        self.release_info.subscribe()
    }

    pub fn watch_has_newer_release(&self) -> watch::Receiver<bool> {
        self.newer_release.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn settings(&self) -> &DownloaderSettings {
        &self.settings
    }

    /// Current state of `model_id`.
    pub fn state(&self, model_id: &str) -> DownloadState {
        if let Some(record) = self.active.values().find(|r| r.model == model_id) {
            return record.state();
        }
        if self.pending_for(model_id).is_some() {
            return DownloadState::Downloading;
        }
        self.outcomes
            .get(model_id)
            .copied()
            .unwrap_or(DownloadState::Idle)
    }

    /// Cancel every active download. Used on shutdown.
    pub fn cancel_all(&mut self) {
        let models: Vec<String> = self
            .active
            .values()
            .map(|r| r.model.clone())
            .chain(
                self.draining
                    .values()
                    .filter_map(|d| d.restart.as_ref().map(|p| p.model.clone())),
            )
            .collect();
        for model in models {
            if let Err(e) = self.cancel_download(&model) {
                tracing::warn!(model = %model, "cancel on shutdown: {}", e);
            }
        }
    }

    pub(crate) fn notification_sender(&self) -> broadcast::Sender<Notification> {
        self.notifications.clone()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Failures recorded for `filename` by the retry tracker.
    pub fn retry_attempts(&self, filename: &str) -> u32 {
        self.retries.failures(filename)
    }

    pub fn has_retry(&self, filename: &str) -> bool {
        self.retries.has_retry(filename)
    }

    fn start(
        &mut self,
        model_id: &str,
        credential: Option<String>,
    ) -> Result<StartOutcome, DownloadError> {
        let entry = self.lookup(model_id)?;
        if self.active.values().any(|r| r.filename() == entry.filename) {
            tracing::debug!(model = model_id, "download already in progress");
            return Ok(StartOutcome::AlreadyActive);
        }
        // The worker still holds the `.part` of a cancelled verification:
        // queue the start until its outcome arrives.
        if let Some(drain) = self
            .draining
            .values_mut()
            .find(|d| d.filename == entry.filename)
        {
            if drain.restart.is_some() {
                tracing::debug!(model = model_id, "download already queued");
                return Ok(StartOutcome::AlreadyActive);
            }
            tracing::debug!(model = model_id, "queued behind a cancelled verification");
            drain.restart = Some(PendingStart {
                model: model_id.to_string(),
                entry,
                credential,
            });
            return Ok(StartOutcome::Started);
        }
        self.begin_attempt(model_id.to_string(), entry, credential, 1)?;
        Ok(StartOutcome::Started)
    }

    /// Drop a queued start for `model_id`. Returns false if none was queued.
    fn cancel_pending(&mut self, model_id: &str) -> bool {
        let Some(drain) = self.draining.values_mut().find(|d| {
            d.restart
                .as_ref()
                .is_some_and(|p| p.model == model_id)
        }) else {
            return false;
        };
        drain.restart = None;
        tracing::info!(model = model_id, "queued download cancelled");
        self.outcomes
            .insert(model_id.to_string(), DownloadState::Cancelled);
        self.notify(Notification::Cancelled {
            model: model_id.to_string(),
        });
        true
    }

    fn pending_for(&self, model_id: &str) -> Option<&PendingStart> {
        self.draining
            .values()
            .filter_map(|d| d.restart.as_ref())
            .find(|p| p.model == model_id)
    }

    /// Create/truncate the `.part` file, start the transfer and register the record.
    fn begin_attempt(
        &mut self,
        model: String,
        entry: CatalogEntry,
        credential: Option<String>,
        attempt: u32,
    ) -> Result<TransferId, DownloadError> {
        let url = self.artifact_url(&model, &entry)?;
        let dir = self.settings.models_dir.clone();
        storage::ensure_dir(&dir).map_err(DownloadError::storage(&dir))?;
        let final_path = dir.join(&entry.filename);
        let had_installed = final_path.is_file();
        let temp_path = storage::temp_path(&final_path);
        let temp = TempFile::create(&temp_path).map_err(DownloadError::storage(&temp_path))?;

        let id = self.allocate_id();
        let mut headers = Vec::new();
        if let Some(token) = &credential {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }
        let request = TransferRequest {
            id,
            url: url.to_string(),
            headers,
        };
        if let Err(e) = self.transport.start(request) {
            if let Err(cleanup) = temp.discard() {
                tracing::warn!(path = %temp_path.display(), "could not delete temp file: {}", cleanup);
            }
            return Err(e.into());
        }

        tracing::info!(model = %model, transfer = %id, attempt, %url, "download started");
        self.notify(Notification::Started {
            model: model.clone(),
            filename: entry.filename.clone(),
            attempt,
        });
        self.active.insert(
            id,
            ActiveDownload {
                model,
                entry,
                credential,
                final_path,
                temp_path,
                attempt,
                started_at: Instant::now(),
                received: 0,
                total: None,
                had_installed,
                phase: Phase::Downloading(temp),
            },
        );
        Ok(id)
    }

    fn lookup(&self, model_id: &str) -> Result<CatalogEntry, DownloadError> {
        let entry = self
            .catalog
            .lookup(model_id)
            .ok_or_else(|| DownloadError::UnknownModel(model_id.to_string()))?;
        if !is_plain_filename(&entry.filename) {
            return Err(DownloadError::InvalidFilename(entry.filename));
        }
        Ok(entry)
    }

    fn artifact_url(&self, model: &str, entry: &CatalogEntry) -> Result<Url, DownloadError> {
        let parsed = match &entry.url {
            Some(url) => Url::parse(url),
            None => self.settings.base_url.join(&entry.filename),
        };
        parsed.map_err(|source| DownloadError::InvalidUrl {
            model: model.to_string(),
            source,
        })
    }

    fn find_by_model(&self, model_id: &str) -> Option<TransferId> {
        self.active
            .iter()
            .find(|(_, r)| r.model == model_id)
            .map(|(id, _)| *id)
    }

    fn allocate_id(&mut self) -> TransferId {
        let id = TransferId(self.next_id);
        self.next_id += 1;
        id
    }

    fn notify(&self, n: Notification) {
        // No subscribers is fine.
        let _ = self.notifications.send(n);
    }
}

/// A single normal path component: no separators, no `..`, not empty.
fn is_plain_filename(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains('/')
        && !name.contains('\\')
}
