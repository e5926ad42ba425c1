//! Async front end: one tokio task owns the `Downloader` and serializes
//! commands from handles with events from transfers and the hash worker.

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::app_state::AppState;
use crate::download::{DownloadError, DownloadState, Downloader, Notification, StartOutcome};
use crate::event::EventReceiver;
use crate::release::ReleaseInfo;

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Download {
        model: String,
        reply: Reply<Result<StartOutcome, DownloadError>>,
    },
    Install {
        model: String,
        credential: String,
        reply: Reply<Result<StartOutcome, DownloadError>>,
    },
    Cancel {
        model: String,
        reply: Reply<Result<(), DownloadError>>,
    },
    Remove {
        model: String,
        reply: Reply<Result<(), DownloadError>>,
    },
    UpdateReleaseNotes {
        reply: Reply<Result<(), DownloadError>>,
    },
    State {
        model: String,
        reply: Reply<DownloadState>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Cloneable handle to a running downloader task.
#[derive(Clone)]
pub struct DownloaderHandle {
    commands: mpsc::UnboundedSender<Command>,
    notifications: broadcast::Sender<Notification>,
    release_info: watch::Receiver<Option<ReleaseInfo>>,
    newer_release: watch::Receiver<bool>,
    app_state: AppState,
    app_version: String,
}

/// Move `downloader` onto a tokio task fed by `events` (the receiving end of
/// the channel its transport and hash worker post to).
pub fn spawn(downloader: Downloader, events: EventReceiver) -> (DownloaderHandle, JoinHandle<()>) {
    let (commands, command_rx) = mpsc::unbounded_channel();
    let handle = DownloaderHandle {
        commands,
        notifications: downloader.notification_sender(),
        release_info: downloader.watch_release_info(),
        newer_release: downloader.watch_has_newer_release(),
        app_state: downloader.settings().app_state.clone(),
        app_version: downloader.settings().app_version.to_string(),
    };
    let task = tokio::spawn(run(downloader, command_rx, events));
    (handle, task)
}

async fn run(
    mut downloader: Downloader,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut events: EventReceiver,
) {
    tracing::debug!("downloader service started");
    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(cmd) => {
                    if !apply(&mut downloader, cmd) {
                        break;
                    }
                }
                None => {
                    downloader.cancel_all();
                    break;
                }
            },
            ev = events.recv() => match ev {
                Some(ev) => downloader.handle_event(ev),
                None => break,
            },
        }
    }
    // Unblock producers before dropping the downloader joins the hash worker.
    drop(events);
    drop(downloader);
    tracing::debug!("downloader service stopped");
}

/// Returns false once the task should stop.
fn apply(downloader: &mut Downloader, cmd: Command) -> bool {
    // A dropped reply receiver means the caller stopped waiting.
    match cmd {
        Command::Download { model, reply } => {
            let _ = reply.send(downloader.download_model(&model));
        }
        Command::Install {
            model,
            credential,
            reply,
        } => {
            let _ = reply.send(downloader.install_model(&model, &credential));
        }
        Command::Cancel { model, reply } => {
            let _ = reply.send(downloader.cancel_download(&model));
        }
        Command::Remove { model, reply } => {
            let _ = reply.send(downloader.remove_model(&model));
        }
        Command::UpdateReleaseNotes { reply } => {
            let _ = reply.send(downloader.update_release_notes());
        }
        Command::State { model, reply } => {
            let _ = reply.send(downloader.state(&model));
        }
        Command::Shutdown { reply } => {
            downloader.cancel_all();
            let _ = reply.send(());
            return false;
        }
    }
    true
}

impl DownloaderHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, DownloadError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| DownloadError::ServiceStopped)?;
        rx.await.map_err(|_| DownloadError::ServiceStopped)
    }

    pub async fn download_model(&self, model: &str) -> Result<StartOutcome, DownloadError> {
        let model = model.to_string();
        self.request(|reply| Command::Download { model, reply }).await?
    }

    pub async fn install_model(
        &self,
        model: &str,
        credential: &str,
    ) -> Result<StartOutcome, DownloadError> {
        let model = model.to_string();
        let credential = credential.to_string();
        self.request(|reply| Command::Install {
            model,
            credential,
            reply,
        })
        .await?
    }

    pub async fn cancel_download(&self, model: &str) -> Result<(), DownloadError> {
        let model = model.to_string();
        self.request(|reply| Command::Cancel { model, reply }).await?
    }

    pub async fn remove_model(&self, model: &str) -> Result<(), DownloadError> {
        let model = model.to_string();
        self.request(|reply| Command::Remove { model, reply }).await?
    }

    pub async fn update_release_notes(&self) -> Result<(), DownloadError> {
        self.request(|reply| Command::UpdateReleaseNotes { reply })
            .await?
    }

    pub async fn state(&self, model: &str) -> Result<DownloadState, DownloadError> {
        let model = model.to_string();
        self.request(|reply| Command::State { model, reply }).await
    }

    /// Cancel active downloads and stop the task.
    pub async fn shutdown(&self) -> Result<(), DownloadError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn release_info(&self) -> Option<ReleaseInfo> {
        self.release_info.borrow().clone()
    }

    pub fn has_newer_release(&self) -> bool {
        *self.newer_release.borrow()
    }

    pub fn watch_release_info(&self) -> watch::Receiver<Option<ReleaseInfo>> {
        self.release_info.clone()
    }

    pub fn watch_has_newer_release(&self) -> watch::Receiver<bool> {
        self.newer_release.clone()
    }

    pub fn is_first_start(&self) -> bool {
        self.app_state.is_first_start(&self.app_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, StaticCatalog};
    use crate::checksum::ExpectedDigest;
    use crate::download::DownloaderSettings;
    use crate::event::{self, Event, EventSender};
    use crate::transport::{TransferId, TransferRequest, Transport, TransportError, TransportEvent};
    use semver::Version;
    use url::Url;

    /// Answers every request immediately with `body`.
    struct InstantTransport {
        events: EventSender,
        body: Vec<u8>,
    }

    impl Transport for InstantTransport {
        fn start(&mut self, request: TransferRequest) -> Result<(), TransportError> {
            let id = request.id;
            // Called on the service task, so no blocking send.
            self.events
                .try_send(Event::Transport(TransportEvent::Data {
                    id,
                    chunk: self.body.clone(),
                }))
                .unwrap();
            self.events
                .try_send(Event::Transport(TransportEvent::Finished { id }))
                .unwrap();
            Ok(())
        }

        fn abort(&mut self, _id: TransferId) {}
    }

    fn start_service(dir: &std::path::Path, body: &[u8]) -> (DownloaderHandle, JoinHandle<()>) {
        let catalog: StaticCatalog = vec![CatalogEntry::new(
            "tiny",
            "tiny.bin",
            // md5("hello\n")
            ExpectedDigest::md5("b1946ac92492d2347c6235b4d2611184"),
        )]
        .into_iter()
        .collect();
        let settings = DownloaderSettings {
            models_dir: dir.join("models"),
            base_url: Url::parse("http://mirror.test/").unwrap(),
            manifest_url: "http://mirror.test/release.json".to_string(),
            max_attempts: 2,
            app_version: Version::new(0, 1, 0),
            app_state: AppState::at(dir.join("last_version")),
        };
        let (tx, rx) = event::channel();
        let transport = InstantTransport {
            events: tx.clone(),
            body: body.to_vec(),
        };
        let downloader =
            Downloader::new(settings, Box::new(transport), Box::new(catalog), tx).unwrap();
        spawn(downloader, rx)
    }

    async fn wait_terminal(rx: &mut broadcast::Receiver<Notification>) -> Notification {
        loop {
            let n = rx.recv().await.unwrap();
            if n.is_terminal() {
                return n;
            }
        }
    }

    #[tokio::test]
    async fn downloads_through_the_service_task() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, task) = start_service(dir.path(), b"hello\n");
        let mut notes = handle.subscribe();

        assert_eq!(
            handle.download_model("tiny").await.unwrap(),
            StartOutcome::Started
        );
        match wait_terminal(&mut notes).await {
            Notification::Installed { path, .. } => {
                assert_eq!(std::fs::read(path).unwrap(), b"hello\n");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(handle.state("tiny").await.unwrap(), DownloadState::Installed);
        assert!(handle.is_first_start());

        handle.remove_model("tiny").await.unwrap();
        assert!(!dir.path().join("models").join("tiny.bin").exists());

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(matches!(
            handle.download_model("tiny").await,
            Err(DownloadError::ServiceStopped)
        ));
    }

    #[tokio::test]
    async fn corrupt_body_exhausts_retries() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, task) = start_service(dir.path(), b"not hello\n");
        let mut notes = handle.subscribe();

        handle.download_model("tiny").await.unwrap();
        match wait_terminal(&mut notes).await {
            Notification::Failed { kind, .. } => {
                assert_eq!(kind, crate::download::FailureKind::RetriesExhausted)
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            handle.state("tiny").await.unwrap(),
            DownloadState::FailedTerminal
        );
        assert!(!dir.path().join("models").join("tiny.bin.part").exists());

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_model_error_reaches_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, task) = start_service(dir.path(), b"hello\n");
        assert!(matches!(
            handle.download_model("huge").await,
            Err(DownloadError::UnknownModel(_))
        ));
        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
