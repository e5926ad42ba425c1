pub mod app_state;
pub mod catalog;
pub mod checksum;
pub mod config;
pub mod download;
pub mod event;
pub mod hasher;
pub mod logging;
pub mod release;
pub mod retry;
pub mod service;
pub mod storage;
pub mod transport;

pub use download::{
    DownloadError, DownloadState, Downloader, DownloaderSettings, FailureKind, Notification,
    StartOutcome,
};
pub use service::DownloaderHandle;
