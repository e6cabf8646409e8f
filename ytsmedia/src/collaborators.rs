//! Interfaces of the external collaborators driven by the stream orchestrator.
//!
//! Every long operation takes a [`CancellationToken`]: cancelling it must stop
//! the work promptly (killing any subprocess) and yield
//! [`MediaError::Cancelled`](crate::MediaError::Cancelled).

use std::{
    net::IpAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Progress callback, called with a percentage in `0.0..=100.0`.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Metadata resolved for one source reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: String,
    pub artist: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<Duration>,
    /// Canonical page URL of the item (used to download collection entries)
    pub canonical_url: String,
}

/// Input of a transcoding job.
#[derive(Debug, Clone, Default)]
pub struct ConvertRequest {
    pub input: PathBuf,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub thumbnail: Option<String>,
    /// Known duration, used to turn encoder timestamps into progress
    pub duration: Option<Duration>,
}

/// Retrieves metadata and media from a remote source.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch_metadata(&self, source: &str, cancel: CancellationToken)
        -> Result<MediaMetadata>;

    /// Metadata of every entry of a collection (playlist) reference.
    async fn fetch_collection_metadata(
        &self,
        source: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<MediaMetadata>>;

    /// Downloads the media and returns the local file path.
    async fn download(
        &self,
        source: &str,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<PathBuf>;
}

/// Converts a downloaded file into the broadcast audio format.
#[async_trait]
pub trait Transcoder: Send + Sync + 'static {
    /// Returns the path of the converted file.
    async fn convert(
        &self,
        request: ConvertRequest,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<PathBuf>;
}

/// Source of the LAN address advertised in the stream URL.
pub trait AddressProvider: Send + Sync + 'static {
    fn current_lan_address(&self) -> Option<IpAddr>;
}

/// True when `source` refers to a collection (playlist) rather than one item.
pub fn is_collection_reference(source: &str) -> bool {
    source.contains("list=")
}

/// Human-shareable stream URL.
pub fn stream_url(address: IpAddr, port: u16) -> String {
    match address {
        IpAddr::V4(v4) => format!("http://{v4}:{port}/stream.mp3"),
        IpAddr::V6(v6) => format!("http://[{v6}]:{port}/stream.mp3"),
    }
}

/// Removes a file, ignoring a missing one.
pub(crate) async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), error = %e, "Cannot remove file");
        }
    }
}
