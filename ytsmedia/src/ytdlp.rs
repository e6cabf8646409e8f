//! [`Fetcher`] backed by the `yt-dlp` command line tool.

use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
    time::Duration,
};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    collaborators::{remove_quietly, Fetcher, MediaMetadata, ProgressFn},
    error::{MediaError, Result},
    process::ProcessRunner,
};

/// Prefix of every file downloaded into the work directory.
const DOWNLOAD_PREFIX: &str = "audio_";

#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    runner: ProcessRunner,
    work_dir: PathBuf,
    extractor_args: Option<String>,
}

impl YtDlpFetcher {
    pub fn new(program: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner: ProcessRunner::new(program),
            work_dir: work_dir.into(),
            extractor_args: None,
        }
    }

    /// Extra `--extractor-args` passed to every invocation.
    pub fn with_extractor_args(mut self, args: impl Into<String>) -> Self {
        let args = args.into();
        self.extractor_args = (!args.is_empty()).then_some(args);
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec!["--no-warnings".to_string()];
        if let Some(extra) = &self.extractor_args {
            args.push("--extractor-args".into());
            args.push(extra.clone());
        }
        args
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn fetch_metadata(
        &self,
        source: &str,
        cancel: CancellationToken,
    ) -> Result<MediaMetadata> {
        let mut args = self.base_args();
        args.extend(["--dump-json".into(), "--no-playlist".into(), source.into()]);

        let output = self.runner.run(&args, &|_| {}, &cancel).await?;
        if !output.status.success() {
            return Err(MediaError::MetadataFetchFailed(output.error_detail()));
        }

        let line = output
            .stdout
            .iter()
            .find(|l| l.trim_start().starts_with('{'))
            .ok_or_else(|| MediaError::MetadataFetchFailed("no JSON document in output".into()))?;
        let json: Value =
            serde_json::from_str(line).map_err(|e| MediaError::ParseFailed(e.to_string()))?;

        let metadata = parse_metadata(&json, source)?;
        info!(title = %metadata.title, source, "Metadata resolved");
        Ok(metadata)
    }

    async fn fetch_collection_metadata(
        &self,
        source: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<MediaMetadata>> {
        let mut args = self.base_args();
        args.extend([
            "--flat-playlist".into(),
            "--dump-json".into(),
            source.into(),
        ]);

        let output = self.runner.run(&args, &|_| {}, &cancel).await?;

        let entries = parse_collection(&output.stdout);
        if entries.is_empty() {
            let detail = if output.status.success() {
                "collection has no entries".to_string()
            } else {
                output.error_detail()
            };
            return Err(MediaError::CollectionFetchFailed(detail));
        }
        if !output.status.success() {
            warn!(source, entries = entries.len(), "yt-dlp reported errors, keeping parsed entries");
        }

        info!(source, entries = entries.len(), "Collection resolved");
        Ok(entries)
    }

    async fn download(
        &self,
        source: &str,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.work_dir).await?;

        let stem = format!("{DOWNLOAD_PREFIX}{}", Uuid::new_v4().simple());
        let template = self.work_dir.join(format!("{stem}.%(ext)s"));

        let mut args = self.base_args();
        args.extend([
            "-f".into(),
            "bestaudio".into(),
            "--no-playlist".into(),
            "--newline".into(),
            "-o".into(),
            template.to_string_lossy().into_owned(),
            source.into(),
        ]);

        let on_line = move |line: &str| {
            if let Some(pct) = parse_download_progress(line) {
                progress(pct);
            }
        };

        let output = match self.runner.run(&args, &on_line, &cancel).await {
            Ok(output) => output,
            Err(e) => {
                self.cleanup(&stem).await;
                return Err(match e {
                    e @ (MediaError::Cancelled | MediaError::ToolLaunch { .. }) => e,
                    other => MediaError::DownloadFailed(other.to_string()),
                });
            }
        };

        if !output.status.success() {
            self.cleanup(&stem).await;
            return Err(MediaError::DownloadFailed(output.error_detail()));
        }

        let path = find_download(&self.work_dir, &stem)
            .await?
            .ok_or_else(|| MediaError::DownloadFailed("downloaded file not found".into()))?;
        debug!(path = %path.display(), "Download complete");
        Ok(path)
    }
}

impl YtDlpFetcher {
    async fn cleanup(&self, stem: &str) {
        let Ok(mut dir) = tokio::fs::read_dir(&self.work_dir).await else {
            return;
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with(stem) {
                remove_quietly(&entry.path()).await;
            }
        }
    }
}

/// Finds the completed file named `<stem>.<ext>` in `dir`.
async fn find_download(dir: &Path, stem: &str) -> Result<Option<PathBuf>> {
    let prefix = format!("{stem}.");
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(&prefix) && !name.ends_with(".part") && !name.ends_with(".ytdl") {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

fn progress_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%").ok())
        .as_ref()
}

/// Extracts the percentage from a `[download]  42.3% of ...` line.
pub fn parse_download_progress(line: &str) -> Option<f64> {
    progress_regex()?
        .captures(line)?
        .get(1)?
        .as_str()
        .parse::<f64>()
        .ok()
        .map(|p| p.clamp(0.0, 100.0))
}

fn non_empty_str(json: &Value, key: &str) -> Option<String> {
    json.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Builds [`MediaMetadata`] from one yt-dlp JSON document.
pub fn parse_metadata(json: &Value, fallback_url: &str) -> Result<MediaMetadata> {
    let title = non_empty_str(json, "title")
        .ok_or_else(|| MediaError::ParseFailed("missing title".into()))?;

    let artist = ["uploader", "channel", "artist"]
        .iter()
        .find_map(|k| non_empty_str(json, k));

    let thumbnail = non_empty_str(json, "thumbnail").or_else(|| {
        json.get("thumbnails")
            .and_then(Value::as_array)
            .and_then(|thumbs| thumbs.iter().rev().find_map(|t| non_empty_str(t, "url")))
    });

    let duration = json
        .get("duration")
        .and_then(Value::as_f64)
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(Duration::from_secs_f64);

    let canonical_url = non_empty_str(json, "webpage_url")
        .or_else(|| non_empty_str(json, "url").filter(|u| u.starts_with("http")))
        .or_else(|| non_empty_str(json, "id").map(|id| format!("https://www.youtube.com/watch?v={id}")))
        .unwrap_or_else(|| fallback_url.to_string());

    Ok(MediaMetadata {
        title,
        artist,
        thumbnail,
        duration,
        canonical_url,
    })
}

/// Parses `--flat-playlist --dump-json` output: one JSON document per line.
///
/// Entries without a usable URL are skipped; untitled ones fall back to their id.
pub fn parse_collection(lines: &[String]) -> Vec<MediaMetadata> {
    lines
        .iter()
        .filter(|l| l.trim_start().starts_with('{'))
        .filter_map(|l| serde_json::from_str::<Value>(l).ok())
        .filter_map(|mut json| {
            if non_empty_str(&json, "title").is_none() {
                let id = non_empty_str(&json, "id")?;
                json["title"] = Value::String(id);
            }
            parse_metadata(&json, "").ok()
        })
        .filter(|m| !m.canonical_url.is_empty())
        .collect()
}
