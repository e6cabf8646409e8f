//! [`Transcoder`] backed by `ffmpeg`: MP3 output with ID3v2 tags and cover art.

use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
    time::Duration,
};

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    collaborators::{remove_quietly, ConvertRequest, ProgressFn, Transcoder},
    error::{MediaError, Result},
    process::ProcessRunner,
};

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    runner: ProcessRunner,
    work_dir: PathBuf,
    bitrate: String,
    sample_rate: u32,
    http: reqwest::Client,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner: ProcessRunner::new(program),
            work_dir: work_dir.into(),
            bitrate: "128k".to_string(),
            sample_rate: 44_100,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_bitrate(mut self, bitrate: impl Into<String>) -> Self {
        self.bitrate = bitrate.into();
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Fetches the cover into the work dir. Any failure only drops the art.
    async fn fetch_cover(&self, thumbnail: &str, cancel: &CancellationToken) -> Option<PathBuf> {
        let local = Path::new(thumbnail);
        if local.is_file() {
            return Some(local.to_path_buf());
        }
        if !thumbnail.starts_with("http://") && !thumbnail.starts_with("https://") {
            return None;
        }

        let download = async {
            let response = self.http.get(thumbnail).send().await?.error_for_status()?;
            response.bytes().await
        };

        let bytes = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = download => match result {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(url = thumbnail, error = %e, "Cover download failed, converting without art");
                    return None;
                }
            },
        };

        let path = self.work_dir.join(format!("cover_{}.img", Uuid::new_v4().simple()));
        match tokio::fs::write(&path, &bytes).await {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(error = %e, "Cannot store cover");
                None
            }
        }
    }

    fn build_args(&self, request: &ConvertRequest, cover: Option<&Path>, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-y", "-i"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(request.input.to_string_lossy().into_owned());

        if let Some(cover) = cover {
            args.push("-i".into());
            args.push(cover.to_string_lossy().into_owned());
            args.extend(
                [
                    "-map", "0:a", "-map", "1:v", "-c:v", "mjpeg",
                    "-disposition:v", "attached_pic",
                    "-metadata:s:v", "title=Album cover",
                    "-metadata:s:v", "comment=Cover (front)",
                ]
                .iter()
                .map(|s| s.to_string()),
            );
        } else {
            args.push("-vn".into());
        }

        args.extend(["-c:a", "libmp3lame", "-b:a"].iter().map(|s| s.to_string()));
        args.push(self.bitrate.clone());
        args.push("-ar".into());
        args.push(self.sample_rate.to_string());
        args.extend(["-id3v2_version", "3"].iter().map(|s| s.to_string()));

        if let Some(title) = request.title.as_deref().filter(|t| !t.is_empty()) {
            args.push("-metadata".into());
            args.push(format!("title={title}"));
        }
        if let Some(artist) = request.artist.as_deref().filter(|a| !a.is_empty()) {
            args.push("-metadata".into());
            args.push(format!("artist={artist}"));
        }

        args.extend(["-progress", "pipe:1", "-nostats"].iter().map(|s| s.to_string()));
        args.push(output.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(
        &self,
        request: ConvertRequest,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.work_dir).await?;

        let output = self
            .work_dir
            .join(format!("track_{}.mp3", Uuid::new_v4().simple()));

        let cover = match request.thumbnail.as_deref() {
            Some(thumb) if !thumb.is_empty() => self.fetch_cover(thumb, &cancel).await,
            _ => None,
        };
        // only covers we downloaded ourselves are removed afterwards
        let owned_cover = cover
            .as_ref()
            .filter(|c| c.starts_with(&self.work_dir))
            .cloned();

        let args = self.build_args(&request, cover.as_deref(), &output);
        let duration = request.duration;
        let on_line = move |line: &str| {
            if let (Some(total), Some(done)) = (duration, parse_encoded_time(line)) {
                if !total.is_zero() {
                    progress((done.as_secs_f64() / total.as_secs_f64() * 100.0).clamp(0.0, 100.0));
                }
            }
        };

        let result = self.runner.run(&args, &on_line, &cancel).await;
        if let Some(cover) = &owned_cover {
            remove_quietly(cover).await;
        }

        let run = match result {
            Ok(run) => run,
            Err(e) => {
                remove_quietly(&output).await;
                return Err(match e {
                    e @ (MediaError::Cancelled | MediaError::ToolLaunch { .. }) => e,
                    other => MediaError::ConversionFailed(other.to_string()),
                });
            }
        };

        if !run.status.success() {
            remove_quietly(&output).await;
            return Err(MediaError::ConversionFailed(run.error_detail()));
        }

        remove_quietly(&request.input).await;
        debug!(input = %request.input.display(), "Removed source file");
        info!(output = %output.display(), "Conversion complete");
        Ok(output)
    }
}

fn time_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"time=(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").ok())
        .as_ref()
}

/// Parses the encoded position from `time=HH:MM:SS.xx` (or `out_time=`) lines.
pub fn parse_encoded_time(line: &str) -> Option<Duration> {
    let caps = time_regex()?.captures(line)?;
    let hours: u64 = caps.get(1)?.as_str().parse().ok()?;
    let minutes: u64 = caps.get(2)?.as_str().parse().ok()?;
    let seconds: f64 = caps.get(3)?.as_str().parse().ok()?;
    Some(Duration::from_secs(hours * 3600 + minutes * 60) + Duration::from_secs_f64(seconds))
}
