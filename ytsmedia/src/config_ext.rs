//! External tool settings read from `ytsconfig::Config`

use std::path::PathBuf;

use anyhow::Result;
use ytsconfig::Config;

use crate::{FfmpegTranscoder, YtDlpFetcher};

const DEFAULT_YTDLP: &str = "yt-dlp";
const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_EXTRACTOR_ARGS: &str = "youtube:player_client=ios";
const DEFAULT_WORK_DIR: &str = "work";
const DEFAULT_BITRATE: &str = "128k";
const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Extension trait for the external tool settings
pub trait MediaConfigExt {
    fn get_ytdlp_program(&self) -> String;
    fn get_ffmpeg_program(&self) -> String;
    fn get_extractor_args(&self) -> String;

    /// Working directory for downloads and conversions (created if missing)
    fn get_work_dir(&self) -> Result<PathBuf>;

    fn get_bitrate(&self) -> String;
    fn get_sample_rate(&self) -> u32;

    fn ytdlp_fetcher(&self) -> Result<YtDlpFetcher>;
    fn ffmpeg_transcoder(&self) -> Result<FfmpegTranscoder>;
}

impl MediaConfigExt for Config {
    fn get_ytdlp_program(&self) -> String {
        self.get_string_or(&["tools", "ytdlp"], DEFAULT_YTDLP)
    }

    fn get_ffmpeg_program(&self) -> String {
        self.get_string_or(&["tools", "ffmpeg"], DEFAULT_FFMPEG)
    }

    fn get_extractor_args(&self) -> String {
        // an explicitly empty value disables the option
        match self.get_value(&["tools", "extractor_args"]) {
            Ok(serde_yaml::Value::String(s)) => s,
            Ok(serde_yaml::Value::Null) => String::new(),
            _ => DEFAULT_EXTRACTOR_ARGS.to_string(),
        }
    }

    fn get_work_dir(&self) -> Result<PathBuf> {
        self.get_managed_dir(&["media", "work_dir"], DEFAULT_WORK_DIR)
    }

    fn get_bitrate(&self) -> String {
        self.get_string_or(&["media", "bitrate"], DEFAULT_BITRATE)
    }

    fn get_sample_rate(&self) -> u32 {
        let raw = self.get_u64_or(&["media", "sample_rate"], u64::from(DEFAULT_SAMPLE_RATE));
        u32::try_from(raw).unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    fn ytdlp_fetcher(&self) -> Result<YtDlpFetcher> {
        Ok(YtDlpFetcher::new(self.get_ytdlp_program(), self.get_work_dir()?)
            .with_extractor_args(self.get_extractor_args()))
    }

    fn ffmpeg_transcoder(&self) -> Result<FfmpegTranscoder> {
        Ok(FfmpegTranscoder::new(self.get_ffmpeg_program(), self.get_work_dir()?)
            .with_bitrate(self.get_bitrate())
            .with_sample_rate(self.get_sample_rate()))
    }
}
