//! Pipeline settings read from `ytsconfig::Config`

use std::time::Duration;

use ytsconfig::Config;
use ytsmedia::MediaConfigExt;
use ytsserver::BroadcastConfigExt;

use crate::{History, StreamSettings};

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
const DEFAULT_CHUNK_INTERVAL_MS: u64 = 10;
const DEFAULT_BUFFER_WINDOW_MS: u64 = 2000;
const DEFAULT_PREROLL_SECS: u64 = 5;
const DEFAULT_HISTORY_FILE: &str = "history.json";
const DEFAULT_HISTORY_MAX_ITEMS: usize = 100;

pub trait PipelineConfigExt {
    fn get_chunk_size(&self) -> usize;
    fn get_chunk_interval(&self) -> Duration;
    fn get_buffer_window(&self) -> Duration;

    /// Bitrate used for real-time pacing when `pipeline.realtime_pacing` is on
    fn get_pace_bitrate(&self) -> Option<u32>;
    fn get_preroll(&self) -> Duration;

    fn stream_settings(&self) -> StreamSettings;

    /// Play history, loaded from `history.file` (relative to the config dir)
    fn history(&self) -> History;
}

impl PipelineConfigExt for Config {
    fn get_chunk_size(&self) -> usize {
        self.get_usize_or(&["pipeline", "chunk_size"], DEFAULT_CHUNK_SIZE)
            .max(1)
    }

    fn get_chunk_interval(&self) -> Duration {
        Duration::from_millis(
            self.get_u64_or(&["pipeline", "chunk_interval_ms"], DEFAULT_CHUNK_INTERVAL_MS),
        )
    }

    fn get_buffer_window(&self) -> Duration {
        Duration::from_millis(
            self.get_u64_or(&["pipeline", "buffer_window_ms"], DEFAULT_BUFFER_WINDOW_MS),
        )
    }

    fn get_pace_bitrate(&self) -> Option<u32> {
        if !self.get_bool_or(&["pipeline", "realtime_pacing"], false) {
            return None;
        }
        parse_bitrate(&self.get_bitrate())
    }

    fn get_preroll(&self) -> Duration {
        Duration::from_secs(self.get_u64_or(&["pipeline", "preroll_secs"], DEFAULT_PREROLL_SECS))
    }

    fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            server: self.broadcast_options(),
            chunk_size: self.get_chunk_size(),
            chunk_interval: self.get_chunk_interval(),
            buffer_window: self.get_buffer_window(),
            pace_bitrate: self.get_pace_bitrate(),
            preroll: self.get_preroll(),
        }
    }

    fn history(&self) -> History {
        let file = self.get_string_or(&["history", "file"], DEFAULT_HISTORY_FILE);
        let max_items = self.get_usize_or(&["history", "max_items"], DEFAULT_HISTORY_MAX_ITEMS);
        History::load(self.resolve_path(&file), max_items)
    }
}

/// Parses an ffmpeg-style bitrate (`128k`, `1M`, `96000`) into bit/s.
pub fn parse_bitrate(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    let (digits, factor) = match raw.chars().last()? {
        'k' | 'K' => (&raw[..raw.len() - 1], 1_000),
        'm' | 'M' => (&raw[..raw.len() - 1], 1_000_000),
        _ => (raw, 1),
    };
    let value: u32 = digits.trim().parse().ok()?;
    value.checked_mul(factor).filter(|b| *b > 0)
}
