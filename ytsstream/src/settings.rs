use std::time::Duration;

use ytsserver::BroadcastOptions;

use crate::producer::pacing_delay;

/// Tuning of the orchestrator and its broadcast producer.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub server: BroadcastOptions,
    /// Bytes read and broadcast per chunk
    pub chunk_size: usize,
    /// Minimum pause between two chunks
    pub chunk_interval: Duration,
    /// Delay after the last chunk before advancing the queue
    pub buffer_window: Duration,
    /// Audio bitrate (bit/s) used to pace chunks at real time; `None` sends
    /// at the fixed chunk interval
    pub pace_bitrate: Option<u32>,
    /// How far ahead of real time the producer may run
    pub preroll: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            server: BroadcastOptions::default(),
            chunk_size: 64 * 1024,
            chunk_interval: Duration::from_millis(10),
            buffer_window: Duration::from_secs(2),
            pace_bitrate: None,
            preroll: Duration::from_secs(5),
        }
    }
}

impl StreamSettings {
    pub(crate) fn pacing_delay(&self, sent_bytes: u64, elapsed: Duration) -> Duration {
        pacing_delay(
            self.chunk_interval,
            self.pace_bitrate.map(|b| (b, self.preroll)),
            sent_bytes,
            elapsed,
        )
    }
}
