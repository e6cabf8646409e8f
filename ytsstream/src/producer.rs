//! Broadcast producer: reads one converted file and feeds it to the hub.

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use ytsserver::HubHandle;

use crate::{error::Result, settings::StreamSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerOutcome {
    /// File fully broadcast and buffer window elapsed
    Completed,
    Cancelled,
}

pub(crate) struct Producer {
    pub hub: HubHandle,
    pub generation: u64,
    pub path: PathBuf,
    pub settings: StreamSettings,
    pub cancel: CancellationToken,
}

impl Producer {
    /// Streams the file in fixed-size chunks.
    ///
    /// The cancellation token is checked before every chunk and during every
    /// wait, so a skip or stop takes effect within one chunk interval.
    pub async fn run(self) -> Result<ProducerOutcome> {
        let chunk_size = self.settings.chunk_size.max(1);
        let mut file = tokio::fs::File::open(&self.path).await?;
        let mut buf = vec![0u8; chunk_size];
        let started = Instant::now();
        let mut sent: u64 = 0;
        let mut chunks: u64 = 0;

        loop {
            if self.cancel.is_cancelled() {
                debug!(chunks, "Producer cancelled");
                return Ok(ProducerOutcome::Cancelled);
            }

            let n = read_chunk(&mut file, &mut buf).await?;
            if n == 0 {
                break;
            }

            let reached = self
                .hub
                .broadcast_for(self.generation, Bytes::copy_from_slice(&buf[..n]))
                .await?;
            sent += n as u64;
            chunks += 1;
            trace!(chunk = chunks, bytes = n, listeners = reached, "Chunk broadcast");

            let delay = self.settings.pacing_delay(sent, started.elapsed());
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(chunks, "Producer cancelled");
                    return Ok(ProducerOutcome::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!(chunks, bytes = sent, path = %self.path.display(), "File fully broadcast");

        tokio::select! {
            _ = self.cancel.cancelled() => Ok(ProducerOutcome::Cancelled),
            _ = tokio::time::sleep(self.settings.buffer_window) => Ok(ProducerOutcome::Completed),
        }
    }
}

/// Fills `buf` as far as possible; returns fewer bytes only at end of file.
async fn read_chunk(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Wait before the next chunk.
pub(crate) fn pacing_delay(
    chunk_interval: Duration,
    realtime: Option<(u32, Duration)>,
    sent_bytes: u64,
    elapsed: Duration,
) -> Duration {
    let Some((bitrate, preroll)) = realtime.filter(|(b, _)| *b > 0) else {
        return chunk_interval;
    };
    let due = Duration::from_secs_f64(sent_bytes as f64 * 8.0 / f64::from(bitrate));
    let ahead = due.saturating_sub(elapsed).saturating_sub(preroll);
    ahead.max(chunk_interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ytsserver::{spawn_hub, SessionMetadata};

    const INTERVAL: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_cancel_stops_within_one_chunk_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.mp3");
        std::fs::write(&path, vec![b'A'; 16 * 50]).unwrap();

        let (hub, _hub_task) = spawn_hub(64);
        let generation = hub
            .update_session(SessionMetadata::default(), None)
            .await
            .unwrap();
        let mut listener = hub.join(generation).await.unwrap();

        let chunk_interval = Duration::from_millis(200);
        let cancel = CancellationToken::new();
        let producer = Producer {
            hub: hub.clone(),
            generation,
            path,
            settings: StreamSettings {
                chunk_size: 16,
                chunk_interval,
                buffer_window: Duration::from_secs(5),
                pace_bitrate: None,
                ..Default::default()
            },
            cancel: cancel.clone(),
        };
        let running = tokio::spawn(producer.run());

        let first = tokio::time::timeout(Duration::from_secs(5), listener.rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.len(), 16);

        let cancelled_at = Instant::now();
        cancel.cancel();
        let outcome = tokio::time::timeout(chunk_interval, running)
            .await
            .expect("producer outlived one chunk interval")
            .unwrap()
            .unwrap();
        assert_eq!(outcome, ProducerOutcome::Cancelled);
        assert!(cancelled_at.elapsed() < chunk_interval);

        // nothing follows the cancellation
        tokio::time::sleep(chunk_interval).await;
        assert!(listener.rx.try_recv().is_err());
    }

    #[test]
    fn test_fixed_interval_without_pacing() {
        assert_eq!(pacing_delay(INTERVAL, None, 1 << 20, Duration::ZERO), INTERVAL);
    }

    #[test]
    fn test_preroll_is_sent_at_interval() {
        // 128 kbit/s: 16 KB per second; 64 KB is 4 s of audio, within a 5 s preroll
        let realtime = Some((128_000, Duration::from_secs(5)));
        assert_eq!(
            pacing_delay(INTERVAL, realtime, 64_000, Duration::ZERO),
            INTERVAL
        );
    }

    #[test]
    fn test_pacing_waits_once_ahead_of_preroll() {
        let realtime = Some((128_000, Duration::from_secs(5)));
        // 160 KB is 10 s of audio; after 1 s we are 9 s ahead, 4 s past the preroll
        let delay = pacing_delay(INTERVAL, realtime, 160_000, Duration::from_secs(1));
        assert_eq!(delay, Duration::from_secs(4));
    }
}
