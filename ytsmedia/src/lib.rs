//! # ytsmedia
//!
//! External collaborators of the YTStreamer pipeline:
//!
//! - [`Fetcher`] / [`YtDlpFetcher`] : metadata resolution and download through `yt-dlp`
//! - [`Transcoder`] / [`FfmpegTranscoder`] : MP3 conversion with tags and cover through `ffmpeg`
//! - [`ProcessRunner`] : cancellable subprocess execution with line callbacks
//! - [`AddressProvider`] / [`LanAddressProvider`] : LAN address for the shareable stream URL
//!
//! The traits are the seams the orchestrator depends on; tests substitute
//! in-memory fakes for them.

mod collaborators;
pub mod config_ext;
mod error;
mod ffmpeg;
mod network;
mod process;
mod ytdlp;

pub use collaborators::{
    is_collection_reference, stream_url, AddressProvider, ConvertRequest, Fetcher, MediaMetadata,
    ProgressFn, Transcoder,
};
pub use config_ext::MediaConfigExt;
pub use error::{MediaError, Result};
pub use ffmpeg::{parse_encoded_time, FfmpegTranscoder};
pub use network::{FixedAddress, LanAddressProvider};
pub use process::{ProcessOutput, ProcessRunner};
pub use ytdlp::{parse_collection, parse_download_progress, parse_metadata, YtDlpFetcher};
