//! # ytsstream
//!
//! The stream orchestrator: drives queued items one at a time through
//! metadata resolution, download, conversion and broadcast.
//!
//! - [`Orchestrator`] : single-owner task holding the [`ytsqueue::Queue`] and
//!   the [`ytsserver::BroadcastServer`]; [`OrchestratorHandle`] sends it
//!   commands and exposes the published [`PipelineStatus`]
//! - the broadcast producer reads the converted MP3 in fixed-size chunks and
//!   feeds the hub, paced and cancellable
//! - [`History`] : JSON play history
//! - [`PipelineConfigExt`] : pipeline settings from `ytsconfig::Config`

pub mod config_ext;
mod error;
mod header;
mod history;
mod orchestrator;
mod producer;
mod settings;
mod status;

pub use config_ext::{parse_bitrate, PipelineConfigExt};
pub use error::{Result, StreamError};
pub use header::{id3_tag_len, read_framing_header};
pub use history::{History, HistoryEntry};
pub use orchestrator::{Collaborators, Orchestrator, OrchestratorHandle};
pub use producer::ProducerOutcome;
pub use settings::StreamSettings;
pub use status::{PipelineState, PipelineStatus};
