//! # ytsqueue
//!
//! Ordered playback queue for YTStreamer.
//!
//! - [`Item`]: one playable unit with its metadata, local artifact and
//!   lifecycle [`ItemStatus`]
//! - [`Queue`]: insertion-ordered items plus a cursor, with `next`/`previous`
//!   navigation and id-based `update`/`remove`
//!
//! The crate is pure data: no I/O, no locking. The orchestrator owns the
//! queue and is the only writer.

mod item;
mod queue;

pub use item::{extract_media_id, Item, ItemStatus, PENDING_TITLE, UNKNOWN_MEDIA_ID};
pub use queue::{Queue, QueueSnapshot};
