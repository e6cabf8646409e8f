use bytes::Bytes;
use serde::Serialize;

/// Display metadata of the track currently on air.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionMetadata {
    pub title: String,
    pub artist: Option<String>,
    pub thumbnail: Option<String>,
}

/// What is currently playing, as seen by every listener.
///
/// `generation` changes on every session update or clear. Chunks tagged with
/// another generation are dropped, and a listener that read the header of an
/// older generation gets the current one replayed when it joins.
#[derive(Debug, Clone, Default)]
pub struct StreamSession {
    pub metadata: Option<SessionMetadata>,
    pub header: Option<Bytes>,
    pub generation: u64,
}
