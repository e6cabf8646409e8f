use serde::Serialize;
use ytsqueue::Item;

/// States of the pipeline state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Idle,
    FetchingMetadata,
    Downloading,
    Converting,
    Serving,
    Error,
}

impl PipelineState {
    pub fn label(self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::FetchingMetadata => "fetching metadata",
            PipelineState::Downloading => "downloading",
            PipelineState::Converting => "converting",
            PipelineState::Serving => "serving",
            PipelineState::Error => "error",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Snapshot published after every transition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStatus {
    pub state: PipelineState,
    /// Item in the pipeline, or the queue's current item when quiescent
    pub current: Option<Item>,
    /// Progress of the running download/conversion, `0.0..=1.0`
    pub progress: f64,
    pub stream_url: Option<String>,
    pub port: Option<u16>,
    /// Last user-visible error message
    pub error: Option<String>,
    pub queue: Vec<Item>,
    pub current_index: Option<usize>,
}

impl PipelineStatus {
    pub fn current_title(&self) -> Option<&str> {
        self.current.as_ref().map(|i| i.title.as_str())
    }
}
