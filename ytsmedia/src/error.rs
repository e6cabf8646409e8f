use thiserror::Error;

/// Errors of the external collaborators (fetch, conversion)
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("metadata fetch failed: {0}")]
    MetadataFetchFailed(String),

    #[error("collection fetch failed: {0}")]
    CollectionFetchFailed(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("conversion failed: {0}")]
    ConversionFailed(String),

    #[error("cannot parse tool output: {0}")]
    ParseFailed(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("cannot launch {tool}: {source}")]
    ToolLaunch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MediaError>;
