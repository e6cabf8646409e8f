use thiserror::Error;

/// Broadcast server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("unable to bind port {port} after {attempts} attempts: {last_error}")]
    BindFailed {
        port: u16,
        attempts: u16,
        last_error: String,
    },

    #[error("broadcast server is not running")]
    NotRunning,

    #[error("stream hub has shut down")]
    HubClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
