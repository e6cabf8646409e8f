use thiserror::Error;
use ytsmedia::MediaError;
use ytsserver::ServerError;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("orchestrator is not running")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;
