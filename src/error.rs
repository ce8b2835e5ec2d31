use thiserror::Error;

/// Everything that can go wrong between startup and a delivered download event.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication with the analytics collector failed: {0}")]
    Authentication(String),

    #[error("analytics collector unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("download path '{path}' does not contain dataset and resource ids")]
    MalformedPath { path: String },

    #[error("analytics collector rejected the event with status {status}")]
    Rejected { status: u16 },
}

pub type TrackerResult<T> = Result<T, TrackerError>;
