use rusqlite::Error as RusqliteError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WaxPulseError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Database error: {0}")]
    Database(#[from] RusqliteError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Discogs API error: {status}: {body}")]
    Remote { status: String, body: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task was cancelled before completion")]
    TaskCancelled,

    #[error("Error: {0}")]
    Error(String),
}

impl WaxPulseError {
    /// Transient failures are worth retrying; everything else is terminal.
    /// Rate limiting (429) and server-side errors come back as `Remote`
    /// with the status text; transport-level failures come back as `Http`.
    pub fn is_retryable(&self) -> bool {
        match self {
            WaxPulseError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            WaxPulseError::Remote { status, .. } => {
                status.starts_with("429") || status.starts_with('5')
            }
            _ => false,
        }
    }
}
