//! Error taxonomy shared by every remote-facing component.

use thiserror::Error;

/// Status codes on which an interrupted transfer is worth retrying.
pub const RETRIABLE_STATUS_CODES: [u16; 4] = [500, 502, 503, 504];

#[derive(Error, Debug)]
pub enum CurationError {
    /// Low-level network fault (reset connection, truncated response, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote answered with an error status.
    #[error("YouTube API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The remote answered, but not with the shape we expected.
    #[error("unexpected response from YouTube: {0}")]
    RemoteProtocol(String),

    #[error("video '{title}' has not been uploaded yet")]
    NotUploaded { title: String },

    #[error("video already uploaded with id {id}")]
    AlreadyUploaded { id: String },

    #[error("playlist already exists with id {id}")]
    AlreadyCreated { id: String },

    #[error("playlist '{title}' does not exist remotely yet")]
    NotCreated { title: String },

    #[error("upload failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CurationError>;

impl CurationError {
    /// Only transport faults and the 5xx statuses in
    /// [`RETRIABLE_STATUS_CODES`] qualify.
    pub fn is_retriable(&self) -> bool {
        match self {
            CurationError::Transport(_) => true,
            CurationError::Api { status, .. } => RETRIABLE_STATUS_CODES.contains(status),
            _ => false,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        CurationError::RemoteProtocol(message.into())
    }
}

impl From<ureq::Error> for CurationError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => {
                let message = response
                    .into_string()
                    .unwrap_or_else(|_| "<unreadable body>".to_string());
                CurationError::Api { status, message }
            }
            ureq::Error::Transport(transport) => CurationError::Transport(transport.to_string()),
        }
    }
}
