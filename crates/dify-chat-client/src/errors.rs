use crate::stream::ErrorEvent;

/// Fatal outcome of one stream-processing session.
///
/// Non-fatal conditions (undecodable lines, unknown events) never surface as
/// a `StreamError`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    /// `process` was called without a byte source.
    #[error("response body is missing")]
    MissingSource,
    /// Reading the next chunk from the source failed.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// The backend sent an `error` record mid-stream.
    #[error("stream error event: {0}")]
    ErrorEvent(ErrorEvent),
    /// The session was aborted by the caller.
    #[error("stream cancelled")]
    Cancelled,
}

impl StreamError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Errors returned by the HTTP client and chat turns.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Connection, TLS or body read failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The API answered with a non-success status.
    #[error("api request {operation} failed with status {status}: {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },
    /// A response body did not have the expected shape.
    #[error("failed to decode {operation} response: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub(crate) fn transport(operation: &str, err: impl std::fmt::Display) -> Self {
        Self::Transport(format!("{operation}: {err}"))
    }

    /// Returns the HTTP status for API errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
