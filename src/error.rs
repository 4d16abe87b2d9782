//! Error types surfaced by the analysis stream.

use reqwest::StatusCode;

/// Terminal failure of one analysis stream.
///
/// Only transport-level problems end a stream under the default policy; malformed
/// payloads surface here only when the caller opted into aborting on them.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The service rejected the credentials; the session should be reset.
    #[error("analysis service rejected the session (401 Unauthorized)")]
    Unauthorized,

    /// The service answered with a non-success status.
    #[error("analysis service returned {0}")]
    Status(StatusCode),

    /// Sending the request or reading the body failed.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The body stream failed with a non-HTTP error.
    #[error("stream read failed: {0}")]
    Body(String),

    /// A payload could not be parsed and the policy is to abort.
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

impl StreamError {
    /// Whether the caller should drop its credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Classifies a response status. `None` means the stream may be read.
    pub fn from_status(status: StatusCode) -> Option<Self> {
        if status.is_success() {
            None
        } else if status == StatusCode::UNAUTHORIZED {
            Some(Self::Unauthorized)
        } else {
            Some(Self::Status(status))
        }
    }
}

/// A `data:` frame whose payload is not a product record.
#[derive(Debug, thiserror::Error)]
#[error("malformed payload on line {line}: {source}")]
pub struct PayloadError {
    /// 1-based line number within the stream.
    pub line: u64,
    /// Parser failure.
    #[source]
    pub source: serde_json::Error,
}

/// Invalid analysis request, rejected before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// Input shorter than the service accepts.
    #[error("input must be at least {min} characters, got {len}")]
    TooShort {
        /// Minimum length.
        min: usize,
        /// Actual length after trimming.
        len: usize,
    },
    /// Input longer than the service accepts.
    #[error("input must be at most {max} characters, got {len}")]
    TooLong {
        /// Maximum length.
        max: usize,
        /// Actual length after trimming.
        len: usize,
    },
    /// The base URL cannot be joined with the stream path.
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}
