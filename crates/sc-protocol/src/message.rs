//! Signals emitted while a completion streams in.

use thiserror::Error;

/// Why a stream failed.
///
/// Every variant carries owned text so a failure can be cloned into the
/// signal sequence and compared in tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The wire request could not be built (bad URL, bad header value).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The connection could not be established or was reset.
    #[error("connection error: {0}")]
    Connect(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Reading the response body failed mid-stream.
    #[error("stream read error: {0}")]
    Body(String),

    /// The stream stopped without a descriptive cause.
    #[error("stream failure")]
    StreamFailure,
}

/// Application-level output of a streaming completion.
///
/// A sequence of these is a run of `Delta`s ended by at most one
/// `Completed` or `Failed`, which is always the last item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSignal {
    /// A non-empty fragment of response text.
    Delta(String),

    /// The model finished. Carries the upstream finish reason if one was sent.
    Completed { finish_reason: Option<String> },

    /// The stream failed.
    Failed(StreamError),
}

impl StreamSignal {
    pub fn completed(finish_reason: Option<String>) -> Self {
        Self::Completed { finish_reason }
    }

    /// True for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        match self {
            StreamSignal::Delta(_) => false,
            StreamSignal::Completed { .. } | StreamSignal::Failed(_) => true,
        }
    }
}
