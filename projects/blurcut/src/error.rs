use thiserror::Error;

/// Errors surfaced by the review workflow.
///
/// Nothing here is process-fatal: every variant aborts only the operation
/// that raised it and leaves the session on disk in a retryable state.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The selected file is not a supported video type.
    #[error("not a video file: {0} (expected .mp4, .avi or .mov)")]
    InputRejected(String),

    /// The HTTP request itself failed (connect, timeout, body read).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status code.
    #[error("server returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The server reported the job as terminally failed.
    #[error("job failed: {}", .0.as_deref().unwrap_or("no details from server"))]
    JobFailed(Option<String>),

    /// The status endpoint returned a string outside the known set.
    /// Treated as fatal for the operation so a bad deploy cannot leave the
    /// poller spinning forever.
    #[error("unknown job status {0:?}")]
    UnknownJobStatus(String),

    /// save/export/download was attempted with no job in the session.
    #[error("no job for this session; run `analyze` first")]
    MissingJobId,

    /// No session workspace exists where one was expected.
    #[error("no session found: {0}")]
    NoSession(String),

    /// Detection results have not been fetched into the session yet.
    #[error("no analysis results in this session; run `analyze` first")]
    NoResults,

    /// A response or session file could not be decoded.
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Local file access failed (upload source, download target, session).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
