//! Error types for token endpoint operations

/// Errors from the Spotify accounts service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The token endpoint answered with a non-success status. `body` is the
    /// raw response text, kept verbatim for diagnostics.
    #[error("token endpoint rejected request ({status}): {body}")]
    UpstreamRejected { status: u16, body: String },

    /// Transport failure, including request timeouts.
    #[error("token endpoint unreachable: {0}")]
    Network(String),

    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Network(format!("request timed out: {e}"))
        } else {
            Error::Network(e.to_string())
        }
    }
}
