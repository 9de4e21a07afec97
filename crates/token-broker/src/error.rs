//! Error types for token broker operations

/// Errors from the token lifecycle manager and the credential store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No credential record exists for the presented API key.
    #[error("invalid api key")]
    InvalidKey,

    /// The stored access token was stale and the refresh call failed. The
    /// store is left untouched; the next call retries.
    #[error("token refresh failed: {0}")]
    RefreshFailed(#[source] spotify_auth::Error),

    /// The authorization grant cannot be stored (e.g. no refresh token).
    #[error("incomplete authorization grant: {0}")]
    IncompleteGrant(String),

    #[error("credential store error: {0}")]
    Store(String),

    /// A store call did not finish within the request budget.
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for broker operations.
pub type Result<T> = std::result::Result<T, Error>;
