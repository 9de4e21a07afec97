//! Error types for Spotify Web API calls and playlist mutations

/// Errors from the music API client and the playlist guard.
///
/// The first five variants are domain outcomes a client can branch on; the
/// rest are upstream communication failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no track is currently playing")]
    NothingPlaying,

    /// The current track is not playing from a playlist context.
    #[error("current track is not playing from a playlist")]
    NotFromPlaylist,

    /// The playlist is not owned by the authenticated user.
    #[error("playlist {playlist_id} is not owned by the current user")]
    Forbidden { playlist_id: String },

    #[error("adding track to playlist failed ({status}): {body}")]
    AddFailed { status: u16, body: String },

    #[error("removing track from playlist failed ({status}): {body}")]
    RemoveFailed { status: u16, body: String },

    /// Non-success status from a read or control endpoint.
    #[error("{operation} rejected ({status}): {body}")]
    Upstream {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// Transport failure. `timed_out` distinguishes an expired request budget.
    #[error("{operation} unreachable: {message}")]
    Network {
        operation: &'static str,
        message: String,
        timed_out: bool,
    },

    #[error("invalid {operation} response: {message}")]
    InvalidResponse {
        operation: &'static str,
        message: String,
    },
}

impl Error {
    pub(crate) fn network(operation: &'static str, e: reqwest::Error) -> Self {
        Error::Network {
            operation,
            timed_out: e.is_timeout(),
            message: e.to_string(),
        }
    }

    /// Whether this is an upstream communication failure rather than a
    /// domain outcome.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Error::Upstream { .. } | Error::Network { .. } | Error::InvalidResponse { .. }
        )
    }
}

/// Result alias for music API operations.
pub type Result<T> = std::result::Result<T, Error>;
