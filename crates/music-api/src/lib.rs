//! Music service abstraction for playback and playlist operations
//!
//! Defines the `MusicApi` trait the playlist guard is written against, the
//! reqwest-backed `SpotifyClient` that implements it, and `PlaylistGuard`,
//! which turns the raw calls into idempotent, ownership-checked add/remove
//! operations on the currently playing track.
//!
//! Every method takes an access token that has already been resolved by the
//! token broker; nothing in this crate reads or writes credentials.

pub mod error;
pub mod guard;
pub mod spotify;

pub use error::{Error, Result};
pub use guard::{AddOutcome, AddReport, NowPlayingView, PlaylistGuard, RemoveReport};
pub use spotify::SpotifyClient;

use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by `MusicApi` methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// The track currently playing for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub track_id: String,
    pub track_name: String,
    /// Name of the first listed artist.
    pub artist_name: String,
    /// Set only when the playback context is a playlist.
    pub playlist_id: Option<String>,
}

impl NowPlaying {
    pub fn track_uri(&self) -> String {
        format!("spotify:track:{}", self.track_id)
    }
}

/// Display name and owner of a playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistInfo {
    pub id: String,
    pub name: String,
    pub owner_id: String,
}

/// Upstream music service operations used by the playlist guard.
///
/// Non-success responses surface as `Error::Upstream` with the raw body;
/// transport failures as `Error::Network`. Nothing here retries.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn MusicApi>`).
pub trait MusicApi: Send + Sync {
    /// Currently playing track, or `None` when nothing is playing.
    fn now_playing<'a>(&'a self, token: &'a str) -> ApiFuture<'a, Option<NowPlaying>>;

    fn playlist<'a>(&'a self, token: &'a str, playlist_id: &'a str) -> ApiFuture<'a, PlaylistInfo>;

    /// Whether `playlist_id` already contains `track_id`, checking every page.
    fn playlist_contains<'a>(
        &'a self,
        token: &'a str,
        playlist_id: &'a str,
        track_id: &'a str,
    ) -> ApiFuture<'a, bool>;

    fn add_track<'a>(
        &'a self,
        token: &'a str,
        playlist_id: &'a str,
        track_id: &'a str,
    ) -> ApiFuture<'a, ()>;

    fn remove_track<'a>(
        &'a self,
        token: &'a str,
        playlist_id: &'a str,
        track_id: &'a str,
    ) -> ApiFuture<'a, ()>;

    /// Skip playback to the next track.
    fn skip_next<'a>(&'a self, token: &'a str) -> ApiFuture<'a, ()>;

    /// Stable user id of the token's owner ("who am I").
    fn current_user_id<'a>(&'a self, token: &'a str) -> ApiFuture<'a, String>;
}
