//! Spotify accounts service constants
//!
//! Endpoint URLs and the scope set the playlist actions need. Client id,
//! secret and redirect URI are deployment configuration, not constants.

/// Authorization endpoint the user is redirected to during login
pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.spotify.com/authorize";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";

/// Scopes requested at login.
///
/// Playback state is read for "now playing", modified for skip-after-remove;
/// the playlist scopes cover membership reads and add/remove on both public
/// and private playlists.
pub const SCOPES: &str = "user-read-playback-state user-modify-playback-state playlist-read-private playlist-modify-public playlist-modify-private";

/// Lifetime assumed for an access token when the token endpoint omits
/// `expires_in`. Spotify documents one hour.
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;
