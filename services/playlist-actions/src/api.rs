//! API-key authenticated playlist endpoints
//!
//! Endpoints (all require `X-API-Key`):
//! - GET  /api/current-song: what is playing and from which playlist
//! - POST /api/add-song    : add the current track to a playlist (idempotent)
//! - POST /api/remove-song : remove the current track from its playlist
//! - POST /api/revoke      : delete the caller's API key

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use music_api::NowPlaying;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const PLAYLIST_ID_HEADER: &str = "x-playlist-id";

/// Shown when a playlist's display name could not be looked up.
pub const UNKNOWN_PLAYLIST: &str = "unknown";

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// The caller's API key. Missing or empty is a 401 before any store lookup.
pub fn api_key_from_headers(headers: &HeaderMap) -> Result<&str, ApiError> {
    header_value(headers, API_KEY_HEADER).ok_or_else(ApiError::missing_api_key)
}

/// Resolve the `X-API-Key` header to an access token valid right now.
///
/// The single entry point every Spotify-facing handler calls first.
pub async fn resolve_from_request(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    let api_key = api_key_from_headers(headers)?;
    Ok(state.tokens.resolve(api_key).await?)
}

fn track_json(track: &NowPlaying) -> Value {
    json!({
        "id": track.track_id,
        "name": track.track_name,
        "artist": track.artist_name,
    })
}

/// GET /api/current-song
///
/// `playlist_name` is present only when playing from a playlist.
pub async fn current_song(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let token = resolve_from_request(&state, &headers).await?;
    let view = state.guard.current_song(&token).await?;

    let mut body = json!({
        "current_song": view.track.track_name,
        "artist_name": view.track.artist_name,
    });
    if view.track.playlist_id.is_some() {
        body["playlist_name"] = json!(view.playlist_name.as_deref().unwrap_or(UNKNOWN_PLAYLIST));
    }
    Ok(Json(body))
}

#[derive(Debug, Default, Deserialize)]
struct AddSongRequest {
    #[serde(default)]
    playlist_id: Option<String>,
}

/// Spotify ids are base62; anything else would change the upstream URL path.
fn is_spotify_id(id: &str) -> bool {
    id.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Target playlist from the JSON body, falling back to `X-Playlist-ID`.
fn requested_playlist_id(headers: &HeaderMap, body: &[u8]) -> Result<String, ApiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        AddSongRequest::default()
    } else {
        serde_json::from_slice::<AddSongRequest>(body)
            .map_err(|e| ApiError::invalid_request(format!("invalid JSON body: {e}")))?
    };

    let playlist_id = request
        .playlist_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .or_else(|| header_value(headers, PLAYLIST_ID_HEADER).map(str::to_string))
        .ok_or_else(|| {
            ApiError::invalid_request("missing playlist_id (JSON body or X-Playlist-ID header)")
        })?;

    if !is_spotify_id(&playlist_id) {
        return Err(ApiError::invalid_request(
            "playlist_id must contain only letters and digits",
        ));
    }
    Ok(playlist_id)
}

/// POST /api/add-song
pub async fn add_song(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    api_key_from_headers(&headers)?;
    let playlist_id = requested_playlist_id(&headers, &body)?;
    let token = resolve_from_request(&state, &headers).await?;

    let report = state.guard.add_current_song(&token, &playlist_id).await?;
    let playlist_name = report.playlist_name.as_deref().unwrap_or(UNKNOWN_PLAYLIST);
    let message = match report.outcome {
        music_api::AddOutcome::Added => format!("Song added to {playlist_name}"),
        music_api::AddOutcome::AlreadyPresent => {
            format!("This song is already in your playlist {playlist_name}")
        }
    };

    Ok(Json(json!({
        "status": report.outcome.as_str(),
        "message": message,
        "track": track_json(&report.track),
        "playlist_id": playlist_id,
        "playlist_name": playlist_name,
    })))
}

/// POST /api/remove-song
pub async fn remove_song(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let token = resolve_from_request(&state, &headers).await?;
    let report = state.guard.remove_current_song(&token).await?;

    Ok(Json(json!({
        "status": "removed",
        "message": format!("Song removed from {}", report.playlist_name),
        "track": track_json(&report.track),
        "playlist_id": report.playlist_id,
        "playlist_name": report.playlist_name,
        "skipped": report.skipped,
    })))
}

/// POST /api/revoke
pub async fn revoke(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let api_key = api_key_from_headers(&headers)?;
    let owner_id = state.tokens.revoke(api_key).await?;
    info!(owner_id = %owner_id, "session revoked");

    Ok(Json(json!({
        "status": "revoked",
        "message": "Your session has been revoked successfully.",
    })))
}
