//! Browser-facing authorization flow
//!
//! Endpoints:
//! - GET /api/login   : start the Spotify authorization-code flow
//! - GET /api/callback: finish it, issue (or reuse) the user's API key
//! - GET /api/setup   : show the API key and what is playing right now
//!
//! Pending logins live in the credential store under `oauth_state:<state>`
//! with a 10 minute TTL; the callback consumes the state exactly once.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::AppState;
use crate::api::{API_KEY_HEADER, UNKNOWN_PLAYLIST};
use crate::error::ApiError;

/// Placeholder for setup page fields that could not be looked up.
const NOT_AVAILABLE: &str = "Not Available";

fn redirect_found(url: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response()
}

/// GET /api/login: 302 to the Spotify consent screen with a fresh `state`.
pub async fn login(State(state): State<AppState>) -> Result<Response, ApiError> {
    let login_state = state.tokens.begin_login().await?;
    let credentials = state.oauth.credentials();
    let url = spotify_auth::build_authorization_url(
        &credentials.client_id,
        &credentials.redirect_uri,
        &login_state,
    );
    info!("login started");
    Ok(redirect_found(&url))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// GET /api/callback: exchange the code, identify the user, issue a key,
/// and send the browser to the setup page.
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    if let Some(error) = params.error {
        warn!(error = %error, "authorization denied");
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "authorization_denied",
            format!("Spotify authorization failed: {error}"),
        ));
    }
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::invalid_request("missing authorization code"))?;

    let login_state = params.state.unwrap_or_default();
    if !state.tokens.consume_login_state(&login_state).await? {
        warn!("callback with unknown or expired login state");
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_state",
            "unknown or expired login state; start again at /api/login",
        ));
    }

    let grant = state.oauth.exchange_code(&code).await?;
    let owner_id = state.music.current_user_id(&grant.access_token).await?;
    let api_key = state.tokens.issue(grant, &owner_id).await?;

    Ok(redirect_found(&format!(
        "{}/api/setup?api_key={api_key}",
        state.public_url
    )))
}

#[derive(Debug, Deserialize)]
pub struct SetupParams {
    api_key: Option<String>,
}

/// GET /api/setup: the caller's API key, usage hints, and a live check
/// that the key works. Lookup failures show placeholders instead of failing.
pub async fn setup(
    State(state): State<AppState>,
    Query(params): Query<SetupParams>,
) -> Result<Json<Value>, ApiError> {
    let api_key = params
        .api_key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::invalid_request("missing api_key"))?;
    let token = state.tokens.resolve(&api_key).await?;

    let playing = match state.guard.current_song(&token).await {
        Ok(view) => {
            let playlist_name = view
                .track
                .playlist_id
                .as_ref()
                .map(|_| view.playlist_name.as_deref().unwrap_or(UNKNOWN_PLAYLIST));
            json!({
                "song": view.track.track_name,
                "artist": view.track.artist_name,
                "playlist_name": playlist_name,
                "playlist_id": view.track.playlist_id,
            })
        }
        Err(e) => {
            info!(error = %e, "setup page without current song");
            json!({
                "song": NOT_AVAILABLE,
                "artist": NOT_AVAILABLE,
                "playlist_name": NOT_AVAILABLE,
                "playlist_id": NOT_AVAILABLE,
            })
        }
    };

    let base = &state.public_url;
    Ok(Json(json!({
        "api_key": api_key,
        "header": "X-API-Key",
        "currently_playing": playing,
        "endpoints": {
            "current_song": format!("{base}/api/current-song"),
            "add_song": format!("{base}/api/add-song"),
            "remove_song": format!("{base}/api/remove-song"),
            "revoke": format!("{base}/api/revoke"),
        },
        "usage": format!(
            "Send {API_KEY_HEADER}: <api_key> with each request; add-song also takes {{\"playlist_id\": \"...\"}}"
        ),
    })))
}
