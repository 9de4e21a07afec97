//! reqwest-backed Spotify Web API client
//!
//! Upstream JSON is parsed into typed structs. Fields Spotify may omit or
//! null out (playback context, playlist item tracks, paging links) are
//! `Option`s; everything else is required and a missing field is an
//! `InvalidResponse`.

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::{ApiFuture, MusicApi, NowPlaying, PlaylistInfo};

/// Production Web API base URL.
pub const API_BASE_URL: &str = "https://api.spotify.com/v1";

/// Context URI prefix identifying playback from a playlist.
const PLAYLIST_CONTEXT_PREFIX: &str = "spotify:playlist:";

/// Page size for playlist membership checks (Spotify maximum).
const TRACKS_PAGE_LIMIT: u32 = 100;

/// Stop following `next` links after this many pages.
const MAX_TRACK_PAGES: usize = 200;

#[derive(Debug, Deserialize)]
struct CurrentlyPlaying {
    #[serde(default)]
    item: Option<Track>,
    #[serde(default)]
    context: Option<PlaybackContext>,
}

#[derive(Debug, Deserialize)]
struct Track {
    /// Null for local files.
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<Artist>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlaybackContext {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct Playlist {
    id: String,
    name: String,
    owner: User,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TracksPage {
    items: Vec<PlaylistItem>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    #[serde(default)]
    track: Option<TrackRef>,
}

#[derive(Debug, Deserialize)]
struct TrackRef {
    #[serde(default)]
    id: Option<String>,
}

/// Playlist id from a playback context URI, if the context is a playlist.
fn playlist_id_from_context(uri: &str) -> Option<String> {
    uri.strip_prefix(PLAYLIST_CONTEXT_PREFIX)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

impl CurrentlyPlaying {
    fn into_now_playing(self) -> Result<Option<NowPlaying>> {
        let Some(track) = self.item else {
            return Ok(None);
        };
        let invalid = |message: &str| Error::InvalidResponse {
            operation: "now playing",
            message: message.to_string(),
        };
        let track_id = track
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| invalid("current item has no track id"))?;
        let artist_name = track
            .artists
            .into_iter()
            .next()
            .map(|a| a.name)
            .ok_or_else(|| invalid("current item has no artist"))?;

        Ok(Some(NowPlaying {
            track_id,
            track_name: track.name,
            artist_name,
            playlist_id: self
                .context
                .and_then(|c| playlist_id_from_context(&c.uri)),
        }))
    }
}

/// Spotify Web API client. Cheap to clone; shares the reqwest pool.
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl SpotifyClient {
    pub fn new(http: reqwest::Client, timeout: Duration) -> Self {
        Self {
            http,
            base_url: API_BASE_URL.to_string(),
            timeout,
        }
    }

    /// Point the client at a different API root (local test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send with bearer auth and the request timeout; non-success statuses
    /// become `Error::Upstream` carrying the body.
    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
        token: &str,
    ) -> Result<reqwest::Response> {
        let response = request
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::network(operation, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(operation, status = status.as_u16(), "upstream rejected request");
        Err(Error::Upstream {
            operation,
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: &str,
        token: &str,
    ) -> Result<T> {
        let response = self.send(operation, self.http.get(url), token).await?;
        let body = response
            .text()
            .await
            .map_err(|e| Error::network(operation, e))?;
        serde_json::from_str(&body).map_err(|e| Error::InvalidResponse {
            operation,
            message: e.to_string(),
        })
    }

    #[instrument(skip_all)]
    pub async fn currently_playing(&self, token: &str) -> Result<Option<NowPlaying>> {
        const OP: &str = "now playing";
        let response = self
            .send(OP, self.http.get(self.url("/me/player/currently-playing")), token)
            .await?;

        // 204 means no active playback.
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = response.text().await.map_err(|e| Error::network(OP, e))?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let playing: CurrentlyPlaying =
            serde_json::from_str(&body).map_err(|e| Error::InvalidResponse {
                operation: OP,
                message: e.to_string(),
            })?;
        playing.into_now_playing()
    }

    #[instrument(skip(self, token))]
    pub async fn get_playlist(&self, token: &str, playlist_id: &str) -> Result<PlaylistInfo> {
        let url = self.url(&format!("/playlists/{playlist_id}?fields=id,name,owner(id)"));
        let playlist: Playlist = self.get_json("playlist lookup", &url, token).await?;
        Ok(PlaylistInfo {
            id: playlist.id,
            name: playlist.name,
            owner_id: playlist.owner.id,
        })
    }

    #[instrument(skip(self, token))]
    pub async fn contains_track(
        &self,
        token: &str,
        playlist_id: &str,
        track_id: &str,
    ) -> Result<bool> {
        let mut url = Some(self.url(&format!(
            "/playlists/{playlist_id}/tracks?limit={TRACKS_PAGE_LIMIT}&fields=items(track(id)),next"
        )));
        let mut pages = 0;

        while let Some(page_url) = url.take() {
            let page: TracksPage = self
                .get_json("playlist tracks", &page_url, token)
                .await?;
            pages += 1;

            let found = page
                .items
                .iter()
                .filter_map(|item| item.track.as_ref()?.id.as_deref())
                .any(|id| id == track_id);
            if found {
                debug!(pages, "track found in playlist");
                return Ok(true);
            }
            if pages >= MAX_TRACK_PAGES {
                return Err(Error::InvalidResponse {
                    operation: "playlist tracks",
                    message: format!("playlist exceeds {MAX_TRACK_PAGES} pages"),
                });
            }
            url = page.next;
        }

        debug!(pages, "track not in playlist");
        Ok(false)
    }

    #[instrument(skip(self, token))]
    pub async fn add_to_playlist(
        &self,
        token: &str,
        playlist_id: &str,
        track_id: &str,
    ) -> Result<()> {
        let body = serde_json::json!({ "uris": [format!("spotify:track:{track_id}")] });
        let request = self
            .http
            .post(self.url(&format!("/playlists/{playlist_id}/tracks")))
            .json(&body);
        self.send("add track", request, token).await?;
        Ok(())
    }

    #[instrument(skip(self, token))]
    pub async fn remove_from_playlist(
        &self,
        token: &str,
        playlist_id: &str,
        track_id: &str,
    ) -> Result<()> {
        let body =
            serde_json::json!({ "tracks": [{ "uri": format!("spotify:track:{track_id}") }] });
        let request = self
            .http
            .delete(self.url(&format!("/playlists/{playlist_id}/tracks")))
            .json(&body);
        self.send("remove track", request, token).await?;
        Ok(())
    }

    pub async fn next_track(&self, token: &str) -> Result<()> {
        let request = self.http.post(self.url("/me/player/next"));
        self.send("skip track", request, token).await?;
        Ok(())
    }

    pub async fn me(&self, token: &str) -> Result<String> {
        let user: User = self.get_json("who am i", &self.url("/me"), token).await?;
        Ok(user.id)
    }
}

impl MusicApi for SpotifyClient {
    fn now_playing<'a>(&'a self, token: &'a str) -> ApiFuture<'a, Option<NowPlaying>> {
        Box::pin(self.currently_playing(token))
    }

    fn playlist<'a>(&'a self, token: &'a str, playlist_id: &'a str) -> ApiFuture<'a, PlaylistInfo> {
        Box::pin(self.get_playlist(token, playlist_id))
    }

    fn playlist_contains<'a>(
        &'a self,
        token: &'a str,
        playlist_id: &'a str,
        track_id: &'a str,
    ) -> ApiFuture<'a, bool> {
        Box::pin(self.contains_track(token, playlist_id, track_id))
    }

    fn add_track<'a>(
        &'a self,
        token: &'a str,
        playlist_id: &'a str,
        track_id: &'a str,
    ) -> ApiFuture<'a, ()> {
        Box::pin(self.add_to_playlist(token, playlist_id, track_id))
    }

    fn remove_track<'a>(
        &'a self,
        token: &'a str,
        playlist_id: &'a str,
        track_id: &'a str,
    ) -> ApiFuture<'a, ()> {
        Box::pin(self.remove_from_playlist(token, playlist_id, track_id))
    }

    fn skip_next<'a>(&'a self, token: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(self.next_track(token))
    }

    fn current_user_id<'a>(&'a self, token: &'a str) -> ApiFuture<'a, String> {
        Box::pin(self.me(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    fn bearer(headers: &HeaderMap) -> String {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or_default()
            .to_string()
    }

    /// Fake Web API. Behavior is keyed on the bearer token:
    /// `idle` → nothing playing (204), `podcast` → `item: null`,
    /// `album` → track playing from an album, anything else → `t1` in `p1`.
    /// Playlist `p1` holds `t0,t1` on page one and `t9` on page two.
    async fn start_api() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let app = Router::new()
            .route(
                "/me/player/currently-playing",
                get(|headers: HeaderMap| async move {
                    match bearer(&headers).as_str() {
                        "" => (StatusCode::UNAUTHORIZED, String::new()),
                        "idle" => (StatusCode::NO_CONTENT, String::new()),
                        "podcast" => (StatusCode::OK, r#"{"item":null,"context":null}"#.into()),
                        "album" => (
                            StatusCode::OK,
                            r#"{"item":{"id":"t1","name":"Song","artists":[{"name":"Band"}]},
                               "context":{"uri":"spotify:album:a1"}}"#
                                .into(),
                        ),
                        _ => (
                            StatusCode::OK,
                            r#"{"is_playing":true,
                               "item":{"id":"t1","name":"Song","artists":[{"name":"Band"},{"name":"Guest"}]},
                               "context":{"type":"playlist","uri":"spotify:playlist:p1"}}"#
                                .into(),
                        ),
                    }
                }),
            )
            .route(
                "/playlists/{id}",
                get(|Path(id): Path<String>| async move {
                    if id == "missing" {
                        return (StatusCode::NOT_FOUND, r#"{"error":{"status":404}}"#.to_string());
                    }
                    (
                        StatusCode::OK,
                        format!(r#"{{"id":"{id}","name":"Road Trip","owner":{{"id":"user-1"}}}}"#),
                    )
                }),
            )
            .route(
                "/playlists/{id}/tracks",
                get(
                    |State(base): State<String>,
                     Path(id): Path<String>,
                     Query(q): Query<HashMap<String, String>>| async move {
                        assert_eq!(id, "p1");
                        assert_eq!(q.get("limit").map(String::as_str), Some("100"));
                        if q.get("offset").map(String::as_str) == Some("100") {
                            return Json(serde_json::json!({
                                "items": [{"track": {"id": "t9"}}],
                                "next": null
                            }));
                        }
                        Json(serde_json::json!({
                            "items": [{"track": {"id": "t0"}}, {"track": null}, {"track": {"id": "t1"}}],
                            "next": format!("{base}/playlists/p1/tracks?offset=100&limit=100")
                        }))
                    },
                )
                .post(
                    |Path(id): Path<String>, Json(body): Json<serde_json::Value>| async move {
                        if id == "locked" {
                            return (StatusCode::FORBIDDEN, r#"{"error":"forbidden"}"#.to_string());
                        }
                        assert_eq!(body, serde_json::json!({"uris": ["spotify:track:t5"]}));
                        (StatusCode::CREATED, r#"{"snapshot_id":"s1"}"#.to_string())
                    },
                )
                .delete(|Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(
                        body,
                        serde_json::json!({"tracks": [{"uri": "spotify:track:t1"}]})
                    );
                    (StatusCode::OK, r#"{"snapshot_id":"s2"}"#)
                }),
            )
            .route(
                "/me/player/next",
                post(|headers: HeaderMap| async move {
                    if bearer(&headers) == "no-device" {
                        StatusCode::NOT_FOUND
                    } else {
                        StatusCode::NO_CONTENT
                    }
                }),
            )
            .route(
                "/me",
                get(|| async { Json(serde_json::json!({"id": "user-1", "display_name": "U"})) }),
            )
            .with_state(base.clone());

        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        base
    }

    fn client(base: &str) -> SpotifyClient {
        SpotifyClient::new(reqwest::Client::new(), Duration::from_secs(5)).with_base_url(base)
    }

    #[test]
    fn playlist_context_parsing() {
        assert_eq!(
            playlist_id_from_context("spotify:playlist:37i9dQ"),
            Some("37i9dQ".into())
        );
        assert_eq!(playlist_id_from_context("spotify:album:abc"), None);
        assert_eq!(playlist_id_from_context("spotify:playlist:"), None);
    }

    #[tokio::test]
    async fn now_playing_from_playlist() {
        let api = client(&start_api().await);
        let playing = api.currently_playing("tok").await.unwrap().unwrap();
        assert_eq!(
            playing,
            NowPlaying {
                track_id: "t1".into(),
                track_name: "Song".into(),
                artist_name: "Band".into(),
                playlist_id: Some("p1".into()),
            }
        );
        assert_eq!(playing.track_uri(), "spotify:track:t1");
    }

    #[tokio::test]
    async fn now_playing_outside_playlist_has_no_playlist_id() {
        let api = client(&start_api().await);
        let playing = api.currently_playing("album").await.unwrap().unwrap();
        assert_eq!(playing.track_id, "t1");
        assert_eq!(playing.playlist_id, None);
    }

    #[tokio::test]
    async fn nothing_playing_variants() {
        let api = client(&start_api().await);
        assert!(api.currently_playing("idle").await.unwrap().is_none());
        assert!(api.currently_playing("podcast").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upstream_status_is_surfaced() {
        let api = client(&start_api().await);
        let err = api.get_playlist("tok", "missing").await.unwrap_err();
        match err {
            Error::Upstream { status, body, .. } => {
                assert_eq!(status, 404);
                assert!(body.contains("404"));
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn playlist_lookup() {
        let api = client(&start_api().await);
        let info = api.get_playlist("tok", "p1").await.unwrap();
        assert_eq!(info.name, "Road Trip");
        assert_eq!(info.owner_id, "user-1");
    }

    #[tokio::test]
    async fn membership_follows_next_links() {
        let api = client(&start_api().await);
        assert!(api.contains_track("tok", "p1", "t1").await.unwrap());
        assert!(api.contains_track("tok", "p1", "t9").await.unwrap(), "second page");
        assert!(!api.contains_track("tok", "p1", "t5").await.unwrap());
    }

    #[tokio::test]
    async fn add_and_remove_send_track_uris() {
        let api = client(&start_api().await);
        api.add_to_playlist("tok", "p1", "t5").await.unwrap();
        api.remove_from_playlist("tok", "p1", "t1").await.unwrap();

        let err = api.add_to_playlist("tok", "locked", "t5").await.unwrap_err();
        assert!(matches!(err, Error::Upstream { status: 403, .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn skip_and_who_am_i() {
        let api = client(&start_api().await);
        api.next_track("tok").await.unwrap();
        assert!(api.next_track("no-device").await.is_err());
        assert_eq!(api.me("tok").await.unwrap(), "user-1");
    }

    #[tokio::test]
    async fn unreachable_api_is_network_error() {
        let api = client("http://127.0.0.1:1");
        let err = api.currently_playing("tok").await.unwrap_err();
        assert!(matches!(err, Error::Network { .. }), "got: {err:?}");
        assert!(err.is_upstream());
    }
}
