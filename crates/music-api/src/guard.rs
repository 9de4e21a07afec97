//! Idempotent, ownership-checked playlist mutations
//!
//! Both mutations start from the currently playing track, since every later
//! step needs a concrete track id. Adding checks membership before writing so
//! a repeat request is a no-op. Removing checks that the caller owns the
//! playlist before writing, so followed or collaborative playlists are never
//! touched.
//!
//! The membership check is read-before-write, not compare-and-swap: a
//! concurrent writer can still produce a duplicate entry between the check
//! and the add.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::error::{Error, Result};
use crate::{MusicApi, NowPlaying};

/// Result of adding the current track to a playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

impl AddOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddOutcome::Added => "added",
            AddOutcome::AlreadyPresent => "already_present",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AddReport {
    pub outcome: AddOutcome,
    pub track: NowPlaying,
    /// Display name of the target playlist; `None` if the lookup failed.
    pub playlist_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemoveReport {
    pub track: NowPlaying,
    pub playlist_id: String,
    pub playlist_name: String,
    /// Whether the follow-up skip to the next track succeeded.
    pub skipped: bool,
}

/// What is playing right now, for display.
#[derive(Debug, Clone)]
pub struct NowPlayingView {
    pub track: NowPlaying,
    /// `None` when not playing from a playlist or when the lookup failed.
    pub playlist_name: Option<String>,
}

/// Playlist operations on the caller's currently playing track.
pub struct PlaylistGuard {
    api: Arc<dyn MusicApi>,
}

impl PlaylistGuard {
    pub fn new(api: Arc<dyn MusicApi>) -> Self {
        Self { api }
    }

    async fn require_now_playing(&self, token: &str) -> Result<NowPlaying> {
        self.api.now_playing(token).await?.ok_or(Error::NothingPlaying)
    }

    /// Playlist display name for messages. Failures are logged and dropped.
    async fn playlist_name(&self, token: &str, playlist_id: &str) -> Option<String> {
        match self.api.playlist(token, playlist_id).await {
            Ok(info) => Some(info.name),
            Err(e) => {
                warn!(playlist_id, error = %e, "playlist name lookup failed");
                None
            }
        }
    }

    /// Add the current track to `playlist_id` unless it is already there.
    #[instrument(skip(self, token))]
    pub async fn add_current_song(&self, token: &str, playlist_id: &str) -> Result<AddReport> {
        let track = self.require_now_playing(token).await?;

        let present = self
            .api
            .playlist_contains(token, playlist_id, &track.track_id)
            .await?;

        let outcome = if present {
            info!(track_id = %track.track_id, "track already in playlist, skipping add");
            AddOutcome::AlreadyPresent
        } else {
            self.api
                .add_track(token, playlist_id, &track.track_id)
                .await
                .map_err(|e| match e {
                    Error::Upstream { status, body, .. } => Error::AddFailed { status, body },
                    other => other,
                })?;
            info!(track_id = %track.track_id, "track added to playlist");
            AddOutcome::Added
        };

        let playlist_name = self.playlist_name(token, playlist_id).await;
        Ok(AddReport {
            outcome,
            track,
            playlist_name,
        })
    }

    /// Remove the current track from the playlist it is playing from, then
    /// skip to the next track.
    #[instrument(skip_all)]
    pub async fn remove_current_song(&self, token: &str) -> Result<RemoveReport> {
        let track = self.require_now_playing(token).await?;
        let playlist_id = track.playlist_id.clone().ok_or(Error::NotFromPlaylist)?;

        let playlist = self.api.playlist(token, &playlist_id).await?;
        let user_id = self.api.current_user_id(token).await?;
        if playlist.owner_id != user_id {
            warn!(playlist_id = %playlist_id, "refusing to modify playlist owned by another user");
            return Err(Error::Forbidden { playlist_id });
        }

        self.api
            .remove_track(token, &playlist_id, &track.track_id)
            .await
            .map_err(|e| match e {
                Error::Upstream { status, body, .. } => Error::RemoveFailed { status, body },
                other => other,
            })?;
        info!(playlist_id = %playlist_id, track_id = %track.track_id, "track removed from playlist");

        let skipped = match self.api.skip_next(token).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "skip after removal failed");
                false
            }
        };

        Ok(RemoveReport {
            track,
            playlist_id,
            playlist_name: playlist.name,
            skipped,
        })
    }

    /// The current track and, when playing from a playlist, its name.
    #[instrument(skip_all)]
    pub async fn current_song(&self, token: &str) -> Result<NowPlayingView> {
        let track = self.require_now_playing(token).await?;
        let playlist_name = match &track.playlist_id {
            Some(id) => self.playlist_name(token, id).await,
            None => None,
        };
        Ok(NowPlayingView {
            track,
            playlist_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ApiFuture, PlaylistInfo};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory music service with call counters.
    struct FakeApi {
        playing: Option<NowPlaying>,
        playlist_tracks: Mutex<Vec<String>>,
        owner_id: String,
        user_id: String,
        fail_add: bool,
        fail_remove: bool,
        fail_skip: bool,
        fail_playlist_lookup: bool,
        adds: AtomicUsize,
        removes: AtomicUsize,
        skips: AtomicUsize,
    }

    impl FakeApi {
        fn playing(track_id: &str, playlist_id: Option<&str>) -> Self {
            Self {
                playing: Some(NowPlaying {
                    track_id: track_id.into(),
                    track_name: "Song".into(),
                    artist_name: "Band".into(),
                    playlist_id: playlist_id.map(str::to_string),
                }),
                playlist_tracks: Mutex::new(Vec::new()),
                owner_id: "user-1".into(),
                user_id: "user-1".into(),
                fail_add: false,
                fail_remove: false,
                fail_skip: false,
                fail_playlist_lookup: false,
                adds: AtomicUsize::new(0),
                removes: AtomicUsize::new(0),
                skips: AtomicUsize::new(0),
            }
        }

        fn with_tracks(self, tracks: &[&str]) -> Self {
            *self.playlist_tracks.lock().unwrap() = tracks.iter().map(|t| t.to_string()).collect();
            self
        }

        fn rejected(operation: &'static str) -> Error {
            Error::Upstream {
                operation,
                status: 403,
                body: "nope".into(),
            }
        }
    }

    impl MusicApi for FakeApi {
        fn now_playing<'a>(&'a self, _token: &'a str) -> ApiFuture<'a, Option<NowPlaying>> {
            Box::pin(async move { Ok(self.playing.clone()) })
        }

        fn playlist<'a>(&'a self, _token: &'a str, playlist_id: &'a str) -> ApiFuture<'a, PlaylistInfo> {
            Box::pin(async move {
                if self.fail_playlist_lookup {
                    return Err(Self::rejected("playlist lookup"));
                }
                Ok(PlaylistInfo {
                    id: playlist_id.into(),
                    name: "Road Trip".into(),
                    owner_id: self.owner_id.clone(),
                })
            })
        }

        fn playlist_contains<'a>(
            &'a self,
            _token: &'a str,
            _playlist_id: &'a str,
            track_id: &'a str,
        ) -> ApiFuture<'a, bool> {
            Box::pin(async move {
                Ok(self.playlist_tracks.lock().unwrap().iter().any(|t| t == track_id))
            })
        }

        fn add_track<'a>(
            &'a self,
            _token: &'a str,
            _playlist_id: &'a str,
            track_id: &'a str,
        ) -> ApiFuture<'a, ()> {
            Box::pin(async move {
                self.adds.fetch_add(1, Ordering::SeqCst);
                if self.fail_add {
                    return Err(Self::rejected("add track"));
                }
                self.playlist_tracks.lock().unwrap().push(track_id.into());
                Ok(())
            })
        }

        fn remove_track<'a>(
            &'a self,
            _token: &'a str,
            _playlist_id: &'a str,
            track_id: &'a str,
        ) -> ApiFuture<'a, ()> {
            Box::pin(async move {
                self.removes.fetch_add(1, Ordering::SeqCst);
                if self.fail_remove {
                    return Err(Self::rejected("remove track"));
                }
                self.playlist_tracks.lock().unwrap().retain(|t| t != track_id);
                Ok(())
            })
        }

        fn skip_next<'a>(&'a self, _token: &'a str) -> ApiFuture<'a, ()> {
            Box::pin(async move {
                self.skips.fetch_add(1, Ordering::SeqCst);
                if self.fail_skip {
                    return Err(Self::rejected("skip track"));
                }
                Ok(())
            })
        }

        fn current_user_id<'a>(&'a self, _token: &'a str) -> ApiFuture<'a, String> {
            Box::pin(async move { Ok(self.user_id.clone()) })
        }
    }

    fn guard(api: &Arc<FakeApi>) -> PlaylistGuard {
        PlaylistGuard::new(api.clone())
    }

    #[tokio::test]
    async fn add_when_nothing_playing() {
        let api = Arc::new(FakeApi {
            playing: None,
            ..FakeApi::playing("t1", None)
        });
        let err = guard(&api).add_current_song("tok", "p1").await.unwrap_err();
        assert!(matches!(err, Error::NothingPlaying), "got: {err:?}");
        assert_eq!(api.adds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn add_already_present_does_not_write() {
        let api = Arc::new(FakeApi::playing("t1", Some("p1")).with_tracks(&["t1"]));
        let report = guard(&api).add_current_song("tok", "p1").await.unwrap();

        assert_eq!(report.outcome, AddOutcome::AlreadyPresent);
        assert_eq!(report.track.track_id, "t1");
        assert_eq!(api.adds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeated_add_writes_at_most_once() {
        let api = Arc::new(FakeApi::playing("t1", None).with_tracks(&["t0"]));
        let g = guard(&api);

        let first = g.add_current_song("tok", "p1").await.unwrap();
        let second = g.add_current_song("tok", "p1").await.unwrap();
        let third = g.add_current_song("tok", "p1").await.unwrap();

        assert_eq!(first.outcome, AddOutcome::Added);
        assert_eq!(second.outcome, AddOutcome::AlreadyPresent);
        assert_eq!(third.outcome, AddOutcome::AlreadyPresent);
        assert_eq!(api.adds.load(Ordering::SeqCst), 1);
        assert_eq!(first.playlist_name.as_deref(), Some("Road Trip"));
    }

    #[tokio::test]
    async fn rejected_add_is_add_failed() {
        let api = Arc::new(FakeApi {
            fail_add: true,
            ..FakeApi::playing("t1", None)
        });
        let err = guard(&api).add_current_song("tok", "p1").await.unwrap_err();
        assert!(matches!(err, Error::AddFailed { status: 403, .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn add_survives_playlist_name_lookup_failure() {
        let api = Arc::new(FakeApi {
            fail_playlist_lookup: true,
            ..FakeApi::playing("t1", None)
        });
        let report = guard(&api).add_current_song("tok", "p1").await.unwrap();
        assert_eq!(report.outcome, AddOutcome::Added);
        assert_eq!(report.playlist_name, None);
    }

    #[tokio::test]
    async fn remove_outside_playlist_is_not_from_playlist() {
        let api = Arc::new(FakeApi::playing("t1", None));
        let err = guard(&api).remove_current_song("tok").await.unwrap_err();
        assert!(matches!(err, Error::NotFromPlaylist), "got: {err:?}");
        assert_eq!(api.removes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn remove_when_nothing_playing() {
        let api = Arc::new(FakeApi {
            playing: None,
            ..FakeApi::playing("t1", Some("p1"))
        });
        let err = guard(&api).remove_current_song("tok").await.unwrap_err();
        assert!(matches!(err, Error::NothingPlaying), "got: {err:?}");
    }

    #[tokio::test]
    async fn remove_from_foreign_playlist_is_forbidden() {
        let api = Arc::new(FakeApi {
            owner_id: "someone-else".into(),
            ..FakeApi::playing("t1", Some("p1")).with_tracks(&["t1"])
        });
        let err = guard(&api).remove_current_song("tok").await.unwrap_err();
        assert!(matches!(err, Error::Forbidden { ref playlist_id } if playlist_id == "p1"));
        assert_eq!(api.removes.load(Ordering::SeqCst), 0);
        assert_eq!(api.skips.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn remove_from_owned_playlist_then_skips() {
        let api = Arc::new(FakeApi::playing("t1", Some("p1")).with_tracks(&["t0", "t1"]));
        let report = guard(&api).remove_current_song("tok").await.unwrap();

        assert_eq!(report.playlist_id, "p1");
        assert_eq!(report.playlist_name, "Road Trip");
        assert!(report.skipped);
        assert_eq!(api.removes.load(Ordering::SeqCst), 1);
        assert_eq!(*api.playlist_tracks.lock().unwrap(), vec!["t0".to_string()]);
    }

    #[tokio::test]
    async fn rejected_remove_is_remove_failed_and_does_not_skip() {
        let api = Arc::new(FakeApi {
            fail_remove: true,
            ..FakeApi::playing("t1", Some("p1")).with_tracks(&["t1"])
        });
        let err = guard(&api).remove_current_song("tok").await.unwrap_err();

        assert!(matches!(err, Error::RemoveFailed { status: 403, .. }), "got: {err:?}");
        assert_eq!(api.removes.load(Ordering::SeqCst), 1);
        assert_eq!(api.skips.load(Ordering::SeqCst), 0);
        assert_eq!(*api.playlist_tracks.lock().unwrap(), vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn failed_skip_does_not_fail_removal() {
        let api = Arc::new(FakeApi {
            fail_skip: true,
            ..FakeApi::playing("t1", Some("p1"))
        });
        let report = guard(&api).remove_current_song("tok").await.unwrap();
        assert!(!report.skipped);
        assert_eq!(api.removes.load(Ordering::SeqCst), 1);
        assert_eq!(api.skips.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn current_song_includes_playlist_name_when_in_playlist() {
        let api = Arc::new(FakeApi::playing("t1", Some("p1")));
        let view = guard(&api).current_song("tok").await.unwrap();
        assert_eq!(view.track.track_name, "Song");
        assert_eq!(view.playlist_name.as_deref(), Some("Road Trip"));

        let api = Arc::new(FakeApi::playing("t1", None));
        let view = guard(&api).current_song("tok").await.unwrap();
        assert_eq!(view.playlist_name, None);
    }
}
