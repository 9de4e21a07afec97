//! Client-facing error responses
//!
//! Every failure leaves the service as
//! `{"error":{"type":"...","message":"...","request_id":"req_..."}}` with a
//! status that lets automations branch on the outcome (unauthorized vs.
//! nothing playing vs. not your playlist) without parsing free text.
//!
//! `ApiError::into_response` stashes the error in the response extensions;
//! the request-tracking middleware in `main.rs` re-renders it with the
//! request id and counts upstream failures.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
    upstream: bool,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            upstream: false,
        }
    }

    /// A failure talking to Spotify or the credential store.
    fn upstream(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            upstream: true,
            ..Self::new(status, kind, message)
        }
    }

    pub fn missing_api_key() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "missing_api_key",
            "missing X-API-Key header",
        )
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn is_upstream(&self) -> bool {
        self.upstream
    }

    /// Render the JSON error body, tagged with `request_id` when known.
    pub fn render(&self, request_id: Option<&str>) -> Response {
        let mut error = serde_json::json!({
            "type": self.kind,
            "message": self.message,
        });
        if let Some(id) = request_id {
            error["request_id"] = serde_json::Value::String(id.to_string());
        }
        (self.status, Json(serde_json::json!({ "error": error }))).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = self.render(None);
        response.extensions_mut().insert(self);
        response
    }
}

impl From<token_broker::Error> for ApiError {
    fn from(e: token_broker::Error) -> Self {
        use token_broker::Error;
        match e {
            Error::InvalidKey => Self::new(StatusCode::UNAUTHORIZED, "invalid_api_key", "invalid API key"),
            Error::RefreshFailed(_) => Self::upstream(
                StatusCode::BAD_GATEWAY,
                "refresh_failed",
                "could not refresh Spotify access; re-authorize at /api/login",
            ),
            Error::IncompleteGrant(msg) => {
                Self::upstream(StatusCode::BAD_GATEWAY, "exchange_failed", msg)
            }
            Error::Store(msg) => Self::upstream(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
            Error::Unavailable(msg) => {
                Self::upstream(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", msg)
            }
        }
    }
}

impl From<music_api::Error> for ApiError {
    fn from(e: music_api::Error) -> Self {
        use music_api::Error;
        let message = e.to_string();
        match e {
            Error::NothingPlaying => Self::new(StatusCode::NOT_FOUND, "nothing_playing", message),
            Error::NotFromPlaylist => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "not_from_playlist", message)
            }
            Error::Forbidden { .. } => Self::new(StatusCode::FORBIDDEN, "forbidden", message),
            Error::AddFailed { .. } => Self::upstream(StatusCode::BAD_GATEWAY, "add_failed", message),
            Error::RemoveFailed { .. } => {
                Self::upstream(StatusCode::BAD_GATEWAY, "remove_failed", message)
            }
            Error::Network {
                timed_out: true, ..
            } => Self::upstream(StatusCode::GATEWAY_TIMEOUT, "upstream_timeout", message),
            Error::Upstream { .. } | Error::Network { .. } | Error::InvalidResponse { .. } => {
                Self::upstream(StatusCode::BAD_GATEWAY, "upstream_error", message)
            }
        }
    }
}

impl From<spotify_auth::Error> for ApiError {
    fn from(e: spotify_auth::Error) -> Self {
        Self::upstream(StatusCode::BAD_GATEWAY, "exchange_failed", e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn broker_errors_map_to_statuses() {
        let cases = [
            (token_broker::Error::InvalidKey, 401, "invalid_api_key"),
            (
                token_broker::Error::RefreshFailed(spotify_auth::Error::Network("down".into())),
                502,
                "refresh_failed",
            ),
            (token_broker::Error::Store("corrupt".into()), 500, "store_error"),
            (
                token_broker::Error::Unavailable("timed out".into()),
                503,
                "store_unavailable",
            ),
        ];
        for (err, status, kind) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status().as_u16(), status, "{kind}");
            assert_eq!(api.kind(), kind);
        }
        assert!(!ApiError::from(token_broker::Error::InvalidKey).is_upstream());
    }

    #[test]
    fn domain_outcomes_are_distinct() {
        let nothing = ApiError::from(music_api::Error::NothingPlaying);
        let not_playlist = ApiError::from(music_api::Error::NotFromPlaylist);
        let forbidden = ApiError::from(music_api::Error::Forbidden {
            playlist_id: "p1".into(),
        });
        assert_eq!(nothing.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_playlist.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert!(!forbidden.is_upstream());
    }

    #[test]
    fn upstream_timeout_is_gateway_timeout() {
        let api = ApiError::from(music_api::Error::Network {
            operation: "now playing",
            message: "timed out".into(),
            timed_out: true,
        });
        assert_eq!(api.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(api.kind(), "upstream_timeout");
        assert!(api.is_upstream());

        let api = ApiError::from(music_api::Error::Upstream {
            operation: "playlist lookup",
            status: 500,
            body: String::new(),
        });
        assert_eq!(api.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(api.kind(), "upstream_error");
    }

    #[tokio::test]
    async fn rendered_body_has_type_message_and_request_id() {
        let response = ApiError::missing_api_key().render(Some("req_abc"));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "missing_api_key");
        assert_eq!(body["error"]["request_id"], "req_abc");
        assert!(body["error"]["message"].as_str().unwrap().contains("X-API-Key"));
    }

    #[test]
    fn into_response_stashes_error_for_middleware() {
        let response = ApiError::invalid_request("missing playlist_id").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let stashed = response.extensions().get::<ApiError>().unwrap();
        assert_eq!(stashed.kind(), "invalid_request");
    }
}
