//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (first login, or re-authorization)
//! 2. Token refresh (request-time, when a stored access token is stale)
//!
//! Both POST a form to the token endpoint with HTTP Basic client credentials.
//! Neither retries: a failed call is reported once and the caller decides.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::constants::TOKEN_ENDPOINT;
use crate::error::{Error, Result};

/// Response from the token endpoint for both exchange and refresh.
///
/// `refresh_token` is only present on refresh when Spotify rotates it;
/// `None` means "keep the one you have". `expires_in` is a delta in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Exchanges a refresh token for a new access token.
///
/// The token lifecycle manager depends on this trait rather than on the HTTP
/// client so the refresh path can be exercised without a network.
/// Uses `Pin<Box<dyn Future>>` so it stays usable as `Arc<dyn TokenRefresher>`.
pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>>;
}

/// Client credentials for the Spotify application.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub redirect_uri: String,
}

/// reqwest-backed token endpoint client.
#[derive(Debug, Clone)]
pub struct SpotifyTokenClient {
    http: reqwest::Client,
    credentials: ClientCredentials,
    token_endpoint: String,
    timeout: Duration,
}

impl SpotifyTokenClient {
    pub fn new(http: reqwest::Client, credentials: ClientCredentials, timeout: Duration) -> Self {
        Self {
            http,
            credentials,
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            timeout,
        }
    }

    /// Point the client at a different token endpoint (local test servers).
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }

    pub fn credentials(&self) -> &ClientCredentials {
        &self.credentials
    }

    /// Exchange an authorization code for tokens.
    ///
    /// The authorization-code grant must yield a refresh token; a response
    /// without one is rejected as invalid since it could never be renewed.
    #[instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        let token = self
            .post_form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.credentials.redirect_uri.as_str()),
            ])
            .await?;

        if token.refresh_token.as_deref().is_none_or(str::is_empty) {
            return Err(Error::InvalidResponse(
                "authorization code response carried no refresh_token".into(),
            ));
        }
        debug!(expires_in = ?token.expires_in, "authorization code exchanged");
        Ok(token)
    }

    /// Refresh an access token using a refresh token.
    #[instrument(skip_all)]
    pub async fn refresh_token(&self, refresh: &str) -> Result<TokenResponse> {
        let token = self
            .post_form(&[("grant_type", "refresh_token"), ("refresh_token", refresh)])
            .await?;
        debug!(
            rotated = token.refresh_token.is_some(),
            expires_in = ?token.expires_in,
            "access token refreshed"
        );
        Ok(token)
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .basic_auth(
                &self.credentials.client_id,
                Some(self.credentials.client_secret.expose()),
            )
            .form(form)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::UpstreamRejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<TokenResponse>(&body)
            .map_err(|e| Error::InvalidResponse(format!("{e}: {body}")))
    }
}

impl TokenRefresher for SpotifyTokenClient {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>> {
        Box::pin(self.refresh_token(refresh_token))
    }
}
