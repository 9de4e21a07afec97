//! Credential record and store key layout
//!
//! One record per issued API key, serialized as JSON under
//! `credential:<api_key>`. A secondary `owner:<owner_id>` entry maps a
//! Spotify user back to their key so re-authorization reuses it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use spotify_auth::TokenResponse;

/// One user's delegated access.
///
/// `expires_at` is a unix timestamp in milliseconds (absolute, not a delta),
/// computed as `now + lifetime` at the moment the access token was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: u64,
    /// Spotify user id of the delegating user. Never changes after creation.
    pub owner_id: String,
}

impl CredentialRecord {
    /// Build the initial record from an authorization-code grant.
    pub fn issued(
        access_token: String,
        refresh_token: String,
        owner_id: String,
        lifetime: Duration,
        now_millis: u64,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: now_millis + lifetime.as_millis() as u64,
            owner_id,
        }
    }

    /// Whether the access token can still be used at `now_millis`.
    pub fn is_fresh(&self, now_millis: u64) -> bool {
        now_millis < self.expires_at
    }

    /// The record that replaces this one after a successful refresh.
    ///
    /// Keeps `owner_id`, and keeps the refresh token unless the grant rotated
    /// it.
    pub fn refreshed(&self, grant: TokenResponse, default_lifetime: Duration, now_millis: u64) -> Self {
        let lifetime = token_lifetime(&grant, default_lifetime);
        let refresh_token = grant
            .refresh_token
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.refresh_token.clone());
        Self {
            access_token: grant.access_token,
            refresh_token,
            expires_at: now_millis + lifetime.as_millis() as u64,
            owner_id: self.owner_id.clone(),
        }
    }
}

/// Lifetime of the access token in `grant`, falling back to `default` when
/// the endpoint omitted `expires_in` or sent 0.
pub fn token_lifetime(grant: &TokenResponse, default: Duration) -> Duration {
    grant
        .expires_in
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Store key for the credential record of `api_key`.
pub fn credential_key(api_key: &str) -> String {
    format!("credential:{api_key}")
}

/// Store key for the owner → API key index.
pub fn owner_key(owner_id: &str) -> String {
    format!("owner:{owner_id}")
}

/// Store key for a pending OAuth login `state`.
pub fn oauth_state_key(state: &str) -> String {
    format!("oauth_state:{state}")
}

/// Current wall-clock time as unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
