//! Token lifecycle manager
//!
//! Maps an API key to its credential record and hands back an access token
//! that is valid right now. Per key this is a two-state machine:
//!
//! - FRESH (`now < expires_at`): return the stored token, no side effects.
//! - STALE: refresh once, overwrite the record, return the new token. A failed
//!   refresh leaves the record as it was and surfaces `RefreshFailed`; the next
//!   call simply tries again. There is no backoff state.
//!
//! There is no per-key locking. Two requests resolving the same stale key at
//! the same time both refresh and both write; the last write wins. Both
//! results come from the same refresh token, so the loser only costs one
//! extra refresh call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::redact;
use spotify_auth::{TokenRefresher, TokenResponse};
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::record::{
    CredentialRecord, credential_key, now_millis, oauth_state_key, owner_key, token_lifetime,
};
use crate::store::KvStore;

/// How long a pending login `state` stays valid.
pub const LOGIN_STATE_TTL: Duration = Duration::from_secs(600);

/// Tunables for the token manager.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// TTL applied to `credential:<api_key>` on every write.
    pub credential_ttl: Duration,
    /// Access token lifetime assumed when the token endpoint omits it.
    pub default_token_lifetime: Duration,
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            credential_ttl: Duration::from_secs(30 * 24 * 3600),
            default_token_lifetime: Duration::from_secs(
                spotify_auth::DEFAULT_TOKEN_LIFETIME_SECS,
            ),
            store_timeout: Duration::from_secs(10),
        }
    }
}

/// Owns every read and write of credential records and the owner index.
pub struct TokenManager {
    store: Arc<dyn KvStore>,
    refresher: Arc<dyn TokenRefresher>,
    settings: BrokerSettings,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn KvStore>,
        refresher: Arc<dyn TokenRefresher>,
        settings: BrokerSettings,
    ) -> Self {
        info!(
            credential_ttl_secs = settings.credential_ttl.as_secs(),
            "token manager initialized"
        );
        Self {
            store,
            refresher,
            settings,
        }
    }

    /// Resolve an API key to an access token that is valid now.
    ///
    /// The caller rejects empty keys before calling.
    #[instrument(skip_all, fields(api_key = %redact(api_key)))]
    pub async fn resolve(&self, api_key: &str) -> Result<String> {
        let record = self.load(api_key).await?.ok_or(Error::InvalidKey)?;

        let now = now_millis();
        if record.is_fresh(now) {
            debug!("access token fresh");
            return Ok(record.access_token);
        }

        debug!(
            stale_for_ms = now.saturating_sub(record.expires_at),
            "access token stale, refreshing"
        );
        let grant = match self.refresher.refresh(&record.refresh_token).await {
            Ok(grant) => grant,
            Err(e) => {
                metrics::counter!("token_refresh_total", "outcome" => "failure").increment(1);
                warn!(owner_id = %record.owner_id, error = %e, "token refresh failed");
                return Err(Error::RefreshFailed(e));
            }
        };

        let rotated = grant.refresh_token.is_some();
        let refreshed = record.refreshed(grant, self.settings.default_token_lifetime, now_millis());
        self.save(api_key, &refreshed).await?;

        metrics::counter!("token_refresh_total", "outcome" => "success").increment(1);
        info!(owner_id = %refreshed.owner_id, rotated, "access token refreshed");
        Ok(refreshed.access_token)
    }

    /// Store the grant from a completed authorization and return the user's
    /// API key.
    ///
    /// A user who already holds a key keeps it: the record under that key is
    /// overwritten with the new tokens. Otherwise a fresh key is generated and
    /// both the record and the owner index are written.
    #[instrument(skip_all, fields(owner_id = %owner_id))]
    pub async fn issue(&self, grant: TokenResponse, owner_id: &str) -> Result<String> {
        let lifetime = token_lifetime(&grant, self.settings.default_token_lifetime);
        let refresh_token = grant
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::IncompleteGrant("no refresh token".into()))?;
        let record = CredentialRecord::issued(
            grant.access_token,
            refresh_token,
            owner_id.to_string(),
            lifetime,
            now_millis(),
        );

        let existing = self
            .bounded("read owner index", self.store.get(&owner_key(owner_id)))
            .await?
            .filter(|key| !key.is_empty());

        match existing {
            Some(api_key) => {
                self.save(&api_key, &record).await?;
                info!(api_key = %redact(&api_key), "re-authorized, reusing api key");
                Ok(api_key)
            }
            None => {
                let api_key = spotify_auth::generate_api_key();
                self.save(&api_key, &record).await?;
                self.bounded(
                    "write owner index",
                    self.store.set(&owner_key(owner_id), api_key.clone(), None),
                )
                .await?;
                info!(api_key = %redact(&api_key), "issued new api key");
                Ok(api_key)
            }
        }
    }

    /// Delete the credential record and owner index for `api_key`.
    ///
    /// Returns the owner id the key belonged to.
    #[instrument(skip_all, fields(api_key = %redact(api_key)))]
    pub async fn revoke(&self, api_key: &str) -> Result<String> {
        let record = self.load(api_key).await?.ok_or(Error::InvalidKey)?;

        self.bounded("delete credential", self.store.delete(&credential_key(api_key)))
            .await?;

        // Only drop the index if it still points at this key.
        let index_key = owner_key(&record.owner_id);
        let indexed = self.bounded("read owner index", self.store.get(&index_key)).await?;
        if indexed.as_deref() == Some(api_key) {
            self.bounded("delete owner index", self.store.delete(&index_key))
                .await?;
        }

        info!(owner_id = %record.owner_id, "api key revoked");
        Ok(record.owner_id)
    }

    /// Record a new pending login and return its `state` value.
    pub async fn begin_login(&self) -> Result<String> {
        let state = spotify_auth::generate_state();
        self.bounded(
            "write login state",
            self.store
                .set(&oauth_state_key(&state), "1".into(), Some(LOGIN_STATE_TTL)),
        )
        .await?;
        Ok(state)
    }

    /// Consume a pending login `state`. Returns false if it was unknown or
    /// expired; a state can be consumed only once.
    pub async fn consume_login_state(&self, state: &str) -> Result<bool> {
        if state.is_empty() {
            return Ok(false);
        }
        self.bounded("consume login state", self.store.delete(&oauth_state_key(state)))
            .await
    }

    async fn load(&self, api_key: &str) -> Result<Option<CredentialRecord>> {
        let raw = self
            .bounded("read credential", self.store.get(&credential_key(api_key)))
            .await?;
        raw.map(|json| {
            serde_json::from_str::<CredentialRecord>(&json)
                .map_err(|e| Error::Store(format!("corrupt credential record: {e}")))
        })
        .transpose()
    }

    async fn save(&self, api_key: &str, record: &CredentialRecord) -> Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| Error::Store(format!("serializing credential record: {e}")))?;
        self.bounded(
            "write credential",
            self.store.set(
                &credential_key(api_key),
                json,
                Some(self.settings.credential_ttl),
            ),
        )
        .await
    }

    /// Run a store call under the configured timeout.
    async fn bounded<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.settings.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout_ms = self.settings.store_timeout.as_millis() as u64, "store call timed out");
                Err(Error::Unavailable(format!(
                    "{op} timed out after {}ms",
                    self.settings.store_timeout.as_millis()
                )))
            }
        }
    }
}
