//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The Spotify client secret is loaded from SPOTIFY_CLIENT_SECRET or
//! client_secret_file, never stored in the TOML directly.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use token_broker::BrokerSettings;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Inbound HTTP settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Externally reachable base URL, used in redirects and the setup page.
    pub public_url: String,
    /// Budget for every outbound call (Spotify and store).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Spotify application credentials
#[derive(Debug, Deserialize)]
pub struct SpotifyConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to SPOTIFY_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
}

/// Credential store settings
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_credential_ttl_days")]
    pub credential_ttl_days: u64,
    #[serde(default = "default_token_lifetime")]
    pub default_token_lifetime_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            credential_ttl_days: default_credential_ttl_days(),
            default_token_lifetime_secs: default_token_lifetime(),
        }
    }
}

fn default_timeout() -> u64 {
    10
}

fn default_max_connections() -> usize {
    1000
}

fn default_store_path() -> PathBuf {
    PathBuf::from("playlist-actions-store.json")
}

/// Upper bounds for the store lifetimes; larger values overflow the
/// millisecond expiry arithmetic.
const MAX_CREDENTIAL_TTL_DAYS: u64 = 3650;
const MAX_TOKEN_LIFETIME_SECS: u64 = 86_400;

fn default_credential_ttl_days() -> u64 {
    30
}

fn default_token_lifetime() -> u64 {
    spotify_auth::DEFAULT_TOKEN_LIFETIME_SECS
}

fn require_http_url(name: &str, value: &str) -> common::Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{name} must start with http:// or https://, got: {value}"
        )))
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. SPOTIFY_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(id) = std::env::var("SPOTIFY_CLIENT_ID") {
            config.spotify.client_id = id;
        }
        if let Ok(uri) = std::env::var("REDIRECT_URI") {
            config.spotify.redirect_uri = uri;
        }

        if let Ok(secret) = std::env::var("SPOTIFY_CLIENT_SECRET") {
            config.spotify.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.spotify.client_secret_file {
            config.spotify.client_secret = Secret::from_file(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.spotify.client_id.trim().is_empty() {
            return Err(common::Error::MissingSetting("spotify.client_id"));
        }
        if self.spotify.client_secret.is_none() {
            return Err(common::Error::MissingSetting(
                "SPOTIFY_CLIENT_SECRET or spotify.client_secret_file",
            ));
        }
        require_http_url("spotify.redirect_uri", &self.spotify.redirect_uri)?;
        require_http_url("server.public_url", &self.server.public_url)?;

        if self.server.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if !(1..=MAX_CREDENTIAL_TTL_DAYS).contains(&self.store.credential_ttl_days) {
            return Err(common::Error::Config(format!(
                "credential_ttl_days must be between 1 and {MAX_CREDENTIAL_TTL_DAYS}"
            )));
        }
        if !(1..=MAX_TOKEN_LIFETIME_SECS).contains(&self.store.default_token_lifetime_secs) {
            return Err(common::Error::Config(format!(
                "default_token_lifetime_secs must be between 1 and {MAX_TOKEN_LIFETIME_SECS}"
            )));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("playlist-actions.toml")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_secs)
    }

    pub fn broker_settings(&self) -> BrokerSettings {
        BrokerSettings {
            credential_ttl: Duration::from_secs(self.store.credential_ttl_days * 24 * 3600),
            default_token_lifetime: Duration::from_secs(self.store.default_token_lifetime_secs),
            store_timeout: self.timeout(),
        }
    }
}
