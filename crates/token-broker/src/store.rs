//! Credential store: a string key-value map with per-key expiration
//!
//! `KvStore` is the only interface the token manager uses for persistence.
//! Two implementations ship here:
//!
//! - `FileStore` keeps the map in a JSON file. Writes go through a tokio
//!   Mutex and use temp-file + rename, so a crash never leaves a torn file
//!   and concurrent callers never clobber unrelated keys.
//! - `MemoryStore` keeps the map in process memory (tests, local runs).
//!
//! Expired entries are invisible to `get`/`delete` and are pruned lazily on
//! the next write.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::record::now_millis;

/// Boxed future returned by `KvStore` methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Persistent string map with optional per-key TTL.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn KvStore>`). Implementations must be safe for concurrent use.
pub trait KvStore: Send + Sync {
    /// Value for `key`, or `None` if absent or expired.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Insert or overwrite `key`. `ttl: None` means no expiry.
    fn set<'a>(&'a self, key: &'a str, value: String, ttl: Option<Duration>)
    -> StoreFuture<'a, ()>;

    /// Remove `key`. Returns whether a live entry was removed.
    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;
}

/// One stored value. `expires_at` is unix milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<u64>,
}

impl FileEntry {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// JSON-file-backed store.
///
/// The whole map is held in memory and rewritten on every mutation, which is
/// fine for one small record per user.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<HashMap<String, FileEntry>>,
}

impl FileStore {
    /// Load the store from `path`.
    ///
    /// If the file doesn't exist, creates it as `{}` (cold start with no
    /// users). Entries that expired while the process was down are dropped.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Store(format!("reading store file: {e}")))?;
            let mut entries: HashMap<String, FileEntry> = serde_json::from_str(&contents)
                .map_err(|e| Error::Store(format!("parsing store file: {e}")))?;
            let now = now_millis();
            entries.retain(|_, entry| entry.is_live(now));
            info!(path = %path.display(), entries = entries.len(), "loaded credential store");
            entries
        } else {
            info!(path = %path.display(), "store file not found, starting empty");
            let entries = HashMap::new();
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = now_millis();
        let state = self.state.lock().await;
        state.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl KvStore for FileStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let now = now_millis();
            let state = self.state.lock().await;
            Ok(state
                .get(key)
                .filter(|entry| entry.is_live(now))
                .map(|entry| entry.value.clone()))
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Option<Duration>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let now = now_millis();
            let mut state = self.state.lock().await;
            // Memory only changes once the file write has landed.
            let mut next = state.clone();
            next.retain(|_, entry| entry.is_live(now));
            next.insert(
                key.to_string(),
                FileEntry {
                    value,
                    expires_at: ttl.map(|ttl| now + ttl.as_millis() as u64),
                },
            );
            write_atomic(&self.path, &next).await?;
            *state = next;
            debug!(key_prefix = key_namespace(key), "stored entry");
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let now = now_millis();
            let mut state = self.state.lock().await;
            if !state.contains_key(key) {
                return Ok(false);
            }
            let mut next = state.clone();
            let removed = next.remove(key);
            write_atomic(&self.path, &next).await?;
            *state = next;
            debug!(key_prefix = key_namespace(key), "deleted entry");
            Ok(removed.is_some_and(|entry| entry.is_live(now)))
        })
    }
}

/// In-process store for tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Option<Instant>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let entries = self.entries.lock().await;
            Ok(match entries.get(key) {
                Some((value, expires)) if expires.is_none_or(|at| Instant::now() < at) => {
                    Some(value.clone())
                }
                _ => None,
            })
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Option<Duration>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let expires = ttl.map(|ttl| Instant::now() + ttl);
            self.entries
                .lock()
                .await
                .insert(key.to_string(), (value, expires));
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let removed = self.entries.lock().await.remove(key);
            Ok(removed.is_some_and(|(_, expires)| expires.is_none_or(|at| Instant::now() < at)))
        })
    }
}

/// The namespace part of a key (`credential`, `owner`, ...), safe to log.
fn key_namespace(key: &str) -> &str {
    key.split_once(':').map_or(key, |(ns, _)| ns)
}

/// Write the store to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains OAuth tokens.
async fn write_atomic(path: &Path, data: &HashMap<String, FileEntry>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Store(format!("serializing store: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Store("store path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".store.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Store(format!("writing temp store file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Store(format!("setting store file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Store(format!("renaming temp store file: {e}")))?;

    debug!(path = %path.display(), "persisted store");
    Ok(())
}
