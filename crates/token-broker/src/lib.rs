//! API key to access token broker
//!
//! Holds one credential record per issued API key and turns a key into an
//! access token that is valid at the moment of the call, refreshing it
//! through the Spotify token endpoint when it has gone stale.
//!
//! Layers:
//! - `store`: string KV map with per-key TTL (`KvStore`, `FileStore`, `MemoryStore`)
//! - `record`: the stored JSON shape and key layout
//! - `manager`: resolve / issue / revoke and pending login state

pub mod error;
pub mod manager;
pub mod record;
pub mod store;

pub use error::{Error, Result};
pub use manager::{BrokerSettings, LOGIN_STATE_TTL, TokenManager};
pub use record::CredentialRecord;
pub use store::{FileStore, KvStore, MemoryStore, StoreFuture};
