//! Shared types for the playlist-actions workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::{Secret, redact};
