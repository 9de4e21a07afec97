//! Login redirect and locally issued identifiers
//!
//! Builds the authorization URL the user is sent to, and generates the two
//! random values this service hands out: the OAuth `state` used for CSRF
//! protection on the callback, and the API key a client presents on every
//! request afterwards.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;

use crate::constants::{AUTHORIZE_ENDPOINT, SCOPES};

/// Alphabet for API keys: upper, lower, digits.
const API_KEY_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length of an issued API key.
pub const API_KEY_LEN: usize = 32;

/// Generate a new API key: 32 characters drawn uniformly from `[A-Za-z0-9]`.
pub fn generate_api_key() -> String {
    let mut rng = rand::rng();
    (0..API_KEY_LEN)
        .map(|_| API_KEY_CHARSET[rng.random_range(0..API_KEY_CHARSET.len())] as char)
        .collect()
}

/// Generate an opaque OAuth `state` value (32 random bytes, base64url).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the full authorization URL with all required OAuth parameters.
pub fn build_authorization_url(client_id: &str, redirect_uri: &str, state: &str) -> String {
    format!(
        "{}?client_id={}&response_type=code&redirect_uri={}&scope={}&state={}",
        AUTHORIZE_ENDPOINT,
        urlencoded(client_id),
        urlencoded(redirect_uri),
        urlencoded(SCOPES),
        urlencoded(state),
    )
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
