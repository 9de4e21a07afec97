//! Spotify OAuth client library
//!
//! Token exchange/refresh against the Spotify accounts service, the login
//! redirect URL, and generation of the API keys and OAuth state values this
//! service issues. No dependency on the HTTP service binary.
//!
//! Credential flow:
//! 1. `/api/login` calls `generate_state()` + `build_authorization_url()`
//! 2. User authorizes; Spotify redirects back with a code
//! 3. Callback calls `SpotifyTokenClient::exchange_code()`
//! 4. The token broker stores the grant under a key from `generate_api_key()`
//! 5. Stale access tokens are renewed through `TokenRefresher::refresh()`

pub mod authorize;
pub mod constants;
pub mod error;
pub mod token;

pub use authorize::{API_KEY_LEN, build_authorization_url, generate_api_key, generate_state};
pub use constants::*;
pub use error::{Error, Result};
pub use token::{ClientCredentials, SpotifyTokenClient, TokenRefresher, TokenResponse};
