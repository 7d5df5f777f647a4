//! Access token handling for the DingTalk open API.

use std::time::{Duration, Instant};

use serde::Deserialize;

/// Tokens are refreshed this long before DingTalk says they expire
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Lifetime assumed when the response omits `expireIn`
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(7200);

/// Body of `POST /v1.0/oauth2/accessToken`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds
    pub expire_in: Option<u64>,
}

/// A token together with the moment it stops being usable
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub value: String,
    pub refresh_at: Instant,
}

impl CachedToken {
    pub fn from_response(response: TokenResponse) -> Self {
        let ttl = response.expire_in.map(Duration::from_secs).unwrap_or(DEFAULT_TOKEN_TTL);
        Self {
            value: response.access_token,
            refresh_at: Instant::now() + ttl.saturating_sub(REFRESH_MARGIN),
        }
    }

    pub fn is_fresh(&self) -> bool {
        Instant::now() < self.refresh_at
    }
}
