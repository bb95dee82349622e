//! Strava client configuration.

use dominion_core::defaults::{STRAVA_API_BASE, STRAVA_OAUTH_URL, STRAVA_TIMEOUT_SECS};

/// Connection settings shared by the feed client and the token provider.
#[derive(Clone)]
pub struct StravaConfig {
    /// Base URL of the v3 REST API (no trailing slash needed).
    pub api_base: String,
    /// OAuth token endpoint used for the refresh grant.
    pub oauth_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for StravaConfig {
    fn default() -> Self {
        Self {
            api_base: STRAVA_API_BASE.to_string(),
            oauth_url: STRAVA_OAUTH_URL.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            timeout_seconds: STRAVA_TIMEOUT_SECS,
        }
    }
}

impl StravaConfig {
    /// Load from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `STRAVA_CLIENT_ID` | (empty) |
    /// | `STRAVA_CLIENT_SECRET` | (empty) |
    /// | `STRAVA_API_BASE` | `https://www.strava.com/api/v3` |
    /// | `STRAVA_OAUTH_URL` | `https://www.strava.com/oauth/token` |
    /// | `STRAVA_TIMEOUT_SECS` | `30` |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: std::env::var("STRAVA_API_BASE").unwrap_or(defaults.api_base),
            oauth_url: std::env::var("STRAVA_OAUTH_URL").unwrap_or(defaults.oauth_url),
            client_id: std::env::var("STRAVA_CLIENT_ID").unwrap_or_default(),
            client_secret: std::env::var("STRAVA_CLIENT_SECRET").unwrap_or_default(),
            timeout_seconds: std::env::var("STRAVA_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
        }
    }

    /// Point both endpoints at one server (used against mock servers).
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.api_base = base.to_string();
        self.oauth_url = format!("{}/oauth/token", base);
        self
    }

    pub fn with_client(mut self, client_id: &str, client_secret: &str) -> Self {
        self.client_id = client_id.to_string();
        self.client_secret = client_secret.to_string();
        self
    }

    pub(crate) fn api_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), endpoint)
    }

    pub(crate) fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_seconds))
            .build()
    }
}

impl std::fmt::Debug for StravaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StravaConfig")
            .field("api_base", &self.api_base)
            .field("oauth_url", &self.oauth_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}
