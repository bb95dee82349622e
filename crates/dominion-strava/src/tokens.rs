//! OAuth token provider backed by a credential repository.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};
use uuid::Uuid;

use dominion_core::defaults::TOKEN_REFRESH_MARGIN_SECS;
use dominion_core::{Credential, CredentialError, CredentialRepository, Error, Result, TokenProvider};

use crate::config::StravaConfig;
use crate::types::TokenResponse;

/// Hands out valid Strava credentials, running the refresh grant when the
/// stored token is within [`TOKEN_REFRESH_MARGIN_SECS`] of expiry.
pub struct StravaTokenProvider<R> {
    client: Client,
    config: StravaConfig,
    repository: R,
    margin_secs: i64,
}

impl<R: CredentialRepository> StravaTokenProvider<R> {
    pub fn new(config: StravaConfig, repository: R) -> Result<Self> {
        let client = config
            .http_client()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config,
            repository,
            margin_secs: TOKEN_REFRESH_MARGIN_SECS,
        })
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    async fn stored(&self, user_id: Uuid) -> std::result::Result<Credential, CredentialError> {
        self.repository
            .get(user_id)
            .await
            .map_err(|e| CredentialError::Store(e.to_string()))?
            .ok_or_else(|| CredentialError::NotConnected(user_id.to_string()))
    }

    /// Exchange the refresh token and persist the new pair.
    async fn refresh(
        &self,
        current: Credential,
    ) -> std::result::Result<Credential, CredentialError> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", current.refresh_token.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.oauth_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CredentialError::RefreshFailed(e.to_string()))?;
        let status = response.status();
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::RefreshFailed(e.to_string()))?;

        let access_token = match body.access_token {
            Some(token) if status.is_success() => token,
            _ => {
                let reason = body
                    .message
                    .unwrap_or_else(|| format!("no access token (status {})", status.as_u16()));
                warn!(
                    subsystem = "strava",
                    component = "tokens",
                    op = "refresh",
                    user_id = %current.user_id,
                    error = %reason,
                    "Token refresh rejected"
                );
                return Err(CredentialError::RefreshFailed(reason));
            }
        };

        let refreshed = Credential {
            access_token,
            refresh_token: body.refresh_token.unwrap_or(current.refresh_token),
            expires_at: body.expires_at.unwrap_or(current.expires_at),
            ..current
        };
        self.repository
            .upsert(&refreshed)
            .await
            .map_err(|e| CredentialError::Store(e.to_string()))?;

        info!(
            subsystem = "strava",
            component = "tokens",
            op = "refresh",
            user_id = %refreshed.user_id,
            expires_at = refreshed.expires_at,
            "Access token refreshed"
        );
        Ok(refreshed)
    }
}

#[async_trait]
impl<R: CredentialRepository> TokenProvider for StravaTokenProvider<R> {
    async fn valid_credential(
        &self,
        user_id: Uuid,
    ) -> std::result::Result<Credential, CredentialError> {
        let credential = self.stored(user_id).await?;
        let now = chrono::Utc::now().timestamp();
        if credential.needs_refresh(now, self.margin_secs) {
            debug!(
                subsystem = "strava",
                component = "tokens",
                user_id = %user_id,
                expires_at = credential.expires_at,
                "Stored token near expiry"
            );
            return self.refresh(credential).await;
        }
        Ok(credential)
    }

    async fn force_refresh(
        &self,
        user_id: Uuid,
    ) -> std::result::Result<Credential, CredentialError> {
        let credential = self.stored(user_id).await?;
        self.refresh(credential).await
    }

    async fn user_for_owner(
        &self,
        owner_id: i64,
    ) -> std::result::Result<Option<Uuid>, CredentialError> {
        let found = self
            .repository
            .find_by_athlete(owner_id)
            .await
            .map_err(|e| CredentialError::Store(e.to_string()))?;
        Ok(found.map(|c| c.user_id))
    }
}
