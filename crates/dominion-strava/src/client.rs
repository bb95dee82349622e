//! Strava activity feed.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use dominion_core::{ActivityFeed, Credential, Error, FeedError, FeedItem, RawActivity, Result};

use crate::config::StravaConfig;
use crate::types::{StravaActivity, StravaFault};

/// HTTP client for the athlete activity endpoints.
#[derive(Debug, Clone)]
pub struct StravaClient {
    client: Client,
    config: StravaConfig,
}

impl StravaClient {
    pub fn new(config: StravaConfig) -> Result<Self> {
        let client = config
            .http_client()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &StravaConfig {
        &self.config
    }

    fn get(&self, endpoint: &str, credential: &Credential) -> reqwest::RequestBuilder {
        self.client
            .get(self.config.api_url(endpoint))
            .bearer_auth(&credential.access_token)
    }
}

/// Map a non-success response to the feed error taxonomy.
async fn fault(response: Response) -> FeedError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<StravaFault>(&body)
        .ok()
        .and_then(|f| f.message)
        .unwrap_or(body);

    if status == StatusCode::UNAUTHORIZED {
        FeedError::Unauthorized(message)
    } else {
        FeedError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl ActivityFeed for StravaClient {
    async fn list_page(
        &self,
        credential: &Credential,
        page: u32,
        page_size: u32,
    ) -> std::result::Result<Vec<FeedItem>, FeedError> {
        let start = Instant::now();
        let response = self
            .get("/athlete/activities", credential)
            .query(&[("per_page", page_size), ("page", page)])
            .send()
            .await?;

        if !response.status().is_success() {
            let err = fault(response).await;
            warn!(
                subsystem = "strava",
                component = "feed",
                op = "list_page",
                user_id = %credential.user_id,
                page,
                error = %err,
                "Activity page request failed"
            );
            return Err(err);
        }

        // Records are read one by one so a bad record does not sink the page
        let records: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| FeedError::Malformed(e.to_string()))?;
        let items: Vec<FeedItem> = records
            .into_iter()
            .map(StravaActivity::parse_record)
            .collect();
        let malformed = items
            .iter()
            .filter(|i| matches!(i, FeedItem::Malformed { .. }))
            .count();

        debug!(
            subsystem = "strava",
            component = "feed",
            op = "list_page",
            user_id = %credential.user_id,
            page,
            page_len = items.len(),
            malformed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Fetched activity page"
        );

        Ok(items)
    }

    async fn get_one(
        &self,
        credential: &Credential,
        external_id: i64,
    ) -> std::result::Result<RawActivity, FeedError> {
        let response = self
            .get(&format!("/activities/{}", external_id), credential)
            .send()
            .await?;

        if !response.status().is_success() {
            let err = fault(response).await;
            warn!(
                subsystem = "strava",
                component = "feed",
                op = "get_one",
                external_id,
                error = %err,
                "Activity detail request failed"
            );
            return Err(err);
        }

        let activity: StravaActivity = response
            .json()
            .await
            .map_err(|e| FeedError::Malformed(e.to_string()))?;
        Ok(activity.into())
    }
}
