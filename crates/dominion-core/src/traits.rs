//! Core traits for dominion abstractions.
//!
//! These traits define the seams between the aggregation engine and its
//! collaborators (stores, the activity feed, the credential provider),
//! enabling pluggable backends and testability.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{CredentialError, FeedError, Result};
use crate::models::*;

// =============================================================================
// STORES
// =============================================================================

/// Persistence of raw activity records, keyed for deduplication by the
/// provider's external id.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Check whether an activity with this external id was already stored.
    async fn exists(&self, external_id: i64) -> Result<bool>;

    /// Insert an activity unconditionally.
    async fn save(&self, activity: Activity) -> Result<Activity>;

    /// Insert unless another activity holds the same external id.
    ///
    /// Returns `true` when this call inserted the row. Activities without an
    /// external id always insert.
    async fn insert_if_absent(&self, activity: &Activity) -> Result<bool>;

    /// Fetch an activity by internal id.
    async fn get(&self, id: Uuid) -> Result<Option<Activity>>;

    /// Number of activities recorded for a user.
    async fn count_for_user(&self, user_id: Uuid) -> Result<i64>;
}

/// Mapping of (cell, user) to accumulated influence.
#[async_trait]
pub trait InfluenceLedger: Send + Sync {
    /// Current entry for (cell, user), if any.
    async fn get(&self, cell_id: &CellId, user_id: Uuid) -> Result<Option<InfluenceEntry>>;

    /// Create the entry with `amount`, or add `amount` to the existing score.
    async fn upsert_increment(
        &self,
        cell_id: &CellId,
        user_id: Uuid,
        amount: f64,
    ) -> Result<InfluenceEntry>;

    /// Every entry of every user.
    async fn list_all(&self) -> Result<Vec<InfluenceEntry>>;

    /// Every entry of one user, strongest first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<InfluenceEntry>>;

    /// Territory summary for one user.
    async fn user_stats(&self, user_id: Uuid) -> Result<UserStats> {
        let entries = self.list_for_user(user_id).await?;
        Ok(UserStats::from_entries(user_id, &entries))
    }
}

/// Atomic application of one aggregation batch.
///
/// For each pending activity in order, the activity is inserted if its
/// external id is absent; only activities that were inserted contribute
/// their visits, summed per (cell, user) into one increment each. Either
/// the whole batch lands or none of it does.
#[async_trait]
pub trait BatchCommitter: Send + Sync {
    async fn commit(&self, batch: PendingBatch) -> Result<CommitReceipt>;
}

/// Storage of provider credentials.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Credential of a user, if connected.
    async fn get(&self, user_id: Uuid) -> Result<Option<Credential>>;

    /// Credential whose provider athlete id is `athlete_id`.
    async fn find_by_athlete(&self, athlete_id: i64) -> Result<Option<Credential>>;

    /// Insert or replace a user's credential.
    async fn upsert(&self, credential: &Credential) -> Result<()>;
}

// =============================================================================
// EXTERNAL COLLABORATORS
// =============================================================================

/// Yields a valid access credential for a user, refreshing when expired.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A credential usable right now, refreshed first if it is near expiry.
    async fn valid_credential(
        &self,
        user_id: Uuid,
    ) -> std::result::Result<Credential, CredentialError>;

    /// Refresh regardless of the recorded expiry (the feed rejected the token).
    async fn force_refresh(&self, user_id: Uuid)
        -> std::result::Result<Credential, CredentialError>;

    /// Resolve a provider athlete id to the user that connected it.
    async fn user_for_owner(
        &self,
        owner_id: i64,
    ) -> std::result::Result<Option<Uuid>, CredentialError>;
}

/// Paginated and single-item access to a user's provider activities.
#[async_trait]
pub trait ActivityFeed: Send + Sync {
    /// One page of historical activities (pages start at 1). An empty page
    /// means the history is exhausted. Records that cannot be read come back
    /// as [`FeedItem::Malformed`] rather than failing the page.
    async fn list_page(
        &self,
        credential: &Credential,
        page: u32,
        page_size: u32,
    ) -> std::result::Result<Vec<FeedItem>, FeedError>;

    /// Full detail of one activity.
    async fn get_one(
        &self,
        credential: &Credential,
        external_id: i64,
    ) -> std::result::Result<RawActivity, FeedError>;
}
