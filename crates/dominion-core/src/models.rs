//! Core data models for dominion.
//!
//! These types are shared across all dominion crates and represent the
//! territory domain: activities, grid cells, influence and credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// CELLS
// =============================================================================

/// Identifier of one hexagonal grid cell (H3 index in hex notation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(String);

impl CellId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<h3o::CellIndex> for CellId {
    fn from(cell: h3o::CellIndex) -> Self {
        Self(cell.to_string())
    }
}

/// A distinct cell and how many trace samples fell inside it.
///
/// Derived per activity; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellVisit {
    pub cell_id: CellId,
    pub count: u32,
}

// =============================================================================
// ACTIVITIES
// =============================================================================

/// A recorded activity with a usable geo-trace.
///
/// Immutable once created. At most one activity exists per `external_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Provider-assigned id; `None` for manually entered activities.
    pub external_id: Option<i64>,
    pub polyline: String,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    /// Build a new activity with a fresh time-ordered id.
    pub fn new(user_id: Uuid, external_id: Option<i64>, polyline: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            external_id,
            polyline: polyline.into(),
            created_at: Utc::now(),
        }
    }
}

/// Activity as delivered by the external feed.
///
/// Only the id and the summary polyline are consumed; other provider fields
/// are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawActivity {
    pub external_id: i64,
    pub polyline: Option<String>,
}

impl RawActivity {
    /// The polyline if present and non-blank.
    pub fn usable_polyline(&self) -> Option<&str> {
        self.polyline
            .as_deref()
            .filter(|p| !p.trim().is_empty())
    }
}

/// One record of a feed page.
///
/// A record the feed returned but that could not be read is kept in place so
/// the rest of the page still gets processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedItem {
    Activity(RawActivity),
    Malformed {
        /// Provider id, when it could still be read from the record.
        external_id: Option<i64>,
        error: String,
    },
}

impl From<RawActivity> for FeedItem {
    fn from(raw: RawActivity) -> Self {
        FeedItem::Activity(raw)
    }
}

// =============================================================================
// INFLUENCE
// =============================================================================

/// Composite key of the influence ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InfluenceKey {
    pub cell_id: CellId,
    pub user_id: Uuid,
}

impl InfluenceKey {
    pub fn new(cell_id: CellId, user_id: Uuid) -> Self {
        Self { cell_id, user_id }
    }
}

/// Accumulated influence of one user over one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfluenceEntry {
    pub cell_id: CellId,
    pub user_id: Uuid,
    pub influence: f64,
}

impl InfluenceEntry {
    pub fn key(&self) -> InfluenceKey {
        InfluenceKey::new(self.cell_id.clone(), self.user_id)
    }
}

/// Aggregate view of one user's territory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: Uuid,
    /// Number of cells with any influence.
    pub cells: usize,
    pub total_influence: f64,
    pub strongest_cell: Option<InfluenceEntry>,
}

impl UserStats {
    /// Summarize a user's ledger rows.
    pub fn from_entries(user_id: Uuid, entries: &[InfluenceEntry]) -> Self {
        let strongest_cell = entries
            .iter()
            .max_by(|a, b| a.influence.total_cmp(&b.influence))
            .cloned();
        Self {
            user_id,
            cells: entries.len(),
            total_influence: entries.iter().map(|e| e.influence).sum(),
            strongest_cell,
        }
    }
}

// =============================================================================
// CREDENTIALS
// =============================================================================

/// Provider OAuth credential owned by one user.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_id: Uuid,
    /// Provider athlete id, used to route webhook events to a user.
    pub athlete_id: Option<i64>,
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry as unix seconds.
    pub expires_at: i64,
}

impl Credential {
    /// Whether the token must be refreshed before use at `now` (unix seconds).
    pub fn needs_refresh(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at <= now + margin_secs
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("athlete_id", &self.athlete_id)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// =============================================================================
// AGGREGATION RESULTS
// =============================================================================

/// Why an activity produced no aggregation work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    /// The external id was already imported.
    #[serde(rename = "duplicate")]
    Duplicate,
    /// No polyline, or a polyline that maps to no cells.
    #[serde(rename = "no-geodata")]
    NoGeoData,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Duplicate => "duplicate",
            SkipReason::NoGeoData => "no-geodata",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of aggregating a single activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AggregationOutcome {
    Imported {
        activity_id: Uuid,
        /// Count of distinct cells touched.
        cells_affected: usize,
    },
    Skipped {
        reason: SkipReason,
    },
}

impl AggregationOutcome {
    pub fn is_imported(&self) -> bool {
        matches!(self, AggregationOutcome::Imported { .. })
    }
}

/// An aggregated activity awaiting the batch commit.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingActivity {
    pub activity: Activity,
    pub visits: Vec<CellVisit>,
}

/// Everything one batch will write: activities in aggregation order, each
/// with the cell visits its commit must apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingBatch {
    pub activities: Vec<PendingActivity>,
}

impl PendingBatch {
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }
}

/// What a batch commit actually persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    /// Activities inserted by this commit.
    pub committed: Vec<Uuid>,
    /// Activities whose external id was inserted by someone else first;
    /// their influence was not applied.
    pub duplicates: Vec<Uuid>,
    /// Distinct (cell, user) rows incremented.
    pub entries_written: usize,
}

// =============================================================================
// IMPORT SUMMARY
// =============================================================================

/// Tallies of one import run or event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported: u32,
    pub skipped_duplicate: u32,
    pub skipped_no_geodata: u32,
    pub failed: u32,
    pub total_seen: u32,
    /// Pages fully committed.
    pub pages: u32,
}

impl ImportSummary {
    /// Fold another summary into this one.
    pub fn absorb(&mut self, other: &ImportSummary) {
        self.imported += other.imported;
        self.skipped_duplicate += other.skipped_duplicate;
        self.skipped_no_geodata += other.skipped_no_geodata;
        self.failed += other.failed;
        self.total_seen += other.total_seen;
        self.pages += other.pages;
    }

    pub fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Duplicate => self.skipped_duplicate += 1,
            SkipReason::NoGeoData => self.skipped_no_geodata += 1,
        }
    }
}

/// A single activity that could not be aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFailure {
    /// `None` for feed records that carried no readable id.
    pub external_id: Option<i64>,
    pub error: String,
}

/// Terminal state of an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Completed,
    Failed,
}

/// Summary returned by every import run, including failed ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub user_id: Uuid,
    pub status: ImportStatus,
    pub summary: ImportSummary,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub failures: Vec<ActivityFailure>,
    /// Run-level error when `status` is `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImportReport {
    pub fn is_completed(&self) -> bool {
        self.status == ImportStatus::Completed
    }

    /// True when the run failed without committing any page.
    pub fn failed_without_commit(&self) -> bool {
        self.status == ImportStatus::Failed && self.summary.pages == 0
    }
}
