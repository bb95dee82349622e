//! Influence aggregation for a single activity.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use dominion_core::{
    visit_counts, Activity, ActivityStore, AggregationOutcome, BatchCommitter, CommitReceipt,
    GeoIndexer, InfluenceEntry, InfluenceKey, InfluenceLedger, PendingActivity, Result,
    SkipReason,
};

use crate::cache::WriteCache;

/// Result of recording a manual activity: the outcome plus the current
/// influence of every cell it touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualRecord {
    pub outcome: AggregationOutcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cells: Vec<InfluenceEntry>,
}

/// Turns one activity into staged influence increments.
///
/// Holds no state of its own. Everything an aggregation produces goes into
/// the caller's [`WriteCache`] and reaches the stores only through
/// [`InfluenceAggregator::commit`].
#[derive(Clone)]
pub struct InfluenceAggregator {
    activities: Arc<dyn ActivityStore>,
    ledger: Arc<dyn InfluenceLedger>,
    committer: Arc<dyn BatchCommitter>,
    indexer: Arc<dyn GeoIndexer>,
}

impl InfluenceAggregator {
    pub fn new(
        activities: Arc<dyn ActivityStore>,
        ledger: Arc<dyn InfluenceLedger>,
        committer: Arc<dyn BatchCommitter>,
        indexer: Arc<dyn GeoIndexer>,
    ) -> Self {
        Self {
            activities,
            ledger,
            committer,
            indexer,
        }
    }

    pub fn activities(&self) -> &dyn ActivityStore {
        self.activities.as_ref()
    }

    pub fn ledger(&self) -> &dyn InfluenceLedger {
        self.ledger.as_ref()
    }

    pub fn indexer(&self) -> &dyn GeoIndexer {
        self.indexer.as_ref()
    }

    /// Aggregate one activity into `cache`.
    ///
    /// Order of checks: duplicate external id (staged in this batch or
    /// already stored), then missing geo-trace, then decoding. A decode
    /// failure returns [`dominion_core::Error::Decode`] before anything is
    /// staged, so a failed activity leaves no trace in the batch.
    pub async fn aggregate(
        &self,
        user_id: Uuid,
        external_id: Option<i64>,
        polyline: Option<&str>,
        cache: &mut WriteCache,
    ) -> Result<AggregationOutcome> {
        if let Some(ext) = external_id {
            if cache.contains_external(ext) || self.activities.exists(ext).await? {
                debug!(
                    subsystem = "engine",
                    component = "aggregator",
                    user_id = %user_id,
                    external_id = ext,
                    skip_reason = SkipReason::Duplicate.as_str(),
                    "Activity already imported"
                );
                return Ok(AggregationOutcome::Skipped {
                    reason: SkipReason::Duplicate,
                });
            }
        }

        let polyline = match polyline.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => p,
            None => return Ok(no_geodata(user_id, external_id)),
        };

        let cells = self.indexer.index(polyline)?;
        if cells.is_empty() {
            return Ok(no_geodata(user_id, external_id));
        }
        let visits = visit_counts(&cells);

        for visit in &visits {
            let key = InfluenceKey::new(visit.cell_id.clone(), user_id);
            cache
                .increment(self.ledger.as_ref(), &key, f64::from(visit.count))
                .await?;
        }

        let activity = Activity::new(user_id, external_id, polyline);
        let outcome = AggregationOutcome::Imported {
            activity_id: activity.id,
            cells_affected: visits.len(),
        };
        debug!(
            subsystem = "engine",
            component = "aggregator",
            op = "aggregate",
            user_id = %user_id,
            activity_id = %activity.id,
            external_id = ?external_id,
            sample_count = cells.len(),
            cell_count = visits.len(),
            "Activity staged"
        );
        cache.stage(PendingActivity { activity, visits });
        Ok(outcome)
    }

    /// Current score of (cell, user) as seen from inside a batch.
    pub async fn lookup(&self, key: &InfluenceKey, cache: &mut WriteCache) -> Result<f64> {
        cache.lookup(self.ledger.as_ref(), key).await
    }

    /// Commit everything staged in `cache` as one batch.
    pub async fn commit(&self, cache: &mut WriteCache) -> Result<CommitReceipt> {
        let batch = cache.take_batch();
        if batch.is_empty() {
            return Ok(CommitReceipt::default());
        }
        self.committer.commit(batch).await
    }

    /// Aggregate a user-entered activity and commit it immediately.
    ///
    /// Manual activities carry no external id and are never deduplicated.
    pub async fn record_manual(&self, user_id: Uuid, polyline: &str) -> Result<ManualRecord> {
        let start = Instant::now();
        let mut cache = WriteCache::new();
        let outcome = self
            .aggregate(user_id, None, Some(polyline), &mut cache)
            .await?;

        let mut touched = Vec::new();
        if outcome.is_imported() {
            let batch = cache.take_batch();
            touched = batch
                .activities
                .iter()
                .flat_map(|p| p.visits.iter().map(|v| v.cell_id.clone()))
                .collect::<Vec<_>>();
            self.committer.commit(batch).await?;
        }

        let mut cells = Vec::with_capacity(touched.len());
        for cell_id in &touched {
            if let Some(entry) = self.ledger.get(cell_id, user_id).await? {
                cells.push(entry);
            }
        }

        info!(
            subsystem = "engine",
            component = "aggregator",
            op = "record_manual",
            user_id = %user_id,
            cell_count = cells.len(),
            success = outcome.is_imported(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Manual activity recorded"
        );
        Ok(ManualRecord { outcome, cells })
    }
}

fn no_geodata(user_id: Uuid, external_id: Option<i64>) -> AggregationOutcome {
    debug!(
        subsystem = "engine",
        component = "aggregator",
        user_id = %user_id,
        external_id = ?external_id,
        skip_reason = SkipReason::NoGeoData.as_str(),
        "Activity has no geo-trace"
    );
    AggregationOutcome::Skipped {
        reason: SkipReason::NoGeoData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dominion_core::memory::InMemoryStore;
    use dominion_core::{CellId, DecodeError, Error, H3Indexer};

    /// Indexer with canned cell sequences per polyline.
    struct ScriptedIndexer;

    impl GeoIndexer for ScriptedIndexer {
        fn index(&self, polyline: &str) -> std::result::Result<Vec<CellId>, DecodeError> {
            let cells: &[&str] = match polyline {
                "loop" => &["A", "A", "B", "A"],
                "twice-a" => &["A", "A"],
                "a3-b1" => &["A", "B", "A", "A"],
                "nowhere" => &[],
                other => return Err(DecodeError::InvalidPolyline(other.to_string())),
            };
            Ok(cells.iter().map(|c| CellId::new(*c)).collect())
        }

        fn resolution(&self) -> u8 {
            9
        }
    }

    fn aggregator(store: &InMemoryStore) -> InfluenceAggregator {
        let shared = Arc::new(store.clone());
        InfluenceAggregator::new(
            shared.clone(),
            shared.clone(),
            shared,
            Arc::new(ScriptedIndexer),
        )
    }

    async fn run_one(
        agg: &InfluenceAggregator,
        user: Uuid,
        external_id: Option<i64>,
        polyline: &str,
    ) -> AggregationOutcome {
        let mut cache = WriteCache::new();
        let outcome = agg
            .aggregate(user, external_id, Some(polyline), &mut cache)
            .await
            .unwrap();
        agg.commit(&mut cache).await.unwrap();
        outcome
    }

    #[tokio::test]
    async fn test_visit_counts_become_increments() {
        let store = InMemoryStore::new();
        let agg = aggregator(&store);
        let user = Uuid::new_v4();

        let outcome = run_one(&agg, user, Some(1), "loop").await;
        assert!(matches!(
            outcome,
            AggregationOutcome::Imported {
                cells_affected: 2,
                ..
            }
        ));

        let ledger = store.influence_map(user).await;
        assert_eq!(ledger.get("A"), Some(&3.0));
        assert_eq!(ledger.get("B"), Some(&1.0));
    }

    #[tokio::test]
    async fn test_same_external_id_twice_is_idempotent() {
        let store = InMemoryStore::new();
        let agg = aggregator(&store);
        let user = Uuid::new_v4();

        run_one(&agg, user, Some(10), "loop").await;
        let after_first = store.influence_map(user).await;

        let second = run_one(&agg, user, Some(10), "loop").await;
        assert_eq!(
            second,
            AggregationOutcome::Skipped {
                reason: SkipReason::Duplicate
            }
        );
        assert_eq!(store.influence_map(user).await, after_first);
        assert_eq!(store.activity_count().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_within_one_batch() {
        let store = InMemoryStore::new();
        let agg = aggregator(&store);
        let user = Uuid::new_v4();

        let mut cache = WriteCache::new();
        let first = agg
            .aggregate(user, Some(3), Some("loop"), &mut cache)
            .await
            .unwrap();
        let second = agg
            .aggregate(user, Some(3), Some("loop"), &mut cache)
            .await
            .unwrap();
        assert!(first.is_imported());
        assert!(!second.is_imported());
        assert_eq!(cache.pending_activities(), 1);
    }

    #[tokio::test]
    async fn test_no_geodata_writes_nothing() {
        let store = InMemoryStore::new();
        let agg = aggregator(&store);
        let user = Uuid::new_v4();

        for polyline in [None, Some(""), Some("   "), Some("nowhere")] {
            let mut cache = WriteCache::new();
            let outcome = agg
                .aggregate(user, Some(5), polyline, &mut cache)
                .await
                .unwrap();
            assert_eq!(
                outcome,
                AggregationOutcome::Skipped {
                    reason: SkipReason::NoGeoData
                }
            );
            agg.commit(&mut cache).await.unwrap();
        }

        assert_eq!(store.activity_count().await, 0);
        assert!(store.influence_map(user).await.is_empty());
    }

    #[tokio::test]
    async fn test_decode_failure_stages_nothing() {
        let store = InMemoryStore::new();
        let agg = aggregator(&store);
        let user = Uuid::new_v4();

        let mut cache = WriteCache::new();
        let err = agg
            .aggregate(user, Some(9), Some("garbage"), &mut cache)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert!(cache.is_empty());
        assert_eq!(
            cache.peek(&InfluenceKey::new(CellId::new("A"), user)),
            None
        );
    }

    #[tokio::test]
    async fn test_distinct_activities_add_up() {
        let store = InMemoryStore::new();
        let agg = aggregator(&store);
        let user = Uuid::new_v4();

        run_one(&agg, user, Some(1), "twice-a").await;
        run_one(&agg, user, Some(2), "a3-b1").await;

        let ledger = store.influence_map(user).await;
        assert_eq!(ledger.get("A"), Some(&5.0));
        assert_eq!(ledger.get("B"), Some(&1.0));
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let store = InMemoryStore::new();
        let agg = aggregator(&store);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        run_one(&agg, alice, Some(1), "loop").await;
        run_one(&agg, bob, Some(2), "twice-a").await;

        assert_eq!(store.influence_map(alice).await.get("A"), Some(&3.0));
        assert_eq!(store.influence_map(bob).await.get("A"), Some(&2.0));
        assert_eq!(store.influence_map(bob).await.get("B"), None);
    }

    #[tokio::test]
    async fn test_later_activity_sees_cached_increment() {
        let store = InMemoryStore::new();
        let agg = aggregator(&store);
        let user = Uuid::new_v4();
        store
            .upsert_increment(&CellId::new("A"), user, 10.0)
            .await
            .unwrap();

        let mut cache = WriteCache::new();
        agg.aggregate(user, Some(1), Some("twice-a"), &mut cache)
            .await
            .unwrap();
        let key = InfluenceKey::new(CellId::new("A"), user);
        assert_eq!(agg.lookup(&key, &mut cache).await.unwrap(), 12.0);

        agg.aggregate(user, Some(2), Some("a3-b1"), &mut cache)
            .await
            .unwrap();
        assert_eq!(agg.lookup(&key, &mut cache).await.unwrap(), 15.0);

        // Nothing flushed yet
        assert_eq!(store.influence_map(user).await.get("A"), Some(&10.0));

        agg.commit(&mut cache).await.unwrap();
        assert_eq!(store.influence_map(user).await.get("A"), Some(&15.0));
    }

    #[tokio::test]
    async fn test_manual_activities_always_proceed() {
        let store = InMemoryStore::new();
        let agg = aggregator(&store);
        let user = Uuid::new_v4();

        let first = agg.record_manual(user, "loop").await.unwrap();
        let second = agg.record_manual(user, "loop").await.unwrap();

        assert!(first.outcome.is_imported());
        assert!(second.outcome.is_imported());
        assert_eq!(store.activity_count().await, 2);

        let a = second
            .cells
            .iter()
            .find(|e| e.cell_id.as_str() == "A")
            .unwrap();
        assert_eq!(a.influence, 6.0);
        assert_eq!(second.cells.len(), 2);
    }

    #[tokio::test]
    async fn test_real_indexer_loiter_counts_samples() {
        let store = InMemoryStore::new();
        let shared = Arc::new(store.clone());
        let agg = InfluenceAggregator::new(
            shared.clone(),
            shared.clone(),
            shared,
            Arc::new(H3Indexer::default()),
        );
        let user = Uuid::new_v4();

        // Four samples at the same point
        let record = agg.record_manual(user, "_p~iF~ps|U??????").await.unwrap();
        assert_eq!(record.cells.len(), 1);
        assert_eq!(record.cells[0].influence, 4.0);
    }
}
