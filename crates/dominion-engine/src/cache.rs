//! Batch-scoped write cache.
//!
//! A read-through/write-back map keyed by (cell, user). The first lookup of a
//! key reads the ledger once and remembers that base score; increments are
//! held as a pending delta on top of it, so later lookups in the same batch
//! see every earlier increment without touching the store. The cache also
//! holds the batch's pending activities, which is what eventually gets
//! committed.
//!
//! A cache belongs to exactly one batch and is never shared between
//! concurrent runs.

use std::collections::{HashMap, HashSet};

use dominion_core::{InfluenceKey, InfluenceLedger, PendingActivity, PendingBatch, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct CachedScore {
    base: f64,
    delta: f64,
}

impl CachedScore {
    fn current(&self) -> f64 {
        self.base + self.delta
    }
}

#[derive(Debug, Default)]
pub struct WriteCache {
    scores: HashMap<InfluenceKey, CachedScore>,
    activities: Vec<PendingActivity>,
    external_ids: HashSet<i64>,
}

impl WriteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current score for `key`: cached base plus pending delta, reading the
    /// ledger only on the first access.
    pub async fn lookup(
        &mut self,
        ledger: &dyn InfluenceLedger,
        key: &InfluenceKey,
    ) -> Result<f64> {
        Ok(self.load(ledger, key).await?.current())
    }

    /// Add `amount` to `key` and return the new current score.
    pub async fn increment(
        &mut self,
        ledger: &dyn InfluenceLedger,
        key: &InfluenceKey,
        amount: f64,
    ) -> Result<f64> {
        let score = self.load(ledger, key).await?;
        score.delta += amount;
        Ok(score.current())
    }

    async fn load(
        &mut self,
        ledger: &dyn InfluenceLedger,
        key: &InfluenceKey,
    ) -> Result<&mut CachedScore> {
        if !self.scores.contains_key(key) {
            let base = ledger
                .get(&key.cell_id, key.user_id)
                .await?
                .map(|e| e.influence)
                .unwrap_or(0.0);
            self.scores.insert(
                key.clone(),
                CachedScore {
                    base,
                    delta: 0.0,
                },
            );
        }
        Ok(self.scores.entry(key.clone()).or_default())
    }

    /// Cached score without consulting the ledger.
    pub fn peek(&self, key: &InfluenceKey) -> Option<f64> {
        self.scores.get(key).map(CachedScore::current)
    }

    /// Pending delta of `key` (zero when untouched).
    pub fn pending_delta(&self, key: &InfluenceKey) -> f64 {
        self.scores.get(key).map(|s| s.delta).unwrap_or(0.0)
    }

    /// Whether an activity with this external id is already staged.
    pub fn contains_external(&self, external_id: i64) -> bool {
        self.external_ids.contains(&external_id)
    }

    /// Stage an aggregated activity for the next commit.
    pub fn stage(&mut self, pending: PendingActivity) {
        if let Some(external_id) = pending.activity.external_id {
            self.external_ids.insert(external_id);
        }
        self.activities.push(pending);
    }

    pub fn pending_activities(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Drain the staged activities into a batch and reset the cache.
    ///
    /// Cached bases are dropped too: once the batch is committed they are
    /// stale.
    pub fn take_batch(&mut self) -> PendingBatch {
        self.scores.clear();
        self.external_ids.clear();
        PendingBatch {
            activities: std::mem::take(&mut self.activities),
        }
    }
}
