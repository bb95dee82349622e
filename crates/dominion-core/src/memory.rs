//! In-memory implementations of the store traits.
//!
//! Used by the engine and API test suites and for running the server
//! without PostgreSQL. A single lock guards all tables so a batch commit is
//! atomic with respect to every other operation.
//!
//! ```rust
//! use dominion_core::memory::InMemoryStore;
//! use dominion_core::{Activity, ActivityStore};
//! use uuid::Uuid;
//!
//! # tokio_test_block(async {
//! let store = InMemoryStore::new();
//! let activity = Activity::new(Uuid::nil(), Some(42), "_p~iF~ps|U");
//! assert!(store.insert_if_absent(&activity).await.unwrap());
//! assert!(store.exists(42).await.unwrap());
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;
use crate::traits::{ActivityStore, BatchCommitter, CredentialRepository, InfluenceLedger};

#[derive(Debug, Default)]
struct Tables {
    activities: Vec<Activity>,
    by_external: HashMap<i64, Uuid>,
    // BTreeMap keeps list_all deterministic
    influence: BTreeMap<(String, Uuid), f64>,
    credentials: HashMap<Uuid, Credential>,
}

impl Tables {
    fn insert_if_absent(&mut self, activity: &Activity) -> bool {
        if let Some(external_id) = activity.external_id {
            if self.by_external.contains_key(&external_id) {
                return false;
            }
            self.by_external.insert(external_id, activity.id);
        }
        self.activities.push(activity.clone());
        true
    }

    fn increment(&mut self, cell_id: &CellId, user_id: Uuid, amount: f64) -> InfluenceEntry {
        let score = self
            .influence
            .entry((cell_id.as_str().to_string(), user_id))
            .or_insert(0.0);
        *score += amount;
        InfluenceEntry {
            cell_id: cell_id.clone(),
            user_id,
            influence: *score,
        }
    }
}

/// Shared in-memory activity store, influence ledger and credential store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored activities across all users.
    pub async fn activity_count(&self) -> usize {
        self.tables.read().await.activities.len()
    }

    /// Snapshot of one user's ledger as `cell -> influence`.
    pub async fn influence_map(&self, user_id: Uuid) -> HashMap<String, f64> {
        self.tables
            .read()
            .await
            .influence
            .iter()
            .filter(|((_, uid), _)| *uid == user_id)
            .map(|((cell, _), score)| (cell.clone(), *score))
            .collect()
    }
}

#[async_trait]
impl ActivityStore for InMemoryStore {
    async fn exists(&self, external_id: i64) -> Result<bool> {
        Ok(self.tables.read().await.by_external.contains_key(&external_id))
    }

    async fn save(&self, activity: Activity) -> Result<Activity> {
        let mut tables = self.tables.write().await;
        if let Some(external_id) = activity.external_id {
            tables.by_external.insert(external_id, activity.id);
        }
        tables.activities.push(activity.clone());
        Ok(activity)
    }

    async fn insert_if_absent(&self, activity: &Activity) -> Result<bool> {
        Ok(self.tables.write().await.insert_if_absent(activity))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Activity>> {
        Ok(self
            .tables
            .read()
            .await
            .activities
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn count_for_user(&self, user_id: Uuid) -> Result<i64> {
        Ok(self
            .tables
            .read()
            .await
            .activities
            .iter()
            .filter(|a| a.user_id == user_id)
            .count() as i64)
    }
}

#[async_trait]
impl InfluenceLedger for InMemoryStore {
    async fn get(&self, cell_id: &CellId, user_id: Uuid) -> Result<Option<InfluenceEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .influence
            .get(&(cell_id.as_str().to_string(), user_id))
            .map(|score| InfluenceEntry {
                cell_id: cell_id.clone(),
                user_id,
                influence: *score,
            }))
    }

    async fn upsert_increment(
        &self,
        cell_id: &CellId,
        user_id: Uuid,
        amount: f64,
    ) -> Result<InfluenceEntry> {
        Ok(self.tables.write().await.increment(cell_id, user_id, amount))
    }

    async fn list_all(&self) -> Result<Vec<InfluenceEntry>> {
        Ok(self
            .tables
            .read()
            .await
            .influence
            .iter()
            .map(|((cell, user_id), score)| InfluenceEntry {
                cell_id: CellId::new(cell.clone()),
                user_id: *user_id,
                influence: *score,
            })
            .collect())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<InfluenceEntry>> {
        let mut entries: Vec<InfluenceEntry> = self
            .list_all()
            .await?
            .into_iter()
            .filter(|e| e.user_id == user_id)
            .collect();
        entries.sort_by(|a, b| b.influence.total_cmp(&a.influence));
        Ok(entries)
    }
}

#[async_trait]
impl BatchCommitter for InMemoryStore {
    async fn commit(&self, batch: PendingBatch) -> Result<CommitReceipt> {
        let mut tables = self.tables.write().await;
        let mut receipt = CommitReceipt::default();
        let mut deltas: HashMap<InfluenceKey, f64> = HashMap::new();

        for pending in batch.activities {
            if !tables.insert_if_absent(&pending.activity) {
                receipt.duplicates.push(pending.activity.id);
                continue;
            }
            receipt.committed.push(pending.activity.id);
            for visit in pending.visits {
                *deltas
                    .entry(InfluenceKey::new(visit.cell_id, pending.activity.user_id))
                    .or_insert(0.0) += f64::from(visit.count);
            }
        }

        receipt.entries_written = deltas.len();
        for (key, amount) in deltas {
            tables.increment(&key.cell_id, key.user_id, amount);
        }
        Ok(receipt)
    }
}

#[async_trait]
impl CredentialRepository for InMemoryStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<Credential>> {
        Ok(self.tables.read().await.credentials.get(&user_id).cloned())
    }

    async fn find_by_athlete(&self, athlete_id: i64) -> Result<Option<Credential>> {
        Ok(self
            .tables
            .read()
            .await
            .credentials
            .values()
            .find(|c| c.athlete_id == Some(athlete_id))
            .cloned())
    }

    async fn upsert(&self, credential: &Credential) -> Result<()> {
        self.tables
            .write()
            .await
            .credentials
            .insert(credential.user_id, credential.clone());
        Ok(())
    }
}
