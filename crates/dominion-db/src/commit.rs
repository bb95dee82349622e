//! Transactional batch commit.
//!
//! One aggregation batch (a feed page, a webhook event, a manual entry)
//! lands in a single transaction: activities are inserted if absent and only
//! the winners' visits are folded into one additive upsert per (cell, user).

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tracing::{debug, warn};

use dominion_core::{BatchCommitter, CommitReceipt, Error, InfluenceKey, PendingBatch, Result};

use crate::activities::INSERT_IF_ABSENT_SQL;
use crate::influence::UPSERT_INCREMENT_SQL;

/// PostgreSQL implementation of BatchCommitter.
#[derive(Clone)]
pub struct PgBatchCommitter {
    pool: Pool<Postgres>,
}

impl PgBatchCommitter {
    /// Create a new PgBatchCommitter with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BatchCommitter for PgBatchCommitter {
    async fn commit(&self, batch: PendingBatch) -> Result<CommitReceipt> {
        let mut receipt = CommitReceipt::default();
        if batch.is_empty() {
            return Ok(receipt);
        }

        let start = Instant::now();
        let batch_len = batch.len();
        let mut deltas: HashMap<InfluenceKey, f64> = HashMap::new();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        for pending in batch.activities {
            let activity = &pending.activity;
            let inserted = sqlx::query(INSERT_IF_ABSENT_SQL)
                .bind(activity.id)
                .bind(activity.user_id)
                .bind(activity.external_id)
                .bind(&activity.polyline)
                .bind(activity.created_at)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?
                .rows_affected()
                == 1;

            if !inserted {
                warn!(
                    subsystem = "db",
                    component = "commit",
                    activity_id = %activity.id,
                    external_id = ?activity.external_id,
                    "Activity inserted concurrently, dropping its influence"
                );
                receipt.duplicates.push(activity.id);
                continue;
            }

            receipt.committed.push(activity.id);
            for visit in pending.visits {
                *deltas
                    .entry(InfluenceKey::new(visit.cell_id, activity.user_id))
                    .or_insert(0.0) += f64::from(visit.count);
            }
        }

        for (key, amount) in &deltas {
            sqlx::query(UPSERT_INCREMENT_SQL)
                .bind(key.cell_id.as_str())
                .bind(key.user_id)
                .bind(*amount)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
        }
        receipt.entries_written = deltas.len();

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "commit",
            op = "commit",
            batch_len,
            committed = receipt.committed.len(),
            duplicates = receipt.duplicates.len(),
            entries_written = receipt.entries_written,
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch committed"
        );

        Ok(receipt)
    }
}
