//! Influence ledger implementation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use dominion_core::{CellId, Error, InfluenceEntry, InfluenceLedger, Result};

/// Additive upsert shared by the ledger and the batch commit.
pub(crate) const UPSERT_INCREMENT_SQL: &str = r#"
    INSERT INTO territory_influence (cell_id, user_id, influence, updated_at)
    VALUES ($1, $2, $3, NOW())
    ON CONFLICT (cell_id, user_id)
    DO UPDATE SET influence = territory_influence.influence + EXCLUDED.influence,
                  updated_at = NOW()
    RETURNING cell_id, user_id, influence
"#;

/// PostgreSQL implementation of InfluenceLedger.
#[derive(Clone)]
pub struct PgInfluenceLedger {
    pool: Pool<Postgres>,
}

impl PgInfluenceLedger {
    /// Create a new PgInfluenceLedger with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

pub(crate) fn entry_from_row(row: &PgRow) -> InfluenceEntry {
    InfluenceEntry {
        cell_id: CellId::new(row.get::<String, _>("cell_id")),
        user_id: row.get("user_id"),
        influence: row.get("influence"),
    }
}

#[async_trait]
impl InfluenceLedger for PgInfluenceLedger {
    async fn get(&self, cell_id: &CellId, user_id: Uuid) -> Result<Option<InfluenceEntry>> {
        let row = sqlx::query(
            "SELECT cell_id, user_id, influence FROM territory_influence
             WHERE cell_id = $1 AND user_id = $2",
        )
        .bind(cell_id.as_str())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.as_ref().map(entry_from_row))
    }

    async fn upsert_increment(
        &self,
        cell_id: &CellId,
        user_id: Uuid,
        amount: f64,
    ) -> Result<InfluenceEntry> {
        if amount < 0.0 {
            return Err(Error::InvalidInput(format!(
                "influence increment must be non-negative, got {}",
                amount
            )));
        }
        let row = sqlx::query(UPSERT_INCREMENT_SQL)
            .bind(cell_id.as_str())
            .bind(user_id)
            .bind(amount)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(entry_from_row(&row))
    }

    async fn list_all(&self) -> Result<Vec<InfluenceEntry>> {
        let rows = sqlx::query(
            "SELECT cell_id, user_id, influence FROM territory_influence
             ORDER BY cell_id, user_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows.iter().map(entry_from_row).collect())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<InfluenceEntry>> {
        let rows = sqlx::query(
            "SELECT cell_id, user_id, influence FROM territory_influence
             WHERE user_id = $1
             ORDER BY influence DESC, cell_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows.iter().map(entry_from_row).collect())
    }
}
