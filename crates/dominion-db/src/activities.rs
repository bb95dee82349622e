//! Activity repository implementation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use dominion_core::{Activity, ActivityStore, Error, Result};

/// Insert statement shared by the repository and the batch commit.
///
/// The partial unique index on `external_id` makes this an atomic
/// "insert if absent"; manual activities (NULL id) never conflict.
pub(crate) const INSERT_IF_ABSENT_SQL: &str = r#"
    INSERT INTO activity (id, user_id, external_id, polyline, created_at)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (external_id) WHERE external_id IS NOT NULL DO NOTHING
"#;

/// PostgreSQL implementation of ActivityStore.
#[derive(Clone)]
pub struct PgActivityRepository {
    pool: Pool<Postgres>,
}

impl PgActivityRepository {
    /// Create a new PgActivityRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Activity {
        Activity {
            id: row.get("id"),
            user_id: row.get("user_id"),
            external_id: row.get("external_id"),
            polyline: row.get("polyline"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl ActivityStore for PgActivityRepository {
    async fn exists(&self, external_id: i64) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM activity WHERE external_id = $1)")
                .bind(external_id)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(exists)
    }

    async fn save(&self, activity: Activity) -> Result<Activity> {
        sqlx::query(
            "INSERT INTO activity (id, user_id, external_id, polyline, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(activity.id)
        .bind(activity.user_id)
        .bind(activity.external_id)
        .bind(&activity.polyline)
        .bind(activity.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(activity)
    }

    async fn insert_if_absent(&self, activity: &Activity) -> Result<bool> {
        let result = sqlx::query(INSERT_IF_ABSENT_SQL)
            .bind(activity.id)
            .bind(activity.user_id)
            .bind(activity.external_id)
            .bind(&activity.polyline)
            .bind(activity.created_at)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Activity>> {
        let row = sqlx::query(
            "SELECT id, user_id, external_id, polyline, created_at FROM activity WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.as_ref().map(Self::from_row))
    }

    async fn count_for_user(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activity WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count)
    }
}
