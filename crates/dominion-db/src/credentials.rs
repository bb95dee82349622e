//! Provider credential repository implementation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use dominion_core::{Credential, CredentialRepository, Error, Result};

/// PostgreSQL implementation of CredentialRepository.
#[derive(Clone)]
pub struct PgCredentialRepository {
    pool: Pool<Postgres>,
}

impl PgCredentialRepository {
    /// Create a new PgCredentialRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Credential {
        Credential {
            user_id: row.get("user_id"),
            athlete_id: row.get("athlete_id"),
            access_token: row.get("access_token"),
            refresh_token: row.get("refresh_token"),
            expires_at: row.get("expires_at"),
        }
    }
}

#[async_trait]
impl CredentialRepository for PgCredentialRepository {
    async fn get(&self, user_id: Uuid) -> Result<Option<Credential>> {
        let row = sqlx::query(
            "SELECT user_id, athlete_id, access_token, refresh_token, expires_at
             FROM provider_credential WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.as_ref().map(Self::from_row))
    }

    async fn find_by_athlete(&self, athlete_id: i64) -> Result<Option<Credential>> {
        let row = sqlx::query(
            "SELECT user_id, athlete_id, access_token, refresh_token, expires_at
             FROM provider_credential WHERE athlete_id = $1",
        )
        .bind(athlete_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.as_ref().map(Self::from_row))
    }

    async fn upsert(&self, credential: &Credential) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO provider_credential
                   (user_id, athlete_id, access_token, refresh_token, expires_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, NOW())
               ON CONFLICT (user_id) DO UPDATE SET
                   athlete_id = COALESCE(EXCLUDED.athlete_id, provider_credential.athlete_id),
                   access_token = EXCLUDED.access_token,
                   refresh_token = EXCLUDED.refresh_token,
                   expires_at = EXCLUDED.expires_at,
                   updated_at = NOW()"#,
        )
        .bind(credential.user_id)
        .bind(credential.athlete_id)
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(credential.expires_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}
