//! # dominion-db
//!
//! PostgreSQL persistence for the dominion territory engine.
//!
//! This crate provides:
//! - Connection pool management
//! - `ActivityStore` with an atomic insert-if-absent on the external id
//! - `InfluenceLedger` with additive upserts
//! - `CredentialRepository` for provider OAuth tokens
//! - `BatchCommitter` applying one aggregation batch per transaction
//!
//! ## Example
//!
//! ```rust,ignore
//! use dominion_db::{Database, InfluenceLedger};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/dominion").await?;
//!     db.migrate().await?;
//!
//!     for entry in db.influence.list_all().await? {
//!         println!("{} {} {}", entry.cell_id, entry.user_id, entry.influence);
//!     }
//!     Ok(())
//! }
//! ```
pub mod activities;
pub mod commit;
pub mod credentials;
pub mod influence;
pub mod pool;
pub mod test_fixtures;

// Re-export core types
pub use dominion_core::*;

pub use activities::PgActivityRepository;
pub use commit::PgBatchCommitter;
pub use credentials::PgCredentialRepository;
pub use influence::PgInfluenceLedger;
pub use pool::{connect_pool, log_pool_metrics, PoolConfig};

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Activity records, deduplicated by external id.
    pub activities: PgActivityRepository,
    /// Per (cell, user) influence scores.
    pub influence: PgInfluenceLedger,
    /// Provider OAuth credentials.
    pub credentials: PgCredentialRepository,
    /// Transactional batch commit.
    pub commits: PgBatchCommitter,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            activities: PgActivityRepository::new(pool.clone()),
            influence: PgInfluenceLedger::new(pool.clone()),
            credentials: PgCredentialRepository::new(pool.clone()),
            commits: PgBatchCommitter::new(pool.clone()),
            pool,
        }
    }

    /// Connect with the default pool configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default()).await
    }

    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = connect_pool(url, &config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
