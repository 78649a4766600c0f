pub mod error;

mod enrichment;
mod establishments;
mod reviews;
mod scores;

pub use error::{Result, StoreError};
pub use scores::StoreStats;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Postgres-backed persistence for the review pipeline. All stage boundaries
/// (raw → unified → enriched → scored) live here; each write path is an
/// independent upsert so stages can be re-run without coordination.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connect to Postgres. Connectivity failure here is fatal for the run.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migrate(e.to_string()))?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
