//! Durable job store for medrisk.
//!
//! Provides the `JobStore` trait with PostgreSQL and in-memory
//! implementations, plus the background writer that persists job snapshots
//! without blocking submission or processing.

pub mod config;
pub mod error;
pub mod memory;
pub mod store;
pub mod writer;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryJobStore;
pub use store::{JobStore, JobSummary, PgJobStore, StoreStats};
pub use writer::{StoreWriter, WriterHandle};

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a new database connection pool.
///
/// The pool is strictly bounded at `config.pool_size` connections; when all
/// of them are busy, `acquire` waits for a release instead of opening more.
pub async fn create_pool(config: &StoreConfig) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .connect_with(config.connect_options())
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
