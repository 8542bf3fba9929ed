//! Postgres store for tagboard
//!
//! Everything durable lives in four tables: `images`, `tags`, `image_tags`,
//! and `tag_jobs`. The uniqueness and check constraints are load-bearing —
//! multiple independent writers (worker processes, ingest scripts, the upload
//! path) hit these tables concurrently, so the invariants are enforced at the
//! storage layer and not only in application code.

pub mod images;
pub mod jobs;
pub mod migrations;
pub mod tags;

use crate::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Initialize a connection pool and bring the schema up to date.
pub async fn init_pool(database_url: &str) -> Result<PgPool> {
    tracing::debug!("Connecting to database");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    migrations::run_migrations(&pool).await?;

    Ok(pool)
}
