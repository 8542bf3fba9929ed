//! Database schema migrations
//!
//! Versioned, idempotent migrations tracked through a `schema_version` table,
//! so databases created by older builds upgrade in place without manual
//! intervention.
//!
//! # Migration guidelines
//!
//! 1. Never modify an existing migration — it must stay stable for users
//!    upgrading from older versions.
//! 2. Always add a new migration function for each schema change and bump
//!    `CURRENT_SCHEMA_VERSION`.
//! 3. Prefer `ALTER TABLE` over DROP/CREATE to preserve data.

use crate::Result;
use sqlx::PgPool;
use tracing::info;

/// Current schema version. Increment when adding a migration.
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Get current schema version; 0 if the tracking table does not exist yet.
async fn get_schema_version(pool: &PgPool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM information_schema.tables
            WHERE table_name = 'schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &PgPool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_version (version) VALUES ($1)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current = get_schema_version(pool).await?;
    if current == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current);
        return Ok(());
    }

    info!(
        "Migrating database schema from v{} to v{}",
        current, CURRENT_SCHEMA_VERSION
    );

    if current < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 applied: core tables");
    }

    Ok(())
}

/// v1: the four core tables.
///
/// Constraint inventory (each one closes a concrete bug class):
/// - `images.sha256` UNIQUE — content-addressed dedupe across all ingest paths
/// - `images.storage_key` UNIQUE — one row per stored object
/// - `images (source, source_ref)` partial UNIQUE — idempotent re-ingestion
/// - `tags.name` UNIQUE — one row per normalized tag
/// - `image_tags` composite PK — an image cannot hold the same tag twice
/// - `image_tags.confidence` CHECK — stored confidences stay in [0,1]
/// - `tag_jobs.image_id` UNIQUE — at most one job per image, ever
async fn migrate_v1(pool: &PgPool) -> Result<()> {
    // Timestamps are TIMESTAMPTZ(3): millisecond precision makes the search
    // cursor's created_at_ms component exact rather than truncating.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS images (
            id          BIGSERIAL PRIMARY KEY,
            storage_key TEXT NOT NULL UNIQUE,
            sha256      CHAR(64) NOT NULL UNIQUE,
            status      TEXT NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'indexed', 'failed')),
            caption     TEXT,
            flag_count  INTEGER NOT NULL DEFAULT 0,
            source      TEXT,
            source_ref  TEXT,
            source_url  TEXT,
            created_at  TIMESTAMPTZ(3) NOT NULL DEFAULT now(),
            updated_at  TIMESTAMPTZ(3) NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS images_source_source_ref_key
        ON images (source, source_ref)
        WHERE source IS NOT NULL AND source_ref IS NOT NULL
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id   BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS image_tags (
            image_id   BIGINT NOT NULL REFERENCES images(id) ON DELETE CASCADE,
            tag_id     BIGINT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
            confidence DOUBLE PRECISION NOT NULL
                       CHECK (confidence >= 0.0 AND confidence <= 1.0),
            created_at TIMESTAMPTZ(3) NOT NULL DEFAULT now(),
            PRIMARY KEY (image_id, tag_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Search joins image_tags by tag, so the reverse index matters too.
    sqlx::query("CREATE INDEX IF NOT EXISTS image_tags_tag_id_idx ON image_tags (tag_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tag_jobs (
            id         BIGSERIAL PRIMARY KEY,
            image_id   BIGINT NOT NULL UNIQUE REFERENCES images(id) ON DELETE CASCADE,
            status     TEXT NOT NULL DEFAULT 'queued'
                       CHECK (status IN ('queued', 'running', 'done', 'failed')),
            attempts   INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at TIMESTAMPTZ(3) NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ(3) NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Oldest-first claim scans queued rows by creation time.
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS tag_jobs_queued_created_at_idx
        ON tag_jobs (created_at) WHERE status = 'queued'
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
