//! Image persistence and deduplication
//!
//! An image row is created once per distinct content hash and then moved
//! through its lifecycle by the tagging worker (`pending` → `indexed` or
//! `failed`) and by moderation actions. Only `indexed` rows are visible to
//! search; any row remains loadable by direct id lookup.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Row};

/// Image lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStatus {
    /// Ingested, awaiting tagging. Not searchable.
    Pending,
    /// Tagged and searchable.
    Indexed,
    /// Tagging failed or moderation unlisted it. Not searchable.
    Failed,
}

impl ImageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStatus::Pending => "pending",
            ImageStatus::Indexed => "indexed",
            ImageStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ImageStatus::Pending),
            "indexed" => Ok(ImageStatus::Indexed),
            "failed" => Ok(ImageStatus::Failed),
            other => Err(Error::Internal(format!("unknown image status: {other}"))),
        }
    }
}

/// One ingested picture.
#[derive(Debug, Clone)]
pub struct Image {
    pub id: i64,
    /// Opaque storage locator; resolved to a URL by the storage resolver.
    pub storage_key: String,
    /// Content hash (64 hex chars); the corpus-wide dedupe key.
    pub sha256: String,
    pub status: ImageStatus,
    /// Model-generated caption, persisted before tag writes so a later
    /// failure still leaves it available for debugging.
    pub caption: Option<String>,
    /// Moderation signal; mutated by user action only, never by the worker.
    pub flag_count: i32,
    pub source: Option<String>,
    pub source_ref: Option<String>,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied at ingestion time.
#[derive(Debug, Clone, Default)]
pub struct NewImage {
    pub storage_key: String,
    pub sha256: String,
    /// Seed scripts may insert directly as `indexed`; uploads use `pending`.
    pub indexed: bool,
    pub caption: Option<String>,
    pub source: Option<String>,
    pub source_ref: Option<String>,
    pub source_url: Option<String>,
}

fn row_to_image(row: &PgRow) -> Result<Image> {
    let status: String = row.get("status");
    Ok(Image {
        id: row.get("id"),
        storage_key: row.get("storage_key"),
        sha256: row.get("sha256"),
        status: ImageStatus::parse(&status)?,
        caption: row.get("caption"),
        flag_count: row.get("flag_count"),
        source: row.get("source"),
        source_ref: row.get("source_ref"),
        source_url: row.get("source_url"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

const IMAGE_COLUMNS: &str = "id, storage_key, sha256, status, caption, flag_count, \
                             source, source_ref, source_url, created_at, updated_at";

/// Insert an image, or return the existing row id on a sha256 collision.
///
/// This is the corpus's primary dedupe mechanism: content-identical uploads
/// from any source collapse to one row. Returns `(id, created)`.
pub async fn get_or_create_image(pool: &PgPool, new: &NewImage) -> Result<(i64, bool)> {
    let status = if new.indexed {
        ImageStatus::Indexed
    } else {
        ImageStatus::Pending
    };

    let inserted: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO images (storage_key, sha256, status, caption, source, source_ref, source_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (sha256) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&new.storage_key)
    .bind(&new.sha256)
    .bind(status.as_str())
    .bind(&new.caption)
    .bind(&new.source)
    .bind(&new.source_ref)
    .bind(&new.source_url)
    .fetch_optional(pool)
    .await?;

    if let Some(id) = inserted {
        return Ok((id, true));
    }

    // Lost the race (or re-ingesting known content): read the winner back.
    let existing: i64 = sqlx::query_scalar("SELECT id FROM images WHERE sha256 = $1")
        .bind(&new.sha256)
        .fetch_one(pool)
        .await?;

    Ok((existing, false))
}

/// Load by id; works for any status (direct detail lookup).
pub async fn load_image(pool: &PgPool, id: i64) -> Result<Option<Image>> {
    let row = sqlx::query(&format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_image).transpose()
}

/// Dedupe probe used by ingestion pre-flight.
pub async fn find_image_by_sha256(pool: &PgPool, sha256: &str) -> Result<Option<Image>> {
    let row = sqlx::query(&format!("SELECT {IMAGE_COLUMNS} FROM images WHERE sha256 = $1"))
        .bind(sha256)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_image).transpose()
}

/// Provenance lookup for idempotent re-ingestion and takedown requests.
pub async fn find_image_by_source(
    pool: &PgPool,
    source: &str,
    source_ref: &str,
) -> Result<Option<Image>> {
    let row = sqlx::query(&format!(
        "SELECT {IMAGE_COLUMNS} FROM images WHERE source = $1 AND source_ref = $2"
    ))
    .bind(source)
    .bind(source_ref)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_image).transpose()
}

/// Set lifecycle status. Takes an executor so the worker can pair it with a
/// job transition inside one transaction.
pub async fn set_image_status(
    exec: impl PgExecutor<'_>,
    id: i64,
    status: ImageStatus,
) -> Result<()> {
    sqlx::query("UPDATE images SET status = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(status.as_str())
        .execute(exec)
        .await?;
    Ok(())
}

/// Persist the model caption. Runs outside the tag-write transaction so the
/// caption survives a later tagging failure.
pub async fn set_image_caption(
    exec: impl PgExecutor<'_>,
    id: i64,
    caption: &str,
) -> Result<()> {
    sqlx::query("UPDATE images SET caption = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(caption)
        .execute(exec)
        .await?;
    Ok(())
}

/// Moderation: adjust the flag counter by a user action. Clamped at zero.
/// Returns the new count.
pub async fn adjust_flag_count(pool: &PgPool, id: i64, delta: i32) -> Result<i32> {
    let count: i32 = sqlx::query_scalar(
        r#"
        UPDATE images
        SET flag_count = GREATEST(flag_count + $2, 0), updated_at = now()
        WHERE id = $1
        RETURNING flag_count
        "#,
    )
    .bind(id)
    .bind(delta)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Moderation: remove an image from search results without deleting it.
pub async fn unlist_image(pool: &PgPool, id: i64) -> Result<()> {
    set_image_status(pool, id, ImageStatus::Failed).await
}

/// Takedown: delete the row; image_tags and tag_jobs rows cascade.
pub async fn delete_image(pool: &PgPool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM images WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
