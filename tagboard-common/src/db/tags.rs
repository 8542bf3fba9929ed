//! Tag and image-tag persistence
//!
//! Tag names stored here only ever come from the normalizer; nothing in this
//! module validates text, it just guarantees uniqueness and race-safety.

use crate::Result;
use sqlx::{PgExecutor, PgPool, Row};

/// A normalized single-token tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// A tag attached to an image, for detail-page display.
#[derive(Debug, Clone)]
pub struct ImageTag {
    pub name: String,
    /// Display-only signal; never an input to ranking.
    pub confidence: f64,
}

/// Insert a tag, or read back the existing row on a name collision.
///
/// Safe under concurrent callers: when two processes insert the same new name
/// simultaneously, the loser's insert is a no-op and the follow-up select
/// returns the winner's row.
pub async fn get_or_create_tag(pool: &PgPool, name: &str) -> Result<Tag> {
    let inserted: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO tags (name) VALUES ($1)
        ON CONFLICT (name) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    let id = match inserted {
        Some(id) => id,
        None => {
            sqlx::query_scalar("SELECT id FROM tags WHERE name = $1")
                .bind(name)
                .fetch_one(pool)
                .await?
        }
    };

    Ok(Tag {
        id,
        name: name.to_string(),
    })
}

/// Exact-name lookup of query tokens. Tokens with no corresponding tag are
/// simply absent from the result.
pub async fn resolve_tag_ids(pool: &PgPool, names: &[String]) -> Result<Vec<i64>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM tags WHERE name = ANY($1)")
        .bind(names)
        .fetch_all(pool)
        .await?;

    Ok(ids)
}

/// Attach a tag to an image. Re-insertion of an existing pair is a silent
/// no-op; the stored confidence of the first write wins.
pub async fn upsert_image_tag(
    exec: impl PgExecutor<'_>,
    image_id: i64,
    tag_id: i64,
    confidence: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO image_tags (image_id, tag_id, confidence)
        VALUES ($1, $2, $3)
        ON CONFLICT (image_id, tag_id) DO NOTHING
        "#,
    )
    .bind(image_id)
    .bind(tag_id)
    .bind(confidence)
    .execute(exec)
    .await?;

    Ok(())
}

/// Tags held by one image, ordered for stable detail-page display.
pub async fn image_tags_for(pool: &PgPool, image_id: i64) -> Result<Vec<ImageTag>> {
    let rows = sqlx::query(
        r#"
        SELECT t.name, it.confidence
        FROM image_tags it
        JOIN tags t ON t.id = it.tag_id
        WHERE it.image_id = $1
        ORDER BY it.confidence DESC, t.name ASC
        "#,
    )
    .bind(image_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ImageTag {
            name: row.get("name"),
            confidence: row.get("confidence"),
        })
        .collect())
}

/// Moderation backfill: delete a tag outright (e.g. a stopword that slipped
/// into the corpus before the stopword set grew). Join rows cascade.
pub async fn delete_tag_by_name(pool: &PgPool, name: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tags WHERE name = $1")
        .bind(name)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
