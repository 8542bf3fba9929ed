//! Tag-overlap search engine
//!
//! Ranking is pure overlap: an indexed image is eligible when it holds at
//! least one of the query's tags, and it ranks by how many distinct query
//! tags it holds. No stemming, no synonyms, no fuzzy matching, and stored
//! confidences never participate. Identical query against identical corpus
//! state yields identical ordering, always — the ORDER BY ends in `id DESC`
//! precisely so ties on (match_count, created_at) still have a total order,
//! which keyset pagination requires.

use crate::normalize::Normalizer;
use crate::storage::{Consumer, StorageResolver};
use crate::{db, Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::debug;

/// Default page size when the caller does not specify one.
pub const DEFAULT_PAGE_SIZE: u32 = 48;
/// Hard upper bound on a single page.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Opaque pagination cursor: the rank triple of the last row returned.
///
/// The next page is "rows ranking strictly after this triple" under the
/// all-descending sort. `created_at_ms` is exact because image timestamps
/// are stored at millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub match_count: i64,
    pub created_at_ms: i64,
    pub id: i64,
}

impl Cursor {
    /// Encode as an opaque URL-safe token.
    pub fn encode(&self) -> String {
        let plain = format!("v1:{}:{}:{}", self.match_count, self.created_at_ms, self.id);
        URL_SAFE_NO_PAD.encode(plain)
    }

    /// Decode a client-supplied token. Any malformation is `InvalidInput`.
    pub fn decode(token: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| Error::InvalidInput("malformed search cursor".to_string()))?;
        let plain = String::from_utf8(bytes)
            .map_err(|_| Error::InvalidInput("malformed search cursor".to_string()))?;

        let mut parts = plain.split(':');
        let (Some("v1"), Some(m), Some(ts), Some(id), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(Error::InvalidInput("malformed search cursor".to_string()));
        };

        let parse = |s: &str| {
            s.parse::<i64>()
                .map_err(|_| Error::InvalidInput("malformed search cursor".to_string()))
        };
        Ok(Cursor {
            match_count: parse(m)?,
            created_at_ms: parse(ts)?,
            id: parse(id)?,
        })
    }

    fn created_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.created_at_ms)
            .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// A search request.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub raw: String,
    /// Encoded cursor from the previous page, if any.
    pub cursor: Option<String>,
    /// Requested page size; clamped to 1..=MAX_PAGE_SIZE.
    pub limit: Option<u32>,
}

/// One ranked result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub image_id: i64,
    pub storage_key: String,
    /// Browser-consumable URL; falls back to the raw storage key when the
    /// resolver fails, so one bad key never fails the whole search.
    pub render_url: String,
    pub caption: Option<String>,
    /// Distinct query tags this image holds.
    pub match_count: i64,
    pub created_at: DateTime<Utc>,
}

/// One page of results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Eligible images for the whole query, independent of pagination.
    pub total: i64,
    pub hits: Vec<SearchHit>,
    /// Token for the next page; `None` once this page came up short.
    pub next_cursor: Option<String>,
}

fn effective_limit(requested: Option<u32>) -> u32 {
    requested.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

/// Execute a search: tokenize, resolve tags, count, rank, paginate, decorate.
///
/// Empty and garbage queries are a defined no-results case, not an error;
/// they return an empty page without touching the database.
pub async fn search(
    pool: &PgPool,
    normalizer: &Normalizer,
    resolver: &dyn StorageResolver,
    query: &SearchQuery,
) -> Result<SearchPage> {
    let tokens = normalizer.tokenize_query(&query.raw);
    if tokens.is_empty() {
        return Ok(SearchPage::default());
    }

    let tag_ids = db::tags::resolve_tag_ids(pool, &tokens).await?;
    if tag_ids.is_empty() {
        return Ok(SearchPage::default());
    }

    let cursor = query.cursor.as_deref().map(Cursor::decode).transpose()?;
    let limit = effective_limit(query.limit);

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM (
            SELECT it.image_id
            FROM image_tags it
            JOIN images i ON i.id = it.image_id
            WHERE it.tag_id = ANY($1) AND i.status = 'indexed'
            GROUP BY it.image_id
        ) AS eligible
        "#,
    )
    .bind(&tag_ids)
    .fetch_one(pool)
    .await?;

    // Keyset predicate: under ORDER BY (match_count, created_at, id) all
    // DESC, "strictly after the cursor row" is the row-wise tuple being
    // strictly less than the cursor triple.
    let rows = sqlx::query(
        r#"
        SELECT i.id, i.storage_key, i.caption, i.created_at,
               COUNT(DISTINCT it.tag_id) AS match_count
        FROM images i
        JOIN image_tags it ON it.image_id = i.id
        WHERE it.tag_id = ANY($1) AND i.status = 'indexed'
        GROUP BY i.id
        HAVING $2::BIGINT IS NULL
            OR (COUNT(DISTINCT it.tag_id), i.created_at, i.id) < ($2, $3, $4)
        ORDER BY match_count DESC, i.created_at DESC, i.id DESC
        LIMIT $5
        "#,
    )
    .bind(&tag_ids)
    .bind(cursor.map(|c| c.match_count))
    .bind(cursor.map(|c| c.created_at()))
    .bind(cursor.map(|c| c.id))
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    let mut hits = Vec::with_capacity(rows.len());
    for row in rows {
        let storage_key: String = row.get("storage_key");
        let render_url = match resolver.resolve(&storage_key, Consumer::Browser) {
            Ok(url) => url,
            Err(err) => {
                debug!("render URL resolution failed for {storage_key}: {err}");
                storage_key.clone()
            }
        };
        hits.push(SearchHit {
            image_id: row.get("id"),
            storage_key,
            render_url,
            caption: row.get("caption"),
            match_count: row.get("match_count"),
            created_at: row.get("created_at"),
        });
    }

    let next_cursor = if hits.len() == limit as usize {
        hits.last().map(|last| {
            Cursor {
                match_count: last.match_count,
                created_at_ms: last.created_at.timestamp_millis(),
                id: last.image_id,
            }
            .encode()
        })
    } else {
        None
    };

    Ok(SearchPage {
        total,
        hits,
        next_cursor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trips() {
        let c = Cursor {
            match_count: 3,
            created_at_ms: 1_724_880_000_123,
            id: 42,
        };
        assert_eq!(Cursor::decode(&c.encode()).unwrap(), c);
    }

    #[test]
    fn cursor_token_is_opaque_and_url_safe() {
        let token = Cursor {
            match_count: 1,
            created_at_ms: 0,
            id: 9,
        }
        .encode();
        assert!(!token.contains(':'));
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn cursor_decode_rejects_garbage() {
        assert!(Cursor::decode("not base64!!").is_err());
        // Valid base64, wrong payload shape.
        let bogus = URL_SAFE_NO_PAD.encode("v2:1:2:3");
        assert!(Cursor::decode(&bogus).is_err());
        let short = URL_SAFE_NO_PAD.encode("v1:1:2");
        assert!(Cursor::decode(&short).is_err());
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(effective_limit(None), DEFAULT_PAGE_SIZE);
        assert_eq!(effective_limit(Some(0)), 1);
        assert_eq!(effective_limit(Some(10_000)), MAX_PAGE_SIZE);
        assert_eq!(effective_limit(Some(7)), 7);
    }
}
