//! Ingestion entry point shared by the upload path and seed scripts
//!
//! Registration is idempotent end to end: the image insert dedupes on the
//! content hash, and the job enqueue dedupes on the image id, so re-running
//! an ingestion script or re-uploading known bytes changes nothing.

use crate::db::{self, images::NewImage};
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::info;

/// What registration did.
#[derive(Debug, Clone, Copy)]
pub struct RegisterOutcome {
    pub image_id: i64,
    /// False when the sha256 already existed (dedupe hit).
    pub created: bool,
    /// False when seeded as indexed or a job already existed.
    pub enqueued: bool,
}

/// Hex-encoded sha256 of raw image bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Content-addressed object key: `images/<sha256>.<ext>`.
pub fn object_key(sha256: &str, ext: &str) -> String {
    format!("images/{sha256}.{ext}")
}

fn is_valid_sha256(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

/// Register an image and queue it for tagging.
///
/// Seeded images (`indexed = true`) skip the queue entirely; everything else
/// gets a `pending` row plus a queued job.
pub async fn register_image(pool: &PgPool, new: &NewImage) -> Result<RegisterOutcome> {
    if !is_valid_sha256(&new.sha256) {
        return Err(Error::InvalidInput(format!(
            "sha256 must be 64 lowercase hex chars, got {:?}",
            new.sha256
        )));
    }
    if new.storage_key.is_empty() {
        return Err(Error::InvalidInput("storage_key must not be empty".to_string()));
    }

    let (image_id, created) = db::images::get_or_create_image(pool, new).await?;
    let enqueued = if new.indexed {
        false
    } else {
        db::jobs::enqueue(pool, image_id).await?
    };

    if created {
        info!(image_id, enqueued, "Registered image {}", new.sha256);
    }

    Ok(RegisterOutcome {
        image_id,
        created,
        enqueued,
    })
}

/// Pre-flight check for enqueue-time callers: how many taggings remain in
/// today's budget. Uses the same creation-day accounting as the worker gate.
pub async fn remaining_budget(pool: &PgPool, daily_cap: u32) -> Result<u32> {
    let done = db::jobs::done_count_today(pool).await?;
    Ok(u32::try_from(i64::from(daily_cap) - done).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_lowercase_64() {
        let h = sha256_hex(b"pepe");
        assert_eq!(h.len(), 64);
        assert!(is_valid_sha256(&h));
    }

    #[test]
    fn object_key_shape() {
        let h = sha256_hex(b"pepe");
        assert_eq!(object_key(&h, "png"), format!("images/{h}.png"));
    }

    #[test]
    fn sha256_validation_rejects_bad_input() {
        assert!(!is_valid_sha256("abc"));
        assert!(!is_valid_sha256(&"Z".repeat(64)));
        assert!(!is_valid_sha256(&"A".repeat(64)));
        assert!(is_valid_sha256(&"a".repeat(64)));
    }
}
