//! Shared helpers for store integration tests.
//!
//! These tests need a live Postgres (the queue claim depends on
//! FOR UPDATE SKIP LOCKED, which nothing lighter emulates faithfully).
//! Point `TAGBOARD_TEST_DATABASE_URL` at a scratch database and run with
//! `cargo test -- --ignored --test-threads=1`; every test truncates the
//! tables it touches.

use sqlx::PgPool;
use tagboard_common::db;
use tagboard_common::db::images::NewImage;
use tagboard_common::ingest::sha256_hex;

pub async fn test_pool() -> PgPool {
    let url = std::env::var("TAGBOARD_TEST_DATABASE_URL")
        .expect("set TAGBOARD_TEST_DATABASE_URL to run store tests");
    let pool = db::init_pool(&url).await.expect("connect + migrate");
    sqlx::query("TRUNCATE images, tags, image_tags, tag_jobs RESTART IDENTITY CASCADE")
        .execute(&pool)
        .await
        .expect("truncate");
    pool
}

/// Insert an image row derived from a seed string; distinct seeds give
/// distinct hashes and storage keys.
pub async fn seed_image(pool: &PgPool, seed: &str, indexed: bool) -> i64 {
    let sha256 = sha256_hex(seed.as_bytes());
    let new = NewImage {
        storage_key: format!("https://img.test/{seed}.png"),
        sha256,
        indexed,
        ..Default::default()
    };
    let (id, created) = db::images::get_or_create_image(pool, &new)
        .await
        .expect("insert image");
    assert!(created, "seed {seed} collided with an existing image");
    id
}

/// Attach a set of (tag, confidence) pairs to an image.
pub async fn tag_image(pool: &PgPool, image_id: i64, tags: &[(&str, f64)]) {
    for (name, confidence) in tags {
        let tag = db::tags::get_or_create_tag(pool, name).await.expect("tag");
        db::tags::upsert_image_tag(pool, image_id, tag.id, *confidence)
            .await
            .expect("image_tag");
    }
}
