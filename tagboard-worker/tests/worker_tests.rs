//! Worker pipeline integration tests against a live Postgres, with the
//! tagger and gates replaced by test doubles.
//!
//! Ignored by default: set `TAGBOARD_TEST_DATABASE_URL` and run
//! `cargo test -p tagboard-worker -- --ignored --test-threads=1`.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tagboard_common::db::{self, images::ImageStatus, images::NewImage, jobs::JobStatus};
use tagboard_common::storage::UrlOrPathResolver;
use tagboard_common::tagger::{TagSuggestion, Tagger, TaggerResponse};
use tagboard_common::{Error, Result};
use tagboard_worker::config::WorkerConfig;
use tagboard_worker::gates::StaticGates;
use tagboard_worker::worker::Worker;

/// Returns a fixed response for every call.
struct ScriptedTagger {
    caption: String,
    tags: Vec<(String, f64)>,
}

#[async_trait]
impl Tagger for ScriptedTagger {
    async fn tag_image(&self, _image_url: &str) -> Result<TaggerResponse> {
        Ok(TaggerResponse {
            caption: self.caption.clone(),
            tags: self
                .tags
                .iter()
                .map(|(name, confidence)| TagSuggestion {
                    name: name.clone(),
                    confidence: *confidence,
                    kind: None,
                })
                .collect(),
        }
        .sanitized())
    }
}

/// Fails every call, like a timed-out or unreachable model endpoint.
struct BrokenTagger;

#[async_trait]
impl Tagger for BrokenTagger {
    async fn tag_image(&self, _image_url: &str) -> Result<TaggerResponse> {
        Err(Error::Tagger("tagging call exceeded 60s timeout".to_string()))
    }
}

fn test_config() -> WorkerConfig {
    WorkerConfig {
        database_url: String::new(), // pool is injected directly
        tagger_endpoint: Some("https://model.test/tag".to_string()),
        tagger_api_key: None,
        tagger_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
        idle_interval: Duration::from_millis(10),
        default_daily_cap: 100,
        public_url_base: None,
        signed_url_base: None,
        extra_stopwords: Vec::new(),
    }
}

async fn test_pool() -> sqlx::PgPool {
    let url = std::env::var("TAGBOARD_TEST_DATABASE_URL")
        .expect("set TAGBOARD_TEST_DATABASE_URL to run worker tests");
    let pool = db::init_pool(&url).await.expect("connect + migrate");
    sqlx::query("TRUNCATE images, tags, image_tags, tag_jobs RESTART IDENTITY CASCADE")
        .execute(&pool)
        .await
        .expect("truncate");
    pool
}

async fn seed_pending_image(pool: &sqlx::PgPool, seed: &str) -> i64 {
    let sha256 = format!("{:x}", Sha256::digest(seed.as_bytes()));
    let new = NewImage {
        storage_key: format!("https://img.test/{seed}.png"),
        sha256,
        ..Default::default()
    };
    let outcome = tagboard_common::ingest::register_image(pool, &new)
        .await
        .expect("register");
    assert!(outcome.enqueued);
    outcome.image_id
}

fn worker(pool: sqlx::PgPool, tagger: Arc<dyn Tagger>) -> Worker {
    Worker::new(
        pool,
        test_config(),
        tagger,
        Arc::new(UrlOrPathResolver::default()),
        Arc::new(StaticGates {
            paused: false,
            daily_cap: 100,
        }),
    )
}

#[tokio::test]
#[ignore = "requires Postgres (TAGBOARD_TEST_DATABASE_URL)"]
async fn successful_job_indexes_image_with_expanded_tags() {
    let pool = test_pool().await;
    let image_id = seed_pending_image(&pool, "success").await;

    let tagger = Arc::new(ScriptedTagger {
        caption: "a sad frog at night".to_string(),
        tags: vec![("film-noir".to_string(), 0.9), ("sad frog".to_string(), 0.8)],
    });
    let worker = worker(pool.clone(), tagger);

    let job = db::jobs::claim_one(&pool).await.unwrap().unwrap();
    worker.handle_job(&job).await;

    let image = db::images::load_image(&pool, image_id).await.unwrap().unwrap();
    assert_eq!(image.status, ImageStatus::Indexed);
    assert_eq!(image.caption.as_deref(), Some("a sad frog at night"));

    let job = db::jobs::load_job_for_image(&pool, image_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.last_error, None);

    let tags = db::tags::image_tags_for(&pool, image_id).await.unwrap();
    let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
    // Model tags tokenized and hyphen-expanded, caption words merged in at
    // low confidence, stopwords gone.
    for expected in ["film-noir", "film", "noir", "sad", "frog", "at", "night"] {
        assert!(names.contains(&expected), "missing tag {expected}: {names:?}");
    }
    assert!(!names.contains(&"a"));

    let sad = tags.iter().find(|t| t.name == "sad").unwrap();
    assert_eq!(sad.confidence, 0.8, "model confidence beats caption confidence");
    let film = tags.iter().find(|t| t.name == "film").unwrap();
    assert_eq!(film.confidence, 0.9, "expansion sibling inherits parent confidence");
}

#[tokio::test]
#[ignore = "requires Postgres (TAGBOARD_TEST_DATABASE_URL)"]
async fn tagger_failure_is_fail_closed() {
    let pool = test_pool().await;
    let image_id = seed_pending_image(&pool, "broken").await;
    let worker = worker(pool.clone(), Arc::new(BrokenTagger));

    let job = db::jobs::claim_one(&pool).await.unwrap().unwrap();
    worker.handle_job(&job).await;

    let image = db::images::load_image(&pool, image_id).await.unwrap().unwrap();
    assert_eq!(image.status, ImageStatus::Failed);

    let job = db::jobs::load_job_for_image(&pool, image_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    let err = job.last_error.expect("failure must record an error");
    assert!(err.contains("timeout"), "unexpected error: {err}");

    // No partial tag writes survive.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM image_tags WHERE image_id = $1")
        .bind(image_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
#[ignore = "requires Postgres (TAGBOARD_TEST_DATABASE_URL)"]
async fn unresolvable_storage_key_is_a_job_failure() {
    let pool = test_pool().await;
    // A bare object key with no signing base configured cannot be resolved
    // for the model; the job must fail closed rather than call the tagger.
    let sha256 = format!("{:x}", Sha256::digest(b"unresolvable"));
    let new = NewImage {
        storage_key: format!("images/{sha256}.png"),
        sha256,
        ..Default::default()
    };
    let outcome = tagboard_common::ingest::register_image(&pool, &new).await.unwrap();

    let tagger = Arc::new(ScriptedTagger {
        caption: "never used".to_string(),
        tags: vec![],
    });
    let worker = worker(pool.clone(), tagger);
    let job = db::jobs::claim_one(&pool).await.unwrap().unwrap();
    worker.handle_job(&job).await;

    let image = db::images::load_image(&pool, outcome.image_id).await.unwrap().unwrap();
    assert_eq!(image.status, ImageStatus::Failed);
    assert!(image.caption.is_none(), "tagger must not have been reached");
}

#[tokio::test]
#[ignore = "requires Postgres (TAGBOARD_TEST_DATABASE_URL)"]
async fn stale_job_for_indexed_image_short_circuits() {
    let pool = test_pool().await;
    let image_id = seed_pending_image(&pool, "stale").await;
    db::images::set_image_status(&pool, image_id, ImageStatus::Indexed)
        .await
        .unwrap();

    // BrokenTagger proves the short-circuit: reaching the tagger would fail
    // the job, but an already-indexed image closes it as done.
    let worker = worker(pool.clone(), Arc::new(BrokenTagger));
    let job = db::jobs::claim_one(&pool).await.unwrap().unwrap();
    worker.handle_job(&job).await;

    let job = db::jobs::load_job_for_image(&pool, image_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
}

#[tokio::test]
#[ignore = "requires Postgres (TAGBOARD_TEST_DATABASE_URL)"]
async fn reingesting_known_bytes_changes_nothing() {
    let pool = test_pool().await;
    let first = seed_pending_image(&pool, "idempotent").await;

    let sha256 = format!("{:x}", Sha256::digest(b"idempotent"));
    let new = NewImage {
        storage_key: "https://img.test/other-location.png".to_string(),
        sha256,
        ..Default::default()
    };
    let outcome = tagboard_common::ingest::register_image(&pool, &new).await.unwrap();
    assert_eq!(outcome.image_id, first);
    assert!(!outcome.created);
    assert!(!outcome.enqueued, "existing job must not be duplicated");
}
