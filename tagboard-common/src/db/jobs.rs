//! Table-backed tagging job queue
//!
//! One `tag_jobs` row per image, claimed atomically under multi-worker
//! contention. The state machine is `queued → running → done | failed`;
//! `failed → queued` (and stuck `running → queued`) happen only through the
//! explicit operator requeue operations, never automatically.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool, Row};

/// Tag job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(Error::Internal(format!("unknown job status: {other}"))),
        }
    }
}

/// A queue entry.
#[derive(Debug, Clone)]
pub struct TagJob {
    pub id: i64,
    pub image_id: i64,
    pub status: JobStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a successful claim hands to the worker.
#[derive(Debug, Clone, Copy)]
pub struct ClaimedJob {
    pub job_id: i64,
    pub image_id: i64,
    pub attempts: i32,
}

/// Queue depth by status, for the operator CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    pub queued: i64,
    pub running: i64,
    pub done: i64,
    pub failed: i64,
}

/// Enqueue a tagging job for an image. Idempotent by construction: the
/// unique `image_id` constraint turns a duplicate enqueue into a no-op, so
/// callers never pre-check existence. Returns whether a row was inserted.
pub async fn enqueue(pool: &PgPool, image_id: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO tag_jobs (image_id, status, attempts)
        VALUES ($1, 'queued', 0)
        ON CONFLICT (image_id) DO NOTHING
        "#,
    )
    .bind(image_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Atomically claim the oldest queued job.
///
/// Selection, locking, and the `queued → running` transition happen in one
/// statement: the inner select takes a row lock with SKIP LOCKED so
/// concurrent claimants each grab a different row instead of blocking, and
/// the update runs against the locked row before anything else can see it.
/// A separate select-then-update would be a race. Returns `None` when no
/// queued job exists (not an error).
pub async fn claim_one(pool: &PgPool) -> Result<Option<ClaimedJob>> {
    let row = sqlx::query(
        r#"
        WITH next_job AS (
            SELECT id FROM tag_jobs
            WHERE status = 'queued'
            ORDER BY created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        UPDATE tag_jobs
        SET status = 'running', attempts = attempts + 1, updated_at = now()
        FROM next_job
        WHERE tag_jobs.id = next_job.id
        RETURNING tag_jobs.id, tag_jobs.image_id, tag_jobs.attempts
        "#,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| ClaimedJob {
        job_id: row.get("id"),
        image_id: row.get("image_id"),
        attempts: row.get("attempts"),
    }))
}

/// Mark a running job done; clears any error from an earlier attempt.
pub async fn complete(exec: impl PgExecutor<'_>, job_id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE tag_jobs SET status = 'done', last_error = NULL, updated_at = now() WHERE id = $1",
    )
    .bind(job_id)
    .execute(exec)
    .await?;
    Ok(())
}

/// Mark a running job failed, recording the error for the operator.
pub async fn fail(exec: impl PgExecutor<'_>, job_id: i64, message: &str) -> Result<()> {
    sqlx::query(
        "UPDATE tag_jobs SET status = 'failed', last_error = $2, updated_at = now() WHERE id = $1",
    )
    .bind(job_id)
    .bind(message)
    .execute(exec)
    .await?;
    Ok(())
}

/// Operator requeue: reset an image's job to `queued` and the image itself
/// to `pending`, together. Returns false when the image has no job.
pub async fn requeue(pool: &PgPool, image_id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE tag_jobs
        SET status = 'queued', last_error = NULL, updated_at = now()
        WHERE image_id = $1
        "#,
    )
    .bind(image_id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    sqlx::query("UPDATE images SET status = 'pending', updated_at = now() WHERE id = $1")
        .bind(image_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

/// Operator recovery for crashed workers: requeue every job stuck `running`
/// whose last transition is older than the threshold. Explicitly invoked,
/// never automatic — a healthy worker holds a job `running` only for the
/// duration of one tagging call. Returns the number of jobs requeued.
pub async fn requeue_stale(pool: &PgPool, older_than: chrono::Duration) -> Result<u64> {
    let cutoff = Utc::now() - older_than;
    let mut tx = pool.begin().await?;

    let image_ids: Vec<i64> = sqlx::query_scalar(
        r#"
        UPDATE tag_jobs
        SET status = 'queued', last_error = NULL, updated_at = now()
        WHERE status = 'running' AND updated_at < $1
        RETURNING image_id
        "#,
    )
    .bind(cutoff)
    .fetch_all(&mut *tx)
    .await?;

    if !image_ids.is_empty() {
        sqlx::query("UPDATE images SET status = 'pending', updated_at = now() WHERE id = ANY($1)")
            .bind(&image_ids)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(image_ids.len() as u64)
}

/// Jobs finished during the current UTC calendar day, for daily-cap
/// accounting. Counts by the job's `created_at` (creation time, not
/// completion time) — a blunt global counter recomputed on every call.
pub async fn done_count_today(pool: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM tag_jobs
        WHERE status = 'done'
          AND created_at AT TIME ZONE 'utc' >= date_trunc('day', now() AT TIME ZONE 'utc')
        "#,
    )
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Load a job by image id (one job per image, so this is a unique lookup).
pub async fn load_job_for_image(pool: &PgPool, image_id: i64) -> Result<Option<TagJob>> {
    let row = sqlx::query(
        r#"
        SELECT id, image_id, status, attempts, last_error, created_at, updated_at
        FROM tag_jobs
        WHERE image_id = $1
        "#,
    )
    .bind(image_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let status: String = row.get("status");
            Ok(Some(TagJob {
                id: row.get("id"),
                image_id: row.get("image_id"),
                status: JobStatus::parse(&status)?,
                attempts: row.get("attempts"),
                last_error: row.get("last_error"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            }))
        }
        None => Ok(None),
    }
}

/// Queue depth by status.
pub async fn queue_stats(pool: &PgPool) -> Result<QueueStats> {
    let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM tag_jobs GROUP BY status")
        .fetch_all(pool)
        .await?;

    let mut stats = QueueStats::default();
    for row in rows {
        let status: String = row.get("status");
        let n: i64 = row.get("n");
        match JobStatus::parse(&status)? {
            JobStatus::Queued => stats.queued = n,
            JobStatus::Running => stats.running = n,
            JobStatus::Done => stats.done = n,
            JobStatus::Failed => stats.failed = n,
        }
    }
    Ok(stats)
}
