//! The tagging worker loop
//!
//! Single-threaded per process; horizontal scaling is just more processes
//! against the same queue, with correctness delegated entirely to the atomic
//! claim. Every error path is fail-closed: a job that cannot finish leaves
//! its image `failed` and unsearchable, never half-tagged, never perpetually
//! pending, and never crashes the process.

use crate::config::WorkerConfig;
use crate::gates::WorkerGates;
use crate::pipeline;
use std::sync::Arc;
use std::time::Duration;
use tagboard_common::db::images::ImageStatus;
use tagboard_common::db::jobs::ClaimedJob;
use tagboard_common::db::{self, images, jobs, tags};
use tagboard_common::normalize::Normalizer;
use tagboard_common::storage::{Consumer, StorageResolver};
use tagboard_common::tagger::Tagger;
use tagboard_common::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of one loop iteration, driving the follow-up sleep.
enum Tick {
    /// A job was claimed and handled; poll again immediately.
    Claimed,
    /// Queue empty; short sleep.
    Idle,
    /// Daily cap reached; long sleep.
    Capped,
    /// Storage-layer error; long sleep, never a crash.
    Transient(Error),
}

pub struct Worker {
    pool: sqlx::PgPool,
    config: WorkerConfig,
    normalizer: Normalizer,
    tagger: Arc<dyn Tagger>,
    resolver: Arc<dyn StorageResolver>,
    gates: Arc<dyn WorkerGates>,
}

impl Worker {
    pub fn new(
        pool: sqlx::PgPool,
        config: WorkerConfig,
        tagger: Arc<dyn Tagger>,
        resolver: Arc<dyn StorageResolver>,
        gates: Arc<dyn WorkerGates>,
    ) -> Self {
        let normalizer = config.normalizer();
        Self {
            pool,
            config,
            normalizer,
            tagger,
            resolver,
            gates,
        }
    }

    /// Run until the token is cancelled. The in-flight job always finishes;
    /// cancellation is only observed between iterations and during sleeps.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!("Tagging worker started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if self.gates.paused() {
                debug!("Worker paused; idling");
                self.sleep(self.config.idle_interval, &shutdown).await;
                continue;
            }

            if !self.tagger.is_configured() {
                // Fail-closed: no tagger means no claims, not a crash.
                debug!("Tagger unconfigured; idling");
                self.sleep(self.config.poll_interval, &shutdown).await;
                continue;
            }

            match self.tick().await {
                Tick::Claimed => {}
                Tick::Idle => {
                    self.sleep(self.config.poll_interval, &shutdown).await;
                }
                Tick::Capped => {
                    self.sleep(self.config.idle_interval, &shutdown).await;
                }
                Tick::Transient(err) => {
                    // Database hiccups idle the loop; they never kill it.
                    warn!("Worker iteration failed: {err}");
                    self.sleep(self.config.idle_interval, &shutdown).await;
                }
            }
        }

        info!("Tagging worker stopped");
        Ok(())
    }

    /// One claim-and-process attempt.
    async fn tick(&self) -> Tick {
        let cap = self.gates.daily_cap();
        let done_today = match jobs::done_count_today(&self.pool).await {
            Ok(n) => n,
            Err(err) => return Tick::Transient(err),
        };
        if done_today >= i64::from(cap) {
            info!("Daily cap reached ({done_today}/{cap}); idling");
            return Tick::Capped;
        }

        match jobs::claim_one(&self.pool).await {
            Ok(None) => Tick::Idle,
            Ok(Some(job)) => {
                self.handle_job(&job).await;
                Tick::Claimed
            }
            Err(err) => Tick::Transient(err),
        }
    }

    async fn sleep(&self, duration: Duration, shutdown: &CancellationToken) {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }

    /// Process one claimed job, recording the paired image/job failure on
    /// any error. This is the unit the loop repeats; exposed so embedders
    /// and tests can drive a single job without the polling loop.
    pub async fn handle_job(&self, job: &ClaimedJob) {
        if let Err(err) = self.process_job(job).await {
            self.mark_failed(job, &err).await;
        }
    }

    /// Tag one claimed job end to end. Any error propagates to the caller,
    /// which records the paired image/job failure.
    async fn process_job(&self, job: &ClaimedJob) -> Result<()> {
        info!(
            job_id = job.job_id,
            image_id = job.image_id,
            attempts = job.attempts,
            "Processing tag job"
        );

        let image = images::load_image(&self.pool, job.image_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("image {} for job", job.image_id)))?;

        // Stale or duplicate job for an already-indexed image: nothing to do.
        if image.status == ImageStatus::Indexed {
            debug!(image_id = image.id, "Image already indexed; closing job");
            jobs::complete(&self.pool, job.job_id).await?;
            return Ok(());
        }

        // No fetchable URL means nothing to tag: fatal for this job.
        let model_url = self.resolver.resolve(&image.storage_key, Consumer::Model)?;

        let response = self.tagger.tag_image(&model_url).await?;

        // Caption lands before tag writes so a later failure keeps it
        // around for debugging.
        images::set_image_caption(&self.pool, image.id, &response.caption).await?;

        let suggestions = pipeline::build_suggestions(&self.normalizer, &response);
        debug!(
            image_id = image.id,
            "Writing {} tag suggestions",
            suggestions.len()
        );

        // Tag rows are global and idempotent, so they can be created outside
        // the transaction; the per-image join writes are all-or-nothing.
        let mut pairs = Vec::with_capacity(suggestions.len());
        for suggestion in &suggestions {
            let tag = tags::get_or_create_tag(&self.pool, &suggestion.name).await?;
            pairs.push((tag.id, suggestion.confidence));
        }

        let mut tx = self.pool.begin().await?;
        for (tag_id, confidence) in pairs {
            tags::upsert_image_tag(&mut *tx, image.id, tag_id, confidence).await?;
        }
        tx.commit().await?;

        // The visibility flip and the job completion land together: an image
        // is never `indexed` while its job still reads queued/running.
        let mut tx = self.pool.begin().await?;
        images::set_image_status(&mut *tx, image.id, ImageStatus::Indexed).await?;
        jobs::complete(&mut *tx, job.job_id).await?;
        tx.commit().await?;

        info!(
            image_id = image.id,
            tags = suggestions.len(),
            "Image indexed"
        );
        Ok(())
    }

    /// Record a job failure: image and job flip to `failed` together, with
    /// the error message preserved for the operator.
    async fn mark_failed(&self, job: &ClaimedJob, err: &Error) {
        error!(
            job_id = job.job_id,
            image_id = job.image_id,
            "Tag job failed: {err}"
        );

        let result = async {
            let mut tx = self.pool.begin().await?;
            images::set_image_status(&mut *tx, job.image_id, ImageStatus::Failed).await?;
            jobs::fail(&mut *tx, job.job_id, &err.to_string()).await?;
            tx.commit().await?;
            Ok::<(), Error>(())
        }
        .await;

        if let Err(record_err) = result {
            // The job stays `running` until an operator requeues it; losing
            // the worker to a panic here would only make things worse.
            warn!(
                job_id = job.job_id,
                "Could not record job failure: {record_err}"
            );
        }
    }
}

/// Convenience used by the binary: build the pool and run to completion.
pub async fn run_worker(
    config: WorkerConfig,
    tagger: Arc<dyn Tagger>,
    resolver: Arc<dyn StorageResolver>,
    gates: Arc<dyn WorkerGates>,
    shutdown: CancellationToken,
) -> Result<()> {
    let pool = db::init_pool(&config.database_url).await?;
    let worker = Worker::new(pool, config, tagger, resolver, gates);
    worker.run(shutdown).await
}
