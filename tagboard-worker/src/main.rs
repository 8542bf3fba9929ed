//! tagboard-worker - Tagging worker service and operator CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tagboard_common::config::TomlConfig;
use tagboard_common::db;
use tagboard_common::storage::UrlOrPathResolver;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tagboard_worker::config::WorkerConfig;
use tagboard_worker::gates::EnvGates;
use tagboard_worker::vision::HttpTagger;
use tagboard_worker::worker;

#[derive(Parser)]
#[command(name = "tagboard-worker", about = "Tagboard tagging worker")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "tagboard.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the worker loop until interrupted
    Run,
    /// Reset one image's failed/stuck job to queued
    Requeue {
        #[arg(long)]
        image_id: i64,
    },
    /// Requeue every job stuck `running` longer than the threshold
    /// (recovery after a worker crash; never runs automatically)
    RequeueStale {
        #[arg(long, default_value_t = 30)]
        minutes: i64,
    },
    /// Show queue depth by status
    Stats,
    /// Show how many taggings remain in today's budget
    Budget,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!("tagboard-worker v{}", env!("CARGO_PKG_VERSION"));

    let toml_config = TomlConfig::load(&cli.config)?;
    let config = WorkerConfig::resolve(&toml_config)?;

    match cli.command {
        Command::Run => {
            let tagger = Arc::new(HttpTagger::new(
                config.tagger_endpoint.clone(),
                config.tagger_api_key.clone(),
                config.tagger_timeout,
            )?);
            let resolver = Arc::new(UrlOrPathResolver::new(
                config.public_url_base.clone(),
                config.signed_url_base.clone(),
            ));
            let gates = Arc::new(EnvGates::new(config.default_daily_cap));

            let shutdown = CancellationToken::new();
            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown signal received; finishing in-flight job");
                    signal_token.cancel();
                }
            });

            worker::run_worker(config, tagger, resolver, gates, shutdown).await?;
        }
        Command::Requeue { image_id } => {
            let pool = db::init_pool(&config.database_url).await?;
            if db::jobs::requeue(&pool, image_id).await? {
                println!("image {image_id}: job reset to queued, image reset to pending");
            } else {
                println!("image {image_id}: no tag job found");
            }
        }
        Command::RequeueStale { minutes } => {
            let pool = db::init_pool(&config.database_url).await?;
            let n = db::jobs::requeue_stale(&pool, chrono::Duration::minutes(minutes)).await?;
            println!("requeued {n} stale running job(s)");
        }
        Command::Stats => {
            let pool = db::init_pool(&config.database_url).await?;
            let stats = db::jobs::queue_stats(&pool).await?;
            println!("queued:  {}", stats.queued);
            println!("running: {}", stats.running);
            println!("done:    {}", stats.done);
            println!("failed:  {}", stats.failed);
        }
        Command::Budget => {
            let pool = db::init_pool(&config.database_url).await?;
            let gates = EnvGates::new(config.default_daily_cap);
            use tagboard_worker::gates::WorkerGates;
            let cap = gates.daily_cap();
            let remaining = tagboard_common::ingest::remaining_budget(&pool, cap).await?;
            println!("daily cap: {cap}, remaining today: {remaining}");
        }
    }

    Ok(())
}
