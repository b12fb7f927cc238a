mod env;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;

use vox_job_store::PgJobStore;
use vox_pipeline::{Consumer, Orchestrator};
use vox_queue::JobQueue;
use vox_s3::S3BlobStore;
use vox_whisper_local::{ModelFetcher, Transcriber, WhisperTranscriber};

use env::Env;

#[derive(Parser)]
#[command(name = "vox-worker", about = "Speech-to-text worker", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Consume transcription jobs until SIGTERM/SIGINT.
    Run,
    /// Pre-fetch model artifacts from blob storage and exit.
    FetchModels {
        /// Fetch every model in the catalog instead of just the default.
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let env = Env::load().context("failed to load environment")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(env).await,
        Command::FetchModels { all } => fetch_models(env, all).await,
    }
}

async fn run(env: Env) -> anyhow::Result<()> {
    tracing::info!(
        max_concurrent_jobs = env.max_concurrent_jobs,
        max_parallel_workers = env.max_parallel_workers,
        model = %env.default_model,
        "worker_starting"
    );

    let store = PgJobStore::connect(&env.database_url, env.database_max_connections)
        .await
        .context("job store unreachable")?;
    store.migrate().await.context("job store migration failed")?;
    let store = Arc::new(store);

    let blob = S3BlobStore::connect(env.s3_config())
        .await
        .context("blob store configuration invalid")?;
    blob.ensure_bucket().await.context("blob bucket setup failed")?;
    let blob = Arc::new(blob);

    let queue = JobQueue::connect(env.queue_config())
        .await
        .context("queue broker unreachable")?;
    queue.ensure_stream().await.context("queue stream setup failed")?;

    // The model loads exactly once per process, before the consume loop;
    // every chunk transcription in this process shares it.
    let fetcher = ModelFetcher::new(&env.models_dir, env.verify_model_checksums);
    let model_path = fetcher
        .ensure(&env.default_model, blob.as_ref())
        .await
        .context("default model unavailable")?;
    let model_name = env.default_model.clone();
    let transcriber = tokio::task::spawn_blocking(move || {
        WhisperTranscriber::load(&model_path, model_name)
    })
    .await
    .context("model load task failed")?
    .context("model load failed")?;
    let transcriber: Arc<dyn Transcriber> = Arc::new(transcriber);

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        blob.clone(),
        transcriber,
        env.pipeline_config(),
    ));
    let consumer = Consumer::new(
        orchestrator,
        store.clone(),
        env.max_concurrent_jobs,
        Duration::from_secs(env.drain_timeout_s),
    );
    let deliveries = queue
        .consumer(env.max_concurrent_jobs)
        .await
        .context("queue consumer setup failed")?;

    let shutdown = shutdown_token();
    consumer.run(deliveries, shutdown).await?;

    // Connections close on drop here; the transcriber (and its native
    // allocations) goes last with the orchestrator.
    tracing::info!("worker_exited_cleanly");
    Ok(())
}

async fn fetch_models(env: Env, all: bool) -> anyhow::Result<()> {
    let blob = S3BlobStore::connect(env.s3_config())
        .await
        .context("blob store configuration invalid")?;
    let fetcher = ModelFetcher::new(&env.models_dir, env.verify_model_checksums);

    if all {
        let results = fetcher.ensure_all(&blob).await;
        let failed: Vec<&str> = results
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(name, _)| *name)
            .collect();
        if failed.len() == results.len() {
            anyhow::bail!("no model could be fetched: {failed:?}");
        }
        if !failed.is_empty() {
            tracing::warn!(?failed, "some models could not be fetched");
        }
    } else {
        let path = fetcher
            .ensure(&env.default_model, &blob)
            .await
            .with_context(|| format!("model {:?} unavailable", env.default_model))?;
        tracing::info!(path = %path.display(), "model_ready");
    }

    Ok(())
}

fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("sigint_received"),
            _ = sigterm.recv() => tracing::info!("sigterm_received"),
        }
        trigger.cancel();
    });
    token
}
