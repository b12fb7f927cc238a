use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use backon::{BackoffBuilder, ExponentialBuilder};
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use vox_chunker::{AudioChunk, chunk_audio};
use vox_merger::merge_chunks;
use vox_stt_interface::{
    BlobStore, ChunkRecord, ChunkStatus, Job, JobPatch, JobStatus, JobStore, PermanentError,
    PipelineError, PipelineResult, result_blob_path,
};
use vox_whisper_local::{TranscribeError, Transcriber, Transcription};

use crate::{PipelineConfig, is_milestone};

const RESULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Drives one job through the pipeline: load, stage, chunk, transcribe,
/// merge, publish, close. Holds this process's typed handles; the
/// semaphore bounds chunk inference across all jobs the process runs
/// concurrently.
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    blob: Arc<dyn BlobStore>,
    transcriber: Arc<dyn Transcriber>,
    config: PipelineConfig,
    inference_slots: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        blob: Arc<dyn BlobStore>,
        transcriber: Arc<dyn Transcriber>,
        config: PipelineConfig,
    ) -> Self {
        let slots = config.max_parallel_workers.max(1);
        Self {
            store,
            blob,
            transcriber,
            config,
            inference_slots: Arc::new(Semaphore::new(slots)),
        }
    }

    /// Run the pipeline for one job. A permanent failure marks the job
    /// FAILED before the error is returned; a transient failure leaves the
    /// job PROCESSING so the redelivered message can resume it.
    pub async fn run(&self, job_id: Uuid) -> PipelineResult<()> {
        let started = Instant::now();
        tracing::info!(%job_id, "job_started");

        let result = self.process(job_id).await;

        match &result {
            Ok(()) => {
                tracing::info!(%job_id, elapsed_s = started.elapsed().as_secs_f64(), "job_finished");
            }
            Err(err) if err.is_transient() => {
                tracing::warn!(%job_id, error = %err, "job_failed_transiently");
            }
            Err(err) => {
                tracing::error!(%job_id, error = %err, "job_failed_permanently");
                if let Err(update_err) = self
                    .store
                    .set_status(job_id, JobStatus::Failed, Some(&err.to_string()))
                    .await
                {
                    tracing::error!(%job_id, error = %update_err, "failed_marking_job_failed");
                }
            }
        }

        result
    }

    async fn process(&self, job_id: Uuid) -> PipelineResult<()> {
        // Load
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or(PermanentError::JobNotFound(job_id))?;

        if job.status.is_terminal() {
            // At-least-once redelivery of settled work. A completed job's
            // artifact is already in place under its deterministic path,
            // and a failed job must never become COMPLETED afterwards.
            tracing::info!(%job_id, status = %job.status, "job_already_settled");
            return Ok(());
        }

        self.store
            .set_status(job_id, JobStatus::Processing, None)
            .await?;

        // Stage. The tempdir guard deletes the directory on every exit
        // path out of this function, unwinding included.
        let temp = tempfile::Builder::new()
            .prefix(&format!("stt_{job_id}_"))
            .tempdir()
            .map_err(PipelineError::other)?;

        let audio_name = Path::new(&job.audio_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let audio_local = temp.path().join(audio_name);

        self.blob.download(&job.audio_path, &audio_local).await?;
        tracing::debug!(%job_id, path = %audio_local.display(), "audio_staged");

        self.record_duration(job_id, &audio_local).await;

        // Chunk
        let chunks = self.chunk(&job, &audio_local, temp.path()).await?;
        let records: Vec<ChunkRecord> = chunks
            .iter()
            .map(|c| ChunkRecord::pending(c.index, c.start_s, c.end_s))
            .collect();
        self.store
            .update(
                job_id,
                JobPatch {
                    chunks_total: Some(chunks.len() as u32),
                    chunks: Some(records.clone()),
                    ..JobPatch::default()
                },
            )
            .await?;
        tracing::info!(%job_id, chunks = chunks.len(), "audio_chunked");

        // Transcribe
        let records = self.transcribe_chunks(&job, &chunks, records).await?;
        let completed = records
            .iter()
            .filter(|r| r.status == ChunkStatus::Completed)
            .count() as u32;
        if completed == 0 {
            return Err(PermanentError::AllChunksFailed.into());
        }
        tracing::info!(%job_id, completed, total = records.len(), "chunks_transcribed");

        // Merge
        let text = merge_chunks(&records);

        // Publish
        let result_path = result_blob_path(job_id);
        self.blob
            .upload(&result_path, text.clone().into_bytes(), RESULT_CONTENT_TYPE)
            .await?;

        // Close
        self.store
            .update(
                job_id,
                JobPatch {
                    status: Some(JobStatus::Completed),
                    transcription_text: Some(text),
                    result_path: Some(result_path),
                    chunks_completed: Some(completed),
                    chunks: Some(records),
                    completed_at: Some(Utc::now()),
                    ..JobPatch::default()
                },
            )
            .await?;

        Ok(())
    }

    /// Duration is diagnostic only; failing to measure it must not fail
    /// the job.
    async fn record_duration(&self, job_id: Uuid, audio_local: &Path) {
        let path = audio_local.to_path_buf();
        let measured =
            tokio::task::spawn_blocking(move || vox_audio_utils::audio_duration_secs(&path)).await;

        let duration = match measured {
            Ok(Ok(d)) => d,
            Ok(Err(err)) => {
                tracing::warn!(%job_id, error = %err, "duration_probe_failed");
                return;
            }
            Err(err) => {
                tracing::warn!(%job_id, error = %err, "duration_probe_panicked");
                return;
            }
        };

        let patch = JobPatch {
            audio_duration_s: Some(duration),
            ..JobPatch::default()
        };
        if let Err(err) = self.store.update(job_id, patch).await {
            tracing::warn!(%job_id, error = %err, "duration_write_failed");
        }
    }

    async fn chunk(
        &self,
        job: &Job,
        audio_local: &Path,
        temp_dir: &Path,
    ) -> PipelineResult<Vec<AudioChunk>> {
        let policy = self
            .config
            .chunk_policy
            .clone()
            .with_strategy(job.chunk_strategy);
        let audio = audio_local.to_path_buf();
        let chunks_dir = temp_dir.join("chunks");

        tokio::task::spawn_blocking(move || chunk_audio(&audio, &chunks_dir, &policy))
            .await
            .map_err(|e| PipelineError::other(format!("chunking task panicked: {e}")))?
    }

    /// Fan the chunk list out over the bounded inference pool. Per-chunk
    /// failures are contained: the chunk is marked FAILED in the returned
    /// records and the job continues. Progress writes happen at milestones
    /// only.
    async fn transcribe_chunks(
        &self,
        job: &Job,
        chunks: &[AudioChunk],
        mut records: Vec<ChunkRecord>,
    ) -> PipelineResult<Vec<ChunkRecord>> {
        let total = chunks.len() as u32;
        let mut tasks: JoinSet<(u32, Result<Transcription, TranscribeError>)> = JoinSet::new();

        for chunk in chunks {
            let slots = self.inference_slots.clone();
            let transcriber = self.transcriber.clone();
            let path = chunk.path.clone();
            let language = job.language.clone();
            let index = chunk.index;
            let deadline = self.config.chunk_timeout;
            let max_retries = self.config.max_retries;
            let min_delay = self.config.retry_min_delay;

            tasks.spawn(async move {
                let _permit = slots
                    .acquire_owned()
                    .await
                    .expect("inference semaphore closed");
                let result = transcribe_with_retry(
                    transcriber,
                    &path,
                    &language,
                    deadline,
                    max_retries,
                    min_delay,
                )
                .await;
                (index, result)
            });
        }

        let mut completed: u32 = 0;
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = joined
                .map_err(|e| PipelineError::other(format!("chunk task failed: {e}")))?;
            let record = records
                .iter_mut()
                .find(|r| r.index == index)
                .expect("chunk index out of range");

            match outcome {
                Ok(transcription) => {
                    record.status = ChunkStatus::Completed;
                    record.text = Some(transcription.text);
                    completed += 1;

                    if is_milestone(completed, total) {
                        tracing::info!(
                            job_id = %job.id,
                            completed,
                            total,
                            "progress_checkpoint"
                        );
                        self.store
                            .update(
                                job.id,
                                JobPatch {
                                    chunks_completed: Some(completed),
                                    ..JobPatch::default()
                                },
                            )
                            .await?;
                    }
                }
                Err(err) => {
                    tracing::warn!(job_id = %job.id, chunk = index, error = %err, "chunk_failed");
                    record.status = ChunkStatus::Failed;
                    record.error = Some(err.to_string());
                }
            }
        }

        Ok(records)
    }
}

/// One chunk, up to `max_retries` attempts. Crashes and timeouts back off
/// exponentially and retry; bad input fails immediately. The blocking
/// inference cannot be interrupted, so a timed-out attempt keeps its
/// thread until the engine returns and the late result is discarded.
async fn transcribe_with_retry(
    transcriber: Arc<dyn Transcriber>,
    path: &Path,
    language: &str,
    deadline: Duration,
    max_retries: u32,
    min_delay: Duration,
) -> Result<Transcription, TranscribeError> {
    let mut backoff = ExponentialBuilder::default()
        .with_min_delay(min_delay)
        .with_max_times(max_retries.saturating_sub(1) as usize)
        .build();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let worker = transcriber.clone();
        let chunk_path = path.to_path_buf();
        let lang = language.to_string();
        let work = tokio::task::spawn_blocking(move || worker.transcribe(&chunk_path, &lang));

        let outcome = match tokio::time::timeout(deadline, work).await {
            Err(_) => Err(TranscribeError::Timeout(deadline)),
            Ok(Err(join)) => Err(TranscribeError::Crashed(format!(
                "transcription task panicked: {join}"
            ))),
            Ok(Ok(result)) => result,
        };

        match outcome {
            Ok(transcription) => return Ok(transcription),
            Err(err) if err.is_permanent() => return Err(err),
            Err(err) => match backoff.next() {
                Some(delay) => {
                    tracing::warn!(
                        path = %path.display(),
                        attempt,
                        error = %err,
                        backoff_ms = delay.as_millis() as u64,
                        "chunk_attempt_failed"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return Err(err),
            },
        }
    }
}
