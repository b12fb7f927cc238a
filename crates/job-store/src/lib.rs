//! Durable per-job state on Postgres. One row per job with the chunk
//! records embedded as JSONB, so every update is a single-row write and
//! redelivered work patching the same fields twice is a no-op.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use uuid::Uuid;

use vox_stt_interface::{
    ChunkRecord, ChunkStrategy, Job, JobPatch, JobStatus, JobStore, NewJob, PipelineError,
    PipelineResult,
};

mod error;

pub use error::Error;

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        tracing::info!("job_store_connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migration. Run once at startup.
    pub async fn migrate(&self) -> Result<(), Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn strategy_to_str(strategy: ChunkStrategy) -> &'static str {
    match strategy {
        ChunkStrategy::SilenceBased => "silence_based",
        ChunkStrategy::FixedDuration => "fixed_duration",
    }
}

fn strategy_from_str(s: &str) -> Result<ChunkStrategy, Error> {
    match s {
        "silence_based" => Ok(ChunkStrategy::SilenceBased),
        "fixed_duration" => Ok(ChunkStrategy::FixedDuration),
        other => Err(Error::Decode(format!("unknown chunk strategy: {other}"))),
    }
}

fn map_row(row: &PgRow) -> Result<Job, Error> {
    let status: String = row.try_get("status")?;
    let strategy: String = row.try_get("chunk_strategy")?;
    let chunks: serde_json::Value = row.try_get("chunks")?;
    let chunks: Vec<ChunkRecord> = serde_json::from_value(chunks)?;

    Ok(Job {
        id: row.try_get("id")?,
        status: status.parse::<JobStatus>().map_err(Error::Decode)?,
        language: row.try_get("language")?,
        model: row.try_get("model")?,
        original_filename: row.try_get("original_filename")?,
        audio_path: row.try_get("audio_path")?,
        result_path: row.try_get("result_path")?,
        file_size_mb: row.try_get("file_size_mb")?,
        audio_duration_s: row.try_get("audio_duration_s")?,
        retry_count: row.try_get::<i32, _>("retry_count")?.max(0) as u32,
        chunks_total: row
            .try_get::<Option<i32>, _>("chunks_total")?
            .map(|n| n.max(0) as u32),
        chunks_completed: row.try_get::<i32, _>("chunks_completed")?.max(0) as u32,
        chunks,
        chunk_strategy: strategy_from_str(&strategy)?,
        transcription_text: row.try_get("transcription_text")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl PgJobStore {
    async fn insert_inner(&self, new: NewJob) -> Result<Job, Error> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO stt_jobs (
                id, status, language, model, original_filename, audio_path,
                file_size_mb, chunk_strategy, retry_count, chunks_completed,
                chunks, created_at, updated_at
            )
            VALUES ($1, 'PENDING', $2, $3, $4, $5, $6, $7, 0, 0, '[]'::jsonb, $8, $8)
            "#,
        )
        .bind(id)
        .bind(&new.language)
        .bind(&new.model)
        .bind(&new.original_filename)
        .bind(&new.audio_path)
        .bind(new.file_size_mb)
        .bind(strategy_to_str(new.chunk_strategy))
        .bind(now)
        .execute(&self.pool)
        .await?;

        tracing::info!(job_id = %id, filename = %new.original_filename, "job_inserted");

        Ok(Job {
            id,
            status: JobStatus::Pending,
            language: new.language,
            model: new.model,
            original_filename: new.original_filename,
            audio_path: new.audio_path,
            result_path: None,
            file_size_mb: new.file_size_mb,
            audio_duration_s: None,
            retry_count: 0,
            chunks_total: None,
            chunks_completed: 0,
            chunks: Vec::new(),
            chunk_strategy: new.chunk_strategy,
            transcription_text: None,
            error_message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        })
    }

    async fn get_inner(&self, id: Uuid) -> Result<Option<Job>, Error> {
        let row = sqlx::query("SELECT * FROM stt_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_row).transpose()
    }

    async fn update_inner(&self, id: Uuid, patch: JobPatch) -> Result<(), Error> {
        let chunks = patch.chunks.map(serde_json::to_value).transpose()?;

        sqlx::query(
            r#"
            UPDATE stt_jobs SET
                status             = COALESCE($2, status),
                audio_duration_s   = COALESCE($3, audio_duration_s),
                chunks_total       = COALESCE($4, chunks_total),
                chunks_completed   = COALESCE($5, chunks_completed),
                chunks             = COALESCE($6, chunks),
                transcription_text = COALESCE($7, transcription_text),
                error_message      = COALESCE($8, error_message),
                result_path        = COALESCE($9, result_path),
                started_at         = COALESCE($10, started_at),
                completed_at       = COALESCE($11, completed_at),
                updated_at         = $12
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.audio_duration_s)
        .bind(patch.chunks_total.map(|n| n as i32))
        .bind(patch.chunks_completed.map(|n| n as i32))
        .bind(chunks)
        .bind(patch.transcription_text)
        .bind(patch.error_message)
        .bind(patch.result_path)
        .bind(patch.started_at)
        .bind(patch.completed_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_status_inner(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), Error> {
        // started_at / completed_at stamp once and survive redelivery
        // untouched thanks to the inner COALESCE.
        sqlx::query(
            r#"
            UPDATE stt_jobs SET
                status        = $2,
                error_message = COALESCE($3, error_message),
                started_at    = CASE WHEN $2 = 'PROCESSING'
                                     THEN COALESCE(started_at, $4)
                                     ELSE started_at END,
                completed_at  = CASE WHEN $2 IN ('COMPLETED', 'FAILED')
                                     THEN COALESCE(completed_at, $4)
                                     ELSE completed_at END,
                updated_at    = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        tracing::info!(job_id = %id, status = %status, "job_status_updated");
        Ok(())
    }

    async fn increment_retry_inner(&self, id: Uuid) -> Result<(), Error> {
        sqlx::query("UPDATE stt_jobs SET retry_count = retry_count + 1, updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_inner(&self, status: Option<JobStatus>, limit: u32) -> Result<Vec<Job>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM stt_jobs
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_row).collect()
    }

    async fn list_pending_inner(&self, limit: u32) -> Result<Vec<Job>, Error> {
        // Oldest first, so a reconciliation sweep picks up stragglers in
        // submission order. Served by the (status, created_at) index.
        let rows = sqlx::query(
            r#"
            SELECT * FROM stt_jobs
            WHERE status = 'PENDING'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_row).collect()
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, new: NewJob) -> PipelineResult<Job> {
        self.insert_inner(new).await.map_err(PipelineError::store)
    }

    async fn get(&self, id: Uuid) -> PipelineResult<Option<Job>> {
        self.get_inner(id).await.map_err(PipelineError::store)
    }

    async fn update(&self, id: Uuid, patch: JobPatch) -> PipelineResult<()> {
        self.update_inner(id, patch).await.map_err(PipelineError::store)
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> PipelineResult<()> {
        self.set_status_inner(id, status, error)
            .await
            .map_err(PipelineError::store)
    }

    async fn increment_retry(&self, id: Uuid) -> PipelineResult<()> {
        self.increment_retry_inner(id).await.map_err(PipelineError::store)
    }

    async fn list_pending(&self, limit: u32) -> PipelineResult<Vec<Job>> {
        self.list_pending_inner(limit).await.map_err(PipelineError::store)
    }

    async fn list(&self, status: Option<JobStatus>, limit: u32) -> PipelineResult<Vec<Job>> {
        self.list_inner(status, limit).await.map_err(PipelineError::store)
    }
}
