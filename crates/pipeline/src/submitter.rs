use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use vox_stt_interface::{
    BlobStore, ChunkStrategy, DEFAULT_LANGUAGE, DEFAULT_PRIORITY, FileRecord, JobMessage,
    JobPublisher, JobStore, NewJob, PermanentError, PipelineResult, upload_blob_path,
};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Entry point for the HTTP layer: persist a new job and publish its
/// message. Deliberately not idempotent; a double submit is two jobs.
pub struct Submitter {
    store: Arc<dyn JobStore>,
    blob: Arc<dyn BlobStore>,
    publisher: Arc<dyn JobPublisher>,
    default_model: String,
    max_upload_mb: u64,
}

impl Submitter {
    pub fn new(
        store: Arc<dyn JobStore>,
        blob: Arc<dyn BlobStore>,
        publisher: Arc<dyn JobPublisher>,
        default_model: impl Into<String>,
        max_upload_mb: u64,
    ) -> Self {
        Self {
            store,
            blob,
            publisher,
            default_model: default_model.into(),
            max_upload_mb,
        }
    }

    /// Validate, insert a PENDING job copying the file's blob path, and
    /// publish at normal priority.
    pub async fn submit(
        &self,
        file: &FileRecord,
        language: Option<&str>,
        model: Option<&str>,
    ) -> PipelineResult<Uuid> {
        self.check_size(file.size_mb)?;

        let job = self
            .store
            .insert(NewJob {
                language: language.unwrap_or(DEFAULT_LANGUAGE).to_string(),
                model: model.unwrap_or(&self.default_model).to_string(),
                original_filename: file.original_filename.clone(),
                audio_path: file.blob_path.clone(),
                file_size_mb: file.size_mb,
                chunk_strategy: ChunkStrategy::SilenceBased,
            })
            .await?;

        let message = JobMessage::for_job(&job);
        self.publisher.publish(&message, DEFAULT_PRIORITY).await?;

        tracing::info!(
            job_id = %job.id,
            filename = %file.original_filename,
            language = %job.language,
            model = %job.model,
            "job_submitted"
        );
        Ok(job.id)
    }

    /// Store an upload under `uploads/<uuid><ext>` and return the file
    /// record a later `submit` call refers to.
    pub async fn store_upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> PipelineResult<FileRecord> {
        let size_mb = bytes.len() as f64 / BYTES_PER_MB;
        self.check_size(size_mb)?;

        let id = Uuid::new_v4();
        let blob_path = upload_blob_path(id, filename);
        self.blob.upload(&blob_path, bytes, content_type).await?;

        tracing::info!(file_id = %id, %blob_path, size_mb, "upload_stored");
        Ok(FileRecord {
            id,
            original_filename: filename.to_string(),
            blob_path,
            size_mb,
            content_type: content_type.to_string(),
            created_at: Utc::now(),
        })
    }

    fn check_size(&self, size_mb: f64) -> PipelineResult<()> {
        if size_mb > self.max_upload_mb as f64 {
            return Err(PermanentError::OversizeUpload {
                size_mb,
                limit_mb: self.max_upload_mb,
            }
            .into());
        }
        Ok(())
    }
}
