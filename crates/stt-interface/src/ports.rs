use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{Job, JobMessage, JobPatch, JobStatus, NewJob, PipelineResult};

#[derive(Debug, Clone, Copy)]
pub struct BlobStat {
    pub size_bytes: u64,
}

/// Opaque object storage. Paths are caller-chosen strings; prefixes like
/// `uploads/` and `results/` are conventions, not directories.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> PipelineResult<()>;
    async fn download(&self, path: &str, dest: &Path) -> PipelineResult<()>;
    async fn exists(&self, path: &str) -> PipelineResult<bool>;
    async fn stat(&self, path: &str) -> PipelineResult<BlobStat>;
    async fn presign_get(&self, path: &str, ttl: Duration) -> PipelineResult<String>;
    async fn delete(&self, path: &str) -> PipelineResult<()>;
}

/// Durable per-job state. Updates are atomic per job id and idempotent, so
/// at-least-once redelivery of the same work is safe.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, new: NewJob) -> PipelineResult<Job>;
    async fn get(&self, id: Uuid) -> PipelineResult<Option<Job>>;
    async fn update(&self, id: Uuid, patch: JobPatch) -> PipelineResult<()>;
    async fn set_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> PipelineResult<()>;
    async fn increment_retry(&self, id: Uuid) -> PipelineResult<()>;
    async fn list_pending(&self, limit: u32) -> PipelineResult<Vec<Job>>;
    async fn list(&self, status: Option<JobStatus>, limit: u32) -> PipelineResult<Vec<Job>>;
}

/// Publish side of the work queue, seen by the submitter.
#[async_trait]
pub trait JobPublisher: Send + Sync {
    async fn publish(&self, message: &JobMessage, priority: u8) -> PipelineResult<()>;
}
