use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_LANGUAGE: &str = "vi";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChunkStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    #[default]
    SilenceBased,
    FixedDuration,
}

/// One transcribable sub-interval of a job's audio. Indices cover
/// `[0, chunks_total)` without gaps and timestamps never run backwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub index: u32,
    pub start_s: f64,
    pub end_s: f64,
    pub status: ChunkStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChunkRecord {
    pub fn pending(index: u32, start_s: f64, end_s: f64) -> Self {
        Self {
            index,
            start_s,
            end_s,
            status: ChunkStatus::Pending,
            text: None,
            error: None,
        }
    }
}

/// The durable job record. Owned by the job store; mutated only by the
/// orchestrator (status, chunk progress) and the consumer (retry count).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub language: String,
    pub model: String,
    pub original_filename: String,
    pub audio_path: String,
    pub result_path: Option<String>,
    pub file_size_mb: f64,
    pub audio_duration_s: Option<f64>,
    pub retry_count: u32,
    pub chunks_total: Option<u32>,
    pub chunks_completed: u32,
    pub chunks: Vec<ChunkRecord>,
    pub chunk_strategy: ChunkStrategy,
    pub transcription_text: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a fresh job. The store assigns the id and stamps
/// `status = PENDING` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub language: String,
    pub model: String,
    pub original_filename: String,
    pub audio_path: String,
    pub file_size_mb: f64,
    pub chunk_strategy: ChunkStrategy,
}

/// Partial update. `None` fields are left untouched; the store stamps
/// `updated_at` atomically with whatever is set. Applying the same patch
/// twice is a no-op, which is what makes redelivery safe.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub audio_duration_s: Option<f64>,
    pub chunks_total: Option<u32>,
    pub chunks_completed: Option<u32>,
    pub chunks: Option<Vec<ChunkRecord>>,
    pub transcription_text: Option<String>,
    pub error_message: Option<String>,
    pub result_path: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Upload-side record. A job copies `blob_path` at submission; the file
/// record's lifecycle is otherwise independent of any job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub original_filename: String,
    pub blob_path: String,
    pub size_mb: f64,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

pub fn result_blob_path(job_id: Uuid) -> String {
    format!("results/result_{job_id}.txt")
}

pub fn upload_blob_path(file_id: Uuid, original_filename: &str) -> String {
    let ext = std::path::Path::new(original_filename)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    format!("uploads/{file_id}{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_uppercase() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, r#""PROCESSING""#);
        let back: JobStatus = serde_json::from_str(r#""FAILED""#).unwrap();
        assert_eq!(back, JobStatus::Failed);
    }

    #[test]
    fn status_order_matches_lifecycle() {
        assert!(JobStatus::Pending < JobStatus::Processing);
        assert!(JobStatus::Processing < JobStatus::Completed);
        assert!(JobStatus::Processing < JobStatus::Failed);
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
    }

    #[test]
    fn result_path_is_deterministic() {
        let id = Uuid::nil();
        assert_eq!(
            result_blob_path(id),
            "results/result_00000000-0000-0000-0000-000000000000.txt"
        );
    }

    #[test]
    fn upload_path_keeps_extension() {
        let id = Uuid::nil();
        assert!(upload_blob_path(id, "meeting.mp3").ends_with(".mp3"));
        assert!(!upload_blob_path(id, "no-extension").contains('.'));
    }
}
