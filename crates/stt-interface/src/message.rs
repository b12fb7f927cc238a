use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Job;

pub const JOB_ID_HEADER: &str = "x-job-id";
pub const PUBLISHED_AT_HEADER: &str = "x-published-at";
pub const PRIORITY_HEADER: &str = "x-priority";

/// Normal submission priority on the 0-10 scale.
pub const DEFAULT_PRIORITY: u8 = 5;
pub const MAX_PRIORITY: u8 = 10;

/// The queue wire type: JSON, UTF-8, delivered persistently. The payload
/// carries only what the worker needs before it loads the job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: Uuid,
    pub language: String,
    pub model: String,
    pub filename: String,
    /// Seconds since the Unix epoch.
    pub published_at: f64,
}

impl JobMessage {
    pub fn for_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            language: job.language.clone(),
            model: job.model.clone(),
            filename: job.original_filename.clone(),
            published_at: Utc::now().timestamp_millis() as f64 / 1000.0,
        }
    }
}
