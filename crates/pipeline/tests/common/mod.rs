//! Test doubles for the pipeline: an in-memory job store that records its
//! writes, an in-memory blob store, and a scriptable transcriber.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use vox_stt_interface::{
    BlobStat, BlobStore, ChunkStrategy, FileRecord, Job, JobMessage, JobPatch, JobPublisher,
    JobStatus, JobStore, NewJob, PipelineResult, TransientError,
};
use vox_whisper_local::{TranscribeError, Transcriber, Transcription};

#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    Insert(Uuid),
    SetStatus(Uuid, JobStatus),
    /// A patch write; `progress_only` means it carried nothing but
    /// `chunks_completed`, i.e. a milestone checkpoint.
    Patch {
        progress_only: bool,
        chunks_completed: Option<u32>,
    },
    IncrementRetry(Uuid),
}

#[derive(Default)]
pub struct MockJobStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
    writes: Mutex<Vec<StoreWrite>>,
}

impl MockJobStore {
    pub fn writes(&self) -> Vec<StoreWrite> {
        self.writes.lock().unwrap().clone()
    }

    /// The chunks_completed values of milestone checkpoints, in order.
    pub fn progress_writes(&self) -> Vec<u32> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                StoreWrite::Patch {
                    progress_only: true,
                    chunks_completed,
                } => chunks_completed,
                _ => None,
            })
            .collect()
    }

    pub fn status_writes(&self) -> Vec<JobStatus> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                StoreWrite::SetStatus(_, status) => Some(status),
                _ => None,
            })
            .collect()
    }

    pub fn job(&self, id: Uuid) -> Job {
        self.jobs.lock().unwrap().get(&id).expect("job must exist").clone()
    }
}

#[async_trait]
impl JobStore for MockJobStore {
    async fn insert(&self, new: NewJob) -> PipelineResult<Job> {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
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
        };
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        self.writes.lock().unwrap().push(StoreWrite::Insert(job.id));
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> PipelineResult<Option<Job>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, id: Uuid, patch: JobPatch) -> PipelineResult<()> {
        let progress_only = patch.chunks_completed.is_some()
            && patch.status.is_none()
            && patch.chunks.is_none()
            && patch.transcription_text.is_none();
        self.writes.lock().unwrap().push(StoreWrite::Patch {
            progress_only,
            chunks_completed: patch.chunks_completed,
        });

        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(());
        };
        if let Some(v) = patch.status {
            job.status = v;
        }
        if let Some(v) = patch.audio_duration_s {
            job.audio_duration_s = Some(v);
        }
        if let Some(v) = patch.chunks_total {
            job.chunks_total = Some(v);
        }
        if let Some(v) = patch.chunks_completed {
            job.chunks_completed = v;
        }
        if let Some(v) = patch.chunks {
            job.chunks = v;
        }
        if let Some(v) = patch.transcription_text {
            job.transcription_text = Some(v);
        }
        if let Some(v) = patch.error_message {
            job.error_message = Some(v);
        }
        if let Some(v) = patch.result_path {
            job.result_path = Some(v);
        }
        if let Some(v) = patch.started_at {
            job.started_at = Some(v);
        }
        if let Some(v) = patch.completed_at {
            job.completed_at = Some(v);
        }
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> PipelineResult<()> {
        self.writes
            .lock()
            .unwrap()
            .push(StoreWrite::SetStatus(id, status));

        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(());
        };
        let now = Utc::now();
        job.status = status;
        if let Some(error) = error {
            job.error_message = Some(error.to_string());
        }
        if status == JobStatus::Processing && job.started_at.is_none() {
            job.started_at = Some(now);
        }
        if status.is_terminal() && job.completed_at.is_none() {
            job.completed_at = Some(now);
        }
        job.updated_at = now;
        Ok(())
    }

    async fn increment_retry(&self, id: Uuid) -> PipelineResult<()> {
        self.writes
            .lock()
            .unwrap()
            .push(StoreWrite::IncrementRetry(id));
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.retry_count += 1;
        }
        Ok(())
    }

    async fn list_pending(&self, limit: u32) -> PipelineResult<Vec<Job>> {
        self.list(Some(JobStatus::Pending), limit).await
    }

    async fn list(&self, status: Option<JobStatus>, limit: u32) -> PipelineResult<Vec<Job>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MockBlob {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MockBlob {
    pub fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), (bytes, content_type.to_string()));
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(path).map(|(b, _)| b.clone())
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.objects.lock().unwrap().get(path).map(|(_, c)| c.clone())
    }
}

#[async_trait]
impl BlobStore for MockBlob {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> PipelineResult<()> {
        self.put(path, bytes, content_type);
        Ok(())
    }

    async fn download(&self, path: &str, dest: &Path) -> PipelineResult<()> {
        let bytes = self
            .object(path)
            .ok_or_else(|| TransientError::BlobIo(format!("no such object: {path}")))?;
        std::fs::write(dest, bytes).map_err(|e| TransientError::BlobIo(e.to_string()))?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> PipelineResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(path))
    }

    async fn stat(&self, path: &str) -> PipelineResult<BlobStat> {
        let bytes = self
            .object(path)
            .ok_or_else(|| TransientError::BlobIo(format!("no such object: {path}")))?;
        Ok(BlobStat {
            size_bytes: bytes.len() as u64,
        })
    }

    async fn presign_get(&self, path: &str, _ttl: Duration) -> PipelineResult<String> {
        Ok(format!("https://blob.test/{path}?sig=mock"))
    }

    async fn delete(&self, path: &str) -> PipelineResult<()> {
        self.objects.lock().unwrap().remove(path);
        Ok(())
    }
}

type TextFn = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Transcriber double keyed by chunk file stem (`chunk_0001`, ...).
/// Scripted failures are consumed first, then calls succeed with the text
/// function's output; `delays` makes a chunk slow enough to trip the
/// per-chunk deadline.
pub struct ScriptedTranscriber {
    failures: Mutex<HashMap<String, VecDeque<TranscribeError>>>,
    delays: HashMap<String, Duration>,
    always_fail: bool,
    text_fn: TextFn,
    calls: Mutex<Vec<String>>,
}

impl Default for ScriptedTranscriber {
    fn default() -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            delays: HashMap::new(),
            always_fail: false,
            text_fn: Box::new(|stem| format!("spoken text of {stem}")),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedTranscriber {
    pub fn failing_always() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    pub fn with_text_fn(text_fn: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            text_fn: Box::new(text_fn),
            ..Self::default()
        }
    }

    pub fn fail_once(self, stem: &str, error: TranscribeError) -> Self {
        self.failures
            .lock()
            .unwrap()
            .entry(stem.to_string())
            .or_default()
            .push_back(error);
        self
    }

    pub fn delay(mut self, stem: &str, delay: Duration) -> Self {
        self.delays.insert(stem.to_string(), delay);
        self
    }

    pub fn calls_for(&self, stem: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == stem).count()
    }
}

impl Transcriber for ScriptedTranscriber {
    fn transcribe(&self, audio: &Path, _language: &str) -> Result<Transcription, TranscribeError> {
        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(stem.clone());

        if let Some(delay) = self.delays.get(&stem) {
            std::thread::sleep(*delay);
        }

        if self.always_fail {
            return Err(TranscribeError::Crashed("scripted failure".into()));
        }

        if let Some(err) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&stem)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        Ok(Transcription {
            text: (self.text_fn)(&stem),
            segments: Vec::new(),
        })
    }
}

#[derive(Default)]
pub struct MockPublisher {
    pub published: Mutex<Vec<(JobMessage, u8)>>,
}

#[async_trait]
impl JobPublisher for MockPublisher {
    async fn publish(&self, message: &JobMessage, priority: u8) -> PipelineResult<()> {
        self.published
            .lock()
            .unwrap()
            .push((message.clone(), priority));
        Ok(())
    }
}

/// A submittable file record for tests.
pub fn file_record(size_mb: f64) -> FileRecord {
    FileRecord {
        id: Uuid::new_v4(),
        original_filename: "cuoc-hop-q3.mp3".into(),
        blob_path: "uploads/test-upload.mp3".into(),
        size_mb,
        content_type: "audio/mpeg".into(),
        created_at: Utc::now(),
    }
}

/// Insert a pending job pointing at `audio_path`, the way the submitter
/// would have.
pub async fn seed_job(store: &MockJobStore, audio_path: &str, strategy: ChunkStrategy) -> Job {
    store
        .insert(NewJob {
            language: "vi".into(),
            model: "medium".into(),
            original_filename: "input.wav".into(),
            audio_path: audio_path.into(),
            file_size_mb: 1.0,
            chunk_strategy: strategy,
        })
        .await
        .unwrap()
}
