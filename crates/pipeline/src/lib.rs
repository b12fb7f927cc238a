//! The worker pipeline: queue consumer, job orchestrator and submitter.
//!
//! A `Worker`-shaped process constructs one [`Orchestrator`] holding typed
//! handles to the job store, blob store and transcriber, hands it to a
//! [`Consumer`] driving the queue, and runs until shutdown. The submitter
//! is the other side of the queue, called by the HTTP layer.

use std::time::Duration;

use vox_chunker::ChunkPolicy;

mod consumer;
mod milestone;
mod orchestrator;
mod submitter;

pub use consumer::*;
pub use milestone::is_milestone;
pub use orchestrator::*;
pub use submitter::*;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Size of the chunk transcription pool within one worker process.
    pub max_parallel_workers: usize,
    /// Per-chunk inference deadline.
    pub chunk_timeout: Duration,
    /// Attempts per chunk, first try included.
    pub max_retries: u32,
    /// Base delay of the per-chunk exponential backoff.
    pub retry_min_delay: Duration,
    pub chunk_policy: ChunkPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_parallel_workers: 4,
            chunk_timeout: Duration::from_secs(300),
            max_retries: 3,
            retry_min_delay: Duration::from_secs(1),
            chunk_policy: ChunkPolicy::default(),
        }
    }
}
