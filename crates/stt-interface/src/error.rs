use uuid::Uuid;

/// Errors the consumer answers with a requeue: the broker redelivers and a
/// later attempt may succeed.
#[derive(Debug, thiserror::Error)]
pub enum TransientError {
    #[error("BrokerConnectError: {0}")]
    BrokerConnect(String),

    #[error("BlobIOError: {0}")]
    BlobIo(String),

    #[error("JobStoreUnavailable: {0}")]
    JobStoreUnavailable(String),

    #[error("TranscriberCrashed: {0}")]
    TranscriberCrashed(String),

    #[error("TranscriberTimeout: {0}")]
    TranscriberTimeout(String),

    #[error("{0}")]
    Other(String),
}

/// Errors no retry can fix: the message is dead-lettered and the job is
/// marked FAILED with the error text as its diagnostic.
#[derive(Debug, thiserror::Error)]
pub enum PermanentError {
    #[error("JobNotFound: no job record for {0}")]
    JobNotFound(Uuid),

    #[error("InvalidAudioFormat: {0}")]
    InvalidAudioFormat(String),

    #[error("CorruptedAudio: {0}")]
    CorruptedAudio(String),

    #[error("MissingDependency: {0}")]
    MissingDependency(String),

    #[error("AllChunksFailed: every chunk exhausted its retries")]
    AllChunksFailed,

    #[error("OversizeUpload: {size_mb:.2}MB exceeds the {limit_mb}MB cap")]
    OversizeUpload { size_mb: f64, limit_mb: u64 },

    #[error("MalformedMessage: {0}")]
    MalformedMessage(String),
}

/// The tagged error value the whole pipeline speaks. The consumer switches
/// on the top-level class only; the subkind is for diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Transient(#[from] TransientError),

    #[error(transparent)]
    Permanent(#[from] PermanentError),
}

impl PipelineError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::Transient(_))
    }

    pub fn broker(err: impl std::fmt::Display) -> Self {
        TransientError::BrokerConnect(err.to_string()).into()
    }

    pub fn blob(err: impl std::fmt::Display) -> Self {
        TransientError::BlobIo(err.to_string()).into()
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        TransientError::JobStoreUnavailable(err.to_string()).into()
    }

    pub fn other(err: impl std::fmt::Display) -> Self {
        TransientError::Other(err.to_string()).into()
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
