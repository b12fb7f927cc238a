use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start_s: f64,
    pub end_s: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    pub text: String,
    pub segments: Vec<Segment>,
}

/// Transcription failures, by recoverability. Only `BadInput` is permanent;
/// a crashed or timed-out inference run is worth retrying.
#[derive(Debug, thiserror::Error)]
pub enum TranscribeError {
    #[error("malformed audio input: {0}")]
    BadInput(String),

    #[error("inference engine aborted: {0}")]
    Crashed(String),

    #[error("transcription exceeded the {0:?} deadline")]
    Timeout(Duration),
}

impl TranscribeError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, TranscribeError::BadInput(_))
    }
}

/// Process-local inference engine. Construction is expensive and happens
/// once per worker process; `transcribe` is synchronous and CPU-bound, so
/// callers dispatch it to a blocking pool and must not assume it is cheap.
/// Implementations are safe to call concurrently from one instance.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: &Path, language: &str) -> Result<Transcription, TranscribeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_bad_input_is_permanent() {
        assert!(TranscribeError::BadInput("not pcm".into()).is_permanent());
        assert!(!TranscribeError::Crashed("ggml abort".into()).is_permanent());
        assert!(!TranscribeError::Timeout(Duration::from_secs(300)).is_permanent());
    }
}
