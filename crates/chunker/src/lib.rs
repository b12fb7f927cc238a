//! Splits an audio file into transcribable regions.
//!
//! The default strategy finds runs of silence and treats the non-silent
//! intervals between them as candidate chunks; a fixed-duration strategy
//! exists as an explicit choice and as the fallback when no silence can be
//! found. Output chunks are 16 kHz mono WAV files under a caller-provided
//! directory, which is what the transcriber consumes.

use std::path::{Path, PathBuf};

use vox_audio_utils::{audio_duration_secs, resample_mono_16k, source_from_path};
use vox_stt_interface::{ChunkStrategy, PermanentError, PipelineError, PipelineResult};

mod detect;
mod plan;
mod policy;
mod write;

pub use policy::ChunkPolicy;

use detect::{Span, detect_speech};
use plan::{fixed_windows, postprocess};

/// Files longer than this are chunked with two streaming passes instead of
/// decoding the whole file into memory.
const STREAMING_THRESHOLD_S: f64 = 60.0;

const SUPPORTED_EXTENSIONS: &[&str] = &[
    "aac", "flac", "m4a", "mp3", "mp4", "oga", "ogg", "opus", "wav", "webm",
];

#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub index: u32,
    pub start_s: f64,
    pub end_s: f64,
    pub path: PathBuf,
}

pub fn chunk_audio(
    audio_path: &Path,
    out_dir: &Path,
    policy: &ChunkPolicy,
) -> PipelineResult<Vec<AudioChunk>> {
    validate_extension(audio_path)?;
    std::fs::create_dir_all(out_dir).map_err(PipelineError::other)?;

    let duration_hint = audio_duration_secs(audio_path).map_err(decode_error)?;
    tracing::debug!(
        duration_s = duration_hint,
        strategy = ?policy.strategy,
        "chunking_audio"
    );

    let chunks = if duration_hint <= STREAMING_THRESHOLD_S {
        chunk_in_memory(audio_path, out_dir, policy)?
    } else {
        chunk_streaming(audio_path, out_dir, policy)?
    };

    tracing::info!(chunks = chunks.len(), "chunking_complete");
    Ok(chunks)
}

fn chunk_in_memory(
    audio_path: &Path,
    out_dir: &Path,
    policy: &ChunkPolicy,
) -> PipelineResult<Vec<AudioChunk>> {
    let source = source_from_path(audio_path).map_err(decode_error)?;
    let samples: Vec<f32> = resample_mono_16k(source).collect();
    if samples.is_empty() {
        return Err(PermanentError::CorruptedAudio("decoded zero samples".into()).into());
    }
    let total = samples.len() as u64;

    let spans = match policy.strategy {
        ChunkStrategy::SilenceBased => {
            let detection = detect_speech(
                samples.iter().copied(),
                policy.silence_thresh_db,
                policy.min_silence_s,
            );
            select_spans(detection.spans, total, policy)
        }
        ChunkStrategy::FixedDuration => fixed_windows(total, policy.chunk_duration_s),
    };

    write::write_spans_in_memory(&samples, &spans, out_dir)
}

fn chunk_streaming(
    audio_path: &Path,
    out_dir: &Path,
    policy: &ChunkPolicy,
) -> PipelineResult<Vec<AudioChunk>> {
    let source = source_from_path(audio_path).map_err(decode_error)?;
    let resampled = resample_mono_16k(source);

    let (spans, total) = match policy.strategy {
        ChunkStrategy::SilenceBased => {
            let detection = detect_speech(resampled, policy.silence_thresh_db, policy.min_silence_s);
            if detection.total_samples == 0 {
                return Err(PermanentError::CorruptedAudio("decoded zero samples".into()).into());
            }
            (
                select_spans(detection.spans, detection.total_samples, policy),
                detection.total_samples,
            )
        }
        ChunkStrategy::FixedDuration => {
            let total = resampled.count() as u64;
            if total == 0 {
                return Err(PermanentError::CorruptedAudio("decoded zero samples".into()).into());
            }
            (fixed_windows(total, policy.chunk_duration_s), total)
        }
    };

    tracing::debug!(spans = spans.len(), total_samples = total, "streaming_plan_ready");
    write::write_spans_streaming(audio_path, &spans, out_dir)
}

/// Silence-derived candidates get the deterministic post-processing pass.
/// When the detector found no silence at all, silence-aware chunking has
/// nothing to offer and the plain fixed-duration windows take over: either
/// nothing was speech, or a single span covers the entire stream.
fn select_spans(spans: Vec<Span>, total_samples: u64, policy: &ChunkPolicy) -> Vec<Span> {
    let no_silence = match spans.as_slice() {
        [] => true,
        [(start, end)] => *start == 0 && *end == total_samples,
        _ => false,
    };
    if no_silence {
        tracing::warn!("no_silence_detected_falling_back_to_fixed_duration");
        return fixed_windows(total_samples, policy.chunk_duration_s);
    }
    postprocess(spans, total_samples, policy)
}

fn validate_extension(audio_path: &Path) -> PipelineResult<()> {
    let ext = audio_path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(PermanentError::InvalidAudioFormat(format!(
            "unsupported audio format {ext:?}, supported: {SUPPORTED_EXTENSIONS:?}"
        ))
        .into())
    }
}

fn decode_error(err: vox_audio_utils::Error) -> PipelineError {
    match err {
        // The extension passed validation, so a decode failure means the
        // contents do not match the container they claim to be.
        vox_audio_utils::Error::Decode(e) => PermanentError::CorruptedAudio(e.to_string()).into(),
        vox_audio_utils::Error::Io(e) => PipelineError::other(format!("audio read failed: {e}")),
        vox_audio_utils::Error::Wav(e) => PipelineError::other(format!("wav io failed: {e}")),
    }
}
