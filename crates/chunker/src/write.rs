use std::path::{Path, PathBuf};

use vox_audio_utils::{WavSink, resample_mono_16k, source_from_path, write_wav_mono_16k};
use vox_stt_interface::{PipelineError, PipelineResult};

use crate::AudioChunk;
use crate::detect::Span;
use crate::plan::samples_to_seconds;

fn chunk_path(out_dir: &Path, index: usize) -> PathBuf {
    out_dir.join(format!("chunk_{index:04}.wav"))
}

fn chunk(index: usize, span: Span, path: PathBuf) -> AudioChunk {
    AudioChunk {
        index: index as u32,
        start_s: samples_to_seconds(span.0),
        end_s: samples_to_seconds(span.1),
        path,
    }
}

/// Write chunks by slicing an already-decoded buffer.
pub(crate) fn write_spans_in_memory(
    samples: &[f32],
    spans: &[Span],
    out_dir: &Path,
) -> PipelineResult<Vec<AudioChunk>> {
    let mut chunks = Vec::with_capacity(spans.len());
    for (i, &(start, end)) in spans.iter().enumerate() {
        let path = chunk_path(out_dir, i);
        let slice = &samples[start as usize..(end as usize).min(samples.len())];
        write_wav_mono_16k(&path, slice.iter().copied()).map_err(PipelineError::other)?;
        chunks.push(chunk(i, (start, end), path));
    }
    Ok(chunks)
}

/// Write chunks with a second streaming decode pass: samples are routed to
/// one interval sink at a time, nothing is buffered. Requires `spans` to be
/// sorted and non-overlapping, which the planner guarantees.
pub(crate) fn write_spans_streaming(
    audio_path: &Path,
    spans: &[Span],
    out_dir: &Path,
) -> PipelineResult<Vec<AudioChunk>> {
    let source = source_from_path(audio_path).map_err(PipelineError::other)?;
    let mut samples = resample_mono_16k(source);
    let mut position: u64 = 0;

    let mut chunks = Vec::with_capacity(spans.len());
    for (i, &(start, end)) in spans.iter().enumerate() {
        while position < start {
            if samples.next().is_none() {
                break;
            }
            position += 1;
        }

        let path = chunk_path(out_dir, i);
        let mut sink = WavSink::create(&path).map_err(PipelineError::other)?;
        while position < end {
            let Some(sample) = samples.next() else {
                break;
            };
            sink.push(sample).map_err(PipelineError::other)?;
            position += 1;
        }
        let written = sink.finalize().map_err(PipelineError::other)?;
        tracing::debug!(chunk = i, samples = written, "chunk_written");
        chunks.push(chunk(i, (start, end), path));
    }

    Ok(chunks)
}
