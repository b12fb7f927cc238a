use std::path::Path;

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use vox_audio_utils::read_wav_mono_f32;

use crate::{Segment, TranscribeError, Transcriber, Transcription};

/// whisper.cpp timestamps are in centiseconds.
const CENTISECONDS: f64 = 100.0;

/// Whisper over the in-process whisper.cpp bindings. The context (model
/// weights) loads once and is immutable afterwards; each call runs on its
/// own inference state, so concurrent calls from the chunk pool are safe
/// without an external lock.
pub struct WhisperTranscriber {
    context: WhisperContext,
    model_name: String,
}

impl WhisperTranscriber {
    pub fn load(model_path: &Path, model_name: impl Into<String>) -> Result<Self, TranscribeError> {
        let model_name = model_name.into();
        let path = model_path
            .to_str()
            .ok_or_else(|| TranscribeError::BadInput("model path is not valid UTF-8".into()))?;

        tracing::info!(model = %model_name, path, "loading_whisper_model");
        let context = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| TranscribeError::Crashed(format!("model load failed: {e}")))?;
        tracing::info!(model = %model_name, "whisper_model_loaded");

        Ok(Self {
            context,
            model_name,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, audio: &Path, language: &str) -> Result<Transcription, TranscribeError> {
        let samples = read_wav_mono_f32(audio)
            .map_err(|e| TranscribeError::BadInput(format!("chunk read failed: {e}")))?;
        if samples.is_empty() {
            return Err(TranscribeError::BadInput("chunk decoded to zero samples".into()));
        }

        let mut state = self
            .context
            .create_state()
            .map_err(|e| TranscribeError::Crashed(format!("state creation failed: {e}")))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(language));
        params.set_translate(false);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        // Chunks are independent; carrying context across them feeds the
        // model its own output and amplifies repetition.
        params.set_no_context(true);
        params.set_suppress_blank(true);

        state
            .full(params, &samples)
            .map_err(|e| TranscribeError::Crashed(format!("inference failed: {e}")))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| TranscribeError::Crashed(format!("segment count failed: {e}")))?;

        let mut segments = Vec::with_capacity(n_segments as usize);
        for i in 0..n_segments {
            let text = state
                .full_get_segment_text(i)
                .map_err(|e| TranscribeError::Crashed(format!("segment text failed: {e}")))?;
            let start = state
                .full_get_segment_t0(i)
                .map_err(|e| TranscribeError::Crashed(format!("segment start failed: {e}")))?;
            let end = state
                .full_get_segment_t1(i)
                .map_err(|e| TranscribeError::Crashed(format!("segment end failed: {e}")))?;

            let text = text.trim().to_string();
            if text.is_empty() {
                continue;
            }
            segments.push(Segment {
                start_s: start as f64 / CENTISECONDS,
                end_s: end as f64 / CENTISECONDS,
                text,
            });
        }

        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        tracing::debug!(
            model = %self.model_name,
            segments = segments.len(),
            chars = text.len(),
            "chunk_transcribed"
        );

        Ok(Transcription { text, segments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[ignore = "requires a local ggml model file (WHISPER_MODEL)"]
    #[test]
    fn transcribes_a_real_chunk_with_a_real_model() {
        let model = std::env::var("WHISPER_MODEL")
            .unwrap_or_else(|_| "/tmp/ggml-tiny.bin".to_string());
        let model = Path::new(&model);
        assert!(model.exists(), "model path does not exist: {}", model.display());

        let dir = tempfile::tempdir().unwrap();
        let chunk = dir.path().join("chunk.wav");
        // One second of 440 Hz tone; a real model yields empty-ish text but
        // must not crash.
        let samples = (0..16_000).map(|i| {
            (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 16_000.0).sin() * 0.3
        });
        vox_audio_utils::write_wav_mono_16k(&chunk, samples).unwrap();

        let transcriber = WhisperTranscriber::load(model, "tiny").unwrap();
        let result = transcriber.transcribe(&chunk, "en").unwrap();
        assert!(result.segments.iter().all(|s| s.end_s >= s.start_s));
    }
}
