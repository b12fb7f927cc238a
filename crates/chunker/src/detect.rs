//! Frame-energy silence detection over a 16 kHz mono sample stream.
//!
//! The detector is single-pass and holds one frame of samples at a time,
//! so it works identically whether the samples come from an in-memory
//! buffer or straight off the decoder.

use vox_audio_utils::WHISPER_SAMPLE_RATE;

/// Energy is measured over 10 ms frames.
pub const FRAME_SAMPLES: u64 = WHISPER_SAMPLE_RATE as u64 / 100;

/// A half-open `[start, end)` interval in samples.
pub type Span = (u64, u64);

#[derive(Debug)]
pub struct SpeechDetection {
    pub spans: Vec<Span>,
    pub total_samples: u64,
}

/// Split the stream into speech spans separated by silences of at least
/// `min_silence_s` below `silence_thresh_db`. Silences shorter than the
/// minimum stay inside their surrounding span.
pub fn detect_speech(
    samples: impl Iterator<Item = f32>,
    silence_thresh_db: f64,
    min_silence_s: f64,
) -> SpeechDetection {
    let min_silence_frames = (min_silence_s * 1000.0 / 10.0).ceil().max(1.0) as u64;

    let mut spans: Vec<Span> = Vec::new();
    let mut speech_start: Option<u64> = None;
    let mut silence_start: Option<u64> = None;
    let mut silence_frames: u64 = 0;

    let mut frame: Vec<f32> = Vec::with_capacity(FRAME_SAMPLES as usize);
    let mut frame_start: u64 = 0;
    let mut total: u64 = 0;

    let mut flush = |frame: &mut Vec<f32>, frame_start: u64| {
        let silent = frame_dbfs(frame) < silence_thresh_db;
        frame.clear();

        if silent {
            if silence_start.is_none() {
                silence_start = Some(frame_start);
                silence_frames = 0;
            }
            silence_frames += 1;
            if silence_frames == min_silence_frames
                && let Some(start) = speech_start.take()
            {
                let end = silence_start.unwrap_or(frame_start);
                if end > start {
                    spans.push((start, end));
                }
            }
        } else {
            silence_start = None;
            silence_frames = 0;
            if speech_start.is_none() {
                speech_start = Some(frame_start);
            }
        }
    };

    for sample in samples {
        frame.push(sample);
        total += 1;
        if frame.len() as u64 == FRAME_SAMPLES {
            flush(&mut frame, frame_start);
            frame_start = total;
        }
    }
    if !frame.is_empty() {
        flush(&mut frame, frame_start);
    }
    drop(flush);

    // Speech still open at end-of-stream runs to the last sample, minus
    // any silence run in progress. A long silence already closed it.
    if let Some(start) = speech_start {
        let end = silence_start.filter(|&s| s > start).unwrap_or(total);
        if end > start {
            spans.push((start, end));
        }
    }

    SpeechDetection {
        spans,
        total_samples: total,
    }
}

fn frame_dbfs(frame: &[f32]) -> f64 {
    if frame.is_empty() {
        return f64::NEG_INFINITY;
    }
    let sum_sq: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum_sq / frame.len() as f64).sqrt();
    if rms <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * rms.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u64 = WHISPER_SAMPLE_RATE as u64;

    fn seconds(n: f64) -> u64 {
        (n * SR as f64) as u64
    }

    fn tone(len: u64) -> impl Iterator<Item = f32> {
        (0..len).map(|i| (i as f32 * 0.1).sin() * 0.5)
    }

    fn quiet(len: u64) -> impl Iterator<Item = f32> {
        (0..len).map(|_| 0.0)
    }

    #[test]
    fn continuous_tone_is_one_span() {
        let d = detect_speech(tone(seconds(3.0)), -40.0, 1.0);
        assert_eq!(d.total_samples, seconds(3.0));
        assert_eq!(d.spans, vec![(0, seconds(3.0))]);
    }

    #[test]
    fn silence_only_yields_no_spans() {
        let d = detect_speech(quiet(seconds(3.0)), -40.0, 1.0);
        assert!(d.spans.is_empty());
    }

    #[test]
    fn long_silence_splits_speech() {
        let samples: Vec<f32> = tone(seconds(2.0))
            .chain(quiet(seconds(2.0)))
            .chain(tone(seconds(2.0)))
            .collect();
        let d = detect_speech(samples.into_iter(), -40.0, 1.0);
        assert_eq!(d.spans.len(), 2);
        assert_eq!(d.spans[0], (0, seconds(2.0)));
        assert_eq!(d.spans[1].0, seconds(4.0));
        assert_eq!(d.spans[1].1, seconds(6.0));
    }

    #[test]
    fn short_silence_stays_inside_the_span() {
        let samples: Vec<f32> = tone(seconds(2.0))
            .chain(quiet(seconds(0.5)))
            .chain(tone(seconds(2.0)))
            .collect();
        let d = detect_speech(samples.into_iter(), -40.0, 1.0);
        assert_eq!(d.spans, vec![(0, seconds(4.5))]);
    }

    #[test]
    fn trailing_silence_is_excluded() {
        let samples: Vec<f32> = tone(seconds(2.0)).chain(quiet(seconds(3.0))).collect();
        let d = detect_speech(samples.into_iter(), -40.0, 1.0);
        assert_eq!(d.spans, vec![(0, seconds(2.0))]);
        assert_eq!(d.total_samples, seconds(5.0));
    }

    #[test]
    fn leading_silence_is_excluded() {
        let samples: Vec<f32> = quiet(seconds(2.0)).chain(tone(seconds(2.0))).collect();
        let d = detect_speech(samples.into_iter(), -40.0, 1.0);
        assert_eq!(d.spans, vec![(seconds(2.0), seconds(4.0))]);
    }

    #[test]
    fn empty_stream_is_empty() {
        let d = detect_speech(std::iter::empty(), -40.0, 1.0);
        assert!(d.spans.is_empty());
        assert_eq!(d.total_samples, 0);
    }
}
