//! Decode, resample and WAV helpers shared by the chunker and the
//! transcriber. Everything downstream of the decoder works on 16 kHz mono
//! f32 samples, which is also what the acoustic model consumes.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rodio::Source;
use rodio::source::UniformSourceIterator;

mod error;
mod wav;

pub use error::*;
pub use wav::*;

pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

const I16_SCALE: f32 = 32768.0;

pub type Decoded = rodio::Decoder<BufReader<File>>;

pub fn source_from_path(path: impl AsRef<Path>) -> Result<Decoded, Error> {
    let file = File::open(path.as_ref())?;
    let decoder = Decoded::try_from(file)?;
    Ok(decoder)
}

/// Best-effort duration probe. Falls back to counting samples when the
/// container does not carry a duration, which decodes the whole file.
pub fn audio_duration_secs(path: impl AsRef<Path>) -> Result<f64, Error> {
    let source = source_from_path(path)?;
    if let Some(d) = source.total_duration() {
        return Ok(d.as_secs_f64());
    }
    let sample_rate = source.sample_rate() as f64;
    let channels = source.channels().max(1) as f64;
    let count = source.count() as f64;
    Ok(count / channels / sample_rate)
}

/// Resample any decoded source to 16 kHz mono, streamed.
pub fn resample_mono_16k<S>(source: S) -> impl Iterator<Item = f32>
where
    S: Source + 'static,
{
    UniformSourceIterator::new(source, 1, WHISPER_SAMPLE_RATE)
}

pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * I16_SCALE).clamp(-I16_SCALE, I16_SCALE - 1.0) as i16
}

pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / I16_SCALE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_conversion_round_trips_extremes() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), i16::MIN);
        assert!((i16_to_f32(i16::MIN) + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn conversion_clamps_out_of_range_input() {
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), i16::MIN);
    }

    #[test]
    fn duration_of_synthesized_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two_seconds.wav");
        let samples = (0..WHISPER_SAMPLE_RATE * 2).map(|i| {
            (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / WHISPER_SAMPLE_RATE as f32).sin() * 0.5
        });
        write_wav_mono_16k(&path, samples).unwrap();

        let duration = audio_duration_secs(&path).unwrap();
        assert!((duration - 2.0).abs() < 0.05, "duration was {duration}");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = audio_duration_secs("/nonexistent/audio.mp3").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
