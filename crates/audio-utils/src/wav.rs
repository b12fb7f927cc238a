use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::{Error, WHISPER_SAMPLE_RATE, f32_to_i16, i16_to_f32};

fn spec_mono_16k() -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate: WHISPER_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Incremental 16 kHz mono 16-bit WAV writer. The chunker routes decoded
/// samples here one interval at a time during its streaming pass.
pub struct WavSink {
    writer: hound::WavWriter<BufWriter<File>>,
    samples_written: u64,
}

impl WavSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, Error> {
        let writer = hound::WavWriter::create(path, spec_mono_16k())?;
        Ok(Self {
            writer,
            samples_written: 0,
        })
    }

    pub fn push(&mut self, sample: f32) -> Result<(), Error> {
        self.writer.write_sample(f32_to_i16(sample))?;
        self.samples_written += 1;
        Ok(())
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    pub fn finalize(self) -> Result<u64, Error> {
        let n = self.samples_written;
        self.writer.finalize()?;
        Ok(n)
    }
}

pub fn write_wav_mono_16k(
    path: impl AsRef<Path>,
    samples: impl IntoIterator<Item = f32>,
) -> Result<u64, Error> {
    let mut sink = WavSink::create(path)?;
    for sample in samples {
        sink.push(sample)?;
    }
    sink.finalize()
}

/// Read a chunk WAV back as f32 samples. Chunks are written by this crate,
/// so the 16 kHz mono 16-bit layout is an invariant, not a guess.
pub fn read_wav_mono_f32(path: impl AsRef<Path>) -> Result<Vec<f32>, Error> {
    let reader = hound::WavReader::open(path)?;
    reader
        .into_samples::<i16>()
        .map(|s| s.map(i16_to_f32).map_err(Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_samples_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk.wav");

        let samples = vec![0.0f32, 0.25, -0.25, 0.5, -0.5];
        let n = write_wav_mono_16k(&path, samples.iter().copied()).unwrap();
        assert_eq!(n, 5);

        let back = read_wav_mono_f32(&path).unwrap();
        assert_eq!(back.len(), 5);
        for (a, b) in samples.iter().zip(&back) {
            assert!((a - b).abs() < 1.0 / 16384.0, "{a} vs {b}");
        }
    }
}
