//! Mono audio buffers and WAV encoding/decoding.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};

use super::util::downmix_to_mono;

/// Sample encoding used when exporting WAV data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// 16-bit signed integer PCM (widest player support)
    #[default]
    Pcm16,
    /// 32-bit IEEE float (lossless with respect to the pipeline)
    Float32,
}

/// A block of mono f32 samples at a known sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// A clip of digital silence lasting `duration`.
    pub fn silence(duration: Duration, sample_rate: u32) -> Self {
        Self { samples: vec![0.0; samples_for(duration, sample_rate)], sample_rate }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length of the clip.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    /// True if every sample is a finite number.
    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| s.is_finite())
    }

    /// Decode WAV bytes (any channel count, int 8-32 bit or float 32 bit) into a mono clip.
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self, hound::Error> {
        let reader = WavReader::new(Cursor::new(bytes))?;
        Self::from_reader(reader)
    }

    /// Decode a WAV file from disk into a mono clip.
    pub fn from_wav_file(path: impl AsRef<Path>) -> Result<Self, hound::Error> {
        let reader = WavReader::open(path)?;
        Self::from_reader(reader)
    }

    fn from_reader<R: std::io::Read>(mut reader: WavReader<R>) -> Result<Self, hound::Error> {
        let spec = reader.spec();
        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader.samples::<i32>().map(|s| s.map(|v| v as f32 / scale)).collect::<Result<_, _>>()?
            }
        };

        let samples = downmix_to_mono(&interleaved, spec.channels.max(1) as usize);
        Ok(Self { samples, sample_rate: spec.sample_rate })
    }

    /// Encode the clip as an in-memory mono WAV file.
    pub fn to_wav_bytes(&self, format: ExportFormat) -> Result<Vec<u8>, hound::Error> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let writer = WavWriter::new(&mut cursor, wav_spec(self.sample_rate, format))?;
            self.write_samples(writer, format)?;
        }
        Ok(cursor.into_inner())
    }

    /// Write the clip to a mono WAV file.
    pub fn write_wav(&self, path: impl AsRef<Path>, format: ExportFormat) -> Result<(), hound::Error> {
        let writer = WavWriter::create(path, wav_spec(self.sample_rate, format))?;
        self.write_samples(writer, format)
    }

    fn write_samples<W: std::io::Write + std::io::Seek>(&self, mut writer: WavWriter<W>, format: ExportFormat) -> Result<(), hound::Error> {
        match format {
            ExportFormat::Pcm16 => {
                for &s in &self.samples {
                    writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
                }
            }
            ExportFormat::Float32 => {
                for &s in &self.samples {
                    writer.write_sample(s)?;
                }
            }
        }
        writer.finalize()
    }
}

/// Number of samples covering `duration` at `sample_rate`.
pub fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * sample_rate as f64).round() as usize
}

fn wav_spec(sample_rate: u32, format: ExportFormat) -> WavSpec {
    match format {
        ExportFormat::Pcm16 => WavSpec { channels: 1, sample_rate, bits_per_sample: 16, sample_format: SampleFormat::Int },
        ExportFormat::Float32 => WavSpec { channels: 1, sample_rate, bits_per_sample: 32, sample_format: SampleFormat::Float },
    }
}
