//! Joining finished chunk audio into one track.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ledger::{ChunkStatus, LedgerSnapshot};
use crate::audio::resampler::resample_clip;
use crate::audio::util::apply_edge_fades;
use crate::audio::{AudioClip, ExportFormat, samples_for};
use crate::error::{NarratorError, Result};
use crate::text::{Chunk, LengthUnit};

/// Default silence between consecutive chunks.
pub const DEFAULT_GAP: Duration = Duration::from_millis(250);

/// Default fade-in/fade-out applied at each chunk's edges.
pub const DEFAULT_FADE: Duration = Duration::from_millis(10);

/// What to do with chunks that are not done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AssemblyPolicy {
    /// Stop at the first chunk that is not done
    #[default]
    #[value(name = "contiguous")]
    ContiguousPrefix,
    /// Replace missing chunks with silence of their expected duration
    FillSilence,
    /// Join every done chunk and leave the holes out
    SkipMissing,
}

/// Assembly settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyConfig {
    pub policy: AssemblyPolicy,
    /// Silence inserted between consecutive segments
    pub gap: Duration,
    /// Linear fade at both edges of every chunk (length preserving)
    pub fade: Duration,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self { policy: AssemblyPolicy::default(), gap: DEFAULT_GAP, fade: DEFAULT_FADE }
    }
}

/// The joined narration plus which chunks made it in.
#[derive(Debug, Clone)]
pub struct AssembledTrack {
    pub audio: AudioClip,
    /// Done chunks whose audio is in the track, ascending
    pub included: Vec<usize>,
    /// Chunks whose audio is not in the track (silence-filled or left out)
    pub missing: Vec<usize>,
}

impl AssembledTrack {
    /// True when some chunk of the document is not in the track.
    pub fn is_partial(&self) -> bool {
        !self.missing.is_empty()
    }

    pub fn duration(&self) -> Duration {
        self.audio.duration()
    }

    pub fn write_wav(&self, path: impl AsRef<Path>, format: ExportFormat) -> Result<()> {
        Ok(self.audio.write_wav(path, format)?)
    }
}

enum Segment {
    Speech(Arc<AudioClip>),
    Silence(Duration),
}

/// Builds an [`AssembledTrack`] from a ledger snapshot.
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    config: AssemblyConfig,
}

impl Assembler {
    pub fn new(config: AssemblyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    /// Assemble done chunks in index order.
    ///
    /// # Arguments
    /// * `snapshot` - Ledger state to assemble from
    /// * `chunks` - Chunk list the snapshot refers to (used to size fill silence)
    /// * `unit` - Unit the chunk lengths are measured in
    /// * `default_rate` - Track sample rate when no chunk is done
    ///
    /// # Errors
    /// `NothingToExport` when the policy selects no audio at all.
    pub fn assemble(&self, snapshot: &LedgerSnapshot, chunks: &[Chunk], unit: LengthUnit, default_rate: u32) -> Result<AssembledTrack> {
        let mut segments = Vec::new();
        let mut included = Vec::new();
        let mut missing = Vec::new();

        match self.config.policy {
            AssemblyPolicy::ContiguousPrefix => {
                let mut prefix_ended = false;
                for result in snapshot.results() {
                    match (&result.audio, prefix_ended) {
                        (Some(audio), false) if result.status == ChunkStatus::Done => {
                            segments.push(Segment::Speech(Arc::clone(audio)));
                            included.push(result.index);
                        }
                        _ => {
                            prefix_ended = true;
                            missing.push(result.index);
                        }
                    }
                }
            }
            AssemblyPolicy::SkipMissing => {
                for result in snapshot.results() {
                    match &result.audio {
                        Some(audio) if result.status == ChunkStatus::Done => {
                            segments.push(Segment::Speech(Arc::clone(audio)));
                            included.push(result.index);
                        }
                        _ => missing.push(result.index),
                    }
                }
            }
            AssemblyPolicy::FillSilence => {
                let per_unit = seconds_per_unit(snapshot, chunks, unit);
                for result in snapshot.results() {
                    match &result.audio {
                        Some(audio) if result.status == ChunkStatus::Done => {
                            segments.push(Segment::Speech(Arc::clone(audio)));
                            included.push(result.index);
                        }
                        _ => {
                            let length = chunks.get(result.index).map_or(0, |c| c.len_in(unit));
                            segments.push(Segment::Silence(Duration::from_secs_f64(per_unit * length as f64)));
                            missing.push(result.index);
                        }
                    }
                }
            }
        }

        if included.is_empty() {
            return Err(NarratorError::NothingToExport);
        }

        let sample_rate = segments
            .iter()
            .find_map(|s| match s {
                Segment::Speech(audio) => Some(audio.sample_rate),
                Segment::Silence(_) => None,
            })
            .unwrap_or(default_rate);

        let audio = self.concatenate(&segments, sample_rate)?;
        if !missing.is_empty() {
            warn!("Assembled partial track: {} of {} chunks ({:?})", included.len(), snapshot.len(), self.config.policy);
        }
        debug!("Assembled {} segments into {:.1}s of audio", segments.len(), audio.duration().as_secs_f32());

        Ok(AssembledTrack { audio, included, missing })
    }

    fn concatenate(&self, segments: &[Segment], sample_rate: u32) -> Result<AudioClip> {
        let gap_len = samples_for(self.config.gap, sample_rate);
        let fade_len = samples_for(self.config.fade, sample_rate);
        let mut samples = Vec::new();

        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                samples.resize(samples.len() + gap_len, 0.0);
            }
            match segment {
                Segment::Speech(audio) => {
                    let start = samples.len();
                    if audio.sample_rate == sample_rate {
                        samples.extend_from_slice(&audio.samples);
                    } else {
                        let resampled = resample_clip(audio, sample_rate).map_err(|e| NarratorError::Audio(e.to_string()))?;
                        samples.extend_from_slice(&resampled.samples);
                    }
                    apply_edge_fades(&mut samples[start..], fade_len);
                }
                Segment::Silence(duration) => {
                    samples.resize(samples.len() + samples_for(*duration, sample_rate), 0.0);
                }
            }
        }

        Ok(AudioClip::new(samples, sample_rate))
    }
}

/// Observed speaking rate of done chunks, in seconds per length unit.
fn seconds_per_unit(snapshot: &LedgerSnapshot, chunks: &[Chunk], unit: LengthUnit) -> f64 {
    let (seconds, units) = snapshot
        .results()
        .iter()
        .filter_map(|r| Some((r.audio.as_ref()?, chunks.get(r.index)?)))
        .fold((0.0, 0usize), |(seconds, units), (audio, chunk)| (seconds + audio.duration().as_secs_f64(), units + chunk.len_in(unit)));

    if units == 0 { 0.0 } else { seconds / units as f64 }
}
