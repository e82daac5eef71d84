//! Audio resampling using rubato FFT-based resampler.
//!
//! Used to bring reference samples to the rate a speech model expects and to
//! unify chunk audio before assembly.

use anyhow::{Context, Result};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{Fft, FixedSync, Resampler};

use super::AudioClip;

/// Chunk size for FFT-based resampling (provides good quality and performance).
const CHUNK_SIZE: usize = 1024;

/// Number of sub-chunks for FFT processing (higher = better quality but more CPU).
const SUB_CHUNKS: usize = 2;

/// Resample audio from one sample rate to another (batch processing).
///
/// Processes an entire buffer at once. The output is trimmed to the exact
/// expected length so durations stay consistent across conversions.
///
/// # Arguments
/// * `samples` - Input audio samples
/// * `from_rate` - Input sample rate (e.g., 44100 for an uploaded sample)
/// * `to_rate` - Output sample rate (e.g., 24000 for the speech model)
///
/// # Returns
/// Resampled audio samples at the target rate
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    // No resampling needed if rates match
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = Fft::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_SIZE,
        SUB_CHUNKS,
        1, // mono
        FixedSync::Input,
    )
    .context("Failed to create resampler")?;

    let output_frames_max = resampler.output_frames_max();
    let mut output_buffer = vec![0.0f32; output_frames_max];

    let expected_len = (samples.len() as f64 * to_rate as f64 / from_rate as f64).round() as usize;
    let mut output = Vec::with_capacity(expected_len + CHUNK_SIZE);

    // One extra zero chunk flushes the resampler's internal delay
    let padded_len = samples.len().div_ceil(CHUNK_SIZE) * CHUNK_SIZE + CHUNK_SIZE;
    let mut pos = 0;

    while pos < padded_len {
        let input_chunk: Vec<f32> = (pos..pos + CHUNK_SIZE).map(|i| samples.get(i).copied().unwrap_or(0.0)).collect();

        let input_adapter = InterleavedSlice::new(&input_chunk, 1, CHUNK_SIZE).context("Failed to create input adapter")?;
        let mut output_adapter = InterleavedSlice::new_mut(&mut output_buffer, 1, output_frames_max).context("Failed to create output adapter")?;

        let (_, frames_written) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, None)
            .map_err(|e| anyhow::anyhow!("Resampling error: {}", e))?;
        output.extend_from_slice(&output_buffer[..frames_written]);

        pos += CHUNK_SIZE;
    }

    // Drop the resampler delay at the front, then fix the length
    let delay = resampler.output_delay().min(output.len());
    output.drain(..delay);
    output.resize(expected_len, 0.0);

    Ok(output)
}

/// Resample a clip, returning it unchanged when it is already at `to_rate`.
pub fn resample_clip(clip: &AudioClip, to_rate: u32) -> Result<AudioClip> {
    if clip.sample_rate == to_rate {
        return Ok(clip.clone());
    }
    Ok(AudioClip::new(resample(&clip.samples, clip.sample_rate, to_rate)?, to_rate))
}
