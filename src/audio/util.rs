//! Sample-level helpers shared by voice profiles and assembly.

/// Convert f32 samples to mono f32 samples.
///
/// Handles both mono and multi-channel input:
/// - Mono: Returns a copy of the input
/// - Multi-channel: Mixes channels by averaging each frame
///
/// # Arguments
/// * `data` - Raw f32 samples (interleaved for multi-channel)
/// * `channels` - Number of channels
///
/// # Returns
/// Vector of mono f32 samples
pub fn downmix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        data.to_vec()
    } else {
        data.chunks(channels).map(|frame| frame.iter().sum::<f32>() / channels as f32).collect()
    }
}

/// Apply a linear fade-in over the first `fade_len` samples and a linear
/// fade-out over the last `fade_len` samples, in place.
///
/// The fade is clamped to half the buffer so the two ramps never overlap.
/// Sample count is unchanged.
pub fn apply_edge_fades(samples: &mut [f32], fade_len: usize) {
    let fade_len = fade_len.min(samples.len() / 2);
    if fade_len == 0 {
        return;
    }

    let len = samples.len();
    for i in 0..fade_len {
        let gain = i as f32 / fade_len as f32;
        samples[i] *= gain;
        samples[len - 1 - i] *= gain;
    }
}
