//! Voice profiles: a validated reference sample plus synthesis settings.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::info;

use super::settings::VoiceSettings;
use crate::audio::AudioClip;
use crate::error::InputError;

/// Default minimum reference sample length (T_min).
pub const DEFAULT_MIN_REFERENCE: Duration = Duration::from_secs(5);

/// Peak amplitude below which a sample is considered silent.
const SILENCE_PEAK_THRESHOLD: f32 = 1e-3;

static NEXT_PROFILE_ID: AtomicU64 = AtomicU64::new(1);

/// Immutable reference audio and settings used for every chunk of a session.
///
/// Building a new profile (new sample or new settings) yields a new id; any
/// audio generated under a previous id is stale.
#[derive(Debug, Clone)]
pub struct VoiceProfile {
    id: u64,
    reference: Arc<AudioClip>,
    settings: VoiceSettings,
}

impl VoiceProfile {
    /// Build a profile from decoded reference audio.
    ///
    /// # Errors
    /// `InvalidVoiceSample` if the sample is empty, corrupt, silent or shorter
    /// than `min_duration`; `ParameterOutOfRange` for bad settings.
    pub fn new(reference: AudioClip, settings: VoiceSettings, min_duration: Duration) -> Result<Self, InputError> {
        validate_reference(&reference, min_duration)?;
        settings.validate()?;

        info!("🎙️ Voice sample accepted ({:.1}s at {} Hz)", reference.duration().as_secs_f32(), reference.sample_rate);

        Ok(Self { id: next_id(), reference: Arc::new(reference), settings })
    }

    /// Build a profile from uploaded WAV bytes.
    pub fn from_wav_bytes(bytes: &[u8], settings: VoiceSettings, min_duration: Duration) -> Result<Self, InputError> {
        if bytes.is_empty() {
            return Err(InputError::InvalidVoiceSample("sample is empty".to_string()));
        }
        let reference = AudioClip::from_wav_bytes(bytes).map_err(|e| InputError::InvalidVoiceSample(format!("cannot decode WAV: {}", e)))?;
        Self::new(reference, settings, min_duration)
    }

    /// A new profile sharing this reference sample with different settings.
    pub fn with_settings(&self, settings: VoiceSettings) -> Result<Self, InputError> {
        settings.validate()?;
        Ok(Self { id: next_id(), reference: Arc::clone(&self.reference), settings })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn reference(&self) -> &AudioClip {
        &self.reference
    }

    pub fn settings(&self) -> &VoiceSettings {
        &self.settings
    }
}

fn next_id() -> u64 {
    NEXT_PROFILE_ID.fetch_add(1, Ordering::Relaxed)
}

fn validate_reference(clip: &AudioClip, min_duration: Duration) -> Result<(), InputError> {
    if clip.is_empty() {
        return Err(InputError::InvalidVoiceSample("sample is empty".to_string()));
    }
    if clip.sample_rate == 0 || !clip.is_finite() {
        return Err(InputError::InvalidVoiceSample("sample is corrupt".to_string()));
    }
    if clip.duration() < min_duration {
        return Err(InputError::InvalidVoiceSample(format!(
            "sample is {:.1}s long, at least {:.1}s required",
            clip.duration().as_secs_f32(),
            min_duration.as_secs_f32()
        )));
    }
    if clip.peak() < SILENCE_PEAK_THRESHOLD {
        return Err(InputError::InvalidVoiceSample("sample is silent".to_string()));
    }
    Ok(())
}
