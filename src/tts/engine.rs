//! Boundary between the pipeline and speech synthesis models.
//!
//! [`SpeechModel`] is the model-native side: each backend names its own
//! parameters. [`Synthesizer`] is the only thing the pipeline talks to; it
//! takes (text, profile) and returns audio at one fixed sample rate.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::audio::AudioClip;
use crate::audio::resampler::resample_clip;
use crate::error::SynthesisError;
use crate::voice::{VoiceProfile, VoiceSettings};

/// Model-specific parameter names and values.
pub type NativeParams = Map<String, Value>;

/// A text-to-speech model conditioned on a reference voice sample.
pub trait SpeechModel: Send {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Sample rate of the audio the model produces.
    fn sample_rate(&self) -> u32;

    /// Sample rate the model expects for the reference sample.
    fn reference_sample_rate(&self) -> u32 {
        self.sample_rate()
    }

    /// Translate the recognized voice settings into this model's parameters.
    fn native_params(&self, settings: &VoiceSettings) -> NativeParams;

    /// Generate speech for `text` in the voice of `reference`.
    ///
    /// One call is atomic: it either returns the whole utterance or an error.
    fn generate(&mut self, text: &str, reference: &AudioClip, params: &NativeParams) -> Result<AudioClip, SynthesisError>;
}

/// Adapter that runs chunk text through a [`SpeechModel`].
pub struct Synthesizer {
    model: Box<dyn SpeechModel>,
    sample_rate: u32,
    reference_cache: Option<(u64, Arc<AudioClip>)>, // Reference resampled for the current profile
}

impl Synthesizer {
    /// Wrap a model. Output is always delivered at the model's native rate.
    pub fn new(model: Box<dyn SpeechModel>) -> Self {
        let sample_rate = model.sample_rate();
        Self { model, sample_rate, reference_cache: None }
    }

    /// Sample rate of every clip returned by [`Synthesizer::synthesize`].
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Synthesize one chunk of text with the given voice profile.
    ///
    /// # Errors
    /// `EmptyText` for blank input; otherwise whatever the model reports, plus
    /// `Model` if the model returns empty or non-finite audio.
    pub fn synthesize(&mut self, text: &str, profile: &VoiceProfile) -> Result<AudioClip, SynthesisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let reference = self.reference_for(profile)?;
        let params = self.model.native_params(profile.settings());

        debug!("Synthesizing {} chars with {} ({:?})", text.chars().count(), self.model.name(), params);

        let audio = self.model.generate(text, &reference, &params)?;
        if audio.is_empty() {
            return Err(SynthesisError::Model("model returned no audio".to_string()));
        }
        if !audio.is_finite() {
            return Err(SynthesisError::Model("model returned non-finite samples".to_string()));
        }

        resample_clip(&audio, self.sample_rate).map_err(|e| SynthesisError::Model(format!("cannot resample model output: {}", e)))
    }

    /// Reference sample at the model's preferred rate, cached per profile.
    fn reference_for(&mut self, profile: &VoiceProfile) -> Result<Arc<AudioClip>, SynthesisError> {
        if let Some((id, clip)) = &self.reference_cache
            && *id == profile.id()
        {
            return Ok(Arc::clone(clip));
        }

        let clip = resample_clip(profile.reference(), self.model.reference_sample_rate())
            .map_err(|e| SynthesisError::Model(format!("cannot prepare reference sample: {}", e)))?;
        let clip = Arc::new(clip);
        self.reference_cache = Some((profile.id(), Arc::clone(&clip)));
        Ok(clip)
    }
}
