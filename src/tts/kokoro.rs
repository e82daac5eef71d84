//! Offline Kokoro backend using sherpa-rs.
//!
//! Kokoro speaks with preset speakers and cannot clone a voice: the reference
//! sample is validated by the profile but not used here. Useful for drafting
//! a narration without an inference server.

use anyhow::Result;
use serde_json::json;
use sherpa_rs::OnnxConfig;
use sherpa_rs::tts::{CommonTtsConfig, KokoroTts, KokoroTtsConfig};
use tracing::{info, warn};

use super::engine::{NativeParams, SpeechModel};
use crate::audio::AudioClip;
use crate::config::AppConfig;
use crate::error::SynthesisError;
use crate::voice::VoiceSettings;

/// Kokoro uses 24000 Hz sample rate
const KOKORO_SAMPLE_RATE: u32 = 24000;

/// Kokoro TTS through sherpa-onnx.
pub struct KokoroModel {
    tts: KokoroTts,  // Kokoro TTS engine
    speaker_id: i32, // Speaker/voice identifier
}

impl KokoroModel {
    /// Create a new Kokoro model.
    ///
    /// # Errors
    /// Returns an error if TTS initialization fails (e.g., missing model files).
    pub fn new(config: &AppConfig) -> Result<Self> {
        let provider = config.effective_provider();

        info!("Initializing Kokoro TTS with {} provider (speaker ID: {})", provider, config.speaker_id);
        warn!("Kokoro uses preset speakers; the uploaded voice sample will not be cloned");

        let tts_config = KokoroTtsConfig {
            model: config.kokoro_model_path().to_string_lossy().to_string(),
            voices: config.kokoro_voices_path().to_string_lossy().to_string(),
            tokens: config.kokoro_tokens_path().to_string_lossy().to_string(),
            data_dir: config.kokoro_data_dir().to_string_lossy().to_string(),
            dict_dir: config.kokoro_dict_dir().to_string_lossy().to_string(),
            lexicon: config.kokoro_lexicon_path().to_string_lossy().to_string(),
            lang: String::new(), // English lexicon covers pronunciation
            length_scale: 1.0,
            onnx_config: OnnxConfig {
                provider: provider.as_sherpa_provider().to_string(),
                num_threads: config.tts_threads.try_into().unwrap_or(2),
                debug: config.verbose,
            },
            common_config: CommonTtsConfig { max_num_sentences: 1, ..Default::default() }, // Kokoro only supports 1
        };

        Ok(Self { tts: KokoroTts::new(tts_config), speaker_id: config.speaker_id })
    }
}

impl SpeechModel for KokoroModel {
    fn name(&self) -> &str {
        "kokoro"
    }

    fn sample_rate(&self) -> u32 {
        KOKORO_SAMPLE_RATE
    }

    fn native_params(&self, settings: &VoiceSettings) -> NativeParams {
        let mut params = NativeParams::new();
        params.insert("sid".to_string(), json!(self.speaker_id));
        params.insert("speed".to_string(), json!(settings.pace));
        params
    }

    fn generate(&mut self, text: &str, _reference: &AudioClip, params: &NativeParams) -> Result<AudioClip, SynthesisError> {
        let sid = params.get("sid").and_then(|v| v.as_i64()).map_or(self.speaker_id, |v| v as i32);
        let speed = params.get("speed").and_then(|v| v.as_f64()).unwrap_or(1.0) as f32;

        let audio = self.tts.create(text, sid, speed).map_err(|e| {
            let message = format!("TTS generation failed: {}", e);
            if message.to_ascii_lowercase().contains("out of memory") {
                SynthesisError::ResourceExhausted(message)
            } else {
                SynthesisError::Model(message)
            }
        })?;

        Ok(AudioClip::new(audio.samples, KOKORO_SAMPLE_RATE))
    }
}
