//! Speech synthesis backends.
//!
//! The pipeline only sees [`Synthesizer`]; backends implement [`SpeechModel`].

mod engine;
#[cfg(feature = "kokoro")]
mod kokoro;
mod remote;

use anyhow::Result;
use tracing::info;

use crate::config::{AppConfig, Engine};

pub use engine::{NativeParams, SpeechModel, Synthesizer};
#[cfg(feature = "kokoro")]
pub use kokoro::KokoroModel;
pub use remote::{REMOTE_SAMPLE_RATE, RemoteModel};

/// Build the synthesizer selected by the configuration.
///
/// Must run outside of an async context: backends may create blocking clients.
///
/// # Errors
/// Returns an error if the backend cannot be initialized.
pub fn build_synthesizer(config: &AppConfig) -> Result<Synthesizer> {
    let model: Box<dyn SpeechModel> = match config.engine {
        Engine::Remote => Box::new(RemoteModel::new(&config.engine_url, config.engine_timeout())?),
        #[cfg(feature = "kokoro")]
        Engine::Kokoro => Box::new(KokoroModel::new(config)?),
        #[cfg(not(feature = "kokoro"))]
        Engine::Kokoro => anyhow::bail!("Kokoro engine requested but this build lacks the `kokoro` feature"),
    };

    let synthesizer = Synthesizer::new(model);
    info!("TTS engine: {} at {} Hz", synthesizer.model_name(), synthesizer.sample_rate());
    Ok(synthesizer)
}
