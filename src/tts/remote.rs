//! Voice-cloning model served over HTTP.
//!
//! Talks to a Chatterbox-style inference server: one multipart `POST
//! {url}/generate` per chunk carrying the text, the reference sample as a WAV
//! file part and the model's own parameter names; the response body is WAV.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::engine::{NativeParams, SpeechModel};
use crate::audio::{AudioClip, ExportFormat};
use crate::error::SynthesisError;
use crate::voice::VoiceSettings;

/// Output rate of Chatterbox-family models.
pub const REMOTE_SAMPLE_RATE: u32 = 24000;

/// Speech model reached through an HTTP inference server.
pub struct RemoteModel {
    client: Client,   // Blocking HTTP client (synthesis runs on a blocking thread)
    endpoint: String, // Full URL of the generate route
}

impl RemoteModel {
    /// Create a client for the server at `base_url`.
    ///
    /// Must be called outside of an async context (blocking client).
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let endpoint = format!("{}/generate", base_url.trim_end_matches('/'));
        info!("Using remote synthesis server at {}", endpoint);

        let client = Client::builder().timeout(timeout).build().context("Failed to create HTTP client")?;

        Ok(Self { client, endpoint })
    }
}

impl SpeechModel for RemoteModel {
    fn name(&self) -> &str {
        "remote"
    }

    fn sample_rate(&self) -> u32 {
        REMOTE_SAMPLE_RATE
    }

    fn native_params(&self, settings: &VoiceSettings) -> NativeParams {
        let mut params = NativeParams::new();
        params.insert("exaggeration".to_string(), decimal(settings.exaggeration));
        params.insert("cfg_weight".to_string(), decimal(settings.cfg_weight));
        params.insert("temperature".to_string(), decimal(settings.temperature));
        params.insert("speed".to_string(), decimal(settings.pace));
        if let Some(seed) = settings.seed {
            params.insert("seed".to_string(), json!(seed));
        }
        params
    }

    fn generate(&mut self, text: &str, reference: &AudioClip, params: &NativeParams) -> Result<AudioClip, SynthesisError> {
        let prompt = reference
            .to_wav_bytes(ExportFormat::Pcm16)
            .map_err(|e| SynthesisError::Model(format!("cannot encode reference sample: {}", e)))?;
        let prompt = Part::bytes(prompt)
            .file_name("reference.wav")
            .mime_str("audio/wav")
            .map_err(|e| SynthesisError::Model(e.to_string()))?;

        let mut form = Form::new().text("text", text.to_string());
        for (name, value) in params {
            form = form.text(name.clone(), field_value(value));
        }
        let form = form.part("audio_prompt", prompt);

        let response = self.client.post(&self.endpoint).multipart(form).send().map_err(classify_transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, &error_detail(response)));
        }

        let body = response.bytes().map_err(classify_transport)?;
        debug!("Received {} bytes of audio", body.len());

        AudioClip::from_wav_bytes(&body).map_err(|e| SynthesisError::Model(format!("server returned invalid WAV: {}", e)))
    }
}

/// Shortest decimal form of an f32 ("0.7", not the widened "0.699999988079071").
fn decimal(value: f32) -> Value {
    Value::String(value.to_string())
}

/// Form fields are plain strings; JSON strings lose their quotes.
fn field_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn classify_transport(e: reqwest::Error) -> SynthesisError {
    if e.is_timeout() || e.is_connect() {
        SynthesisError::ResourceExhausted(format!("synthesis server unavailable: {}", e))
    } else {
        SynthesisError::Model(e.to_string())
    }
}

/// Map an HTTP failure status to a chunk-scoped error.
fn classify_status(status: StatusCode, detail: &str) -> SynthesisError {
    let message = format!("{}: {}", status, detail);
    let out_of_memory = detail.to_ascii_lowercase().contains("out of memory");

    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE | StatusCode::INSUFFICIENT_STORAGE => SynthesisError::ResourceExhausted(message),
        _ if out_of_memory => SynthesisError::ResourceExhausted(message),
        s if s.is_client_error() => SynthesisError::InvalidParameter(message),
        _ => SynthesisError::Model(message),
    }
}

/// Best-effort error message from a failed response (`{"detail": ..}`, `{"error": ..}` or raw text).
fn error_detail(response: Response) -> String {
    let body = response.text().unwrap_or_default();
    match serde_json::from_str::<Value>(&body) {
        Ok(json) => ["detail", "error", "message"]
            .iter()
            .find_map(|key| json.get(key).map(field_value))
            .unwrap_or(body),
        Err(_) => body,
    }
}
