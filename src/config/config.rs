//! Application configuration and CLI argument parsing.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audio::ExportFormat;
use crate::pipeline::{AssemblyConfig, AssemblyPolicy, RunMode};
use crate::session::SessionConfig;
use crate::text::{ChunkerConfig, DEFAULT_MAX_CHUNK_LEN, LengthUnit};
use crate::voice::{DEFAULT_MIN_REFERENCE, VoiceSettings, check_range, print_parameters};

/// Hardware acceleration provider for ONNX models.
/// Auto-detected based on platform if not specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// CPU inference (default fallback, always available)
    #[default]
    Cpu,
    /// NVIDIA CUDA acceleration (Linux only, requires CUDA toolkit)
    Cuda,
    /// Apple CoreML acceleration (macOS only, uses Neural Engine)
    #[value(name = "coreml")]
    CoreMl,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sherpa_provider())
    }
}

impl Provider {
    /// Convert to sherpa-rs provider string.
    pub fn as_sherpa_provider(&self) -> &'static str {
        match self {
            Provider::Cpu => "cpu",
            Provider::Cuda => "cuda",
            Provider::CoreMl => "coreml",
        }
    }
}

/// Synthesis backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Voice-cloning inference server reached over HTTP
    #[default]
    Remote,
    /// Offline Kokoro preset speakers (requires the `kokoro` feature; does not clone)
    Kokoro,
}

/// Generation scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Every pending chunk of the book
    #[default]
    Full,
    /// Only the chunk given by --chunk
    Single,
}

/// Book narrator configuration.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "book-narrator")]
#[command(author, version, about = "Narrate a document with a cloned voice", long_about = None)]
pub struct AppConfig {
    /// List the tunable voice parameters and exit
    #[arg(long)]
    pub list_parameters: bool,

    /// Decoded document text (UTF-8); its extension sets the document format
    #[arg(long, short = 't', required_unless_present = "list_parameters")]
    pub text: Option<PathBuf>,

    /// Document title (defaults to the text file name)
    #[arg(long)]
    pub title: Option<String>,

    /// Reference voice sample (WAV)
    #[arg(long, short = 'r', required_unless_present = "list_parameters")]
    pub voice: Option<PathBuf>,

    /// Output WAV file for the assembled narration
    #[arg(long, short = 'o', default_value = "narration.wav")]
    pub output: PathBuf,

    /// Synthesis backend
    #[arg(long, value_enum, default_value = "remote")]
    pub engine: Engine,

    /// Base URL of the synthesis server (remote engine)
    #[arg(long, short = 'u', env = "NARRATOR_ENGINE_URL", default_value = "http://localhost:8004")]
    pub engine_url: String,

    /// Per-chunk request timeout in seconds (remote engine)
    #[arg(long, default_value = "300")]
    pub engine_timeout_secs: u64,

    /// Directory containing model files (kokoro engine)
    #[arg(long, short = 'd', env = "MODEL_DIR", default_value_os_t = default_model_dir())]
    pub model_dir: PathBuf,

    /// Kokoro speaker ID (af_bella=2 in v1.0, bf_emma=21)
    #[arg(long, default_value = "2")]
    pub speaker_id: i32,

    /// Hardware acceleration provider (auto-detected if not specified)
    #[arg(long, value_enum)]
    pub provider: Option<Provider>,

    /// TTS threads (0 = auto-detect based on CPU cores)
    #[arg(long, default_value = "0")]
    pub tts_threads: usize,

    /// Maximum chunk length
    #[arg(long, short = 'l', default_value_t = DEFAULT_MAX_CHUNK_LEN)]
    pub max_chunk_len: usize,

    /// Unit of --max-chunk-len
    #[arg(long, value_enum, default_value = "chars")]
    pub length_unit: LengthUnit,

    /// Expressiveness (0.0-2.0)
    #[arg(long, default_value = "0.5", value_parser = parse_exaggeration)]
    pub exaggeration: f32,

    /// Speaking rate multiplier (0.5-2.0)
    #[arg(long, default_value = "1.0", value_parser = parse_pace)]
    pub pace: f32,

    /// Adherence to the reference voice (0.0-1.0)
    #[arg(long, default_value = "0.5", value_parser = parse_cfg_weight)]
    pub cfg_weight: f32,

    /// Sampling temperature (0.05-2.0)
    #[arg(long, default_value = "0.8", value_parser = parse_temperature)]
    pub temperature: f32,

    /// Fixed seed for reproducible generation
    #[arg(long)]
    pub seed: Option<u64>,

    /// Minimum reference sample length in seconds
    #[arg(long, default_value = "5.0", value_parser = parse_min_reference)]
    pub min_reference_secs: f32,

    /// Generate the whole book or a single chunk
    #[arg(long, value_enum, default_value = "full")]
    pub mode: Mode,

    /// Chunk index for --mode single (0-based)
    #[arg(long)]
    pub chunk: Option<usize>,

    /// Silence between chunks in milliseconds
    #[arg(long, default_value = "250")]
    pub gap_ms: u64,

    /// Fade-in/fade-out at chunk edges in milliseconds
    #[arg(long, default_value = "10")]
    pub fade_ms: u64,

    /// How chunks that are not done are handled when assembling
    #[arg(long, value_enum, default_value = "contiguous")]
    pub assembly: AssemblyPolicy,

    /// Sample format of the exported WAV
    #[arg(long, value_enum, default_value = "pcm16")]
    pub export_format: ExportFormat,

    /// Interval between progress log lines in milliseconds
    #[arg(long, default_value = "1000")]
    pub progress_interval_ms: u64,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        let mut config = Self::parse();

        if config.list_parameters {
            print_parameters();
            std::process::exit(0);
        }

        config.normalize_thread_counts();
        config
    }

    /// Pick a TTS thread count when none was given.
    ///
    /// With CUDA one thread is enough (the GPU handles parallelism); on CPU
    /// cores/3 leaves headroom for the rest of the system.
    fn normalize_thread_counts(&mut self) {
        if self.tts_threads != 0 {
            return;
        }
        let cpu_cores = num_cpus::get();
        self.tts_threads = if self.effective_provider() == Provider::Cuda { 1 } else { (cpu_cores / 3).max(1) };

        if self.verbose {
            info!("CPU cores: {}, TTS threads: {}", cpu_cores, self.tts_threads);
        }
    }

    /// Get the effective acceleration provider.
    pub fn effective_provider(&self) -> Provider {
        self.provider.unwrap_or_else(detect_provider)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }

    /// Minimum reference length; falls back to the default when unrepresentable.
    pub fn min_reference(&self) -> Duration {
        reference_duration(self.min_reference_secs).unwrap_or(DEFAULT_MIN_REFERENCE)
    }

    fn kokoro_dir(&self) -> PathBuf {
        self.model_dir.join("tts").join("kokoro-multi-lang-v1_0")
    }

    /// Get the path to the Kokoro TTS model.
    pub fn kokoro_model_path(&self) -> PathBuf {
        self.kokoro_dir().join("model.onnx")
    }

    /// Get the path to the Kokoro voices.bin file.
    pub fn kokoro_voices_path(&self) -> PathBuf {
        self.kokoro_dir().join("voices.bin")
    }

    pub fn kokoro_tokens_path(&self) -> PathBuf {
        self.kokoro_dir().join("tokens.txt")
    }

    pub fn kokoro_data_dir(&self) -> PathBuf {
        self.kokoro_dir().join("espeak-ng-data")
    }

    pub fn kokoro_dict_dir(&self) -> PathBuf {
        self.kokoro_dir().join("dict")
    }

    /// American English lexicon (narration is English-only).
    pub fn kokoro_lexicon_path(&self) -> PathBuf {
        self.kokoro_dir().join("lexicon-us-en.txt")
    }

    /// Recognized voice parameters from the command line.
    pub fn voice_settings(&self) -> VoiceSettings {
        VoiceSettings {
            exaggeration: self.exaggeration,
            pace: self.pace,
            cfg_weight: self.cfg_weight,
            temperature: self.temperature,
            seed: self.seed,
        }
    }

    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig { max_len: self.max_chunk_len, unit: self.length_unit }
    }

    pub fn assembly_config(&self) -> AssemblyConfig {
        AssemblyConfig { policy: self.assembly, gap: Duration::from_millis(self.gap_ms), fade: Duration::from_millis(self.fade_ms) }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig { chunker: self.chunker_config(), assembly: self.assembly_config(), min_reference: self.min_reference() }
    }

    /// Run mode selected by --mode and --chunk.
    pub fn run_mode(&self) -> Result<RunMode> {
        match (self.mode, self.chunk) {
            (Mode::Full, _) => Ok(RunMode::FullBook),
            (Mode::Single, Some(index)) => Ok(RunMode::SingleChunk(index)),
            (Mode::Single, None) => anyhow::bail!("--mode single requires --chunk"),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        for (flag, path) in [("--text", &self.text), ("--voice", &self.voice)] {
            match path {
                None => anyhow::bail!("{} is required", flag),
                Some(path) if !path.is_file() => anyhow::bail!("File not found: {}", path.display()),
                Some(_) => {}
            }
        }

        if self.max_chunk_len == 0 {
            anyhow::bail!("Maximum chunk length must be positive");
        }
        if reference_duration(self.min_reference_secs).is_none() {
            anyhow::bail!("Minimum reference length must be a positive number of seconds: {}", self.min_reference_secs);
        }
        if self.engine_timeout_secs == 0 {
            anyhow::bail!("Engine timeout must be positive");
        }
        if self.progress_interval_ms == 0 {
            anyhow::bail!("Progress interval must be positive");
        }
        self.run_mode()?;

        match self.engine {
            Engine::Remote => {
                if !(self.engine_url.starts_with("http://") || self.engine_url.starts_with("https://")) {
                    anyhow::bail!("Engine URL must start with http:// or https://: {}", self.engine_url);
                }
            }
            Engine::Kokoro => {
                if !cfg!(feature = "kokoro") {
                    anyhow::bail!("Kokoro engine requested but this build lacks the `kokoro` feature");
                }
                if !self.model_dir.exists() {
                    anyhow::bail!("Model directory does not exist: {}", self.model_dir.display());
                }
                for path in [self.kokoro_model_path(), self.kokoro_voices_path(), self.kokoro_tokens_path()] {
                    if !path.exists() {
                        anyhow::bail!("Required model file not found: {}", path.display());
                    }
                }
            }
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        if let Some(ref text) = self.text {
            info!("  Text: {}", text.display());
        }
        if let Some(ref voice) = self.voice {
            info!("  Voice sample: {}", voice.display());
        }
        info!("  Output: {} ({:?})", self.output.display(), self.export_format);
        match self.engine {
            Engine::Remote => info!("  Engine: remote at {} (timeout {}s)", self.engine_url, self.engine_timeout_secs),
            Engine::Kokoro => info!("  Engine: kokoro (speaker {}, provider {})", self.speaker_id, self.effective_provider()),
        }
        info!("  Chunk length: {} {:?}", self.max_chunk_len, self.length_unit);
        info!(
            "  Voice: exaggeration={} pace={} cfg_weight={} temperature={}",
            self.exaggeration, self.pace, self.cfg_weight, self.temperature
        );
        if let Some(seed) = self.seed {
            info!("  Seed: {}", seed);
        }
        info!("  Mode: {:?}", self.mode);
        info!("  Assembly: {:?} (gap {}ms, fade {}ms)", self.assembly, self.gap_ms, self.fade_ms);
    }
}

/// Get the default model directory (~/.book-narrator/models).
fn default_model_dir() -> PathBuf {
    if let Some(home_dir) = dirs::home_dir() {
        home_dir.join(".book-narrator").join("models")
    } else {
        PathBuf::from("models")
    }
}

/// Auto-detect the best hardware acceleration provider.
fn detect_provider() -> Provider {
    #[cfg(target_os = "macos")]
    {
        Provider::CoreMl
    }

    #[cfg(target_os = "linux")]
    {
        if has_nvidia_gpu() { Provider::Cuda } else { Provider::Cpu }
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Provider::Cpu
    }
}

/// Check if an NVIDIA GPU is available (Linux only).
#[cfg(target_os = "linux")]
fn has_nvidia_gpu() -> bool {
    use std::path::Path;

    let nvidia_paths = [
        "/dev/nvidia0",
        "/dev/nvidiactl",
        "/dev/nvidia-uvm",
        // Jetson devices
        "/dev/nvhost-ctrl",
        "/dev/nvhost-ctrl-gpu",
        "/etc/nv_tegra_release",
    ];

    nvidia_paths.iter().any(|path| Path::new(path).exists())
}

/// A positive, finite duration that fits in a `Duration`.
fn reference_duration(secs: f32) -> Option<Duration> {
    Duration::try_from_secs_f32(secs).ok().filter(|d| !d.is_zero())
}

fn parse_min_reference(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|_| format!("'{}' is not a valid float", s))?;
    match reference_duration(value) {
        Some(_) => Ok(value),
        None => Err(format!("{} is not a usable number of seconds", value)),
    }
}

fn parse_parameter(name: &str, s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|_| format!("'{}' is not a valid float", s))?;
    check_range(name, value).map_err(|e| e.to_string())
}

fn parse_exaggeration(s: &str) -> Result<f32, String> {
    parse_parameter("exaggeration", s)
}

fn parse_pace(s: &str) -> Result<f32, String> {
    parse_parameter("pace", s)
}

fn parse_cfg_weight(s: &str) -> Result<f32, String> {
    parse_parameter("cfg_weight", s)
}

fn parse_temperature(s: &str) -> Result<f32, String> {
    parse_parameter("temperature", s)
}
