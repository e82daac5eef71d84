//! Error types for the narration pipeline.
//!
//! Three layers:
//! - [`InputError`]: bad documents, voice samples or parameters. Blocks a run from starting.
//! - [`SynthesisError`]: scoped to a single chunk. Recorded in the ledger, never aborts a run.
//! - [`NarratorError`]: everything a session operation can return.

use thiserror::Error;

use crate::pipeline::ChunkStatus;

/// Problems with user-supplied input, surfaced before any generation starts.
#[derive(Debug, Error)]
pub enum InputError {
    /// The document normalized to nothing speakable
    #[error("document contains no speakable text")]
    EmptyDocument,

    /// A run or export was requested before a document was submitted
    #[error("no document has been submitted")]
    NoDocument,

    /// A run was requested before a voice sample was submitted
    #[error("no voice sample has been submitted")]
    NoVoiceSample,

    /// Reference audio is too short, silent or undecodable
    #[error("invalid voice sample: {0}")]
    InvalidVoiceSample(String),

    /// A voice parameter is outside its validated range
    #[error("parameter '{name}' = {value} is outside [{min}, {max}]")]
    ParameterOutOfRange { name: &'static str, value: f32, min: f32, max: f32 },

    /// A parameter name not in the recognized set
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    /// A chunk index that does not exist in the current document
    #[error("chunk {index} does not exist (document has {len} chunks)")]
    ChunkOutOfRange { index: usize, len: usize },
}

/// Failure of a single synthesis call.
///
/// Cloned into the ledger so the front end can show it next to the failed chunk.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthesisError {
    /// Nothing to say
    #[error("chunk text is empty")]
    EmptyText,

    /// The model rejected a parameter or the request shape
    #[error("invalid synthesis parameter: {0}")]
    InvalidParameter(String),

    /// Out of memory, server overloaded, timed out
    #[error("synthesis resources exhausted: {0}")]
    ResourceExhausted(String),

    /// Any other model failure
    #[error("synthesis model error: {0}")]
    Model(String),
}

impl SynthesisError {
    /// Whether trying the same chunk again later may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, SynthesisError::ResourceExhausted(_))
    }
}

/// Error type returned by session and pipeline operations.
#[derive(Debug, Error)]
pub enum NarratorError {
    #[error(transparent)]
    Input(#[from] InputError),

    /// Ledger misuse. Indicates a bug in the caller, never expected in normal operation.
    #[error("invalid transition for chunk {index}: {from:?} -> {to:?}")]
    InvalidTransition { index: usize, from: ChunkStatus, to: ChunkStatus },

    /// The session is busy with another run
    #[error("a generation run is already in progress")]
    RunInProgress,

    /// Export requested with no generated audio
    #[error("no generated audio to export")]
    NothingToExport,

    /// Audio processing failure (resampling, format conversion)
    #[error("audio error: {0}")]
    Audio(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for narrator operations.
pub type Result<T> = std::result::Result<T, NarratorError>;
