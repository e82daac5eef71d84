//! Book Narrator - long-form document narration with a cloned voice.
//!
//! Text is normalized and split into bounded chunks, each chunk is
//! synthesized independently with the same voice profile while a ledger
//! tracks its status, and finished chunks are joined into one track.

pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod text;
pub mod tts;
pub mod voice;

pub use error::{InputError, NarratorError, Result, SynthesisError};
pub use session::{CancelHandle, ProgressHandle, Session, SessionConfig};
