//! Audio buffers, WAV I/O and resampling.
//!
//! Everything in the pipeline moves audio around as mono [`AudioClip`]s;
//! WAV encoding uses hound and resampling uses rubato.

mod clip;
pub mod resampler;
pub mod util;

pub use clip::{AudioClip, ExportFormat, samples_for};
