//! Voice profiles and the recognized synthesis parameters.

mod profile;
mod settings;

pub use profile::{DEFAULT_MIN_REFERENCE, VoiceProfile};
pub use settings::{PARAMETERS, ParameterSpec, VoiceSettings, check_range, find_parameter, print_parameters};
