//! Recognized synthesis parameters and their validated ranges.
//!
//! The pipeline only ever speaks in these names; synthesis backends translate
//! them into whatever their model calls the same idea.

use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// Static description of one tunable parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub help: &'static str,
}

/// All numeric parameters (sorted by name for binary search).
pub const PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec { name: "cfg_weight", min: 0.0, max: 1.0, default: 0.5, help: "Adherence to the reference voice (lower = closer to the sample)" },
    ParameterSpec { name: "exaggeration", min: 0.0, max: 2.0, default: 0.5, help: "Emotional expressiveness of the delivery" },
    ParameterSpec { name: "pace", min: 0.5, max: 2.0, default: 1.0, help: "Speaking rate multiplier" },
    ParameterSpec { name: "temperature", min: 0.05, max: 2.0, default: 0.8, help: "Sampling randomness of the model" },
];

/// Look up a parameter by name.
pub fn find_parameter(name: &str) -> Option<&'static ParameterSpec> {
    PARAMETERS.binary_search_by_key(&name, |p| p.name).ok().map(|idx| &PARAMETERS[idx])
}

/// Validate `value` against the named parameter's range.
pub fn check_range(name: &str, value: f32) -> Result<f32, InputError> {
    let spec = find_parameter(name).ok_or_else(|| InputError::UnknownParameter(name.to_string()))?;
    if value.is_finite() && (spec.min..=spec.max).contains(&value) {
        Ok(value)
    } else {
        Err(InputError::ParameterOutOfRange { name: spec.name, value, min: spec.min, max: spec.max })
    }
}

/// Synthesis parameter set shared by every chunk of a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub exaggeration: f32,
    pub pace: f32,
    pub cfg_weight: f32,
    pub temperature: f32,
    /// Fixed seed for reproducible generation; `None` lets the model pick
    pub seed: Option<u64>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self { exaggeration: 0.5, pace: 1.0, cfg_weight: 0.5, temperature: 0.8, seed: None }
    }
}

impl VoiceSettings {
    /// Check every parameter against its range.
    pub fn validate(&self) -> Result<(), InputError> {
        for spec in PARAMETERS {
            // get() covers every name in PARAMETERS
            if let Some(value) = self.get(spec.name) {
                check_range(spec.name, value)?;
            }
        }
        Ok(())
    }

    /// Read a numeric parameter by name.
    pub fn get(&self, name: &str) -> Option<f32> {
        match name {
            "exaggeration" => Some(self.exaggeration),
            "pace" => Some(self.pace),
            "cfg_weight" => Some(self.cfg_weight),
            "temperature" => Some(self.temperature),
            _ => None,
        }
    }

    /// Set a numeric parameter by name after range validation.
    pub fn set(&mut self, name: &str, value: f32) -> Result<(), InputError> {
        let value = check_range(name, value)?;
        match name {
            "exaggeration" => self.exaggeration = value,
            "pace" => self.pace = value,
            "cfg_weight" => self.cfg_weight = value,
            "temperature" => self.temperature = value,
            _ => return Err(InputError::UnknownParameter(name.to_string())),
        }
        Ok(())
    }
}

/// Print the parameter table.
pub fn print_parameters() {
    println!("═══════════════════════════════════════════════════════════════════");
    println!("  Voice Parameters");
    println!("═══════════════════════════════════════════════════════════════════");
    println!();
    println!("{:<14} {:>6} {:>6} {:>8}  DESCRIPTION", "NAME", "MIN", "MAX", "DEFAULT");
    println!("{}", "─".repeat(70));

    for spec in PARAMETERS {
        println!("{:<14} {:>6.2} {:>6.2} {:>8.2}  {}", spec.name, spec.min, spec.max, spec.default, spec.help);
    }
    println!("{:<14} {:>6} {:>6} {:>8}  {}", "seed", "-", "-", "random", "Fixed seed for reproducible generation");

    println!();
    println!("Usage:");
    println!("  ./book-narrator --text book.txt --voice me.wav --exaggeration 0.7 --pace 0.9");
    println!();
}
