//! Chunked generation pipeline: ledger, controller and assembler.

mod assembler;
mod controller;
mod ledger;

pub use assembler::{AssembledTrack, Assembler, AssemblyConfig, AssemblyPolicy, DEFAULT_FADE, DEFAULT_GAP};
pub use controller::{PipelineController, RunMode, RunReport, RunState};
pub use ledger::{ChunkResult, ChunkStatus, Ledger, LedgerSnapshot, Progress};
