//! Sequential chunk generation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ledger::{ChunkStatus, Ledger};
use crate::error::{InputError, Result};
use crate::text::Chunk;
use crate::tts::Synthesizer;
use crate::voice::VoiceProfile;

/// Which chunks a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// One chunk by index; a failed chunk is retried first, a done chunk is skipped
    SingleChunk(usize),
    /// Every pending chunk, in index order
    FullBook,
}

/// Pipeline run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    PartiallyFailed,
    Cancelled,
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub state: RunState,
    pub attempted: usize, // Chunks handed to the synthesizer
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize, // Targets not started because of cancellation or already done
    pub elapsed: Duration,
}

/// Drives chunks through the synthesizer one at a time, recording every
/// outcome in the ledger.
#[derive(Debug)]
pub struct PipelineController {
    ledger: Arc<Ledger>,
    state: Arc<RwLock<RunState>>,
}

impl PipelineController {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger, state: Arc::new(RwLock::new(RunState::Idle)) }
    }

    pub fn state(&self) -> RunState {
        *self.state.read()
    }

    /// Shared view of the run state for progress reporting.
    pub fn state_handle(&self) -> Arc<RwLock<RunState>> {
        Arc::clone(&self.state)
    }

    /// Generate the chunks selected by `mode`.
    ///
    /// A chunk failure is recorded and the run moves on. `cancel` is checked
    /// before each chunk; the chunk in flight always finishes.
    ///
    /// # Errors
    /// `ChunkOutOfRange` for a bad single-chunk index; `InvalidTransition` if
    /// the ledger was driven out of order. Both leave the controller idle.
    ///
    /// If the model panics, the unwind leaves the controller idle and the
    /// chunk in flight failed, so it can be retried.
    pub fn run(&self, chunks: &[Chunk], profile: &VoiceProfile, synthesizer: &mut Synthesizer, mode: RunMode, cancel: &CancellationToken) -> Result<RunReport> {
        *self.state.write() = RunState::Running;
        let guard = RunGuard { controller: self, armed: true };

        let result = self.run_targets(chunks, profile, synthesizer, mode, cancel);
        guard.disarm();
        *self.state.write() = match &result {
            Ok(report) => report.state,
            Err(_) => RunState::Idle,
        };
        result
    }

    fn run_targets(&self, chunks: &[Chunk], profile: &VoiceProfile, synthesizer: &mut Synthesizer, mode: RunMode, cancel: &CancellationToken) -> Result<RunReport> {
        let started = Instant::now();
        let (targets, mut skipped) = self.select_targets(mode)?;

        info!("▶️ Generating {} chunk(s) ({:?})", targets.len(), mode);

        let (mut attempted, mut completed, mut failed) = (0, 0, 0);
        let mut cancelled = false;

        for (position, &index) in targets.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                skipped += targets.len() - position;
                info!("⏹️ Run cancelled before chunk {}", index);
                break;
            }

            let chunk = chunks.get(index).ok_or(InputError::ChunkOutOfRange { index, len: chunks.len() })?;
            self.ledger.mark_generating(index)?;
            attempted += 1;
            debug!("Dispatching chunk {} ({} chars)", index, chunk.text.chars().count());

            let chunk_started = Instant::now();
            match synthesizer.synthesize(&chunk.text, profile) {
                Ok(audio) => {
                    info!(
                        "✅ Chunk {}/{} done: {:.1}s of audio in {:.1}s",
                        index + 1,
                        chunks.len(),
                        audio.duration().as_secs_f32(),
                        chunk_started.elapsed().as_secs_f32()
                    );
                    self.ledger.complete(index, audio)?;
                    completed += 1;
                }
                Err(e) => {
                    warn!("❌ Chunk {}/{} failed (retriable: {}): {}", index + 1, chunks.len(), e.is_retriable(), e);
                    self.ledger.fail(index, e)?;
                    failed += 1;
                }
            }
        }

        let state = if cancelled {
            RunState::Cancelled
        } else if failed > 0 {
            RunState::PartiallyFailed
        } else {
            RunState::Completed
        };

        Ok(RunReport { state, attempted, completed, failed, skipped, elapsed: started.elapsed() })
    }

    /// Chunk indices to generate and how many targets were skipped up front.
    fn select_targets(&self, mode: RunMode) -> Result<(Vec<usize>, usize)> {
        match mode {
            RunMode::FullBook => Ok((self.ledger.snapshot().indices_with(ChunkStatus::Pending), 0)),
            RunMode::SingleChunk(index) => {
                let len = self.ledger.len();
                match self.ledger.status(index) {
                    None => Err(InputError::ChunkOutOfRange { index, len }.into()),
                    Some(ChunkStatus::Done) => {
                        debug!("Chunk {} already done, skipping", index);
                        Ok((Vec::new(), 1))
                    }
                    Some(ChunkStatus::Failed) => {
                        self.ledger.retry(index)?;
                        Ok((vec![index], 0))
                    }
                    Some(_) => Ok((vec![index], 0)),
                }
            }
        }
    }
}

/// Resets the controller when a run unwinds before reporting.
struct RunGuard<'a> {
    controller: &'a PipelineController,
    armed: bool,
}

impl RunGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let aborted = self.controller.ledger.abort_generating("generation aborted");
        *self.controller.state.write() = RunState::Idle;
        warn!("⚠️ Run aborted, {} chunk(s) in flight marked failed", aborted);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::panic::AssertUnwindSafe;

    use serde_json::json;

    use super::*;
    use crate::audio::AudioClip;
    use crate::error::{NarratorError, SynthesisError};
    use crate::text::{Chunker, ChunkerConfig};
    use crate::tts::{NativeParams, SpeechModel};
    use crate::voice::{DEFAULT_MIN_REFERENCE, VoiceSettings};

    /// Fails the chunks whose text contains one of `poison`; cancels `cancel_after` calls in.
    struct ScriptedModel {
        poison: HashSet<String>,
        cancel_after: Option<(usize, CancellationToken)>,
        calls: usize,
    }

    impl SpeechModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        fn sample_rate(&self) -> u32 {
            8000
        }

        fn native_params(&self, settings: &VoiceSettings) -> NativeParams {
            let mut params = NativeParams::new();
            params.insert("speed".to_string(), json!(settings.pace));
            params
        }

        fn generate(&mut self, text: &str, _reference: &AudioClip, _params: &NativeParams) -> std::result::Result<AudioClip, SynthesisError> {
            self.calls += 1;
            if let Some((after, token)) = &self.cancel_after
                && self.calls >= *after
            {
                token.cancel();
            }
            if self.poison.iter().any(|p| text.contains(p.as_str())) {
                return Err(SynthesisError::ResourceExhausted("out of memory".to_string()));
            }
            Ok(AudioClip::new(vec![0.25; 800], 8000))
        }
    }

    struct PanickingModel;

    impl SpeechModel for PanickingModel {
        fn name(&self) -> &str {
            "panicking"
        }

        fn sample_rate(&self) -> u32 {
            8000
        }

        fn native_params(&self, _settings: &VoiceSettings) -> NativeParams {
            NativeParams::new()
        }

        fn generate(&mut self, _text: &str, _reference: &AudioClip, _params: &NativeParams) -> std::result::Result<AudioClip, SynthesisError> {
            panic!("model crashed");
        }
    }

    fn chunks() -> Vec<Chunk> {
        let text = "First one. Second one. Third one. Fourth one. Fifth one.";
        Chunker::new(ChunkerConfig { max_len: 12, ..Default::default() }).chunk(text)
    }

    fn profile() -> VoiceProfile {
        let samples = (0..8000 * 6).map(|i| (i as f32 * 0.02).sin() * 0.4).collect();
        VoiceProfile::new(AudioClip::new(samples, 8000), VoiceSettings::default(), DEFAULT_MIN_REFERENCE).unwrap()
    }

    fn synthesizer(poison: &[&str], cancel_after: Option<(usize, CancellationToken)>) -> Synthesizer {
        let poison = poison.iter().map(|p| p.to_string()).collect();
        Synthesizer::new(Box::new(ScriptedModel { poison, cancel_after, calls: 0 }))
    }

    #[test]
    fn test_full_book_continues_past_failures() {
        let chunks = chunks();
        assert_eq!(chunks.len(), 5);
        let ledger = Arc::new(Ledger::new(chunks.len()));
        let controller = PipelineController::new(Arc::clone(&ledger));

        let report = controller
            .run(&chunks, &profile(), &mut synthesizer(&["Third"], None), RunMode::FullBook, &CancellationToken::new())
            .unwrap();

        assert_eq!(report.state, RunState::PartiallyFailed);
        assert_eq!((report.attempted, report.completed, report.failed, report.skipped), (5, 4, 1, 0));
        assert_eq!(controller.state(), RunState::PartiallyFailed);

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.indices_with(ChunkStatus::Failed), vec![2]);
        assert!(snapshot.get(2).unwrap().error.as_ref().is_some_and(|e| e.is_retriable()));
    }

    #[test]
    fn test_full_book_resumes_pending_only() {
        let chunks = chunks();
        let ledger = Arc::new(Ledger::new(chunks.len()));
        let controller = PipelineController::new(Arc::clone(&ledger));
        let profile = profile();

        controller.run(&chunks, &profile, &mut synthesizer(&["Third"], None), RunMode::FullBook, &CancellationToken::new()).unwrap();
        let report = controller.run(&chunks, &profile, &mut synthesizer(&[], None), RunMode::FullBook, &CancellationToken::new()).unwrap();

        // failed chunk is not pending, so nothing is left to do without a retry
        assert_eq!(report.attempted, 0);
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(ledger.status(2), Some(ChunkStatus::Failed));
    }

    #[test]
    fn test_cancellation_stops_between_chunks() {
        let chunks = chunks();
        let ledger = Arc::new(Ledger::new(chunks.len()));
        let controller = PipelineController::new(Arc::clone(&ledger));
        let cancel = CancellationToken::new();

        let mut synth = synthesizer(&[], Some((2, cancel.clone())));
        let report = controller.run(&chunks, &profile(), &mut synth, RunMode::FullBook, &cancel).unwrap();

        // the chunk in flight when cancel fired still completes
        assert_eq!(report.state, RunState::Cancelled);
        assert_eq!((report.attempted, report.completed, report.skipped), (2, 2, 3));
        assert_eq!(ledger.snapshot().progress().pending, 3);
    }

    #[test]
    fn test_single_chunk_mode() {
        let chunks = chunks();
        let ledger = Arc::new(Ledger::new(chunks.len()));
        let controller = PipelineController::new(Arc::clone(&ledger));
        let profile = profile();
        let token = CancellationToken::new();

        let report = controller.run(&chunks, &profile, &mut synthesizer(&["Second"], None), RunMode::SingleChunk(1), &token).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(ledger.snapshot().progress().pending, 4);

        // failed chunk is retried on request
        let report = controller.run(&chunks, &profile, &mut synthesizer(&[], None), RunMode::SingleChunk(1), &token).unwrap();
        assert_eq!((report.completed, report.state), (1, RunState::Completed));

        // done chunk is skipped
        let report = controller.run(&chunks, &profile, &mut synthesizer(&[], None), RunMode::SingleChunk(1), &token).unwrap();
        assert_eq!((report.attempted, report.skipped), (0, 1));
    }

    #[test]
    fn test_model_panic_leaves_controller_recoverable() {
        let chunks = chunks();
        let ledger = Arc::new(Ledger::new(chunks.len()));
        let controller = PipelineController::new(Arc::clone(&ledger));
        let profile = profile();
        let token = CancellationToken::new();

        let mut crashing = Synthesizer::new(Box::new(PanickingModel));
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| controller.run(&chunks, &profile, &mut crashing, RunMode::FullBook, &token)));
        assert!(outcome.is_err());
        assert_eq!(controller.state(), RunState::Idle);
        assert_eq!(ledger.status(0), Some(ChunkStatus::Failed));
        assert_eq!(ledger.snapshot().progress().generating, 0);

        // the failed chunk is retried on request and the rest resume
        assert!(ledger.retry(0).unwrap());
        let report = controller.run(&chunks, &profile, &mut synthesizer(&[], None), RunMode::FullBook, &token).unwrap();
        assert_eq!((report.completed, report.state), (5, RunState::Completed));
    }

    #[test]
    fn test_single_chunk_out_of_range() {
        let chunks = chunks();
        let controller = PipelineController::new(Arc::new(Ledger::new(chunks.len())));
        let result = controller.run(&chunks, &profile(), &mut synthesizer(&[], None), RunMode::SingleChunk(9), &CancellationToken::new());

        assert!(matches!(result, Err(NarratorError::Input(InputError::ChunkOutOfRange { index: 9, len: 5 }))));
        assert_eq!(controller.state(), RunState::Idle);
    }
}
