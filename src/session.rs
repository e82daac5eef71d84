//! Narration session: the single owner of document, voice and ledger state.
//!
//! Replace rules:
//! - a new document rebuilds the chunk list and resets the ledger
//! - a new voice sample or different settings invalidate every chunk
//! - none of these are allowed while a run is active

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::audio::ExportFormat;
use crate::error::{InputError, NarratorError, Result};
use crate::pipeline::{
    AssembledTrack, Assembler, AssemblyConfig, Ledger, LedgerSnapshot, PipelineController, Progress, RunMode, RunReport, RunState,
};
use crate::text::{Chunk, Chunker, ChunkerConfig, Document};
use crate::tts::Synthesizer;
use crate::voice::{DEFAULT_MIN_REFERENCE, VoiceProfile, VoiceSettings};

/// Library-side session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub chunker: ChunkerConfig,
    pub assembly: AssemblyConfig,
    /// Shortest accepted reference sample (T_min)
    pub min_reference: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { chunker: ChunkerConfig::default(), assembly: AssemblyConfig::default(), min_reference: DEFAULT_MIN_REFERENCE }
    }
}

/// Read-only view of a session's progress, usable from other threads.
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    ledger: Arc<Ledger>,
    state: Arc<RwLock<RunState>>,
}

impl ProgressHandle {
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }

    pub fn progress(&self) -> Progress {
        self.ledger.snapshot().progress()
    }

    pub fn run_state(&self) -> RunState {
        *self.state.read()
    }
}

/// Cooperative cancel signal for the current (or next) run.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: Arc<Mutex<CancellationToken>>,
}

impl CancelHandle {
    /// Stop the run before its next chunk. A cancel sent while idle stops the next run immediately.
    pub fn cancel(&self) {
        self.token.lock().cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.lock().is_cancelled()
    }

    fn current(&self) -> CancellationToken {
        self.token.lock().clone()
    }

    /// Arm a fresh token once a cancel has been consumed by a run.
    fn rearm(&self) {
        let mut token = self.token.lock();
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
    }
}

/// One narration job: a document, a voice and the generated audio.
pub struct Session {
    config: SessionConfig,
    synthesizer: Synthesizer,
    assembler: Assembler,
    document: Option<Document>,
    chunks: Vec<Chunk>,
    settings: VoiceSettings,
    profile: Option<VoiceProfile>,
    ledger: Arc<Ledger>,
    controller: PipelineController,
    cancel: CancelHandle,
}

impl Session {
    pub fn new(synthesizer: Synthesizer, config: SessionConfig) -> Self {
        let ledger = Arc::new(Ledger::default());
        Self {
            config,
            synthesizer,
            assembler: Assembler::new(config.assembly),
            document: None,
            chunks: Vec::new(),
            settings: VoiceSettings::default(),
            profile: None,
            controller: PipelineController::new(Arc::clone(&ledger)),
            ledger,
            cancel: CancelHandle::default(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn profile(&self) -> Option<&VoiceProfile> {
        self.profile.as_ref()
    }

    pub fn settings(&self) -> &VoiceSettings {
        &self.settings
    }

    /// Sample rate of generated chunk audio.
    pub fn sample_rate(&self) -> u32 {
        self.synthesizer.sample_rate()
    }

    pub fn run_state(&self) -> RunState {
        self.controller.state()
    }

    /// Load a document, replacing the previous one and all of its audio.
    ///
    /// An empty document is accepted and yields zero chunks.
    ///
    /// # Returns
    /// Number of chunks.
    pub fn submit_document(&mut self, document: Document) -> Result<usize> {
        self.ensure_idle()?;

        let chunks = Chunker::new(self.config.chunker).chunk(document.text());
        self.ledger.reset(chunks.len());

        info!(
            "📖 Loaded \"{}\" ({}): {} chars in {} chunks",
            document.meta().title,
            document.meta().format,
            document.text().chars().count(),
            chunks.len()
        );

        self.chunks = chunks;
        self.document = Some(document);
        Ok(self.chunks.len())
    }

    /// Drop the document, its chunks and all generated audio.
    pub fn close_document(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.document = None;
        self.chunks.clear();
        self.ledger.reset(0);
        Ok(())
    }

    /// Use the given WAV bytes as the reference voice. Invalidates all generated audio.
    ///
    /// # Errors
    /// `InvalidVoiceSample` when the sample is empty, corrupt, silent or too short.
    pub fn submit_voice_sample(&mut self, wav: &[u8]) -> Result<()> {
        self.ensure_idle()?;
        let profile = VoiceProfile::from_wav_bytes(wav, self.settings, self.config.min_reference)?;
        self.replace_profile(profile);
        Ok(())
    }

    /// Replace the voice settings.
    ///
    /// # Returns
    /// `true` if the settings changed (all generated audio was invalidated).
    pub fn configure(&mut self, settings: VoiceSettings) -> Result<bool> {
        self.ensure_idle()?;
        settings.validate()?;
        if settings == self.settings {
            return Ok(false);
        }

        if let Some(profile) = self.profile.as_ref().map(|p| p.with_settings(settings)).transpose()? {
            self.replace_profile(profile);
        }
        self.settings = settings;
        Ok(true)
    }

    /// Change one named parameter. See [`Session::configure`].
    pub fn set_parameter(&mut self, name: &str, value: f32) -> Result<bool> {
        let mut settings = self.settings;
        settings.set(name, value)?;
        self.configure(settings)
    }

    /// Replace how finished chunks are joined. Generated audio is kept.
    pub fn set_assembly(&mut self, config: AssemblyConfig) {
        self.config.assembly = config;
        self.assembler = Assembler::new(config);
    }

    /// Generate audio for the chunks selected by `mode`.
    ///
    /// Blocks until the run finishes or is cancelled.
    ///
    /// # Errors
    /// `NoDocument`, `EmptyDocument` or `NoVoiceSample` before anything is
    /// generated; chunk failures are recorded in the ledger instead.
    pub fn run(&mut self, mode: RunMode) -> Result<RunReport> {
        self.ensure_idle()?;
        if self.document.is_none() {
            return Err(InputError::NoDocument.into());
        }
        if self.chunks.is_empty() {
            return Err(InputError::EmptyDocument.into());
        }
        let profile = self.profile.as_ref().ok_or(InputError::NoVoiceSample)?;

        let token = self.cancel.current();
        let result = self.controller.run(&self.chunks, profile, &mut self.synthesizer, mode, &token);
        self.cancel.rearm();

        let report = result?;
        let progress = self.progress();
        info!(
            "🏁 Run finished ({:?}): {} done, {} failed, {} pending of {} in {:.1}s",
            report.state,
            progress.done,
            progress.failed,
            progress.pending,
            progress.total,
            report.elapsed.as_secs_f32()
        );
        Ok(report)
    }

    /// Return a failed chunk to pending. No-op for pending or done chunks.
    pub fn retry(&mut self, index: usize) -> Result<bool> {
        self.ensure_idle()?;
        self.ledger.retry(index)
    }

    /// Return every failed chunk to pending.
    pub fn retry_failed(&mut self) -> Result<usize> {
        self.ensure_idle()?;
        Ok(self.ledger.retry_failed())
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }

    pub fn progress(&self) -> Progress {
        self.ledger.snapshot().progress()
    }

    pub fn progress_handle(&self) -> ProgressHandle {
        ProgressHandle { ledger: Arc::clone(&self.ledger), state: self.controller.state_handle() }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Join the finished chunks according to the assembly policy.
    pub fn assemble(&self) -> Result<AssembledTrack> {
        self.assembler.assemble(&self.ledger.snapshot(), &self.chunks, self.config.chunker.unit, self.synthesizer.sample_rate())
    }

    /// Assemble and write the narration as WAV.
    pub fn export_track(&self, path: impl AsRef<Path>, format: ExportFormat) -> Result<AssembledTrack> {
        let path = path.as_ref();
        let track = self.assemble()?;
        track.write_wav(path, format)?;
        info!(
            "💾 Exported {:.1}s ({} of {} chunks) to {}",
            track.duration().as_secs_f32(),
            track.included.len(),
            self.chunks.len(),
            path.display()
        );
        Ok(track)
    }

    /// Write the audio of one done chunk as WAV (for previewing a single chunk).
    pub fn export_chunk(&self, index: usize, path: impl AsRef<Path>, format: ExportFormat) -> Result<()> {
        let snapshot = self.ledger.snapshot();
        let result = snapshot.get(index).ok_or(InputError::ChunkOutOfRange { index, len: snapshot.len() })?;
        let audio = result.audio.as_ref().ok_or(NarratorError::NothingToExport)?;
        audio.write_wav(path, format)?;
        Ok(())
    }

    fn replace_profile(&mut self, profile: VoiceProfile) {
        let reset = self.ledger.invalidate();
        if reset > 0 {
            info!("🔄 Voice changed, {} generated chunk(s) reset to pending", reset);
        }
        debug!("Voice profile {} active", profile.id());
        self.settings = *profile.settings();
        self.profile = Some(profile);
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.controller.state() == RunState::Running {
            return Err(NarratorError::RunInProgress);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::RemoteModel;

    fn session() -> Session {
        let model = RemoteModel::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        Session::new(Synthesizer::new(Box::new(model)), SessionConfig::default())
    }

    #[test]
    fn test_run_requires_document_and_voice() {
        let mut session = session();
        assert!(matches!(session.run(RunMode::FullBook), Err(NarratorError::Input(InputError::NoDocument))));

        session.submit_document(Document::new("  \n ", Default::default())).unwrap();
        assert!(matches!(session.run(RunMode::FullBook), Err(NarratorError::Input(InputError::EmptyDocument))));

        assert_eq!(session.submit_document(Document::new("Hello there.", Default::default())).unwrap(), 1);
        assert!(matches!(session.run(RunMode::FullBook), Err(NarratorError::Input(InputError::NoVoiceSample))));
        assert_eq!(session.run_state(), RunState::Idle);
    }

    #[test]
    fn test_configure_without_profile_keeps_settings() {
        let mut session = session();
        assert!(session.set_parameter("pace", 1.5).unwrap());
        assert!(!session.set_parameter("pace", 1.5).unwrap());
        assert_eq!(session.settings().pace, 1.5);
        assert!(session.set_parameter("pace", 7.0).is_err());
        assert!(session.set_parameter("volume", 1.0).is_err());
    }

    #[test]
    fn test_close_document_clears_chunks() {
        let mut session = session();
        session.submit_document(Document::new("One. Two.", Default::default())).unwrap();
        session.close_document().unwrap();
        assert!(session.document().is_none());
        assert!(session.chunks().is_empty());
        assert_eq!(session.progress().total, 0);
    }

    #[test]
    fn test_mutating_verbs_are_rejected_while_running() {
        let mut session = session();
        session.submit_document(Document::new("One. Two.", Default::default())).unwrap();
        *session.controller.state_handle().write() = RunState::Running;

        assert!(matches!(session.run(RunMode::FullBook), Err(NarratorError::RunInProgress)));
        assert!(matches!(session.submit_document(Document::new("Three.", Default::default())), Err(NarratorError::RunInProgress)));
        assert!(matches!(session.close_document(), Err(NarratorError::RunInProgress)));
        assert!(matches!(session.submit_voice_sample(&[]), Err(NarratorError::RunInProgress)));
        assert!(matches!(session.set_parameter("pace", 1.5), Err(NarratorError::RunInProgress)));
        assert!(matches!(session.retry(0), Err(NarratorError::RunInProgress)));
        assert!(matches!(session.retry_failed(), Err(NarratorError::RunInProgress)));

        // reads stay available
        assert_eq!(session.progress().pending, 2);
        assert_eq!(session.chunks().len(), 2);
    }

    #[test]
    fn test_cancel_handle_rearms_only_after_use() {
        let handle = CancelHandle::default();
        handle.rearm();
        assert!(!handle.is_cancelled());
        handle.cancel();
        assert!(handle.current().is_cancelled());
        handle.rearm();
        assert!(!handle.is_cancelled());
    }
}
