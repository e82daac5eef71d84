//! End-to-end session behavior with an in-process speech model.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use book_narrator::audio::{AudioClip, ExportFormat};
use book_narrator::pipeline::{AssemblyConfig, AssemblyPolicy, ChunkStatus, RunMode, RunState};
use book_narrator::text::{ChunkerConfig, Document, DocumentMeta};
use book_narrator::tts::{NativeParams, SpeechModel, Synthesizer};
use book_narrator::voice::VoiceSettings;
use book_narrator::{InputError, NarratorError, ProgressHandle, Session, SessionConfig, SynthesisError};

const RATE: u32 = 8000;
const SAMPLES_PER_CHAR: usize = 10;
const BOOK: &str = "Chapter one begins. The second part. Third is bad. The fourth part. The fifth part.";

#[derive(Default)]
struct ModelState {
    calls: Vec<(String, NativeParams)>,
    poison: Vec<String>,
    /// Progress seen from inside generate: (generating, done)
    observed: Vec<(usize, usize)>,
    progress: Option<ProgressHandle>,
}

type Shared = Arc<Mutex<ModelState>>;

/// Produces `SAMPLES_PER_CHAR` samples per character and fails chunks containing a poisoned word.
struct FakeModel {
    state: Shared,
}

impl SpeechModel for FakeModel {
    fn name(&self) -> &str {
        "fake"
    }

    fn sample_rate(&self) -> u32 {
        RATE
    }

    fn native_params(&self, settings: &VoiceSettings) -> NativeParams {
        let mut params = NativeParams::new();
        params.insert("emotion_scale".to_string(), json!(settings.exaggeration));
        params.insert("speed".to_string(), json!(settings.pace));
        params
    }

    fn generate(&mut self, text: &str, _reference: &AudioClip, params: &NativeParams) -> Result<AudioClip, SynthesisError> {
        let mut state = self.state.lock();
        state.calls.push((text.to_string(), params.clone()));
        if let Some(progress) = state.progress.clone() {
            let snapshot = progress.progress();
            state.observed.push((snapshot.generating, snapshot.done));
        }
        if state.poison.iter().any(|p| text.contains(p.as_str())) {
            return Err(SynthesisError::ResourceExhausted("CUDA out of memory".to_string()));
        }
        Ok(AudioClip::new(vec![0.3; text.chars().count() * SAMPLES_PER_CHAR], RATE))
    }
}

fn session_with(poison: &[&str]) -> (Session, Shared) {
    let state = Shared::default();
    state.lock().poison = poison.iter().map(|p| p.to_string()).collect();

    let config = SessionConfig { chunker: ChunkerConfig { max_len: 20, ..Default::default() }, ..Default::default() };
    let synthesizer = Synthesizer::new(Box::new(FakeModel { state: Arc::clone(&state) }));
    let mut session = Session::new(synthesizer, config);
    state.lock().progress = Some(session.progress_handle());

    let chunks = session.submit_document(Document::new(BOOK, DocumentMeta::default())).unwrap();
    assert_eq!(chunks, 5);
    (session, state)
}

fn voice_wav(seconds: f32) -> Vec<u8> {
    let len = (seconds * 16000.0) as usize;
    let samples = (0..len).map(|i| (i as f32 * 0.03).sin() * 0.5).collect();
    AudioClip::new(samples, 16000).to_wav_bytes(ExportFormat::Pcm16).unwrap()
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("book-narrator-{}-{}.wav", std::process::id(), name))
}

#[test]
fn test_failed_chunk_does_not_stop_the_book() {
    let (mut session, _state) = session_with(&["Third"]);
    session.submit_voice_sample(&voice_wav(6.0)).unwrap();

    let report = session.run(RunMode::FullBook).unwrap();
    assert_eq!(report.state, RunState::PartiallyFailed);

    let progress = session.progress();
    assert_eq!((progress.done, progress.failed, progress.pending), (4, 1, 0));

    let snapshot = session.snapshot();
    let failed = snapshot.get(2).unwrap();
    assert_eq!(failed.status, ChunkStatus::Failed);
    assert!(failed.error.as_ref().is_some_and(|e| e.is_retriable()));
    assert_eq!(snapshot.indices_with(ChunkStatus::Done), vec![0, 1, 3, 4]);
}

#[test]
fn test_short_voice_sample_is_rejected_before_generation() {
    let (mut session, state) = session_with(&[]);

    let err = session.submit_voice_sample(&voice_wav(2.0)).unwrap_err();
    assert!(matches!(err, NarratorError::Input(InputError::InvalidVoiceSample(_))));

    let err = session.run(RunMode::FullBook).unwrap_err();
    assert!(matches!(err, NarratorError::Input(InputError::NoVoiceSample)));
    assert!(state.lock().calls.is_empty());
    assert_eq!(session.progress().pending, 5);
}

#[test]
fn test_voice_change_invalidates_all_chunks() {
    let (mut session, _state) = session_with(&["Third"]);
    session.submit_voice_sample(&voice_wav(6.0)).unwrap();
    session.run(RunMode::FullBook).unwrap();
    assert_eq!(session.progress().pending, 0);

    session.submit_voice_sample(&voice_wav(7.0)).unwrap();
    let snapshot = session.snapshot();
    assert_eq!(snapshot.progress().pending, 5);
    assert!(snapshot.results().iter().all(|r| r.audio.is_none() && r.error.is_none()));
}

#[test]
fn test_settings_change_invalidates_only_when_different() {
    let (mut session, state) = session_with(&[]);
    session.submit_voice_sample(&voice_wav(6.0)).unwrap();
    session.run(RunMode::FullBook).unwrap();

    assert!(!session.configure(VoiceSettings::default()).unwrap());
    assert_eq!(session.progress().done, 5);

    assert!(session.set_parameter("exaggeration", 1.2).unwrap());
    assert_eq!(session.progress().pending, 5);

    session.run(RunMode::SingleChunk(0)).unwrap();
    let state = state.lock();
    let (_, params) = state.calls.last().unwrap();
    assert_eq!(params.get("emotion_scale"), Some(&json!(1.2f32)));
}

#[test]
fn test_generation_is_sequential_and_observable() {
    let (mut session, state) = session_with(&[]);
    session.submit_voice_sample(&voice_wav(6.0)).unwrap();
    session.run(RunMode::FullBook).unwrap();

    // every call saw exactly one generating chunk and the previous ones done
    let observed = state.lock().observed.clone();
    assert_eq!(observed, vec![(1, 0), (1, 1), (1, 2), (1, 3), (1, 4)]);

    let texts: Vec<String> = state.lock().calls.iter().map(|(text, _)| text.clone()).collect();
    assert_eq!(texts, vec!["Chapter one begins.", "The second part.", "Third is bad.", "The fourth part.", "The fifth part."]);
}

#[test]
fn test_assembled_duration_is_chunks_plus_gaps() {
    let (mut session, _state) = session_with(&[]);
    session.submit_voice_sample(&voice_wav(6.0)).unwrap();
    session.run(RunMode::FullBook).unwrap();

    let track = session.assemble().unwrap();
    let speech: usize = session.chunks().iter().map(|c| c.text.chars().count() * SAMPLES_PER_CHAR).sum();
    let gap = (RATE as usize) / 4;

    assert_eq!(track.audio.sample_rate, RATE);
    assert_eq!(track.audio.len(), speech + 4 * gap);
    assert!(!track.is_partial());
}

#[test]
fn test_partial_assembly_policies() {
    let (mut session, _state) = session_with(&["Third"]);
    session.submit_voice_sample(&voice_wav(6.0)).unwrap();
    session.run(RunMode::FullBook).unwrap();

    let track = session.assemble().unwrap();
    assert_eq!(track.included, vec![0, 1]);
    assert!(track.is_partial());

    session.set_assembly(AssemblyConfig { policy: AssemblyPolicy::SkipMissing, ..Default::default() });
    let track = session.assemble().unwrap();
    assert_eq!(track.included, vec![0, 1, 3, 4]);
    assert_eq!(track.missing, vec![2]);
}

#[test]
fn test_retry_then_resume_completes_the_book() {
    let (mut session, state) = session_with(&["Third"]);
    session.submit_voice_sample(&voice_wav(6.0)).unwrap();
    session.run(RunMode::FullBook).unwrap();

    // retrying a done chunk changes nothing
    assert!(!session.retry(0).unwrap());

    state.lock().poison.clear();
    assert!(session.retry(2).unwrap());
    assert_eq!(session.progress().pending, 1);

    let report = session.run(RunMode::FullBook).unwrap();
    assert_eq!((report.attempted, report.completed, report.state), (1, 1, RunState::Completed));
    assert_eq!(session.progress().done, 5);
    assert_eq!(state.lock().calls.len(), 6);
}

#[test]
fn test_cancel_before_run_generates_nothing() {
    let (mut session, state) = session_with(&[]);
    session.submit_voice_sample(&voice_wav(6.0)).unwrap();

    let cancel = session.cancel_handle();
    cancel.cancel();
    let report = session.run(RunMode::FullBook).unwrap();
    assert_eq!(report.state, RunState::Cancelled);
    assert_eq!((report.attempted, report.skipped), (0, 5));
    assert!(state.lock().calls.is_empty());
    assert!(!cancel.is_cancelled());

    // the next run starts fresh
    let report = session.run(RunMode::FullBook).unwrap();
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(session.progress_handle().run_state(), RunState::Completed);
}

#[test]
fn test_export_track_and_chunk() {
    let (mut session, _state) = session_with(&["Third"]);
    session.submit_voice_sample(&voice_wav(6.0)).unwrap();
    session.run(RunMode::SingleChunk(0)).unwrap();

    let track_path = temp_path("track");
    let track = session.export_track(&track_path, ExportFormat::Float32).unwrap();
    let written = AudioClip::from_wav_file(&track_path).unwrap();
    assert_eq!(written.len(), track.audio.len());
    assert_eq!(written.sample_rate, RATE);

    let chunk_path = temp_path("chunk");
    session.export_chunk(0, &chunk_path, ExportFormat::Pcm16).unwrap();
    assert_eq!(AudioClip::from_wav_file(&chunk_path).unwrap().len(), "Chapter one begins.".len() * SAMPLES_PER_CHAR);
    assert!(matches!(session.export_chunk(1, &chunk_path, ExportFormat::Pcm16), Err(NarratorError::NothingToExport)));
    assert!(matches!(
        session.export_chunk(9, &chunk_path, ExportFormat::Pcm16),
        Err(NarratorError::Input(InputError::ChunkOutOfRange { index: 9, len: 5 }))
    ));

    let _ = std::fs::remove_file(track_path);
    let _ = std::fs::remove_file(chunk_path);
}

#[test]
fn test_new_document_replaces_state() {
    let (mut session, _state) = session_with(&[]);
    session.submit_voice_sample(&voice_wav(6.0)).unwrap();
    session.run(RunMode::FullBook).unwrap();

    let meta = DocumentMeta { title: "Sequel".to_string(), ..Default::default() };
    assert_eq!(session.submit_document(Document::new("A new start.", meta)).unwrap(), 1);
    assert_eq!(session.progress().pending, 1);
    assert_eq!(session.document().unwrap().meta().title, "Sequel");
    assert!(matches!(session.assemble(), Err(NarratorError::NothingToExport)));

    // the voice survives a document change
    assert!(session.run(RunMode::FullBook).is_ok());
    assert_eq!(session.progress().done, 1);
    assert!(session.assemble().unwrap().duration() > Duration::ZERO);
}
