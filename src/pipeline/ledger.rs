//! Per-chunk generation state.
//!
//! The ledger is the only shared mutable state of a session. It records one
//! [`ChunkResult`] per chunk and enforces the status transitions:
//!
//! ```text
//! pending -> generating -> done
//!                       -> failed -> pending (explicit retry)
//! ```
//!
//! Callers only ever receive cloned snapshots.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::audio::AudioClip;
use crate::error::{InputError, NarratorError, Result, SynthesisError};

/// Generation status of a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Pending,
    Generating,
    Done,
    Failed,
}

/// State of one chunk. Audio is present only when done, error only when failed.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub index: usize,
    pub status: ChunkStatus,
    pub audio: Option<Arc<AudioClip>>,
    pub error: Option<SynthesisError>,
    /// Time of the last status transition
    pub updated_at: OffsetDateTime,
}

impl ChunkResult {
    fn pending(index: usize) -> Self {
        Self { index, status: ChunkStatus::Pending, audio: None, error: None, updated_at: OffsetDateTime::now_utc() }
    }
}

/// Chunk counts by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub pending: usize,
    pub generating: usize,
    pub done: usize,
    pub failed: usize,
}

impl Progress {
    /// Fraction of chunks that are done (1.0 for an empty document).
    pub fn fraction_done(&self) -> f32 {
        if self.total == 0 { 1.0 } else { self.done as f32 / self.total as f32 }
    }
}

/// Immutable copy of the ledger at one point in time.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    results: Vec<ChunkResult>,
}

impl LedgerSnapshot {
    pub fn results(&self) -> &[ChunkResult] {
        &self.results
    }

    pub fn get(&self, index: usize) -> Option<&ChunkResult> {
        self.results.get(index)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn progress(&self) -> Progress {
        let mut progress = Progress { total: self.results.len(), ..Default::default() };
        for result in &self.results {
            match result.status {
                ChunkStatus::Pending => progress.pending += 1,
                ChunkStatus::Generating => progress.generating += 1,
                ChunkStatus::Done => progress.done += 1,
                ChunkStatus::Failed => progress.failed += 1,
            }
        }
        progress
    }

    /// Indices of chunks with the given status, ascending.
    pub fn indices_with(&self, status: ChunkStatus) -> Vec<usize> {
        self.results.iter().filter(|r| r.status == status).map(|r| r.index).collect()
    }
}

/// Thread-safe chunk status tracker.
#[derive(Debug, Default)]
pub struct Ledger {
    results: RwLock<Vec<ChunkResult>>,
}

impl Ledger {
    /// A ledger with `chunk_count` pending chunks.
    pub fn new(chunk_count: usize) -> Self {
        Self { results: RwLock::new((0..chunk_count).map(ChunkResult::pending).collect()) }
    }

    /// Replace all state with `chunk_count` pending chunks (new chunk list).
    pub fn reset(&self, chunk_count: usize) {
        *self.results.write() = (0..chunk_count).map(ChunkResult::pending).collect();
        debug!("Ledger reset with {} chunks", chunk_count);
    }

    /// Return every chunk to pending and drop all generated audio.
    ///
    /// Returns how many chunks were not pending before.
    pub fn invalidate(&self) -> usize {
        let mut results = self.results.write();
        let touched = results.iter().filter(|r| r.status != ChunkStatus::Pending).count();
        for result in results.iter_mut() {
            *result = ChunkResult::pending(result.index);
        }
        debug!("Ledger invalidated ({} chunks reset)", touched);
        touched
    }

    pub fn len(&self) -> usize {
        self.results.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.read().is_empty()
    }

    pub fn status(&self, index: usize) -> Option<ChunkStatus> {
        self.results.read().get(index).map(|r| r.status)
    }

    /// pending -> generating.
    pub fn mark_generating(&self, index: usize) -> Result<()> {
        self.transition(index, ChunkStatus::Pending, ChunkStatus::Generating, |_| {})
    }

    /// generating -> done, storing the audio.
    pub fn complete(&self, index: usize, audio: AudioClip) -> Result<()> {
        self.transition(index, ChunkStatus::Generating, ChunkStatus::Done, |result| {
            result.audio = Some(Arc::new(audio));
        })
    }

    /// generating -> failed, storing the error.
    pub fn fail(&self, index: usize, error: SynthesisError) -> Result<()> {
        self.transition(index, ChunkStatus::Generating, ChunkStatus::Failed, |result| {
            result.error = Some(error);
        })
    }

    /// failed -> pending.
    ///
    /// Returns `Ok(false)` without touching a pending or done chunk; a chunk
    /// that is generating cannot be retried.
    pub fn retry(&self, index: usize) -> Result<bool> {
        match self.status(index) {
            Some(ChunkStatus::Pending) | Some(ChunkStatus::Done) => Ok(false),
            _ => self.transition(index, ChunkStatus::Failed, ChunkStatus::Pending, |result| result.error = None).map(|_| true),
        }
    }

    /// generating -> failed for every chunk left in flight by an aborted run.
    /// Returns how many were failed.
    pub fn abort_generating(&self, reason: &str) -> usize {
        let mut results = self.results.write();
        let mut count = 0;
        for result in results.iter_mut().filter(|r| r.status == ChunkStatus::Generating) {
            result.status = ChunkStatus::Failed;
            result.error = Some(SynthesisError::Model(reason.to_string()));
            result.updated_at = OffsetDateTime::now_utc();
            count += 1;
        }
        count
    }

    /// Retry every failed chunk. Returns how many were reset.
    pub fn retry_failed(&self) -> usize {
        let mut results = self.results.write();
        let mut count = 0;
        for result in results.iter_mut().filter(|r| r.status == ChunkStatus::Failed) {
            *result = ChunkResult::pending(result.index);
            count += 1;
        }
        count
    }

    /// Clone the current state for readers.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot { results: self.results.read().clone() }
    }

    fn transition(&self, index: usize, from: ChunkStatus, to: ChunkStatus, update: impl FnOnce(&mut ChunkResult)) -> Result<()> {
        let mut results = self.results.write();
        let len = results.len();
        let result = results.get_mut(index).ok_or(InputError::ChunkOutOfRange { index, len })?;

        if result.status != from {
            return Err(NarratorError::InvalidTransition { index, from: result.status, to });
        }

        result.status = to;
        result.updated_at = OffsetDateTime::now_utc();
        update(result);
        Ok(())
    }
}
