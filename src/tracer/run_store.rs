//! Run record storage
//!
//! Thread-safe, insertion-ordered table of [`Run`] records keyed by [`RunId`].
//! Records are immutable once stored; completion swaps in a sealed copy. There is
//! no deletion: the store lives exactly as long as the tracer that owns it.

use super::run::{Run, RunError, RunId};
use crate::error::{Result, TracerError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct StoreInner {
    runs: HashMap<RunId, Arc<Run>>,
    order: Vec<RunId>,
}

/// Append-only store of run records
#[derive(Default)]
pub struct RunStore {
    inner: RwLock<StoreInner>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a newly started run
    ///
    /// A parent id that is not (yet) in the store is accepted; hierarchy
    /// resolution simply stops there.
    pub fn on_run_create(&self, run: Run) -> Result<Arc<Run>> {
        if run.parent_id == Some(run.id) {
            return Err(TracerError::SelfParent(run.id));
        }

        let mut inner = self.write();
        if inner.runs.contains_key(&run.id) {
            return Err(TracerError::DuplicateRun(run.id));
        }

        let id = run.id;
        let run = Arc::new(run);
        inner.runs.insert(id, Arc::clone(&run));
        inner.order.push(id);
        Ok(run)
    }

    /// Look up a run by id
    pub fn get(&self, id: &RunId) -> Option<Arc<Run>> {
        self.read().runs.get(id).cloned()
    }

    pub fn contains(&self, id: &RunId) -> bool {
        self.read().runs.contains_key(id)
    }

    /// Seal a run as successfully completed, returning the sealed record
    pub fn complete(&self, id: &RunId, outputs: Value) -> Result<Arc<Run>> {
        self.replace(id, |run| run.sealed_ok(outputs))
    }

    /// Seal a run as failed, returning the sealed record
    pub fn fail(&self, id: &RunId, error: RunError) -> Result<Arc<Run>> {
        self.replace(id, |run| run.sealed_err(error))
    }

    /// Count one streamed chunk against an open run
    pub fn record_chunk(&self, id: &RunId) -> Result<Arc<Run>> {
        self.replace(id, |run| {
            let mut updated = run.clone();
            updated.streamed_chunks += 1;
            updated
        })
    }

    /// Swap an open run for its updated copy; sealed runs are never touched again
    fn replace(&self, id: &RunId, f: impl FnOnce(&Run) -> Run) -> Result<Arc<Run>> {
        let mut inner = self.write();
        let slot = inner.runs.get_mut(id).ok_or(TracerError::UnknownRun(*id))?;
        if !slot.is_open() {
            return Err(TracerError::AlreadySealed(*id));
        }
        let updated = Arc::new(f(slot.as_ref()));
        *slot = Arc::clone(&updated);
        Ok(updated)
    }

    /// All runs in insertion order
    pub fn runs(&self) -> Vec<Arc<Run>> {
        let inner = self.read();
        inner.order.iter().filter_map(|id| inner.runs.get(id).cloned()).collect()
    }

    /// Runs that have neither completed nor failed
    pub fn open_runs(&self) -> Vec<Arc<Run>> {
        self.runs().into_iter().filter(|r| r.is_open()).collect()
    }

    pub fn failed_runs(&self) -> Vec<Arc<Run>> {
        self.runs().into_iter().filter(|r| r.is_failed()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().order.is_empty()
    }
}
