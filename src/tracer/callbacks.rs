//! Host-facing callback surface
//!
//! A host orchestration engine drives tracing through [`RunCallbacks`]. Every
//! method is infallible from the host's point of view: tracer bookkeeping errors
//! are absorbed and logged, never returned into the traced system.

use super::run::{Run, RunError, RunId};
use serde_json::Value;

pub trait RunCallbacks: Send + Sync {
    /// A run started; its parent (if any) must already have started
    fn on_run_start(&self, run: Run);

    /// A run completed successfully
    fn on_run_end(&self, run_id: RunId, outputs: Value);

    /// A run failed; the error is recorded verbatim
    fn on_run_error(&self, run_id: RunId, error: RunError);

    /// A model run streamed a token chunk
    fn on_llm_token(&self, run_id: RunId, token: &str);

    /// An application-defined event, optionally attached to a run
    fn on_custom_event(&self, name: &str, data: Value, run_id: Option<RunId>);
}
