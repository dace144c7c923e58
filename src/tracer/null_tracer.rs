//! Null tracer implementation following the Null Object Pattern
//!
//! [`NullTracer`] implements [`RunCallbacks`] but records nothing, so a host
//! engine can always hold an `Arc<dyn RunCallbacks>` instead of an optional tracer.

use super::callbacks::RunCallbacks;
use super::report::ExecutionSummary;
use super::run::{Run, RunError, RunId};
use super::token_usage::TokenUsage;
use super::tracer_events::CapturedEvent;
use serde_json::Value;
use std::collections::BTreeMap;

/// A no-op tracer that silently discards every callback
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTracer;

impl NullTracer {
    /// Create a new null tracer
    pub fn new() -> Self {
        Self
    }

    /// Always returns false for null tracer
    pub fn is_enabled(&self) -> bool {
        false
    }

    /// No-op method for interface compatibility
    pub fn enable(&self) {}

    /// No-op method for interface compatibility
    pub fn disable(&self) {}

    /// No-op method for interface compatibility
    pub fn finish(&self) {}

    /// Always returns an empty list
    pub fn get_captured_events(&self) -> Vec<CapturedEvent> {
        Vec::new()
    }

    pub fn get_token_usage(&self) -> TokenUsage {
        TokenUsage::default()
    }

    /// An all-zero summary with trivially satisfied parity
    pub fn get_execution_summary(&self) -> ExecutionSummary {
        ExecutionSummary {
            total_events: 0,
            events_by_kind: BTreeMap::new(),
            events_by_phase: BTreeMap::new(),
            token_usage: TokenUsage::default(),
            model_calls: 0,
            average_tokens_per_call: 0.0,
            streamed_chunks: 0,
            tool_calls_requested: 0,
            tool_calls_executed: 0,
            tool_call_parity: true,
            unmatched_requests: Vec::new(),
            unmatched_executions: Vec::new(),
            total_runs: 0,
            open_runs: 0,
            failed_runs: 0,
        }
    }
}

impl RunCallbacks for NullTracer {
    fn on_run_start(&self, _run: Run) {}

    fn on_run_end(&self, _run_id: RunId, _outputs: Value) {}

    fn on_run_error(&self, _run_id: RunId, _error: RunError) {}

    fn on_llm_token(&self, _run_id: RunId, _token: &str) {}

    fn on_custom_event(&self, _name: &str, _data: Value, _run_id: Option<RunId>) {}
}
