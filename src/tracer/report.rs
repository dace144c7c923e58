//! Query and summary surface over a finished (or running) trace

use super::tracer_events::{CapturedEvent, EventKind, Phase};
use super::tracer_system::TracerSystem;
use super::token_usage::TokenUsage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::PoisonError;

/// Aggregate view of one traced invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total_events: usize,
    pub events_by_kind: BTreeMap<String, usize>,
    pub events_by_phase: BTreeMap<String, usize>,
    pub token_usage: TokenUsage,
    pub model_calls: u64,
    pub average_tokens_per_call: f64,
    pub streamed_chunks: u64,
    pub tool_calls_requested: usize,
    pub tool_calls_executed: usize,
    /// Every request executed and every execution was requested
    pub tool_call_parity: bool,
    /// Correlation ids of requests never seen executing
    pub unmatched_requests: Vec<String>,
    /// Run ids of tool executions with no matching request
    pub unmatched_executions: Vec<String>,
    pub total_runs: usize,
    pub open_runs: usize,
    pub failed_runs: usize,
}

impl ExecutionSummary {
    /// Get a formatted multi-line summary
    pub fn printable_summary(&self) -> String {
        let mut summary = format!(
            "Events: {}  Runs: {} ({} open, {} failed)\nModel calls: {}  Tokens: {} in / {} out / {} total (avg {:.1})\nTool calls: {} requested, {} executed{}",
            self.total_events,
            self.total_runs,
            self.open_runs,
            self.failed_runs,
            self.model_calls,
            self.token_usage.input_tokens,
            self.token_usage.output_tokens,
            self.token_usage.total_tokens,
            self.average_tokens_per_call,
            self.tool_calls_requested,
            self.tool_calls_executed,
            if self.tool_call_parity { "" } else { "  (MISMATCH)" },
        );

        for (phase, count) in &self.events_by_phase {
            summary.push_str(&format!("\n   {}: {}", phase, count));
        }

        summary
    }
}

impl TracerSystem {
    /// Every captured event in emission order
    pub fn get_captured_events(&self) -> Vec<CapturedEvent> {
        self.event_store().events()
    }

    pub fn get_events_by_phase(&self, phase: Phase) -> Vec<CapturedEvent> {
        self.event_store().get_events(None, None, Some(&move |e: &CapturedEvent| e.phase == phase))
    }

    pub fn get_events_by_kind(&self, kind: &EventKind) -> Vec<CapturedEvent> {
        self.event_store().get_events(None, None, Some(&|e: &CapturedEvent| &e.kind == kind))
    }

    /// Tool requested and tool executed events, in emission order
    pub fn get_tool_call_events(&self) -> Vec<CapturedEvent> {
        self.event_store().get_events(None, None, Some(&|e: &CapturedEvent| e.is_tool_event()))
    }

    pub fn get_token_usage(&self) -> TokenUsage {
        self.usage.snapshot()
    }

    pub fn get_execution_summary(&self) -> ExecutionSummary {
        let events = self.get_captured_events();

        let mut events_by_kind = BTreeMap::new();
        let mut events_by_phase = BTreeMap::new();
        for event in &events {
            *events_by_kind.entry(event.kind.as_str()).or_insert(0) += 1;
            *events_by_phase.entry(event.phase.as_str().to_string()).or_insert(0) += 1;
        }

        let tool_calls_requested = events_by_kind
            .get(&EventKind::ToolRequested.as_str())
            .copied()
            .unwrap_or(0);
        let tool_calls_executed = events_by_kind
            .get(&EventKind::ToolExecuted.as_str())
            .copied()
            .unwrap_or(0);

        let unmatched_requests: Vec<String> = self
            .pending_tools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|p| p.correlation_id.clone())
            .collect();
        let unmatched_executions: Vec<String> = events
            .iter()
            .filter(|e| e.kind == EventKind::ToolExecuted)
            .filter(|e| e.metadata.get("matched") == Some(&Value::Bool(false)))
            .filter_map(|e| e.run_id.map(|id| id.to_string()))
            .collect();

        ExecutionSummary {
            total_events: events.len(),
            events_by_kind,
            events_by_phase,
            token_usage: self.usage.snapshot(),
            model_calls: self.usage.model_calls(),
            average_tokens_per_call: self.usage.average_total_per_call(),
            streamed_chunks: self.usage.streamed_chunks(),
            tool_calls_requested,
            tool_calls_executed,
            tool_call_parity: unmatched_requests.is_empty() && unmatched_executions.is_empty(),
            unmatched_requests,
            unmatched_executions,
            total_runs: self.runs.len(),
            open_runs: self.runs.open_runs().len(),
            failed_runs: self.runs.failed_runs().len(),
        }
    }
}
