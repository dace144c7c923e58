//! Tracer system for coordinating run tracing
//!
//! This module provides the central [`TracerSystem`]: it records runs reported by
//! the host engine, resolves where in the graph each one sits, emits enriched
//! events to the event store and sinks, accumulates token usage and attributes
//! every requested tool call to the nodes responsible for it.

use super::callbacks::RunCallbacks;
use super::emitter::EventEmitter;
use super::event_store::EventStore;
use super::extract::{extract_token_usage, extract_tool_calls};
use super::hierarchy::{AllowListClassifier, HierarchyResolver, NodeClassifier, PatternClassifier};
use super::report::ExecutionSummary;
use super::run::{Run, RunError, RunId, RunKind};
use super::run_store::RunStore;
use super::sinks::{ConsoleSink, EventSink, FileSink};
use super::token_usage::TokenUsageAccumulator;
use super::tracer_events::{EventKind, Occurrence, Phase};
use crate::config::TracerConfig;
use crate::error::Result;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// A tool call that was requested but has not yet been seen executing
#[derive(Debug, Clone)]
pub(super) struct PendingToolCall {
    pub correlation_id: String,
    pub tool_name: String,
    /// Nearest semantic node of the model run that asked for the call
    pub owner: String,
}

/// Central system for capturing and querying run traces
///
/// One instance covers one top-level orchestration invocation. Construct it when
/// the invocation starts, hand it to the host engine as [`RunCallbacks`], and call
/// [`TracerSystem::finish`] (or use [`with_tracer`]) when the invocation ends.
pub struct TracerSystem {
    pub(super) runs: RunStore,
    pub(super) emitter: EventEmitter,
    pub(super) classifier: Box<dyn NodeClassifier>,
    pub(super) usage: TokenUsageAccumulator,
    pub(super) pending_tools: Mutex<Vec<PendingToolCall>>,
    enabled: AtomicBool,
    finished: AtomicBool,
    include_plumbing: bool,
}

impl TracerSystem {
    /// Create a tracer with the sinks described by the configuration
    pub fn new(config: TracerConfig) -> Result<Self> {
        let mut sinks: Vec<Arc<dyn EventSink>> = Vec::new();
        if config.console {
            sinks.push(Arc::new(ConsoleSink::stdout()));
        }
        if let Some(path) = &config.log_file {
            sinks.push(Arc::new(FileSink::open(path)?));
        }
        Self::with_sinks(config, sinks)
    }

    /// Create a tracer with explicitly provided sinks
    ///
    /// Console and file settings in the configuration are ignored.
    pub fn with_sinks(config: TracerConfig, sinks: Vec<Arc<dyn EventSink>>) -> Result<Self> {
        let classifier: Box<dyn NodeClassifier> = if config.semantic_nodes.is_empty() {
            Box::new(PatternClassifier::new(&config.plumbing_patterns)?)
        } else {
            Box::new(AllowListClassifier::new(config.semantic_nodes.iter().cloned()))
        };
        Ok(Self::build(&config, sinks, classifier))
    }

    fn build(
        config: &TracerConfig,
        sinks: Vec<Arc<dyn EventSink>>,
        classifier: Box<dyn NodeClassifier>,
    ) -> Self {
        debug!(sinks = sinks.len(), enabled = config.enabled, "Creating tracer system");
        Self {
            runs: RunStore::new(),
            emitter: EventEmitter::new(Arc::new(EventStore::new()), sinks),
            classifier,
            usage: TokenUsageAccumulator::new(),
            pending_tools: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(config.enabled),
            finished: AtomicBool::new(false),
            include_plumbing: config.include_plumbing,
        }
    }

    /// Replace the node classifier
    pub fn with_classifier(mut self, classifier: Box<dyn NodeClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Check if the tracer is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Enable the tracer system
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Disable the tracer system
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Resolver bound to this tracer's run store and classifier
    pub fn resolver(&self) -> HierarchyResolver<'_> {
        HierarchyResolver::new(&self.runs, self.classifier.as_ref())
    }

    pub fn run_store(&self) -> &RunStore {
        &self.runs
    }

    pub fn event_store(&self) -> &EventStore {
        self.emitter.event_store()
    }

    /// Flush and close every sink; only the first call has any effect
    pub fn finish(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.emitter.close_sinks();
        info!(
            events = self.emitter.event_store().len(),
            runs = self.runs.len(),
            "Tracer finished"
        );
    }

    fn pending(&self) -> MutexGuard<'_, Vec<PendingToolCall>> {
        self.pending_tools.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, occurrence: Occurrence, run: Option<&Run>) {
        self.emitter.emit(occurrence, run, &self.runs, self.classifier.as_ref());
    }

    /// Whether start/end events are emitted for this run
    fn traces_lifecycle(&self, run: &Run) -> bool {
        run.kind != RunKind::Chain || self.include_plumbing || self.classifier.is_semantic_run(run)
    }

    fn handle_model_completion(&self, run: &Run, outputs: &Value) {
        self.usage.record_model_call();
        if let Some(usage) = extract_token_usage(outputs) {
            self.usage.add(&usage);
        }

        let calls = extract_tool_calls(outputs);
        if calls.is_empty() {
            return;
        }

        let owner = self.resolver().nearest_semantic_ancestor_name(run);
        for (index, call) in calls.iter().enumerate() {
            let correlation_id = call.correlation_id(&run.id, index);
            self.pending().push(PendingToolCall {
                correlation_id: correlation_id.clone(),
                tool_name: call.name.clone(),
                owner: owner.clone(),
            });

            let occurrence = Occurrence::new(
                EventKind::ToolRequested,
                Phase::Tool,
                format!("{} requested {}", owner, call.name),
            )
            .with("tool_name", &call.name)
            .with("arguments", &call.arguments)
            .with("correlation_id", &correlation_id)
            .with("requested_by", &run.name);
            self.emit(occurrence, Some(run));
        }
    }

    /// Correlation id supplied by the host in the tool run's inputs
    fn explicit_correlation_id(run: &Run) -> Option<String> {
        run.inputs
            .get("tool_call_id")
            .or_else(|| run.inputs.pointer("/tool_call/id"))
            .and_then(Value::as_str)
            .map(String::from)
    }

    /// Match an executed tool run to its pending request
    ///
    /// Without an explicit id, a same-named request from the tool run's own
    /// semantic node wins over the oldest same-named request overall.
    fn match_pending(&self, run: &Run) -> Option<String> {
        let explicit = Self::explicit_correlation_id(run);
        let owner = match explicit {
            Some(_) => None,
            None => Some(self.resolver().nearest_semantic_ancestor_name(run)),
        };
        let mut pending = self.pending();

        let position = match (&explicit, &owner) {
            (Some(id), _) => pending.iter().position(|p| &p.correlation_id == id),
            (None, Some(owner)) => pending
                .iter()
                .position(|p| p.tool_name == run.name && &p.owner == owner)
                .or_else(|| pending.iter().position(|p| p.tool_name == run.name)),
            (None, None) => None,
        };

        position.map(|i| pending.remove(i).correlation_id)
    }

    fn handle_tool_completion(&self, run: &Run) {
        let matched = self.match_pending(run);
        if matched.is_none() {
            debug!(tool = %run.name, run = %run.id, "Tool execution has no matching request");
        }

        let mut occurrence = Occurrence::new(
            EventKind::ToolExecuted,
            Phase::Tool,
            format!("{} executed", run.name),
        )
        .with("tool_name", &run.name)
        .with("matched", matched.is_some())
        .with("duration_ms", run.duration_ms())
        .with("status", if run.is_failed() { "error" } else { "ok" });

        if let Some(correlation_id) = matched.or_else(|| Self::explicit_correlation_id(run)) {
            occurrence = occurrence.with("correlation_id", correlation_id);
        }
        if let Some(outputs) = &run.outputs {
            occurrence = occurrence.with("output", outputs);
        }
        if let Some(error) = &run.error {
            occurrence = occurrence.with("error", &error.message);
        }

        self.emit(occurrence, Some(run));
    }
}

impl RunCallbacks for TracerSystem {
    fn on_run_start(&self, run: Run) {
        if !self.is_enabled() {
            return;
        }

        let run = match self.runs.on_run_create(run) {
            Ok(run) => run,
            Err(e) => {
                warn!("Ignoring run start: {}", e);
                return;
            }
        };

        if self.traces_lifecycle(&run) {
            let mut occurrence = Occurrence::new(
                EventKind::RunStart,
                Phase::for_kind(run.kind),
                format!("{} started", run.name),
            )
            .with("run_name", &run.name)
            .with("run_kind", run.kind)
            .with("inputs", &run.inputs);
            if let Some(parent_id) = run.parent_id {
                occurrence = occurrence.with("parent_id", parent_id);
            }
            self.emit(occurrence, Some(run.as_ref()));
        }
    }

    fn on_run_end(&self, run_id: RunId, outputs: Value) {
        if !self.is_enabled() {
            return;
        }

        let run = match self.runs.complete(&run_id, outputs) {
            Ok(run) => run,
            Err(e) => {
                warn!("Ignoring run end: {}", e);
                return;
            }
        };
        let outputs = run.outputs.clone().unwrap_or(Value::Null);

        if self.traces_lifecycle(&run) {
            let mut occurrence = Occurrence::new(
                EventKind::RunEnd,
                Phase::for_kind(run.kind),
                format!("{} finished", run.name),
            )
            .with("run_name", &run.name)
            .with("run_kind", run.kind)
            .with("duration_ms", run.duration_ms());
            if run.kind == RunKind::Llm {
                occurrence = occurrence
                    .with("token_usage", extract_token_usage(&outputs))
                    .with("streamed_chunks", run.streamed_chunks);
            } else {
                occurrence = occurrence.with("outputs", &outputs);
            }
            self.emit(occurrence, Some(run.as_ref()));
        }

        match run.kind {
            RunKind::Llm => self.handle_model_completion(&run, &outputs),
            RunKind::Tool => self.handle_tool_completion(&run),
            _ => {}
        }
    }

    fn on_run_error(&self, run_id: RunId, error: RunError) {
        if !self.is_enabled() {
            return;
        }

        let run = match self.runs.fail(&run_id, error.clone()) {
            Ok(run) => run,
            Err(e) => {
                warn!("Ignoring run error: {}", e);
                return;
            }
        };

        let occurrence = Occurrence::new(
            EventKind::RunError,
            Phase::Error,
            format!("{} failed: {}", run.name, error.message),
        )
        .with("run_name", &run.name)
        .with("run_kind", run.kind)
        .with("error", &error.message)
        .with("error_payload", &error.payload)
        .with("duration_ms", run.duration_ms());
        self.emit(occurrence, Some(run.as_ref()));

        if run.kind == RunKind::Tool {
            self.handle_tool_completion(&run);
        }
    }

    fn on_llm_token(&self, run_id: RunId, _token: &str) {
        if !self.is_enabled() {
            return;
        }

        match self.runs.record_chunk(&run_id) {
            Ok(_) => self.usage.record_chunk(),
            Err(e) => debug!("Ignoring streamed token: {}", e),
        }
    }

    fn on_custom_event(&self, name: &str, data: Value, run_id: Option<RunId>) {
        if !self.is_enabled() {
            return;
        }

        let run = run_id.and_then(|id| self.runs.get(&id));
        if let (Some(id), None) = (run_id, &run) {
            debug!(run = %id, "Custom event references an unknown run");
        }

        let occurrence = Occurrence::new(
            EventKind::Custom(name.to_string()),
            Phase::Custom,
            name.to_string(),
        )
        .with("data", data);
        self.emit(occurrence, run.as_deref());
    }
}

impl Default for TracerSystem {
    fn default() -> Self {
        Self::build(&TracerConfig::default(), Vec::new(), Box::new(PatternClassifier::default()))
    }
}

impl Drop for TracerSystem {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Calls [`TracerSystem::finish`] when dropped, including during unwinding
struct FinishGuard<'a>(&'a TracerSystem);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Run a traced operation and finish the tracer afterwards
///
/// Sinks are closed whether the operation returns normally or unwinds.
/// Returns the operation's output together with the execution summary.
pub async fn with_tracer<F, T>(tracer: Arc<TracerSystem>, operation: F) -> (T, ExecutionSummary)
where
    F: Future<Output = T>,
{
    let output = {
        let _guard = FinishGuard(&tracer);
        operation.await
    };
    (output, tracer.get_execution_summary())
}

/// Build a model-run output payload in the LangChain `LLMResult` shape
///
/// Handy for hosts that do not already produce one.
pub fn llm_result(content: &str, tool_calls: Value, usage: Option<(u64, u64)>) -> Value {
    let mut result = json!({
        "generations": [[{
            "text": content,
            "message": {"content": content, "tool_calls": tool_calls}
        }]]
    });
    if let Some((input, output)) = usage {
        result["llm_output"] = json!({
            "token_usage": {
                "prompt_tokens": input,
                "completion_tokens": output,
                "total_tokens": input.saturating_add(output)
            }
        });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::sinks::MemorySink;
    use crate::tracer::tracer_events::CapturedEvent;
    use std::sync::atomic::AtomicUsize;

    fn tracer_with_memory() -> (TracerSystem, Arc<MemorySink>) {
        let memory = Arc::new(MemorySink::new());
        let sinks: Vec<Arc<dyn EventSink>> = vec![memory.clone()];
        let tracer = TracerSystem::with_sinks(TracerConfig::default(), sinks).unwrap();
        (tracer, memory)
    }

    fn start(tracer: &TracerSystem, name: &str, kind: RunKind, parent: Option<RunId>) -> RunId {
        let mut run = Run::new(name, kind);
        run.parent_id = parent;
        let id = run.id;
        tracer.on_run_start(run);
        id
    }

    fn kinds(events: &[CapturedEvent]) -> Vec<String> {
        events.iter().map(|e| e.kind.as_str()).collect()
    }

    #[test]
    fn test_new_tracer_system() {
        let tracer = TracerSystem::default();
        assert!(tracer.is_enabled());
        assert!(tracer.event_store().is_empty());
        assert!(tracer.run_store().is_empty());
    }

    #[test]
    fn test_enable_disable() {
        let tracer = TracerSystem::default();
        tracer.disable();
        assert!(!tracer.is_enabled());

        start(&tracer, "agent", RunKind::Chain, None);
        assert!(tracer.run_store().is_empty());

        tracer.enable();
        start(&tracer, "agent", RunKind::Chain, None);
        assert_eq!(tracer.run_store().len(), 1);
    }

    #[test]
    fn test_single_root_lifecycle() {
        let (tracer, memory) = tracer_with_memory();

        let agent = start(&tracer, "agent", RunKind::Chain, None);
        tracer.on_run_end(agent, json!({"answer": 42}));

        let events = memory.events();
        assert_eq!(kinds(&events), vec!["run:start", "run:end"]);
        assert_eq!(events[0].hierarchy, vec!["agent"]);
        assert_eq!(events[0].level, 0);
        assert_eq!(events[0].attribution.master_node.as_deref(), Some("agent"));
        assert_eq!(events[0].attribution.subgraph_node, None);
        assert_eq!(events[1].metadata["outputs"]["answer"], 42);
    }

    #[test]
    fn test_plumbing_runs_are_quiet_by_default() {
        let (tracer, memory) = tracer_with_memory();

        let root = start(&tracer, "agent", RunKind::Chain, None);
        let seq = start(&tracer, "RunnableSequence", RunKind::Chain, Some(root));
        tracer.on_run_end(seq, json!(null));

        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn test_include_plumbing() {
        let memory = Arc::new(MemorySink::new());
        let sinks: Vec<Arc<dyn EventSink>> = vec![memory.clone()];
        let tracer =
            TracerSystem::with_sinks(TracerConfig::default().with_include_plumbing(true), sinks)
                .unwrap();

        start(&tracer, "__start__", RunKind::Chain, None);

        assert_eq!(memory.len(), 1);
        assert_eq!(memory.events()[0].attribution.node, "unknown");
    }

    #[test]
    fn test_tool_request_attribution_through_plumbing() {
        let (tracer, memory) = tracer_with_memory();

        let root = start(&tracer, "coordinator", RunKind::Chain, None);
        let sub = start(&tracer, "research_subgraph", RunKind::Chain, Some(root));
        let tools = start(&tracer, "tools", RunKind::Chain, Some(sub));
        let model = start(&tracer, "ChatOpenAI", RunKind::Llm, Some(tools));

        tracer.on_run_end(
            model,
            llm_result(
                "",
                json!([{"name": "web_search", "args": {"q": "rust"}, "id": "call_1"}]),
                None,
            ),
        );

        let requested = tracer.get_events_by_kind(&EventKind::ToolRequested);
        assert_eq!(requested.len(), 1);
        let event = &requested[0];
        assert_eq!(event.hierarchy, vec!["coordinator", "research_subgraph"]);
        assert_eq!(event.attribution.node, "research_subgraph");
        assert_eq!(event.attribution.master_node.as_deref(), Some("coordinator"));
        assert_eq!(event.attribution.subgraph_node.as_deref(), Some("research_subgraph"));
        assert_eq!(event.correlation_id(), Some("call_1"));
        assert_eq!(event.metadata["arguments"]["q"], "rust");
        assert!(memory.events().iter().any(|e| e.kind == EventKind::ToolRequested));
    }

    #[test]
    fn test_model_without_tool_calls() {
        let (tracer, _memory) = tracer_with_memory();

        let model = start(&tracer, "ChatOllama", RunKind::Llm, None);
        tracer.on_run_end(model, json!({"message": {"content": "hello"}}));

        assert!(tracer.get_tool_call_events().is_empty());
        assert_eq!(tracer.get_token_usage().total_tokens, 0);
    }

    #[test]
    fn test_tool_execution_matches_request_by_id() {
        let (tracer, _memory) = tracer_with_memory();

        let agent = start(&tracer, "agent", RunKind::Chain, None);
        let model = start(&tracer, "ChatOpenAI", RunKind::Llm, Some(agent));
        tracer.on_run_end(
            model,
            llm_result("", json!([{"name": "search", "args": {}, "id": "call_7"}]), None),
        );

        let tool = Run::new("search", RunKind::Tool)
            .with_parent(agent)
            .with_inputs(json!({"tool_call_id": "call_7", "args": {}}));
        let tool_id = tool.id;
        tracer.on_run_start(tool);
        tracer.on_run_end(tool_id, json!({"results": ["a"]}));

        let executed = tracer.get_events_by_kind(&EventKind::ToolExecuted);
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].metadata["matched"], true);
        assert_eq!(executed[0].correlation_id(), Some("call_7"));
        assert!(tracer.get_execution_summary().tool_call_parity);
    }

    #[test]
    fn test_tool_execution_matches_by_name() {
        let (tracer, _memory) = tracer_with_memory();

        let model = start(&tracer, "ChatOpenAI", RunKind::Llm, None);
        tracer.on_run_end(model, llm_result("", json!([{"name": "search", "args": {}}]), None));
        let tool = start(&tracer, "search", RunKind::Tool, None);
        tracer.on_run_end(tool, json!("ok"));

        let executed = tracer.get_events_by_kind(&EventKind::ToolExecuted);
        assert_eq!(executed[0].correlation_id(), Some(format!("{}:0", model).as_str()));
        assert!(tracer.get_execution_summary().unmatched_requests.is_empty());
    }

    #[test]
    fn test_unrequested_tool_execution_breaks_parity() {
        let (tracer, _memory) = tracer_with_memory();

        let tool = start(&tracer, "calculator", RunKind::Tool, None);
        tracer.on_run_end(tool, json!(4));

        let summary = tracer.get_execution_summary();
        assert_eq!(summary.tool_calls_executed, 1);
        assert!(!summary.tool_call_parity);
        assert_eq!(summary.unmatched_executions, vec![tool.to_string()]);
    }

    #[test]
    fn test_run_error_is_recorded_verbatim() {
        let (tracer, _memory) = tracer_with_memory();

        let node = start(&tracer, "writer", RunKind::Chain, None);
        tracer.on_run_error(
            node,
            RunError::new("rate limited").with_payload(json!({"status": 429})),
        );

        let errors = tracer.get_events_by_phase(Phase::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].metadata["error"], "rate limited");
        assert_eq!(errors[0].metadata["error_payload"]["status"], 429);
        assert_eq!(errors[0].hierarchy, vec!["writer"]);
        assert_eq!(tracer.get_execution_summary().failed_runs, 1);
    }

    #[test]
    fn test_failed_tool_still_counts_as_executed() {
        let (tracer, _memory) = tracer_with_memory();

        let model = start(&tracer, "ChatOpenAI", RunKind::Llm, None);
        tracer.on_run_end(model, llm_result("", json!([{"name": "fetch", "id": "c1"}]), None));
        let tool = Run::new("fetch", RunKind::Tool).with_inputs(json!({"tool_call_id": "c1"}));
        let tool_id = tool.id;
        tracer.on_run_start(tool);
        tracer.on_run_error(tool_id, RunError::new("404"));

        let executed = tracer.get_events_by_kind(&EventKind::ToolExecuted);
        assert_eq!(executed[0].metadata["status"], "error");
        assert!(tracer.get_execution_summary().tool_call_parity);
    }

    #[test]
    fn test_unknown_run_callbacks_are_absorbed() {
        let (tracer, memory) = tracer_with_memory();

        tracer.on_run_end(RunId::new(), json!(null));
        tracer.on_run_error(RunId::new(), RunError::new("x"));
        tracer.on_llm_token(RunId::new(), "tok");

        assert!(memory.is_empty());
    }

    #[test]
    fn test_duplicate_start_is_absorbed() {
        let (tracer, memory) = tracer_with_memory();
        let run = Run::new("agent", RunKind::Chain);

        tracer.on_run_start(run.clone());
        tracer.on_run_start(run);

        assert_eq!(tracer.run_store().len(), 1);
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn test_custom_event_attribution() {
        let (tracer, _memory) = tracer_with_memory();
        let root = start(&tracer, "briefing", RunKind::Chain, None);
        let step = start(&tracer, "weather", RunKind::Chain, Some(root));

        tracer.on_custom_event("progress", json!({"pct": 50}), Some(step));
        tracer.on_custom_event("orphan", json!({}), Some(RunId::new()));

        let custom = tracer.get_events_by_phase(Phase::Custom);
        assert_eq!(custom.len(), 2);
        assert_eq!(custom[0].kind, EventKind::Custom("progress".to_string()));
        assert_eq!(custom[0].hierarchy, vec!["briefing", "weather"]);
        assert_eq!(custom[0].metadata["data"]["pct"], 50);
        assert_eq!(custom[1].attribution.node, "unknown");
    }

    #[test]
    fn test_streamed_tokens_are_counted() {
        let (tracer, memory) = tracer_with_memory();
        let model = start(&tracer, "ChatOllama", RunKind::Llm, None);

        for token in ["Hel", "lo"] {
            tracer.on_llm_token(model, token);
        }
        tracer.on_run_end(model, json!({"prompt_eval_count": 3, "eval_count": 2}));

        assert_eq!(tracer.get_execution_summary().streamed_chunks, 2);
        let end = memory.events().into_iter().find(|e| e.kind == EventKind::RunEnd).unwrap();
        assert_eq!(end.metadata["streamed_chunks"], 2);
        assert_eq!(end.metadata["token_usage"]["total_tokens"], 5);
    }

    #[test]
    fn test_oversized_usage_does_not_panic() {
        let (tracer, _memory) = tracer_with_memory();

        let model = start(&tracer, "ChatOpenAI", RunKind::Llm, None);
        tracer.on_run_end(
            model,
            json!({"usage": {"input_tokens": u64::MAX, "output_tokens": 1}}),
        );

        let usage = tracer.get_token_usage();
        assert_eq!(usage.input_tokens, u64::MAX);
        assert_eq!(usage.total_tokens, u64::MAX);
        let payload = llm_result("", json!([]), Some((u64::MAX, 1)));
        assert_eq!(payload["llm_output"]["token_usage"]["total_tokens"], u64::MAX);
    }

    #[test]
    fn test_repeated_completion_is_ignored() {
        let (tracer, _memory) = tracer_with_memory();

        let model = start(&tracer, "ChatOpenAI", RunKind::Llm, None);
        let outputs = llm_result(
            "",
            json!([{"name": "search", "args": {}, "id": "c1"}]),
            Some((10, 5)),
        );
        tracer.on_run_end(model, outputs.clone());
        tracer.on_run_end(model, outputs);
        tracer.on_run_error(model, RunError::new("late"));
        tracer.on_llm_token(model, "late");

        let summary = tracer.get_execution_summary();
        assert_eq!(summary.token_usage.total_tokens, 15);
        assert_eq!(summary.model_calls, 1);
        assert_eq!(summary.tool_calls_requested, 1);
        assert_eq!(summary.streamed_chunks, 0);
        assert_eq!(summary.failed_runs, 0);
        assert!(tracer.get_events_by_phase(Phase::Error).is_empty());
    }

    #[test]
    fn test_name_match_prefers_requests_from_same_node() {
        let (tracer, _memory) = tracer_with_memory();

        let root = start(&tracer, "briefing", RunKind::Chain, None);
        let weather = start(&tracer, "weather", RunKind::Chain, Some(root));
        let news = start(&tracer, "news", RunKind::Chain, Some(root));

        let weather_model = start(&tracer, "ChatOpenAI", RunKind::Llm, Some(weather));
        tracer.on_run_end(
            weather_model,
            llm_result("", json!([{"name": "lookup", "args": {}}]), None),
        );
        let news_model = start(&tracer, "ChatOpenAI", RunKind::Llm, Some(news));
        tracer.on_run_end(
            news_model,
            llm_result("", json!([{"name": "lookup", "args": {}}]), None),
        );

        let news_tools = start(&tracer, "tools", RunKind::Chain, Some(news));
        let news_tool = start(&tracer, "lookup", RunKind::Tool, Some(news_tools));
        tracer.on_run_end(news_tool, json!("headlines"));

        let orphan = start(&tracer, "lookup", RunKind::Tool, None);
        tracer.on_run_end(orphan, json!("forecast"));

        let executed = tracer.get_events_by_kind(&EventKind::ToolExecuted);
        assert_eq!(executed[0].correlation_id(), Some(format!("{}:0", news_model).as_str()));
        assert_eq!(executed[1].correlation_id(), Some(format!("{}:0", weather_model).as_str()));
        assert!(tracer.get_execution_summary().tool_call_parity);
    }

    #[test]
    fn test_token_usage_accumulates() {
        let (tracer, _memory) = tracer_with_memory();

        let first = start(&tracer, "ChatOpenAI", RunKind::Llm, None);
        let second = start(&tracer, "ChatOpenAI", RunKind::Llm, None);
        tracer.on_run_end(second, llm_result("b", json!([]), Some((7, 3))));
        tracer.on_run_end(first, llm_result("a", json!([]), Some((10, 5))));

        let usage = tracer.get_token_usage();
        assert_eq!(usage.input_tokens, 17);
        assert_eq!(usage.output_tokens, 8);
        assert_eq!(usage.total_tokens, 25);
    }

    struct CountingCloseSink(AtomicUsize);

    impl EventSink for CountingCloseSink {
        fn name(&self) -> &str {
            "counting"
        }

        fn accept(&self, _event: &CapturedEvent) -> Result<()> {
            Ok(())
        }

        fn close(&self) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_finish_closes_sinks_once() {
        let sink = Arc::new(CountingCloseSink(AtomicUsize::new(0)));
        let sinks: Vec<Arc<dyn EventSink>> = vec![sink.clone()];
        let tracer = TracerSystem::with_sinks(TracerConfig::default(), sinks).unwrap();

        tracer.finish();
        tracer.finish();
        drop(tracer);

        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_tracer_finishes_and_summarizes() {
        let sink = Arc::new(CountingCloseSink(AtomicUsize::new(0)));
        let sinks: Vec<Arc<dyn EventSink>> = vec![sink.clone()];
        let tracer = Arc::new(TracerSystem::with_sinks(TracerConfig::default(), sinks).unwrap());

        let inner = Arc::clone(&tracer);
        let (value, summary) = with_tracer(Arc::clone(&tracer), async move {
            let id = start(&inner, "agent", RunKind::Chain, None);
            inner.on_run_end(id, json!(null));
            7
        })
        .await;

        assert_eq!(value, 7);
        assert_eq!(summary.total_events, 2);
        assert!(tracer.is_finished());
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_file_sink_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl");
        let tracer = TracerSystem::new(TracerConfig::default().with_log_file(&path)).unwrap();

        let id = start(&tracer, "agent", RunKind::Chain, None);
        tracer.on_run_end(id, json!(null));
        tracer.finish();

        let events = FileSink::read_events(&path).unwrap();
        assert_eq!(kinds(&events), vec!["run:start", "run:end"]);
    }

    #[test]
    fn test_allow_list_from_config() {
        let memory = Arc::new(MemorySink::new());
        let sinks: Vec<Arc<dyn EventSink>> = vec![memory.clone()];
        let tracer = TracerSystem::with_sinks(
            TracerConfig::default().with_semantic_nodes(["planner"]),
            sinks,
        )
        .unwrap();

        let root = start(&tracer, "planner", RunKind::Chain, None);
        start(&tracer, "helper", RunKind::Chain, Some(root));

        assert_eq!(memory.len(), 1);
        assert_eq!(memory.events()[0].hierarchy, vec!["planner"]);
    }

    #[test]
    fn test_invalid_pattern_in_config() {
        let result = TracerSystem::with_sinks(
            TracerConfig::default().with_plumbing_pattern("(oops"),
            Vec::new(),
        );
        assert!(result.is_err());
    }
}
