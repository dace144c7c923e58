//! Hierarchical run tracing for LLM orchestration graphs
//!
//! The host engine reports runs (graph nodes, model calls, tool calls) through
//! [`RunCallbacks`]. The tracer turns that flat stream into events that know
//! where they happened: which semantic node produced them, which top-level node
//! owns that node, and how deep it is nested.
//!
//! # Architecture
//!
//! - **RunStore**: arena of run records keyed by id, parent links as ids
//! - **HierarchyResolver**: walks parent links and filters plumbing runs out of
//!   the execution path using a [`NodeClassifier`]
//! - **EventEmitter**: enriches occurrences into [`CapturedEvent`]s, records them in
//!   the [`EventStore`] and fans them out to [`EventSink`]s
//! - **extract**: ordered strategies reading tool calls and token usage from
//!   provider-specific model outputs
//! - **TracerSystem**: the callback implementation tying everything together
//! - **NullTracer**: Null object pattern for when tracing is disabled
//!
//! # Usage Example
//!
//! ```rust,ignore
//! use runtrace::tracer::{RunCallbacks, Run, RunKind, TracerSystem};
//! use runtrace::TracerConfig;
//!
//! let tracer = TracerSystem::new(TracerConfig::from_env()?)?;
//!
//! let root = Run::new("coordinator", RunKind::Chain);
//! let root_id = root.id;
//! tracer.on_run_start(root);
//! tracer.on_run_end(root_id, serde_json::json!({"done": true}));
//! tracer.finish();
//!
//! println!("{}", tracer.get_execution_summary().printable_summary());
//! ```
//!
//! # Correlation IDs
//!
//! Each tool call a model requests gets a correlation id: the provider's call id
//! when present, `<run-id>:<index>` otherwise. The matching `tool:executed` event
//! carries the same id, which is what the parity check in the summary relies on.

pub mod callbacks;
pub mod emitter;
pub mod event_store;
pub mod extract;
pub mod hierarchy;
pub mod null_tracer;
pub mod report;
pub mod run;
pub mod run_store;
pub mod sinks;
pub mod token_usage;
pub mod tracer_events;
pub mod tracer_system;

// Re-export main types
pub use callbacks::RunCallbacks;
pub use emitter::EventEmitter;
pub use event_store::{EventFilterFn, EventStore};
pub use extract::{extract_token_usage, extract_tool_calls, ToolCallRequest};
pub use hierarchy::{
    AllowListClassifier, Attribution, HierarchyResolver, NodeClassifier, PatternClassifier,
};
pub use null_tracer::NullTracer;
pub use report::ExecutionSummary;
pub use run::{Run, RunError, RunId, RunKind};
pub use run_store::RunStore;
pub use sinks::{ConsoleSink, EventSink, FileSink, MemorySink};
pub use token_usage::{TokenUsage, TokenUsageAccumulator};
pub use tracer_events::{CapturedEvent, EventKind, Occurrence, Phase};
pub use tracer_system::{llm_result, with_tracer, TracerSystem};
