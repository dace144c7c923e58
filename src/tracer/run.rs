//! Run records supplied by the host orchestration engine
//!
//! A [`Run`] is one execution of a graph node, model call, tool call or retriever.
//! Identity, parent and name are fixed at creation. Completion or failure seals the
//! record into a new value; the store swaps the sealed record in place of the open one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Opaque, unique identifier of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Generate a fresh random run id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RunId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Categorical tag describing what a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    /// Graph node, subgraph or chain
    Chain,
    /// Model invocation
    Llm,
    /// Tool invocation
    Tool,
    Retriever,
    Other,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Chain => "chain",
            RunKind::Llm => "llm",
            RunKind::Tool => "tool",
            RunKind::Retriever => "retriever",
            RunKind::Other => "other",
        }
    }
}

/// Failure reported by the host for a run, kept verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    /// Human readable error message
    pub message: String,
    /// Original error payload as reported by the host
    #[serde(default)]
    pub payload: Value,
}

impl RunError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// A single task, node, model or tool execution instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    /// The run that caused this run to start; absent for root runs
    pub parent_id: Option<RunId>,
    pub name: String,
    pub kind: RunKind,
    /// Host supplied tags, used for explicit semantic/plumbing marking
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub inputs: Value,
    pub outputs: Option<Value>,
    pub error: Option<RunError>,
    /// Number of streamed token chunks observed while the run was open
    #[serde(default)]
    pub streamed_chunks: u64,
}

impl Run {
    /// Create a new root run starting now
    pub fn new(name: impl Into<String>, kind: RunKind) -> Self {
        Self {
            id: RunId::new(),
            parent_id: None,
            name: name.into(),
            kind,
            tags: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
            inputs: Value::Null,
            outputs: None,
            error: None,
            streamed_chunks: 0,
        }
    }

    pub fn with_id(mut self, id: RunId) -> Self {
        self.id = id;
        self
    }

    pub fn with_parent(mut self, parent_id: RunId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_inputs(mut self, inputs: Value) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Whether the run has not yet completed or failed
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Wall-clock duration in milliseconds, once the run has ended
    pub fn duration_ms(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.start_time).num_microseconds().unwrap_or(0).max(0) as f64 / 1000.0)
    }

    /// A sealed copy of this run that completed with the given outputs
    pub fn sealed_ok(&self, outputs: Value) -> Self {
        let mut sealed = self.clone();
        sealed.end_time = Some(Utc::now());
        sealed.outputs = Some(outputs);
        sealed
    }

    /// A sealed copy of this run that failed with the given error
    pub fn sealed_err(&self, error: RunError) -> Self {
        let mut sealed = self.clone();
        sealed.end_time = Some(Utc::now());
        sealed.error = Some(error);
        sealed
    }
}
