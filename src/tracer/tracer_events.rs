//! Captured tracer events
//!
//! A [`CapturedEvent`] is the enriched, immutable record produced for every run
//! transition, tool-call request, tool execution and custom application event.
//! Each one carries the hierarchy path, nesting level and attribution computed at
//! emission time.

use super::hierarchy::Attribution;
use super::run::{RunId, RunKind};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// What happened
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    RunStart,
    RunEnd,
    RunError,
    ToolRequested,
    ToolExecuted,
    /// Application-defined event, carrying its own name
    Custom(String),
}

impl EventKind {
    pub fn as_str(&self) -> String {
        match self {
            EventKind::RunStart => "run:start".to_string(),
            EventKind::RunEnd => "run:end".to_string(),
            EventKind::RunError => "run:error".to_string(),
            EventKind::ToolRequested => "tool:requested".to_string(),
            EventKind::ToolExecuted => "tool:executed".to_string(),
            EventKind::Custom(name) => format!("custom:{}", name),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "run:start" => Some(EventKind::RunStart),
            "run:end" => Some(EventKind::RunEnd),
            "run:error" => Some(EventKind::RunError),
            "tool:requested" => Some(EventKind::ToolRequested),
            "tool:executed" => Some(EventKind::ToolExecuted),
            other => other.strip_prefix("custom:").map(|name| EventKind::Custom(name.to_string())),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        EventKind::parse(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown event kind: {}", value)))
    }
}

/// Business phase classification of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "phase:graph")]
    Graph,
    #[serde(rename = "phase:llm")]
    Llm,
    #[serde(rename = "phase:tool")]
    Tool,
    #[serde(rename = "phase:retriever")]
    Retriever,
    #[serde(rename = "phase:other")]
    Other,
    #[serde(rename = "phase:error")]
    Error,
    #[serde(rename = "phase:custom")]
    Custom,
}

impl Phase {
    /// Phase of a normal (non-error) transition of a run of the given kind
    pub fn for_kind(kind: RunKind) -> Self {
        match kind {
            RunKind::Chain => Phase::Graph,
            RunKind::Llm => Phase::Llm,
            RunKind::Tool => Phase::Tool,
            RunKind::Retriever => Phase::Retriever,
            RunKind::Other => Phase::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Graph => "phase:graph",
            Phase::Llm => "phase:llm",
            Phase::Tool => "phase:tool",
            Phase::Retriever => "phase:retriever",
            Phase::Other => "phase:other",
            Phase::Error => "phase:error",
            Phase::Custom => "phase:custom",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw occurrence handed to the emitter before enrichment
#[derive(Debug, Clone)]
pub struct Occurrence {
    pub kind: EventKind,
    pub phase: Phase,
    pub message: String,
    pub metadata: Map<String, Value>,
}

impl Occurrence {
    pub fn new(kind: EventKind, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            kind,
            phase,
            message: message.into(),
            metadata: Map::new(),
        }
    }

    /// Attach a metadata entry; values that fail to serialize are dropped
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), v);
        }
        self
    }
}

/// An enriched, immutable trace record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedEvent {
    pub id: Uuid,
    /// When the event was emitted (ISO-8601 when serialized)
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub phase: Phase,
    pub message: String,
    /// Run that produced the event, if any
    pub run_id: Option<RunId>,
    /// Semantic node names from root to the producing run
    pub hierarchy: Vec<String>,
    /// Nesting depth of the producing run
    pub level: usize,
    pub attribution: Attribution,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl CapturedEvent {
    pub fn new(
        occurrence: Occurrence,
        run_id: Option<RunId>,
        hierarchy: Vec<String>,
        level: usize,
        attribution: Attribution,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind: occurrence.kind,
            phase: occurrence.phase,
            message: occurrence.message,
            run_id,
            hierarchy,
            level,
            attribution,
            metadata: occurrence.metadata,
        }
    }

    pub fn is_tool_event(&self) -> bool {
        matches!(self.kind, EventKind::ToolRequested | EventKind::ToolExecuted)
    }

    /// Correlation id linking a tool request with its execution
    pub fn correlation_id(&self) -> Option<&str> {
        self.metadata.get("correlation_id").and_then(Value::as_str)
    }

    /// Get a formatted string summary of the event
    pub fn printable_summary(&self) -> String {
        let time_str = self.timestamp.with_timezone(&Local).format("%H:%M:%S%.3f").to_string();

        let mut summary = format!(
            "[{}] {} {} (level: {})\n   Message: {}",
            time_str, self.kind, self.phase, self.level, self.message
        );

        if !self.hierarchy.is_empty() {
            summary.push_str(&format!("\n   Path: {}", self.hierarchy.join(" > ")));
        }

        summary.push_str(&format!("\n   Node: {}", self.attribution.node));

        if let Some(master) = &self.attribution.master_node {
            summary.push_str(&format!("\n   Master: {}", master));
        }

        if let Some(subgraph) = &self.attribution.subgraph_node {
            summary.push_str(&format!("\n   Subgraph: {}", subgraph));
        }

        if let Some(correlation_id) = self.correlation_id() {
            summary.push_str(&format!("\n   Correlation: {}", correlation_id));
        }

        summary
    }
}
