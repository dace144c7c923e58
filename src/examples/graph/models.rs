//! Graph description for the toy orchestration engine

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Name of the wrapper run the engine puts around a whole invocation
pub const GRAPH_RUN_NAME: &str = "LangGraph";
/// Name of the wrapper run around tool routing
pub const TOOLS_RUN_NAME: &str = "tools";
pub const SEQUENCE_RUN_NAME: &str = "RunnableSequence";
pub const PARALLEL_RUN_NAME: &str = "RunnableParallel";

/// A tool call a scripted model will request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedToolCall {
    pub id: Option<String>,
    pub name: String,
    pub args: Value,
}

impl ScriptedToolCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: None,
            name: name.into(),
            args,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// `{name, args, id}` as it appears in an AI message
    pub fn to_value(&self) -> Value {
        let mut value = json!({"name": self.name, "args": self.args});
        if let Some(id) = &self.id {
            value["id"] = json!(id);
        }
        value
    }
}

/// Canned model output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub content: String,
    pub tool_calls: Vec<ScriptedToolCall>,
    /// (input, output) token counts
    pub usage: Option<(u64, u64)>,
    /// Stream the content word by word before completing
    pub stream: bool,
}

impl ModelResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_tool_call(mut self, call: ScriptedToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    pub fn with_usage(mut self, input: u64, output: u64) -> Self {
        self.usage = Some((input, output));
        self
    }

    pub fn streamed(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// One element of a graph
#[derive(Debug, Clone, PartialEq)]
pub enum GraphNode {
    /// A named node running its children in order
    Node { name: String, children: Vec<GraphNode> },
    /// Children running concurrently
    Parallel(Vec<GraphNode>),
    /// A model call, followed by routing of any tool calls it requests
    Model { name: String, response: ModelResponse },
    /// A node that always fails
    Fail { name: String, message: String },
    /// An application event attached to the enclosing node
    Custom { name: String, data: Value },
}

impl GraphNode {
    pub fn node(name: impl Into<String>, children: Vec<GraphNode>) -> Self {
        GraphNode::Node {
            name: name.into(),
            children,
        }
    }

    /// Unnamed sequence; traced as a plumbing run
    pub fn sequence(children: Vec<GraphNode>) -> Self {
        Self::node(SEQUENCE_RUN_NAME, children)
    }

    pub fn parallel(children: Vec<GraphNode>) -> Self {
        GraphNode::Parallel(children)
    }

    pub fn model(name: impl Into<String>, response: ModelResponse) -> Self {
        GraphNode::Model {
            name: name.into(),
            response,
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        GraphNode::Fail {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn custom(name: impl Into<String>, data: Value) -> Self {
        GraphNode::Custom {
            name: name.into(),
            data,
        }
    }
}
