//! Toy orchestration engine reporting its runs through [`RunCallbacks`]
//!
//! The engine mimics the run shapes a real graph framework produces: a plumbing
//! wrapper around the whole invocation, plumbing sequences and parallel fans,
//! and a `tools` plumbing run between a model and the tools it requested.

use super::models::{
    GraphNode, ModelResponse, GRAPH_RUN_NAME, PARALLEL_RUN_NAME, TOOLS_RUN_NAME,
};
use super::tools::ToolHandler;
use crate::tracer::{llm_result, Run, RunCallbacks, RunError, RunId, RunKind};
use anyhow::{anyhow, Result};
use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct GraphRunner {
    callbacks: Arc<dyn RunCallbacks>,
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl GraphRunner {
    pub fn new(callbacks: Arc<dyn RunCallbacks>) -> Self {
        Self {
            callbacks,
            tools: HashMap::new(),
        }
    }

    /// Register a tool under the name models use to request it
    pub fn with_tool(mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) -> Self {
        self.tools.insert(name.into(), handler);
        self
    }

    /// Execute a graph as one top-level invocation
    pub async fn invoke(&self, graph: &GraphNode, input: Value) -> Result<Value> {
        let root = Run::new(GRAPH_RUN_NAME, RunKind::Chain).with_inputs(input);
        let root_id = root.id;
        self.callbacks.on_run_start(root);

        let result = self.execute(graph.clone(), root_id).await;
        self.finish_run(root_id, &result);
        result
    }

    fn start(&self, name: &str, kind: RunKind, parent: RunId, inputs: Value) -> RunId {
        let run = Run::new(name, kind).with_parent(parent).with_inputs(inputs);
        let id = run.id;
        self.callbacks.on_run_start(run);
        id
    }

    fn finish_run(&self, id: RunId, result: &Result<Value>) {
        match result {
            Ok(outputs) => self.callbacks.on_run_end(id, outputs.clone()),
            Err(e) => self.callbacks.on_run_error(id, RunError::new(e.to_string())),
        }
    }

    fn execute(&self, node: GraphNode, parent: RunId) -> BoxFuture<'static, Result<Value>> {
        let runner = self.clone();
        async move {
            match node {
                GraphNode::Node { name, children } => {
                    let id = runner.start(&name, RunKind::Chain, parent, json!({}));
                    let result = runner.execute_sequence(children, id).await;
                    runner.finish_run(id, &result);
                    result
                }
                GraphNode::Parallel(children) => {
                    let id = runner.start(PARALLEL_RUN_NAME, RunKind::Chain, parent, json!({}));
                    let result = runner.execute_parallel(children, id).await;
                    runner.finish_run(id, &result);
                    result
                }
                GraphNode::Model { name, response } => {
                    runner.execute_model(&name, response, parent).await
                }
                GraphNode::Fail { name, message } => {
                    let id = runner.start(&name, RunKind::Chain, parent, json!({}));
                    let result = Err(anyhow!("{}", message));
                    runner.finish_run(id, &result);
                    result
                }
                GraphNode::Custom { name, data } => {
                    runner.callbacks.on_custom_event(&name, data, Some(parent));
                    Ok(Value::Null)
                }
            }
        }
        .boxed()
    }

    async fn execute_sequence(&self, children: Vec<GraphNode>, parent: RunId) -> Result<Value> {
        let mut outputs = Vec::with_capacity(children.len());
        for child in children {
            outputs.push(self.execute(child, parent).await?);
        }
        Ok(Value::Array(outputs))
    }

    /// Each branch runs on its own task; all branches finish before the fan closes
    async fn execute_parallel(&self, children: Vec<GraphNode>, parent: RunId) -> Result<Value> {
        let handles: Vec<_> = children
            .into_iter()
            .map(|child| tokio::spawn(self.execute(child, parent)))
            .collect();

        let mut outputs = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for joined in join_all(handles).await {
            match joined {
                Ok(Ok(value)) => outputs.push(value),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(anyhow!("branch panicked: {}", e));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(Value::Array(outputs)),
        }
    }

    async fn execute_model(
        &self,
        name: &str,
        response: ModelResponse,
        parent: RunId,
    ) -> Result<Value> {
        let id = self.start(name, RunKind::Llm, parent, json!({"prompts": []}));

        if response.stream {
            for word in response.content.split_inclusive(' ') {
                self.callbacks.on_llm_token(id, word);
                tokio::task::yield_now().await;
            }
        }

        let calls: Vec<Value> = response.tool_calls.iter().map(|c| c.to_value()).collect();
        let outputs = llm_result(&response.content, Value::Array(calls), response.usage);
        self.callbacks.on_run_end(id, outputs);

        if response.tool_calls.is_empty() {
            return Ok(json!(response.content));
        }

        let tools_id = self.start(TOOLS_RUN_NAME, RunKind::Chain, parent, json!({}));
        let mut results = Vec::with_capacity(response.tool_calls.len());
        for call in &response.tool_calls {
            let inputs = match &call.id {
                Some(call_id) => json!({"tool_call_id": call_id, "args": call.args}),
                None => json!({"args": call.args}),
            };
            let tool_id = self.start(&call.name, RunKind::Tool, tools_id, inputs);

            let outcome = match self.tools.get(&call.name) {
                Some(handler) => handler.call(&call.args).await,
                None => Err(anyhow!("unknown tool '{}'", call.name)),
            };

            // Tool failures are reported back as results; they do not fail the node
            match outcome {
                Ok(value) => {
                    debug!(tool = %call.name, "Tool succeeded");
                    self.callbacks.on_run_end(tool_id, value.clone());
                    results.push(value);
                }
                Err(e) => {
                    warn!(tool = %call.name, "Tool failed: {}", e);
                    self.callbacks.on_run_error(tool_id, RunError::new(e.to_string()));
                    results.push(json!({"error": e.to_string()}));
                }
            }
        }

        let results = Value::Array(results);
        self.callbacks.on_run_end(tools_id, results.clone());
        Ok(results)
    }
}
