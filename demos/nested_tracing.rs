//! Nested tracing demonstration
//!
//! Runs a small multi-agent graph on the toy engine: a coordinator fans out to
//! two research subgraphs in parallel, each of which calls a model that requests
//! tools. Every event is printed with its semantic path, and the execution summary
//! shows token totals and tool-call parity at the end.
//!
//! Tracer settings come from the environment (or a `.env` file), e.g.
//! `RUNTRACE_LOG_FILE=traces/demo.jsonl` to also write a JSONL trace.
//!
//! Run with: cargo run --example nested_tracing

use runtrace::examples::graph::{EchoTool, GraphNode, GraphRunner, ModelResponse, ScriptedToolCall};
use runtrace::tracer::{with_tracer, TracerSystem};
use runtrace::TracerConfig;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn research(name: &str, topic: &str, usage: (u64, u64)) -> GraphNode {
    GraphNode::node(
        name,
        vec![GraphNode::sequence(vec![
            GraphNode::custom("progress", json!({"topic": topic, "stage": "searching"})),
            GraphNode::model(
                "ChatOpenAI",
                ModelResponse::text("")
                    .with_tool_call(
                        ScriptedToolCall::new("web_search", json!({"query": topic}))
                            .with_id(format!("{}-search", name)),
                    )
                    .with_usage(usage.0, usage.1),
            ),
        ])],
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = TracerConfig::from_env()?.with_console(true);
    let tracer = Arc::new(TracerSystem::new(config)?);

    let runner = GraphRunner::new(tracer.clone()).with_tool(
        "web_search",
        Arc::new(EchoTool::new().with_delay(Duration::from_millis(20))),
    );

    let graph = GraphNode::node(
        "coordinator",
        vec![
            GraphNode::parallel(vec![
                research("market_research", "rust adoption", (120, 40)),
                research("tech_research", "async runtimes", (95, 30)),
            ]),
            GraphNode::node(
                "writer",
                vec![GraphNode::model(
                    "ChatOpenAI",
                    ModelResponse::text("Rust adoption keeps growing.")
                        .with_usage(300, 60)
                        .streamed(),
                )],
            ),
        ],
    );

    println!("{}", "=".repeat(80));
    println!("Event stream");
    println!("{}", "=".repeat(80));

    let (result, summary) =
        with_tracer(tracer.clone(), runner.invoke(&graph, json!({"question": "state of rust"})))
            .await;

    println!();
    println!("{}", "=".repeat(80));
    println!("Execution summary");
    println!("{}", "=".repeat(80));
    println!("{}", summary.printable_summary());

    println!();
    println!("Tool calls by node:");
    for event in tracer.get_tool_call_events() {
        println!(
            "  {:<16} {:<14} {}",
            event.attribution.node,
            event.kind,
            event.correlation_id().unwrap_or("-")
        );
    }

    result?;
    Ok(())
}
