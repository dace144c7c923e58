//! Toy graph engine driving the tracer
//!
//! A small, deterministic stand-in for a real orchestration framework. Models are
//! scripted, tools are plain async handlers, and every step is reported through
//! [`crate::tracer::RunCallbacks`] with the same run shapes a real engine emits.
//!
//! # Components
//!
//! - **Models**: graph description and scripted model responses
//! - **Tools**: the [`ToolHandler`] trait and a couple of handlers
//! - **Runner**: [`GraphRunner`], which executes a graph and reports its runs
//!
//! # Example
//!
//! See `demos/nested_tracing.rs` for a complete working example.

pub mod models;
pub mod runner;
pub mod tools;

pub use models::{GraphNode, ModelResponse, ScriptedToolCall};
pub use runner::GraphRunner;
pub use tools::{EchoTool, FailingTool, ToolHandler};
