//! Payload extraction strategies
//!
//! Model outputs arrive in provider-specific shapes. Instead of chained optional
//! lookups, each known shape is a pure strategy function; the strategies are tried
//! in order and the first one that recognises the payload wins. A payload that no
//! strategy recognises simply carries no data.

use super::run::RunId;
use super::token_usage::TokenUsage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool invocation requested by a model, before it executes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned call id, used to correlate the later execution
    pub id: Option<String>,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    /// Correlation id: the provider id, or `<run-id>:<index>` when absent
    pub fn correlation_id(&self, run_id: &RunId, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| format!("{}:{}", run_id, index))
    }
}

pub type ToolCallStrategy = fn(&Value) -> Option<Vec<ToolCallRequest>>;
pub type TokenUsageStrategy = fn(&Value) -> Option<TokenUsage>;

/// Tool-call strategies in priority order
pub const TOOL_CALL_STRATEGIES: &[ToolCallStrategy] = &[
    generations_tool_calls,
    message_tool_calls,
    ollama_tool_calls,
    openai_choice_tool_calls,
    anthropic_tool_use_blocks,
];

/// Token usage strategies in priority order
pub const TOKEN_USAGE_STRATEGIES: &[TokenUsageStrategy] = &[
    llm_output_token_usage,
    usage_metadata,
    generation_usage_metadata,
    usage_block,
    ollama_eval_counts,
];

/// Extract requested tool calls from a model run's outputs
pub fn extract_tool_calls(outputs: &Value) -> Vec<ToolCallRequest> {
    TOOL_CALL_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(outputs))
        .unwrap_or_default()
}

/// Extract token usage from a model run's outputs
pub fn extract_token_usage(outputs: &Value) -> Option<TokenUsage> {
    TOKEN_USAGE_STRATEGIES.iter().find_map(|strategy| strategy(outputs))
}

fn parse_calls(calls: &Value) -> Option<Vec<ToolCallRequest>> {
    calls.as_array().map(|calls| calls.iter().filter_map(parse_call).collect())
}

/// Normalise one tool call across the `{name, args}`, `{function: {name,
/// arguments}}` and `{name, input}` shapes
fn parse_call(call: &Value) -> Option<ToolCallRequest> {
    let function = call.get("function");
    let name = call
        .get("name")
        .or_else(|| function.and_then(|f| f.get("name")))
        .and_then(Value::as_str)?;

    let arguments = ["args", "arguments", "input"]
        .iter()
        .find_map(|key| call.get(*key))
        .or_else(|| function.and_then(|f| f.get("arguments")))
        .map(decode_arguments)
        .unwrap_or_else(|| Value::Object(Map::new()));

    let id = call
        .get("id")
        .or_else(|| call.get("tool_call_id"))
        .and_then(Value::as_str)
        .map(String::from);

    Some(ToolCallRequest {
        id,
        name: name.to_string(),
        arguments,
    })
}

/// String arguments are JSON-decoded when possible and kept raw otherwise
fn decode_arguments(value: &Value) -> Value {
    match value {
        Value::String(raw) => serde_json::from_str(raw).unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

fn first_generation_message(outputs: &Value) -> Option<&Value> {
    let message = outputs.pointer("/generations/0/0/message")?;
    Some(message.get("kwargs").unwrap_or(message))
}

/// LangChain `LLMResult`: `generations[][].message.tool_calls`, falling back to
/// `additional_kwargs.tool_calls`
fn generations_tool_calls(outputs: &Value) -> Option<Vec<ToolCallRequest>> {
    let generations = outputs.get("generations")?.as_array()?;
    let mut found = false;
    let mut calls = Vec::new();

    for generation in generations.iter().filter_map(Value::as_array).flatten() {
        let Some(message) = generation.get("message") else {
            continue;
        };
        let message = message.get("kwargs").unwrap_or(message);
        let parsed = message
            .get("tool_calls")
            .and_then(parse_calls)
            .filter(|c| !c.is_empty())
            .or_else(|| message.pointer("/additional_kwargs/tool_calls").and_then(parse_calls));
        if let Some(parsed) = parsed {
            found = true;
            calls.extend(parsed);
        }
    }

    found.then_some(calls)
}

/// A serialized AI message with top-level `tool_calls`
fn message_tool_calls(outputs: &Value) -> Option<Vec<ToolCallRequest>> {
    outputs.get("tool_calls").and_then(parse_calls)
}

/// Ollama chat response: `message.tool_calls`
fn ollama_tool_calls(outputs: &Value) -> Option<Vec<ToolCallRequest>> {
    outputs.pointer("/message/tool_calls").and_then(parse_calls)
}

/// OpenAI chat completion: `choices[0].message.tool_calls`
fn openai_choice_tool_calls(outputs: &Value) -> Option<Vec<ToolCallRequest>> {
    outputs.pointer("/choices/0/message/tool_calls").and_then(parse_calls)
}

/// Anthropic messages: `content[]` blocks of type `tool_use`
fn anthropic_tool_use_blocks(outputs: &Value) -> Option<Vec<ToolCallRequest>> {
    let blocks = outputs.get("content")?.as_array()?;
    let calls: Vec<_> = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
        .filter_map(parse_call)
        .collect();
    (!calls.is_empty()).then_some(calls)
}

fn count(value: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| value.get(*key).and_then(Value::as_u64))
}

/// Build usage from a block holding input/output (and maybe total) counters
fn usage_from(block: &Value, input_keys: &[&str], output_keys: &[&str]) -> Option<TokenUsage> {
    let input = count(block, input_keys);
    let output = count(block, output_keys);
    if input.is_none() && output.is_none() {
        return None;
    }
    Some(TokenUsage::new(
        input.unwrap_or(0),
        output.unwrap_or(0),
        count(block, &["total_tokens"]),
    ))
}

const INPUT_KEYS: &[&str] = &["input_tokens", "prompt_tokens"];
const OUTPUT_KEYS: &[&str] = &["output_tokens", "completion_tokens"];

/// LangChain `llm_output.token_usage` (OpenAI naming)
fn llm_output_token_usage(outputs: &Value) -> Option<TokenUsage> {
    let block = outputs.pointer("/llm_output/token_usage")?;
    usage_from(block, INPUT_KEYS, OUTPUT_KEYS)
}

/// Top-level `usage_metadata`
fn usage_metadata(outputs: &Value) -> Option<TokenUsage> {
    usage_from(outputs.get("usage_metadata")?, INPUT_KEYS, OUTPUT_KEYS)
}

/// `usage_metadata` on the first generation's message
fn generation_usage_metadata(outputs: &Value) -> Option<TokenUsage> {
    let message = first_generation_message(outputs)?;
    usage_from(message.get("usage_metadata")?, INPUT_KEYS, OUTPUT_KEYS)
}

/// Raw provider `usage` block (OpenAI or Anthropic naming)
fn usage_block(outputs: &Value) -> Option<TokenUsage> {
    usage_from(outputs.get("usage")?, INPUT_KEYS, OUTPUT_KEYS)
}

/// Ollama `prompt_eval_count` / `eval_count`
fn ollama_eval_counts(outputs: &Value) -> Option<TokenUsage> {
    usage_from(outputs, &["prompt_eval_count"], &["eval_count"])
}
