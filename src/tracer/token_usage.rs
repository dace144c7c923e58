//! Token usage accounting
//!
//! [`TokenUsageAccumulator`] sums usage across every completed model run using
//! atomic counters, so concurrent completions from parallel branches never lose
//! an increment. It has no reset; a new tracer starts a new accumulator.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Token counts reported for one or more model invocations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Create usage; the total defaults to input + output when not reported
    pub fn new(input_tokens: u64, output_tokens: u64, total_tokens: Option<u64>) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: total_tokens.unwrap_or(input_tokens.saturating_add(output_tokens)),
        }
    }
}

/// Process-wide usage counters for one tracer
#[derive(Debug, Default)]
pub struct TokenUsageAccumulator {
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    total_tokens: AtomicU64,
    model_calls: AtomicU64,
    streamed_chunks: AtomicU64,
}

impl TokenUsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the usage of one completed model call; counters saturate at `u64::MAX`
    pub fn add(&self, usage: &TokenUsage) {
        saturating_add(&self.input_tokens, usage.input_tokens);
        saturating_add(&self.output_tokens, usage.output_tokens);
        saturating_add(&self.total_tokens, usage.total_tokens);
    }

    /// Count a completed model call, with or without usage data
    pub fn record_model_call(&self) {
        self.model_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunk(&self) {
        self.streamed_chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
        }
    }

    pub fn model_calls(&self) -> u64 {
        self.model_calls.load(Ordering::Relaxed)
    }

    pub fn streamed_chunks(&self) -> u64 {
        self.streamed_chunks.load(Ordering::Relaxed)
    }

    /// Average total tokens per model call, zero before any call
    pub fn average_total_per_call(&self) -> f64 {
        match self.model_calls() {
            0 => 0.0,
            calls => self.total_tokens.load(Ordering::Relaxed) as f64 / calls as f64,
        }
    }
}

fn saturating_add(counter: &AtomicU64, amount: u64) {
    // The closure always returns Some, so the update cannot fail
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_add(amount))
    });
}
