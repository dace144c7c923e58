//! Tool handlers for the toy engine

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// An executable tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: &Value) -> Result<Value>;
}

/// Returns its arguments, optionally after a delay
pub struct EchoTool {
    delay: Duration,
}

impl EchoTool {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for EchoTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for EchoTool {
    async fn call(&self, args: &Value) -> Result<Value> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(json!({"echo": args}))
    }
}

/// Always fails with the given message
pub struct FailingTool(pub String);

#[async_trait]
impl ToolHandler for FailingTool {
    async fn call(&self, _args: &Value) -> Result<Value> {
        Err(anyhow!("{}", self.0))
    }
}
