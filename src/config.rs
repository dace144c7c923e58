//! Tracer configuration
//!
//! [`TracerConfig`] is a plain struct with builder methods. It can also be read
//! from the environment (after loading a `.env` file if one is present):
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `RUNTRACE_ENABLED` | record events at all (default `true`) |
//! | `RUNTRACE_CONSOLE` | attach the console sink (default `false`) |
//! | `RUNTRACE_LOG_FILE` | path of the JSONL trace file |
//! | `RUNTRACE_INCLUDE_PLUMBING` | emit start/end events for plumbing runs |
//! | `RUNTRACE_PLUMBING_PATTERNS` | extra comma-separated plumbing regexes |
//! | `RUNTRACE_SEMANTIC_NODES` | comma-separated allow-list of node names |

use crate::error::{Result, TracerError};
use std::path::PathBuf;

pub const ENV_ENABLED: &str = "RUNTRACE_ENABLED";
pub const ENV_CONSOLE: &str = "RUNTRACE_CONSOLE";
pub const ENV_LOG_FILE: &str = "RUNTRACE_LOG_FILE";
pub const ENV_INCLUDE_PLUMBING: &str = "RUNTRACE_INCLUDE_PLUMBING";
pub const ENV_PLUMBING_PATTERNS: &str = "RUNTRACE_PLUMBING_PATTERNS";
pub const ENV_SEMANTIC_NODES: &str = "RUNTRACE_SEMANTIC_NODES";

/// Configuration for a tracer instance
#[derive(Debug, Clone, PartialEq)]
pub struct TracerConfig {
    pub enabled: bool,
    /// Print events to stdout
    pub console: bool,
    /// Append events to this JSONL file
    pub log_file: Option<PathBuf>,
    /// Emit start/end events for plumbing chain runs too
    pub include_plumbing: bool,
    /// Extra regexes identifying plumbing run names
    pub plumbing_patterns: Vec<String>,
    /// When non-empty, only these names count as semantic nodes
    pub semantic_nodes: Vec<String>,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            console: false,
            log_file: None,
            include_plumbing: false,
            plumbing_patterns: Vec::new(),
            semantic_nodes: Vec::new(),
        }
    }
}

impl TracerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_include_plumbing(mut self, include: bool) -> Self {
        self.include_plumbing = include;
        self
    }

    pub fn with_plumbing_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.plumbing_patterns.push(pattern.into());
        self
    }

    pub fn with_semantic_nodes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.semantic_nodes = names.into_iter().map(Into::into).collect();
        self
    }

    /// Load `.env` (if present) and read configuration from the environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup, starting from the defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_ENABLED) {
            config.enabled = parse_bool(ENV_ENABLED, &value)?;
        }
        if let Some(value) = lookup(ENV_CONSOLE) {
            config.console = parse_bool(ENV_CONSOLE, &value)?;
        }
        if let Some(value) = lookup(ENV_INCLUDE_PLUMBING) {
            config.include_plumbing = parse_bool(ENV_INCLUDE_PLUMBING, &value)?;
        }
        config.log_file = lookup(ENV_LOG_FILE)
            .filter(|v| !v.trim().is_empty())
            .map(|v| PathBuf::from(v.trim()));
        if let Some(value) = lookup(ENV_PLUMBING_PATTERNS) {
            config.plumbing_patterns = split_list(&value);
        }
        if let Some(value) = lookup(ENV_SEMANTIC_NODES) {
            config.semantic_nodes = split_list(&value);
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(TracerError::ConfigError(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = TracerConfig::default();
        assert!(config.enabled);
        assert!(!config.console);
        assert!(config.log_file.is_none());
        assert!(!config.include_plumbing);
    }

    #[test]
    fn test_builder_methods() {
        let config = TracerConfig::new()
            .with_console(true)
            .with_log_file("/tmp/trace.jsonl")
            .with_include_plumbing(true)
            .with_plumbing_pattern("^internal_")
            .with_semantic_nodes(["planner"]);

        assert!(config.console);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/trace.jsonl")));
        assert!(config.include_plumbing);
        assert_eq!(config.plumbing_patterns, vec!["^internal_"]);
        assert_eq!(config.semantic_nodes, vec!["planner"]);
    }

    #[test]
    fn test_from_lookup() {
        let config = TracerConfig::from_lookup(lookup_from(&[
            (ENV_ENABLED, "false"),
            (ENV_CONSOLE, "yes"),
            (ENV_LOG_FILE, " traces/run.jsonl "),
            (ENV_PLUMBING_PATTERNS, "^internal_, ^hidden$,"),
            (ENV_SEMANTIC_NODES, "planner,executor"),
        ]))
        .unwrap();

        assert!(!config.enabled);
        assert!(config.console);
        assert_eq!(config.log_file, Some(PathBuf::from("traces/run.jsonl")));
        assert_eq!(config.plumbing_patterns, vec!["^internal_", "^hidden$"]);
        assert_eq!(config.semantic_nodes, vec!["planner", "executor"]);
    }

    #[test]
    fn test_from_lookup_empty_uses_defaults() {
        let config = TracerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, TracerConfig::default());
    }

    #[test]
    fn test_invalid_boolean() {
        let err = TracerConfig::from_lookup(lookup_from(&[(ENV_CONSOLE, "maybe")])).unwrap_err();
        assert!(matches!(err, TracerError::ConfigError(_)));
        assert!(err.to_string().contains(ENV_CONSOLE));
    }
}
