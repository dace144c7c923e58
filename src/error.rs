//! Error types and result aliases for the runtrace library.
//!
//! This module defines the core error type [`TracerError`] and the [`Result`] type alias
//! used throughout the library. Host-facing callbacks never return these errors; they
//! surface from construction, configuration, the run store and individual sinks, and
//! the tracer absorbs them at the callback boundary.

use crate::tracer::run::RunId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TracerError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid node pattern: {0}")]
    PatternError(#[from] regex::Error),

    #[error("Run already recorded: {0}")]
    DuplicateRun(RunId),

    #[error("Run not found: {0}")]
    UnknownRun(RunId),

    #[error("Run {0} has already completed or failed")]
    AlreadySealed(RunId),

    #[error("Run {0} cannot be its own parent")]
    SelfParent(RunId),

    #[error("Sink '{sink}' failed: {message}")]
    SinkError { sink: String, message: String },
}

pub type Result<T> = std::result::Result<T, TracerError>;
