pub mod config;
pub mod error;
pub mod examples;
pub mod tracer;

pub use config::TracerConfig;
pub use error::{Result, TracerError};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::TracerConfig;
    pub use crate::error::{Result, TracerError};
    pub use crate::tracer::{
        with_tracer, CapturedEvent, EventKind, EventSink, ExecutionSummary, NullTracer, Phase,
        Run, RunCallbacks, RunError, RunId, RunKind, TracerSystem,
    };
}
