//! Event sinks
//!
//! Sinks receive every captured event after it is appended to the in-process
//! event list. They observe only: a sink never transforms or drops events.
//!
//! - [`ConsoleSink`] pretty-prints events indented by nesting level
//! - [`FileSink`] appends one JSON object per line, flushing after each write
//! - [`MemorySink`] buffers events in memory

use super::tracer_events::CapturedEvent;
use crate::error::{Result, TracerError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Consumer of captured events
pub trait EventSink: Send + Sync {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    /// Receive one event
    fn accept(&self, event: &CapturedEvent) -> Result<()>;

    /// Release any held resources; called once when tracing ends
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Pretty-printer indented by nesting level
pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
    indent: String,
}

impl ConsoleSink {
    /// Console sink writing to stdout
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Console sink writing to any writer
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            indent: "  ".to_string(),
        }
    }

    pub fn with_indent(mut self, indent: impl Into<String>) -> Self {
        self.indent = indent.into();
        self
    }

    fn format(&self, event: &CapturedEvent) -> String {
        let pad = self.indent.repeat(event.level);
        let path = if event.hierarchy.is_empty() {
            event.attribution.node.clone()
        } else {
            event.hierarchy.join(" > ")
        };

        let mut line = format!("{}[{}] {} | {}", pad, event.kind, path, event.message);
        if let Some(correlation_id) = event.correlation_id() {
            line.push_str(&format!(" ({})", correlation_id));
        }
        line
    }
}

impl EventSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn accept(&self, event: &CapturedEvent) -> Result<()> {
        let line = self.format(event);
        let mut out = lock(&self.out);
        writeln!(out, "{}", line)?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        lock(&self.out).flush()?;
        Ok(())
    }
}

/// Append-only JSONL file sink
///
/// The file is opened once at construction and closed exactly once, by
/// [`EventSink::close`] or on drop, whichever comes first.
pub struct FileSink {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl FileSink {
    /// Open (or create) the file for appending, creating parent directories
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.writer).is_none()
    }

    /// Read events back from a JSONL file, one line at a time
    pub fn read_events(path: &Path) -> Result<Vec<CapturedEvent>> {
        let reader = BufReader::new(File::open(path)?);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        Ok(events)
    }
}

impl EventSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn accept(&self, event: &CapturedEvent) -> Result<()> {
        let line = serde_json::to_string(event)?;
        let mut guard = lock(&self.writer);
        let writer = guard.as_mut().ok_or_else(|| TracerError::SinkError {
            sink: self.name().to_string(),
            message: format!("{} is already closed", self.path.display()),
        })?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if let Some(mut writer) = lock(&self.writer).take() {
            writer.flush()?;
            tracing::debug!(path = %self.path.display(), "Closed trace file");
        }
        Ok(())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close trace file {}: {}", self.path.display(), e);
        }
    }
}

/// In-memory buffer of received events
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<CapturedEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        lock(&self.events).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.events).is_empty()
    }
}

impl EventSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn accept(&self, event: &CapturedEvent) -> Result<()> {
        lock(&self.events).push(event.clone());
        Ok(())
    }
}
