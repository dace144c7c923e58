//! Central event dispatch
//!
//! The emitter enriches an [`Occurrence`] with hierarchy data, appends the
//! resulting [`CapturedEvent`] to the event store and forwards it to every sink.
//! Sink failures are logged and absorbed so that one failing sink never starves
//! the others or reaches the traced system.

use super::event_store::EventStore;
use super::hierarchy::{Attribution, HierarchyResolver, NodeClassifier};
use super::run::Run;
use super::run_store::RunStore;
use super::sinks::EventSink;
use super::tracer_events::{CapturedEvent, Occurrence};
use std::sync::Arc;
use tracing::warn;

pub struct EventEmitter {
    events: Arc<EventStore>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventEmitter {
    pub fn new(events: Arc<EventStore>, sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { events, sinks }
    }

    pub fn event_store(&self) -> &Arc<EventStore> {
        &self.events
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Enrich, record and fan out one occurrence
    ///
    /// Without a run the event carries an empty path and unknown attribution.
    pub fn emit(
        &self,
        occurrence: Occurrence,
        run: Option<&Run>,
        store: &RunStore,
        classifier: &dyn NodeClassifier,
    ) -> CapturedEvent {
        let event = match run {
            Some(run) => {
                let (path, level, attribution) =
                    HierarchyResolver::new(store, classifier).resolve(run);
                CapturedEvent::new(occurrence, Some(run.id), path, level, attribution)
            }
            None => CapturedEvent::new(occurrence, None, Vec::new(), 0, Attribution::unknown()),
        };

        self.events.store(event.clone());
        self.dispatch(&event);
        event
    }

    fn dispatch(&self, event: &CapturedEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.accept(event) {
                warn!(sink = sink.name(), kind = %event.kind, "Sink rejected event: {}", e);
            }
        }
    }

    /// Close every sink once, logging failures
    pub fn close_sinks(&self) {
        for sink in &self.sinks {
            if let Err(e) = sink.close() {
                warn!(sink = sink.name(), "Failed to close sink: {}", e);
            }
        }
    }
}
