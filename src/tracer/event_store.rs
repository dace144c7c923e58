//! Event storage with filtering
//!
//! This module provides thread-safe, append-only storage for captured events with
//! support for filtering by time range, custom predicates and queries for the last
//! N events.

use super::tracer_events::CapturedEvent;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Trait for filtering captured events
///
/// Implement this trait to create custom event filters. This trait is used
/// instead of raw closure types to avoid type complexity warnings.
pub trait EventFilterFn: Send + Sync {
    /// Test whether an event passes the filter
    fn matches(&self, event: &CapturedEvent) -> bool;
}

/// Implement EventFilterFn for any function that matches the signature
impl<F> EventFilterFn for F
where
    F: Fn(&CapturedEvent) -> bool + Send + Sync,
{
    fn matches(&self, event: &CapturedEvent) -> bool {
        self(event)
    }
}

/// Store for capturing and querying tracer events
///
/// EventStore keeps events in emission order and never mutates or removes them.
#[derive(Default)]
pub struct EventStore {
    events: Mutex<Vec<CapturedEvent>>,
}

impl EventStore {
    /// Create a new, empty event store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CapturedEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event
    pub fn store(&self, event: CapturedEvent) {
        self.lock().push(event);
    }

    /// Snapshot of all events in emission order
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.lock().clone()
    }

    /// Events matching the time range and filter
    ///
    /// # Arguments
    ///
    /// * `start_time` - Include events with timestamp >= start_time
    /// * `end_time` - Include events with timestamp <= end_time
    /// * `filter_func` - Custom filter function to apply to events
    pub fn get_events(
        &self,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        filter_func: Option<&dyn EventFilterFn>,
    ) -> Vec<CapturedEvent> {
        self.lock()
            .iter()
            .filter(|event| Self::passes(event, start_time, end_time, filter_func))
            .cloned()
            .collect()
    }

    /// Count events matching filters
    pub fn count_events(
        &self,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        filter_func: Option<&dyn EventFilterFn>,
    ) -> usize {
        self.lock()
            .iter()
            .filter(|event| Self::passes(event, start_time, end_time, filter_func))
            .count()
    }

    /// Get summaries of events matching filters
    ///
    /// Returns printable summaries instead of cloning events
    pub fn get_event_summaries(
        &self,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        filter_func: Option<&dyn EventFilterFn>,
    ) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|event| Self::passes(event, start_time, end_time, filter_func))
            .map(CapturedEvent::printable_summary)
            .collect()
    }

    /// Get the last N event summaries, optionally filtered
    pub fn get_last_n_summaries(
        &self,
        n: usize,
        filter_func: Option<&dyn EventFilterFn>,
    ) -> Vec<String> {
        let events = self.lock();

        let filtered: Vec<_> = if let Some(filter) = filter_func {
            events.iter().filter(|e| filter.matches(e)).collect()
        } else {
            events.iter().collect()
        };

        let start_idx = filtered.len().saturating_sub(n);

        filtered[start_idx..].iter().map(|e| e.printable_summary()).collect()
    }

    fn passes(
        event: &CapturedEvent,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        filter_func: Option<&dyn EventFilterFn>,
    ) -> bool {
        if let Some(start) = start_time {
            if event.timestamp < start {
                return false;
            }
        }

        if let Some(end) = end_time {
            if event.timestamp > end {
                return false;
            }
        }

        filter_func.map_or(true, |filter| filter.matches(event))
    }

    /// Get the total number of events in the store
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the event store is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
