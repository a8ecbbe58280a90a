//! Event processor: decodes queued records and raises alerts for events
//! coming from tracked containers.

use std::sync::Arc;

use envguard_common::types::ContainerId;
use tokio::sync::mpsc;

use crate::alert::{Alert, AlertSink};
use crate::codec::{self, RawEvent};
use crate::correlator::ContainerCorrelator;

/// What happened to a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// An alert was emitted for this container.
    Alerted(ContainerId),
    /// The namespaces belong to no tracked container.
    Unattributed,
    /// A namespace id was zero; no lookup was made.
    NoNamespace,
    /// The record could not be decoded and was discarded.
    Malformed,
}

/// Counters reported when the processor stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Records taken off the queue.
    pub processed: u64,
    /// Alerts emitted.
    pub alerts: u64,
    /// Records from untracked namespaces.
    pub unattributed: u64,
    /// Records without namespace ids.
    pub no_namespace: u64,
    /// Records that failed to decode.
    pub malformed: u64,
}

impl ProcessorStats {
    fn record(&mut self, outcome: &EventOutcome) {
        self.processed += 1;
        match outcome {
            EventOutcome::Alerted(_) => self.alerts += 1,
            EventOutcome::Unattributed => self.unattributed += 1,
            EventOutcome::NoNamespace => self.no_namespace += 1,
            EventOutcome::Malformed => self.malformed += 1,
        }
    }
}

/// Drains the event queue.
pub struct EventProcessor {
    correlator: Arc<dyn ContainerCorrelator>,
    sink: Arc<dyn AlertSink>,
}

impl EventProcessor {
    /// Creates a processor resolving containers through `correlator` and
    /// delivering alerts to `sink`.
    #[must_use]
    pub fn new(correlator: Arc<dyn ContainerCorrelator>, sink: Arc<dyn AlertSink>) -> Self {
        Self { correlator, sink }
    }

    /// Handles one record. A bad record never affects the next one.
    pub fn process(&self, raw: &RawEvent) -> EventOutcome {
        let event = match codec::decode(raw.as_bytes()) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "parsing ring buffer event");
                return EventOutcome::Malformed;
            }
        };

        let namespaces = event.namespaces();
        if !namespaces.is_complete() {
            tracing::trace!(pid = event.pid, "event without namespace ids");
            return EventOutcome::NoNamespace;
        }

        match self.correlator.lookup_container_id(namespaces) {
            Some(container_id) if !container_id.is_empty() => {
                self.sink.emit(Alert::new(container_id.clone(), event));
                EventOutcome::Alerted(container_id)
            }
            _ => EventOutcome::Unattributed,
        }
    }

    /// Processes records until the queue is closed and empty.
    pub async fn run(self, mut queue: mpsc::Receiver<RawEvent>) -> ProcessorStats {
        let mut stats = ProcessorStats::default();
        tracing::info!("starting event processor");

        while let Some(raw) = queue.recv().await {
            let outcome = self.process(&raw);
            stats.record(&outcome);
        }

        tracing::info!(
            processed = stats.processed,
            alerts = stats.alerts,
            malformed = stats.malformed,
            "event queue drained, exiting processor"
        );
        stats
    }
}
