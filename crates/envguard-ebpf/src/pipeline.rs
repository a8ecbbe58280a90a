//! The two-task pipeline: consumer → bounded queue → processor.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::alert::AlertSink;
use crate::consumer::{ConsumerStats, RingBufferConsumer};
use crate::correlator::ContainerCorrelator;
use crate::processor::{EventProcessor, ProcessorStats};
use crate::source::{EventSource, SourceCloser};

/// Counters from both workers after shutdown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    /// Consumer counters.
    pub consumer: ConsumerStats,
    /// Processor counters.
    pub processor: ProcessorStats,
}

/// A running consumer/processor pair.
///
/// Records are processed in the order the source produced them: the queue
/// is FIFO with exactly one writer and one reader.
#[derive(Debug)]
pub struct Pipeline {
    closer: SourceCloser,
    consumer: JoinHandle<ConsumerStats>,
    processor: JoinHandle<ProcessorStats>,
}

impl Pipeline {
    /// Spawns both workers on the current tokio runtime.
    ///
    /// `capacity` bounds the queue between them and is clamped to at least one.
    pub fn start<S: EventSource>(
        source: S,
        closer: SourceCloser,
        capacity: usize,
        correlator: Arc<dyn ContainerCorrelator>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let consumer = tokio::spawn(RingBufferConsumer::new(source, tx).run());
        let processor = tokio::spawn(EventProcessor::new(correlator, sink).run(rx));
        tracing::debug!(capacity, "event pipeline started");

        Self {
            closer,
            consumer,
            processor,
        }
    }

    /// Closes the source and waits for both workers to finish.
    ///
    /// The consumer exits on the close signal and drops the queue sender; the
    /// processor then drains what is left and exits.
    pub async fn stop(self) -> PipelineStats {
        self.closer.close();

        let consumer = self.consumer.await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "ring buffer consumer task failed");
            ConsumerStats::default()
        });
        let processor = self.processor.await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "event processor task failed");
            ProcessorStats::default()
        });

        PipelineStats { consumer, processor }
    }
}
