//! Ring buffer consumer: moves records from the source into the event queue.

use tokio::sync::mpsc;

use crate::codec::RawEvent;
use crate::source::{EventSource, SourceError};

/// Counters reported when the consumer stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Records handed to the queue.
    pub forwarded: u64,
    /// Transient read errors skipped.
    pub read_errors: u64,
}

/// Reads records from an [`EventSource`] and forwards them, in order, to the
/// bounded event queue.
///
/// A full queue suspends the consumer before it reads further records. Under
/// sustained overload the kernel ring buffer then fills up and the kernel
/// drops records on its side; those losses are not visible here.
pub struct RingBufferConsumer<S> {
    source: S,
    queue: mpsc::Sender<RawEvent>,
}

impl<S: EventSource> RingBufferConsumer<S> {
    /// Creates a consumer writing into `queue`.
    pub const fn new(source: S, queue: mpsc::Sender<RawEvent>) -> Self {
        Self { source, queue }
    }

    /// Runs until the source is closed or the processor goes away.
    ///
    /// Dropping the queue sender on return is what tells the processor that
    /// no more records will arrive.
    pub async fn run(mut self) -> ConsumerStats {
        let mut stats = ConsumerStats::default();
        tracing::info!("starting ring buffer consumer");

        loop {
            match self.source.next_record().await {
                Ok(record) => {
                    if self.queue.send(record).await.is_err() {
                        tracing::warn!("event processor stopped, exiting ring buffer consumer");
                        break;
                    }
                    stats.forwarded += 1;
                }
                Err(SourceError::Closed) => {
                    tracing::info!(forwarded = stats.forwarded, "ring buffer closed, exiting consumer");
                    break;
                }
                Err(e) => {
                    stats.read_errors += 1;
                    tracing::warn!(error = %e, "ring buffer read error");
                    tokio::task::yield_now().await;
                }
            }
        }

        stats
    }
}
