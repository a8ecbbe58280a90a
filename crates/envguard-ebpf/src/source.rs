//! Raw event sources feeding the pipeline.
//!
//! A source yields one record per call until it is closed through its
//! [`SourceCloser`]. Closing is the only way to stop a reader blocked on
//! the kernel.

use std::future::Future;

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::codec::RawEvent;

/// Errors returned by [`EventSource::next_record`].
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source was closed; no further records will arrive.
    #[error("event source closed")]
    Closed,

    /// A transient read failure. The caller may retry.
    #[error("reading event source: {0}")]
    Io(#[from] std::io::Error),
}

/// A stream of raw event records.
pub trait EventSource: Send + 'static {
    /// Waits for the next record.
    ///
    /// Returns [`SourceError::Closed`] once the source has been closed, for
    /// pending and future calls alike.
    fn next_record(&mut self) -> impl Future<Output = Result<RawEvent, SourceError>> + Send;
}

/// Closes the source paired with it. Dropping the closer also closes it.
#[derive(Debug)]
pub struct SourceCloser {
    tx: watch::Sender<bool>,
}

impl SourceCloser {
    /// Signals the paired source to close.
    pub fn close(&self) {
        let _ = self.tx.send_replace(true);
    }
}

/// The receiving half of a close signal, held by a source.
#[derive(Debug, Clone)]
pub struct CloseSignal {
    rx: watch::Receiver<bool>,
}

impl CloseSignal {
    /// Returns `true` once the source has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once the source has been closed.
    pub async fn closed(&mut self) {
        let _ = self.rx.wait_for(|closed| *closed).await;
    }
}

/// Creates a linked closer and signal.
#[must_use]
pub fn close_signal() -> (SourceCloser, CloseSignal) {
    let (tx, rx) = watch::channel(false);
    (SourceCloser { tx }, CloseSignal { rx })
}

/// Source fed from an in-process channel.
///
/// Used to replay captured records through the pipeline. The source closes
/// when its closer fires or when every sender is dropped.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Result<RawEvent, SourceError>>,
    close: CloseSignal,
}

impl ChannelSource {
    /// Wraps a receiver of records (or injected read errors).
    #[must_use]
    pub const fn new(rx: mpsc::Receiver<Result<RawEvent, SourceError>>, close: CloseSignal) -> Self {
        Self { rx, close }
    }
}

impl EventSource for ChannelSource {
    async fn next_record(&mut self) -> Result<RawEvent, SourceError> {
        if self.close.is_closed() {
            return Err(SourceError::Closed);
        }
        tokio::select! {
            biased;
            () = self.close.closed() => Err(SourceError::Closed),
            item = self.rx.recv() => item.unwrap_or(Err(SourceError::Closed)),
        }
    }
}

#[cfg(all(target_os = "linux", feature = "ebpf"))]
pub use ring::RingBufSource;

#[cfg(all(target_os = "linux", feature = "ebpf"))]
mod ring {
    use aya::maps::{MapData, RingBuf};
    use tokio::io::Interest;
    use tokio::io::unix::AsyncFd;

    use super::{CloseSignal, EventSource, SourceError};
    use crate::codec::RawEvent;
    use crate::error::PresetError;

    /// Reader over the hook's BPF ring buffer.
    ///
    /// Waits on the map's file descriptor instead of polling, and copies each
    /// record out before releasing it back to the kernel.
    pub struct RingBufSource {
        ring: AsyncFd<RingBuf<MapData>>,
        close: CloseSignal,
    }

    impl RingBufSource {
        /// Registers the ring buffer with the tokio reactor for readability.
        ///
        /// # Errors
        ///
        /// Returns [`PresetError::Reactor`] if the descriptor cannot be registered.
        pub fn new(ring: RingBuf<MapData>, close: CloseSignal) -> Result<Self, PresetError> {
            let ring =
                AsyncFd::with_interest(ring, Interest::READABLE).map_err(PresetError::Reactor)?;
            Ok(Self { ring, close })
        }
    }

    impl EventSource for RingBufSource {
        async fn next_record(&mut self) -> Result<RawEvent, SourceError> {
            loop {
                if self.close.is_closed() {
                    return Err(SourceError::Closed);
                }
                tokio::select! {
                    biased;
                    () = self.close.closed() => return Err(SourceError::Closed),
                    ready = self.ring.readable_mut() => {
                        let mut guard = ready?;
                        if let Some(item) = guard.get_inner_mut().next() {
                            return Ok(RawEvent::from(&*item));
                        }
                        guard.clear_ready();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn closing_unblocks_pending_read() {
        let (_tx, rx) = mpsc::channel(1);
        let (closer, signal) = close_signal();
        let mut source = ChannelSource::new(rx, signal);

        let pending = tokio::spawn(async move { source.next_record().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        closer.close();

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("read should unblock")
            .unwrap();
        assert!(matches!(result, Err(SourceError::Closed)));
    }

    #[tokio::test]
    async fn dropped_senders_close_the_source() {
        let (tx, rx) = mpsc::channel(1);
        let (_closer, signal) = close_signal();
        let mut source = ChannelSource::new(rx, signal);

        tx.send(Ok(RawEvent::new(vec![1, 2, 3]))).await.unwrap();
        drop(tx);

        assert_eq!(source.next_record().await.unwrap().as_bytes(), &[1, 2, 3]);
        assert!(matches!(source.next_record().await, Err(SourceError::Closed)));
    }

    #[test]
    fn dropping_closer_counts_as_closed() {
        let (closer, signal) = close_signal();
        assert!(!signal.is_closed());
        drop(closer);
        assert!(signal.is_closed());
    }
}
