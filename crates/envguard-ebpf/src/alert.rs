//! Alert records and the sinks they are delivered to.

use chrono::{DateTime, Utc};
use envguard_common::types::ContainerId;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::codec::DecodedEvent;

/// An event attributed to a tracked container.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    /// Container the process belongs to.
    pub container_id: ContainerId,
    /// The decoded hook event.
    pub event: DecodedEvent,
    /// When user space processed the event.
    pub observed_at: DateTime<Utc>,
}

impl Alert {
    /// Stamps a new alert with the current time.
    #[must_use]
    pub fn new(container_id: ContainerId, event: DecodedEvent) -> Self {
        Self {
            container_id,
            event,
            observed_at: Utc::now(),
        }
    }
}

/// Receives alerts from the processor.
pub trait AlertSink: Send + Sync {
    /// Delivers one alert. Must not block for long.
    fn emit(&self, alert: Alert);
}

/// Logs each alert as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn emit(&self, alert: Alert) {
        tracing::warn!(
            container_id = %alert.container_id,
            pid = alert.event.pid,
            pid_ns = alert.event.pid_ns,
            mnt_ns = alert.event.mnt_ns,
            comm = %alert.event.command_name(),
            "protect env preset alert"
        );
    }
}

/// Forwards alerts to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelAlertSink {
    /// Creates a sink and the receiver its alerts arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AlertSink for ChannelAlertSink {
    fn emit(&self, alert: Alert) {
        if self.tx.send(alert).is_err() {
            tracing::debug!("alert receiver dropped, discarding alert");
        }
    }
}
