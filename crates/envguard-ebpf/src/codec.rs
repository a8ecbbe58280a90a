//! Decoding of event records emitted by the file hook.
//!
//! A record is exactly [`EVENT_SIZE`] bytes: three little-endian `u32`
//! fields followed by a fixed-length command name.

use std::borrow::Cow;

use envguard_common::constants::{COMM_LEN, EVENT_SIZE};
use envguard_common::types::NamespacePair;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// A record as copied out of the ring buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent(Vec<u8>);

impl RawEvent {
    /// Wraps an owned buffer.
    #[must_use]
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Record payload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for RawEvent {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// Error returned when a record does not match the wire layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The record length differs from the fixed record size.
    #[error("event record is {actual} bytes, expected {expected}")]
    Length {
        /// Required size.
        expected: usize,
        /// Size received.
        actual: usize,
    },
}

/// A decoded file-access event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedEvent {
    /// Process that triggered the hook.
    pub pid: u32,
    /// PID namespace of the process.
    pub pid_ns: u32,
    /// Mount namespace of the process.
    pub mnt_ns: u32,
    /// Raw command name, NUL padded.
    pub comm: [u8; COMM_LEN],
}

impl DecodedEvent {
    /// Namespace pair of the process.
    #[must_use]
    pub const fn namespaces(&self) -> NamespacePair {
        NamespacePair::new(self.pid_ns, self.mnt_ns)
    }

    /// Command name up to the first NUL byte, lossily decoded.
    #[must_use]
    pub fn command_name(&self) -> Cow<'_, str> {
        let end = self.comm.iter().position(|&b| b == 0).unwrap_or(COMM_LEN);
        String::from_utf8_lossy(&self.comm[..end])
    }

    /// Encodes the event back into its wire layout.
    #[must_use]
    pub fn encode(&self) -> [u8; EVENT_SIZE] {
        let mut buf = [0_u8; EVENT_SIZE];
        buf[0..4].copy_from_slice(&self.pid.to_le_bytes());
        buf[4..8].copy_from_slice(&self.pid_ns.to_le_bytes());
        buf[8..12].copy_from_slice(&self.mnt_ns.to_le_bytes());
        buf[12..].copy_from_slice(&self.comm);
        buf
    }
}

impl Serialize for DecodedEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DecodedEvent", 4)?;
        state.serialize_field("pid", &self.pid)?;
        state.serialize_field("pid_ns", &self.pid_ns)?;
        state.serialize_field("mnt_ns", &self.mnt_ns)?;
        state.serialize_field("comm", &self.command_name())?;
        state.end()
    }
}

/// Decodes one record.
///
/// # Errors
///
/// Returns [`DecodeError::Length`] unless `bytes` is exactly [`EVENT_SIZE`] long.
pub fn decode(bytes: &[u8]) -> Result<DecodedEvent, DecodeError> {
    let record: &[u8; EVENT_SIZE] = bytes.try_into().map_err(|_| DecodeError::Length {
        expected: EVENT_SIZE,
        actual: bytes.len(),
    })?;

    let word = |at: usize| u32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]]);
    let mut comm = [0_u8; COMM_LEN];
    comm.copy_from_slice(&record[12..]);

    Ok(DecodedEvent {
        pid: word(0),
        pid_ns: word(4),
        mnt_ns: word(8),
        comm,
    })
}

/// Splits a dump of back-to-back records and decodes each frame.
///
/// A trailing partial frame yields a length error as its last item.
pub fn decode_stream(bytes: &[u8]) -> impl Iterator<Item = Result<DecodedEvent, DecodeError>> + '_ {
    bytes.chunks(EVENT_SIZE).map(decode)
}
