//! # envguard-ebpf
//!
//! Runtime security-event pipeline for the environment-protection preset.
//!
//! A BPF LSM program attached to `file_open` reports accesses through a ring
//! buffer. This crate loads and attaches that program, reads the ring buffer
//! on one task, decodes and correlates each record with a container on a
//! second task, and hands matches to an [`AlertSink`](alert::AlertSink):
//!
//! ```text
//! LSM hook → ring buffer → RingBufferConsumer → bounded queue → EventProcessor → AlertSink
//! ```
//!
//! The `ebpf` feature flag must be enabled, and the host must support BPF
//! LSM, for the kernel side to be available. Everything downstream of the
//! ring buffer works without it.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod alert;
pub mod codec;
pub mod consumer;
pub mod correlator;
pub mod error;
pub mod hook;
pub mod pipeline;
pub mod preset;
pub mod processor;
pub mod source;
pub mod table;
