//! # envguard-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the envguard workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate. It carries the vocabulary shared by the event pipeline
//! and its host: container identifiers, kernel namespace pairs, rule
//! bitmasks and the preset configuration.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
