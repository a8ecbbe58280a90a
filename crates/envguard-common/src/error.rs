//! Unified error types for the envguard workspace.
//!
//! The pipeline crate defines its own setup and runtime error enums that
//! wrap these common variants when appropriate.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ContainerId, NamespacePair};

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum EnvguardError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A namespace pair is already bound to another container.
    #[error("namespace pair {namespaces} already bound to container {owner}")]
    Conflict {
        /// The contested namespace pair.
        namespaces: NamespacePair,
        /// Container currently owning the pair.
        owner: ContainerId,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, EnvguardError>;
