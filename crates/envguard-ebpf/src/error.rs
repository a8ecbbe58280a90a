//! Error types for preset setup and kernel table access.

use envguard_common::error::EnvguardError;
use thiserror::Error;

/// Errors raised while loading, attaching, or operating the preset.
#[derive(Debug, Error)]
pub enum PresetError {
    /// BPF support is not compiled in or not available on this platform.
    #[error("eBPF support unavailable: {reason}")]
    Unsupported {
        /// Why support is missing.
        reason: &'static str,
    },

    /// The memlock resource limit could not be lifted.
    #[error("failed to remove memlock rlimit: {source}")]
    Rlimit {
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A program or map expected in the object is absent.
    #[error("{kind} '{name}' not found in loaded object")]
    MissingObject {
        /// `program` or `map`.
        kind: &'static str,
        /// Name looked up.
        name: String,
    },

    /// The object could not be loaded.
    #[cfg(all(target_os = "linux", feature = "ebpf"))]
    #[error("loading BPF object: {0}")]
    Load(#[from] aya::EbpfError),

    /// The LSM program could not be loaded or attached.
    #[cfg(all(target_os = "linux", feature = "ebpf"))]
    #[error("LSM program: {0}")]
    Program(#[from] aya::programs::ProgramError),

    /// Kernel BTF could not be read.
    #[cfg(all(target_os = "linux", feature = "ebpf"))]
    #[error("reading kernel BTF: {0}")]
    Btf(#[from] aya::BtfError),

    /// A map operation failed.
    #[cfg(all(target_os = "linux", feature = "ebpf"))]
    #[error("BPF map: {0}")]
    Map(#[from] aya::maps::MapError),

    /// The ring buffer could not be registered with the async reactor.
    #[error("registering ring buffer with reactor: {0}")]
    Reactor(std::io::Error),

    /// A shared-layer error (registry conflicts, missing containers).
    #[error(transparent)]
    Common(#[from] EnvguardError),
}
