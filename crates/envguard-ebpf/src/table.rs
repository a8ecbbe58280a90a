//! Kernel container table.
//!
//! A pinned BPF hash map from the 8-byte namespace key to a 4-byte rule
//! bitmask. The kernel program reads it to decide per-container rules; the
//! meaning of individual bits belongs to that program.

use envguard_common::constants::CONTAINER_MAP_CAPACITY;
use envguard_common::types::{NamespacePair, RuleSet};

use crate::error::PresetError;

/// Checks a table's `max_entries` against the size the hook object declares.
///
/// A mismatch is not fatal, but registrations may hit a full table earlier
/// or later than expected, so it is logged.
pub fn capacity_matches(max_entries: u32) -> bool {
    if max_entries == CONTAINER_MAP_CAPACITY {
        return true;
    }
    tracing::warn!(
        max_entries,
        expected = CONTAINER_MAP_CAPACITY,
        "container map capacity differs from the hook object's declaration"
    );
    false
}

/// Writable view of the per-container rule table.
pub trait RuleTable: Send {
    /// Inserts or replaces the rules for `namespaces`.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel rejects the update (e.g. table full).
    fn upsert(&mut self, namespaces: NamespacePair, rules: RuleSet) -> Result<(), PresetError>;

    /// Removes the entry for `namespaces`. An absent entry is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel rejects the removal.
    fn remove(&mut self, namespaces: NamespacePair) -> Result<(), PresetError>;
}

#[cfg(all(target_os = "linux", feature = "ebpf"))]
pub use pinned::PinnedContainerMap;

#[cfg(all(target_os = "linux", feature = "ebpf"))]
mod pinned {
    use std::path::Path;

    use aya::maps::{HashMap, Map, MapData, MapError};
    use envguard_common::types::{NamespacePair, RuleSet};
    use nix::errno::Errno;

    use super::RuleTable;
    use crate::error::PresetError;

    /// The pinned container table, opened through aya.
    pub struct PinnedContainerMap {
        map: HashMap<MapData, u64, u32>,
    }

    impl PinnedContainerMap {
        /// Opens the table pinned at `path`.
        ///
        /// # Errors
        ///
        /// Returns an error if nothing is pinned there or the map has the
        /// wrong key/value layout.
        pub fn open(path: &Path) -> Result<Self, PresetError> {
            let data = MapData::from_pin(path)?;
            Self::from_map(Map::HashMap(data))
        }

        /// Wraps a map taken from a loaded object.
        ///
        /// # Errors
        ///
        /// Returns an error if the map is not a hash map of the expected layout.
        pub fn from_map(map: Map) -> Result<Self, PresetError> {
            if let Map::HashMap(data) = &map {
                match data.info() {
                    Ok(info) => {
                        let _ = super::capacity_matches(info.max_entries());
                    }
                    Err(e) => tracing::debug!(error = %e, "container map info unavailable"),
                }
            }
            Ok(Self {
                map: HashMap::try_from(map)?,
            })
        }
    }

    impl RuleTable for PinnedContainerMap {
        fn upsert(&mut self, namespaces: NamespacePair, rules: RuleSet) -> Result<(), PresetError> {
            self.map.insert(namespaces.kernel_key(), rules.bits(), 0)?;
            Ok(())
        }

        fn remove(&mut self, namespaces: NamespacePair) -> Result<(), PresetError> {
            match self.map.remove(&namespaces.kernel_key()) {
                Ok(()) | Err(MapError::KeyNotFound) => Ok(()),
                Err(MapError::SyscallError(e))
                    if e.io_error.raw_os_error() == Some(Errno::ENOENT as i32) =>
                {
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}
