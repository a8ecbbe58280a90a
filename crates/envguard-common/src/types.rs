//! Domain primitive types used across the envguard workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a container instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the empty identifier.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContainerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// The (PID namespace, mount namespace) pair that scopes a process to a
/// container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespacePair {
    /// PID namespace inode number.
    pub pid_ns: u32,
    /// Mount namespace inode number.
    pub mnt_ns: u32,
}

impl NamespacePair {
    /// Creates a namespace pair.
    #[must_use]
    pub const fn new(pid_ns: u32, mnt_ns: u32) -> Self {
        Self { pid_ns, mnt_ns }
    }

    /// Both namespaces are known. A zero id means the hook could not
    /// resolve it, and such events are never correlated.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.pid_ns != 0 && self.mnt_ns != 0
    }

    /// Key of this pair in the kernel container table.
    ///
    /// The kernel side declares the key as `struct { u32 pid_ns; u32 mnt_ns; }`,
    /// so the bytes are laid out in host order, `pid_ns` first.
    #[must_use]
    pub fn kernel_key(&self) -> u64 {
        let mut bytes = [0_u8; 8];
        bytes[..4].copy_from_slice(&self.pid_ns.to_ne_bytes());
        bytes[4..].copy_from_slice(&self.mnt_ns.to_ne_bytes());
        u64::from_ne_bytes(bytes)
    }
}

impl fmt::Display for NamespacePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pidns:{}/mntns:{}", self.pid_ns, self.mnt_ns)
    }
}

/// Rule bitmask stored as the kernel container table value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet(u32);

impl RuleSet {
    /// Report matching accesses.
    pub const AUDIT: Self = Self(1 << 0);
    /// Deny matching accesses.
    pub const BLOCK: Self = Self(1 << 1);

    /// No rules.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Wraps a raw bitmask. Unknown bits are kept as-is.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bitmask.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two rule sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Enforcement state attached to a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerBinding {
    /// Namespaces the container's processes live in.
    pub namespaces: NamespacePair,
    /// Rules applied to the container.
    pub rules: RuleSet,
}

/// Action requested by a preset rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresetAction {
    /// Report only.
    Audit,
    /// Deny the operation.
    Block,
}

impl PresetAction {
    /// Rule bit this action maps to in the kernel table.
    #[must_use]
    pub const fn rule(self) -> RuleSet {
        match self {
            Self::Audit => RuleSet::AUDIT,
            Self::Block => RuleSet::BLOCK,
        }
    }
}

/// A preset enabled by a security policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetRule {
    /// Preset name, e.g. `protectEnv`.
    pub name: String,
    /// Requested action.
    pub action: PresetAction,
}

/// Policy description for a group of containers, supplied by the policy
/// component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndPoint {
    /// Endpoint name.
    pub name: String,
    /// Containers belonging to the endpoint.
    #[serde(default)]
    pub containers: Vec<ContainerId>,
    /// Presets enabled for the endpoint.
    #[serde(default)]
    pub presets: Vec<PresetRule>,
}

impl EndPoint {
    /// Folds the actions of every preset named `preset` into one rule set.
    #[must_use]
    pub fn rules_for(&self, preset: &str) -> RuleSet {
        self.presets
            .iter()
            .filter(|p| p.name == preset)
            .fold(RuleSet::empty(), |acc, p| acc.union(p.action.rule()))
    }
}
