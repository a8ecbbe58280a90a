//! System-wide constants and default names.

/// Size in bytes of one event record emitted by the file hook.
///
/// Layout: `pid: u32`, `pid_ns: u32`, `mnt_ns: u32` (little-endian),
/// followed by [`COMM_LEN`] bytes of command name.
pub const EVENT_SIZE: usize = 12 + COMM_LEN;

/// Length of the fixed command-name field in an event record.
pub const COMM_LEN: usize = 80;

/// Capacity of the queue between the ring buffer reader and the processor.
///
/// Shared with the syscall monitor's channel size.
pub const EVENT_CHANNEL_SIZE: usize = 1 << 13;

/// Maximum number of entries in the kernel container table.
pub const CONTAINER_MAP_CAPACITY: u32 = 256;

/// Pinned name of the kernel container table.
pub const DEFAULT_CONTAINER_MAP: &str = "envguard_preset_containers";

/// BPF filesystem mount point used for pinning.
pub const DEFAULT_PIN_DIR: &str = "/sys/fs/bpf";

/// Default location of the compiled hook object.
pub const DEFAULT_OBJECT_PATH: &str = "/usr/lib/envguard/protectenv.bpf.o";

/// Name of the LSM program inside the hook object.
pub const DEFAULT_PROGRAM: &str = "enforce_file";

/// LSM hook point the program is attached to.
pub const DEFAULT_LSM_HOOK: &str = "file_open";

/// Name of the ring buffer map inside the hook object.
pub const DEFAULT_EVENTS_MAP: &str = "events";

/// Preset name matched in endpoint policies.
pub const PRESET_NAME: &str = "protectEnv";
