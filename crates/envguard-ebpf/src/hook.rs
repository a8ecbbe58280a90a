//! Loading and attaching the file-access LSM hook.
//!
//! The compiled object is opaque here: it must provide an LSM program,
//! a ring buffer map for events, and the container table. Which accesses
//! the program reports is decided in the kernel.

use crate::error::PresetError;

/// Lifts `RLIMIT_MEMLOCK` so BPF maps and programs can be created on
/// kernels that still charge them against locked memory.
///
/// # Errors
///
/// Returns [`PresetError::Rlimit`] if the limit cannot be raised, or
/// [`PresetError::Unsupported`] off Linux.
pub fn relax_memlock() -> Result<(), PresetError> {
    #[cfg(target_os = "linux")]
    {
        use nix::sys::resource::{RLIM_INFINITY, Resource, setrlimit};

        setrlimit(Resource::RLIMIT_MEMLOCK, RLIM_INFINITY, RLIM_INFINITY)
            .map_err(|e| PresetError::Rlimit { source: e.into() })
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(PresetError::Unsupported {
            reason: "BPF LSM hooks require Linux",
        })
    }
}

/// Loads the hook object described by a preset configuration.
#[derive(Debug, Clone, Copy)]
pub struct HookAttacher;

#[cfg(all(target_os = "linux", feature = "ebpf"))]
pub use attached::LoadedHook;

#[cfg(all(target_os = "linux", feature = "ebpf"))]
mod attached {
    use aya::maps::RingBuf;
    use aya::programs::Lsm;
    use aya::programs::lsm::LsmLinkId;
    use aya::{Btf, Ebpf, EbpfLoader};
    use envguard_common::config::PresetConfig;

    use super::HookAttacher;
    use crate::error::PresetError;
    use crate::source::{CloseSignal, RingBufSource};
    use crate::table::PinnedContainerMap;

    impl HookAttacher {
        /// This build carries the BPF loader.
        ///
        /// # Errors
        ///
        /// Never fails here.
        pub const fn ensure_supported() -> Result<(), PresetError> {
            Ok(())
        }

        /// Loads the object at `config.object_path`, pinning by-name maps
        /// under `config.pin_dir`.
        ///
        /// # Errors
        ///
        /// Returns [`PresetError::Load`] if the object cannot be read or
        /// rejected by the kernel.
        pub fn load(config: &PresetConfig) -> Result<LoadedHook, PresetError> {
            tracing::debug!(object = %config.object_path.display(), "loading BPF object");
            let ebpf = EbpfLoader::new()
                .map_pin_path(&config.pin_dir)
                .load_file(&config.object_path)?;

            Ok(LoadedHook {
                ebpf,
                config: config.clone(),
                link: None,
            })
        }
    }

    /// A loaded hook object and, once attached, its LSM link.
    pub struct LoadedHook {
        ebpf: Ebpf,
        config: PresetConfig,
        link: Option<LsmLinkId>,
    }

    impl LoadedHook {
        fn program(&mut self) -> Result<&mut Lsm, PresetError> {
            let name = &self.config.program;
            let program = self
                .ebpf
                .program_mut(name)
                .ok_or_else(|| PresetError::MissingObject {
                    kind: "program",
                    name: name.clone(),
                })?;
            Ok(program.try_into()?)
        }

        /// Verifies the program against kernel BTF and attaches it to the
        /// configured LSM hook.
        ///
        /// # Errors
        ///
        /// Returns an error if BTF is unavailable or the kernel refuses the
        /// program or the attachment.
        pub fn attach(&mut self) -> Result<(), PresetError> {
            let btf = Btf::from_sys_fs()?;
            let hook = self.config.lsm_hook.clone();
            let program = self.program()?;
            program.load(&hook, &btf)?;
            let link = program.attach()?;
            self.link = Some(link);
            tracing::info!(
                program = %self.config.program,
                hook = %hook,
                "LSM program attached"
            );
            Ok(())
        }

        /// Opens the event ring buffer as a pipeline source.
        ///
        /// # Errors
        ///
        /// Returns an error if the map is missing or is not a ring buffer.
        pub fn event_source(&mut self, close: CloseSignal) -> Result<RingBufSource, PresetError> {
            let name = &self.config.events_map;
            let map = self
                .ebpf
                .take_map(name)
                .ok_or_else(|| PresetError::MissingObject {
                    kind: "map",
                    name: name.clone(),
                })?;
            RingBufSource::new(RingBuf::try_from(map)?, close)
        }

        /// Takes the container table out of the object, pinning it if the
        /// loader did not already.
        pub fn take_container_map(&mut self) -> Option<PinnedContainerMap> {
            let map = self.ebpf.take_map(&self.config.container_map)?;
            let pin = self.config.container_map_pin();
            if !pin.exists() {
                if let Err(e) = map.pin(&pin) {
                    tracing::warn!(path = %pin.display(), error = %e, "failed to pin container map");
                }
            }
            match PinnedContainerMap::from_map(map) {
                Ok(table) => Some(table),
                Err(e) => {
                    tracing::warn!(error = %e, "container map in object has unexpected layout");
                    None
                }
            }
        }

        /// Detaches the LSM link if attached.
        ///
        /// # Errors
        ///
        /// Returns an error if the kernel refuses the detach.
        pub fn detach(&mut self) -> Result<(), PresetError> {
            if let Some(link) = self.link.take() {
                self.program()?.detach(link)?;
                tracing::info!(program = %self.config.program, "LSM program detached");
            }
            Ok(())
        }
    }
}

#[cfg(not(all(target_os = "linux", feature = "ebpf")))]
pub use unsupported::LoadedHook;

#[cfg(not(all(target_os = "linux", feature = "ebpf")))]
mod unsupported {
    use std::convert::Infallible;

    use envguard_common::config::PresetConfig;

    use super::HookAttacher;
    use crate::error::PresetError;

    impl HookAttacher {
        /// Fails before anything touches the host: this build carries no
        /// BPF loader.
        ///
        /// # Errors
        ///
        /// Returns [`PresetError::Unsupported`].
        pub const fn ensure_supported() -> Result<(), PresetError> {
            Err(PresetError::Unsupported {
                reason: "built without the `ebpf` feature",
            })
        }

        /// Always fails: this build carries no BPF loader.
        ///
        /// # Errors
        ///
        /// Returns [`PresetError::Unsupported`].
        pub fn load(config: &PresetConfig) -> Result<LoadedHook, PresetError> {
            tracing::debug!(object = %config.object_path.display(), "BPF loader not compiled in");
            Err(PresetError::Unsupported {
                reason: "built without the `ebpf` feature",
            })
        }
    }

    /// Placeholder for builds without BPF support; never constructed.
    pub struct LoadedHook {
        never: Infallible,
    }

    impl LoadedHook {
        pub(crate) fn unreachable(&self) -> ! {
            match self.never {}
        }

        /// Unreachable in this build.
        ///
        /// # Errors
        ///
        /// Never returns.
        pub fn detach(&mut self) -> Result<(), PresetError> {
            match self.never {}
        }
    }
}
