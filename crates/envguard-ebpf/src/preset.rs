//! Lifecycle of the environment-protection preset.
//!
//! Setup runs in a fixed order: loader check, memlock relaxation, container
//! table, object load, hook attach, ring buffer open, pipeline start. Teardown runs in
//! reverse through [`EnvPreset::destroy`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use envguard_common::config::PresetConfig;
use envguard_common::constants::PRESET_NAME;
use envguard_common::error::EnvguardError;
use envguard_common::types::{ContainerId, EndPoint, NamespacePair};
use thiserror::Error;

use crate::alert::AlertSink;
use crate::correlator::{ContainerCorrelator, ContainerRegistry};
use crate::error::PresetError;
use crate::hook::{self, HookAttacher, LoadedHook};
use crate::pipeline::{Pipeline, PipelineStats};
use crate::table::RuleTable;

/// Whether per-container kernel rules are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetMode {
    /// Hook attached and container table available.
    Enforcing,
    /// Container table unavailable: events are still reported, but
    /// per-container rules cannot reach the kernel.
    Degraded,
}

/// A fatal setup failure.
///
/// Carries the partially built preset; the caller is expected to
/// [`destroy`](EnvPreset::destroy) it.
#[derive(Debug, Error)]
#[error("preset setup failed: {source}")]
pub struct SetupError {
    /// What failed.
    pub source: PresetError,
    /// Whatever was set up before the failure.
    pub preset: Box<EnvPreset>,
}

impl SetupError {
    fn new(source: PresetError, preset: EnvPreset) -> Self {
        Self {
            source,
            preset: Box::new(preset),
        }
    }
}

/// Environment-protection preset: the attached hook, the container table,
/// and the running event pipeline.
pub struct EnvPreset {
    hook: Option<LoadedHook>,
    table: Mutex<Option<Box<dyn RuleTable>>>,
    registry: Arc<ContainerRegistry>,
    pipeline: Option<Pipeline>,
}

/// Sets up the preset and starts its event pipeline.
///
/// Must be called from within a tokio runtime. Returns `Ok(None)` when the
/// host cannot run BPF at all; the host process is expected to carry on
/// without the preset.
///
/// # Errors
///
/// Returns [`SetupError`] if this build has no BPF loader, the object cannot
/// be loaded, the hook cannot be attached, or the ring buffer cannot be
/// opened.
pub fn register_preset(
    config: &PresetConfig,
    monitor: Arc<dyn ContainerCorrelator>,
    sink: Arc<dyn AlertSink>,
) -> Result<Option<EnvPreset>, SetupError> {
    if let Err(e) = HookAttacher::ensure_supported() {
        tracing::error!(error = %e, "BPF LSM loader unavailable");
        return Err(SetupError::new(e, EnvPreset::from_parts(None, None)));
    }

    if let Err(e) = hook::relax_memlock() {
        tracing::error!(error = %e, "error removing rlimit");
        return Ok(None);
    }

    let mut preset = EnvPreset::from_parts(open_container_table(config), None);

    match HookAttacher::load(config) {
        Ok(hook) => preset.hook = Some(hook),
        Err(e) => {
            tracing::error!(error = %e, "error loading BPF LSM objects");
            return Err(SetupError::new(e, preset));
        }
    }

    if let Err(e) = finish_setup(&mut preset, config, monitor, sink) {
        tracing::error!(error = %e, "error starting protect env preset");
        return Err(SetupError::new(e, preset));
    }

    tracing::info!(mode = ?preset.mode(), "protect env preset registered");
    Ok(Some(preset))
}

#[cfg(all(target_os = "linux", feature = "ebpf"))]
fn open_container_table(config: &PresetConfig) -> Option<Box<dyn RuleTable>> {
    let path = config.container_map_pin();
    match crate::table::PinnedContainerMap::open(&path) {
        Ok(table) => Some(Box::new(table)),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "container map unavailable, per-container kernel rules disabled"
            );
            None
        }
    }
}

#[cfg(not(all(target_os = "linux", feature = "ebpf")))]
fn open_container_table(config: &PresetConfig) -> Option<Box<dyn RuleTable>> {
    tracing::warn!(
        path = %config.container_map_pin().display(),
        "container map unavailable in this build"
    );
    None
}

#[cfg(all(target_os = "linux", feature = "ebpf"))]
fn finish_setup(
    preset: &mut EnvPreset,
    config: &PresetConfig,
    monitor: Arc<dyn ContainerCorrelator>,
    sink: Arc<dyn AlertSink>,
) -> Result<(), PresetError> {
    let Some(hook) = preset.hook.as_mut() else {
        return Ok(());
    };
    hook.attach()?;

    let (closer, signal) = crate::source::close_signal();
    let source = hook.event_source(signal)?;

    let mut table = lock(&preset.table);
    if table.is_none() {
        if let Some(adopted) = hook.take_container_map() {
            tracing::info!("container map taken from loaded object");
            *table = Some(Box::new(adopted));
        }
    }
    drop(table);

    let registry: Arc<dyn ContainerCorrelator> = preset.registry.clone();
    let correlator = Arc::new(crate::correlator::FallbackCorrelator::new(registry, monitor));
    preset.pipeline = Some(Pipeline::start(
        source,
        closer,
        config.channel_capacity,
        correlator,
        sink,
    ));
    Ok(())
}

#[cfg(not(all(target_os = "linux", feature = "ebpf")))]
fn finish_setup(
    preset: &mut EnvPreset,
    _config: &PresetConfig,
    _monitor: Arc<dyn ContainerCorrelator>,
    _sink: Arc<dyn AlertSink>,
) -> Result<(), PresetError> {
    match preset.hook.as_ref() {
        Some(hook) => hook.unreachable(),
        None => Ok(()),
    }
}

fn lock(table: &Mutex<Option<Box<dyn RuleTable>>>) -> MutexGuard<'_, Option<Box<dyn RuleTable>>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EnvPreset {
    /// Assembles a preset from components prepared elsewhere, without a
    /// kernel hook of its own.
    #[must_use]
    pub fn from_parts(table: Option<Box<dyn RuleTable>>, pipeline: Option<Pipeline>) -> Self {
        Self {
            hook: None,
            table: Mutex::new(table),
            registry: Arc::new(ContainerRegistry::new()),
            pipeline,
        }
    }

    /// Current enforcement mode.
    pub fn mode(&self) -> PresetMode {
        if lock(&self.table).is_some() {
            PresetMode::Enforcing
        } else {
            PresetMode::Degraded
        }
    }

    /// Bindings registered with this preset.
    pub const fn registry(&self) -> &Arc<ContainerRegistry> {
        &self.registry
    }

    /// Makes `(pid_ns, mnt_ns)` resolve to `id`, in user space and, when
    /// available, in the kernel table.
    ///
    /// # Errors
    ///
    /// Returns an error if another container owns the pair or the kernel
    /// table rejects the update. In the latter case the user-space binding
    /// stays in place.
    pub fn register_container(&self, id: ContainerId, pid_ns: u32, mnt_ns: u32) -> Result<(), PresetError> {
        let namespaces = NamespacePair::new(pid_ns, mnt_ns);
        let mut table = lock(&self.table);

        let previous = self.registry.binding(&id);
        let binding = self.registry.register(id.clone(), namespaces)?;

        if let Some(table) = table.as_mut() {
            if let Some(previous) = previous.filter(|p| p.namespaces != namespaces) {
                table.remove(previous.namespaces)?;
            }
            table.upsert(namespaces, binding.rules)?;
        }

        tracing::debug!(container_id = %id, %namespaces, "container registered");
        Ok(())
    }

    /// Removes every binding of `id`. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel table rejects the removal.
    pub fn unregister_container(&self, id: &ContainerId) -> Result<(), PresetError> {
        let mut table = lock(&self.table);

        let Some(binding) = self.registry.unregister(id) else {
            tracing::debug!(container_id = %id, "unregistering unknown container");
            return Ok(());
        };
        if let Some(table) = table.as_mut() {
            table.remove(binding.namespaces)?;
        }

        tracing::debug!(container_id = %id, namespaces = %binding.namespaces, "container unregistered");
        Ok(())
    }

    /// Applies the endpoint's `protectEnv` presets to each of its registered
    /// containers.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel table rejects an update.
    pub fn update_security_policies(&self, endpoint: &EndPoint) -> Result<(), PresetError> {
        let rules = endpoint.rules_for(PRESET_NAME);
        let mut table = lock(&self.table);

        for id in &endpoint.containers {
            let binding = match self.registry.set_rules(id, rules) {
                Ok(binding) => binding,
                Err(EnvguardError::NotFound { .. }) => {
                    tracing::debug!(container_id = %id, endpoint = %endpoint.name, "skipping unregistered container");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if let Some(table) = table.as_mut() {
                table.upsert(binding.namespaces, rules)?;
            }
        }

        tracing::debug!(endpoint = %endpoint.name, rules = rules.bits(), "security policies updated");
        Ok(())
    }

    /// Tears the preset down: closes the ring buffer and waits for both
    /// workers, detaches the hook, and releases the container table.
    ///
    /// Every step runs even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the error from detaching the hook, if any.
    pub async fn destroy(mut self) -> Result<PipelineStats, PresetError> {
        let stats = match self.pipeline.take() {
            Some(pipeline) => pipeline.stop().await,
            None => PipelineStats::default(),
        };

        let detached = self.hook.take().map_or(Ok(()), |mut hook| {
            let result = hook.detach();
            drop(hook);
            result
        });
        if let Err(e) = &detached {
            tracing::warn!(error = %e, "error detaching LSM program");
        }

        drop(lock(&self.table).take());
        tracing::info!(
            forwarded = stats.consumer.forwarded,
            alerts = stats.processor.alerts,
            "protect env preset destroyed"
        );

        detached.map(|()| stats)
    }
}

impl fmt::Debug for EnvPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvPreset")
            .field("mode", &self.mode())
            .field("hook_loaded", &self.hook.is_some())
            .field("containers", &self.registry.len())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}
