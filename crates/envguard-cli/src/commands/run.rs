//! `envguard run` — Attach the hook and report alerts until interrupted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use envguard_common::config::PresetConfig;
use envguard_common::types::ContainerId;
use envguard_ebpf::alert::{Alert, ChannelAlertSink};
use envguard_ebpf::correlator::NullCorrelator;
use envguard_ebpf::pipeline::PipelineStats;
use envguard_ebpf::preset::{self, EnvPreset, SetupError};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};

use crate::output;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// JSON preset configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Compiled hook object, overriding the configuration.
    #[arg(long)]
    pub object: Option<PathBuf>,

    /// JSON list of containers to track: `[{"id", "pid_ns", "mnt_ns"}]`.
    #[arg(long)]
    pub containers: Option<PathBuf>,

    /// Capacity of the internal event queue, overriding the configuration.
    #[arg(long)]
    pub channel_capacity: Option<usize>,
}

/// A container to register at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainerEntry {
    /// Container identifier reported in alerts.
    pub id: ContainerId,
    /// PID namespace inode.
    pub pid_ns: u32,
    /// Mount namespace inode.
    pub mnt_ns: u32,
}

/// Executes the `run` command.
///
/// # Errors
///
/// Returns an error if configuration is invalid or preset setup fails.
pub fn execute(args: RunArgs) -> anyhow::Result<()> {
    let config = resolve_config(&args)?;
    let containers = match &args.containers {
        Some(path) => load_containers(path)?,
        None => Vec::new(),
    };

    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    runtime.block_on(run(config, containers))
}

fn resolve_config(args: &RunArgs) -> anyhow::Result<PresetConfig> {
    let mut config = match &args.config {
        Some(path) => PresetConfig::from_file(path)?,
        None => PresetConfig::default(),
    };
    if let Some(object) = &args.object {
        config.object_path.clone_from(object);
    }
    if let Some(capacity) = args.channel_capacity {
        config.channel_capacity = capacity;
    }
    config.validate()?;
    Ok(config)
}

fn load_containers(path: &Path) -> anyhow::Result<Vec<ContainerEntry>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

async fn run(config: PresetConfig, containers: Vec<ContainerEntry>) -> anyhow::Result<()> {
    let (sink, mut alerts) = ChannelAlertSink::new();

    let preset = match preset::register_preset(&config, Arc::new(NullCorrelator), Arc::new(sink)) {
        Ok(Some(preset)) => preset,
        Ok(None) => {
            eprintln!("  Protect env preset unavailable on this host, nothing to do.");
            return Ok(());
        }
        Err(SetupError { source, preset }) => {
            if let Err(e) = (*preset).destroy().await {
                tracing::warn!(error = %e, "cleanup after failed setup");
            }
            return Err(anyhow::Error::new(source).context("registering protect env preset"));
        }
    };

    register_all(&preset, &containers);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(true);
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    eprintln!("  Watching for environment access. Press Ctrl+C to stop...");
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            alert = alerts.recv() => match alert {
                Some(alert) => println!("{}", output::json_line(&alert)?),
                None => break,
            },
        }
    }

    let (stats, _) = shutdown(preset, alerts).await?;
    eprintln!("  Stopped: {}", output::format_stats(&stats));
    Ok(())
}

/// Tears the preset down, then prints the alerts raised while the queue
/// drained. The alert channel ends once the processor has exited.
async fn shutdown(
    preset: EnvPreset,
    mut alerts: mpsc::UnboundedReceiver<Alert>,
) -> anyhow::Result<(PipelineStats, u64)> {
    let stats = preset.destroy().await?;
    let mut printed = 0;
    while let Some(alert) = alerts.recv().await {
        println!("{}", output::json_line(&alert)?);
        printed += 1;
    }
    Ok((stats, printed))
}

fn register_all(preset: &EnvPreset, containers: &[ContainerEntry]) {
    for entry in containers {
        if let Err(e) = preset.register_container(entry.id.clone(), entry.pid_ns, entry.mnt_ns) {
            tracing::warn!(container_id = %entry.id, error = %e, "failed to register container");
        }
    }
    tracing::info!(count = preset.registry().len(), "containers registered");
}
