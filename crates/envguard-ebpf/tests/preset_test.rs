//! Container registration and policy updates against an in-memory rule
//! table, plus teardown of a preset assembled without a kernel hook.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use envguard_common::constants::CONTAINER_MAP_CAPACITY;
use envguard_common::error::EnvguardError;
use envguard_common::types::{
    ContainerId, EndPoint, NamespacePair, PresetAction, PresetRule, RuleSet,
};
use envguard_ebpf::alert::TracingAlertSink;
use envguard_ebpf::correlator::{ContainerCorrelator, NullCorrelator};
use envguard_ebpf::error::PresetError;
use envguard_ebpf::pipeline::Pipeline;
use envguard_ebpf::preset::{EnvPreset, PresetMode};
#[cfg(not(all(target_os = "linux", feature = "ebpf")))]
use envguard_ebpf::preset::{SetupError, register_preset};
use envguard_ebpf::source::{ChannelSource, close_signal};
use envguard_ebpf::table::RuleTable;
use tokio::sync::mpsc;

type Entries = Arc<Mutex<HashMap<NamespacePair, RuleSet>>>;

/// Rule table backed by a shared map; capacity mimics the kernel limit.
struct MemoryTable {
    entries: Entries,
    capacity: usize,
}

impl RuleTable for MemoryTable {
    fn upsert(&mut self, namespaces: NamespacePair, rules: RuleSet) -> Result<(), PresetError> {
        let mut entries = self.entries.lock().unwrap();
        if !entries.contains_key(&namespaces) && entries.len() >= self.capacity {
            return Err(PresetError::Common(EnvguardError::Config {
                message: "table full".into(),
            }));
        }
        let _ = entries.insert(namespaces, rules);
        Ok(())
    }

    fn remove(&mut self, namespaces: NamespacePair) -> Result<(), PresetError> {
        let _ = self.entries.lock().unwrap().remove(&namespaces);
        Ok(())
    }
}

fn preset_with_table(capacity: usize) -> (EnvPreset, Entries) {
    let entries = Entries::default();
    let table = MemoryTable {
        entries: entries.clone(),
        capacity,
    };
    (EnvPreset::from_parts(Some(Box::new(table)), None), entries)
}

fn endpoint(containers: &[&str], action: PresetAction) -> EndPoint {
    EndPoint {
        name: "web".into(),
        containers: containers.iter().map(|c| ContainerId::new(*c)).collect(),
        presets: vec![PresetRule {
            name: "protectEnv".into(),
            action,
        }],
    }
}

#[test]
fn register_container_populates_registry_and_table() {
    let (preset, entries) = preset_with_table(CONTAINER_MAP_CAPACITY as usize);
    assert_eq!(preset.mode(), PresetMode::Enforcing);

    preset.register_container("c1".into(), 100, 200).unwrap();

    assert_eq!(
        preset.registry().lookup_container_id(NamespacePair::new(100, 200)),
        Some(ContainerId::new("c1"))
    );
    assert_eq!(
        entries.lock().unwrap().get(&NamespacePair::new(100, 200)),
        Some(&RuleSet::empty())
    );
}

#[test]
fn conflicting_registration_leaves_table_untouched() {
    let (preset, entries) = preset_with_table(CONTAINER_MAP_CAPACITY as usize);
    preset.register_container("c1".into(), 100, 200).unwrap();

    let err = preset.register_container("c2".into(), 100, 200).unwrap_err();

    assert!(matches!(err, PresetError::Common(EnvguardError::Conflict { .. })));
    assert_eq!(entries.lock().unwrap().len(), 1);
    assert!(preset.registry().binding(&"c2".into()).is_none());
}

#[test]
fn moving_container_replaces_kernel_key() {
    let (preset, entries) = preset_with_table(CONTAINER_MAP_CAPACITY as usize);
    preset.register_container("c1".into(), 1, 2).unwrap();
    preset.register_container("c1".into(), 3, 4).unwrap();

    let entries = entries.lock().unwrap();
    assert!(!entries.contains_key(&NamespacePair::new(1, 2)));
    assert!(entries.contains_key(&NamespacePair::new(3, 4)));
}

#[test]
fn unregister_container_removes_bindings() {
    let (preset, entries) = preset_with_table(CONTAINER_MAP_CAPACITY as usize);
    preset.register_container("c1".into(), 100, 200).unwrap();

    preset.unregister_container(&"c1".into()).unwrap();
    preset.unregister_container(&"never-registered".into()).unwrap();

    assert!(preset.registry().is_empty());
    assert!(entries.lock().unwrap().is_empty());
}

#[test]
fn full_table_reports_error_but_keeps_user_space_binding() {
    let (preset, _) = preset_with_table(1);
    preset.register_container("c1".into(), 1, 1).unwrap();

    assert!(preset.register_container("c2".into(), 2, 2).is_err());
    assert_eq!(
        preset.registry().lookup_container_id(NamespacePair::new(2, 2)),
        Some(ContainerId::new("c2"))
    );
}

#[test]
fn policy_update_encodes_rules_for_registered_containers() {
    let (preset, entries) = preset_with_table(CONTAINER_MAP_CAPACITY as usize);
    preset.register_container("c1".into(), 100, 200).unwrap();

    preset
        .update_security_policies(&endpoint(&["c1", "not-running"], PresetAction::Block))
        .unwrap();

    assert_eq!(
        entries.lock().unwrap().get(&NamespacePair::new(100, 200)),
        Some(&RuleSet::BLOCK)
    );
    assert_eq!(preset.registry().binding(&"c1".into()).unwrap().rules, RuleSet::BLOCK);
    assert!(preset.registry().binding(&"not-running".into()).is_none());
}

#[test]
fn policy_without_preset_clears_rules() {
    let (preset, entries) = preset_with_table(CONTAINER_MAP_CAPACITY as usize);
    preset.register_container("c1".into(), 100, 200).unwrap();
    preset
        .update_security_policies(&endpoint(&["c1"], PresetAction::Audit))
        .unwrap();

    let cleared = EndPoint {
        name: "web".into(),
        containers: vec!["c1".into()],
        presets: Vec::new(),
    };
    preset.update_security_policies(&cleared).unwrap();

    assert_eq!(
        entries.lock().unwrap().get(&NamespacePair::new(100, 200)),
        Some(&RuleSet::empty())
    );
}

#[test]
fn missing_table_is_degraded_mode() {
    let preset = EnvPreset::from_parts(None, None);
    assert_eq!(preset.mode(), PresetMode::Degraded);

    preset.register_container("c1".into(), 100, 200).unwrap();
    preset
        .update_security_policies(&endpoint(&["c1"], PresetAction::Audit))
        .unwrap();
    assert_eq!(preset.registry().binding(&"c1".into()).unwrap().rules, RuleSet::AUDIT);
}

#[tokio::test]
async fn destroy_stops_pipeline_and_releases_table() {
    let (_source_tx, source_rx) = mpsc::channel(1);
    let (closer, signal) = close_signal();
    let monitor: Arc<dyn ContainerCorrelator> = Arc::new(NullCorrelator);
    let pipeline = Pipeline::start(
        ChannelSource::new(source_rx, signal),
        closer,
        2,
        monitor,
        Arc::new(TracingAlertSink),
    );
    let entries = Entries::default();
    let table = MemoryTable {
        entries: entries.clone(),
        capacity: CONTAINER_MAP_CAPACITY as usize,
    };
    let preset = EnvPreset::from_parts(Some(Box::new(table)), Some(pipeline));
    preset.register_container("c1".into(), 100, 200).unwrap();

    let stats = tokio::time::timeout(Duration::from_secs(2), preset.destroy())
        .await
        .expect("destroy should not hang")
        .unwrap();

    assert_eq!(stats.consumer.forwarded, 0);
    // The pinned table outlives the preset; only the handle is released.
    assert_eq!(entries.lock().unwrap().len(), 1);
}

#[cfg(not(all(target_os = "linux", feature = "ebpf")))]
#[test]
fn build_without_loader_reports_unsupported_before_touching_host() {
    let config = envguard_common::config::PresetConfig::default();

    let result = register_preset(&config, Arc::new(NullCorrelator), Arc::new(TracingAlertSink));

    match result {
        Err(SetupError { source, preset }) => {
            assert!(matches!(source, PresetError::Unsupported { .. }));
            assert_eq!(preset.mode(), PresetMode::Degraded);
            assert!(preset.registry().is_empty());
        }
        Ok(_) => panic!("setup must fail without a BPF loader"),
    }
}
