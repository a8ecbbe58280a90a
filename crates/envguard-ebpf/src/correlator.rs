//! Namespace-to-container correlation.
//!
//! The processor only needs the lookup direction. The external container
//! monitor provides one implementation; [`ContainerRegistry`] holds the
//! bindings registered with the preset itself.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use envguard_common::error::{EnvguardError, Result};
use envguard_common::types::{ContainerBinding, ContainerId, NamespacePair, RuleSet};

/// Resolves the container a namespace pair belongs to.
pub trait ContainerCorrelator: Send + Sync {
    /// Returns the container owning `namespaces`, if any.
    fn lookup_container_id(&self, namespaces: NamespacePair) -> Option<ContainerId>;
}

/// Correlator that never matches.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCorrelator;

impl ContainerCorrelator for NullCorrelator {
    fn lookup_container_id(&self, _namespaces: NamespacePair) -> Option<ContainerId> {
        None
    }
}

/// Consults `primary` first, then `fallback`.
pub struct FallbackCorrelator {
    primary: Arc<dyn ContainerCorrelator>,
    fallback: Arc<dyn ContainerCorrelator>,
}

impl FallbackCorrelator {
    /// Chains two correlators.
    #[must_use]
    pub fn new(primary: Arc<dyn ContainerCorrelator>, fallback: Arc<dyn ContainerCorrelator>) -> Self {
        Self { primary, fallback }
    }
}

impl ContainerCorrelator for FallbackCorrelator {
    fn lookup_container_id(&self, namespaces: NamespacePair) -> Option<ContainerId> {
        self.primary
            .lookup_container_id(namespaces)
            .or_else(|| self.fallback.lookup_container_id(namespaces))
    }
}

#[derive(Debug, Default)]
struct Bindings {
    by_id: HashMap<ContainerId, ContainerBinding>,
    by_namespaces: HashMap<NamespacePair, ContainerId>,
}

/// Container bindings known to the preset.
///
/// Both lookup directions sit behind one lock so they can never disagree:
/// a namespace pair maps to at most one container at any instant.
#[derive(Debug, Default)]
pub struct ContainerRegistry {
    inner: RwLock<Bindings>,
}

impl ContainerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `id` to `namespaces` and returns the resulting binding.
    ///
    /// Re-registering an id moves it to the new pair and keeps its rules.
    ///
    /// # Errors
    ///
    /// Returns [`EnvguardError::Conflict`] if another container owns the pair.
    pub fn register(&self, id: ContainerId, namespaces: NamespacePair) -> Result<ContainerBinding> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(owner) = guard.by_namespaces.get(&namespaces) {
            if *owner != id {
                return Err(EnvguardError::Conflict {
                    namespaces,
                    owner: owner.clone(),
                });
            }
        }

        let previous = guard.by_id.get(&id).copied();
        let rules = match previous {
            Some(previous) => {
                let _ = guard.by_namespaces.remove(&previous.namespaces);
                previous.rules
            }
            None => RuleSet::empty(),
        };
        let binding = ContainerBinding { namespaces, rules };
        let _ = guard.by_namespaces.insert(namespaces, id.clone());
        let _ = guard.by_id.insert(id, binding);
        Ok(binding)
    }

    /// Removes every binding of `id` and returns it.
    pub fn unregister(&self, id: &ContainerId) -> Option<ContainerBinding> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let binding = guard.by_id.remove(id)?;
        let _ = guard.by_namespaces.remove(&binding.namespaces);
        Some(binding)
    }

    /// Replaces the rules of a registered container.
    ///
    /// # Errors
    ///
    /// Returns [`EnvguardError::NotFound`] if `id` is not registered.
    pub fn set_rules(&self, id: &ContainerId, rules: RuleSet) -> Result<ContainerBinding> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let binding = guard.by_id.get_mut(id).ok_or_else(|| EnvguardError::NotFound {
            kind: "container",
            id: id.to_string(),
        })?;
        binding.rules = rules;
        Ok(*binding)
    }

    /// Current binding of `id`.
    pub fn binding(&self, id: &ContainerId) -> Option<ContainerBinding> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .get(id)
            .copied()
    }

    /// Number of registered containers.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).by_id.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContainerCorrelator for ContainerRegistry {
    fn lookup_container_id(&self, namespaces: NamespacePair) -> Option<ContainerId> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_namespaces
            .get(&namespaces)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;

    #[test]
    fn registered_pair_resolves() {
        let registry = ContainerRegistry::new();
        let _ = registry.register("c1".into(), NamespacePair::new(100, 200)).unwrap();

        assert_eq!(
            registry.lookup_container_id(NamespacePair::new(100, 200)),
            Some(ContainerId::new("c1"))
        );
        assert_eq!(registry.lookup_container_id(NamespacePair::new(100, 999)), None);
    }

    #[test]
    fn pair_owned_by_other_container_is_a_conflict() {
        let registry = ContainerRegistry::new();
        let pair = NamespacePair::new(1, 2);
        let _ = registry.register("c1".into(), pair).unwrap();

        let err = registry.register("c2".into(), pair).unwrap_err();
        assert!(matches!(err, EnvguardError::Conflict { owner, .. } if owner.as_str() == "c1"));
        assert_eq!(registry.lookup_container_id(pair), Some(ContainerId::new("c1")));
    }

    #[test]
    fn reregistering_moves_pair_and_keeps_rules() {
        let registry = ContainerRegistry::new();
        let id = ContainerId::new("c1");
        let _ = registry.register(id.clone(), NamespacePair::new(1, 2)).unwrap();
        let _ = registry.set_rules(&id, RuleSet::BLOCK).unwrap();

        let binding = registry.register(id.clone(), NamespacePair::new(3, 4)).unwrap();
        assert_eq!(binding.rules, RuleSet::BLOCK);
        assert_eq!(registry.lookup_container_id(NamespacePair::new(1, 2)), None);
        assert_eq!(registry.lookup_container_id(NamespacePair::new(3, 4)), Some(id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_removes_both_directions() {
        let registry = ContainerRegistry::new();
        let id = ContainerId::new("c1");
        let _ = registry.register(id.clone(), NamespacePair::new(1, 2)).unwrap();

        let removed = registry.unregister(&id).unwrap();
        assert_eq!(removed.namespaces, NamespacePair::new(1, 2));
        assert!(registry.is_empty());
        assert_eq!(registry.lookup_container_id(NamespacePair::new(1, 2)), None);
        assert!(registry.unregister(&id).is_none());
    }

    #[test]
    fn set_rules_on_unknown_container_fails() {
        let registry = ContainerRegistry::new();
        let err = registry.set_rules(&"ghost".into(), RuleSet::AUDIT).unwrap_err();
        assert!(matches!(err, EnvguardError::NotFound { .. }));
    }

    #[test]
    fn fallback_consults_secondary_on_miss() {
        let registry = Arc::new(ContainerRegistry::new());
        let _ = registry.register("local".into(), NamespacePair::new(1, 1)).unwrap();
        let monitor = Arc::new(ContainerRegistry::new());
        let _ = monitor.register("remote".into(), NamespacePair::new(2, 2)).unwrap();

        let chained = FallbackCorrelator::new(registry, monitor);
        assert_eq!(chained.lookup_container_id(NamespacePair::new(1, 1)), Some("local".into()));
        assert_eq!(chained.lookup_container_id(NamespacePair::new(2, 2)), Some("remote".into()));
        assert_eq!(chained.lookup_container_id(NamespacePair::new(3, 3)), None);
    }

    #[test]
    fn concurrent_registration_never_shares_a_pair() {
        let registry = Arc::new(ContainerRegistry::new());
        let handles: Vec<_> = (0..8_u32)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for round in 0..500_u32 {
                        let id = ContainerId::new(format!("w{worker}-{}", round % 4));
                        // Workers contend on a small set of pairs.
                        let pair = NamespacePair::new(1 + round % 3, 1 + worker % 2);
                        if round % 5 == 0 {
                            let _ = registry.unregister(&id);
                        } else {
                            let _ = registry.register(id, pair);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let guard = registry.inner.read().unwrap();
        let mut seen = HashSet::new();
        for (id, binding) in &guard.by_id {
            assert!(seen.insert(binding.namespaces), "pair bound twice");
            assert_eq!(guard.by_namespaces.get(&binding.namespaces), Some(id));
        }
        assert_eq!(guard.by_id.len(), guard.by_namespaces.len());
    }
}
