//! Global forge reservation table: the single mutual-exclusion point in
//! the system. A forge maps to at most one crafter at any instant.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use contracts::{CreatureId, ForgeId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForgeError {
    /// The forge is reserved by a different crafter. Non-fatal: callers
    /// defer and retry, they never abort on contention.
    ResourceBusy {
        forge: ForgeId,
        held_by: CreatureId,
    },
}

impl fmt::Display for ForgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceBusy { forge, held_by } => {
                write!(f, "forge {forge} is in use by crafter {held_by}")
            }
        }
    }
}

impl std::error::Error for ForgeError {}

/// Ruling for an external actor trying to open an assigned forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessRuling {
    /// Not reserved; nothing to say.
    Unassigned,
    /// Reserved, but the actor is privileged: warn and allow.
    WarnAssigned { held_by: CreatureId },
    /// Reserved and the actor is ordinary: block.
    Blocked { held_by: CreatureId },
}

/// Exclusive-lock map from forge identity to the crafter using it.
///
/// `acquire`/`release` are atomic with respect to concurrent attempts:
/// both take the one internal lock for the duration of the map update and
/// nothing else. Acquire is try-only; there is no blocking wait.
#[derive(Debug, Default)]
pub struct ForgeRegistry {
    assignments: Mutex<BTreeMap<ForgeId, CreatureId>>,
}

impl ForgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `forge → crafter`. Succeeds if unmapped or already mapped to
    /// the same crafter; fails with `ResourceBusy` otherwise.
    pub fn acquire(&self, forge: ForgeId, crafter: CreatureId) -> Result<(), ForgeError> {
        let mut assignments = self.lock();
        match assignments.get(&forge) {
            Some(&holder) if holder != crafter => Err(ForgeError::ResourceBusy {
                forge,
                held_by: holder,
            }),
            _ => {
                assignments.insert(forge, crafter);
                Ok(())
            }
        }
    }

    /// Remove the mapping, only if `crafter` holds it. Returns whether a
    /// mapping was removed; releasing someone else's hold is a no-op.
    pub fn release(&self, forge: ForgeId, crafter: CreatureId) -> bool {
        let mut assignments = self.lock();
        if assignments.get(&forge) == Some(&crafter) {
            assignments.remove(&forge);
            true
        } else {
            false
        }
    }

    /// Drop every reservation held by `crafter` (worker destruction).
    pub fn release_all(&self, crafter: CreatureId) {
        self.lock().retain(|_, holder| *holder != crafter);
    }

    pub fn holder(&self, forge: ForgeId) -> Option<CreatureId> {
        self.lock().get(&forge).copied()
    }

    pub fn is_assigned(&self, forge: ForgeId) -> bool {
        self.lock().contains_key(&forge)
    }

    /// Ruling for an external actor with the given power level. The
    /// privilege threshold is configuration, not a core invariant.
    pub fn ruling(&self, forge: ForgeId, actor_power: u8, override_power: u8) -> AccessRuling {
        match self.holder(forge) {
            None => AccessRuling::Unassigned,
            Some(held_by) if actor_power >= override_power => {
                AccessRuling::WarnAssigned { held_by }
            }
            Some(held_by) => AccessRuling::Blocked { held_by },
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ForgeId, CreatureId>> {
        self.assignments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_crafter_is_rejected_until_release() {
        let registry = ForgeRegistry::new();
        registry.acquire(7, 100).expect("first acquire");
        let err = registry.acquire(7, 200).unwrap_err();
        assert_eq!(
            err,
            ForgeError::ResourceBusy {
                forge: 7,
                held_by: 100
            }
        );

        assert!(registry.release(7, 100));
        registry.acquire(7, 200).expect("acquire after release");
    }

    #[test]
    fn acquire_is_idempotent_for_the_holder() {
        let registry = ForgeRegistry::new();
        registry.acquire(7, 100).expect("first");
        registry.acquire(7, 100).expect("repeat");
        assert_eq!(registry.holder(7), Some(100));
    }

    #[test]
    fn release_by_non_holder_is_a_no_op() {
        let registry = ForgeRegistry::new();
        registry.acquire(7, 100).expect("acquire");
        assert!(!registry.release(7, 200));
        assert_eq!(registry.holder(7), Some(100));
    }

    #[test]
    fn release_all_clears_only_that_crafter() {
        let registry = ForgeRegistry::new();
        registry.acquire(1, 100).expect("one");
        registry.acquire(2, 100).expect("two");
        registry.acquire(3, 200).expect("other");

        registry.release_all(100);
        assert!(!registry.is_assigned(1));
        assert!(!registry.is_assigned(2));
        assert_eq!(registry.holder(3), Some(200));
    }

    #[test]
    fn ruling_distinguishes_privileged_actors() {
        let registry = ForgeRegistry::new();
        assert_eq!(registry.ruling(7, 0, 2), AccessRuling::Unassigned);

        registry.acquire(7, 100).expect("acquire");
        assert_eq!(
            registry.ruling(7, 1, 2),
            AccessRuling::Blocked { held_by: 100 }
        );
        assert_eq!(
            registry.ruling(7, 2, 2),
            AccessRuling::WarnAssigned { held_by: 100 }
        );
    }

    #[test]
    fn concurrent_acquire_admits_exactly_one() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(ForgeRegistry::new());
        let mut handles = Vec::new();
        for crafter in 1..=8u64 {
            let registry = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                registry.acquire(42, crafter).is_ok()
            }));
        }
        let granted = handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(false))
            .filter(|granted| *granted)
            .count();
        assert_eq!(granted, 1);
        assert!(registry.is_assigned(42));
    }
}
