//! Shared snapshot cache
//!
//! The poller is the only writer. Readers copy the snapshot out, so a lock is
//! never held for longer than a struct copy.

use crate::estimator::BatterySnapshot;
use serde::Serialize;
use std::sync::{PoisonError, RwLock};

/// AC adapter state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AcAdapterSnapshot {
    pub online: bool,
}

#[derive(Debug)]
pub struct SnapshotStore {
    battery: RwLock<BatterySnapshot>,
    adapter: RwLock<AcAdapterSnapshot>,
}

impl SnapshotStore {
    pub fn new(design_full_capacity: u32) -> Self {
        Self {
            battery: RwLock::new(BatterySnapshot::initial(design_full_capacity)),
            adapter: RwLock::new(AcAdapterSnapshot::default()),
        }
    }

    pub fn battery(&self) -> BatterySnapshot {
        *self.battery.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn adapter(&self) -> AcAdapterSnapshot {
        *self.adapter.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate the battery snapshot under the write lock
    pub(crate) fn update_battery<R>(&self, f: impl FnOnce(&mut BatterySnapshot) -> R) -> R {
        let mut battery = self.battery.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut battery)
    }

    pub(crate) fn set_adapter(&self, snapshot: AcAdapterSnapshot) {
        *self.adapter.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(crate::estimator::DEFAULT_DESIGN_FULL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::BatteryState;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_initial_values() {
        let store = SnapshotStore::new(3750);
        assert!(!store.adapter().online);
        assert_eq!(store.battery().state, BatteryState::Unknown);
        assert_eq!(store.battery().energy_full_milliwatthours, 37_500);
    }

    #[test]
    fn test_update_battery_returns_closure_result() {
        let store = SnapshotStore::default();
        let percent = store.update_battery(|b| {
            b.capacity_percent = 64;
            b.capacity_percent
        });
        assert_eq!(percent, 64);
        assert_eq!(store.battery().capacity_percent, 64);
    }

    #[test]
    fn test_readers_never_see_partial_update() {
        let store = Arc::new(SnapshotStore::default());

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..1000u32 {
                    store.update_battery(|b| {
                        b.voltage_millivolts = i;
                        b.current_milliamps = i;
                    });
                }
            })
        };

        for _ in 0..1000 {
            let snapshot = store.battery();
            assert_eq!(snapshot.voltage_millivolts, snapshot.current_milliamps);
        }

        writer.join().unwrap();
    }

    #[test]
    fn test_set_adapter() {
        let store = SnapshotStore::default();
        store.set_adapter(AcAdapterSnapshot { online: true });
        assert!(store.adapter().online);
    }
}
