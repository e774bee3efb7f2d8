//! Virtual device ↔ external instance assignment
//!
//! The game numbers joystick-like devices itself (`js1`, `js2`, …) in its
//! own enumeration order, which need not match our virtual device ids.
//! [`DeviceOrderMapper`] keeps that correspondence as a bijection: no
//! instance number is ever held by two virtual devices.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::device::{DeviceDescriptor, DeviceEnumerator};
use crate::error::DeviceError;

/// How [`DeviceOrderMapper::auto_detect`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoDetectOutcome {
    /// Enumeration succeeded; `matched` slots were found in it
    Applied { matched: usize },
    /// Enumeration failed; every slot was reset to its own number
    IdentityFallback,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceOrderMapper {
    /// virtual device id → external instance
    forward: BTreeMap<u32, u32>,
    /// external instance → virtual device id
    reverse: BTreeMap<u32, u32>,
}

impl DeviceOrderMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot N ↔ instance N for every given slot
    pub fn identity(slots: &[u32]) -> Self {
        let mut mapper = Self::new();
        mapper.reset_identity(slots);
        mapper
    }

    pub fn reset_identity(&mut self, slots: &[u32]) {
        self.forward.clear();
        self.reverse.clear();
        for &slot in slots {
            self.forward.insert(slot, slot);
            self.reverse.insert(slot, slot);
        }
    }

    pub fn instance_of(&self, virtual_id: u32) -> Option<u32> {
        self.forward.get(&virtual_id).copied()
    }

    pub fn virtual_of(&self, instance: u32) -> Option<u32> {
        self.reverse.get(&instance).copied()
    }

    /// (virtual id, instance) pairs ordered by virtual id
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.forward.iter().map(|(v, i)| (*v, *i))
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Give `target_instance` to `new_virtual`.
    ///
    /// Whoever held `target_instance` before takes over the instance
    /// `new_virtual` is giving up (a swap). If `new_virtual` held nothing,
    /// the previous holder ends up unassigned.
    pub fn assign_slot(&mut self, target_instance: u32, new_virtual: u32) {
        let prev = self.reverse.get(&target_instance).copied();
        if prev == Some(new_virtual) {
            return;
        }
        let displaced = self.forward.remove(&new_virtual);
        if let Some(displaced) = displaced {
            self.reverse.remove(&displaced);
        }
        if let Some(prev) = prev {
            self.forward.remove(&prev);
        }

        self.forward.insert(new_virtual, target_instance);
        self.reverse.insert(target_instance, new_virtual);

        if let (Some(prev), Some(displaced)) = (prev, displaced) {
            self.forward.insert(prev, displaced);
            self.reverse.insert(displaced, prev);
        }
        debug!(
            "Instance {} -> vjoy{} (vjoy{:?} now {:?})",
            target_instance, new_virtual, prev, displaced
        );
    }

    /// Rebuild the mapping from the game-visible device order.
    ///
    /// A virtual device's instance is its 1-based position in the
    /// enumeration. Slots missing from the enumeration keep their current
    /// assignment. Enumeration failures are logged and fall back to
    /// identity; they never reach the caller.
    pub fn auto_detect(&mut self, enumerator: &dyn DeviceEnumerator, slots: &[u32]) -> AutoDetectOutcome {
        self.apply_enumeration(enumerator.enumerate(), slots)
    }

    /// [`auto_detect`](Self::auto_detect) for an enumeration the caller
    /// already ran
    pub fn apply_enumeration(
        &mut self,
        enumeration: Result<Vec<DeviceDescriptor>, DeviceError>,
        slots: &[u32],
    ) -> AutoDetectOutcome {
        match enumeration {
            Ok(devices) => {
                let order = detect_order(&devices, slots);
                for &(virtual_id, instance) in &order {
                    self.assign_slot(instance, virtual_id);
                }
                info!("Device order detected for {}/{} virtual devices", order.len(), slots.len());
                AutoDetectOutcome::Applied { matched: order.len() }
            }
            Err(e) => {
                warn!("Device order detection failed, using identity mapping: {}", e);
                self.reset_identity(slots);
                AutoDetectOutcome::IdentityFallback
            }
        }
    }

    /// True if forward and reverse maps agree and no instance is shared
    pub fn is_consistent(&self) -> bool {
        self.forward.len() == self.reverse.len()
            && self
                .forward
                .iter()
                .all(|(v, i)| self.reverse.get(i) == Some(v))
    }
}

/// (virtual id, instance) for every slot present in `devices`
pub fn detect_order(devices: &[DeviceDescriptor], slots: &[u32]) -> Vec<(u32, u32)> {
    devices
        .iter()
        .enumerate()
        .filter_map(|(position, device)| {
            let slot = device.virtual_slot?;
            slots.contains(&slot).then_some((slot, position as u32 + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::DeviceId;

    struct FixedOrder(Vec<DeviceDescriptor>);

    impl DeviceEnumerator for FixedOrder {
        fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, DeviceError> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl DeviceEnumerator for Broken {
        fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, DeviceError> {
            Err(DeviceError::Enumeration("no backend".into()))
        }
    }

    fn descriptor(name: &str, virtual_slot: Option<u32>) -> DeviceDescriptor {
        DeviceDescriptor { id: DeviceId::new(name), name: name.to_string(), virtual_slot }
    }

    #[test]
    fn test_assign_swaps() {
        let mut mapper = DeviceOrderMapper::identity(&[1, 2]);
        mapper.assign_slot(2, 1);
        assert_eq!(mapper.instance_of(1), Some(2));
        assert_eq!(mapper.instance_of(2), Some(1));
        assert!(mapper.is_consistent());
    }

    #[test]
    fn test_assign_same_is_noop() {
        let mut mapper = DeviceOrderMapper::identity(&[1, 2]);
        mapper.assign_slot(1, 1);
        assert_eq!(mapper, DeviceOrderMapper::identity(&[1, 2]));
    }

    #[test]
    fn test_assign_unheld_instance() {
        let mut mapper = DeviceOrderMapper::identity(&[1, 2]);
        mapper.assign_slot(5, 2);
        assert_eq!(mapper.instance_of(2), Some(5));
        assert_eq!(mapper.virtual_of(2), None);
        assert_eq!(mapper.instance_of(1), Some(1));
        assert!(mapper.is_consistent());
    }

    #[test]
    fn test_assign_from_unassigned_device() {
        let mut mapper = DeviceOrderMapper::identity(&[1, 2]);
        mapper.assign_slot(1, 3);
        assert_eq!(mapper.instance_of(3), Some(1));
        // Previous holder had nothing to swap with
        assert_eq!(mapper.instance_of(1), None);
        assert!(mapper.is_consistent());
    }

    #[test]
    fn test_auto_detect_positional() {
        // A physical stick enumerates first, so vjoy2 is js2 and vjoy1 is js3
        let order = FixedOrder(vec![
            descriptor("stick", None),
            descriptor("vjoy-b", Some(2)),
            descriptor("vjoy-a", Some(1)),
        ]);
        let mut mapper = DeviceOrderMapper::identity(&[1, 2]);
        assert_eq!(mapper.auto_detect(&order, &[1, 2]), AutoDetectOutcome::Applied { matched: 2 });
        assert_eq!(mapper.instance_of(1), Some(3));
        assert_eq!(mapper.instance_of(2), Some(2));
        assert!(mapper.is_consistent());
    }

    #[test]
    fn test_auto_detect_ignores_unlisted_slots() {
        let order = FixedOrder(vec![descriptor("vjoy-c", Some(3))]);
        assert!(detect_order(&order.0, &[1, 2]).is_empty());
    }

    #[test]
    fn test_auto_detect_fallback() {
        let mut mapper = DeviceOrderMapper::identity(&[1, 2]);
        mapper.assign_slot(2, 1);
        assert_eq!(mapper.auto_detect(&Broken, &[1, 2]), AutoDetectOutcome::IdentityFallback);
        assert_eq!(mapper, DeviceOrderMapper::identity(&[1, 2]));
    }
}
