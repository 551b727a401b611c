// Copyright 2026 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    device::Device,
    hid::{HidDevice, HidEvent},
};

/// Result of bringing the registry in line with the service's device list.
#[derive(Debug, Default)]
pub struct Reconciled {
    /// Wrappers that were dropped, with the event each raised.
    pub destroyed: Vec<(String, HidEvent)>,
    /// Identifiers of the wrappers that were created.
    pub added: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Registry {
    devices: FxHashMap<String, HidDevice>,
    next_serial: u64,
}

impl Registry {
    pub fn reconcile(&mut self, current: Vec<Device>) -> Reconciled {
        let mut reconciled = Reconciled::default();
        let live: FxHashSet<&str> = current.iter().map(Device::id).collect();

        let stale: Vec<String> = self
            .devices
            .keys()
            .filter(|id| !live.contains(id.as_str()))
            .cloned()
            .collect();
        for id in stale {
            if let Some(hid) = self.devices.remove(&id) {
                tracing::debug!(device = %id, "device removed");
                reconciled.destroyed.push((id, hid.destroy()));
            }
        }

        for device in current {
            if self.devices.contains_key(device.id()) {
                continue;
            }
            self.next_serial += 1;
            let id = device.id().to_string();
            tracing::debug!(device = %id, model = ?device.model, "device added");
            self.devices
                .insert(id.clone(), HidDevice::new(device, self.next_serial));
            reconciled.added.push(id);
        }

        reconciled
    }

    /// Stores a fresh snapshot for a known device. Unknown devices are ignored
    /// until the next reconciliation picks them up.
    pub fn update_device(&mut self, device: Device) -> bool {
        match self.devices.get_mut(device.id()) {
            Some(hid) => {
                hid.set_device(device);
                true
            }
            None => false,
        }
    }

    pub fn destroy_all(&mut self) -> Vec<(String, HidEvent)> {
        self.devices
            .drain()
            .map(|(id, hid)| (id, hid.destroy()))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&HidDevice> {
        self.devices.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut HidDevice> {
        self.devices.get_mut(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HidDevice> {
        self.devices.values()
    }

    pub fn any_visible(&self) -> bool {
        self.devices.values().any(HidDevice::is_visible)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::tests::mouse;

    fn ids(registry: &Registry) -> Vec<&str> {
        let mut ids: Vec<&str> = registry.ids().collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn identifier_set_matches_last_list() {
        let mut registry = Registry::default();

        registry.reconcile(vec![mouse("/a", 10.0), mouse("/b", 20.0)]);
        assert_eq!(ids(&registry), ["/a", "/b"]);

        let reconciled = registry.reconcile(vec![mouse("/b", 20.0), mouse("/c", 30.0)]);
        assert_eq!(ids(&registry), ["/b", "/c"]);
        assert_eq!(
            reconciled.destroyed,
            vec![("/a".to_string(), HidEvent::Destroy)]
        );
        assert_eq!(reconciled.added, vec!["/c".to_string()]);

        registry.reconcile(Vec::new());
        assert!(registry.is_empty());
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut registry = Registry::default();
        let devices = vec![mouse("/a", 10.0), mouse("/b", 20.0)];

        let first = registry.reconcile(devices.clone());
        assert_eq!(first.added.len(), 2);

        let second = registry.reconcile(devices);
        assert!(second.added.is_empty());
        assert!(second.destroyed.is_empty());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn reappearing_device_gets_a_new_wrapper() {
        let mut registry = Registry::default();
        registry.reconcile(vec![mouse("/a", 10.0)]);
        let first = registry.get("/a").map(HidDevice::serial);

        registry.reconcile(Vec::new());
        registry.reconcile(vec![mouse("/a", 10.0)]);
        let second = registry.get("/a").map(HidDevice::serial);

        assert!(first.is_some() && second.is_some());
        assert_ne!(first, second);
    }

    #[test]
    fn updates_for_unknown_devices_are_dropped() {
        let mut registry = Registry::default();
        registry.reconcile(vec![mouse("/a", 10.0)]);

        assert!(registry.update_device(mouse("/a", 90.0)));
        assert_eq!(
            registry.get("/a").and_then(|hid| hid.device().percentage),
            Some(90.0)
        );
        assert!(!registry.update_device(mouse("/z", 90.0)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn destroy_all_empties_the_registry() {
        let mut registry = Registry::default();
        registry.reconcile(vec![mouse("/a", 10.0), mouse("/b", 20.0)]);

        let destroyed = registry.destroy_all();
        assert_eq!(destroyed.len(), 2);
        assert!(destroyed.iter().all(|(_, e)| *e == HidEvent::Destroy));
        assert!(registry.is_empty());
        assert!(!registry.any_visible());
    }
}
