// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! In-memory device registry - coordinates the hub's view of its devices

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::{Address, Device, DeviceRegistry};

/// Device registry held in memory.
///
/// Used by the binary until a driver layer feeds it, and by tests to stage
/// device populations before dispatching events.
pub struct InMemoryRegistry {
    devices: RwLock<BTreeMap<Address, Device>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_devices(devices: impl IntoIterator<Item = Device>) -> Self {
        let registry = Self::new();
        for device in devices {
            registry.add_device(device);
        }
        registry
    }

    pub fn add_device(&self, device: Device) {
        info!("Added device: {} ({:?})", device.address, device.capabilities);
        self.devices.write().insert(device.address.clone(), device);
    }

    pub fn remove_device(&self, address: &Address) -> Option<Device> {
        let removed = self.devices.write().remove(address);
        if removed.is_some() {
            info!("Removed device: {}", address);
        }
        removed
    }

    /// Update one attribute; returns false for unknown devices.
    pub fn set_attribute(&self, address: &Address, name: &str, value: &str) -> bool {
        let mut devices = self.devices.write();
        match devices.get_mut(address) {
            Some(device) => {
                debug!("{} {} = {}", address, name, value);
                device.attributes.insert(name.to_string(), value.to_string());
                true
            }
            None => false,
        }
    }

    pub fn set_online(&self, address: &Address, online: bool) -> bool {
        let mut devices = self.devices.write();
        match devices.get_mut(address) {
            Some(device) => {
                device.online = online;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, address: &Address) -> Option<Device> {
        self.devices.read().get(address).cloned()
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry for InMemoryRegistry {
    fn devices(&self) -> Vec<Device> {
        self.devices.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{attrs, Capability};

    #[test]
    fn test_registry_updates() {
        let registry = InMemoryRegistry::new();
        let addr = Address::from("DRIV:dev:door");
        registry.add_device(Device::new(addr.clone(), &[Capability::Contact]));

        assert!(registry.set_attribute(&addr, attrs::CONTACT, attrs::CONTACT_OPENED));
        assert!(registry.set_online(&addr, false));
        assert!(!registry.set_online(&Address::from("DRIV:dev:missing"), false));

        let dev = registry.get(&addr).unwrap();
        assert!(dev.is_offline());
        assert!(dev.attribute_is(attrs::CONTACT, attrs::CONTACT_OPENED));
        assert_eq!(registry.devices().len(), 1);

        registry.remove_device(&addr);
        assert!(registry.is_empty());
    }
}
