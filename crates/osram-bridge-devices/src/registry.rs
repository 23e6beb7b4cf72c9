//! In-memory registry of supported devices, keyed by friendly name.

use std::collections::HashMap;

use crate::descriptor::DeviceDescriptor;

/// Last-known descriptor of every supported device.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceDescriptor>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a descriptor, replacing any previous one with the same name.
    pub fn insert(&mut self, device: DeviceDescriptor) -> Option<DeviceDescriptor> {
        self.devices.insert(device.friendly_name.clone(), device)
    }

    /// Replace the whole registry with a fresh device list.
    ///
    /// Returns the names that disappeared.
    pub fn replace(&mut self, devices: impl IntoIterator<Item = DeviceDescriptor>) -> Vec<String> {
        let fresh: HashMap<String, DeviceDescriptor> = devices
            .into_iter()
            .map(|d| (d.friendly_name.clone(), d))
            .collect();

        let mut removed: Vec<String> = self
            .devices
            .keys()
            .filter(|name| !fresh.contains_key(*name))
            .cloned()
            .collect();
        removed.sort();

        self.devices = fresh;
        removed
    }

    pub fn get(&self, friendly_name: &str) -> Option<&DeviceDescriptor> {
        self.devices.get(friendly_name)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Sorted friendly names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.devices.keys().cloned().collect();
        names.sort();
        names
    }
}
