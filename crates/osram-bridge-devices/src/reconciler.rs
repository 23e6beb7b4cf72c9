//! Accessory reconciliation.
//!
//! Keeps the bridge's accessory list in step with the host: cached
//! accessories are adopted at startup, and every supported device seen on
//! the bus is matched to exactly one accessory by its derived identifier.

use tracing::{error, info, warn};
use uuid::Uuid;

use osram_bridge_core::{BridgeEvent, EventBus, Result};

use crate::accessory::{accessory_uuid, AccessoryRecord};
use crate::descriptor::DeviceDescriptor;
use crate::host::AccessoryHost;

/// Result of reconciling one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// A new accessory was created and registered.
    Created(Uuid),
    /// An existing accessory got a fresh descriptor.
    Updated(Uuid),
}

impl Reconciliation {
    pub fn accessory_id(&self) -> Uuid {
        match self {
            Self::Created(id) | Self::Updated(id) => *id,
        }
    }
}

/// Owns the known accessories and the host they are published to.
pub struct AccessoryReconciler<H> {
    host: H,
    accessories: Vec<AccessoryRecord>,
    bus: EventBus,
}

impl<H: AccessoryHost> AccessoryReconciler<H> {
    pub fn new(host: H, bus: EventBus) -> Self {
        Self {
            host,
            accessories: Vec::new(),
            bus,
        }
    }

    /// Adopt every accessory the host cached. Returns how many were adopted.
    pub fn restore_cached(&mut self) -> Result<usize> {
        let cached = self.host.cached_accessories()?;
        let mut adopted = 0;
        for record in cached {
            if self.adopt(record) {
                adopted += 1;
            }
        }
        Ok(adopted)
    }

    /// Adopt one cached accessory. It is not configured until its device
    /// shows up in a device list.
    pub fn adopt(&mut self, record: AccessoryRecord) -> bool {
        if self.index_of(&record.uuid).is_some() {
            warn!("Ignoring duplicate cached accessory {}", record.uuid);
            return false;
        }
        info!("Loading accessory from cache: {}", record.display_name);
        self.bus.publish(BridgeEvent::AccessoryRestored {
            accessory_id: record.uuid,
            name: record.display_name.clone(),
        });
        self.accessories.push(record);
        true
    }

    /// Match a supported device to its accessory, creating one if needed.
    ///
    /// Host failures are logged; the in-memory accessory is kept either way.
    pub fn reconcile(&mut self, device: &DeviceDescriptor) -> Reconciliation {
        let uuid = accessory_uuid(&device.ieee_address);

        if let Some(index) = self.index_of(&uuid) {
            let record = &mut self.accessories[index];
            info!("Updating existing accessory: {}", record.display_name);
            record.context = Some(device.clone());
            record.configure();

            if let Err(e) = self.host.update_accessory(record) {
                error!("Failed to update accessory {}: {}", record.display_name, e);
            }
            self.bus.publish(BridgeEvent::AccessoryUpdated {
                accessory_id: uuid,
                name: record.display_name.clone(),
                device: device.friendly_name.clone(),
            });
            return Reconciliation::Updated(uuid);
        }

        info!("Adding new accessory: {}", device.friendly_name);
        let mut record = AccessoryRecord::new(device);
        record.configure();

        if let Err(e) = self.host.register_accessory(&record) {
            error!("Failed to register accessory {}: {}", record.display_name, e);
        }
        self.bus.publish(BridgeEvent::AccessoryRegistered {
            accessory_id: uuid,
            name: record.display_name.clone(),
            device: device.friendly_name.clone(),
        });
        self.accessories.push(record);
        Reconciliation::Created(uuid)
    }

    /// Push the current state of an accessory to the host.
    pub fn persist(&mut self, uuid: &Uuid) {
        let Some(index) = self.index_of(uuid) else {
            return;
        };
        let record = &self.accessories[index];
        if let Err(e) = self.host.update_accessory(record) {
            error!("Failed to update accessory {}: {}", record.display_name, e);
        }
    }

    pub fn accessory(&self, uuid: &Uuid) -> Option<&AccessoryRecord> {
        self.accessories.iter().find(|a| a.uuid == *uuid)
    }

    pub fn accessory_mut(&mut self, uuid: &Uuid) -> Option<&mut AccessoryRecord> {
        self.accessories.iter_mut().find(|a| a.uuid == *uuid)
    }

    pub fn accessories(&self) -> &[AccessoryRecord] {
        &self.accessories
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn index_of(&self, uuid: &Uuid) -> Option<usize> {
        self.accessories.iter().position(|a| a.uuid == *uuid)
    }
}
