//! Accessory model for one OSRAM remote.
//!
//! An accessory is what the bridge publishes to the host: an information
//! block, three stateless programmable switches and one battery service.
//! Records are cached by the host between runs, so [`AccessoryRecord::configure`]
//! has to bring any earlier shape back to the canonical one without
//! duplicating services.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use osram_bridge_core::{ProgrammableSwitchEvent, StatusLowBattery};

use crate::descriptor::DeviceDescriptor;

/// Namespace for accessory identifiers derived from hardware addresses.
pub const ACCESSORY_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93b5_4d07_8e21_5a0c_7b3d_e914);

pub const MANUFACTURER: &str = "OSRAM";

/// Model shown when the device does not report one.
pub const DEFAULT_MODEL: &str = "Smart+ Mini";

/// Canonical button service names, by button index.
pub const BUTTON_NAMES: [&str; 3] = ["Up Button", "Down Button", "Circle Button"];

pub const BATTERY_SERVICE_NAME: &str = "Battery";

/// Deterministic accessory identifier for a hardware address.
pub fn accessory_uuid(ieee_address: &str) -> Uuid {
    Uuid::new_v5(&ACCESSORY_NAMESPACE, ieee_address.as_bytes())
}

/// Subtype string of a button service.
pub fn button_subtype(index: usize) -> String {
    format!("button{}", index)
}

/// Accessory information block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AccessoryInformation {
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
}

/// Stateless programmable switch service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonService {
    pub subtype: String,
    pub name: String,
    #[serde(default)]
    pub valid_values: Vec<ProgrammableSwitchEvent>,
    /// Last event pushed to the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event: Option<ProgrammableSwitchEvent>,
}

/// Battery service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryService {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(default)]
    pub status: StatusLowBattery,
}

/// A service attached to an accessory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessoryService {
    Button(ButtonService),
    Battery(BatteryService),
    /// Grouping label written by older releases, removed on configure.
    ServiceLabel,
}

/// What [`AccessoryRecord::configure`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceChanges {
    pub added: usize,
    pub removed: usize,
    pub renamed: usize,
}

impl ServiceChanges {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.renamed == 0
    }
}

/// Accessory as stored by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessoryRecord {
    pub uuid: Uuid,
    pub display_name: String,
    /// Descriptor of the device backing this accessory
    #[serde(default)]
    pub context: Option<DeviceDescriptor>,
    #[serde(default)]
    pub information: AccessoryInformation,
    #[serde(default)]
    pub services: Vec<AccessoryService>,
}

impl AccessoryRecord {
    /// Bare record for a device. Call [`configure`](Self::configure) before use.
    pub fn new(device: &DeviceDescriptor) -> Self {
        Self {
            uuid: accessory_uuid(&device.ieee_address),
            display_name: device.friendly_name.clone(),
            context: Some(device.clone()),
            information: AccessoryInformation::default(),
            services: Vec::new(),
        }
    }

    /// Friendly name of the backing device, or the display name.
    pub fn device_name(&self) -> &str {
        self.context
            .as_ref()
            .map(|d| d.friendly_name.as_str())
            .unwrap_or(&self.display_name)
    }

    /// Bring the record to its canonical shape.
    ///
    /// Removes legacy label services, buttons with unknown subtypes and
    /// duplicates, renames kept buttons, then adds whatever is missing. Running it twice in a
    /// row changes nothing the second time.
    pub fn configure(&mut self) -> ServiceChanges {
        let mut changes = ServiceChanges::default();

        self.information = AccessoryInformation {
            manufacturer: MANUFACTURER.to_string(),
            model: self
                .context
                .as_ref()
                .and_then(|d| d.resolved_model())
                .unwrap_or(DEFAULT_MODEL)
                .to_string(),
            serial_number: self
                .context
                .as_ref()
                .map(|d| d.ieee_address.clone())
                .unwrap_or_else(|| self.information.serial_number.clone()),
        };

        let display_name = &self.display_name;
        let mut seen_subtypes = HashSet::new();
        let mut seen_battery = false;
        let before = self.services.len();
        self.services.retain(|service| match service {
            AccessoryService::ServiceLabel => {
                info!("Removing legacy service label from {}", display_name);
                false
            }
            AccessoryService::Button(button) => {
                if !is_canonical_subtype(&button.subtype) {
                    info!("Removing stale button service '{}' from {}", button.name, display_name);
                    false
                } else {
                    // Second service with the same subtype is a duplicate
                    seen_subtypes.insert(button.subtype.clone())
                }
            }
            AccessoryService::Battery(_) => !std::mem::replace(&mut seen_battery, true),
        });
        changes.removed = before - self.services.len();

        for (index, name) in BUTTON_NAMES.iter().enumerate() {
            let subtype = button_subtype(index);
            match self.button_by_subtype_mut(&subtype) {
                Some(button) => {
                    if button.name != *name {
                        button.name = name.to_string();
                        changes.renamed += 1;
                    }
                    button.valid_values = ProgrammableSwitchEvent::BUTTON_VALID_VALUES.to_vec();
                }
                None => {
                    self.services.push(AccessoryService::Button(ButtonService {
                        subtype,
                        name: name.to_string(),
                        valid_values: ProgrammableSwitchEvent::BUTTON_VALID_VALUES.to_vec(),
                        last_event: None,
                    }));
                    changes.added += 1;
                }
            }
        }

        if self.battery().is_none() {
            self.services.push(AccessoryService::Battery(BatteryService {
                name: BATTERY_SERVICE_NAME.to_string(),
                level: None,
                status: StatusLowBattery::Normal,
            }));
            changes.added += 1;
        }

        if !changes.is_empty() {
            info!(
                "Configured {}: {} added, {} removed, {} renamed",
                self.display_name, changes.added, changes.removed, changes.renamed
            );
        }
        changes
    }

    /// Button service by index (0, 1 or 2).
    pub fn button(&self, index: usize) -> Option<&ButtonService> {
        let subtype = button_subtype(index);
        self.services.iter().find_map(|service| match service {
            AccessoryService::Button(button) if button.subtype == subtype => Some(button),
            _ => None,
        })
    }

    fn button_by_subtype_mut(&mut self, subtype: &str) -> Option<&mut ButtonService> {
        self.services.iter_mut().find_map(|service| match service {
            AccessoryService::Button(button) if button.subtype == subtype => Some(button),
            _ => None,
        })
    }

    pub fn buttons(&self) -> impl Iterator<Item = &ButtonService> {
        self.services.iter().filter_map(|service| match service {
            AccessoryService::Button(button) => Some(button),
            _ => None,
        })
    }

    pub fn battery(&self) -> Option<&BatteryService> {
        self.services.iter().find_map(|service| match service {
            AccessoryService::Battery(battery) => Some(battery),
            _ => None,
        })
    }

    fn battery_mut(&mut self) -> Option<&mut BatteryService> {
        self.services.iter_mut().find_map(|service| match service {
            AccessoryService::Battery(battery) => Some(battery),
            _ => None,
        })
    }

    /// Push a switch event to a button. Returns false if the button does not exist.
    pub fn set_button_event(&mut self, index: usize, event: ProgrammableSwitchEvent) -> bool {
        match self.button_by_subtype_mut(&button_subtype(index)) {
            Some(button) => {
                button.last_event = Some(event);
                true
            }
            None => false,
        }
    }

    /// Set the battery level and recompute the low battery status.
    ///
    /// Returns the new status, or `None` if the record has no battery service.
    pub fn set_battery_level(&mut self, level: u8) -> Option<StatusLowBattery> {
        let battery = self.battery_mut()?;
        let status = StatusLowBattery::from_level(level);
        battery.level = Some(level);
        battery.status = status;
        Some(status)
    }
}

fn is_canonical_subtype(subtype: &str) -> bool {
    (0..BUTTON_NAMES.len()).any(|index| button_subtype(index) == subtype)
}
