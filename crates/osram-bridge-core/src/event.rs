//! Bridge events.
//!
//! Every observable state change the bridge produces is published as a
//! [`BridgeEvent`] on the [`EventBus`](crate::EventBus).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::characteristic::{ProgrammableSwitchEvent, StatusLowBattery};

/// Event published by the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeEvent {
    /// An accessory was loaded from the host cache at startup.
    AccessoryRestored { accessory_id: Uuid, name: String },

    /// A new accessory was created and registered with the host.
    AccessoryRegistered {
        accessory_id: Uuid,
        name: String,
        device: String,
    },

    /// An existing accessory received a fresh device descriptor.
    AccessoryUpdated {
        accessory_id: Uuid,
        name: String,
        device: String,
    },

    /// A remote button fired.
    ButtonPressed {
        accessory_id: Uuid,
        device: String,
        button: u8,
        event: ProgrammableSwitchEvent,
    },

    /// Battery percentage changed.
    BatteryLevelChanged {
        accessory_id: Uuid,
        device: String,
        level: u8,
    },

    /// Low battery status was recomputed.
    LowBatteryChanged {
        accessory_id: Uuid,
        device: String,
        status: StatusLowBattery,
    },

    /// The bus connection was acknowledged by the broker.
    BusConnected { broker: String },

    /// The bus connection was lost.
    BusOffline { broker: String, reason: String },
}

impl BridgeEvent {
    /// Accessory this event belongs to, if any.
    pub fn accessory_id(&self) -> Option<Uuid> {
        match self {
            Self::AccessoryRestored { accessory_id, .. }
            | Self::AccessoryRegistered { accessory_id, .. }
            | Self::AccessoryUpdated { accessory_id, .. }
            | Self::ButtonPressed { accessory_id, .. }
            | Self::BatteryLevelChanged { accessory_id, .. }
            | Self::LowBatteryChanged { accessory_id, .. } => Some(*accessory_id),
            Self::BusConnected { .. } | Self::BusOffline { .. } => None,
        }
    }

    /// Short name of the event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::AccessoryRestored { .. } => "AccessoryRestored",
            Self::AccessoryRegistered { .. } => "AccessoryRegistered",
            Self::AccessoryUpdated { .. } => "AccessoryUpdated",
            Self::ButtonPressed { .. } => "ButtonPressed",
            Self::BatteryLevelChanged { .. } => "BatteryLevelChanged",
            Self::LowBatteryChanged { .. } => "LowBatteryChanged",
            Self::BusConnected { .. } => "BusConnected",
            Self::BusOffline { .. } => "BusOffline",
        }
    }

    pub fn is_bus_event(&self) -> bool {
        matches!(self, Self::BusConnected { .. } | Self::BusOffline { .. })
    }
}

/// Metadata attached to every published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event ID
    pub event_id: String,
    /// Component that published the event
    pub source: String,
    /// Unix timestamp in seconds
    pub timestamp: i64,
}

impl EventMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            source: source.into(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}
