//! Bus message routing.
//!
//! Every message received on the bus goes through [`MessageRouter::handle_message`].
//! The device list topic rebuilds the registry and topic table; any topic
//! in the table is treated as a state update of the mapped accessory;
//! everything else is ignored.

use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use osram_bridge_core::{BridgeEvent, EventBus, ProgrammableSwitchEvent, Result};

use crate::action::{translate, ButtonAction};
use crate::classifier::is_supported;
use crate::descriptor::DeviceDescriptor;
use crate::host::AccessoryHost;
use crate::reconciler::AccessoryReconciler;
use crate::registry::DeviceRegistry;
use crate::topic::{BridgeTopics, TopicTable};

/// What a device state payload changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateUpdate {
    pub action: Option<ButtonAction>,
    pub battery: Option<u8>,
}

/// Outcome of routing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A device list was processed.
    DeviceList { total: usize, supported: usize },
    /// A device state payload was applied.
    DeviceState(StateUpdate),
    /// Topic or payload is of no interest.
    Ignored,
    /// Payload could not be decoded.
    Rejected(String),
}

/// Routes bus messages to the registry and the accessories.
pub struct MessageRouter<H> {
    topics: BridgeTopics,
    registry: DeviceRegistry,
    routes: TopicTable,
    reconciler: AccessoryReconciler<H>,
    bus: EventBus,
}

impl<H: AccessoryHost> MessageRouter<H> {
    pub fn new(base_topic: &str, host: H, bus: EventBus) -> Self {
        Self {
            topics: BridgeTopics::new(base_topic),
            registry: DeviceRegistry::new(),
            routes: TopicTable::new(),
            reconciler: AccessoryReconciler::new(host, bus.clone()),
            bus,
        }
    }

    /// Adopt the accessories the host cached from a previous run.
    pub fn restore_cached(&mut self) -> Result<usize> {
        self.reconciler.restore_cached()
    }

    pub fn topics(&self) -> &BridgeTopics {
        &self.topics
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn routes(&self) -> &TopicTable {
        &self.routes
    }

    pub fn reconciler(&self) -> &AccessoryReconciler<H> {
        &self.reconciler
    }

    /// Topic filters that deliver the device list and every routed topic.
    ///
    /// Device topics nested below the base topic by a `/` in the friendly
    /// name are listed one by one, sorted. Names containing wildcard
    /// characters cannot be subscribed and are left out.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut nested: Vec<String> = self
            .routes
            .topics()
            .filter(|topic| !self.topics.covered_by_wildcard(topic))
            .filter(|topic| !topic.contains(['+', '#']))
            .map(str::to_string)
            .collect();
        nested.sort();

        let mut filters: Vec<String> = self
            .topics
            .subscriptions()
            .iter()
            .map(|filter| filter.to_string())
            .collect();
        filters.extend(nested);
        filters
    }

    /// Route one message.
    pub fn handle_message(&mut self, topic: &str, payload: &[u8]) -> RouteOutcome {
        if self.topics.is_device_list(topic) {
            return self.handle_device_list(payload);
        }

        match self.routes.lookup(topic) {
            Some(uuid) => self.handle_device_state(topic, uuid, payload),
            None => {
                debug!("Ignoring message on unrouted topic {}", topic);
                RouteOutcome::Ignored
            }
        }
    }

    fn handle_device_list(&mut self, payload: &[u8]) -> RouteOutcome {
        let entries: Vec<Value> = match serde_json::from_slice(payload) {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to parse device list: {}", e);
                return RouteOutcome::Rejected(e.to_string());
            }
        };

        let total = entries.len();
        debug!("Received device list with {} entries", total);

        let mut supported = Vec::new();
        let mut routes = TopicTable::new();
        for entry in entries {
            let device: DeviceDescriptor = match serde_json::from_value(entry) {
                Ok(device) => device,
                Err(e) => {
                    warn!("Skipping malformed device list entry: {}", e);
                    continue;
                }
            };
            if !is_supported(&device) {
                continue;
            }

            info!(
                "Found OSRAM remote: {} ({})",
                device.friendly_name,
                device.resolved_model().unwrap_or_default()
            );
            let reconciliation = self.reconciler.reconcile(&device);
            routes.insert(
                self.topics.device(&device.friendly_name),
                reconciliation.accessory_id(),
            );
            supported.push(device);
        }

        let count = supported.len();
        for name in self.registry.replace(supported) {
            debug!("Device {} left the device list", name);
        }
        self.routes = routes;

        RouteOutcome::DeviceList {
            total,
            supported: count,
        }
    }

    fn handle_device_state(&mut self, topic: &str, uuid: Uuid, payload: &[u8]) -> RouteOutcome {
        let value: Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to parse message on {}: {}", topic, e);
                return RouteOutcome::Rejected(e.to_string());
            }
        };
        let Value::Object(fields) = value else {
            debug!("Ignoring non-object payload on {}", topic);
            return RouteOutcome::Ignored;
        };

        let mut update = StateUpdate::default();

        // Action and battery are handled independently
        match fields.get("action") {
            Some(Value::String(action)) if !action.is_empty() => {
                update.action = self.apply_action(uuid, action);
            }
            None | Some(Value::Null) | Some(Value::String(_)) => {}
            Some(other) => debug!("Ignoring non-string action on {}: {}", topic, other),
        }

        match fields.get("battery") {
            None | Some(Value::Null) => {}
            Some(value) => match value.as_f64() {
                Some(raw) => {
                    let level = battery_percent(raw);
                    self.apply_battery(uuid, level);
                    update.battery = Some(level);
                }
                None => warn!("Ignoring non-numeric battery on {}: {}", topic, value),
            },
        }

        RouteOutcome::DeviceState(update)
    }

    fn apply_action(&mut self, uuid: Uuid, action: &str) -> Option<ButtonAction> {
        let Some(mapping) = translate(action) else {
            debug!("Unmapped action: {}", action);
            return None;
        };
        let record = self.reconciler.accessory_mut(&uuid)?;

        let event = ProgrammableSwitchEvent::from(mapping.kind);
        info!(
            "Action {} on {} -> button {} {}",
            action,
            record.device_name(),
            mapping.button,
            event
        );
        if !record.set_button_event(usize::from(mapping.button), event) {
            warn!("Accessory {} has no button {}", record.display_name, mapping.button);
            return None;
        }

        self.bus.publish(BridgeEvent::ButtonPressed {
            accessory_id: uuid,
            device: record.device_name().to_string(),
            button: mapping.button,
            event,
        });
        Some(mapping)
    }

    fn apply_battery(&mut self, uuid: Uuid, level: u8) {
        let Some(record) = self.reconciler.accessory_mut(&uuid) else {
            return;
        };
        let Some(status) = record.set_battery_level(level) else {
            warn!("Accessory {} has no battery service", record.display_name);
            return;
        };
        debug!("Battery of {} at {}%", record.device_name(), level);

        let device = record.device_name().to_string();
        self.bus.publish(BridgeEvent::BatteryLevelChanged {
            accessory_id: uuid,
            device: device.clone(),
            level,
        });
        self.bus.publish(BridgeEvent::LowBatteryChanged {
            accessory_id: uuid,
            device,
            status,
        });
        self.reconciler.persist(&uuid);
    }
}

/// Battery percentage as reported to the host: rounded and clamped to 0..=100.
pub fn battery_percent(raw: f64) -> u8 {
    raw.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battery_percent() {
        assert_eq!(battery_percent(87.0), 87);
        assert_eq!(battery_percent(19.4), 19);
        assert_eq!(battery_percent(19.5), 20);
        assert_eq!(battery_percent(-3.0), 0);
        assert_eq!(battery_percent(140.0), 100);
    }
}
