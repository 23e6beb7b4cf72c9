//! Bus topic layout and topic routing table.

use std::collections::HashMap;

use uuid::Uuid;

/// Topics derived from the base topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeTopics {
    base: String,
    devices: String,
    devices_request: String,
    device_wildcard: String,
}

impl BridgeTopics {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            devices: format!("{}/bridge/devices", base),
            devices_request: format!("{}/bridge/request/devices", base),
            device_wildcard: format!("{}/+", base),
            base,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Retained device list topic.
    pub fn devices(&self) -> &str {
        &self.devices
    }

    /// Topic that asks for the device list to be republished.
    pub fn devices_request(&self) -> &str {
        &self.devices_request
    }

    /// Single-level wildcard covering every device topic.
    pub fn device_wildcard(&self) -> &str {
        &self.device_wildcard
    }

    /// State topic of one device.
    pub fn device(&self, friendly_name: &str) -> String {
        format!("{}/{}", self.base, friendly_name)
    }

    pub fn is_device_list(&self, topic: &str) -> bool {
        topic == self.devices
    }

    /// Topics subscribed on every connect.
    pub fn subscriptions(&self) -> [&str; 2] {
        [self.devices.as_str(), self.device_wildcard.as_str()]
    }

    /// Whether the `<base>/+` subscription delivers `topic`.
    ///
    /// Friendly names may contain `/`, in which case the device topic spans
    /// several levels and needs its own subscription.
    pub fn covered_by_wildcard(&self, topic: &str) -> bool {
        topic
            .strip_prefix(self.base.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|name| !name.is_empty() && !name.contains('/'))
    }
}

/// Exact-match map from device topic to accessory.
#[derive(Debug, Default)]
pub struct TopicTable {
    routes: HashMap<String, Uuid>,
}

impl TopicTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, topic: String, accessory: Uuid) -> Option<Uuid> {
        self.routes.insert(topic, accessory)
    }

    pub fn lookup(&self, topic: &str) -> Option<Uuid> {
        self.routes.get(topic).copied()
    }

    /// Every routed topic, in no particular order.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_layout() {
        let topics = BridgeTopics::new("zigbee2mqtt");
        assert_eq!(topics.devices(), "zigbee2mqtt/bridge/devices");
        assert_eq!(topics.devices_request(), "zigbee2mqtt/bridge/request/devices");
        assert_eq!(topics.device_wildcard(), "zigbee2mqtt/+");
        assert_eq!(topics.device("remote1"), "zigbee2mqtt/remote1");
        assert_eq!(
            topics.subscriptions(),
            ["zigbee2mqtt/bridge/devices", "zigbee2mqtt/+"]
        );
        assert!(topics.is_device_list("zigbee2mqtt/bridge/devices"));
        assert!(!topics.is_device_list("zigbee2mqtt/bridge/state"));
    }

    #[test]
    fn test_nested_base() {
        let topics = BridgeTopics::new("home/z2m");
        assert_eq!(topics.device("remote1"), "home/z2m/remote1");
        assert_eq!(topics.device_wildcard(), "home/z2m/+");
    }

    #[test]
    fn test_table_is_exact_match() {
        let mut table = TopicTable::new();
        let id = Uuid::new_v4();
        table.insert("zigbee2mqtt/remote1".to_string(), id);

        assert_eq!(table.lookup("zigbee2mqtt/remote1"), Some(id));
        assert_eq!(table.lookup("zigbee2mqtt/remote1/set"), None);
        assert_eq!(table.lookup("zigbee2mqtt/Remote1"), None);

        assert_eq!(table.len(), 1);
        assert_eq!(table.topics().collect::<Vec<_>>(), vec!["zigbee2mqtt/remote1"]);
    }

    #[test]
    fn test_wildcard_coverage() {
        let topics = BridgeTopics::new("zigbee2mqtt");
        assert!(topics.covered_by_wildcard("zigbee2mqtt/remote1"));
        assert!(!topics.covered_by_wildcard("zigbee2mqtt/hall/remote"));
        assert!(!topics.covered_by_wildcard("zigbee2mqtt/"));
        assert!(!topics.covered_by_wildcard("zigbee2mqttx/remote1"));
        assert!(!topics.covered_by_wildcard("other/remote1"));

        let nested = BridgeTopics::new("home/z2m");
        assert!(nested.covered_by_wildcard("home/z2m/remote1"));
        assert!(!nested.covered_by_wildcard("home/z2m/hall/remote"));
    }
}
