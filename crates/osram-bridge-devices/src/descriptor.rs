//! Device descriptors published on `<base>/bridge/devices`.

use serde::{Deserialize, Serialize};

/// One entry of the zigbee2mqtt device list.
///
/// Only the fields the bridge reads are kept; everything else in the
/// payload is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Name the device publishes under (`<base>/<friendly_name>`)
    pub friendly_name: String,
    /// Radio network address, the stable identity of the device
    pub ieee_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<DeviceDefinition>,
}

/// Nested definition block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeviceDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
}

impl DeviceDescriptor {
    pub fn new(friendly_name: impl Into<String>, ieee_address: impl Into<String>) -> Self {
        Self {
            friendly_name: friendly_name.into(),
            ieee_address: ieee_address.into(),
            model: None,
            manufacturer: None,
            definition: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn with_definition(mut self, model: impl Into<String>, vendor: impl Into<String>) -> Self {
        self.definition = Some(DeviceDefinition {
            model: Some(model.into()),
            vendor: Some(vendor.into()),
        });
        self
    }

    /// Model from the direct field, falling back to the definition.
    ///
    /// Empty strings count as missing.
    pub fn resolved_model(&self) -> Option<&str> {
        first_non_empty(
            self.model.as_deref(),
            self.definition.as_ref().and_then(|d| d.model.as_deref()),
        )
    }

    /// Manufacturer from the direct field, falling back to the definition vendor.
    pub fn resolved_manufacturer(&self) -> Option<&str> {
        first_non_empty(
            self.manufacturer.as_deref(),
            self.definition.as_ref().and_then(|d| d.vendor.as_deref()),
        )
    }
}

fn first_non_empty<'a>(primary: Option<&'a str>, fallback: Option<&'a str>) -> Option<&'a str> {
    primary
        .filter(|s| !s.is_empty())
        .or(fallback.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_flat() {
        let device: DeviceDescriptor = serde_json::from_str(
            r#"{"friendly_name":"remote1","ieee_address":"0x1","manufacturer":"OSRAM","model":"AC0251100NJ"}"#,
        )
        .unwrap();
        assert_eq!(device.friendly_name, "remote1");
        assert_eq!(device.resolved_model(), Some("AC0251100NJ"));
        assert_eq!(device.resolved_manufacturer(), Some("OSRAM"));
    }

    #[test]
    fn test_deserialize_nested_with_extra_fields() {
        let device: DeviceDescriptor = serde_json::from_str(
            r#"{
                "friendly_name": "hallway",
                "ieee_address": "0x8418260000d9a7c1",
                "type": "EndDevice",
                "model_id": "Lightify Switch Mini",
                "manufacturer": null,
                "definition": {"model": "AC0251100NJ/AC0251700NJ", "vendor": "OSRAM", "exposes": []}
            }"#,
        )
        .unwrap();
        assert_eq!(device.resolved_model(), Some("AC0251100NJ/AC0251700NJ"));
        assert_eq!(device.resolved_manufacturer(), Some("OSRAM"));
    }

    #[test]
    fn test_null_definition() {
        let device: DeviceDescriptor = serde_json::from_str(
            r#"{"friendly_name":"Coordinator","ieee_address":"0x00124b0000000000","definition":null}"#,
        )
        .unwrap();
        assert_eq!(device.resolved_model(), None);
        assert_eq!(device.resolved_manufacturer(), None);
    }

    #[test]
    fn test_empty_direct_field_falls_back() {
        let device = DeviceDescriptor::new("remote1", "0x1")
            .with_model("")
            .with_definition("AC0251600NJ", "OSRAM");
        assert_eq!(device.resolved_model(), Some("AC0251600NJ"));
    }

    #[test]
    fn test_missing_identity_is_rejected() {
        let result = serde_json::from_str::<DeviceDescriptor>(r#"{"friendly_name":"remote1"}"#);
        assert!(result.is_err());
    }
}
