//! Bridge configuration.
//!
//! Values are resolved in this order: built-in defaults, an optional TOML
//! file, environment variables, then command-line overrides applied by the
//! binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default values.
pub mod defaults {
    pub const MQTT_URL: &str = "mqtt://localhost:1883";
    pub const BASE_TOPIC: &str = "zigbee2mqtt";
    pub const KEEP_ALIVE_SECS: u64 = 60;
    pub const RECONNECT_PERIOD_MS: u64 = 1000;
    pub const CACHE_PATH: &str = "data/accessories.redb";
    pub const MQTT_PORT: u16 = 1883;
    pub const MQTTS_PORT: u16 = 8883;
}

/// Environment variable names.
pub mod env_vars {
    pub const MQTT_URL: &str = "OSRAM_BRIDGE_MQTT_URL";
    pub const MQTT_USERNAME: &str = "OSRAM_BRIDGE_MQTT_USERNAME";
    pub const MQTT_PASSWORD: &str = "OSRAM_BRIDGE_MQTT_PASSWORD";
    pub const BASE_TOPIC: &str = "OSRAM_BRIDGE_BASE_TOPIC";
    pub const CACHE_PATH: &str = "OSRAM_BRIDGE_CACHE_PATH";
    pub const LOG_JSON: &str = "OSRAM_BRIDGE_LOG_JSON";
}

/// Runtime configuration of the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Broker endpoint URL
    pub mqtt_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt_password: Option<String>,
    /// Topic prefix zigbee2mqtt publishes under
    pub base_topic: String,
    /// MQTT client id (generated when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    /// Delay between reconnect attempts
    pub reconnect_period_ms: u64,
    /// Accessory cache database
    pub cache_path: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mqtt_url: defaults::MQTT_URL.to_string(),
            mqtt_username: None,
            mqtt_password: None,
            base_topic: defaults::BASE_TOPIC.to_string(),
            client_id: None,
            keep_alive_secs: defaults::KEEP_ALIVE_SECS,
            reconnect_period_ms: defaults::RECONNECT_PERIOD_MS,
            cache_path: PathBuf::from(defaults::CACHE_PATH),
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration file, then apply environment overrides.
    ///
    /// With no path only defaults and the environment are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, |name| std::env::var(name).ok())
    }

    /// Same as [`load`](Self::load) with an explicit variable lookup.
    pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(lookup);
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally the process environment).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(url) = non_empty(env_vars::MQTT_URL) {
            self.mqtt_url = url;
        }
        if let Some(username) = non_empty(env_vars::MQTT_USERNAME) {
            self.mqtt_username = Some(username);
        }
        if let Some(password) = non_empty(env_vars::MQTT_PASSWORD) {
            self.mqtt_password = Some(password);
        }
        if let Some(topic) = non_empty(env_vars::BASE_TOPIC) {
            self.base_topic = topic;
        }
        if let Some(path) = non_empty(env_vars::CACHE_PATH) {
            self.cache_path = PathBuf::from(path);
        }
    }

    /// Check the configuration and normalise the base topic.
    pub fn validate(&mut self) -> Result<()> {
        let trimmed = self.base_topic.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(Error::Config("base_topic must not be empty".to_string()));
        }
        if trimmed.contains(['+', '#']) {
            return Err(Error::Config(format!(
                "base_topic must not contain wildcards: {}",
                trimmed
            )));
        }
        self.base_topic = trimmed.to_string();
        BrokerEndpoint::parse(&self.mqtt_url)?;
        Ok(())
    }

    /// Parsed broker endpoint.
    pub fn endpoint(&self) -> Result<BrokerEndpoint> {
        BrokerEndpoint::parse(&self.mqtt_url)
    }

    /// Copy of this configuration safe to print.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.mqtt_password.is_some() {
            copy.mqtt_password = Some("********".to_string());
        }
        copy
    }
}

/// Broker host, port and transport parsed from the endpoint URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerEndpoint {
    /// Parse `mqtt://host:port`, `mqtts://host`, `tcp://...`, `ssl://...`
    /// or a bare `host[:port]`.
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        let (scheme, rest) = match url.split_once("://") {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None => ("mqtt".to_string(), url),
        };

        let (tls, default_port) = match scheme.as_str() {
            "mqtt" | "tcp" => (false, defaults::MQTT_PORT),
            "mqtts" | "ssl" | "tls" => (true, defaults::MQTTS_PORT),
            other => {
                return Err(Error::Config(format!(
                    "unsupported broker scheme: {}",
                    other
                )))
            }
        };

        // Credentials belong in the dedicated fields; a path is meaningless here.
        let authority = rest.split('/').next().unwrap_or_default();
        let authority = authority.rsplit('@').next().unwrap_or_default();

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| Error::Config(format!("invalid broker port: {}", port)))?;
                (host, port)
            }
            None => (authority, default_port),
        };

        if host.is_empty() {
            return Err(Error::Config(format!("missing broker host in {}", url)));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            tls,
        })
    }

    /// `host:port` form used in logs.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.mqtt_url, "mqtt://localhost:1883");
        assert_eq!(config.base_topic, "zigbee2mqtt");
        assert!(config.mqtt_username.is_none());
        assert!(config.mqtt_password.is_none());
    }

    #[test]
    fn test_parse_toml_partial() {
        let config = BridgeConfig::from_toml_str(
            r#"
            mqtt_url = "mqtt://broker.lan:1884"
            mqtt_username = "bridge"
            base_topic = "z2m"
            "#,
        )
        .unwrap();
        assert_eq!(config.mqtt_url, "mqtt://broker.lan:1884");
        assert_eq!(config.mqtt_username.as_deref(), Some("bridge"));
        assert_eq!(config.base_topic, "z2m");
        assert_eq!(config.keep_alive_secs, defaults::KEEP_ALIVE_SECS);
    }

    #[test]
    fn test_parse_toml_invalid() {
        let err = BridgeConfig::from_toml_str("mqtt_url = 12").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (env_vars::MQTT_URL, "mqtts://secure.lan"),
            (env_vars::MQTT_PASSWORD, "secret"),
            (env_vars::BASE_TOPIC, ""),
        ]
        .into_iter()
        .collect();

        let mut config = BridgeConfig::default();
        config.apply_env(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.mqtt_url, "mqtts://secure.lan");
        assert_eq!(config.mqtt_password.as_deref(), Some("secret"));
        // Empty values do not override
        assert_eq!(config.base_topic, "zigbee2mqtt");
    }

    #[test]
    fn test_validate_trims_base_topic() {
        let mut config = BridgeConfig {
            base_topic: "zigbee2mqtt/".to_string(),
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.base_topic, "zigbee2mqtt");

        config.base_topic = "/".to_string();
        assert!(config.validate().is_err());

        config.base_topic = "z2m/#".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redacted_masks_password() {
        let config = BridgeConfig {
            mqtt_password: Some("secret".to_string()),
            ..Default::default()
        };
        assert_eq!(config.redacted().mqtt_password.as_deref(), Some("********"));
        assert!(BridgeConfig::default().redacted().mqtt_password.is_none());
    }

    #[test]
    fn test_endpoint_parse() {
        let ep = BrokerEndpoint::parse("mqtt://localhost:1883").unwrap();
        assert_eq!(ep, BrokerEndpoint { host: "localhost".into(), port: 1883, tls: false });

        let ep = BrokerEndpoint::parse("mqtts://broker.example.com").unwrap();
        assert_eq!(ep.port, 8883);
        assert!(ep.tls);

        let ep = BrokerEndpoint::parse("192.168.1.10:1884").unwrap();
        assert_eq!(ep.host, "192.168.1.10");
        assert_eq!(ep.port, 1884);

        let ep = BrokerEndpoint::parse("tcp://user:pw@broker:1885/ignored").unwrap();
        assert_eq!(ep.host, "broker");
        assert_eq!(ep.port, 1885);
        assert_eq!(ep.address(), "broker:1885");
    }

    #[test]
    fn test_endpoint_parse_errors() {
        assert!(BrokerEndpoint::parse("ws://localhost").is_err());
        assert!(BrokerEndpoint::parse("mqtt://:1883").is_err());
        assert!(BrokerEndpoint::parse("mqtt://localhost:port").is_err());
        assert!(BrokerEndpoint::parse("").is_err());
    }
}
