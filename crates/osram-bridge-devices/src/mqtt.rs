//! MQTT bus connection.
//!
//! ```text
//! connect ──→ ConnAck ──→ subscribe <base>/bridge/devices
//!                     ├─→ subscribe <base>/+
//!                     ├─→ subscribe <base>/<a>/<b> (nested device topics)
//!                     └─→ publish   <base>/bridge/request/devices (empty)
//! Publish ──→ MessageRouter::handle_message
//!         └─→ device list: subscribe new nested topics, unsubscribe stale ones
//! error   ──→ BusOffline, wait reconnect period, poll again
//! ```
//!
//! The subscriptions and the device list request are repeated on every
//! reconnect. The broker keeps no session for us (clean session).

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use osram_bridge_core::{BridgeConfig, BridgeEvent, BrokerEndpoint, Error, EventBus, Result};

use crate::host::AccessoryHost;
use crate::router::{MessageRouter, RouteOutcome};
use crate::topic::BridgeTopics;

/// Capacity of the client request channel.
const REQUEST_CAPACITY: usize = 10;

/// Largest packet accepted or sent. Device lists of big networks are large.
const MAX_PACKET_SIZE: usize = 10 * 1024 * 1024;

/// Build client options from the bridge configuration.
pub fn mqtt_options(config: &BridgeConfig, endpoint: &BrokerEndpoint) -> rumqttc::MqttOptions {
    let client_id = config
        .client_id
        .clone()
        .unwrap_or_else(|| format!("osram-bridge-{}", Uuid::new_v4().simple()));

    let mut options = rumqttc::MqttOptions::new(client_id, endpoint.host.clone(), endpoint.port);
    options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    options.set_clean_session(true);

    match (&config.mqtt_username, &config.mqtt_password) {
        (Some(user), pass) => {
            options.set_credentials(user.clone(), pass.clone().unwrap_or_default());
        }
        (None, Some(_)) => warn!("MQTT password given without a username, ignoring it"),
        (None, None) => {}
    }

    if endpoint.tls {
        options.set_transport(rumqttc::Transport::tls_with_default_config());
    }
    options
}

/// Tracks the topic filters of the current session.
///
/// Also maps subscribe packet ids back to topic filters so SubAck failures
/// can be reported by topic.
#[derive(Debug, Default)]
pub struct SubscriptionTracker {
    active: BTreeSet<String>,
    queued: VecDeque<String>,
    in_flight: HashMap<u16, String>,
}

impl SubscriptionTracker {
    /// A subscribe request was handed to the client.
    pub fn requested(&mut self, topic: impl Into<String>) {
        let topic = topic.into();
        self.active.insert(topic.clone());
        self.queued.push_back(topic);
    }

    /// An unsubscribe request was handed to the client.
    pub fn dropped(&mut self, topic: &str) {
        self.active.remove(topic);
    }

    /// Filters to subscribe and filters to unsubscribe to end up with
    /// exactly `wanted`.
    pub fn diff(&self, wanted: &[String]) -> (Vec<String>, Vec<String>) {
        let wanted_set: BTreeSet<&str> = wanted.iter().map(String::as_str).collect();
        let mut added = Vec::new();
        for topic in wanted {
            if !self.active.contains(topic) && !added.contains(topic) {
                added.push(topic.clone());
            }
        }
        let removed = self
            .active
            .iter()
            .filter(|topic| !wanted_set.contains(topic.as_str()))
            .cloned()
            .collect();
        (added, removed)
    }

    pub fn is_active(&self, topic: &str) -> bool {
        self.active.contains(topic)
    }

    /// The client sent a subscribe packet.
    pub fn sent(&mut self, pkid: u16) {
        if let Some(topic) = self.queued.pop_front() {
            self.in_flight.insert(pkid, topic);
        }
    }

    /// The broker answered. Returns the topic filter if it was tracked.
    pub fn acknowledged(&mut self, pkid: u16) -> Option<String> {
        self.in_flight.remove(&pkid)
    }

    pub fn pending(&self) -> usize {
        self.queued.len() + self.in_flight.len()
    }

    pub fn clear(&mut self) {
        self.active.clear();
        self.queued.clear();
        self.in_flight.clear();
    }
}

/// Long-lived connection to the broker that feeds a [`MessageRouter`].
pub struct BusConnection {
    config: BridgeConfig,
    endpoint: BrokerEndpoint,
    topics: BridgeTopics,
    bus: EventBus,
}

impl BusConnection {
    pub fn new(config: BridgeConfig, bus: EventBus) -> Result<Self> {
        let endpoint = config.endpoint()?;
        let topics = BridgeTopics::new(config.base_topic.clone());
        Ok(Self {
            config,
            endpoint,
            topics,
            bus,
        })
    }

    pub fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    /// Poll the connection until `shutdown` resolves.
    ///
    /// Connection errors never end the loop: the bridge reports itself
    /// offline and retries after the reconnect period.
    pub async fn run<H, F>(&self, router: &mut MessageRouter<H>, shutdown: F) -> Result<()>
    where
        H: AccessoryHost,
        F: Future<Output = ()>,
    {
        let options = mqtt_options(&self.config, &self.endpoint);
        let (client, mut eventloop) = rumqttc::AsyncClient::new(options, REQUEST_CAPACITY);
        let broker = self.endpoint.address();
        let reconnect_period = Duration::from_millis(self.config.reconnect_period_ms);

        let mut subscriptions = SubscriptionTracker::default();
        let mut online = false;

        info!("Connecting to MQTT broker: {}", self.config.mqtt_url);
        tokio::pin!(shutdown);

        'poll: loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down MQTT connection to {}", broker);
                    break;
                }
                polled = eventloop.poll() => match polled {
                    Ok(event) => {
                        self.handle_event(event, &client, router, &mut subscriptions, &mut online);
                    }
                    Err(e) => {
                        if online {
                            warn!("Disconnected from MQTT broker {}: {}", broker, e);
                            self.bus.publish(BridgeEvent::BusOffline {
                                broker: broker.clone(),
                                reason: e.to_string(),
                            });
                        } else {
                            warn!("MQTT connection error on {}: {}", broker, e);
                        }
                        online = false;
                        subscriptions.clear();
                        tokio::select! {
                            _ = &mut shutdown => {
                                info!("Shutting down MQTT connection to {}", broker);
                                break 'poll;
                            }
                            _ = tokio::time::sleep(reconnect_period) => {}
                        }
                        debug!("Reconnecting to MQTT broker {}", broker);
                    }
                }
            }
        }

        if online {
            if let Err(e) = client.try_disconnect() {
                debug!("Failed to queue disconnect: {}", e);
            }
            // Let the event loop flush the disconnect packet
            let flush = async {
                loop {
                    match eventloop.poll().await {
                        Ok(rumqttc::Event::Outgoing(rumqttc::Outgoing::Disconnect)) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            };
            if tokio::time::timeout(Duration::from_secs(1), flush).await.is_err() {
                debug!("Timed out waiting for MQTT disconnect");
            }
        }
        Ok(())
    }

    fn handle_event<H: AccessoryHost>(
        &self,
        event: rumqttc::Event,
        client: &rumqttc::AsyncClient,
        router: &mut MessageRouter<H>,
        subscriptions: &mut SubscriptionTracker,
        online: &mut bool,
    ) {
        match event {
            rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_)) => {
                info!("Connected to MQTT broker {}", self.endpoint.address());
                *online = true;
                self.bus.publish(BridgeEvent::BusConnected {
                    broker: self.endpoint.address(),
                });
                self.on_connected(client, router, subscriptions);
            }
            rumqttc::Event::Incoming(rumqttc::Packet::Publish(publish)) => {
                debug!(
                    "Received MQTT message on topic: {}, payload length: {}",
                    publish.topic,
                    publish.payload.len()
                );
                let outcome = router.handle_message(&publish.topic, &publish.payload);
                if matches!(outcome, RouteOutcome::DeviceList { .. }) {
                    sync_subscriptions(client, &router.subscriptions(), subscriptions);
                }
            }
            rumqttc::Event::Outgoing(rumqttc::Outgoing::Subscribe(pkid)) => {
                subscriptions.sent(pkid);
            }
            rumqttc::Event::Incoming(rumqttc::Packet::SubAck(ack)) => {
                let topic = subscriptions
                    .acknowledged(ack.pkid)
                    .unwrap_or_else(|| format!("packet {}", ack.pkid));
                for code in &ack.return_codes {
                    match code {
                        rumqttc::SubscribeReasonCode::Failure => {
                            error!("Broker rejected subscription to {}", topic);
                        }
                        rumqttc::SubscribeReasonCode::Success(qos) => {
                            info!("Subscribed to {} ({:?})", topic, qos);
                        }
                    }
                }
            }
            rumqttc::Event::Incoming(rumqttc::Packet::Disconnect) => {
                warn!("MQTT broker {} closed the session", self.endpoint.address());
            }
            _ => {}
        }
    }

    fn on_connected<H: AccessoryHost>(
        &self,
        client: &rumqttc::AsyncClient,
        router: &MessageRouter<H>,
        subscriptions: &mut SubscriptionTracker,
    ) {
        subscriptions.clear();
        sync_subscriptions(client, &router.subscriptions(), subscriptions);

        let request = self.topics.devices_request();
        let requested = client
            .try_publish(request, rumqttc::QoS::AtMostOnce, false, Vec::new())
            .map_err(bus_error);
        match requested {
            Ok(()) => debug!("Requested device list on {}", request),
            Err(e) => error!("Failed to request device list: {}", e),
        }
    }
}

/// Bring the session's subscriptions in line with `wanted`.
///
/// Uses the try_* client calls: the request channel is drained by the same
/// task that calls this.
fn sync_subscriptions(
    client: &rumqttc::AsyncClient,
    wanted: &[String],
    subscriptions: &mut SubscriptionTracker,
) {
    let (added, removed) = subscriptions.diff(wanted);

    for topic in removed {
        match client.try_unsubscribe(topic.as_str()).map_err(bus_error) {
            Ok(()) => {
                debug!("Unsubscribing from {}", topic);
                subscriptions.dropped(&topic);
            }
            Err(e) => error!("Failed to unsubscribe from {}: {}", topic, e),
        }
    }

    for topic in added {
        match subscribe(client, &topic) {
            Ok(()) => subscriptions.requested(topic),
            Err(e) => error!("Failed to subscribe to {}: {}", topic, e),
        }
    }
}

fn subscribe(client: &rumqttc::AsyncClient, topic: &str) -> Result<()> {
    client
        .try_subscribe(topic, rumqttc::QoS::AtMostOnce)
        .map_err(bus_error)
}

fn bus_error(e: rumqttc::ClientError) -> Error {
    Error::Bus(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_tracker() {
        let mut tracker = SubscriptionTracker::default();
        tracker.requested("zigbee2mqtt/bridge/devices");
        tracker.requested("zigbee2mqtt/+");
        assert_eq!(tracker.pending(), 2);

        tracker.sent(1);
        tracker.sent(2);
        assert_eq!(tracker.acknowledged(2).as_deref(), Some("zigbee2mqtt/+"));
        assert_eq!(
            tracker.acknowledged(1).as_deref(),
            Some("zigbee2mqtt/bridge/devices")
        );
        assert_eq!(tracker.acknowledged(1), None);
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn test_tracker_clear() {
        let mut tracker = SubscriptionTracker::default();
        tracker.requested("a");
        tracker.sent(7);
        tracker.requested("b");
        tracker.clear();
        assert_eq!(tracker.pending(), 0);
        assert_eq!(tracker.acknowledged(7), None);
    }

    #[test]
    fn test_tracker_diff() {
        let mut tracker = SubscriptionTracker::default();
        tracker.requested("zigbee2mqtt/bridge/devices");
        tracker.requested("zigbee2mqtt/+");
        tracker.requested("zigbee2mqtt/hall/remote");

        let wanted = vec![
            "zigbee2mqtt/bridge/devices".to_string(),
            "zigbee2mqtt/+".to_string(),
            "zigbee2mqtt/attic/remote".to_string(),
        ];
        let (added, removed) = tracker.diff(&wanted);
        assert_eq!(added, vec!["zigbee2mqtt/attic/remote".to_string()]);
        assert_eq!(removed, vec!["zigbee2mqtt/hall/remote".to_string()]);

        tracker.dropped("zigbee2mqtt/hall/remote");
        tracker.requested("zigbee2mqtt/attic/remote");
        assert!(!tracker.is_active("zigbee2mqtt/hall/remote"));
        assert_eq!(tracker.diff(&wanted), (Vec::new(), Vec::new()));

        tracker.clear();
        let (added, removed) = tracker.diff(&wanted);
        assert_eq!(added, wanted);
        assert!(removed.is_empty());
    }

    #[tokio::test]
    async fn test_full_request_channel_is_bus_error() {
        let options = rumqttc::MqttOptions::new("osram-test", "localhost", 1883);
        // Nobody polls the event loop, so the single request slot stays taken
        let (client, _eventloop) = rumqttc::AsyncClient::new(options, 1);

        assert!(subscribe(&client, "zigbee2mqtt/+").is_ok());
        let err = subscribe(&client, "zigbee2mqtt/hall/remote").unwrap_err();
        assert!(matches!(err, Error::Bus(_)));
        assert!(err.to_string().starts_with("Bus error"));
    }

    #[tokio::test]
    async fn test_shutdown_while_offline() {
        use crate::host::MemoryHost;

        // Nothing listens on port 1, so the first poll fails and the loop
        // waits out a long reconnect period.
        let config = BridgeConfig {
            mqtt_url: "mqtt://127.0.0.1:1".to_string(),
            reconnect_period_ms: 60_000,
            ..BridgeConfig::default()
        };
        let bus = EventBus::new();
        let connection = BusConnection::new(config, bus.clone()).unwrap();
        let mut router = MessageRouter::new("zigbee2mqtt", MemoryHost::new(), bus);

        let shutdown = tokio::time::sleep(Duration::from_millis(200));
        let finished = tokio::time::timeout(
            Duration::from_secs(5),
            connection.run(&mut router, shutdown),
        )
        .await;
        assert!(finished.expect("run ignored shutdown while offline").is_ok());
    }

    #[test]
    fn test_options_from_config() {
        let config = BridgeConfig {
            mqtt_username: Some("bridge".to_string()),
            client_id: Some("osram-test".to_string()),
            ..BridgeConfig::default()
        };
        let endpoint = config.endpoint().unwrap();
        let options = mqtt_options(&config, &endpoint);

        assert_eq!(options.client_id(), "osram-test");
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
        assert_eq!(
            options.credentials(),
            Some(("bridge".to_string(), String::new()))
        );
        assert!(options.clean_session());
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
    }

    #[test]
    fn test_generated_client_id() {
        let config = BridgeConfig::default();
        let endpoint = config.endpoint().unwrap();
        let options = mqtt_options(&config, &endpoint);
        assert!(options.client_id().starts_with("osram-bridge-"));
        assert_eq!(options.credentials(), None);
    }
}
