//! Restart behaviour with the persistent accessory cache.

use osram_bridge_core::{BridgeEvent, EventBus, StatusLowBattery};
use osram_bridge_devices::{accessory_uuid, MessageRouter, RouteOutcome, StoredHost};

const DEVICES_TOPIC: &str = "zigbee2mqtt/bridge/devices";

const DEVICE_LIST: &str = r#"[
    {"friendly_name":"remote1","ieee_address":"0x1","manufacturer":"OSRAM","model":"AC0251100NJ"},
    {"friendly_name":"remote2","ieee_address":"0x2","definition":{"model":"AC0251600NJ","vendor":"OSRAM"}}
]"#;

#[test]
fn test_restart_updates_instead_of_duplicating() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("accessories.redb");

    // First run
    {
        let host = StoredHost::open(&path).unwrap();
        let mut router = MessageRouter::new("zigbee2mqtt", host, EventBus::new());
        assert_eq!(router.restore_cached().unwrap(), 0);

        router.handle_message(DEVICES_TOPIC, DEVICE_LIST.as_bytes());
        router.handle_message("zigbee2mqtt/remote1", br#"{"battery":12}"#);
        assert_eq!(router.reconciler().accessories().len(), 2);
    }

    // Second run
    let host = StoredHost::open(&path).unwrap();
    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    let mut router = MessageRouter::new("zigbee2mqtt", host, bus);

    assert_eq!(router.restore_cached().unwrap(), 2);
    let restored = router.reconciler().accessory(&accessory_uuid("0x1")).unwrap();
    assert_eq!(restored.battery().unwrap().status, StatusLowBattery::Low);

    let outcome = router.handle_message(DEVICES_TOPIC, DEVICE_LIST.as_bytes());
    assert_eq!(outcome, RouteOutcome::DeviceList { total: 2, supported: 2 });
    assert_eq!(router.reconciler().accessories().len(), 2);
    assert_eq!(router.reconciler().host().store().count().unwrap(), 2);

    let events = rx.drain();
    let restored = events
        .iter()
        .filter(|e| matches!(e, BridgeEvent::AccessoryRestored { .. }))
        .count();
    let registered = events
        .iter()
        .filter(|e| matches!(e, BridgeEvent::AccessoryRegistered { .. }))
        .count();
    let updated = events
        .iter()
        .filter(|e| matches!(e, BridgeEvent::AccessoryUpdated { .. }))
        .count();
    assert_eq!((restored, registered, updated), (2, 0, 2));
}

#[test]
fn test_repeated_device_lists_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let host = StoredHost::open(dir.path().join("accessories.redb")).unwrap();
    let mut router = MessageRouter::new("zigbee2mqtt", host, EventBus::new());

    router.handle_message(DEVICES_TOPIC, DEVICE_LIST.as_bytes());
    let first = router.reconciler().accessories().to_vec();

    router.handle_message(DEVICES_TOPIC, DEVICE_LIST.as_bytes());
    router.handle_message(DEVICES_TOPIC, DEVICE_LIST.as_bytes());

    assert_eq!(router.reconciler().accessories(), first.as_slice());
    assert_eq!(router.reconciler().host().store().count().unwrap(), 2);
}

#[test]
fn test_cached_accessory_for_absent_device_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("accessories.redb");

    {
        let host = StoredHost::open(&path).unwrap();
        let mut router = MessageRouter::new("zigbee2mqtt", host, EventBus::new());
        router.handle_message(DEVICES_TOPIC, DEVICE_LIST.as_bytes());
    }

    let host = StoredHost::open(&path).unwrap();
    let mut router = MessageRouter::new("zigbee2mqtt", host, EventBus::new());
    router.restore_cached().unwrap();

    let only_remote1 = r#"[{"friendly_name":"remote1","ieee_address":"0x1","manufacturer":"OSRAM","model":"AC0251100NJ"}]"#;
    router.handle_message(DEVICES_TOPIC, only_remote1.as_bytes());

    assert_eq!(router.reconciler().accessories().len(), 2);
    assert!(router.routes().lookup("zigbee2mqtt/remote2").is_none());
    assert_eq!(
        router.handle_message("zigbee2mqtt/remote2", br#"{"action":"on"}"#),
        RouteOutcome::Ignored
    );
}
