//! OSRAM Smart+ Mini remotes as host accessories.
//!
//! ```text
//! bus ──→ MessageRouter ─┬─ <base>/bridge/devices ─→ classifier ─→ AccessoryReconciler ─→ AccessoryHost
//!                        └─ <base>/<device>       ─→ action table / battery ─→ AccessoryRecord
//! ```
//!
//! The router owns every piece of mutable state and runs on a single
//! task, so message handling is strictly sequential.

pub mod accessory;
pub mod action;
pub mod classifier;
pub mod descriptor;
pub mod host;
pub mod reconciler;
pub mod registry;
pub mod router;
pub mod topic;

#[cfg(feature = "mqtt")]
pub mod mqtt;

pub use accessory::{
    accessory_uuid, AccessoryInformation, AccessoryRecord, AccessoryService, BatteryService,
    ButtonService, ServiceChanges, BUTTON_NAMES,
};
pub use action::{translate, ButtonAction, ACTION_MAPPINGS};
pub use classifier::{is_supported, SUPPORTED_MODELS};
pub use descriptor::{DeviceDefinition, DeviceDescriptor};
pub use host::{AccessoryHost, MemoryHost, StoredHost};
pub use reconciler::{AccessoryReconciler, Reconciliation};
pub use registry::DeviceRegistry;
pub use router::{battery_percent, MessageRouter, RouteOutcome, StateUpdate};
pub use topic::{BridgeTopics, TopicTable};

#[cfg(feature = "mqtt")]
pub use mqtt::{mqtt_options, BusConnection, SubscriptionTracker};
