//! Core types for the OSRAM remote bridge.
//!
//! This crate holds the pieces shared by every other crate in the workspace:
//! the bridge event model and its broadcast bus, the host characteristic
//! values, configuration loading and the common error type.

pub mod characteristic;
pub mod config;
pub mod error;
pub mod event;
pub mod eventbus;

pub use characteristic::{
    PressKind, ProgrammableSwitchEvent, StatusLowBattery, LOW_BATTERY_THRESHOLD,
};
pub use config::{BridgeConfig, BrokerEndpoint};
pub use error::{Error, Result};
pub use event::{BridgeEvent, EventMetadata};
pub use eventbus::{
    EventBus, EventBusReceiver, FilteredReceiver, DEFAULT_CHANNEL_CAPACITY,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
