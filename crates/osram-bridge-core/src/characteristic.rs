//! Host characteristic values.
//!
//! The accessory host exposes button presses and battery state through a
//! fixed set of enumerated characteristic values. The bridge works with the
//! domain-neutral [`PressKind`] and only converts to the host enumeration at
//! the boundary.

use serde::{Deserialize, Serialize};

/// Battery percentage strictly below this value is reported as low.
pub const LOW_BATTERY_THRESHOLD: u8 = 20;

/// Logical press kind produced by the action translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressKind {
    Single,
    Long,
}

impl std::fmt::Display for PressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Long => write!(f, "long"),
        }
    }
}

/// Value of the host's programmable switch event characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProgrammableSwitchEvent {
    SinglePress = 0,
    DoublePress = 1,
    LongPress = 2,
}

impl ProgrammableSwitchEvent {
    /// Values a remote button advertises to the host.
    pub const BUTTON_VALID_VALUES: [ProgrammableSwitchEvent; 2] =
        [ProgrammableSwitchEvent::SinglePress, ProgrammableSwitchEvent::LongPress];

    /// Raw characteristic value.
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SinglePress => "SINGLE_PRESS",
            Self::DoublePress => "DOUBLE_PRESS",
            Self::LongPress => "LONG_PRESS",
        }
    }
}

impl From<PressKind> for ProgrammableSwitchEvent {
    fn from(kind: PressKind) -> Self {
        match kind {
            PressKind::Single => ProgrammableSwitchEvent::SinglePress,
            PressKind::Long => ProgrammableSwitchEvent::LongPress,
        }
    }
}

impl std::fmt::Display for ProgrammableSwitchEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of the host's low battery status characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum StatusLowBattery {
    #[default]
    Normal = 0,
    Low = 1,
}

impl StatusLowBattery {
    /// Derive the status from a battery percentage.
    pub fn from_level(level: u8) -> Self {
        if level < LOW_BATTERY_THRESHOLD {
            Self::Low
        } else {
            Self::Normal
        }
    }

    pub fn is_low(self) -> bool {
        self == Self::Low
    }
}
