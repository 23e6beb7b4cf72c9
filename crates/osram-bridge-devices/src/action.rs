//! Action string to button mapping.
//!
//! The Smart+ Mini has three buttons (up arrow, down arrow, circle). Each
//! one reports two vendor actions: a short-press style action and a
//! long-press style action. Which one fires is decided by the device, the
//! bridge only looks the name up.

use osram_bridge_core::PressKind;

/// Button index and press kind an action maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ButtonAction {
    /// Always 0, 1 or 2
    pub button: u8,
    pub kind: PressKind,
}

impl ButtonAction {
    const fn new(button: u8, kind: PressKind) -> Self {
        Self { button, kind }
    }
}

/// Static action table.
pub const ACTION_MAPPINGS: [(&str, ButtonAction); 6] = [
    // Up arrow
    ("on", ButtonAction::new(0, PressKind::Single)),
    ("brightness_move_up", ButtonAction::new(0, PressKind::Long)),
    // Down arrow
    ("off", ButtonAction::new(1, PressKind::Single)),
    ("brightness_move_down", ButtonAction::new(1, PressKind::Long)),
    // Circle
    ("brightness_move_to_level", ButtonAction::new(2, PressKind::Single)),
    ("move_to_saturation", ButtonAction::new(2, PressKind::Long)),
];

/// Look up an action string. `None` means the action is unmapped.
pub fn translate(action: &str) -> Option<ButtonAction> {
    ACTION_MAPPINGS
        .iter()
        .find(|(name, _)| *name == action)
        .map(|(_, mapping)| *mapping)
}
