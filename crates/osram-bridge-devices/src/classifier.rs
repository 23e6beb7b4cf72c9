//! Supported device detection.

use crate::descriptor::DeviceDescriptor;

/// Substring the manufacturer must contain (compared case-insensitively).
pub const SUPPORTED_VENDOR: &str = "osram";

/// Smart+ Mini remote model codes.
///
/// Matched as substrings: real model strings carry suffixes or list
/// several codes separated by `/`.
pub const SUPPORTED_MODELS: [&str; 3] = ["AC0251100NJ", "AC0251600NJ", "AC0251700NJ"];

/// Whether the device is a supported OSRAM remote.
pub fn is_supported(device: &DeviceDescriptor) -> bool {
    let manufacturer = device.resolved_manufacturer().unwrap_or_default();
    let model = device.resolved_model().unwrap_or_default();

    manufacturer.to_lowercase().contains(SUPPORTED_VENDOR)
        && SUPPORTED_MODELS.iter().any(|code| model.contains(code))
}
