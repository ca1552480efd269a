//! Peripheral identifier helpers.

use btleplug::platform::PeripheralId;

/// Address reported by platforms that hide the Bluetooth MAC (macOS).
const PLACEHOLDER_ADDRESS: &str = "00:00:00:00:00:00";

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they may be
/// MAC addresses or other formats.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    strip_id_wrapper(&format!("{:?}", id))
}

/// Create an identifier string from an address and peripheral ID.
///
/// Uses the Bluetooth address unless it is the all-zero placeholder, in
/// which case the peripheral ID is used.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if is_placeholder_address(address) {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

/// Whether `address` is the all-zero placeholder.
pub fn is_placeholder_address(address: &str) -> bool {
    address == PLACEHOLDER_ADDRESS
}

fn strip_id_wrapper(debug: &str) -> String {
    debug
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}
