//! Device identity derived from the ESP32 factory MAC address.
//!
//! When no deployment id is configured, the reader names itself
//! `smartmeter-xxyyzz` (last 3 MAC bytes, lowercase hex).  The name is
//! the topic prefix and the MQTT client id, and stays stable across
//! reboots because the eFuse MAC is factory-burned.

use core::fmt::Write;

/// Fixed-size id string, sized like [`SystemConfig::deployment_id`](crate::config::SystemConfig).
pub type DeviceIdString = heapless::String<32>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(feature = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: the buffer is exactly the 6 bytes the call writes.
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(feature = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Format: `smartmeter-xxyyzz` (e.g. `smartmeter-efcafe`).
pub fn device_id(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    let _ = write!(id, "smartmeter-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    id
}

/// The configured id, or the MAC-derived one when none is set.
pub fn resolve(configured: &str) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    if !configured.is_empty() && id.push_str(configured).is_ok() {
        return id;
    }
    device_id(&read_mac())
}
