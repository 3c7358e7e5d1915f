//! System configuration parameters
//!
//! All tunable parameters for the smart-meter reader.  Stored in NVS as a
//! postcard blob; credentials can be baked in at build time through the
//! `SMARTMETER_*` environment variables.

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::sml::crc::CrcPolicy;
use crate::sml::scanner::ScanLimits;

/// Fixed IPv4 settings for the station interface.  `None` in
/// [`SystemConfig::static_ip`] means DHCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticIp {
    pub ip: [u8; 4],
    pub gateway: [u8; 4],
    pub subnet: [u8; 4],
    pub dns: [u8; 4],
}

impl StaticIp {
    /// CIDR prefix length of `subnet`, or `None` if the mask is not a
    /// contiguous run of leading ones.
    pub fn prefix_len(&self) -> Option<u8> {
        let mask = u32::from_be_bytes(self.subnet);
        let ones = mask.leading_ones();
        (mask.checked_shl(ones).unwrap_or(0) == 0).then_some(ones as u8)
    }

    /// Parse `"ip,gateway,subnet,dns"` in dotted-quad notation.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split(',').map(|p| p.trim().parse::<core::net::Ipv4Addr>());
        let mut next = || parts.next()?.ok().map(|a| a.octets());
        let parsed = Self {
            ip: next()?,
            gateway: next()?,
            subnet: next()?,
            dns: next()?,
        };
        parts.next().is_none().then_some(parsed)
    }
}

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Identity ---
    /// Topic prefix and MQTT client id.  Empty = derive from the MAC.
    pub deployment_id: String<32>,

    // --- Network ---
    pub wifi_ssid: String<32>,
    pub wifi_password: String<64>,
    /// Broker host name or dotted IPv4 address.
    pub mqtt_host: String<64>,
    pub mqtt_port: u16,
    pub mqtt_keepalive_secs: u16,
    /// Fixed address instead of DHCP.
    pub static_ip: Option<StaticIp>,

    // --- Firmware update ---
    /// TCP port of the update listener.
    pub ota_port: u16,
    /// Shared secret for update sessions.  Empty disables the listener.
    pub ota_password: String<32>,

    // --- Optical head ---
    pub uart_baud: u32,

    // --- Frame scanning ---
    /// Budget for the 3 trailer bytes after the end sequence (milliseconds)
    pub trailer_wait_ms: u32,
    /// Discard a frame left open longer than this (milliseconds)
    pub frame_timeout_ms: u32,
    pub crc_policy: CrcPolicy,

    // --- Timing ---
    /// Minimum spacing between forwarded readings (milliseconds)
    pub publish_interval_ms: u32,
    /// Sleep at the end of each loop iteration (milliseconds)
    pub loop_yield_ms: u32,
    pub watchdog_timeout_ms: u32,
}

impl SystemConfig {
    pub fn scan_limits(&self) -> ScanLimits {
        ScanLimits {
            trailer_wait_ms: self.trailer_wait_ms,
            frame_timeout_ms: u64::from(self.frame_timeout_ms),
        }
    }
}

fn baked(value: Option<&'static str>) -> Option<&'static str> {
    value.filter(|v| !v.is_empty())
}

fn string_from<const N: usize>(value: Option<&str>, fallback: &str) -> String<N> {
    let mut s = String::new();
    // Oversized build-time values fall back rather than truncate.
    if s.push_str(value.unwrap_or(fallback)).is_err() {
        s.clear();
        let _ = s.push_str(fallback);
    }
    s
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            deployment_id: string_from(baked(option_env!("SMARTMETER_DEPLOYMENT_ID")), ""),
            wifi_ssid: string_from(baked(option_env!("SMARTMETER_WIFI_SSID")), ""),
            wifi_password: string_from(baked(option_env!("SMARTMETER_WIFI_PASSWORD")), ""),
            mqtt_host: string_from(baked(option_env!("SMARTMETER_MQTT_HOST")), "mqtt.local"),
            mqtt_port: 1883,
            mqtt_keepalive_secs: 120,
            static_ip: baked(option_env!("SMARTMETER_STATIC_IP")).and_then(StaticIp::parse),

            ota_port: 3232,
            ota_password: string_from(baked(option_env!("SMARTMETER_OTA_PASSWORD")), ""),

            uart_baud: 9600,

            trailer_wait_ms: 30,
            frame_timeout_ms: 5_000,
            crc_policy: CrcPolicy::Warn,

            publish_interval_ms: 10_000, // 1 per 10 s
            loop_yield_ms: 10,
            watchdog_timeout_ms: 10_000,
        }
    }
}
