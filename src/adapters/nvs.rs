//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`ConfigPort`] for the smart-meter reader.  The whole
//! [`SystemConfig`] is stored as a single postcard blob under
//! `smartmeter::syscfg`.
//!
//! - Config validation: all fields are range-checked before persistence.
//! - Atomic writes: ESP-IDF NVS commits are atomic per blob.
//! - The simulation backend keeps the blob in memory (dev/test only).

use core::cell::RefCell;

use log::info;

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::{StaticIp, SystemConfig};

use super::utils::{is_printable_ascii, is_topic_segment};

#[cfg(feature = "espidf")]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

const CONFIG_NAMESPACE: &str = "smartmeter";
const CONFIG_KEY: &str = "syscfg";

const MAX_BLOB_SIZE: usize = 512;

pub struct NvsAdapter {
    #[cfg(feature = "espidf")]
    nvs: RefCell<EspNvs<NvsDefault>>,
    #[cfg(not(feature = "espidf"))]
    blob: RefCell<Option<Vec<u8>>>,
}

impl NvsAdapter {
    /// Open the config namespace on the default NVS partition.
    ///
    /// The same partition handle is shared with the WiFi driver.
    #[cfg(feature = "espidf")]
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self, ConfigError> {
        let nvs = EspNvs::new(partition, CONFIG_NAMESPACE, true).map_err(|e| {
            log::warn!("NvsAdapter: open '{}' failed: {}", CONFIG_NAMESPACE, e);
            ConfigError::IoError
        })?;
        info!("NvsAdapter: ESP-IDF NVS namespace '{}' open", CONFIG_NAMESPACE);
        Ok(Self {
            nvs: RefCell::new(nvs),
        })
    }

    #[cfg(not(feature = "espidf"))]
    pub fn new() -> Result<Self, ConfigError> {
        info!("NvsAdapter: simulation backend");
        Ok(Self {
            blob: RefCell::new(None),
        })
    }

    #[cfg(feature = "espidf")]
    fn read_blob(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        let nvs = self.nvs.borrow();
        let found = nvs
            .get_blob(CONFIG_KEY, &mut buf)
            .map_err(|_| ConfigError::IoError)?;
        Ok(found.map(<[u8]>::to_vec))
    }

    #[cfg(not(feature = "espidf"))]
    fn read_blob(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        Ok(self.blob.borrow().clone())
    }

    #[cfg(feature = "espidf")]
    fn write_blob(&self, bytes: &[u8]) -> Result<(), ConfigError> {
        self.nvs
            .borrow_mut()
            .set_blob(CONFIG_KEY, bytes)
            .map_err(|_| ConfigError::IoError)
    }

    #[cfg(not(feature = "espidf"))]
    fn write_blob(&self, bytes: &[u8]) -> Result<(), ConfigError> {
        *self.blob.borrow_mut() = Some(bytes.to_vec());
        Ok(())
    }
}

pub(crate) fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigError> {
    if !cfg.deployment_id.is_empty() && !is_topic_segment(&cfg.deployment_id) {
        return Err(ConfigError::ValidationFailed(
            "deployment_id must be printable ASCII without '/', '+' or '#'",
        ));
    }
    if !is_printable_ascii(&cfg.mqtt_host) || cfg.mqtt_host.is_empty() {
        return Err(ConfigError::ValidationFailed(
            "mqtt_host must be non-empty printable ASCII",
        ));
    }
    if cfg.mqtt_port == 0 {
        return Err(ConfigError::ValidationFailed("mqtt_port must be 1–65535"));
    }
    if !(10..=3600).contains(&cfg.mqtt_keepalive_secs) {
        return Err(ConfigError::ValidationFailed(
            "mqtt_keepalive_secs must be 10–3600",
        ));
    }
    if !(300..=115_200).contains(&cfg.uart_baud) {
        return Err(ConfigError::ValidationFailed(
            "uart_baud must be 300–115200",
        ));
    }
    if !(1..=1000).contains(&cfg.trailer_wait_ms) {
        return Err(ConfigError::ValidationFailed(
            "trailer_wait_ms must be 1–1000",
        ));
    }
    if !(500..=60_000).contains(&cfg.frame_timeout_ms) {
        return Err(ConfigError::ValidationFailed(
            "frame_timeout_ms must be 500–60000",
        ));
    }
    if cfg.trailer_wait_ms >= cfg.frame_timeout_ms {
        return Err(ConfigError::ValidationFailed(
            "trailer_wait_ms must be < frame_timeout_ms",
        ));
    }
    if cfg.publish_interval_ms > 86_400_000 {
        return Err(ConfigError::ValidationFailed(
            "publish_interval_ms must be at most one day",
        ));
    }
    if !(1..=1000).contains(&cfg.loop_yield_ms) {
        return Err(ConfigError::ValidationFailed("loop_yield_ms must be 1–1000"));
    }
    if !(1000..=60_000).contains(&cfg.watchdog_timeout_ms) {
        return Err(ConfigError::ValidationFailed(
            "watchdog_timeout_ms must be 1000–60000",
        ));
    }
    if cfg.loop_yield_ms + cfg.trailer_wait_ms >= cfg.watchdog_timeout_ms {
        return Err(ConfigError::ValidationFailed(
            "watchdog_timeout_ms must exceed one loop iteration",
        ));
    }
    if let Some(static_ip) = &cfg.static_ip {
        validate_static_ip(static_ip)?;
    }
    if !cfg.ota_password.is_empty() {
        if cfg.ota_port == 0 {
            return Err(ConfigError::ValidationFailed("ota_port must be 1–65535"));
        }
        if cfg.ota_password.len() < 8
            || !is_printable_ascii(&cfg.ota_password)
            || cfg.ota_password.contains(' ')
        {
            return Err(ConfigError::ValidationFailed(
                "ota_password must be 8–32 printable ASCII bytes without spaces",
            ));
        }
    }
    Ok(())
}

fn validate_static_ip(s: &StaticIp) -> Result<(), ConfigError> {
    let Some(prefix) = s.prefix_len().filter(|p| (1..=30).contains(p)) else {
        return Err(ConfigError::ValidationFailed(
            "static_ip subnet must be a contiguous mask of /1–/30",
        ));
    };
    if s.ip == [0; 4] {
        return Err(ConfigError::ValidationFailed("static_ip address must be set"));
    }
    let mask = u32::MAX << (32 - u32::from(prefix));
    let network = |addr: [u8; 4]| u32::from_be_bytes(addr) & mask;
    if network(s.ip) != network(s.gateway) {
        return Err(ConfigError::ValidationFailed(
            "static_ip gateway must be inside the subnet",
        ));
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let Some(bytes) = self.read_blob()? else {
            info!("NvsAdapter: no stored config, using defaults");
            return Ok(SystemConfig::default());
        };
        let cfg: SystemConfig = postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
        validate_config(&cfg)?;
        info!("NvsAdapter: loaded config ({} bytes)", bytes.len());
        Ok(cfg)
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(ConfigError::IoError);
        }
        self.write_blob(&bytes)?;
        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}
