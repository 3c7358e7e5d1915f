//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   ByteSource ──▶ MeterService ──▶ PublishPort
//!                       │
//!                       └──────────▶ EventSink
//!
//!   UpdatePort  (serviced by the main loop beside the service)
//! ```
//!
//! Driven adapters (UART, MQTT, logger, NVS, update listener) implement
//! these traits.  The
//! [`MeterService`](super::service::MeterService) consumes them via
//! generics, so the scan core never touches hardware directly.

use std::collections::VecDeque;

use crate::config::SystemConfig;
use crate::error::PublishError;

// ───────────────────────────────────────────────────────────────
// Byte source (driven adapter: optical head → domain)
// ───────────────────────────────────────────────────────────────

/// Polled, non-blocking byte stream from the meter.
pub trait ByteSource {
    /// Whether at least one byte can be read right now.
    fn available(&mut self) -> bool;

    /// Take the next byte, or `None` if nothing has arrived.
    fn read_byte(&mut self) -> Option<u8>;
}

/// In-memory source, used by the simulation adapter and tests.
impl ByteSource for VecDeque<u8> {
    fn available(&mut self) -> bool {
        !self.is_empty()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.pop_front()
    }
}

// ───────────────────────────────────────────────────────────────
// Publish port (driven adapter: domain → broker)
// ───────────────────────────────────────────────────────────────

/// Outbound telemetry channel.
///
/// Implementations own reconnection; the domain only asks whether a
/// session is currently up and never blocks waiting for one.
pub trait PublishPort {
    fn publish(&mut self, topic: &str, payload: &str, retain: bool) -> Result<(), PublishError>;

    fn is_connected(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Update port (driving adapter: firmware image → flash)
// ───────────────────────────────────────────────────────────────

/// Progress of the firmware update channel after one service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// No transfer in progress.
    Idle,
    /// An image is being written.
    Receiving { written: u32, total: u32 },
    /// A verified image is set as the boot partition.
    ReadyToReboot,
}

/// Firmware update channel.
///
/// Serviced once per loop iteration.  `service` must not block: it
/// moves a bounded amount of data and returns.
pub trait UpdatePort {
    fn service(&mut self, now_ms: u64) -> UpdateStatus;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate before persisting and reject invalid
/// ranges with [`ConfigError::ValidationFailed`] rather than clamping.
pub trait ConfigPort {
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for ConfigError {}
