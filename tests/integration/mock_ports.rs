//! Mock adapters for integration tests.
//!
//! Records every publish and event so tests can assert on the full
//! history without a UART or a broker.

use std::cell::RefCell;
use std::collections::VecDeque;

use embedded_hal::delay::DelayNs;
use smartmeter::app::events::AppEvent;
use smartmeter::app::ports::{ByteSource, ConfigError, ConfigPort, EventSink, PublishPort};
use smartmeter::config::SystemConfig;
use smartmeter::error::PublishError;
use smartmeter::sml::crc::crc16_x25;
use smartmeter::sml::registers::{EXPORT_SIGNATURE, IMPORT_SIGNATURE};
use smartmeter::sml::{END_SEQUENCE, START_SEQUENCE};

// ── Frame builders ────────────────────────────────────────────

/// 1.8.0 entry: signature followed by the 8-byte big-endian value.
pub fn import_entry(raw: i64) -> Vec<u8> {
    let mut v = IMPORT_SIGNATURE.to_vec();
    v.extend_from_slice(&raw.to_be_bytes());
    v
}

/// 2.8.0 entry: signature followed by the 8-byte big-endian value.
pub fn export_entry(raw: i64) -> Vec<u8> {
    let mut v = EXPORT_SIGNATURE.to_vec();
    v.extend_from_slice(&raw.to_be_bytes());
    v
}

/// Wrap `body` in start/end sequences and a valid trailer.
pub fn frame(body: &[u8]) -> Vec<u8> {
    let mut v = START_SEQUENCE.to_vec();
    v.extend_from_slice(body);
    v.extend_from_slice(&END_SEQUENCE);
    v.push(0x00);
    let crc = crc16_x25(&v);
    v.extend_from_slice(&crc.to_le_bytes());
    v
}

/// A frame carrying both registers, the common case.
pub fn meter_frame(import_raw: i64, export_raw: i64) -> Vec<u8> {
    let mut body = vec![0x76, 0x05, 0x01, 0x02];
    body.extend(import_entry(import_raw));
    body.extend([0x01, 0x01]);
    body.extend(export_entry(export_raw));
    body.extend([0x01, 0x01]);
    frame(&body)
}

// ── MockMeter ─────────────────────────────────────────────────

/// Byte source with an optional lag: once `lag_at` bytes have been read,
/// the next `lag_polls` calls to `available()` report nothing.
#[derive(Default)]
pub struct MockMeter {
    wire: VecDeque<u8>,
    read: usize,
    lag_at: Option<usize>,
    lag_polls: u32,
}

#[allow(dead_code)]
impl MockMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, bytes: &[u8]) {
        self.wire.extend(bytes.iter().copied());
    }

    pub fn lag_after(&mut self, bytes_read: usize, polls: u32) {
        self.lag_at = Some(bytes_read);
        self.lag_polls = polls;
    }

    pub fn is_drained(&self) -> bool {
        self.wire.is_empty()
    }
}

impl ByteSource for MockMeter {
    fn available(&mut self) -> bool {
        if self.lag_at == Some(self.read) && self.lag_polls > 0 {
            self.lag_polls -= 1;
            return false;
        }
        !self.wire.is_empty()
    }

    fn read_byte(&mut self) -> Option<u8> {
        let b = self.wire.pop_front()?;
        self.read += 1;
        Some(b)
    }
}

// ── MockBroker ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

#[derive(Default)]
pub struct MockBroker {
    pub connected: bool,
    /// Connected but refusing every publish.
    pub rejecting: bool,
    pub messages: Vec<Message>,
}

#[allow(dead_code)]
impl MockBroker {
    pub fn online() -> Self {
        Self {
            connected: true,
            ..Default::default()
        }
    }

    pub fn offline() -> Self {
        Self::default()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload.as_str())
            .collect()
    }
}

impl PublishPort for MockBroker {
    fn publish(&mut self, topic: &str, payload: &str, retain: bool) -> Result<(), PublishError> {
        if !self.connected {
            return Err(PublishError::NotConnected);
        }
        if self.rejecting {
            return Err(PublishError::Rejected);
        }
        self.messages.push(Message {
            topic: topic.into(),
            payload: payload.into(),
            retain,
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ── EventLog ──────────────────────────────────────────────────

#[derive(Default)]
pub struct EventLog {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Delays ────────────────────────────────────────────────────

/// Delay that only counts the milliseconds it was asked to wait.
#[derive(Default)]
pub struct CountingDelay {
    pub waited_ms: u32,
}

impl DelayNs for CountingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.waited_ms += ns / 1_000_000;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.waited_ms += ms;
    }
}

// ── MockNvs ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MockNvs {
    stored: RefCell<Option<SystemConfig>>,
}

#[allow(dead_code)]
impl MockNvs {
    pub fn with(config: SystemConfig) -> Self {
        Self {
            stored: RefCell::new(Some(config)),
        }
    }
}

impl ConfigPort for MockNvs {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        Ok(self.stored.borrow().clone().unwrap_or_default())
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        *self.stored.borrow_mut() = Some(config.clone());
        Ok(())
    }
}
