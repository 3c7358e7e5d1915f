//! Delivery gate — throttled forwarding of register readings.
//!
//! Readings are forwarded at most once per `interval_ms`, measured from the
//! last successful forward.  The first forward after boot goes out
//! immediately.  Each (re)connection of the publish channel is announced
//! once with `"online"` on the status topic.
//!
//! ```text
//! <id>/energy/status      ← "online"
//! <id>/energy/sml/Bezug   ← 1.8.0, 3 decimals
//! <id>/energy/sml/Abgabe  ← 2.8.0, 3 decimals
//! ```

use core::fmt::Write;

use heapless::String;
use log::{debug, info};

use crate::app::ports::PublishPort;
use crate::error::PublishError;
use crate::sml::registers::{Readings, Register};

/// Longest topic the gate will build.
pub const TOPIC_CAP: usize = 64;

pub type Topic = String<TOPIC_CAP>;

/// Payload sent on the status topic after each (re)connection.
pub const ONLINE_PAYLOAD: &str = "online";
/// Last-will payload registered with the broker.
pub const OFFLINE_PAYLOAD: &str = "offline";

/// Spacing between attempts when the status announcement is refused.
pub const ANNOUNCE_RETRY_MS: u64 = 5_000;

/// Deployment-scoped topic names, built once at start-up.
#[derive(Debug, Clone)]
pub struct Topics {
    status: Topic,
    readings: [Topic; 2],
}

impl Topics {
    pub fn new(deployment_id: &str) -> Result<Self, PublishError> {
        Ok(Self {
            status: topic(deployment_id, "/energy/status")?,
            readings: [
                reading_topic(deployment_id, Register::Import)?,
                reading_topic(deployment_id, Register::Export)?,
            ],
        })
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn reading(&self, register: Register) -> &str {
        match register {
            Register::Import => &self.readings[0],
            Register::Export => &self.readings[1],
        }
    }
}

fn topic(deployment_id: &str, suffix: &str) -> Result<Topic, PublishError> {
    let mut t = Topic::new();
    write!(t, "{deployment_id}{suffix}").map_err(|_| PublishError::TooLong)?;
    Ok(t)
}

fn reading_topic(deployment_id: &str, register: Register) -> Result<Topic, PublishError> {
    let mut t = Topic::new();
    write!(t, "{deployment_id}/energy/sml/{}", register.channel())
        .map_err(|_| PublishError::TooLong)?;
    Ok(t)
}

/// Fixed 3-decimal rendering used on the wire.
///
/// Every decoded register (`i64 / 10 000`) fits; only a value beyond
/// ±1e19 would report [`PublishError::TooLong`].
pub fn format_reading(value: f64) -> Result<String<24>, PublishError> {
    let mut s = String::new();
    write!(s, "{value:.3}").map_err(|_| PublishError::TooLong)?;
    Ok(s)
}

/// Duration-based throttle in front of the publish port.
pub struct DeliveryGate {
    topics: Topics,
    interval_ms: u64,
    last_forward_ms: Option<u64>,
    online_announced: bool,
    /// Earliest retry after a refused announcement on this connection.
    announce_retry_at_ms: Option<u64>,
}

impl DeliveryGate {
    pub fn new(topics: Topics, interval_ms: u64) -> Self {
        Self {
            topics,
            interval_ms,
            last_forward_ms: None,
            online_announced: false,
            announce_retry_at_ms: None,
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Whether a forward at `now_ms` would go out.
    pub fn is_due(&self, now_ms: u64) -> bool {
        match self.last_forward_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) > self.interval_ms,
        }
    }

    /// Publish `"online"` once per connection.  Returns `Ok(true)` when the
    /// announcement was sent on this call.
    ///
    /// A refused announcement is retried every [`ANNOUNCE_RETRY_MS`] while
    /// the connection stays up; calls in between return `Ok(false)`.
    pub fn announce_if_reconnected(
        &mut self,
        publisher: &mut impl PublishPort,
        now_ms: u64,
    ) -> Result<bool, PublishError> {
        if !publisher.is_connected() {
            if self.online_announced {
                info!("Delivery: channel lost");
            }
            self.online_announced = false;
            self.announce_retry_at_ms = None;
            return Ok(false);
        }
        if self.online_announced {
            return Ok(false);
        }
        if self.announce_retry_at_ms.is_some_and(|at| now_ms < at) {
            return Ok(false);
        }
        if let Err(e) = publisher.publish(self.topics.status(), ONLINE_PAYLOAD, true) {
            self.announce_retry_at_ms = Some(now_ms.saturating_add(ANNOUNCE_RETRY_MS));
            return Err(e);
        }
        self.online_announced = true;
        self.announce_retry_at_ms = None;
        info!("Delivery: announced online on '{}'", self.topics.status());
        Ok(true)
    }

    /// Forward both readings if the interval has elapsed.
    ///
    /// Returns `Ok(false)` when throttled.  The interval restarts only
    /// after both readings were accepted.
    pub fn forward(
        &mut self,
        readings: &Readings,
        publisher: &mut impl PublishPort,
        now_ms: u64,
    ) -> Result<bool, PublishError> {
        if !self.is_due(now_ms) {
            return Ok(false);
        }
        if !publisher.is_connected() {
            return Err(PublishError::NotConnected);
        }
        for register in Register::ALL {
            let payload = format_reading(readings.get(register))?;
            publisher.publish(self.topics.reading(register), &payload, false)?;
            debug!("Delivery: {} = {}", register, payload);
        }
        self.last_forward_ms = Some(now_ms);
        Ok(true)
    }
}
