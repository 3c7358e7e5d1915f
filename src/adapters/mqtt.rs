//! MQTT publisher adapter.
//!
//! Implements [`PublishPort`] over the ESP-IDF MQTT client.  The client
//! reconnects on its own; a small thread drains the connection events and
//! mirrors the session state into an atomic flag, so
//! [`is_connected`](PublishPort::is_connected) never blocks the main loop.
//!
//! The broker holds a retained last-will of `"offline"` on the status
//! topic; the [`DeliveryGate`](crate::delivery::DeliveryGate) overwrites it
//! with `"online"` after every (re)connection.
//!
//! - **`espidf`**: `EspMqttClient`, QoS 0, publishes are enqueued.
//! - **host**: records publishes in memory; the session is toggled by hand.

use core::fmt::Write;

use log::info;

use crate::app::ports::PublishPort;
use crate::error::PublishError;

#[cfg(feature = "espidf")]
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

#[cfg(feature = "espidf")]
use esp_idf_svc::mqtt::client::{
    EspMqttClient, EventPayload, LwtConfiguration, MqttClientConfiguration, QoS,
};

/// Broker URL buffer: `mqtt://` + host + `:` + port.
pub type BrokerUrl = heapless::String<96>;

/// Connection parameters, borrowed from [`SystemConfig`](crate::config::SystemConfig).
#[derive(Debug, Clone, Copy)]
pub struct MqttSettings<'a> {
    pub host: &'a str,
    pub port: u16,
    pub client_id: &'a str,
    pub keepalive_secs: u16,
    /// Topic carrying the retained last-will.
    pub status_topic: &'a str,
}

impl MqttSettings<'_> {
    pub fn url(&self) -> Result<BrokerUrl, PublishError> {
        let mut url = BrokerUrl::new();
        write!(url, "mqtt://{}:{}", self.host, self.port).map_err(|_| PublishError::TooLong)?;
        Ok(url)
    }
}

#[cfg(feature = "espidf")]
pub struct MqttPublisher {
    client: EspMqttClient<'static>,
    connected: Arc<AtomicBool>,
}

#[cfg(feature = "espidf")]
impl MqttPublisher {
    pub fn new(settings: &MqttSettings<'_>) -> anyhow::Result<Self> {
        let url = settings.url()?;
        let conf = MqttClientConfiguration {
            client_id: Some(settings.client_id),
            keep_alive_interval: Some(core::time::Duration::from_secs(u64::from(
                settings.keepalive_secs,
            ))),
            reconnect_timeout: Some(core::time::Duration::from_secs(5)),
            lwt: Some(LwtConfiguration {
                topic: settings.status_topic,
                payload: crate::delivery::OFFLINE_PAYLOAD.as_bytes(),
                qos: QoS::AtMostOnce,
                retain: true,
            }),
            ..Default::default()
        };
        let (client, mut connection) = EspMqttClient::new(&url, &conf)?;

        let connected = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&connected);
        std::thread::Builder::new()
            .name("mqtt-events".into())
            .stack_size(6 * 1024)
            .spawn(move || {
                while let Ok(event) = connection.next() {
                    match event.payload() {
                        EventPayload::Connected(_) => {
                            info!("MQTT: session up");
                            flag.store(true, Ordering::Release);
                        }
                        EventPayload::Disconnected => {
                            log::warn!("MQTT: session down");
                            flag.store(false, Ordering::Release);
                        }
                        EventPayload::Error(e) => log::warn!("MQTT: {:?}", e),
                        _ => {}
                    }
                }
                flag.store(false, Ordering::Release);
                info!("MQTT: event loop ended");
            })?;

        info!("MQTT: client '{}' -> {}", settings.client_id, url);
        Ok(Self { client, connected })
    }
}

#[cfg(feature = "espidf")]
impl PublishPort for MqttPublisher {
    fn publish(&mut self, topic: &str, payload: &str, retain: bool) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::NotConnected);
        }
        self.client
            .enqueue(topic, QoS::AtMostOnce, retain, payload.as_bytes())
            .map(|_| ())
            .map_err(|e| {
                log::warn!("MQTT: enqueue on '{}' failed: {}", topic, e);
                PublishError::Rejected
            })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

/// One recorded publish.
#[cfg(not(feature = "espidf"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

#[cfg(not(feature = "espidf"))]
pub struct MqttPublisher {
    connected: bool,
    sent: Vec<Published>,
}

#[cfg(not(feature = "espidf"))]
impl MqttPublisher {
    pub fn new(settings: &MqttSettings<'_>) -> anyhow::Result<Self> {
        let url = settings.url()?;
        info!("MQTT(sim): client '{}' -> {}", settings.client_id, url);
        Ok(Self {
            connected: false,
            sent: Vec::new(),
        })
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn published(&self) -> &[Published] {
        &self.sent
    }
}

#[cfg(not(feature = "espidf"))]
impl PublishPort for MqttPublisher {
    fn publish(&mut self, topic: &str, payload: &str, retain: bool) -> Result<(), PublishError> {
        if !self.connected {
            return Err(PublishError::NotConnected);
        }
        self.sent.push(Published {
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
