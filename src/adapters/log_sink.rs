//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART0 / USB-CDC in production).

use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started => {
                info!("START | scanning for SML frames");
            }
            AppEvent::FrameDecoded {
                len,
                matches,
                readings,
            } => {
                debug!(
                    "FRAME | {} bytes | {} match(es) | Bezug={:.3} Abgabe={:.3}",
                    len,
                    matches,
                    readings.import_kwh(),
                    readings.export_kwh(),
                );
            }
            AppEvent::FrameDiscarded(reason) => {
                warn!("DROP  | {}", reason);
            }
            AppEvent::CrcMismatch {
                computed,
                transmitted,
            } => {
                warn!(
                    "CRC   | computed=0x{:04X} transmitted=0x{:04X}",
                    computed, transmitted
                );
            }
            AppEvent::ChannelOnline => {
                info!("LINK  | broker session up, announced online");
            }
            AppEvent::ReadingsPublished(r) => {
                info!(
                    "PUB   | Bezug={:.3} kWh | Abgabe={:.3} kWh",
                    r.import_kwh(),
                    r.export_kwh(),
                );
            }
            AppEvent::PublishFailed(e) => {
                warn!("PUB   | failed: {}", e);
            }
            AppEvent::Stats(s) => match serde_json::to_string(s) {
                Ok(json) => info!("STATS | {}", json),
                Err(_) => info!("STATS | {:?}", s),
            },
        }
    }
}
