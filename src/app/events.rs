//! Outbound application events.
//!
//! The [`MeterService`](super::service::MeterService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them, usually logging to the serial console.

use crate::diagnostics::ScanStats;
use crate::error::PublishError;
use crate::sml::registers::Readings;
use crate::sml::scanner::DiscardReason;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The service has started.
    Started,

    /// A frame was closed and its registers extracted.
    FrameDecoded {
        len: usize,
        /// Number of register signatures that yielded a value.
        matches: usize,
        readings: Readings,
    },

    /// An open or completed frame was dropped.
    FrameDiscarded(DiscardReason),

    /// Trailer checksum did not match the frame contents.
    CrcMismatch { computed: u16, transmitted: u16 },

    /// The publish channel came (back) up and `"online"` was announced.
    ChannelOnline,

    /// Both readings were handed to the publish port.
    ReadingsPublished(Readings),

    PublishFailed(PublishError),

    /// Counter snapshot, emitted after each forward.
    Stats(ScanStats),
}
