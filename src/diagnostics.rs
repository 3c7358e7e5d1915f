//! Runtime diagnostics.
//!
//! [`ScanStats`] counts every way a frame can end and every delivery
//! attempt.  The counters are logged alongside each forwarded reading pair
//! so a field unit's health can be read straight off the serial console.

use serde::Serialize;

use crate::sml::scanner::DiscardReason;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub frames_completed: u32,
    pub frames_overflowed: u32,
    pub frames_stalled: u32,
    pub trailers_truncated: u32,
    pub crc_mismatches: u32,
    /// Frames rejected under the `Reject` CRC policy.
    pub frames_rejected: u32,
    pub publishes: u32,
    pub publish_failures: u32,
    pub reconnects: u32,
}

impl ScanStats {
    pub fn record_discard(&mut self, reason: DiscardReason) {
        let counter = match reason {
            DiscardReason::Overflow => &mut self.frames_overflowed,
            DiscardReason::Stalled => &mut self.frames_stalled,
            DiscardReason::TruncatedTrailer => &mut self.trailers_truncated,
            DiscardReason::CrcMismatch => &mut self.frames_rejected,
        };
        *counter = counter.saturating_add(1);
    }

    /// Frames dropped for any reason.
    pub fn frames_discarded(&self) -> u32 {
        self.frames_overflowed
            .saturating_add(self.frames_stalled)
            .saturating_add(self.trailers_truncated)
            .saturating_add(self.frames_rejected)
    }
}

// ───────────────────────────────────────────────────────────────
// Panic hook
// ───────────────────────────────────────────────────────────────

/// Log the panic reason before the default handler resets the chip.
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };
        match info.location() {
            Some(loc) => log::error!("PANIC: {} at {}:{}", reason, loc.file(), loc.line()),
            None => log::error!("PANIC: {}", reason),
        }
    }));
}
