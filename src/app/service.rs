//! Application service — the hexagonal core.
//!
//! [`MeterService`] owns the frame scanner, the latest readings and the
//! delivery gate.  All I/O flows through port traits injected at call
//! sites, making the entire pipeline testable with mock adapters.
//!
//! ```text
//!  ByteSource ──▶ ┌──────────────────────────┐ ──▶ PublishPort
//!                 │       MeterService        │
//!                 │ Scanner · CRC · Registers │ ──▶ EventSink
//!                 └──────────────────────────┘
//! ```

use embedded_hal::delay::DelayNs;
use log::info;

use crate::config::SystemConfig;
use crate::delivery::{DeliveryGate, Topics};
use crate::diagnostics::ScanStats;
use crate::error::Error;
use crate::sml::crc::{self, CrcCheck, CrcPolicy};
use crate::sml::registers::{self, Readings};
use crate::sml::scanner::{DiscardReason, FrameScanner, ScanOutcome};

use super::events::AppEvent;
use super::ports::{ByteSource, EventSink, PublishPort};

// ───────────────────────────────────────────────────────────────
// MeterService
// ───────────────────────────────────────────────────────────────

pub struct MeterService {
    scanner: FrameScanner,
    readings: Readings,
    gate: DeliveryGate,
    crc_policy: CrcPolicy,
    stats: ScanStats,
}

impl MeterService {
    /// Fails only if `deployment_id` is too long to form a topic.
    pub fn new(config: &SystemConfig, deployment_id: &str) -> Result<Self, Error> {
        let topics = Topics::new(deployment_id)?;
        Ok(Self {
            scanner: FrameScanner::new(config.scan_limits()),
            readings: Readings::new(),
            gate: DeliveryGate::new(topics, u64::from(config.publish_interval_ms)),
            crc_policy: config.crc_policy,
            stats: ScanStats::default(),
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub fn start(&mut self, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::Started);
        info!(
            "MeterService started (status topic '{}', crc {:?})",
            self.gate.topics().status(),
            self.crc_policy
        );
    }

    // ── Per-iteration orchestration ───────────────────────────

    /// Run one loop iteration: announce a fresh connection, drain the
    /// byte source and process at most one completed frame.
    pub fn poll<S, D>(
        &mut self,
        source: &mut S,
        delay: &mut D,
        publisher: &mut impl PublishPort,
        sink: &mut impl EventSink,
        now_ms: u64,
    ) -> ScanOutcome
    where
        S: ByteSource + ?Sized,
        D: DelayNs + ?Sized,
    {
        // 1. Announce "online" on each new session
        match self.gate.announce_if_reconnected(publisher, now_ms) {
            Ok(true) => {
                self.stats.reconnects = self.stats.reconnects.saturating_add(1);
                sink.emit(&AppEvent::ChannelOnline);
            }
            Ok(false) => {}
            Err(e) => {
                self.stats.publish_failures = self.stats.publish_failures.saturating_add(1);
                sink.emit(&AppEvent::PublishFailed(e));
            }
        }

        // 2. Scan
        let outcome = self.scanner.poll(source, delay, now_ms);
        match outcome {
            ScanOutcome::FrameReady => {
                self.process_frame(publisher, sink, now_ms);
                self.scanner.release();
            }
            ScanOutcome::Discarded(reason) => {
                self.stats.record_discard(reason);
                sink.emit(&AppEvent::FrameDiscarded(reason));
            }
            ScanOutcome::Pending => {}
        }
        outcome
    }

    // ── Queries ───────────────────────────────────────────────

    /// Latest value per register; `-2.0` until first decoded.
    pub fn readings(&self) -> &Readings {
        &self.readings
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    pub fn scanner(&self) -> &FrameScanner {
        &self.scanner
    }

    // ── Internal ──────────────────────────────────────────────

    /// CRC check → register extraction → throttled forward.
    fn process_frame(
        &mut self,
        publisher: &mut impl PublishPort,
        sink: &mut impl EventSink,
        now_ms: u64,
    ) {
        let Some(frame) = self.scanner.frame() else {
            return;
        };
        self.stats.frames_completed = self.stats.frames_completed.saturating_add(1);

        if self.crc_policy != CrcPolicy::Ignore {
            if let CrcCheck::Mismatch {
                computed,
                transmitted,
            } = crc::check_frame(frame)
            {
                self.stats.crc_mismatches = self.stats.crc_mismatches.saturating_add(1);
                sink.emit(&AppEvent::CrcMismatch {
                    computed,
                    transmitted,
                });
                if self.crc_policy == CrcPolicy::Reject {
                    self.stats.record_discard(DiscardReason::CrcMismatch);
                    sink.emit(&AppEvent::FrameDiscarded(DiscardReason::CrcMismatch));
                    return;
                }
            }
        }

        let matches = registers::extract(frame, &mut self.readings);
        sink.emit(&AppEvent::FrameDecoded {
            len: frame.len(),
            matches,
            readings: self.readings,
        });

        match self.gate.forward(&self.readings, publisher, now_ms) {
            Ok(true) => {
                self.stats.publishes = self.stats.publishes.saturating_add(1);
                sink.emit(&AppEvent::ReadingsPublished(self.readings));
                sink.emit(&AppEvent::Stats(self.stats));
            }
            Ok(false) => {}
            Err(e) => {
                self.stats.publish_failures = self.stats.publish_failures.saturating_add(1);
                sink.emit(&AppEvent::PublishFailed(e));
            }
        }
    }
}
