//! Streaming frame scanner.
//!
//! ```text
//!            start matched              end matched + trailer read
//! SeekingStart ─────────────▶ SeekingEnd ───────────────────────▶ ReadyToEmit
//!      ▲                          │                                   │
//!      └──── overflow / stall / ──┘                                   │
//!      └──── truncated trailer                                        │
//!      └────────────────────────── release() ─────────────────────────┘
//! ```
//!
//! Both delimiters are matched with a single forward counter.  On a
//! mismatch the counter drops to zero and the offending byte is **not**
//! re-tested against position 0, so a run such as `1B ×5, 01 ×4` is not
//! recognised as a start sequence.  The meter never emits such runs
//! outside an escape, and the behaviour is kept for compatibility.

use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use super::{END_SEQUENCE, SmlFrame, START_SEQUENCE, TRAILER_LEN};
use crate::app::ports::ByteSource;
use crate::error::FrameError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    SeekingStart,
    SeekingEnd,
    /// A complete frame is held; no input is consumed until [`FrameScanner::release`].
    ReadyToEmit,
}

/// Why an in-progress frame was thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Frame grew past the buffer capacity.
    Overflow,
    /// End sequence not seen within the frame timeout.
    Stalled,
    /// Trailer bytes did not arrive within the wait budget.
    TruncatedTrailer,
    /// Trailer CRC mismatch under [`CrcPolicy::Reject`](super::crc::CrcPolicy::Reject).
    CrcMismatch,
}

impl core::fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Overflow => write!(f, "buffer overflow"),
            Self::Stalled => write!(f, "end sequence timeout"),
            Self::TruncatedTrailer => write!(f, "trailer incomplete"),
            Self::CrcMismatch => write!(f, "CRC mismatch"),
        }
    }
}

/// Result of one [`FrameScanner::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Source drained, no frame finished yet.
    Pending,
    /// [`FrameScanner::frame`] holds a complete frame.
    FrameReady,
    /// The open frame was dropped and scanning restarted.
    Discarded(DiscardReason),
}

/// Timing bounds for an open frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    /// Total time to wait for the 3 trailer bytes after the end sequence.
    pub trailer_wait_ms: u32,
    /// Maximum time a frame may stay open in `SeekingEnd`.
    pub frame_timeout_ms: u64,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            trailer_wait_ms: 30,
            frame_timeout_ms: 5_000,
        }
    }
}

/// Scanner context: state, both match counters and the frame buffer.
pub struct FrameScanner {
    state: ScanState,
    start_idx: usize,
    end_idx: usize,
    frame: SmlFrame,
    opened_at_ms: u64,
    limits: ScanLimits,
}

impl FrameScanner {
    pub fn new(limits: ScanLimits) -> Self {
        Self {
            state: ScanState::SeekingStart,
            start_idx: 0,
            end_idx: 0,
            frame: SmlFrame::new(),
            opened_at_ms: 0,
            limits,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Bytes of the start sequence matched so far.
    pub fn start_progress(&self) -> usize {
        self.start_idx
    }

    /// Bytes of the end sequence matched so far.
    pub fn end_progress(&self) -> usize {
        self.end_idx
    }

    /// Write cursor into the frame buffer.
    pub fn cursor(&self) -> usize {
        self.frame.len()
    }

    /// The completed frame, only while in `ReadyToEmit`.
    pub fn frame(&self) -> Option<&SmlFrame> {
        (self.state == ScanState::ReadyToEmit).then_some(&self.frame)
    }

    /// Drain `source` until it is empty or a frame completes.
    ///
    /// Once a frame is ready this returns [`ScanOutcome::FrameReady`]
    /// without reading further input until [`release`](Self::release).
    pub fn poll<S, D>(&mut self, source: &mut S, delay: &mut D, now_ms: u64) -> ScanOutcome
    where
        S: ByteSource + ?Sized,
        D: DelayNs + ?Sized,
    {
        match self.state {
            ScanState::ReadyToEmit => return ScanOutcome::FrameReady,
            ScanState::SeekingEnd if self.is_stalled(now_ms) => {
                return self.abandon(DiscardReason::Stalled);
            }
            _ => {}
        }

        while source.available() {
            let Some(byte) = source.read_byte() else {
                break;
            };
            match self.state {
                ScanState::SeekingStart => self.seek_start(byte, now_ms),
                ScanState::SeekingEnd => match self.seek_end(byte) {
                    Ok(false) => {}
                    Ok(true) => {
                        return match self.read_trailer(source, delay) {
                            Ok(()) => {
                                self.state = ScanState::ReadyToEmit;
                                debug!("SML: frame complete ({} bytes)", self.frame.len());
                                ScanOutcome::FrameReady
                            }
                            Err(reason) => self.abandon(reason),
                        };
                    }
                    Err(_) => return self.abandon(DiscardReason::Overflow),
                },
                ScanState::ReadyToEmit => return ScanOutcome::FrameReady,
            }
        }
        ScanOutcome::Pending
    }

    /// Hand the buffer back after extraction and restart scanning.
    pub fn release(&mut self) {
        self.reset();
    }

    fn seek_start(&mut self, byte: u8, now_ms: u64) {
        if byte != START_SEQUENCE[self.start_idx] {
            self.start_idx = 0;
            self.frame.clear();
            return;
        }
        // start_idx < START_SEQUENCE.len() < capacity, so push cannot fail.
        if self.frame.push(byte).is_err() {
            self.reset();
            return;
        }
        self.start_idx += 1;
        if self.start_idx == START_SEQUENCE.len() {
            self.state = ScanState::SeekingEnd;
            self.start_idx = 0;
            self.opened_at_ms = now_ms;
        }
    }

    /// Append `byte`; `Ok(true)` once the end sequence is complete.
    fn seek_end(&mut self, byte: u8) -> Result<bool, FrameError> {
        self.frame.push(byte)?;
        if byte == END_SEQUENCE[self.end_idx] {
            self.end_idx += 1;
            if self.end_idx == END_SEQUENCE.len() {
                self.end_idx = 0;
                return Ok(true);
            }
        } else {
            self.end_idx = 0;
        }
        Ok(false)
    }

    fn read_trailer<S, D>(&mut self, source: &mut S, delay: &mut D) -> Result<(), DiscardReason>
    where
        S: ByteSource + ?Sized,
        D: DelayNs + ?Sized,
    {
        let mut waited_ms = 0;
        for _ in 0..TRAILER_LEN {
            let byte = loop {
                if source.available() {
                    if let Some(b) = source.read_byte() {
                        break b;
                    }
                }
                if waited_ms >= self.limits.trailer_wait_ms {
                    return Err(DiscardReason::TruncatedTrailer);
                }
                delay.delay_ms(1);
                waited_ms += 1;
            };
            self.frame
                .push(byte)
                .map_err(|_| DiscardReason::Overflow)?;
        }
        Ok(())
    }

    fn is_stalled(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.opened_at_ms) > self.limits.frame_timeout_ms
    }

    fn abandon(&mut self, reason: DiscardReason) -> ScanOutcome {
        warn!(
            "SML: discarding frame after {} bytes ({})",
            self.frame.len(),
            reason
        );
        self.reset();
        ScanOutcome::Discarded(reason)
    }

    fn reset(&mut self) {
        self.frame.clear();
        self.start_idx = 0;
        self.end_idx = 0;
        self.state = ScanState::SeekingStart;
    }
}
