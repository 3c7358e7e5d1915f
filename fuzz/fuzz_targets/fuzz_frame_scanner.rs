//! Fuzz target: `FrameScanner::poll`
//!
//! Drives arbitrary byte sequences through the streaming frame scanner and
//! asserts that it never panics, never overruns its buffer, and that
//! every emitted frame is correctly delimited.
//!
//! cargo fuzz run fuzz_frame_scanner

#![no_main]

use std::collections::VecDeque;

use embedded_hal::delay::DelayNs;
use libfuzzer_sys::fuzz_target;
use smartmeter::sml::crc::check_frame;
use smartmeter::sml::scanner::{FrameScanner, ScanLimits, ScanOutcome};
use smartmeter::sml::{END_SEQUENCE, FRAME_CAPACITY, START_SEQUENCE, TRAILER_LEN};

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

fuzz_target!(|data: &[u8]| {
    let mut scanner = FrameScanner::new(ScanLimits::default());
    let mut source: VecDeque<u8> = data.iter().copied().collect();

    loop {
        match scanner.poll(&mut source, &mut NoDelay, 0) {
            ScanOutcome::Pending => break,
            ScanOutcome::FrameReady => {
                let Some(frame) = scanner.frame() else {
                    panic!("FrameReady without a frame");
                };
                assert!(frame.len() <= FRAME_CAPACITY, "frame exceeds capacity");
                assert!(frame.starts_with(&START_SEQUENCE));
                let body_end = frame.len() - TRAILER_LEN;
                assert!(frame[..body_end].ends_with(&END_SEQUENCE));
                let _ = check_frame(frame);
                scanner.release();
            }
            ScanOutcome::Discarded(_) => {}
        }
        assert!(scanner.cursor() <= FRAME_CAPACITY);
    }
});
