//! SML trailer checksum (CRC-16/X.25).
//!
//! Reflected polynomial 0x1021 (0x8408 reversed), init 0xFFFF, final XOR
//! 0xFFFF.  The checksum covers every byte of the message up to and
//! including the fill-byte count, and is transmitted low byte first.

use serde::{Deserialize, Serialize};

use super::frame::FrameBuffer;

/// What to do with a frame whose trailer CRC does not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CrcPolicy {
    /// Never compute the CRC.
    Ignore,
    /// Count and report the mismatch, decode the frame anyway.
    #[default]
    Warn,
    /// Count and report the mismatch, discard the frame.
    Reject,
}

/// Outcome of checking a closed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcCheck {
    Valid,
    Mismatch { computed: u16, transmitted: u16 },
    /// Frame too short to carry a trailer.
    Missing,
}

pub fn crc16_x25(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ 0x8408;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

pub fn check_frame<const N: usize>(frame: &FrameBuffer<N>) -> CrcCheck {
    let Some(transmitted) = frame.transmitted_crc() else {
        return CrcCheck::Missing;
    };
    let computed = crc16_x25(&frame[..frame.len() - 2]);
    if computed == transmitted {
        CrcCheck::Valid
    } else {
        CrcCheck::Mismatch {
            computed,
            transmitted,
        }
    }
}
