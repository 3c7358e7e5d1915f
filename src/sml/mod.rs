//! SML (Smart Message Language) transport framing and register extraction.
//!
//! The meter's optical interface emits a continuous byte stream.  Each
//! message is delimited by escape sequences:
//!
//! ```text
//! ┌──────────────────────────┬───────────┬────────────────┬──────┬─────────┐
//! │ 1B 1B 1B 1B 01 01 01 01  │  payload  │ 1B 1B 1B 1B 1A │ fill │ CRC (2) │
//! │ start (8)                │  (N)      │ end (5)        │ (1)  │         │
//! └──────────────────────────┴───────────┴────────────────┴──────┴─────────┘
//! ```
//!
//! The [`scanner`] assembles frames byte by byte into a bounded
//! [`frame::FrameBuffer`]; [`registers`] pulls the two energy counters out of
//! a completed frame by fixed byte signature; [`crc`] checks the trailer.

pub mod crc;
pub mod frame;
pub mod registers;
pub mod scanner;

/// Start-of-message escape sequence.
pub const START_SEQUENCE: [u8; 8] = [0x1B, 0x1B, 0x1B, 0x1B, 0x01, 0x01, 0x01, 0x01];

/// End-of-message escape sequence.  Followed by [`TRAILER_LEN`] bytes.
pub const END_SEQUENCE: [u8; 5] = [0x1B, 0x1B, 0x1B, 0x1B, 0x1A];

/// Fill-byte count plus the two CRC bytes.
pub const TRAILER_LEN: usize = 3;

/// Frame buffer capacity.  Observed messages are ~280 bytes.
pub const FRAME_CAPACITY: usize = 700;

/// Frame buffer sized for this meter.
pub type SmlFrame = frame::FrameBuffer<FRAME_CAPACITY>;
