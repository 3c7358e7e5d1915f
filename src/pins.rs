//! GPIO / peripheral pin assignments for the reader board.
//!
//! Single source of truth.  `main.rs` takes the matching `Peripherals`
//! fields; these constants document the wiring and are logged at boot.

// ---------------------------------------------------------------------------
// Optical head (IR phototransistor / LED on the meter's D0 interface)
// ---------------------------------------------------------------------------

/// UART1 RX: IR receiver facing the meter's transmit LED.
pub const OPTICAL_RX_GPIO: i32 = 4;
/// UART1 TX: IR LED (unused by push-mode meters, kept wired).
pub const OPTICAL_TX_GPIO: i32 = 5;

/// UART peripheral used for the optical head.
pub const OPTICAL_UART: u8 = 1;

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

/// UART0 stays on the USB bridge for logging.
pub const CONSOLE_UART: u8 = 0;
