//! ESP32 time adapter.
//!
//! - [`SystemClock`] gives the monotonic millisecond timestamp the scanner
//!   and the delivery gate run on.
//! - [`StdDelay`] is the host-side [`DelayNs`] used for the trailer wait.
//!   Device builds use `esp_idf_svc::hal::delay::Delay` instead, which
//!   busy-waits short delays below one FreeRTOS tick.
//!
//! - **`espidf`** wraps `esp_timer_get_time()` from the ESP-IDF
//!   high-resolution timer (microsecond precision, monotonic).
//! - **host** uses `std::time::Instant` for testing and simulation.

use embedded_hal::delay::DelayNs;

/// Monotonic clock since boot.
pub struct SystemClock {
    #[cfg(not(feature = "espidf"))]
    start: std::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(feature = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Microseconds since boot (monotonic).
    #[cfg(feature = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        // SAFETY: esp_timer is started by the IDF before app_main.
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since boot (monotonic).
    #[cfg(not(feature = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Milliseconds since boot.
    pub fn uptime_ms(&self) -> u64 {
        self.uptime_us() / 1_000
    }
}

/// Thread-sleeping delay for host builds.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}
