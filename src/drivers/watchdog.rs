//! Task Watchdog Timer (TWDT) driver.
//!
//! Wraps the ESP-IDF TWDT API to reset the device if the main loop
//! stalls for longer than the configured timeout (default 10 s).
//!
//! The main loop must call `feed()` on every iteration.  A frame that
//! waits out its whole trailer budget still feeds well inside the timeout.

#[cfg(feature = "espidf")]
use esp_idf_svc::sys::*;

use log::info;

pub struct Watchdog {
    timeout_ms: u32,
    #[cfg(feature = "espidf")]
    subscribed: bool,
    #[cfg(not(feature = "espidf"))]
    feeds: core::cell::Cell<u64>,
}

impl Watchdog {
    /// Initialise and subscribe the current task to the TWDT.
    pub fn new(timeout_ms: u32) -> Self {
        #[cfg(feature = "espidf")]
        {
            // SAFETY: called once from the main task before the loop starts.
            unsafe {
                let cfg = esp_task_wdt_config_t {
                    timeout_ms,
                    idle_core_mask: 0,
                    trigger_panic: true,
                };
                let ret = esp_task_wdt_reconfigure(&cfg);
                if ret != ESP_OK {
                    log::warn!(
                        "TWDT reconfigure returned {} (may already be configured)",
                        ret
                    );
                }

                let ret = esp_task_wdt_add(core::ptr::null_mut());
                let subscribed = ret == ESP_OK;
                if subscribed {
                    info!("Watchdog: subscribed ({} ms timeout, panic on trigger)", timeout_ms);
                } else {
                    log::warn!("Watchdog: failed to subscribe ({})", ret);
                }

                Self {
                    timeout_ms,
                    subscribed,
                }
            }
        }

        #[cfg(not(feature = "espidf"))]
        {
            info!("Watchdog(sim): {} ms, no-op", timeout_ms);
            Self {
                timeout_ms,
                feeds: core::cell::Cell::new(0),
            }
        }
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Feed the watchdog.  Must be called at least once per timeout.
    pub fn feed(&self) {
        #[cfg(feature = "espidf")]
        {
            if self.subscribed {
                // SAFETY: the current task was subscribed in `new`.
                unsafe {
                    esp_task_wdt_reset();
                }
            }
        }

        #[cfg(not(feature = "espidf"))]
        self.feeds.set(self.feeds.get() + 1);
    }

    /// Simulation: number of `feed()` calls so far.
    #[cfg(not(feature = "espidf"))]
    pub fn feeds(&self) -> u64 {
        self.feeds.get()
    }
}
