//! Firmware image writer, backed by the `esp-ota` crate.
//!
//! Flow: `begin(size)` → N × `write` (strictly sequential) → `finalize` → reboot
//!
//! The image goes into the inactive OTA slot.  `finalize` lets ESP-IDF
//! verify it and marks the slot as the next boot partition; nothing
//! changes for the running firmware until the reboot.  Host builds collect
//! the image in memory.

use log::{info, warn};

use crate::error::UpdateError;

/// Largest image accepted: the app slot of a 4 MB two-slot partition table.
pub const MAX_IMAGE_SIZE: u32 = 0x1E_0000;

// ── State machine ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    Receiving {
        expected_size: u32,
        bytes_written: u32,
    },
    ReadyToReboot,
}

pub struct OtaManager {
    state: OtaState,
    /// Last progress decile written to the log.
    reported_decile: u8,
    #[cfg(feature = "espidf")]
    update: Option<esp_ota::OtaUpdate>,
    #[cfg(not(feature = "espidf"))]
    image: Vec<u8>,
}

impl OtaManager {
    pub fn new() -> Self {
        Self {
            state: OtaState::Idle,
            reported_decile: 0,
            #[cfg(feature = "espidf")]
            update: None,
            #[cfg(not(feature = "espidf"))]
            image: Vec::new(),
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    /// Open the inactive slot for an image of `size` bytes.
    pub fn begin(&mut self, size: u32) -> Result<(), UpdateError> {
        if self.state != OtaState::Idle {
            return Err(UpdateError::Busy);
        }
        if size == 0 || size > MAX_IMAGE_SIZE {
            return Err(UpdateError::InvalidSize);
        }

        #[cfg(feature = "espidf")]
        {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("OTA: begin failed: {:?}", e);
                UpdateError::BeginFailed
            })?;
            self.update = Some(update);
        }
        #[cfg(not(feature = "espidf"))]
        {
            self.image.clear();
        }

        self.state = OtaState::Receiving {
            expected_size: size,
            bytes_written: 0,
        };
        self.reported_decile = 0;
        info!("OTA: start ({} bytes)", size);
        Ok(())
    }

    /// Append the next run of image bytes.  Returns the total written.
    pub fn write(&mut self, data: &[u8]) -> Result<u32, UpdateError> {
        let OtaState::Receiving {
            expected_size,
            bytes_written,
        } = self.state
        else {
            return Err(UpdateError::NotReceiving);
        };
        let written = u32::try_from(data.len())
            .ok()
            .and_then(|n| bytes_written.checked_add(n))
            .filter(|w| *w <= expected_size)
            .ok_or(UpdateError::Overflow)?;

        #[cfg(feature = "espidf")]
        {
            let Some(update) = self.update.as_mut() else {
                return Err(UpdateError::NotReceiving);
            };
            if let Err(e) = update.write(data) {
                warn!("OTA: write failed at {}: {:?}", bytes_written, e);
                self.abort();
                return Err(UpdateError::WriteFailed);
            }
        }
        #[cfg(not(feature = "espidf"))]
        {
            self.image.extend_from_slice(data);
        }

        self.state = OtaState::Receiving {
            expected_size,
            bytes_written: written,
        };
        let decile = (u64::from(written) * 10 / u64::from(expected_size)) as u8;
        if decile > self.reported_decile {
            self.reported_decile = decile;
            info!("OTA: progress {}%", u32::from(decile) * 10);
        }
        Ok(written)
    }

    /// Verify the image and make it the next boot partition.
    pub fn finalize(&mut self) -> Result<(), UpdateError> {
        match self.state {
            OtaState::Receiving {
                expected_size,
                bytes_written,
            } if bytes_written == expected_size => {}
            OtaState::Receiving { .. } => return Err(UpdateError::Incomplete),
            _ => return Err(UpdateError::NotReceiving),
        }

        #[cfg(feature = "espidf")]
        {
            let Some(update) = self.update.take() else {
                self.state = OtaState::Idle;
                return Err(UpdateError::NotReceiving);
            };
            let mut completed = update.finalize().map_err(|e| {
                warn!("OTA: verification failed: {:?}", e);
                self.state = OtaState::Idle;
                UpdateError::VerifyFailed
            })?;
            completed.set_as_boot_partition().map_err(|e| {
                warn!("OTA: set boot partition failed: {:?}", e);
                self.state = OtaState::Idle;
                UpdateError::BootSetFailed
            })?;
        }

        self.state = OtaState::ReadyToReboot;
        info!("OTA: image accepted, ready to reboot");
        Ok(())
    }

    /// Drop the session; the partially written slot is discarded.
    pub fn abort(&mut self) {
        if self.state == OtaState::Idle {
            return;
        }
        #[cfg(feature = "espidf")]
        {
            // esp-ota aborts the partition write when the handle drops
            self.update.take();
        }
        #[cfg(not(feature = "espidf"))]
        {
            self.image.clear();
        }
        self.state = OtaState::Idle;
        warn!("OTA: aborted");
    }

    /// Bytes written so far (simulation).
    #[cfg(not(feature = "espidf"))]
    pub fn staged(&self) -> &[u8] {
        &self.image
    }

    /// Restart into the freshly written image.
    #[cfg(feature = "espidf")]
    pub fn reboot(&self) -> ! {
        info!("OTA: rebooting into new firmware");
        esp_idf_svc::hal::reset::restart()
    }
}

impl Default for OtaManager {
    fn default() -> Self {
        Self::new()
    }
}

// ── Boot validation ───────────────────────────────────────────

/// Confirm the running image so the bootloader does not roll back.
#[cfg(feature = "espidf")]
pub fn confirm_running_image() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: running image confirmed"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

// ── Tests ─────────────────────────────────────────────────────
