//! Optical-head UART adapter.
//!
//! Implements [`ByteSource`] on top of the UART the IR read head is wired
//! to (8N1, 9600 baud by default).  Reads never block: whatever the driver
//! has buffered is staged into a small ring and handed out byte by byte.
//!
//! - **`espidf`**: `UartDriver` with `NON_BLOCK` reads.
//! - **host**: an in-memory queue fed through [`OpticalHead::inject`].

use heapless::Deque;
use log::info;

use crate::app::ports::ByteSource;

#[cfg(feature = "espidf")]
use esp_idf_svc::hal::{
    delay::NON_BLOCK,
    gpio::{AnyIOPin, InputPin, OutputPin},
    peripheral::Peripheral,
    uart::{Uart, UartDriver, config::Config},
    units::Hertz,
};

/// Staging ring between the driver FIFO and the scanner.
const STAGING_CAPACITY: usize = 128;

pub struct OpticalHead<'d> {
    #[cfg(feature = "espidf")]
    uart: UartDriver<'d>,
    #[cfg(not(feature = "espidf"))]
    wire: std::collections::VecDeque<u8>,
    #[cfg(not(feature = "espidf"))]
    _lifetime: core::marker::PhantomData<&'d ()>,
    staged: Deque<u8, STAGING_CAPACITY>,
    bytes_read: u64,
}

impl<'d> OpticalHead<'d> {
    #[cfg(feature = "espidf")]
    pub fn new(
        uart: impl Peripheral<P = impl Uart> + 'd,
        rx: impl Peripheral<P = impl InputPin> + 'd,
        tx: impl Peripheral<P = impl OutputPin> + 'd,
        baud: u32,
    ) -> Result<Self, esp_idf_svc::sys::EspError> {
        let config = Config::new().baudrate(Hertz(baud));
        let uart = UartDriver::new(
            uart,
            tx,
            rx,
            Option::<AnyIOPin>::None,
            Option::<AnyIOPin>::None,
            &config,
        )?;
        info!("OpticalHead: UART up at {} baud", baud);
        Ok(Self {
            uart,
            staged: Deque::new(),
            bytes_read: 0,
        })
    }

    #[cfg(not(feature = "espidf"))]
    pub fn new() -> Self {
        info!("OpticalHead: simulation backend");
        Self {
            wire: std::collections::VecDeque::new(),
            _lifetime: core::marker::PhantomData,
            staged: Deque::new(),
            bytes_read: 0,
        }
    }

    /// Simulation: queue bytes as if the meter had sent them.
    #[cfg(not(feature = "espidf"))]
    pub fn inject(&mut self, bytes: &[u8]) {
        self.wire.extend(bytes.iter().copied());
    }

    /// Total bytes handed to the scanner since boot.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Top up the staging ring if it ran dry.
    #[cfg(feature = "espidf")]
    fn refill(&mut self) {
        if !self.staged.is_empty() {
            return;
        }
        let mut buf = [0u8; STAGING_CAPACITY];
        match self.uart.read(&mut buf, NON_BLOCK) {
            Ok(n) => {
                for &b in &buf[..n] {
                    // Ring was empty and n <= capacity.
                    let _ = self.staged.push_back(b);
                }
            }
            Err(e) => log::warn!("OpticalHead: read failed: {}", e),
        }
    }

    #[cfg(not(feature = "espidf"))]
    fn refill(&mut self) {
        while !self.staged.is_full() {
            let Some(b) = self.wire.pop_front() else {
                break;
            };
            let _ = self.staged.push_back(b);
        }
    }
}

#[cfg(not(feature = "espidf"))]
impl Default for OpticalHead<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteSource for OpticalHead<'_> {
    fn available(&mut self) -> bool {
        self.refill();
        !self.staged.is_empty()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.refill();
        let b = self.staged.pop_front()?;
        self.bytes_read += 1;
        Some(b)
    }
}
