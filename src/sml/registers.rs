//! Energy register extraction by fixed OBIS byte signature.
//!
//! Only two registers are recognised.  Each is located by an exact byte
//! pattern (OBIS code plus the status/unit/scaler prefix the meter emits)
//! and the 8 bytes directly after the pattern hold the counter as a
//! big-endian `i64` in units of 0.1 Wh.  Dividing by 10 000 yields kWh.
//!
//! Every offset of the frame is tested for every signature, so when a
//! signature occurs more than once the highest-offset occurrence wins.

use core::fmt;

/// Value before the first successful decode.
pub const UNSET: f64 = -2.0;

/// Raw counter units per reported unit.
pub const SCALE: f64 = 10_000.0;

/// Width of the encoded counter following a signature.
pub const VALUE_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// OBIS 1.8.0, energy drawn from the grid.
    Import,
    /// OBIS 2.8.0, energy fed into the grid.
    Export,
}

impl Register {
    pub const ALL: [Register; 2] = [Register::Import, Register::Export];

    /// Channel name used by the delivery topics.
    pub const fn channel(self) -> &'static str {
        match self {
            Self::Import => "Bezug",
            Self::Export => "Abgabe",
        }
    }

    pub const fn obis(self) -> &'static str {
        match self {
            Self::Import => "1.8.0",
            Self::Export => "2.8.0",
        }
    }

    /// Exact byte pattern preceding the counter value.
    pub const fn signature(self) -> &'static [u8] {
        match self {
            Self::Import => &IMPORT_SIGNATURE,
            Self::Export => &EXPORT_SIGNATURE,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Import => 0,
            Self::Export => 1,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.obis(), self.channel())
    }
}

pub const IMPORT_SIGNATURE: [u8; 18] = [
    0x77, 0x07, 0x01, 0x00, 0x01, 0x08, 0x00, 0xFF, 0x65, 0x00, 0x1C, 0x01, 0x04, 0x01, 0x62, 0x1E,
    0x52, 0xFF,
];
pub const EXPORT_SIGNATURE: [u8; 14] = [
    0x77, 0x07, 0x01, 0x00, 0x02, 0x08, 0x00, 0xFF, 0x01, 0x01, 0x62, 0x1E, 0x52, 0xFF,
];

/// Latest decoded value per register.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readings {
    values: [f64; 2],
}

impl Default for Readings {
    fn default() -> Self {
        Self {
            values: [UNSET; 2],
        }
    }
}

impl Readings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, register: Register) -> f64 {
        self.values[register.index()]
    }

    pub fn import_kwh(&self) -> f64 {
        self.get(Register::Import)
    }

    pub fn export_kwh(&self) -> f64 {
        self.get(Register::Export)
    }

    /// True once the register has been decoded at least once.
    pub fn is_set(&self, register: Register) -> bool {
        self.get(register) != UNSET
    }

    fn set(&mut self, register: Register, value: f64) {
        self.values[register.index()] = value;
    }
}

/// Decode the 8 bytes after a signature match into a scaled reading.
pub fn decode_value(bytes: [u8; VALUE_LEN]) -> f64 {
    i64::from_be_bytes(bytes) as f64 / SCALE
}

/// Scan `frame` for every known signature and update `readings`.
///
/// Returns the number of signature occurrences decoded.  A match whose
/// value bytes would run past the end of the frame is skipped.
pub fn extract(frame: &[u8], readings: &mut Readings) -> usize {
    let mut decoded = 0;
    for register in Register::ALL {
        let sig = register.signature();
        for offset in 0..frame.len() {
            let Some(window) = frame.get(offset..offset + sig.len() + VALUE_LEN) else {
                break;
            };
            if &window[..sig.len()] != sig {
                continue;
            }
            let mut raw = [0u8; VALUE_LEN];
            raw.copy_from_slice(&window[sig.len()..]);
            let value = decode_value(raw);
            log::debug!("SML {} @{} raw={:02x?} -> {:.4}", register, offset, raw, value);
            readings.set(register, value);
            decoded += 1;
        }
    }
    decoded
}
