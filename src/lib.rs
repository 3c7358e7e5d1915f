//! SML smart-meter reader library.
//!
//! Exposes the pure-logic modules for integration testing and fuzzing.
//! All ESP-IDF-specific code is guarded by `#[cfg(feature = "espidf")]`
//! within each module; host builds get simulation adapters instead.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod delivery;
pub mod diagnostics;
pub mod error;
pub mod ota;
pub mod pins;
pub mod sml;

pub mod adapters;
pub mod drivers;
