//! Application core — pure domain logic, zero I/O.
//!
//! This module contains the pipeline for the smart-meter reader: frame
//! scanning, register extraction, CRC policy and throttled delivery.
//! All interaction with the UART and the broker happens through **port
//! traits** defined in [`ports`], keeping this layer fully testable without
//! real peripherals.

pub mod events;
pub mod ports;
pub mod service;
