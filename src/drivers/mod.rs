//! Low-level peripheral helpers.

pub mod watchdog;
