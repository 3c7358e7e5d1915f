//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters.  All tests run on the host (x86_64) with no
//! real hardware required.

mod config_tests;
mod host_adapter_tests;
mod mock_ports;
mod pipeline_tests;
mod update_tests;
