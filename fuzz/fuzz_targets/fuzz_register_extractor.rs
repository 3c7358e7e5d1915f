//! Fuzz target: `registers::extract`
//!
//! Feeds arbitrary frame contents to the OBIS register extractor and
//! checks that it never reads out of bounds and never reports more
//! matches than the frame could hold.
//!
//! cargo fuzz run fuzz_register_extractor

#![no_main]

use libfuzzer_sys::fuzz_target;
use smartmeter::sml::registers::{self, Readings, Register, VALUE_LEN};

fuzz_target!(|data: &[u8]| {
    let mut readings = Readings::new();
    let matches = registers::extract(data, &mut readings);

    // Each signature holds a single 0x77 at its head, so occurrences never overlap.
    let ceiling: usize = Register::ALL
        .iter()
        .map(|r| data.len().saturating_sub(VALUE_LEN) / r.signature().len())
        .sum();
    assert!(matches <= ceiling);

    if matches == 0 {
        assert_eq!(readings, Readings::new());
    }
});
