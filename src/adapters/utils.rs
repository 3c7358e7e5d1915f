//! Shared utilities for adapter-layer validation.
//!
//! These helpers are used by multiple adapters (WiFi, NVS, MQTT) and are
//! centralised here to avoid duplication.

/// Returns `true` if every byte of `s` is in the printable ASCII range
/// `0x20..=0x7E` (space through tilde, inclusive).
///
/// Used to validate WiFi SSID strings and the broker host name.
pub(super) fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

/// Returns `true` if `s` can be used as a single MQTT topic level:
/// non-empty printable ASCII with no separator or wildcard.
pub(super) fn is_topic_segment(s: &str) -> bool {
    !s.is_empty() && is_printable_ascii(s) && !s.bytes().any(|b| matches!(b, b'/' | b'+' | b'#'))
}
