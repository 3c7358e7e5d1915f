//! Unified error types for the smart-meter firmware.
//!
//! Every subsystem error is a small `Copy` enum so it can be passed through
//! the scan loop without allocation.  The top-level [`Error`] collects them
//! for the bring-up code in `main`, which reports through `anyhow`.

use core::fmt;

use crate::app::ports::ConfigError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A frame could not be assembled.
    Frame(FrameError),
    /// The delivery channel refused a reading.
    Publish(PublishError),
    /// Network association failed.
    Connectivity(ConnectivityError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frame(e) => write!(f, "frame: {e}"),
            Self::Publish(e) => write!(f, "publish: {e}"),
            Self::Connectivity(e) => write!(f, "connectivity: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Frame assembly
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Appending would write past the fixed buffer capacity.
    CapacityExceeded { capacity: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded { capacity } => {
                write!(f, "frame exceeds buffer capacity ({capacity} bytes)")
            }
        }
    }
}

impl std::error::Error for FrameError {}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

// ---------------------------------------------------------------------------
// Delivery channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    /// No broker session is established.
    NotConnected,
    /// The client rejected or failed to enqueue the message.
    Rejected,
    /// Topic or payload did not fit the fixed-capacity buffers.
    TooLong,
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "broker not connected"),
            Self::Rejected => write!(f, "message rejected by client"),
            Self::TooLong => write!(f, "topic or payload too long"),
        }
    }
}

impl std::error::Error for PublishError {}

impl From<PublishError> for Error {
    fn from(e: PublishError) -> Self {
        Self::Publish(e)
    }
}

// ---------------------------------------------------------------------------
// Connectivity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    AuthFailed,
    ConnectionFailed,
    AlreadyConnected,
    /// Static IPv4 settings are unusable (non-contiguous mask).
    InvalidAddress,
    /// The network interface rejected the IP configuration.
    NetifFailed,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::AuthFailed => write!(f, "WiFi authentication failed"),
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
            Self::AlreadyConnected => write!(f, "already connected to AP"),
            Self::InvalidAddress => write!(f, "static IPv4 settings invalid"),
            Self::NetifFailed => write!(f, "network interface configuration failed"),
        }
    }
}

impl std::error::Error for ConnectivityError {}

impl From<ConnectivityError> for Error {
    fn from(e: ConnectivityError) -> Self {
        Self::Connectivity(e)
    }
}

// ---------------------------------------------------------------------------
// Firmware update
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateError {
    /// A session is already writing an image.
    Busy,
    /// Declared image size is zero or larger than an OTA slot.
    InvalidSize,
    /// No inactive OTA partition could be opened.
    BeginFailed,
    WriteFailed,
    /// The written image failed verification.
    VerifyFailed,
    BootSetFailed,
    /// Finalize requested before every declared byte arrived.
    Incomplete,
    /// Data arrived with no session open.
    NotReceiving,
    /// More bytes than the declared size.
    Overflow,
    /// Session header was malformed.
    BadHeader,
    AuthFailed,
    /// The sender went quiet for too long.
    Timeout,
    /// The sender closed the connection mid-transfer.
    Disconnected,
    /// Socket error on the update listener.
    Io,
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "update already in progress"),
            Self::InvalidSize => write!(f, "invalid image size"),
            Self::BeginFailed => write!(f, "begin failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::VerifyFailed => write!(f, "image verification failed"),
            Self::BootSetFailed => write!(f, "set boot partition failed"),
            Self::Incomplete => write!(f, "image incomplete"),
            Self::NotReceiving => write!(f, "no update session"),
            Self::Overflow => write!(f, "image exceeds declared size"),
            Self::BadHeader => write!(f, "malformed header"),
            Self::AuthFailed => write!(f, "auth failed"),
            Self::Timeout => write!(f, "sender timed out"),
            Self::Disconnected => write!(f, "sender disconnected"),
            Self::Io => write!(f, "socket error"),
        }
    }
}

impl std::error::Error for UpdateError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
