//! WiFi station-mode adapter.
//!
//! Implements [`ConnectivityPort`], the hexagonal boundary for network
//! connectivity.  The main loop calls [`poll`](ConnectivityPort::poll)
//! every iteration; association happens in the background and the loop
//! keeps draining the optical head while the link is down.
//!
//! ## cfg gating
//!
//! - **`espidf`**: real ESP-IDF WiFi driver calls via `esp_idf_svc::wifi`.
//! - **host**: simulation stubs for tests.
//!
//! ## Addressing
//!
//! DHCP by default.  [`WifiAdapter::set_static_ip`] swaps the station
//! netif for one with a fixed address, gateway, mask and DNS server.
//!
//! ## Reconnection policy
//!
//! On disconnect the adapter waits an exponential backoff (2 s → 4 s →
//! 8 s … capped at 60 s) before retrying.

use log::{info, warn};

use crate::config::StaticIp;
use crate::error::ConnectivityError;

use super::utils::is_printable_ascii;

#[cfg(feature = "espidf")]
use esp_idf_svc::{
    ipv4::{
        ClientConfiguration as IpClientConfiguration, ClientSettings,
        Configuration as IpConfiguration, Ipv4Addr, Mask, Subnet,
    },
    netif::{EspNetif, NetifConfiguration},
    wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi},
};

// ───────────────────────────────────────────────────────────────
// Port trait
// ───────────────────────────────────────────────────────────────

pub trait ConnectivityPort {
    /// Start associating; completion is observed through `poll`.
    fn connect(&mut self, now_ms: u64) -> Result<(), ConnectivityError>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    fn poll(&mut self, now_ms: u64);
    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError>;
}

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connecting { since_ms: u64 },
    Connected,
    Reconnecting { attempt: u32, at_ms: u64 },
}

const INITIAL_BACKOFF_MS: u32 = 2_000;
const MAX_BACKOFF_MS: u32 = 60_000;
/// Give up on an association attempt after this long.
const CONNECT_TIMEOUT_MS: u64 = 15_000;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 {
        return Err(ConnectivityError::InvalidSsid);
    }
    if !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    state: WifiState,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    backoff_ms: u32,
    static_ip: Option<StaticIp>,
    #[cfg(feature = "espidf")]
    wifi: EspWifi<'static>,
    /// Simulation: link state of the fake AP.
    #[cfg(not(feature = "espidf"))]
    sim_link_up: bool,
    /// Simulation: refuse this many upcoming connect attempts.
    #[cfg(not(feature = "espidf"))]
    sim_refusals: u32,
}

impl WifiAdapter {
    #[cfg(feature = "espidf")]
    pub fn new(wifi: EspWifi<'static>) -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            backoff_ms: INITIAL_BACKOFF_MS,
            static_ip: None,
            wifi,
        }
    }

    #[cfg(not(feature = "espidf"))]
    pub fn new() -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            backoff_ms: INITIAL_BACKOFF_MS,
            static_ip: None,
            sim_link_up: false,
            sim_refusals: 0,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    /// Current retry delay.
    pub fn backoff_ms(&self) -> u32 {
        self.backoff_ms
    }

    /// Fixed IPv4 settings in effect, `None` for DHCP.
    pub fn static_ip(&self) -> Option<StaticIp> {
        self.static_ip
    }

    /// Use fixed IPv4 settings instead of DHCP.  Takes effect on the next
    /// association; call before [`connect`](ConnectivityPort::connect).
    pub fn set_static_ip(&mut self, settings: StaticIp) -> Result<(), ConnectivityError> {
        let prefix = settings
            .prefix_len()
            .filter(|p| (1..=30).contains(p))
            .ok_or(ConnectivityError::InvalidAddress)?;
        self.platform_set_static_ip(&settings, prefix)?;
        self.static_ip = Some(settings);
        info!(
            "WiFi: static address {}/{} via {}",
            core::net::Ipv4Addr::from(settings.ip),
            prefix,
            core::net::Ipv4Addr::from(settings.gateway)
        );
        Ok(())
    }

    /// Simulation: the AP drops the station.
    #[cfg(not(feature = "espidf"))]
    pub fn sim_drop_link(&mut self) {
        self.sim_link_up = false;
    }

    /// Simulation: fail the next `n` connect attempts.
    #[cfg(not(feature = "espidf"))]
    pub fn sim_refuse_next(&mut self, n: u32) {
        self.sim_refusals = n;
    }

    fn schedule_retry(&mut self, attempt: u32, now_ms: u64) {
        let at_ms = now_ms + u64::from(self.backoff_ms);
        info!(
            "WiFi: retry {} in {} ms",
            attempt,
            self.backoff_ms
        );
        self.backoff_ms = (self.backoff_ms * 2).min(MAX_BACKOFF_MS);
        self.state = WifiState::Reconnecting { attempt, at_ms };
    }

    fn attempt(&mut self, attempt: u32, now_ms: u64) {
        match self.platform_connect() {
            Ok(()) => self.state = WifiState::Connecting { since_ms: now_ms },
            Err(e) => {
                warn!("WiFi: connect failed: {}", e);
                self.schedule_retry(attempt + 1, now_ms);
            }
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(feature = "espidf")]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let client = ClientConfiguration {
            ssid: self
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidSsid)?,
            password: self
                .password
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        };
        self.wifi
            .set_configuration(&Configuration::Client(client))
            .map_err(|_| ConnectivityError::ConnectionFailed)?;
        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi
                .start()
                .map_err(|_| ConnectivityError::ConnectionFailed)?;
        }
        self.wifi
            .connect()
            .map_err(|_| ConnectivityError::ConnectionFailed)
    }

    #[cfg(feature = "espidf")]
    fn platform_set_static_ip(
        &mut self,
        settings: &StaticIp,
        prefix: u8,
    ) -> Result<(), ConnectivityError> {
        let conf = NetifConfiguration {
            ip_configuration: Some(IpConfiguration::Client(IpClientConfiguration::Fixed(
                ClientSettings {
                    ip: Ipv4Addr::from(settings.ip),
                    subnet: Subnet {
                        gateway: Ipv4Addr::from(settings.gateway),
                        mask: Mask(prefix),
                    },
                    dns: Some(Ipv4Addr::from(settings.dns)),
                    secondary_dns: None,
                },
            ))),
            ..NetifConfiguration::wifi_default_client()
        };
        let netif = EspNetif::new_with_conf(&conf).map_err(|e| {
            warn!("WiFi: netif creation failed: {:?}", e);
            ConnectivityError::NetifFailed
        })?;
        self.wifi.swap_netif_sta(netif).map_err(|e| {
            warn!("WiFi: netif swap failed: {:?}", e);
            ConnectivityError::NetifFailed
        })?;
        Ok(())
    }

    #[cfg(not(feature = "espidf"))]
    fn platform_set_static_ip(
        &mut self,
        _settings: &StaticIp,
        _prefix: u8,
    ) -> Result<(), ConnectivityError> {
        Ok(())
    }

    #[cfg(not(feature = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        if self.sim_refusals > 0 {
            self.sim_refusals -= 1;
            warn!("WiFi(sim): refusing '{}'", self.ssid);
            return Err(ConnectivityError::AuthFailed);
        }
        self.sim_link_up = true;
        info!("WiFi(sim): associated with '{}'", self.ssid);
        Ok(())
    }

    #[cfg(feature = "espidf")]
    fn platform_disconnect(&mut self) {
        let _ = self.wifi.disconnect();
    }

    #[cfg(not(feature = "espidf"))]
    fn platform_disconnect(&mut self) {
        self.sim_link_up = false;
        info!("WiFi(sim): disconnected");
    }

    /// Associated and holding an IP lease.
    #[cfg(feature = "espidf")]
    fn platform_link_up(&self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    #[cfg(not(feature = "espidf"))]
    fn platform_link_up(&self) -> bool {
        self.sim_link_up
    }
}

#[cfg(not(feature = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// ConnectivityPort
// ───────────────────────────────────────────────────────────────

impl ConnectivityPort for WifiAdapter {
    fn connect(&mut self, now_ms: u64) -> Result<(), ConnectivityError> {
        if self.ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        if self.state == WifiState::Connected {
            return Err(ConnectivityError::AlreadyConnected);
        }

        info!("WiFi: connecting to '{}'", self.ssid);
        match self.platform_connect() {
            Ok(()) => {
                self.state = WifiState::Connecting { since_ms: now_ms };
                Ok(())
            }
            Err(e) => {
                warn!("WiFi: connection failed: {}", e);
                self.schedule_retry(1, now_ms);
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) {
        self.platform_disconnect();
        self.state = WifiState::Disconnected;
        self.backoff_ms = INITIAL_BACKOFF_MS;
        info!("WiFi: disconnected");
    }

    fn is_connected(&self) -> bool {
        self.state == WifiState::Connected && self.platform_link_up()
    }

    fn poll(&mut self, now_ms: u64) {
        match self.state {
            WifiState::Connecting { since_ms } => {
                if self.platform_link_up() {
                    self.state = WifiState::Connected;
                    self.backoff_ms = INITIAL_BACKOFF_MS;
                    info!("WiFi: connected");
                } else if now_ms.saturating_sub(since_ms) > CONNECT_TIMEOUT_MS {
                    warn!("WiFi: association timed out");
                    self.platform_disconnect();
                    self.schedule_retry(1, now_ms);
                }
            }
            WifiState::Connected => {
                if !self.platform_link_up() {
                    warn!("WiFi: connection lost, entering reconnect");
                    self.schedule_retry(1, now_ms);
                }
            }
            WifiState::Reconnecting { attempt, at_ms } => {
                if now_ms >= at_ms {
                    info!("WiFi: reconnect attempt {}", attempt);
                    self.attempt(attempt, now_ms);
                }
            }
            WifiState::Disconnected => {}
        }
    }

    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid.push_str(ssid).map_err(|_| ConnectivityError::InvalidSsid)?;
        self.password.clear();
        self.password.push_str(password).map_err(|_| ConnectivityError::InvalidPassword)?;
        info!("WiFi: credentials updated (SSID='{}')", self.ssid);
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
