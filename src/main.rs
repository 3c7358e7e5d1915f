//! SML Smart-Meter Reader — Main Entry Point
//!
//! Single cooperative loop: drain the optical head, scan for frames,
//! decode the energy registers and forward them over MQTT.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  OpticalHead     MqttPublisher   LogEventSink   NvsAdapter     │
//! │  (ByteSource)    (PublishPort)   (EventSink)    (ConfigPort)   │
//! │  WifiAdapter     SystemClock     Watchdog       OtaServer      │
//! │  (Connectivity)  (uptime)        (TWDT)         (UpdatePort)   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              MeterService (pure logic)                 │    │
//! │  │  FrameScanner · CRC · Registers · DeliveryGate         │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use log::{error, info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::{Delay, FreeRtos};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::EspWifi;

use smartmeter::adapters::device_id;
use smartmeter::adapters::log_sink::LogEventSink;
use smartmeter::adapters::mqtt::{MqttPublisher, MqttSettings};
use smartmeter::adapters::nvs::NvsAdapter;
use smartmeter::adapters::ota_server::OtaServer;
use smartmeter::adapters::time::SystemClock;
use smartmeter::adapters::uart::OpticalHead;
use smartmeter::adapters::wifi::{ConnectivityPort, WifiAdapter};
use smartmeter::app::ports::{ConfigPort, UpdatePort, UpdateStatus};
use smartmeter::app::service::MeterService;
use smartmeter::config::SystemConfig;
use smartmeter::delivery::Topics;
use smartmeter::diagnostics;
use smartmeter::drivers::watchdog::Watchdog;
use smartmeter::{ota, pins};

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  SmartMeter v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    diagnostics::install_panic_handler();
    ota::confirm_running_image();

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let config = match NvsAdapter::new(nvs_partition.clone()) {
        Ok(nvs) => nvs.load().unwrap_or_else(|e| {
            warn!("Config load failed ({}), using defaults", e);
            SystemConfig::default()
        }),
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults", e);
            SystemConfig::default()
        }
    };
    let deployment_id = device_id::resolve(&config.deployment_id);
    info!("Deployment id: {}", deployment_id);

    // ── 3. Optical head ───────────────────────────────────────
    info!(
        "Optical head: UART{} RX=GPIO{} TX=GPIO{} @ {} baud",
        pins::OPTICAL_UART,
        pins::OPTICAL_RX_GPIO,
        pins::OPTICAL_TX_GPIO,
        config.uart_baud
    );
    let mut head = OpticalHead::new(
        peripherals.uart1,
        peripherals.pins.gpio4,
        peripherals.pins.gpio5,
        config.uart_baud,
    )?;

    // ── 4. Network ────────────────────────────────────────────
    let clock = SystemClock::new();
    let esp_wifi = EspWifi::new(peripherals.modem, sysloop, Some(nvs_partition))?;
    let mut wifi = WifiAdapter::new(esp_wifi);
    if let Some(settings) = config.static_ip {
        if let Err(e) = wifi.set_static_ip(settings) {
            warn!("WiFi: {}; falling back to DHCP", e);
        }
    }
    match wifi.set_credentials(&config.wifi_ssid, &config.wifi_password) {
        Ok(()) => {
            if let Err(e) = wifi.connect(clock.uptime_ms()) {
                warn!("WiFi: initial connect failed ({}), will retry", e);
            }
        }
        Err(e) => error!("WiFi: {}; running offline", e),
    }

    let topics = Topics::new(&deployment_id)?;
    let mut mqtt = MqttPublisher::new(&MqttSettings {
        host: &config.mqtt_host,
        port: config.mqtt_port,
        client_id: &deployment_id,
        keepalive_secs: config.mqtt_keepalive_secs,
        status_topic: topics.status(),
    })?;

    // ── 5. Application service ────────────────────────────────
    let mut sink = LogEventSink::new();
    let mut service = MeterService::new(&config, &deployment_id)?;
    service.start(&mut sink);

    let mut delay = Delay::new_default();
    let watchdog = Watchdog::new(config.watchdog_timeout_ms);

    let mut updater = OtaServer::bind(config.ota_port, &config.ota_password).unwrap_or_else(|e| {
        warn!("OTA: {}; updates disabled", e);
        OtaServer::disabled()
    });

    // ── 6. Main loop ──────────────────────────────────────────
    loop {
        let now_ms = clock.uptime_ms();
        wifi.poll(now_ms);
        service.poll(&mut head, &mut delay, &mut mqtt, &mut sink, now_ms);
        if updater.service(now_ms) == UpdateStatus::ReadyToReboot {
            updater.reboot();
        }
        watchdog.feed();
        FreeRtos::delay_ms(config.loop_yield_ms);
    }
}
