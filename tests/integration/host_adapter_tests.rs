//! The host simulation adapters wired together the way `main` wires the
//! device ones.

use smartmeter::adapters::device_id;
use smartmeter::adapters::log_sink::LogEventSink;
use smartmeter::adapters::mqtt::{MqttPublisher, MqttSettings};
use smartmeter::adapters::nvs::NvsAdapter;
use smartmeter::adapters::time::{StdDelay, SystemClock};
use smartmeter::adapters::uart::OpticalHead;
use smartmeter::adapters::wifi::{ConnectivityPort, WifiAdapter};
use smartmeter::app::ports::ConfigPort;
use smartmeter::app::service::MeterService;
use smartmeter::delivery::Topics;
use smartmeter::drivers::watchdog::Watchdog;
use smartmeter::sml::scanner::ScanOutcome;

use super::mock_ports::meter_frame;

#[test]
fn simulated_boot_publishes_first_frame() {
    let config = NvsAdapter::new().unwrap().load().unwrap();
    let id = device_id::resolve(&config.deployment_id);
    assert!(id.starts_with("smartmeter"));

    let clock = SystemClock::new();
    let mut wifi = WifiAdapter::new();
    wifi.set_credentials("TestNet", "password1").unwrap();
    wifi.connect(clock.uptime_ms()).unwrap();
    wifi.poll(clock.uptime_ms());
    assert!(wifi.is_connected());

    let topics = Topics::new(&id).unwrap();
    let mut mqtt = MqttPublisher::new(&MqttSettings {
        host: &config.mqtt_host,
        port: config.mqtt_port,
        client_id: &id,
        keepalive_secs: config.mqtt_keepalive_secs,
        status_topic: topics.status(),
    })
    .unwrap();
    mqtt.set_connected(true);

    let mut head = OpticalHead::new();
    head.inject(&[0x00, 0x13]);
    head.inject(&meter_frame(20_000, 30_000));

    let mut sink = LogEventSink::new();
    let mut service = MeterService::new(&config, &id).unwrap();
    service.start(&mut sink);
    let watchdog = Watchdog::new(config.watchdog_timeout_ms);

    let mut delay = StdDelay;
    let mut ready = 0;
    for _ in 0..4 {
        if service.poll(&mut head, &mut delay, &mut mqtt, &mut sink, clock.uptime_ms())
            == ScanOutcome::FrameReady
        {
            ready += 1;
        }
        watchdog.feed();
    }

    assert_eq!(ready, 1);
    assert_eq!(watchdog.feeds(), 4);
    let published: Vec<(&str, &str)> = mqtt
        .published()
        .iter()
        .map(|p| (p.topic.as_str(), p.payload.as_str()))
        .collect();
    assert_eq!(published.len(), 3);
    assert_eq!(published[0].1, "online");
    assert_eq!(published[1], (topics.reading(smartmeter::sml::registers::Register::Import), "2.000"));
    assert_eq!(published[2].1, "3.000");
}
