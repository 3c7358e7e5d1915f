//! Config persistence feeding the service.

use smartmeter::app::ports::{ConfigError, ConfigPort};
use smartmeter::app::service::MeterService;
use smartmeter::adapters::nvs::NvsAdapter;
use smartmeter::config::SystemConfig;
use smartmeter::sml::crc::CrcPolicy;
use smartmeter::sml::scanner::{DiscardReason, ScanOutcome};
use smartmeter::sml::{END_SEQUENCE, START_SEQUENCE};

use super::mock_ports::{
    CountingDelay, EventLog, MockBroker, MockMeter, MockNvs, import_entry, meter_frame,
};

#[test]
fn stored_interval_drives_the_gate() {
    let nvs = MockNvs::with(SystemConfig {
        publish_interval_ms: 100,
        ..Default::default()
    });
    let config = nvs.load().unwrap();
    let mut svc = MeterService::new(&config, "smartmeter").unwrap();
    let (mut meter, mut broker, mut log) = (MockMeter::new(), MockBroker::online(), EventLog::new());
    let mut delay = CountingDelay::default();

    for (i, now) in [0_u64, 50, 101].into_iter().enumerate() {
        meter.send(&meter_frame(10_000 * (i as i64 + 1), 0));
        while svc.poll(&mut meter, &mut delay, &mut broker, &mut log, now) != ScanOutcome::Pending {}
    }
    assert_eq!(
        broker.on_topic("smartmeter/energy/sml/Bezug"),
        vec!["1.000", "3.000"]
    );
}

#[test]
fn stored_trailer_budget_is_honoured() {
    let config = SystemConfig {
        trailer_wait_ms: 5,
        ..Default::default()
    };
    let mut svc = MeterService::new(&config, "smartmeter").unwrap();
    let (mut meter, mut broker, mut log) = (MockMeter::new(), MockBroker::online(), EventLog::new());
    let mut delay = CountingDelay::default();

    let mut bytes = START_SEQUENCE.to_vec();
    bytes.extend(import_entry(10_000));
    bytes.extend_from_slice(&END_SEQUENCE);
    meter.send(&bytes);

    let outcome = svc.poll(&mut meter, &mut delay, &mut broker, &mut log, 0);
    assert_eq!(outcome, ScanOutcome::Discarded(DiscardReason::TruncatedTrailer));
    assert_eq!(delay.waited_ms, 5);
}

#[test]
fn overlong_deployment_id_fails_construction() {
    let id = "m".repeat(64);
    assert!(MeterService::new(&SystemConfig::default(), &id).is_err());
}

#[test]
fn nvs_round_trip_preserves_policy() {
    let nvs = NvsAdapter::new().unwrap();
    let config = SystemConfig {
        crc_policy: CrcPolicy::Ignore,
        publish_interval_ms: 60_000,
        ..Default::default()
    };
    nvs.save(&config).unwrap();
    let loaded = nvs.load().unwrap();
    assert_eq!(loaded.crc_policy, CrcPolicy::Ignore);
    assert_eq!(loaded.publish_interval_ms, 60_000);
}

#[test]
fn nvs_rejects_out_of_range_values() {
    let nvs = NvsAdapter::new().unwrap();
    let config = SystemConfig {
        loop_yield_ms: 0,
        ..Default::default()
    };
    assert!(matches!(
        nvs.save(&config),
        Err(ConfigError::ValidationFailed(_))
    ));
}
