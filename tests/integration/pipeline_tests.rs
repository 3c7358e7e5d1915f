//! MeterService end to end: bytes in, MQTT messages out.

use smartmeter::app::events::AppEvent;
use smartmeter::app::service::MeterService;
use smartmeter::config::SystemConfig;
use smartmeter::delivery::ANNOUNCE_RETRY_MS;
use smartmeter::error::PublishError;
use smartmeter::sml::FRAME_CAPACITY;
use smartmeter::sml::crc::CrcPolicy;
use smartmeter::sml::registers::Register;
use smartmeter::sml::scanner::{DiscardReason, ScanOutcome, ScanState};
use smartmeter::sml::{END_SEQUENCE, START_SEQUENCE};

use super::mock_ports::{
    CountingDelay, EventLog, MockBroker, MockMeter, export_entry, frame, import_entry, meter_frame,
};

const STATUS: &str = "smartmeter/energy/status";
const BEZUG: &str = "smartmeter/energy/sml/Bezug";
const ABGABE: &str = "smartmeter/energy/sml/Abgabe";

struct Rig {
    svc: MeterService,
    meter: MockMeter,
    broker: MockBroker,
    log: EventLog,
    delay: CountingDelay,
}

impl Rig {
    fn new(config: SystemConfig, broker: MockBroker) -> Self {
        let mut log = EventLog::new();
        let mut svc = MeterService::new(&config, "smartmeter").unwrap();
        svc.start(&mut log);
        Self {
            svc,
            meter: MockMeter::new(),
            broker,
            log,
            delay: CountingDelay::default(),
        }
    }

    fn online() -> Self {
        Self::new(SystemConfig::default(), MockBroker::online())
    }

    /// Poll until the meter is drained; returns every non-pending outcome.
    fn run(&mut self, now_ms: u64) -> Vec<ScanOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let o = self.svc.poll(
                &mut self.meter,
                &mut self.delay,
                &mut self.broker,
                &mut self.log,
                now_ms,
            );
            if o == ScanOutcome::Pending {
                return outcomes;
            }
            outcomes.push(o);
        }
    }
}

// ── Happy path ────────────────────────────────────────────────

#[test]
fn frame_publishes_online_then_both_readings() {
    let mut rig = Rig::online();
    rig.meter.send(&meter_frame(123_456_789, 5_000));

    assert_eq!(rig.run(0), vec![ScanOutcome::FrameReady]);

    let topics: Vec<_> = rig.broker.messages.iter().map(|m| m.topic.as_str()).collect();
    assert_eq!(topics, vec![STATUS, BEZUG, ABGABE]);
    assert!(rig.broker.messages[0].retain);
    assert_eq!(rig.broker.on_topic(STATUS), vec!["online"]);
    assert_eq!(rig.broker.on_topic(BEZUG), vec!["12345.679"]);
    assert_eq!(rig.broker.on_topic(ABGABE), vec!["0.500"]);
}

#[test]
fn events_follow_the_pipeline() {
    let mut rig = Rig::online();
    rig.meter.send(&meter_frame(100_000, 0));
    rig.run(0);

    let kinds: Vec<&'static str> = rig
        .log
        .events
        .iter()
        .map(|e| match e {
            AppEvent::Started => "started",
            AppEvent::ChannelOnline => "online",
            AppEvent::FrameDecoded { .. } => "decoded",
            AppEvent::ReadingsPublished(_) => "published",
            AppEvent::Stats(_) => "stats",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["started", "online", "decoded", "published", "stats"]);

    let AppEvent::FrameDecoded { matches, len, .. } = &rig.log.events[2] else {
        panic!("expected FrameDecoded");
    };
    assert_eq!(*matches, 2);
    assert_eq!(*len, meter_frame(100_000, 0).len());
}

#[test]
fn noise_between_frames_is_skipped() {
    let mut rig = Rig::online();
    rig.meter.send(&[0x00, 0xFF, 0x42, 0x1A]);
    rig.meter.send(&meter_frame(10_000, 20_000));
    rig.meter.send(&[0x99; 17]);
    rig.meter.send(&meter_frame(30_000, 40_000));

    let outcomes = rig.run(0);
    assert_eq!(outcomes, vec![ScanOutcome::FrameReady, ScanOutcome::FrameReady]);
    assert_eq!(rig.svc.readings().import_kwh(), 3.0);
    assert_eq!(rig.svc.readings().export_kwh(), 4.0);
    assert_eq!(rig.svc.stats().frames_completed, 2);
}

#[test]
fn frame_split_across_polls_is_reassembled() {
    let mut rig = Rig::online();
    let bytes = meter_frame(10_000, 10_000);
    let (head, tail) = bytes.split_at(20);

    rig.meter.send(head);
    assert!(rig.run(0).is_empty());
    assert_eq!(rig.svc.scanner().state(), ScanState::SeekingEnd);

    rig.meter.send(tail);
    assert_eq!(rig.run(100), vec![ScanOutcome::FrameReady]);
    assert_eq!(rig.svc.readings().import_kwh(), 1.0);
}

// ── Partial frames ────────────────────────────────────────────

#[test]
fn missing_register_keeps_previous_value() {
    let config = SystemConfig {
        publish_interval_ms: 0,
        ..Default::default()
    };
    let mut rig = Rig::new(config, MockBroker::online());

    rig.meter.send(&meter_frame(10_000, 20_000));
    rig.run(0);
    rig.meter.send(&frame(&export_entry(50_000)));
    rig.run(10);

    assert_eq!(rig.broker.on_topic(BEZUG), vec!["1.000", "1.000"]);
    assert_eq!(rig.broker.on_topic(ABGABE), vec!["2.000", "5.000"]);
}

#[test]
fn never_seen_register_publishes_sentinel() {
    let mut rig = Rig::online();
    rig.meter.send(&frame(&import_entry(70_000)));
    rig.run(0);

    assert!(!rig.svc.readings().is_set(Register::Export));
    assert_eq!(rig.broker.on_topic(BEZUG), vec!["7.000"]);
    assert_eq!(rig.broker.on_topic(ABGABE), vec!["-2.000"]);
}

#[test]
fn frame_without_registers_still_publishes_current_values() {
    let mut rig = Rig::online();
    rig.meter.send(&frame(&[0x76, 0x01, 0x02, 0x03]));
    rig.run(0);
    assert_eq!(rig.broker.on_topic(BEZUG), vec!["-2.000"]);
}

// ── Throttling ────────────────────────────────────────────────

#[test]
fn frames_inside_interval_are_decoded_but_not_published() {
    let mut rig = Rig::online();

    rig.meter.send(&meter_frame(10_000, 0));
    rig.run(0);
    rig.meter.send(&meter_frame(20_000, 0));
    rig.run(1_000);
    rig.meter.send(&meter_frame(30_000, 0));
    rig.run(10_000);

    // Decoded every time, forwarded once.
    assert_eq!(rig.svc.readings().import_kwh(), 3.0);
    assert_eq!(rig.broker.on_topic(BEZUG), vec!["1.000"]);

    rig.meter.send(&meter_frame(40_000, 0));
    rig.run(10_001);
    assert_eq!(rig.broker.on_topic(BEZUG), vec!["1.000", "4.000"]);
    assert_eq!(rig.svc.stats().publishes, 2);
}

// ── Connectivity ──────────────────────────────────────────────

#[test]
fn offline_broker_does_not_block_decoding() {
    let mut rig = Rig::new(SystemConfig::default(), MockBroker::offline());
    rig.meter.send(&meter_frame(10_000, 20_000));
    rig.meter.send(&meter_frame(11_000, 21_000));

    assert_eq!(rig.run(0).len(), 2);
    assert_eq!(rig.svc.readings().import_kwh(), 1.1);
    assert!(rig.broker.messages.is_empty());
    assert_eq!(rig.svc.stats().publish_failures, 2);
    assert_eq!(
        rig.log
            .count(|e| *e == AppEvent::PublishFailed(PublishError::NotConnected)),
        2
    );
}

#[test]
fn reconnect_announces_online_and_publishes_next_frame() {
    let mut rig = Rig::new(SystemConfig::default(), MockBroker::offline());
    rig.meter.send(&meter_frame(10_000, 0));
    rig.run(0);

    rig.broker.connected = true;
    rig.meter.send(&meter_frame(20_000, 0));
    rig.run(50);

    assert_eq!(rig.broker.on_topic(STATUS), vec!["online"]);
    assert_eq!(rig.broker.on_topic(BEZUG), vec!["2.000"]);

    // Drop and restore: announced again.
    rig.broker.connected = false;
    rig.run(100);
    rig.broker.connected = true;
    rig.run(200);
    assert_eq!(rig.broker.on_topic(STATUS), vec!["online", "online"]);
    assert_eq!(rig.svc.stats().reconnects, 2);
}

#[test]
fn rejected_publish_is_retried_on_next_frame() {
    let mut rig = Rig::online();
    rig.broker.rejecting = true;
    rig.meter.send(&meter_frame(10_000, 0));
    rig.run(0);
    assert!(rig.broker.messages.is_empty());
    assert!(rig.log.count(|e| *e == AppEvent::PublishFailed(PublishError::Rejected)) >= 1);

    rig.broker.rejecting = false;
    rig.meter.send(&meter_frame(20_000, 0));
    rig.run(1);
    assert_eq!(rig.broker.on_topic(BEZUG), vec!["2.000"]);
}

#[test]
fn refused_online_announcement_is_retried_at_a_steady_pace() {
    let mut rig = Rig::online();
    rig.broker.rejecting = true;

    // One second of idle loop iterations at the default yield.
    for now in (0..1_000).step_by(10) {
        rig.run(now);
    }
    assert_eq!(rig.svc.stats().publish_failures, 1);
    assert_eq!(
        rig.log
            .count(|e| *e == AppEvent::PublishFailed(PublishError::Rejected)),
        1
    );

    rig.broker.rejecting = false;
    rig.run(ANNOUNCE_RETRY_MS);
    assert_eq!(rig.broker.on_topic(STATUS), vec!["online"]);
    assert_eq!(rig.svc.stats().reconnects, 1);
}

// ── Discards ──────────────────────────────────────────────────

#[test]
fn oversized_frame_is_dropped_and_next_frame_decodes() {
    let mut rig = Rig::online();
    rig.meter.send(&START_SEQUENCE);
    rig.meter.send(&[0x00; FRAME_CAPACITY]);
    rig.meter.send(&meter_frame(90_000, 0));

    let outcomes = rig.run(0);
    assert_eq!(outcomes[0], ScanOutcome::Discarded(DiscardReason::Overflow));
    assert_eq!(outcomes.last(), Some(&ScanOutcome::FrameReady));
    assert_eq!(rig.svc.stats().frames_overflowed, 1);
    assert_eq!(rig.svc.readings().import_kwh(), 9.0);
}

#[test]
fn stalled_frame_is_dropped_after_timeout() {
    let mut rig = Rig::online();
    rig.meter.send(&START_SEQUENCE);
    rig.meter.send(&import_entry(10_000));
    assert!(rig.run(0).is_empty());

    assert!(rig.run(4_000).is_empty());
    assert_eq!(
        rig.run(6_000),
        vec![ScanOutcome::Discarded(DiscardReason::Stalled)]
    );
    assert_eq!(rig.svc.scanner().state(), ScanState::SeekingStart);
    assert!(!rig.svc.readings().is_set(Register::Import));

    rig.meter.send(&meter_frame(20_000, 0));
    assert_eq!(rig.run(6_100), vec![ScanOutcome::FrameReady]);
}

#[test]
fn late_trailer_within_budget_is_accepted() {
    let mut rig = Rig::online();
    let bytes = meter_frame(10_000, 0);
    rig.meter.lag_after(bytes.len() - 3, 10);
    rig.meter.send(&bytes);

    assert_eq!(rig.run(0), vec![ScanOutcome::FrameReady]);
    assert_eq!(rig.delay.waited_ms, 10);
}

#[test]
fn missing_trailer_discards_frame() {
    let mut rig = Rig::online();
    let mut bytes = START_SEQUENCE.to_vec();
    bytes.extend(import_entry(10_000));
    bytes.extend_from_slice(&END_SEQUENCE);
    rig.meter.send(&bytes);

    assert_eq!(
        rig.run(0),
        vec![ScanOutcome::Discarded(DiscardReason::TruncatedTrailer)]
    );
    assert_eq!(rig.delay.waited_ms, 30);
    assert_eq!(rig.svc.stats().trailers_truncated, 1);
    assert!(!rig.svc.readings().is_set(Register::Import));
}

// ── CRC policy ────────────────────────────────────────────────

fn corrupted(mut bytes: Vec<u8>) -> Vec<u8> {
    let n = bytes.len();
    bytes[n - 1] ^= 0x5A;
    bytes
}

#[test]
fn bad_crc_is_reported_and_decoded_by_default() {
    let mut rig = Rig::online();
    rig.meter.send(&corrupted(meter_frame(10_000, 0)));
    rig.run(0);

    assert_eq!(rig.svc.stats().crc_mismatches, 1);
    assert_eq!(rig.broker.on_topic(BEZUG), vec!["1.000"]);
    assert_eq!(
        rig.log.count(|e| matches!(e, AppEvent::CrcMismatch { .. })),
        1
    );
}

#[test]
fn bad_crc_is_dropped_under_reject() {
    let config = SystemConfig {
        crc_policy: CrcPolicy::Reject,
        ..Default::default()
    };
    let mut rig = Rig::new(config, MockBroker::online());
    rig.meter.send(&corrupted(meter_frame(10_000, 0)));
    rig.meter.send(&meter_frame(20_000, 0));
    rig.run(0);

    assert_eq!(rig.svc.stats().frames_rejected, 1);
    assert_eq!(rig.broker.on_topic(BEZUG), vec!["2.000"]);
    assert_eq!(
        rig.log
            .count(|e| *e == AppEvent::FrameDiscarded(DiscardReason::CrcMismatch)),
        1
    );
}

#[test]
fn valid_crc_raises_no_mismatch() {
    let mut rig = Rig::online();
    rig.meter.send(&meter_frame(10_000, 20_000));
    rig.run(0);
    assert_eq!(rig.svc.stats().crc_mismatches, 0);
}
