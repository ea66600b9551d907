//! Controller lifecycle against the simulated adapters: boot sequence,
//! connectivity failures and recovery, scheduled publications and the
//! command topic.

use crate::mock_io::Rig;

use petsmart::adapters::peripherals::MechanismRequest;
use petsmart::app::events::{AppEvent, InboundEvent};
use petsmart::app::ports::{BrokerPort, PublicationKind};
use petsmart::connectivity::ConnectivityState;
use petsmart::error::{ConnectivityError, Error};
use petsmart::fsm::StateId;

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn boot_walks_the_connect_sequence_into_ready() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot();
    assert_eq!(ctl.state(), StateId::Initializing);

    rig.run_until_state(&mut ctl, StateId::Ready, 5_000);

    assert_eq!(
        rig.sink.transitions(),
        vec![
            (StateId::Initializing, StateId::ConnectingWifi),
            (StateId::ConnectingWifi, StateId::ConnectingMqtt),
            (StateId::ConnectingMqtt, StateId::Ready),
        ]
    );
    assert_eq!(ctl.link_state(), ConnectivityState::SessionActive);
    assert_eq!(ctl.fault_count(), 0);
}

#[test]
fn ready_subscribes_and_announces_status() {
    let mut rig = Rig::new();
    let ctl = rig.boot_ready();

    let topics = ctl.topics().clone();
    let subs = rig.mqtt.subscriptions();
    assert!(subs.iter().any(|t| t == topics.command.as_str()));
    assert!(subs.iter().any(|t| t == topics.config.as_str()));

    let status = rig.published_on(&topics.status);
    assert_eq!(status.len(), 1, "one status right after READY");
    assert_eq!(status[0]["deviceId"], ctl.identity().as_str());
    assert_eq!(status[0]["state"], StateId::Ready as u8);
    assert!(status[0]["firmwareVersion"].is_string());
}

#[test]
fn identity_comes_from_the_mac_and_names_every_topic() {
    let mut rig = Rig::new();
    let ctl = rig.boot();
    assert_eq!(ctl.identity().as_str(), "246F28A1B2C3");
    assert_eq!(ctl.topics().telemetry.as_str(), "devices/246F28A1B2C3/telemetry");
}

// ── Connectivity failures ─────────────────────────────────────

#[test]
fn association_timeout_enters_error_and_recovers() {
    let mut rig = Rig::new();
    rig.wifi.set_reachable(false);
    let mut ctl = rig.boot();

    let timeout = rig.timing.association_timeout_ms;
    rig.run_until_state(&mut ctl, StateId::Error, timeout + 1_000);
    assert_eq!(
        ctl.last_fault(),
        Some(Error::Connectivity(ConnectivityError::AssociationTimeout))
    );
    assert!(rig.indicator.buzzer_on(), "alarm starts on the reporting tick");

    rig.wifi.set_reachable(true);
    rig.run_until_state(&mut ctl, StateId::Ready, timeout + 10_000);
    assert!(!rig.indicator.buzzer_on());
}

#[test]
fn broker_refusal_retries_after_delay() {
    let mut rig = Rig::new();
    rig.mqtt.set_available(false);
    let mut ctl = rig.boot();

    rig.run_until_state(&mut ctl, StateId::Error, 5_000);
    assert_eq!(
        ctl.last_fault(),
        Some(Error::Connectivity(ConnectivityError::SessionRefused))
    );
    let attempts = ctl.link().session_attempts();

    // Nothing new before the retry delay.
    rig.run_for(&mut ctl, rig.timing.session_retry_delay_ms - 200);
    assert_eq!(ctl.link().session_attempts(), attempts);

    rig.mqtt.set_available(true);
    rig.run_until_state(&mut ctl, StateId::Ready, 1_000);
    assert_eq!(ctl.link().session_attempts(), attempts + 1);
}

#[test]
fn wifi_loss_in_ready_restarts_association() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();

    rig.wifi.set_reachable(false);
    rig.tick(&mut ctl);
    assert_eq!(ctl.state(), StateId::ConnectingWifi);
    assert!(!rig.mqtt.is_connected());

    rig.wifi.set_reachable(true);
    rig.run_until_state(&mut ctl, StateId::Ready, 5_000);
}

#[test]
fn session_loss_in_ready_reconnects_mqtt_only() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();
    let associations = ctl.link().association_attempts();

    rig.mqtt.set_available(false);
    rig.tick(&mut ctl);
    assert_eq!(ctl.state(), StateId::ConnectingMqtt);

    rig.mqtt.set_available(true);
    rig.run_until_state(&mut ctl, StateId::Ready, rig.timing.session_retry_delay_ms + 1_000);
    assert_eq!(ctl.link().association_attempts(), associations);
}

// ── Scheduled publications ────────────────────────────────────

#[test]
fn cadences_fire_from_the_boot_anchor() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();
    let topics = ctl.topics().clone();

    // 0 .. 300 s after boot: status update at 30,60,..,300 (10),
    // heartbeat at 60,..,300 (5), telemetry at 300 (1).
    let elapsed = rig.now_ms;
    rig.run_for(&mut ctl, 300_000 - elapsed);

    let sched = ctl.scheduler();
    assert_eq!(sched.fired_count(PublicationKind::StatusUpdate), 10);
    assert_eq!(sched.fired_count(PublicationKind::Heartbeat), 5);
    assert_eq!(sched.fired_count(PublicationKind::Telemetry), 1);

    // Initial READY status plus one per status-class firing.
    assert_eq!(rig.published_on(&topics.status).len(), 1 + 10 + 5);
    let telemetry = rig.published_on(&topics.telemetry);
    assert_eq!(telemetry.len(), 1);
    assert!(telemetry[0]["batteryVoltage"].is_number());
    assert!(telemetry[0].get("wifiRSSI").is_some());
}

#[test]
fn failed_publishes_do_not_shift_the_cadence() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();
    let topics = ctl.topics().clone();
    let announced = rig.published_on(&topics.status).len();

    rig.mqtt.set_publish_failing(true);
    let elapsed = rig.now_ms;
    rig.run_for(&mut ctl, 300_000 - elapsed);

    assert_eq!(ctl.state(), StateId::Ready, "a failed publish is not a fault");
    let sched = ctl.scheduler();
    assert_eq!(
        u64::from(sched.fired_count(PublicationKind::Heartbeat)),
        rig.now_ms / rig.timing.heartbeat_interval_ms
    );
    assert_eq!(
        u64::from(sched.fired_count(PublicationKind::StatusUpdate)),
        rig.now_ms / rig.timing.status_interval_ms
    );
    assert_eq!(sched.fired_count(PublicationKind::Telemetry), 1);
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::PublishSkipped(_))),
        10 + 5 + 1
    );
    assert_eq!(rig.published_on(&topics.status).len(), announced);

    // Publishing again resumes on the same grid.
    rig.mqtt.set_publish_failing(false);
    rig.run_for(&mut ctl, 60_000);
    assert_eq!(ctl.scheduler().fired_count(PublicationKind::Heartbeat), 6);
    assert_eq!(rig.published_on(&topics.status).len(), announced + 2 + 1);
}

#[test]
fn nothing_is_published_outside_ready() {
    let mut rig = Rig::new();
    rig.mqtt.set_available(false);
    let mut ctl = rig.boot();
    rig.run_for(&mut ctl, 120_000);

    assert_eq!(ctl.state(), StateId::Error);
    assert_eq!(ctl.scheduler().fired_count(PublicationKind::Heartbeat), 0);
    assert!(rig.mqtt.published().is_empty());
}

// ── Command topic ─────────────────────────────────────────────

#[test]
fn ping_and_status_publish_on_demand() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();
    let topics = ctl.topics().clone();

    rig.mqtt.inject(&topics.command, br#"{"command":"ping"}"#);
    rig.mqtt.inject(&topics.command, br#"{"command":"status"}"#);
    rig.tick(&mut ctl);

    assert_eq!(rig.published_on(&topics.status).len(), 3);
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::CommandHandled(_))),
        2
    );
}

#[test]
fn restart_command_restarts_immediately() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();
    let topic = ctl.topics().command.clone();

    rig.mqtt.inject(&topic, br#"{"command":"restart"}"#);
    rig.tick(&mut ctl);
    assert_eq!(rig.system.restarts(), 1);
}

#[test]
fn actuator_verbs_use_config_defaults() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();
    let topic = ctl.topics().command.clone();

    rig.mqtt.inject(&topic, br#"{"command":"feed"}"#);
    rig.mqtt.inject(&topic, br#"{"command":"feed","amount":20}"#);
    rig.mqtt.inject(&topic, br#"{"command":"open_door"}"#);
    rig.mqtt.inject(&topic, br#"{"command":"close_door"}"#);
    rig.tick(&mut ctl);

    let cfg = ctl.config().clone();
    let requests: Vec<_> = std::iter::from_fn(|| rig.mechanisms.take_request()).collect();
    assert_eq!(
        requests,
        vec![
            MechanismRequest::Feed {
                grams: cfg.default_feeding_amount
            },
            MechanismRequest::Feed { grams: 20 },
            MechanismRequest::OpenDoor {
                duration_ms: cfg.door_open_duration_ms
            },
            MechanismRequest::CloseDoor,
        ]
    );
}

#[test]
fn unknown_malformed_and_foreign_messages_have_no_effect() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();
    let topic = ctl.topics().command.clone();
    let published = rig.mqtt.published().len();

    rig.mqtt.inject(&topic, br#"{"command":"selfdestruct"}"#);
    rig.mqtt.inject(&topic, b"not json");
    rig.mqtt.inject(&topic, br#"{"amount":5}"#);
    rig.tick(&mut ctl);

    assert_eq!(ctl.state(), StateId::Ready);
    assert_eq!(rig.mqtt.published().len(), published);
    assert_eq!(rig.system.restarts(), 0);
    assert_eq!(rig.mechanisms.pending(), 0);
    assert_eq!(ctl.fault_count(), 0);
}

#[test]
fn commands_queued_before_ready_are_discarded() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot();
    let command = ctl.topics().command.clone();
    rig.inbound_tx
        .send(InboundEvent::Message {
            topic: command.to_string(),
            payload: br#"{"command":"feed","amount":10}"#.to_vec(),
        })
        .unwrap();
    rig.tick(&mut ctl);
    rig.run_until_state(&mut ctl, StateId::Ready, 5_000);
    rig.run_for(&mut ctl, 1_000);

    assert_eq!(rig.mechanisms.pending(), 0);
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::CommandHandled(_))),
        0
    );
}

#[test]
fn out_of_range_actuator_arguments_are_dropped() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();
    let topic = ctl.topics().command.clone();

    rig.mqtt.inject(&topic, br#"{"command":"feed","amount":0}"#);
    rig.mqtt.inject(&topic, br#"{"command":"feed","amount":5001}"#);
    rig.mqtt.inject(&topic, br#"{"command":"feed","amount":65535}"#);
    rig.mqtt.inject(&topic, br#"{"command":"open_door","duration":999}"#);
    rig.mqtt.inject(&topic, br#"{"command":"open_door","duration":300001}"#);
    rig.mqtt.inject(&topic, br#"{"command":"open_door","duration":4294967295}"#);
    rig.tick(&mut ctl);

    assert_eq!(rig.mechanisms.pending(), 0);
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::CommandHandled(_))),
        0
    );
    assert_eq!(ctl.state(), StateId::Ready);

    // The bounds themselves are accepted.
    rig.mqtt.inject(&topic, br#"{"command":"feed","amount":5000}"#);
    rig.mqtt.inject(&topic, br#"{"command":"open_door","duration":1000}"#);
    rig.tick(&mut ctl);
    let requests: Vec<_> = std::iter::from_fn(|| rig.mechanisms.take_request()).collect();
    assert_eq!(
        requests,
        vec![
            MechanismRequest::Feed { grams: 5_000 },
            MechanismRequest::OpenDoor { duration_ms: 1_000 },
        ]
    );
}

#[test]
fn session_is_reported_as_connecting_until_acknowledged() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot();
    rig.run_until_state(&mut ctl, StateId::ConnectingMqtt, 5_000);

    let mut seen_connecting = false;
    while ctl.state() != StateId::Ready {
        assert!(rig.now_ms < 5_000, "stuck in {:?}", ctl.state());
        rig.tick(&mut ctl);
        seen_connecting |= ctl.link_state() == ConnectivityState::SessionConnecting;
    }
    assert!(seen_connecting);
    assert_eq!(ctl.link_state(), ConnectivityState::SessionActive);
}
