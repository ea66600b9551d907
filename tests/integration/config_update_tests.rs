//! Remote configuration: JSON patches on the config topic and the HTTP
//! form, persistence, deferred restart and the in-memory fallback when
//! storage refuses the write.

use crate::mock_io::Rig;

use petsmart::adapters::http;
use petsmart::app::events::AppEvent;
use petsmart::app::ports::SystemPort;
use petsmart::config::DeviceType;
use petsmart::fsm::StateId;
use petsmart::store::ConfigStore;

#[test]
fn config_patch_is_applied_persisted_and_restarts_after_grace() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();
    let topic = ctl.topics().config.clone();

    rig.mqtt
        .inject(&topic, br#"{"wifiSSID":"Garage","mqttPort":8883,"debugEnabled":true}"#);
    rig.tick(&mut ctl);

    assert_eq!(ctl.config().wifi_ssid.as_str(), "Garage");
    assert_eq!(ctl.config().mqtt_port, 8883);
    assert!(ctl.config().debug_enabled);
    assert_eq!(
        rig.sink
            .count(|e| matches!(e, AppEvent::ConfigApplied { persisted: true })),
        1
    );

    let applied_at = rig.now_ms;
    assert_eq!(
        ctl.pending_restart_at(),
        Some(applied_at + rig.timing.restart_grace_ms)
    );

    let mac = rig.system.mac_address();
    let stored = ConfigStore::new(&mut rig.storage).load(&mac);
    assert_eq!(stored.config.wifi_ssid.as_str(), "Garage");
    assert_eq!(stored.config.mqtt_port, 8883);

    // Not before the grace period.
    rig.run_for(&mut ctl, rig.timing.restart_grace_ms - rig.timing.tick_interval_ms);
    assert_eq!(rig.system.restarts(), 0);

    rig.tick(&mut ctl);
    assert_eq!(rig.system.restarts(), 1);
    assert_eq!(ctl.pending_restart_at(), None);
}

#[test]
fn out_of_range_patch_changes_nothing() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();
    let topic = ctl.topics().config.clone();
    let before = ctl.config().clone();

    // One bad field rejects the whole document, good fields included.
    rig.mqtt
        .inject(&topic, br#"{"wifiSSID":"Garage","defaultFeedingAmount":0}"#);
    rig.mqtt.inject(&topic, br#"{"mqttPort":0}"#);
    rig.mqtt.inject(&topic, br#"{"deviceType":"TOASTER"}"#);
    rig.mqtt.inject(&topic, br#"{"mqttPort":"eighty"}"#);
    let stored = rig.storage.inner.snapshot();
    rig.tick(&mut ctl);

    assert_eq!(ctl.config(), &before);
    assert_eq!(rig.storage.inner.snapshot(), stored);
    assert_eq!(ctl.pending_restart_at(), None);
    assert_eq!(
        rig.sink
            .count(|e| matches!(e, AppEvent::ConfigApplied { .. })),
        0
    );
    assert_eq!(ctl.state(), StateId::Ready);
}

#[test]
fn patch_without_known_fields_is_a_no_op() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();
    let topic = ctl.topics().config.clone();

    rig.mqtt.inject(&topic, br#"{"colour":"teal"}"#);
    rig.tick(&mut ctl);

    assert_eq!(ctl.pending_restart_at(), None);
    assert_eq!(
        rig.sink
            .count(|e| matches!(e, AppEvent::ConfigApplied { .. })),
        0
    );
}

#[test]
fn form_post_goes_through_the_same_path() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();

    http::accept_config_form(
        b"wifiSSID=Back+Yard&deviceType=FEEDER&doorOpenDuration=15000&feederEnabled=off&mqttUsername=",
        &rig.inbound_tx,
    )
    .unwrap();
    rig.tick(&mut ctl);

    let cfg = ctl.config();
    assert_eq!(cfg.wifi_ssid.as_str(), "Back Yard");
    assert_eq!(cfg.device_type, DeviceType::Feeder);
    assert_eq!(cfg.door_open_duration_ms, 15_000);
    assert!(!cfg.feeder_enabled);
    // Empty field left untouched.
    assert_eq!(cfg.mqtt_username.as_str(), "");
    assert!(ctl.pending_restart_at().is_some());
}

#[test]
fn form_repairs_a_device_stuck_in_error() {
    let mut rig = Rig::new();
    rig.mqtt.set_available(false);
    let mut ctl = rig.boot();
    rig.run_until_state(&mut ctl, StateId::Error, 5_000);

    http::accept_config_form(b"mqttServer=fixed.example.com", &rig.inbound_tx).unwrap();
    rig.tick(&mut ctl);

    assert_eq!(ctl.config().mqtt_server.as_str(), "fixed.example.com");
    assert_eq!(
        rig.sink
            .count(|e| matches!(e, AppEvent::ConfigApplied { persisted: true })),
        1
    );
    assert_eq!(
        ctl.pending_restart_at(),
        Some(rig.now_ms + rig.timing.restart_grace_ms)
    );
    let mac = rig.system.mac_address();
    let stored = ConfigStore::new(&mut rig.storage).load(&mac);
    assert_eq!(stored.config.mqtt_server.as_str(), "fixed.example.com");

    rig.run_for(&mut ctl, rig.timing.restart_grace_ms);
    assert_eq!(rig.system.restarts(), 1);
}

#[test]
fn form_is_accepted_while_still_connecting() {
    let mut rig = Rig::new();
    rig.wifi.set_reachable(false);
    let mut ctl = rig.boot();
    rig.run_until_state(&mut ctl, StateId::ConnectingWifi, 1_000);

    http::accept_config_form(b"wifiSSID=Shed", &rig.inbound_tx).unwrap();
    rig.tick(&mut ctl);

    assert_eq!(ctl.config().wifi_ssid.as_str(), "Shed");
    assert!(ctl.pending_restart_at().is_some());
}

#[test]
fn malformed_form_is_discarded() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();
    let before = ctl.config().clone();

    let stored = rig.storage.inner.snapshot();
    http::accept_config_form(b"feederEnabled=maybe", &rig.inbound_tx).unwrap();
    rig.tick(&mut ctl);

    assert_eq!(ctl.config(), &before);
    assert_eq!(rig.storage.inner.snapshot(), stored);
    assert_eq!(ctl.pending_restart_at(), None);
}

#[test]
fn disabled_feeder_ignores_feed_commands() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();
    let topics = ctl.topics().clone();

    rig.mqtt.inject(&topics.config, br#"{"feederEnabled":false}"#);
    rig.tick(&mut ctl);
    rig.mqtt.inject(&topics.command, br#"{"command":"feed","amount":10}"#);
    rig.mqtt.inject(&topics.command, br#"{"command":"open_door"}"#);
    rig.tick(&mut ctl);

    let requests: Vec<_> = std::iter::from_fn(|| rig.mechanisms.take_request()).collect();
    assert_eq!(requests.len(), 1, "only the door request goes through");
}

#[test]
fn persist_failure_keeps_settings_in_memory_and_relinks() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();
    let topic = ctl.topics().config.clone();
    rig.storage.fail_writes = true;

    rig.mqtt.inject(&topic, br#"{"mqttServer":"broker.lan"}"#);
    rig.tick(&mut ctl);

    assert_eq!(ctl.config().mqtt_server.as_str(), "broker.lan");
    assert_eq!(
        rig.sink
            .count(|e| matches!(e, AppEvent::ConfigApplied { persisted: false })),
        1
    );
    assert_eq!(ctl.pending_restart_at(), None);
    assert_eq!(ctl.state(), StateId::ConnectingWifi);

    rig.run_until_state(&mut ctl, StateId::Ready, 5_000);
    assert_eq!(rig.system.restarts(), 0);

    let mac = rig.system.mac_address();
    let stored = ConfigStore::new(&mut rig.storage).load(&mac);
    assert_ne!(stored.config.mqtt_server.as_str(), "broker.lan");
}

#[test]
fn saved_settings_survive_a_reboot() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();
    let topic = ctl.topics().config.clone();

    rig.mqtt
        .inject(&topic, br#"{"deviceType":"DOOR","notificationsEnabled":false}"#);
    rig.tick(&mut ctl);
    assert!(ctl.pending_restart_at().is_some());
    let identity = ctl.identity().clone();

    // Fresh board, same flash.
    let mut rebooted = Rig::new();
    rebooted.storage = rig.storage;
    let ctl = rebooted.boot();

    assert_eq!(ctl.config().device_type, DeviceType::Door);
    assert!(!ctl.config().notifications_enabled);
    assert_eq!(ctl.identity(), &identity);
}
