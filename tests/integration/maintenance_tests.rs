//! Maintenance paths: factory reset from the button and firmware updates
//! arriving through the update transport.

use crate::mock_io::Rig;

use petsmart::adapters::http;
use petsmart::app::events::{AppEvent, UpdateEvent};
use petsmart::app::ports::StoragePort;
use petsmart::error::{Error, UpdateError};
use petsmart::fsm::StateId;
use petsmart::store::{keys, NAMESPACE};

// ── Factory reset ─────────────────────────────────────────────

#[test]
fn long_press_wipes_storage_and_restarts() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();
    assert!(rig.storage.exists(NAMESPACE, keys::DEVICE_ID));

    rig.sensors.set_button(true);
    rig.run_for(&mut ctl, rig.timing.factory_reset_hold_ms - 200);
    assert_eq!(rig.system.restarts(), 0, "still counting");

    rig.run_for(&mut ctl, 400);
    assert_eq!(ctl.state(), StateId::Maintenance);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::FactoryReset)), 1);
    assert_eq!(rig.system.restarts(), 1);
    assert!(!rig.storage.exists(NAMESPACE, keys::DEVICE_ID));

    // Still held: the detector does not fire twice.
    rig.run_for(&mut ctl, 6_000);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::FactoryReset)), 1);
}

#[test]
fn form_after_factory_reset_is_discarded() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();
    rig.sensors.set_button(true);
    rig.run_until_state(&mut ctl, StateId::Maintenance, rig.timing.factory_reset_hold_ms + 1_000);

    http::accept_config_form(b"wifiSSID=Late", &rig.inbound_tx).unwrap();
    rig.tick(&mut ctl);

    assert_ne!(ctl.config().wifi_ssid.as_str(), "Late");
    assert!(!rig.storage.exists(NAMESPACE, keys::WIFI_SSID));
    assert_eq!(ctl.pending_restart_at(), None);
}

#[test]
fn short_press_is_cancelled() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();

    rig.sensors.set_button(true);
    rig.run_for(&mut ctl, 2_000);
    rig.sensors.set_button(false);
    rig.run_for(&mut ctl, 6_000);

    assert_eq!(ctl.state(), StateId::Ready);
    assert_eq!(rig.system.restarts(), 0);
    assert!(rig.storage.exists(NAMESPACE, keys::DEVICE_ID));
}

#[test]
fn single_sample_press_does_nothing() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();

    rig.sensors.set_button(true);
    rig.tick(&mut ctl);
    rig.sensors.set_button(false);
    rig.run_for(&mut ctl, 6_000);

    assert_eq!(rig.system.restarts(), 0);
}

// ── Firmware update ───────────────────────────────────────────

#[test]
fn update_takes_over_then_resumes_and_restarts() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();
    let command = ctl.topics().command.clone();
    let status_topic = ctl.topics().status.clone();

    rig.update_tx.send(UpdateEvent::Started { total: 200_000 }).unwrap();
    rig.tick(&mut ctl);
    assert_eq!(ctl.state(), StateId::OtaUpdate);
    assert!(ctl.is_updating());

    // Commands are dropped while the transfer runs.
    let statuses = rig.published_on(&status_topic).len();
    rig.mqtt.inject(&command, br#"{"command":"ping"}"#);
    rig.update_tx
        .send(UpdateEvent::Progress {
            written: 131_072,
            total: 200_000,
        })
        .unwrap();
    rig.tick(&mut ctl);
    assert_eq!(rig.published_on(&status_topic).len(), statuses);
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::UpdateProgress { .. })),
        2
    );

    // No scheduled publications during the update either.
    rig.run_for(&mut ctl, 60_000);
    assert_eq!(rig.published_on(&status_topic).len(), statuses);

    rig.update_tx.send(UpdateEvent::Completed).unwrap();
    rig.tick(&mut ctl);
    assert_eq!(ctl.state(), StateId::Ready);
    assert!(!ctl.is_updating());
    let done_at = rig.now_ms;
    assert_eq!(
        ctl.pending_restart_at(),
        Some(done_at + rig.timing.restart_grace_ms)
    );

    rig.run_for(&mut ctl, rig.timing.restart_grace_ms);
    assert_eq!(rig.system.restarts(), 1);
}

#[test]
fn failed_update_is_reported_as_a_fault() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();

    rig.update_tx.send(UpdateEvent::Started { total: 4_096 }).unwrap();
    rig.update_tx
        .send(UpdateEvent::Failed(UpdateError::WriteFailed))
        .unwrap();
    rig.tick(&mut ctl);

    assert_eq!(ctl.state(), StateId::Error);
    assert_eq!(
        ctl.last_fault(),
        Some(Error::Update(UpdateError::WriteFailed))
    );
    assert!(!ctl.is_updating());
    assert_eq!(ctl.pending_restart_at(), None);

    rig.run_until_state(&mut ctl, StateId::Ready, 30_000);
}

#[test]
fn button_is_ignored_during_an_update() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();

    rig.update_tx.send(UpdateEvent::Started { total: 8_192 }).unwrap();
    rig.sensors.set_button(true);
    rig.run_for(&mut ctl, rig.timing.factory_reset_hold_ms + 1_000);

    assert_eq!(ctl.state(), StateId::OtaUpdate);
    assert_eq!(rig.system.restarts(), 0);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::FactoryReset)), 0);
}

#[test]
fn http_upload_drives_the_controller() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();

    let image = vec![0xA5u8; 150_000];
    let mut offset = 0;
    let written = http::receive_firmware(image.len() as u32, rig.update_tx.clone(), |buf| {
        let n = (image.len() - offset).min(buf.len());
        buf[..n].copy_from_slice(&image[offset..offset + n]);
        offset += n;
        Ok::<_, ()>(n)
    })
    .unwrap();
    assert_eq!(written, 150_000);

    rig.tick(&mut ctl);
    let transitions = rig.sink.transitions();
    assert!(transitions.contains(&(StateId::Ready, StateId::OtaUpdate)));
    assert_eq!(transitions.last(), Some(&(StateId::OtaUpdate, StateId::Ready)));
    // Start, two 64 KiB steps.
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::UpdateProgress { .. })),
        3
    );
    assert!(ctl.pending_restart_at().is_some());
}

#[test]
fn interrupted_http_upload_faults_without_restart() {
    let mut rig = Rig::new();
    let mut ctl = rig.boot_ready();

    let mut calls = 0;
    let result = http::receive_firmware(100_000, rig.update_tx.clone(), |buf| {
        calls += 1;
        if calls > 2 {
            return Err("connection reset");
        }
        buf.fill(0);
        Ok(buf.len())
    });
    assert_eq!(result, Err(UpdateError::IncompleteTransfer));

    rig.tick(&mut ctl);
    assert_eq!(ctl.state(), StateId::Error);
    assert_eq!(
        ctl.last_fault(),
        Some(Error::Update(UpdateError::IncompleteTransfer))
    );
    assert_eq!(ctl.pending_restart_at(), None);
}
