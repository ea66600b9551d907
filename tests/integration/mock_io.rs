//! Host-side device rig for integration tests.
//!
//! Bundles the simulation builds of every adapter plus a recording event
//! sink and a storage wrapper that can be told to fail, and drives a
//! [`Controller`] with a virtual monotonic clock.

use std::sync::mpsc::Sender;

use petsmart::adapters::hardware::{BoardIndicator, BoardSensors};
use petsmart::adapters::mqtt::{ChannelInbound, MqttAdapter, inbound_channel};
use petsmart::adapters::nvs::NvsAdapter;
use petsmart::adapters::ota::{UpdateEvents, update_channel};
use petsmart::adapters::peripherals::MechanismBridge;
use petsmart::adapters::system::SystemAdapter;
use petsmart::adapters::wifi::WifiAdapter;
use petsmart::app::events::{AppEvent, InboundEvent, UpdateEvent};
use petsmart::app::ports::{DevicePorts, EventSink, StorageError, StoragePort};
use petsmart::app::service::Controller;
use petsmart::config::Timing;
use petsmart::fsm::StateId;

// ── Recording sink ────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn transitions(&self) -> Vec<(StateId, StateId)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::StateChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Storage that can be told to fail ──────────────────────────

pub struct FlakyStorage {
    pub inner: NvsAdapter,
    pub fail_writes: bool,
}

impl FlakyStorage {
    fn new() -> Self {
        Self {
            inner: NvsAdapter::new().expect("sim NVS"),
            fail_writes: false,
        }
    }
}

impl StoragePort for FlakyStorage {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.inner.read(namespace, key, buf)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.inner.write(namespace, key, data)
    }

    fn write_batch(
        &mut self,
        namespace: &str,
        entries: &[(&str, &[u8])],
    ) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.inner.write_batch(namespace, entries)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.inner.delete(namespace, key)
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.inner.exists(namespace, key)
    }

    fn erase_namespace(&mut self, namespace: &str) -> Result<(), StorageError> {
        self.inner.erase_namespace(namespace)
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub struct Rig {
    pub now_ms: u64,
    pub timing: Timing,
    pub wifi: WifiAdapter,
    pub mqtt: MqttAdapter,
    pub inbound: ChannelInbound,
    pub inbound_tx: Sender<InboundEvent>,
    pub updates: UpdateEvents,
    pub update_tx: Sender<UpdateEvent>,
    pub storage: FlakyStorage,
    pub system: SystemAdapter,
    pub sensors: BoardSensors,
    pub mechanisms: MechanismBridge,
    pub indicator: BoardIndicator,
    pub sink: RecordingSink,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        let (inbound_tx, inbound) = inbound_channel();
        let (update_tx, updates) = update_channel();
        Self {
            now_ms: 0,
            timing: Timing::default(),
            wifi: WifiAdapter::new(),
            mqtt: MqttAdapter::new(inbound_tx.clone()),
            inbound,
            inbound_tx,
            updates,
            update_tx,
            storage: FlakyStorage::new(),
            system: SystemAdapter::new(),
            sensors: BoardSensors::new(),
            mechanisms: MechanismBridge::new(),
            indicator: BoardIndicator::new(),
            sink: RecordingSink::default(),
        }
    }

    fn ports(&mut self) -> DevicePorts<'_> {
        DevicePorts {
            network: &mut self.wifi,
            broker: &mut self.mqtt,
            inbound: &mut self.inbound,
            update: &mut self.updates,
            storage: &mut self.storage,
            system: &mut self.system,
            sensors: &mut self.sensors,
            peripherals: &mut self.mechanisms,
            indicator: &mut self.indicator,
            sink: &mut self.sink,
        }
    }

    /// Build a controller and run `start`, as a boot would.
    pub fn boot(&mut self) -> Controller {
        let mut ctl = Controller::new(self.timing);
        let now = self.now_ms;
        ctl.start(now, &mut self.ports());
        ctl
    }

    /// Advance the clock by one tick interval and tick once.
    pub fn tick(&mut self, ctl: &mut Controller) {
        self.now_ms += self.timing.tick_interval_ms;
        let now = self.now_ms;
        ctl.tick(now, &mut self.ports());
    }

    /// Tick until `ms` of virtual time have passed.
    pub fn run_for(&mut self, ctl: &mut Controller, ms: u64) {
        let end = self.now_ms + ms;
        while self.now_ms < end {
            self.tick(ctl);
        }
    }

    /// Tick until `state` is reached; panics after `max_ms`.
    pub fn run_until_state(&mut self, ctl: &mut Controller, state: StateId, max_ms: u64) {
        let end = self.now_ms + max_ms;
        while ctl.state() != state {
            assert!(
                self.now_ms < end,
                "did not reach {:?} within {} ms (stuck in {:?})",
                state,
                max_ms,
                ctl.state()
            );
            self.tick(ctl);
        }
    }

    /// Boot and bring the device to READY.
    pub fn boot_ready(&mut self) -> Controller {
        let mut ctl = self.boot();
        self.run_until_state(&mut ctl, StateId::Ready, 5_000);
        ctl
    }

    /// Publications on `topic`, oldest first, as JSON values.
    pub fn published_on(&self, topic: &str) -> Vec<serde_json::Value> {
        self.mqtt
            .published()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| serde_json::from_slice(p).expect("published JSON"))
            .collect()
    }
}
