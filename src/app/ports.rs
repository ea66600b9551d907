//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Controller (domain)
//! ```
//!
//! Driven adapters (network, broker, storage, sensors, peripherals,
//! indicator, update transport, event sinks) implement these traits.
//! The [`Controller`](super::service::Controller) receives them bundled in
//! [`DevicePorts`] on every tick, so the domain core never touches
//! hardware directly and owns no adapter.
//!
//! ## Contract notes
//!
//! - No port method may block longer than its transport's own bounded
//!   timeout.  The core polls; it never waits.
//! - **StoragePort** batch writes MUST commit atomically.
//! - All port errors are typed; callers must handle every variant explicitly.

use crate::error::ConnectivityError;
use crate::identity::MacAddress;
use crate::telemetry::{DoorStatus, FeederStatus};

use super::events::{AppEvent, Inbox, UpdateEvent};

// ───────────────────────────────────────────────────────────────
// Network port (link layer: WiFi station)
// ───────────────────────────────────────────────────────────────

/// Link-layer association.  `begin_association` only starts the attempt;
/// completion is observed through `is_associated` on later ticks.
pub trait NetworkPort {
    fn begin_association(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError>;

    fn is_associated(&self) -> bool;

    /// Tear the link down (also aborts a pending association).
    fn disconnect(&mut self);

    /// Signal strength of the current AP in dBm.
    fn rssi(&self) -> Option<i8>;
}

// ───────────────────────────────────────────────────────────────
// Broker port (session layer: MQTT)
// ───────────────────────────────────────────────────────────────

/// Everything needed to open a broker session.
#[derive(Debug, Clone, Copy)]
pub struct SessionParams<'a> {
    pub client_id: &'a str,
    pub host: &'a str,
    pub port: u16,
    /// Empty means anonymous.
    pub username: &'a str,
    pub password: &'a str,
    pub keepalive_secs: u16,
}

pub trait BrokerPort {
    /// Start one session attempt without waiting for the broker.  `Err`
    /// means the request could not be issued or was refused outright;
    /// acknowledgement shows up later through [`BrokerPort::is_connected`].
    fn connect(&mut self, params: &SessionParams<'_>) -> Result<(), ConnectivityError>;

    fn is_connected(&self) -> bool;

    fn subscribe(&mut self, topic: &str) -> Result<(), ConnectivityError>;

    /// Fire-and-forget publish at the transport's configured QoS.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), ConnectivityError>;

    fn disconnect(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Inbound port (callback threads → tick thread)
// ───────────────────────────────────────────────────────────────

/// Moves events delivered by transport callbacks (broker messages, HTTP
/// form posts) into the tick-owned [`Inbox`].
pub trait InboundPort {
    fn drain_into(&mut self, inbox: &mut Inbox);
}

// ───────────────────────────────────────────────────────────────
// Update port (firmware update transport)
// ───────────────────────────────────────────────────────────────

pub trait UpdatePort {
    /// Next pending update event, oldest first.
    fn poll_event(&mut self) -> Option<UpdateEvent>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// # Atomicity
///
/// - Single writes are atomic per key.
/// - `write_batch` MUST either commit every entry or none.  Backends that
///   persist each key as it is set (NVS does) restore the keys already
///   written when a later one fails.  A restore can itself fail on a
///   damaged or full partition, so after an `Err` the namespace is only
///   guaranteed unchanged if the adapter did not log a restore failure.
/// - Keys are namespaced; `erase_namespace` removes every key in one
///   namespace and nothing else.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Write several keys with one commit.
    fn write_batch(&mut self, namespace: &str, entries: &[(&str, &[u8])])
    -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;

    /// Remove every key in `namespace` (factory reset).
    fn erase_namespace(&mut self, namespace: &str) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// System port (chip services)
// ───────────────────────────────────────────────────────────────

pub trait SystemPort {
    /// Reboot the chip.  On hardware this never returns.
    fn restart(&mut self);

    /// Free heap in bytes.
    fn free_heap(&self) -> u32;

    /// Wall-clock seconds since the Unix epoch, 0 until time is synced.
    fn epoch_secs(&self) -> u64;

    /// Factory MAC used to derive the device identity.
    fn mac_address(&self) -> MacAddress;
}

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

pub trait SensorPort {
    /// Battery terminal voltage in volts.
    fn battery_voltage(&mut self) -> f32;

    /// Die temperature in °C, `None` where the chip has no sensor.
    fn internal_temperature(&mut self) -> Option<f32>;

    /// Debounce is done by the caller; this is the raw level.
    fn button_pressed(&mut self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Peripheral port (feeder / door mechanisms, external collaborators)
// ───────────────────────────────────────────────────────────────

/// Read model and verbs of the actuator subsystems.  The control
/// algorithms behind these calls live outside this crate.
pub trait PeripheralPort {
    fn feeder_status(&self) -> FeederStatus;

    fn door_status(&self) -> DoorStatus;

    /// Dispense `grams` of food.
    fn feed(&mut self, grams: u16);

    /// Open the door and close it again after `duration_ms`.
    fn open_door(&mut self, duration_ms: u32);

    fn close_door(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Indicator port (status LED + buzzer)
// ───────────────────────────────────────────────────────────────

pub trait IndicatorPort {
    fn set_led(&mut self, on: bool);

    fn set_buzzer(&mut self, on: bool);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / mirrors)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`]s through this port.
/// Adapters decide where they go (serial log, HTTP status mirror).
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Scheduler delegate (decouples scheduler from publishing)
// ───────────────────────────────────────────────────────────────

/// Callback trait that the [`TelemetryScheduler`](crate::scheduler::TelemetryScheduler)
/// invokes when a publication trigger fires.
///
/// The scheduler knows nothing about payloads or the broker; the
/// controller implements this to build and publish the document.
pub trait SchedulerDelegate {
    fn on_publication_due(&mut self, kind: PublicationKind);
}

/// Discriminant passed to [`SchedulerDelegate::on_publication_due`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicationKind {
    /// 60 s liveness status.
    Heartbeat,
    /// 30 s status refresh (same payload as heartbeat).
    StatusUpdate,
    /// 300 s extended telemetry.
    Telemetry,
}

// ───────────────────────────────────────────────────────────────
// Port bundle
// ───────────────────────────────────────────────────────────────

/// Every port the controller touches during one tick, borrowed for the
/// duration of that tick.
pub struct DevicePorts<'a> {
    pub network: &'a mut dyn NetworkPort,
    pub broker: &'a mut dyn BrokerPort,
    pub inbound: &'a mut dyn InboundPort,
    pub update: &'a mut dyn UpdatePort,
    pub storage: &'a mut dyn StoragePort,
    pub system: &'a mut dyn SystemPort,
    pub sensors: &'a mut dyn SensorPort,
    pub peripherals: &'a mut dyn PeripheralPort,
    pub indicator: &'a mut dyn IndicatorPort,
    pub sink: &'a mut dyn EventSink,
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// Stored bytes failed to decode.
    Corrupted,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Corrupted => write!(f, "stored value corrupted"),
        }
    }
}
