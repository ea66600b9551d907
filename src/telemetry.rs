//! Telemetry snapshot and outbound JSON documents.
//!
//! The snapshot is rebuilt every time a publication fires; nothing here is
//! persisted.  Payload structs serialize straight to the wire shape with
//! `serde_json`.

use serde::Serialize;

use crate::app::ports::{NetworkPort, PeripheralPort, SensorPort, SystemPort};
use crate::config::{DeviceConfig, FIRMWARE_VERSION};
use crate::fsm::StateId;
use crate::identity::{DeviceIdString, DeviceIdentity};

// ---------------------------------------------------------------------------
// Mechanism states (reported by the external collaborators)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FeederState {
    #[default]
    Idle = 0,
    Dispensing = 1,
    Error = 2,
    Empty = 3,
    Jammed = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DoorState {
    #[default]
    Closed = 0,
    Opening = 1,
    Open = 2,
    Closing = 3,
    Error = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeederStatus {
    pub state: FeederState,
    /// Hopper fill level, percent.
    pub food_level: u8,
    /// Epoch seconds of the last dispense, 0 if never.
    pub last_feeding: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DoorStatus {
    pub state: DoorState,
    pub is_open: bool,
    /// Epoch seconds of the last authorised passage, 0 if never.
    pub last_access: u64,
    /// Rejected RFID attempts since boot.
    pub failed_attempts: u32,
}

// ---------------------------------------------------------------------------
// Battery
// ---------------------------------------------------------------------------

const BATTERY_EMPTY_V: f32 = 3.3;
const BATTERY_FULL_V: f32 = 4.2;

/// Linear Li-ion charge estimate, clamped to 0..=100.
pub fn battery_level(voltage: f32) -> u8 {
    if voltage.is_nan() {
        return 0;
    }
    let frac = (voltage - BATTERY_EMPTY_V) / (BATTERY_FULL_V - BATTERY_EMPTY_V);
    (frac * 100.0).clamp(0.0, 100.0) as u8
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Point-in-time readings assembled for one publication.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetrySnapshot {
    pub battery_voltage: f32,
    pub battery_level: u8,
    /// dBm; 0 when not associated.
    pub wifi_rssi: i8,
    pub uptime_ms: u64,
    pub free_heap: u32,
    pub temperature_c: Option<f32>,
    pub feeder: FeederStatus,
    pub door: DoorStatus,
}

impl TelemetrySnapshot {
    /// Read every source once.
    pub fn capture(
        now_ms: u64,
        sensors: &mut dyn SensorPort,
        network: &dyn NetworkPort,
        system: &dyn SystemPort,
        peripherals: &dyn PeripheralPort,
    ) -> Self {
        let battery_voltage = sensors.battery_voltage();
        Self {
            battery_voltage,
            battery_level: battery_level(battery_voltage),
            wifi_rssi: network.rssi().unwrap_or(0),
            uptime_ms: now_ms,
            free_heap: system.free_heap(),
            temperature_c: sensors.internal_temperature(),
            feeder: peripherals.feeder_status(),
            door: peripherals.door_status(),
        }
    }
}

// ---------------------------------------------------------------------------
// Status document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeederSection {
    pub state: u8,
    pub food_level: u8,
    pub last_feeding: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoorSection {
    pub state: u8,
    pub is_open: bool,
    pub last_access: u64,
}

/// Published on heartbeat, status-update, `status` and `ping`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub device_id: DeviceIdString,
    pub timestamp: u64,
    /// [`StateId`] ordinal.
    pub state: u8,
    pub uptime: u64,
    pub free_heap: u32,
    #[serde(rename = "wifiRSSI")]
    pub wifi_rssi: i8,
    pub battery_level: u8,
    pub firmware_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feeder: Option<FeederSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub door: Option<DoorSection>,
}

impl StatusPayload {
    pub fn build(
        identity: &DeviceIdentity,
        state: StateId,
        snap: &TelemetrySnapshot,
        epoch_secs: u64,
        config: &DeviceConfig,
    ) -> Self {
        Self {
            device_id: device_id(identity),
            timestamp: epoch_secs,
            state: state as u8,
            uptime: snap.uptime_ms,
            free_heap: snap.free_heap,
            wifi_rssi: snap.wifi_rssi,
            battery_level: snap.battery_level,
            firmware_version: FIRMWARE_VERSION,
            feeder: config.feeder_enabled.then(|| FeederSection {
                state: snap.feeder.state as u8,
                food_level: snap.feeder.food_level,
                last_feeding: snap.feeder.last_feeding,
            }),
            door: config.door_enabled.then(|| DoorSection {
                state: snap.door.state as u8,
                is_open: snap.door.is_open,
                last_access: snap.door.last_access,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Telemetry document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPayload {
    pub device_id: DeviceIdString,
    pub timestamp: u64,
    pub battery_voltage: f32,
    pub battery_level: u8,
    #[serde(rename = "wifiRSSI")]
    pub wifi_rssi: i8,
    pub uptime: u64,
    pub free_heap: u32,
    pub temperature: Option<f32>,
    pub food_level: u8,
    pub door_open: bool,
    pub failed_attempts: u32,
}

impl TelemetryPayload {
    pub fn build(identity: &DeviceIdentity, snap: &TelemetrySnapshot, epoch_secs: u64) -> Self {
        Self {
            device_id: device_id(identity),
            timestamp: epoch_secs,
            battery_voltage: snap.battery_voltage,
            battery_level: snap.battery_level,
            wifi_rssi: snap.wifi_rssi,
            uptime: snap.uptime_ms,
            free_heap: snap.free_heap,
            temperature: snap.temperature_c,
            food_level: snap.feeder.food_level,
            door_open: snap.door.is_open,
            failed_attempts: snap.door.failed_attempts,
        }
    }
}

// ---------------------------------------------------------------------------
// Log document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPayload {
    pub device_id: DeviceIdString,
    pub timestamp: u64,
    pub level: &'static str,
    pub message: String,
}

impl LogPayload {
    pub fn error(identity: &DeviceIdentity, epoch_secs: u64, message: String) -> Self {
        Self {
            device_id: device_id(identity),
            timestamp: epoch_secs,
            level: "ERROR",
            message,
        }
    }
}

fn device_id(identity: &DeviceIdentity) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    // Same capacity as the identity's own buffer.
    let _ = id.push_str(identity.as_str());
    id
}
