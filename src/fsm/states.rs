//! Concrete state handler functions and table builder.
//!
//! Each state is defined by three plain `fn` pointers: no closures, no
//! dynamic dispatch, no heap.
//!
//! ```text
//!  INITIALIZING ──[config loaded]──▶ CONNECTING_WIFI ──[timeout]──▶ ERROR
//!                                        │    ▲                     │  │
//!                              [associated]  [link lost]  [associated] │
//!                                        ▼    │                     │  │
//!                                    CONNECTING_MQTT ◀──────────────┘  │
//!                                        │    ▲    └──[refused]──▶ ERROR
//!                                [session up] [session lost]           │
//!                                        ▼    │                        │
//!                                      READY ◀───────[session up]──────┘
//!
//!  Any state ──[factory reset]──▶ MAINTENANCE
//!  Any state ──[update started]──▶ OTA_UPDATE ──▶ previous state | ERROR
//! ```
//!
//! MAINTENANCE and OTA_UPDATE are entered and left by the controller via
//! `force_transition`; their update handlers never move on their own.

use super::context::DeviceContext;
use super::{StateDescriptor, StateId};
use crate::connectivity::LinkEvent;
use log::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0: Initializing
        StateDescriptor {
            id: StateId::Initializing,
            name: "INITIALIZING",
            on_enter: Some(initializing_enter),
            on_exit: None,
            on_update: initializing_update,
        },
        // Index 1: ConnectingWifi
        StateDescriptor {
            id: StateId::ConnectingWifi,
            name: "CONNECTING_WIFI",
            on_enter: Some(connecting_wifi_enter),
            on_exit: None,
            on_update: connecting_wifi_update,
        },
        // Index 2: ConnectingMqtt
        StateDescriptor {
            id: StateId::ConnectingMqtt,
            name: "CONNECTING_MQTT",
            on_enter: Some(connecting_mqtt_enter),
            on_exit: None,
            on_update: connecting_mqtt_update,
        },
        // Index 3: Ready
        StateDescriptor {
            id: StateId::Ready,
            name: "READY",
            on_enter: Some(ready_enter),
            on_exit: Some(ready_exit),
            on_update: ready_update,
        },
        // Index 4: Error
        StateDescriptor {
            id: StateId::Error,
            name: "ERROR",
            on_enter: Some(error_enter),
            on_exit: Some(error_exit),
            on_update: error_update,
        },
        // Index 5: Maintenance
        StateDescriptor {
            id: StateId::Maintenance,
            name: "MAINTENANCE",
            on_enter: Some(maintenance_enter),
            on_exit: None,
            on_update: hold_update,
        },
        // Index 6: OtaUpdate
        StateDescriptor {
            id: StateId::OtaUpdate,
            name: "OTA_UPDATE",
            on_enter: Some(ota_enter),
            on_exit: Some(ota_exit),
            on_update: hold_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  INITIALIZING
// ═══════════════════════════════════════════════════════════════════════════

fn initializing_enter(ctx: &mut DeviceContext) {
    ctx.operational = false;
    info!("INITIALIZING: loading configuration");
}

fn initializing_update(ctx: &mut DeviceContext) -> Option<StateId> {
    ctx.config_loaded.then_some(StateId::ConnectingWifi)
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTING_WIFI
// ═══════════════════════════════════════════════════════════════════════════

fn connecting_wifi_enter(ctx: &mut DeviceContext) {
    info!(
        "CONNECTING_WIFI: '{}' (timeout {} ms)",
        ctx.config.wifi_ssid, ctx.timing.association_timeout_ms
    );
}

fn connecting_wifi_update(ctx: &mut DeviceContext) -> Option<StateId> {
    match ctx.link_event? {
        LinkEvent::Associated => Some(StateId::ConnectingMqtt),
        LinkEvent::AssociationTimedOut => Some(StateId::Error),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTING_MQTT
// ═══════════════════════════════════════════════════════════════════════════

fn connecting_mqtt_enter(ctx: &mut DeviceContext) {
    info!(
        "CONNECTING_MQTT: {}:{} as {}",
        ctx.config.mqtt_server, ctx.config.mqtt_port, ctx.client_id
    );
}

fn connecting_mqtt_update(ctx: &mut DeviceContext) -> Option<StateId> {
    match ctx.link_event? {
        LinkEvent::SessionEstablished => Some(StateId::Ready),
        LinkEvent::SessionFailed => Some(StateId::Error),
        LinkEvent::LinkLost => Some(StateId::ConnectingWifi),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  READY: the only state that routes commands and publishes telemetry
// ═══════════════════════════════════════════════════════════════════════════

fn ready_enter(ctx: &mut DeviceContext) {
    ctx.operational = true;
    info!("READY: device {} online", ctx.identity);
}

fn ready_exit(ctx: &mut DeviceContext) {
    ctx.operational = false;
    info!("READY: leaving after {} ms", ctx.ms_in_state());
}

fn ready_update(ctx: &mut DeviceContext) -> Option<StateId> {
    match ctx.link_event? {
        LinkEvent::SessionLost => Some(StateId::ConnectingMqtt),
        LinkEvent::LinkLost => Some(StateId::ConnectingWifi),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  ERROR: left only by a successful reconnect sequence
// ═══════════════════════════════════════════════════════════════════════════

fn error_enter(ctx: &mut DeviceContext) {
    ctx.operational = false;
    warn!("ERROR: waiting for a successful reconnect");
}

fn error_exit(ctx: &mut DeviceContext) {
    info!("ERROR: recovered after {} ms", ctx.ms_in_state());
}

fn error_update(ctx: &mut DeviceContext) -> Option<StateId> {
    match ctx.link_event? {
        LinkEvent::Associated => Some(StateId::ConnectingMqtt),
        LinkEvent::SessionEstablished => Some(StateId::Ready),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  MAINTENANCE / OTA_UPDATE: controller-driven
// ═══════════════════════════════════════════════════════════════════════════

fn maintenance_enter(ctx: &mut DeviceContext) {
    ctx.operational = false;
    warn!("MAINTENANCE: factory reset in progress");
}

fn ota_enter(ctx: &mut DeviceContext) {
    ctx.operational = false;
    info!("OTA_UPDATE: normal operation suspended");
}

fn ota_exit(_ctx: &mut DeviceContext) {
    info!("OTA_UPDATE: update window closed");
}

fn hold_update(_ctx: &mut DeviceContext) -> Option<StateId> {
    None
}
