//! Pet Smart Home firmware: main entry point.
//!
//! Hexagonal architecture with a single polling tick thread.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  WifiAdapter   MqttAdapter    NvsAdapter     SystemAdapter     │
//! │  (Network)     (Broker)       (Storage)      (System)          │
//! │  BoardSensors  BoardIndicator  MechanismBridge  LogEventSink   │
//! │  (Sensor)      (Indicator)     (Peripheral)     (EventSink)    │
//! │  HTTP server (config form, status mirror, firmware upload)     │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              Controller (pure logic)                   │    │
//! │  │  FSM · Connectivity · Router · Scheduler · Maintenance │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  MQTT rx thread / httpd task ──mpsc──▶ Inbox / UpdatePort      │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::time::Duration;

use anyhow::Result;
use log::{info, LevelFilter};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::prelude::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;

use petsmart::adapters::hardware::{BoardIndicator, BoardSensors};
use petsmart::adapters::http::{self, StatusMirror};
use petsmart::adapters::log_sink::LogEventSink;
use petsmart::adapters::mqtt::{inbound_channel, MqttAdapter};
use petsmart::adapters::nvs::NvsAdapter;
use petsmart::adapters::ota::{self, update_channel};
use petsmart::adapters::peripherals::MechanismBridge;
use petsmart::adapters::system::SystemAdapter;
use petsmart::adapters::wifi::WifiAdapter;
use petsmart::app::ports::DevicePorts;
use petsmart::app::service::Controller;
use petsmart::config::{Timing, FIRMWARE_VERSION};
use petsmart::drivers::hw_init;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Pet Smart Home v{:<20}║", FIRMWARE_VERSION);
    info!("╚══════════════════════════════════════╝");

    // ── 1b. OTA rollback check ─────────────────────────────────
    ota::check_rollback();

    // ── 1c. Board peripherals ─────────────────────────────────
    if let Err(e) = hw_init::init_peripherals() {
        // Without GPIO the button and indicators are dead; keep running so
        // the device stays reachable over the network.
        log::error!("HAL init failed: {}, continuing without board I/O", e);
    }

    // ── 2. Storage ────────────────────────────────────────────
    let mut storage = NvsAdapter::new().map_err(|e| anyhow::anyhow!("NVS init failed: {}", e))?;

    // ── 3. Transports ─────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut network = WifiAdapter::new(peripherals.modem, sys_loop, nvs_partition)?;

    let (inbound_tx, mut inbound) = inbound_channel();
    let mut broker = MqttAdapter::new(inbound_tx.clone());

    let (update_tx, mut updates) = update_channel();
    let mirror = StatusMirror::new();
    let _http = http::start_server(inbound_tx, update_tx, mirror.clone())?;

    // ── 4. Remaining adapters ─────────────────────────────────
    let mut system = SystemAdapter::new();
    let mut board = BoardSensors::new();
    let mut indicator = BoardIndicator::new();
    let mut mechanisms = MechanismBridge::new();
    let mut sink = LogEventSink::with_mirror(mirror);

    // ── 5. Controller ─────────────────────────────────────────
    let timing = Timing::default();
    let tick = Duration::from_millis(timing.tick_interval_ms);
    let mut controller = Controller::new(timing);

    {
        let now = system.uptime_ms();
        let mut ports = DevicePorts {
            network: &mut network,
            broker: &mut broker,
            inbound: &mut inbound,
            update: &mut updates,
            storage: &mut storage,
            system: &mut system,
            sensors: &mut board,
            peripherals: &mut mechanisms,
            indicator: &mut indicator,
            sink: &mut sink,
        };
        controller.start(now, &mut ports);
    }

    if controller.config().debug_enabled {
        log::set_max_level(LevelFilter::Debug);
        info!("Debug logging enabled");
    }
    info!(
        "Device {} ready, entering tick loop ({} ms)",
        controller.identity(),
        tick.as_millis()
    );

    // ── 6. Tick loop ──────────────────────────────────────────
    loop {
        let now = system.uptime_ms();
        let mut ports = DevicePorts {
            network: &mut network,
            broker: &mut broker,
            inbound: &mut inbound,
            update: &mut updates,
            storage: &mut storage,
            system: &mut system,
            sensors: &mut board,
            peripherals: &mut mechanisms,
            indicator: &mut indicator,
            sink: &mut sink,
        };
        controller.tick(now, &mut ports);
        std::thread::sleep(tick);
    }
}
