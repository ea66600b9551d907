//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (UART / USB-CDC in production).  Lines carry a
//! fixed tag (`STATE |`, `PUBLISH |`, `FAULT |` ...) so a serial capture
//! can be filtered with grep.
//!
//! An optional [`StatusMirror`] is fed alongside, so the HTTP status
//! route serves the same document the broker last saw.

use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

use super::http::StatusMirror;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink {
    mirror: Option<StatusMirror>,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self { mirror: None }
    }

    /// Also keep `mirror` up to date with every status document.
    pub fn with_mirror(mirror: StatusMirror) -> Self {
        Self {
            mirror: Some(mirror),
        }
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(state) => {
                info!("START | initial_state={:?}", state);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::Status(s) => {
                debug!(
                    "PUBLISH | status | state={} | uptime={}ms | heap={} | rssi={}dBm | battery={}%",
                    s.state, s.uptime, s.free_heap, s.wifi_rssi, s.battery_level,
                );
            }
            AppEvent::Telemetry(t) => {
                info!(
                    "PUBLISH | telemetry | battery={:.2}V ({}%) | rssi={}dBm | heap={} | \
                     T={} | food={}% | door={}",
                    t.battery_voltage,
                    t.battery_level,
                    t.wifi_rssi,
                    t.free_heap,
                    t.temperature
                        .map_or_else(|| String::from("n/a"), |c| format!("{:.1}\u{00b0}C", c)),
                    t.food_level,
                    if t.door_open { "OPEN" } else { "CLOSED" },
                );
            }
            AppEvent::PublishSkipped(kind) => {
                warn!("PUBLISH | skipped {:?} (not connected)", kind);
            }
            AppEvent::Fault(err) => {
                warn!("FAULT | {}", err);
            }
            AppEvent::CommandHandled(cmd) => {
                info!("COMMAND | {:?}", cmd);
            }
            AppEvent::ConfigApplied { persisted } => {
                info!(
                    "CONFIG | applied, {}",
                    if *persisted { "persisted" } else { "NOT persisted" }
                );
            }
            AppEvent::FactoryReset => {
                warn!("RESET | factory reset, storage cleared");
            }
            AppEvent::UpdateProgress { written, total } => {
                info!("OTA | {}/{} bytes", written, total);
            }
        }

        if let Some(mirror) = self.mirror.as_mut() {
            mirror.emit(event);
        }
    }
}
