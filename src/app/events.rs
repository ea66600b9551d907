//! Application events, both directions.
//!
//! - **Outbound**: [`AppEvent`]s emitted by the
//!   [`Controller`](super::service::Controller) through the
//!   [`EventSink`](super::ports::EventSink) port.
//! - **Inbound**: [`InboundEvent`]s delivered by transport callbacks and
//!   queued in the tick-owned [`Inbox`], drained once per tick.
//! - **Update**: [`UpdateEvent`]s reported by the firmware-update
//!   transport through [`UpdatePort`](super::ports::UpdatePort).
//!
//! ```text
//!  MQTT rx thread ─┐                    ┌──────────────┐
//!                  ├─▶ mpsc channel ──▶ │ Inbox (SPSC) │ ──▶ tick: router
//!  HTTP handler ───┘   (InboundPort)    └──────────────┘
//! ```

use heapless::spsc::Queue;
use log::warn;

use crate::error::{Error, UpdateError};
use crate::fsm::StateId;
use crate::telemetry::{StatusPayload, TelemetryPayload};

use super::commands::DeviceCommand;
use super::ports::PublicationKind;

// ───────────────────────────────────────────────────────────────
// Outbound
// ───────────────────────────────────────────────────────────────

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The controller has started (carries initial state).
    Started(StateId),

    /// The FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// A status document was built (published or not).
    Status(StatusPayload),

    /// A telemetry document was built.
    Telemetry(TelemetryPayload),

    /// A scheduled or on-demand publication failed and was skipped.
    PublishSkipped(PublicationKind),

    /// A condition went through the error-reporting path.
    Fault(Error),

    /// A recognised command was executed.
    CommandHandled(DeviceCommand),

    /// A config patch was accepted and applied.
    ConfigApplied { persisted: bool },

    /// Factory reset fired: storage cleared, restart requested.
    FactoryReset,

    /// Firmware update progress.
    UpdateProgress { written: u32, total: u32 },
}

// ───────────────────────────────────────────────────────────────
// Inbound
// ───────────────────────────────────────────────────────────────

/// Something a transport callback handed to the tick thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A broker message on a subscribed topic.
    Message { topic: String, payload: Vec<u8> },
    /// Raw `application/x-www-form-urlencoded` body from `POST /api/config`.
    ConfigForm(String),
}

/// Inbox depth.  heapless' SPSC queue keeps one slot free.
pub const INBOX_CAPACITY: usize = 16;

/// Bounded single-producer queue owned by the tick thread.
pub struct Inbox {
    queue: Queue<InboundEvent, { INBOX_CAPACITY + 1 }>,
    dropped: u32,
}

impl Inbox {
    pub fn new() -> Self {
        Self {
            queue: Queue::new(),
            dropped: 0,
        }
    }

    /// Enqueue an event; returns `false` (and counts a drop) when full.
    pub fn push(&mut self, event: InboundEvent) -> bool {
        match self.queue.enqueue(event) {
            Ok(()) => true,
            Err(_) => {
                self.dropped = self.dropped.wrapping_add(1);
                warn!("Inbox: full, dropping inbound event ({} dropped)", self.dropped);
                false
            }
        }
    }

    pub fn pop(&mut self) -> Option<InboundEvent> {
        self.queue.dequeue()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Events lost to a full queue since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// Update transport events
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateEvent {
    Started { total: u32 },
    Progress { written: u32, total: u32 },
    Completed,
    Failed(UpdateError),
}
