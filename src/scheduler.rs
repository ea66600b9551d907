//! Telemetry Scheduler: three periodic publication triggers on one
//! monotonic clock.
//!
//! The scheduler knows nothing about payloads or the broker.  When a
//! trigger is due it notifies a [`SchedulerDelegate`]; the controller
//! implements the delegate to refresh the snapshot and publish.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                     Triggers                               │
//! │                                                            │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐    │
//! │  │ Status update│   │ Heartbeat    │   │ Telemetry    │    │
//! │  │ every 30 s   │   │ every 60 s   │   │ every 300 s  │    │
//! │  └──────┬───────┘   └──────┬───────┘   └──────┬───────┘    │
//! │         │                  │                  │            │
//! │         ▼                  ▼                  ▼            │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │                SchedulerDelegate                     │  │
//! │  │        (controller builds + publishes payload)       │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Firing order within one pass is fixed: status update, heartbeat,
//! telemetry.  The last-fired timestamp is aligned down to the cadence grid
//! after each firing, so tick jitter never accumulates and a long stall
//! produces one firing per trigger rather than a burst.  Whether the
//! delegate's publish succeeded has no influence on the timers.

use crate::app::ports::{PublicationKind, SchedulerDelegate};
use crate::config::Timing;
use log::debug;

// ═══════════════════════════════════════════════════════════════
//  Trigger
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
struct Trigger {
    kind: PublicationKind,
    interval_ms: u64,
    last_fired_ms: u64,
    fired: u32,
}

impl Trigger {
    fn new(kind: PublicationKind, interval_ms: u64) -> Self {
        Self {
            kind,
            interval_ms,
            last_fired_ms: 0,
            fired: 0,
        }
    }

    fn is_due(&self, now_ms: u64) -> bool {
        self.interval_ms > 0 && now_ms.saturating_sub(self.last_fired_ms) >= self.interval_ms
    }

    fn mark_fired(&mut self, now_ms: u64) {
        let since = now_ms - self.last_fired_ms;
        self.last_fired_ms = now_ms - since % self.interval_ms;
        self.fired = self.fired.wrapping_add(1);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

pub struct TelemetryScheduler {
    triggers: [Trigger; 3],
}

impl TelemetryScheduler {
    pub fn new(timing: &Timing) -> Self {
        Self {
            triggers: [
                Trigger::new(PublicationKind::StatusUpdate, timing.status_interval_ms),
                Trigger::new(PublicationKind::Heartbeat, timing.heartbeat_interval_ms),
                Trigger::new(PublicationKind::Telemetry, timing.telemetry_interval_ms),
            ],
        }
    }

    /// Start every cadence at `now_ms`.  Nothing fires until one full
    /// interval has elapsed.
    pub fn anchor(&mut self, now_ms: u64) {
        for t in &mut self.triggers {
            t.last_fired_ms = now_ms;
        }
    }

    /// Fire every due trigger, status before telemetry.
    pub fn tick(&mut self, now_ms: u64, delegate: &mut dyn SchedulerDelegate) {
        for t in &mut self.triggers {
            if t.is_due(now_ms) {
                debug!("Scheduler: {:?} due at {} ms", t.kind, now_ms);
                t.mark_fired(now_ms);
                delegate.on_publication_due(t.kind);
            }
        }
    }

    /// How many times `kind` has fired since construction.
    pub fn fired_count(&self, kind: PublicationKind) -> u32 {
        self.triggers
            .iter()
            .find(|t| t.kind == kind)
            .map_or(0, |t| t.fired)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
