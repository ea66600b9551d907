//! Maintenance Gate: factory-reset hold detection and firmware-update
//! exclusivity.
//!
//! ## Factory reset
//!
//! Active-low push button sampled once per tick.  A press must survive the
//! debounce window and then stay asserted until the hold threshold,
//! measured from the press edge.
//!
//! ```text
//!  Idle ──press──▶ Debounce ──still pressed @50ms──▶ Held ──@5s──▶ Latched
//!   ▲                 │                               │              │
//!   └───release───────┴──────────release (Cancelled)──┘              │
//!   └───────────────────────────release──────────────────────────────┘
//! ```
//!
//! The detector latches after firing so a button that is still held cannot
//! fire twice.
//!
//! ## Update exclusivity
//!
//! [`UpdateGate`] remembers the state that was active when an update
//! started, so the controller can return to it on completion.

use log::{info, warn};

use crate::error::UpdateError;
use crate::fsm::StateId;

// ═══════════════════════════════════════════════════════════════
//  Factory reset
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetEvent {
    /// Debounced press accepted; the hold timer is running.
    HoldStarted,
    /// Released before the threshold.  No side effects.
    Cancelled,
    /// Held for the full threshold.
    Triggered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HoldState {
    Idle,
    Debounce { edge_ms: u64 },
    Held { edge_ms: u64 },
    Latched,
}

pub struct FactoryResetDetector {
    state: HoldState,
    debounce_ms: u64,
    hold_ms: u64,
}

impl FactoryResetDetector {
    pub fn new(debounce_ms: u64, hold_ms: u64) -> Self {
        Self {
            state: HoldState::Idle,
            debounce_ms,
            hold_ms,
        }
    }

    /// Feed one level sample.  Call once per tick.
    pub fn sample(&mut self, pressed: bool, now_ms: u64) -> Option<ResetEvent> {
        match self.state {
            HoldState::Idle => {
                if pressed {
                    self.state = HoldState::Debounce { edge_ms: now_ms };
                }
                None
            }

            HoldState::Debounce { edge_ms } => {
                if !pressed {
                    self.state = HoldState::Idle;
                    return None;
                }
                if now_ms.saturating_sub(edge_ms) >= self.debounce_ms {
                    self.state = HoldState::Held { edge_ms };
                    info!("Button: held, factory reset in {} ms", self.hold_ms);
                    return Some(ResetEvent::HoldStarted);
                }
                None
            }

            HoldState::Held { edge_ms } => {
                let held = now_ms.saturating_sub(edge_ms);
                if !pressed {
                    self.state = HoldState::Idle;
                    info!("Button: released after {} ms, factory reset cancelled", held);
                    return Some(ResetEvent::Cancelled);
                }
                if held >= self.hold_ms {
                    self.state = HoldState::Latched;
                    warn!("Button: held {} ms, factory reset", held);
                    return Some(ResetEvent::Triggered);
                }
                None
            }

            HoldState::Latched => {
                if !pressed {
                    self.state = HoldState::Idle;
                }
                None
            }
        }
    }

    /// `true` while a debounced press is being timed.
    pub fn is_holding(&self) -> bool {
        matches!(self.state, HoldState::Held { .. })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Update gate
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct UpdateGate {
    resume_to: Option<StateId>,
    written: u32,
    total: u32,
}

impl UpdateGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_updating(&self) -> bool {
        self.resume_to.is_some()
    }

    /// Open the gate, remembering `current` as the state to resume.
    pub fn begin(&mut self, current: StateId, total: u32) -> Result<(), UpdateError> {
        if self.is_updating() {
            return Err(UpdateError::AlreadyInProgress);
        }
        // Never resume into the update state itself.
        let resume = if current == StateId::OtaUpdate {
            StateId::Ready
        } else {
            current
        };
        info!("Update: started ({} bytes), will resume {:?}", total, resume);
        self.resume_to = Some(resume);
        self.written = 0;
        self.total = total;
        Ok(())
    }

    pub fn progress(&mut self, written: u32, total: u32) {
        self.written = written;
        self.total = total;
    }

    /// Close the gate after success; returns the state to resume.
    pub fn complete(&mut self) -> Option<StateId> {
        let resume = self.resume_to.take();
        if resume.is_some() {
            info!("Update: completed ({} bytes)", self.written);
        }
        resume
    }

    /// Close the gate after a failure.
    pub fn fail(&mut self, reason: UpdateError) {
        if self.resume_to.take().is_some() {
            warn!(
                "Update: failed at {}/{} bytes: {}",
                self.written, self.total, reason
            );
        }
    }

    /// `(written, total)` of the current or last transfer.
    pub fn progress_bytes(&self) -> (u32, u32) {
        (self.written, self.total)
    }
}
