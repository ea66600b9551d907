//! Bridge to the feeder and door mechanisms.
//!
//! The motor, load-cell, servo and RFID control loops run outside this
//! firmware core.  [`MechanismBridge`] is the seam: the controller asks
//! for dispenses and door movements through [`PeripheralPort`], and the
//! mechanism side reports its state back with [`MechanismBridge::update_feeder`]
//! and [`MechanismBridge::update_door`].
//!
//! Requests are queued in a bounded ring until the mechanism side takes
//! them; the door is tracked optimistically so status documents reflect a
//! command immediately.

use heapless::Deque;
use log::{info, warn};

use crate::app::ports::PeripheralPort;
use crate::telemetry::{DoorState, DoorStatus, FeederStatus};

/// Pending requests kept before the oldest is dropped.
pub const REQUEST_QUEUE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MechanismRequest {
    Feed { grams: u16 },
    OpenDoor { duration_ms: u32 },
    CloseDoor,
}

pub struct MechanismBridge {
    feeder: FeederStatus,
    door: DoorStatus,
    pending: Deque<MechanismRequest, REQUEST_QUEUE_DEPTH>,
}

impl MechanismBridge {
    pub fn new() -> Self {
        Self {
            feeder: FeederStatus {
                food_level: 100,
                ..FeederStatus::default()
            },
            door: DoorStatus::default(),
            pending: Deque::new(),
        }
    }

    /// Latest feeder state from the mechanism side.
    pub fn update_feeder(&mut self, status: FeederStatus) {
        self.feeder = status;
    }

    /// Latest door state from the mechanism side.
    pub fn update_door(&mut self, status: DoorStatus) {
        self.door = status;
    }

    /// Oldest request not yet taken by the mechanism side.
    pub fn take_request(&mut self) -> Option<MechanismRequest> {
        self.pending.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn enqueue(&mut self, request: MechanismRequest) {
        if self.pending.is_full() {
            if let Some(dropped) = self.pending.pop_front() {
                warn!("Mechanism: queue full, dropping {:?}", dropped);
            }
        }
        // Cannot fail: a slot was just freed if needed.
        let _ = self.pending.push_back(request);
    }
}

impl Default for MechanismBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl PeripheralPort for MechanismBridge {
    fn feeder_status(&self) -> FeederStatus {
        self.feeder
    }

    fn door_status(&self) -> DoorStatus {
        self.door
    }

    fn feed(&mut self, grams: u16) {
        info!("Mechanism: feed {} g", grams);
        self.enqueue(MechanismRequest::Feed { grams });
    }

    fn open_door(&mut self, duration_ms: u32) {
        info!("Mechanism: open door for {} ms", duration_ms);
        self.door.state = DoorState::Opening;
        self.enqueue(MechanismRequest::OpenDoor { duration_ms });
    }

    fn close_door(&mut self) {
        info!("Mechanism: close door");
        if self.door.is_open || self.door.state != DoorState::Closed {
            self.door.state = DoorState::Closing;
        }
        self.enqueue(MechanismRequest::CloseDoor);
    }
}
