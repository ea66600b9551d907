//! Application core: pure orchestration logic, zero I/O.
//!
//! This module contains the business rules of the device: FSM
//! orchestration, inbound command execution, publication scheduling and
//! the maintenance gate.  All interaction with hardware and the network
//! happens through **port traits** defined in [`ports`], keeping this
//! layer fully testable without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
