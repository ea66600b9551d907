//! Pet Smart Home controller firmware library.
//!
//! Exposes the pure-logic modules for integration testing and host-side
//! simulation.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod fsm;
pub mod identity;
pub mod maintenance;
pub mod reporter;
pub mod router;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod topics;

pub mod pins;

// Adapters and drivers compile on every target; the hardware paths inside
// are cfg-gated and fall back to simulations off-target.
pub mod adapters;
pub mod drivers;
