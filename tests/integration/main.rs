//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that drives the controller through the
//! host simulations of every adapter.  All tests run on the host (x86_64)
//! with no real hardware required.

mod config_update_tests;
mod controller_tests;
mod maintenance_tests;
mod mock_io;
