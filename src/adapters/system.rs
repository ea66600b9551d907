//! Chip services: restart, heap, clocks and the factory MAC.
//!
//! - **`target_os = "espidf"`**: `esp_restart`, `esp_get_free_heap_size`,
//!   `esp_timer_get_time` for the monotonic clock, SNTP for wall time and
//!   the eFuse MAC.
//! - **`not(target_os = "espidf")`**: `std::time::Instant` and a fixed MAC
//!   for host-side runs; `restart` is only counted.

use log::info;

use crate::app::ports::SystemPort;
use crate::identity::MacAddress;

/// Wall-clock values before this are "not synced yet" (2020-01-01).
const EPOCH_2020: u64 = 1_577_836_800;

pub struct SystemAdapter {
    #[cfg(target_os = "espidf")]
    _sntp: Option<esp_idf_svc::sntp::EspSntp<'static>>,

    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    #[cfg(not(target_os = "espidf"))]
    sim_epoch: u64,
    #[cfg(not(target_os = "espidf"))]
    sim_restarts: u32,
}

#[cfg(target_os = "espidf")]
impl SystemAdapter {
    /// Starts SNTP in the background; wall time stays 0 until it syncs.
    pub fn new() -> Self {
        let sntp = match esp_idf_svc::sntp::EspSntp::new_default() {
            Ok(sntp) => Some(sntp),
            Err(e) => {
                log::warn!("SNTP start failed: {:?}", e);
                None
            }
        };
        Self { _sntp: sntp }
    }

    /// Milliseconds since boot (monotonic).
    pub fn uptime_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }
}

#[cfg(not(target_os = "espidf"))]
impl SystemAdapter {
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
            sim_epoch: 0,
            sim_restarts: 0,
        }
    }

    /// Milliseconds since construction (monotonic).
    pub fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Simulation: pretend SNTP delivered this wall time.
    pub fn set_epoch(&mut self, secs: u64) {
        self.sim_epoch = secs;
    }

    pub fn restarts(&self) -> u32 {
        self.sim_restarts
    }
}

impl Default for SystemAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl SystemPort for SystemAdapter {
    fn restart(&mut self) {
        info!("System: restarting");
        // SAFETY: no preconditions; does not return.
        unsafe { esp_idf_svc::sys::esp_restart() };
    }

    fn free_heap(&self) -> u32 {
        // SAFETY: plain allocator statistics query.
        unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
    }

    fn epoch_secs(&self) -> u64 {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        // SAFETY: out-parameter query, null timezone.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return 0;
        }
        let secs = tv.tv_sec.max(0) as u64;
        if secs < EPOCH_2020 { 0 } else { secs }
    }

    fn mac_address(&self) -> MacAddress {
        let mut mac: MacAddress = [0u8; 6];
        // SAFETY: writes exactly 6 bytes into `mac`.
        unsafe {
            esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
        }
        mac
    }
}

#[cfg(not(target_os = "espidf"))]
impl SystemPort for SystemAdapter {
    fn restart(&mut self) {
        self.sim_restarts = self.sim_restarts.wrapping_add(1);
        info!("System(sim): restart requested ({})", self.sim_restarts);
    }

    fn free_heap(&self) -> u32 {
        180_000
    }

    fn epoch_secs(&self) -> u64 {
        if self.sim_epoch < EPOCH_2020 { 0 } else { self.sim_epoch }
    }

    fn mac_address(&self) -> MacAddress {
        [0x24, 0x6F, 0x28, 0xA1, 0xB2, 0xC3]
    }
}
