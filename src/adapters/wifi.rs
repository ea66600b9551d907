//! WiFi station-mode adapter.
//!
//! Implements [`NetworkPort`], the hexagonal boundary for link-layer
//! association.  The adapter never waits: `begin_association` only kicks
//! off the driver and the [`ConnectivityManager`](crate::connectivity::ConnectivityManager)
//! polls `is_associated` on later ticks.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver via `esp_idf_svc::wifi`.
//! - **all other targets**: simulation for host-side runs.

use log::{info, warn};

use crate::app::ports::NetworkPort;
use crate::error::ConnectivityError;

#[cfg(target_os = "espidf")]
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    eventloop::EspSystemEventLoop, hal::modem::Modem, nvs::EspDefaultNvsPartition,
    wifi::EspWifi,
};

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    #[cfg(target_os = "espidf")]
    wifi: EspWifi<'static>,
    #[cfg(target_os = "espidf")]
    started: bool,

    /// Simulation: whether an access point answers at all.
    #[cfg(not(target_os = "espidf"))]
    sim_reachable: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_associated: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_attempts: u32,
}

#[cfg(target_os = "espidf")]
impl WifiAdapter {
    pub fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
    ) -> Result<Self, esp_idf_svc::sys::EspError> {
        let wifi = EspWifi::new(modem, sys_loop, Some(nvs))?;
        info!("WiFi: driver created");
        Ok(Self {
            wifi,
            started: false,
        })
    }
}

#[cfg(not(target_os = "espidf"))]
impl WifiAdapter {
    pub fn new() -> Self {
        Self {
            sim_reachable: true,
            sim_associated: false,
            sim_attempts: 0,
        }
    }

    /// Simulation: make the access point (dis)appear.  Dropping it also
    /// drops an established link.
    pub fn set_reachable(&mut self, reachable: bool) {
        self.sim_reachable = reachable;
        if !reachable {
            self.sim_associated = false;
        }
    }

    pub fn attempts(&self) -> u32 {
        self.sim_attempts
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// NetworkPort
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
impl NetworkPort for WifiAdapter {
    fn begin_association(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        if ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };
        let conf = Configuration::Client(ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| ConnectivityError::AssociationRejected)?,
            password: password
                .try_into()
                .map_err(|_| ConnectivityError::AssociationRejected)?,
            auth_method,
            ..Default::default()
        });

        self.wifi.set_configuration(&conf).map_err(|e| {
            warn!("WiFi: set_configuration failed: {:?}", e);
            ConnectivityError::AssociationRejected
        })?;
        if !self.started {
            self.wifi.start().map_err(|e| {
                warn!("WiFi: start failed: {:?}", e);
                ConnectivityError::AssociationRejected
            })?;
            self.started = true;
        }
        self.wifi.connect().map_err(|e| {
            warn!("WiFi: connect failed: {:?}", e);
            ConnectivityError::AssociationRejected
        })?;
        info!("WiFi: associating with '{}'", ssid);
        Ok(())
    }

    fn is_associated(&self) -> bool {
        // Associated and holding an IP lease.
        self.wifi.is_up().unwrap_or(false)
    }

    fn disconnect(&mut self) {
        if let Err(e) = self.wifi.disconnect() {
            warn!("WiFi: disconnect failed: {:?}", e);
        }
    }

    fn rssi(&self) -> Option<i8> {
        let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
        // SAFETY: plain out-parameter query on the started driver.
        let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
        (rc == esp_idf_svc::sys::ESP_OK).then_some(ap_info.rssi)
    }
}

#[cfg(not(target_os = "espidf"))]
impl NetworkPort for WifiAdapter {
    fn begin_association(&mut self, ssid: &str, _password: &str) -> Result<(), ConnectivityError> {
        if ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        self.sim_attempts = self.sim_attempts.wrapping_add(1);
        self.sim_associated = self.sim_reachable;
        info!(
            "WiFi(sim): associating with '{}' (attempt {})",
            ssid, self.sim_attempts
        );
        Ok(())
    }

    fn is_associated(&self) -> bool {
        self.sim_associated
    }

    fn disconnect(&mut self) {
        self.sim_associated = false;
        info!("WiFi(sim): disconnected");
    }

    fn rssi(&self) -> Option<i8> {
        if !self.sim_associated {
            return None;
        }
        // Oscillate between -66 and -55 dBm like a real room would.
        let oscillation = ((self.sim_attempts % 12) as i8) - 6;
        Some(-60_i8.saturating_add(oscillation))
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
