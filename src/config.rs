//! Device configuration parameters
//!
//! [`DeviceConfig`] is the single mutable settings record of the device.
//! It is owned by the controller, loaded and saved through the
//! [`ConfigStore`](crate::store::ConfigStore), and patched at runtime by
//! [`ConfigPatch`] documents arriving on the config topic or the local
//! HTTP form.

use core::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Firmware version reported in every status payload.
pub const FIRMWARE_VERSION: &str = "1.0.0";

/// Prefix of the broker client identifier (`prefix + deviceId`).
pub const CLIENT_ID_PREFIX: &str = "pet-smart-home-";

/// Portion size accepted from settings and from feed commands, in grams.
pub const FEEDING_AMOUNT_RANGE: RangeInclusive<u32> = 1..=5_000;

/// Door hold-open time accepted from settings and from door commands.
pub const DOOR_OPEN_RANGE_MS: RangeInclusive<u32> = 1_000..=300_000;

// ---------------------------------------------------------------------------
// Bounded string types
// ---------------------------------------------------------------------------

pub type Ssid = heapless::String<32>;
pub type Secret = heapless::String<64>;
pub type Hostname = heapless::String<64>;
pub type Username = heapless::String<32>;

/// Copy `s` into a bounded string, `None` if it does not fit.
pub fn bounded<const N: usize>(s: &str) -> Option<heapless::String<N>> {
    let mut out = heapless::String::new();
    out.push_str(s).ok()?;
    Some(out)
}

// ---------------------------------------------------------------------------
// Device type
// ---------------------------------------------------------------------------

/// Which mechanisms this unit carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceType {
    Feeder,
    Door,
    Combo,
}

impl DeviceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Feeder => "FEEDER",
            Self::Door => "DOOR",
            Self::Combo => "COMBO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FEEDER" => Some(Self::Feeder),
            "DOOR" => Some(Self::Door),
            "COMBO" => Some(Self::Combo),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceConfig
// ---------------------------------------------------------------------------

/// Persistent device settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    // --- Network ---
    #[serde(rename = "wifiSSID")]
    pub wifi_ssid: Ssid,
    pub wifi_password: Secret,

    // --- Broker ---
    pub mqtt_server: Hostname,
    pub mqtt_port: u16,
    pub mqtt_username: Username,
    pub mqtt_password: Secret,

    // --- Mechanisms ---
    pub device_type: DeviceType,
    pub feeder_enabled: bool,
    pub door_enabled: bool,
    /// Portion dispensed by a bare `feed` command (grams).
    pub default_feeding_amount: u16,
    /// How long `open_door` keeps the door open (milliseconds).
    #[serde(alias = "doorOpenDuration")]
    pub door_open_duration_ms: u32,

    // --- Behaviour ---
    pub notifications_enabled: bool,
    pub debug_enabled: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: bounded("PetSmartHome").unwrap_or_default(),
            wifi_password: Secret::new(),

            mqtt_server: bounded("mqtt.pet-smart-home.com").unwrap_or_default(),
            mqtt_port: 8883, // TLS
            mqtt_username: Username::new(),
            mqtt_password: Secret::new(),

            device_type: DeviceType::Combo,
            feeder_enabled: true,
            door_enabled: true,
            default_feeding_amount: 50,
            door_open_duration_ms: 10_000,

            notifications_enabled: true,
            debug_enabled: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Every interval, timeout and delay the core uses, in milliseconds.
///
/// Tests shrink these; firmware uses [`Timing::default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Cooperative scheduler period.
    pub tick_interval_ms: u64,
    pub association_timeout_ms: u64,
    pub association_poll_ms: u64,
    pub session_retry_delay_ms: u64,
    /// How long a started broker session may wait for its acknowledgement.
    pub session_connect_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub status_interval_ms: u64,
    pub telemetry_interval_ms: u64,
    pub button_debounce_ms: u64,
    pub factory_reset_hold_ms: u64,
    /// Delay between accepting a config change (or update) and restarting.
    pub restart_grace_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            association_timeout_ms: 20_000,
            association_poll_ms: 500,
            session_retry_delay_ms: 5_000,
            session_connect_timeout_ms: 10_000,
            heartbeat_interval_ms: 60_000,
            status_interval_ms: 30_000,
            telemetry_interval_ms: 300_000,
            button_debounce_ms: 50,
            factory_reset_hold_ms: 5_000,
            restart_grace_ms: 2_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Field validation
// ---------------------------------------------------------------------------

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

pub fn validate_ssid(ssid: &str) -> Result<(), ConfigError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConfigError::ValidationFailed(
            "wifiSSID must be 1-32 printable ASCII bytes",
        ));
    }
    Ok(())
}

/// Empty means an open network; WPA2 needs 8-64 bytes.
pub fn validate_wifi_password(password: &str) -> Result<(), ConfigError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConfigError::ValidationFailed(
            "wifiPassword must be empty or 8-64 bytes",
        ));
    }
    Ok(())
}

fn validate_mqtt_server(host: &str) -> Result<(), ConfigError> {
    if host.is_empty() || host.len() > 64 || !is_printable_ascii(host) || host.contains(' ') {
        return Err(ConfigError::ValidationFailed(
            "mqttServer must be a 1-64 byte host name",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ConfigPatch
// ---------------------------------------------------------------------------

/// A partial update of [`DeviceConfig`].
///
/// Built from a JSON document on the config topic or from HTTP form fields.
/// Unknown fields are ignored; a type mismatch on a known field makes the
/// whole document malformed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(rename = "wifiSSID")]
    pub wifi_ssid: Option<String>,
    pub wifi_password: Option<String>,
    pub mqtt_server: Option<String>,
    pub mqtt_port: Option<u32>,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub device_type: Option<DeviceType>,
    pub feeder_enabled: Option<bool>,
    pub door_enabled: Option<bool>,
    pub default_feeding_amount: Option<u32>,
    #[serde(alias = "doorOpenDuration")]
    pub door_open_duration_ms: Option<u32>,
    pub notifications_enabled: Option<bool>,
    pub debug_enabled: Option<bool>,
}

impl ConfigPatch {
    /// `true` when no recognised field was present.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Range-check every present field.  Nothing is applied on error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ssid) = &self.wifi_ssid {
            validate_ssid(ssid)?;
        }
        if let Some(pw) = &self.wifi_password {
            validate_wifi_password(pw)?;
        }
        if let Some(host) = &self.mqtt_server {
            validate_mqtt_server(host)?;
        }
        if let Some(port) = self.mqtt_port {
            if !(1..=65_535).contains(&port) {
                return Err(ConfigError::ValidationFailed("mqttPort must be 1-65535"));
            }
        }
        if let Some(user) = &self.mqtt_username {
            if user.len() > 32 {
                return Err(ConfigError::ValidationFailed(
                    "mqttUsername must be at most 32 bytes",
                ));
            }
        }
        if let Some(pw) = &self.mqtt_password {
            if pw.len() > 64 {
                return Err(ConfigError::ValidationFailed(
                    "mqttPassword must be at most 64 bytes",
                ));
            }
        }
        if let Some(amount) = self.default_feeding_amount {
            if !FEEDING_AMOUNT_RANGE.contains(&amount) {
                return Err(ConfigError::ValidationFailed(
                    "defaultFeedingAmount must be 1-5000 g",
                ));
            }
        }
        if let Some(ms) = self.door_open_duration_ms {
            if !DOOR_OPEN_RANGE_MS.contains(&ms) {
                return Err(ConfigError::ValidationFailed(
                    "doorOpenDurationMs must be 1000-300000",
                ));
            }
        }
        Ok(())
    }

    /// Validate, then produce the patched copy of `base`.
    ///
    /// `base` is never modified, so a rejected patch leaves no trace.
    pub fn applied_to(&self, base: &DeviceConfig) -> Result<DeviceConfig, ConfigError> {
        self.validate()?;
        let mut cfg = base.clone();

        if let Some(v) = &self.wifi_ssid {
            cfg.wifi_ssid = bounded(v).ok_or(ConfigError::ValidationFailed("wifiSSID too long"))?;
        }
        if let Some(v) = &self.wifi_password {
            cfg.wifi_password =
                bounded(v).ok_or(ConfigError::ValidationFailed("wifiPassword too long"))?;
        }
        if let Some(v) = &self.mqtt_server {
            cfg.mqtt_server =
                bounded(v).ok_or(ConfigError::ValidationFailed("mqttServer too long"))?;
        }
        if let Some(v) = self.mqtt_port {
            cfg.mqtt_port = v as u16;
        }
        if let Some(v) = &self.mqtt_username {
            cfg.mqtt_username =
                bounded(v).ok_or(ConfigError::ValidationFailed("mqttUsername too long"))?;
        }
        if let Some(v) = &self.mqtt_password {
            cfg.mqtt_password =
                bounded(v).ok_or(ConfigError::ValidationFailed("mqttPassword too long"))?;
        }
        if let Some(v) = self.device_type {
            cfg.device_type = v;
        }
        if let Some(v) = self.feeder_enabled {
            cfg.feeder_enabled = v;
        }
        if let Some(v) = self.door_enabled {
            cfg.door_enabled = v;
        }
        if let Some(v) = self.default_feeding_amount {
            cfg.default_feeding_amount = v as u16;
        }
        if let Some(v) = self.door_open_duration_ms {
            cfg.door_open_duration_ms = v;
        }
        if let Some(v) = self.notifications_enabled {
            cfg.notifications_enabled = v;
        }
        if let Some(v) = self.debug_enabled {
            cfg.debug_enabled = v;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = DeviceConfig::default();
        assert_eq!(c.wifi_ssid.as_str(), "PetSmartHome");
        assert_eq!(c.mqtt_server.as_str(), "mqtt.pet-smart-home.com");
        assert_eq!(c.mqtt_port, 8883);
        assert_eq!(c.device_type, DeviceType::Combo);
        assert!(c.feeder_enabled && c.door_enabled);
        assert_eq!(c.door_open_duration_ms, 10_000);
    }

    #[test]
    fn timing_ratios_make_sense() {
        let t = Timing::default();
        assert!(t.association_poll_ms < t.association_timeout_ms);
        assert!(t.status_interval_ms < t.heartbeat_interval_ms);
        assert!(t.heartbeat_interval_ms < t.telemetry_interval_ms);
        assert!(t.button_debounce_ms < t.factory_reset_hold_ms);
    }

    #[test]
    fn serde_uses_wire_field_names() {
        let json = serde_json::to_string(&DeviceConfig::default()).unwrap();
        assert!(json.contains("\"wifiSSID\""));
        assert!(json.contains("\"doorOpenDurationMs\""));
        assert!(json.contains("\"deviceType\":\"COMBO\""));
    }

    #[test]
    fn postcard_roundtrip() {
        let c = DeviceConfig::default();
        let bytes = postcard::to_allocvec(&c).unwrap();
        let c2: DeviceConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(c, c2);
    }

    #[test]
    fn patch_ignores_unknown_fields() {
        let patch: ConfigPatch =
            serde_json::from_str(r#"{"colour":"blue","mqttPort":1883}"#).unwrap();
        assert_eq!(patch.mqtt_port, Some(1883));
        assert!(!patch.is_empty());
    }

    #[test]
    fn patch_accepts_legacy_door_duration_key() {
        let patch: ConfigPatch = serde_json::from_str(r#"{"doorOpenDuration":15000}"#).unwrap();
        assert_eq!(patch.door_open_duration_ms, Some(15_000));
    }

    #[test]
    fn empty_patch_is_empty() {
        let patch: ConfigPatch = serde_json::from_str(r#"{"unrelated":true}"#).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn patch_applies_only_present_fields() {
        let base = DeviceConfig::default();
        let patch = ConfigPatch {
            wifi_ssid: Some("Kennel".into()),
            feeder_enabled: Some(false),
            ..Default::default()
        };
        let cfg = patch.applied_to(&base).unwrap();
        assert_eq!(cfg.wifi_ssid.as_str(), "Kennel");
        assert!(!cfg.feeder_enabled);
        assert_eq!(cfg.mqtt_server, base.mqtt_server);
    }

    #[test]
    fn one_bad_field_rejects_whole_patch() {
        let base = DeviceConfig::default();
        let patch = ConfigPatch {
            wifi_ssid: Some("Kennel".into()),
            mqtt_port: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            patch.applied_to(&base),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn rejects_short_wifi_password() {
        assert!(validate_wifi_password("short").is_err());
        assert!(validate_wifi_password("").is_ok());
        assert!(validate_wifi_password("longenough").is_ok());
    }

    #[test]
    fn rejects_empty_or_long_ssid() {
        assert!(validate_ssid("").is_err());
        assert!(validate_ssid(&"x".repeat(33)).is_err());
        assert!(validate_ssid("Home\u{7f}").is_err());
        assert!(validate_ssid("HomeWiFi").is_ok());
    }

    #[test]
    fn door_duration_range_enforced() {
        let too_short = ConfigPatch {
            door_open_duration_ms: Some(999),
            ..Default::default()
        };
        assert!(too_short.validate().is_err());
        let ok = ConfigPatch {
            door_open_duration_ms: Some(1_000),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn device_type_names_roundtrip() {
        for t in [DeviceType::Feeder, DeviceType::Door, DeviceType::Combo] {
            assert_eq!(DeviceType::parse(t.as_str()), Some(t));
        }
        assert_eq!(DeviceType::parse("toaster"), None);
    }
}
