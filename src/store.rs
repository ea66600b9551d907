//! Config Store: [`DeviceConfig`] and [`DeviceIdentity`] persistence.
//!
//! Every field lives under its own key in the `pet-smart-home` namespace,
//! encoded with `postcard`.  Missing or undecodable keys fall back to the
//! field's default, so a partially written or older store still boots.
//!
//! ```text
//!  load()  ─▶ read key ─▶ postcard decode ─┬─▶ value
//!                                          └─▶ default (+ warn! if corrupt)
//!  save()  ─▶ encode all fields ─▶ StoragePort::write_batch (one commit)
//!  clear() ─▶ StoragePort::erase_namespace
//! ```

use log::{info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::app::ports::{StorageError, StoragePort};
use crate::config::DeviceConfig;
use crate::identity::{DeviceIdString, DeviceIdentity, MacAddress};

/// NVS namespace for everything this crate persists.
pub const NAMESPACE: &str = "pet-smart-home";

/// Largest encoded value (a 64-byte secret plus its varint length).
const VALUE_BUF_LEN: usize = 128;

/// Persisted key names.
pub mod keys {
    pub const DEVICE_ID: &str = "deviceId";
    pub const WIFI_SSID: &str = "wifiSSID";
    pub const WIFI_PASSWORD: &str = "wifiPassword";
    pub const MQTT_SERVER: &str = "mqttServer";
    pub const MQTT_PORT: &str = "mqttPort";
    pub const MQTT_USERNAME: &str = "mqttUsername";
    pub const MQTT_PASSWORD: &str = "mqttPassword";
    pub const DEVICE_TYPE: &str = "deviceType";
    pub const FEEDER_ENABLED: &str = "feederEnabled";
    pub const DOOR_ENABLED: &str = "doorEnabled";
    pub const DEFAULT_FEEDING_AMOUNT: &str = "defaultFeedingAmount";
    pub const DOOR_OPEN_DURATION: &str = "doorOpenDuration";
    pub const NOTIFICATIONS_ENABLED: &str = "notificationsEnabled";
    pub const DEBUG_ENABLED: &str = "debugEnabled";
}

/// Result of [`ConfigStore::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedConfig {
    pub identity: DeviceIdentity,
    pub config: DeviceConfig,
}

/// Typed view of the persisted settings over any [`StoragePort`].
pub struct ConfigStore<'a> {
    storage: &'a mut dyn StoragePort,
}

impl<'a> ConfigStore<'a> {
    pub fn new(storage: &'a mut dyn StoragePort) -> Self {
        Self { storage }
    }

    /// Load config and identity, generating the identity from `mac` on
    /// first boot.
    ///
    /// Never fails: unreadable keys become defaults.  The only write is the
    /// identity on first boot; if that write fails the generated identity
    /// is still used for this session.
    pub fn load(&mut self, mac: &MacAddress) -> LoadedConfig {
        let identity = self.load_identity(mac);

        let d = DeviceConfig::default();
        let config = DeviceConfig {
            wifi_ssid: self.get(keys::WIFI_SSID, d.wifi_ssid),
            wifi_password: self.get(keys::WIFI_PASSWORD, d.wifi_password),
            mqtt_server: self.get(keys::MQTT_SERVER, d.mqtt_server),
            mqtt_port: self.get(keys::MQTT_PORT, d.mqtt_port),
            mqtt_username: self.get(keys::MQTT_USERNAME, d.mqtt_username),
            mqtt_password: self.get(keys::MQTT_PASSWORD, d.mqtt_password),
            device_type: self.get(keys::DEVICE_TYPE, d.device_type),
            feeder_enabled: self.get(keys::FEEDER_ENABLED, d.feeder_enabled),
            door_enabled: self.get(keys::DOOR_ENABLED, d.door_enabled),
            default_feeding_amount: self
                .get(keys::DEFAULT_FEEDING_AMOUNT, d.default_feeding_amount),
            door_open_duration_ms: self.get(keys::DOOR_OPEN_DURATION, d.door_open_duration_ms),
            notifications_enabled: self.get(keys::NOTIFICATIONS_ENABLED, d.notifications_enabled),
            debug_enabled: self.get(keys::DEBUG_ENABLED, d.debug_enabled),
        };

        info!(
            "ConfigStore: loaded config for {} (type {}, ssid '{}')",
            identity,
            config.device_type.as_str(),
            config.wifi_ssid
        );
        LoadedConfig { identity, config }
    }

    /// Persist every config field with a single commit.
    pub fn save(&mut self, config: &DeviceConfig) -> Result<(), StorageError> {
        let encoded: [(&str, Vec<u8>); 13] = [
            (keys::WIFI_SSID, encode(&config.wifi_ssid)?),
            (keys::WIFI_PASSWORD, encode(&config.wifi_password)?),
            (keys::MQTT_SERVER, encode(&config.mqtt_server)?),
            (keys::MQTT_PORT, encode(&config.mqtt_port)?),
            (keys::MQTT_USERNAME, encode(&config.mqtt_username)?),
            (keys::MQTT_PASSWORD, encode(&config.mqtt_password)?),
            (keys::DEVICE_TYPE, encode(&config.device_type)?),
            (keys::FEEDER_ENABLED, encode(&config.feeder_enabled)?),
            (keys::DOOR_ENABLED, encode(&config.door_enabled)?),
            (
                keys::DEFAULT_FEEDING_AMOUNT,
                encode(&config.default_feeding_amount)?,
            ),
            (keys::DOOR_OPEN_DURATION, encode(&config.door_open_duration_ms)?),
            (
                keys::NOTIFICATIONS_ENABLED,
                encode(&config.notifications_enabled)?,
            ),
            (keys::DEBUG_ENABLED, encode(&config.debug_enabled)?),
        ];
        let entries: Vec<(&str, &[u8])> = encoded
            .iter()
            .map(|(k, v)| (*k, v.as_slice()))
            .collect();

        match self.storage.write_batch(NAMESPACE, &entries) {
            Ok(()) => {
                info!("ConfigStore: saved {} keys", entries.len());
                Ok(())
            }
            Err(e) => {
                warn!("ConfigStore: save failed: {}", e);
                Err(e)
            }
        }
    }

    /// Erase everything persisted, identity included.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        warn!("ConfigStore: erasing namespace '{}'", NAMESPACE);
        self.storage.erase_namespace(NAMESPACE)
    }

    // ── internals ─────────────────────────────────────────────────

    fn load_identity(&mut self, mac: &MacAddress) -> DeviceIdentity {
        let stored: Option<DeviceIdString> = self.get_opt(keys::DEVICE_ID);
        if let Some(identity) = stored.as_deref().and_then(DeviceIdentity::parse) {
            return identity;
        }

        let identity = DeviceIdentity::from_mac(mac);
        info!("ConfigStore: generated device ID {}", identity);
        match encode(&identity.as_str()) {
            Ok(bytes) => {
                if let Err(e) = self.storage.write(NAMESPACE, keys::DEVICE_ID, &bytes) {
                    warn!("ConfigStore: could not persist device ID: {}", e);
                }
            }
            Err(e) => warn!("ConfigStore: could not encode device ID: {}", e),
        }
        identity
    }

    fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get_opt(key).unwrap_or(default)
    }

    fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut buf = [0u8; VALUE_BUF_LEN];
        match self.storage.read(NAMESPACE, key, &mut buf) {
            Ok(len) => match postcard::from_bytes(&buf[..len]) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("ConfigStore: '{}' is corrupted, using default", key);
                    None
                }
            },
            Err(StorageError::NotFound) => None,
            Err(e) => {
                warn!("ConfigStore: reading '{}' failed ({}), using default", key, e);
                None
            }
        }
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StorageError> {
    postcard::to_allocvec(value).map_err(|_| StorageError::Corrupted)
}
