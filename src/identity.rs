//! Device identity derived from the factory MAC address.
//!
//! The ID is the full 6-byte MAC in uppercase hex (`A1B2C3D4E5F6`). It is
//! generated on first boot, persisted by the
//! [`ConfigStore`](crate::store::ConfigStore), and reused on every later
//! boot until a factory reset clears storage.

use core::fmt::{self, Write};

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Maximum device ID length (12 hex digits).
pub const DEVICE_ID_LEN: usize = 12;

pub type DeviceIdString = heapless::String<DEVICE_ID_LEN>;

/// Immutable-after-first-boot device identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    device_id: DeviceIdString,
}

impl DeviceIdentity {
    /// Derive the identity from a MAC address.
    pub fn from_mac(mac: &MacAddress) -> Self {
        let mut id = DeviceIdString::new();
        for b in mac {
            // 12 hex digits always fit.
            let _ = write!(id, "{:02X}", b);
        }
        Self { device_id: id }
    }

    /// Accept a stored ID: 1-12 ASCII alphanumerics.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return None;
        }
        let mut device_id = DeviceIdString::new();
        device_id.push_str(s).ok()?;
        Some(Self { device_id })
    }

    pub fn as_str(&self) -> &str {
        self.device_id.as_str()
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_from_mac_is_twelve_upper_hex() {
        let id = DeviceIdentity::from_mac(&[0x00, 0x11, 0x22, 0xAA, 0xBB, 0xCC]);
        assert_eq!(id.as_str(), "001122AABBCC");
    }

    #[test]
    fn parse_accepts_alphanumeric() {
        assert_eq!(DeviceIdentity::parse("PETDOOR01").unwrap().as_str(), "PETDOOR01");
    }

    #[test]
    fn parse_rejects_bad_ids() {
        assert!(DeviceIdentity::parse("").is_none());
        assert!(DeviceIdentity::parse("has-dash").is_none());
        assert!(DeviceIdentity::parse("THIRTEENCHARS").is_none());
    }
}
