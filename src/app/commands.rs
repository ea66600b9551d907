//! Inbound commands to the controller.
//!
//! Decoded from `{"command": "<name>", ...}` documents on the command
//! topic by the [`router`](crate::router).  Actuator verbs carry optional
//! arguments; missing ones fall back to [`DeviceConfig`](crate::config::DeviceConfig)
//! defaults when executed, and explicit ones outside the settings ranges
//! are dropped.

use serde::Deserialize;

use crate::config::{DOOR_OPEN_RANGE_MS, FEEDING_AMOUNT_RANGE};

/// Commands the outside world can send to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Reboot immediately.
    Restart,

    /// Publish a status document now.
    Status,

    /// Liveness check; answered with one status document.
    Ping,

    /// Dispense food; `None` means the configured default portion.
    Feed { grams: Option<u16> },

    /// Open the door; `None` means the configured open duration.
    OpenDoor { duration_ms: Option<u32> },

    CloseDoor,
}

impl DeviceCommand {
    /// Whether the command drives the feeder mechanism.
    pub fn needs_feeder(self) -> bool {
        matches!(self, Self::Feed { .. })
    }

    /// Whether the command drives the door mechanism.
    pub fn needs_door(self) -> bool {
        matches!(self, Self::OpenDoor { .. } | Self::CloseDoor)
    }

    /// Explicit actuator arguments obey the same bounds as the settings
    /// they override.  Returns what is wrong, `None` when the command may run.
    pub fn out_of_range(self) -> Option<&'static str> {
        match self {
            Self::Feed { grams: Some(g) } if !FEEDING_AMOUNT_RANGE.contains(&u32::from(g)) => {
                Some("amount must be 1-5000 g")
            }
            Self::OpenDoor { duration_ms: Some(ms) } if !DOOR_OPEN_RANGE_MS.contains(&ms) => {
                Some("duration must be 1000-300000 ms")
            }
            _ => None,
        }
    }
}

/// Wire shape of a command document.  Extra fields are ignored.
///
/// The verb is owned so escaped JSON strings decode like plain ones.
#[derive(Debug, Deserialize)]
pub(crate) struct CommandDoc {
    pub command: Option<String>,
    pub amount: Option<u16>,
    pub duration: Option<u32>,
}

impl CommandDoc {
    /// Map the verb to a command; `None` for unrecognised verbs.
    pub fn to_command(&self) -> Option<DeviceCommand> {
        let cmd = match self.command.as_deref()? {
            "restart" => DeviceCommand::Restart,
            "status" => DeviceCommand::Status,
            "ping" => DeviceCommand::Ping,
            "feed" => DeviceCommand::Feed { grams: self.amount },
            "open_door" => DeviceCommand::OpenDoor {
                duration_ms: self.duration,
            },
            "close_door" => DeviceCommand::CloseDoor,
            _ => return None,
        };
        Some(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_arguments_share_the_settings_ranges() {
        assert_eq!(DeviceCommand::Feed { grams: Some(1) }.out_of_range(), None);
        assert_eq!(DeviceCommand::Feed { grams: Some(5_000) }.out_of_range(), None);
        assert!(DeviceCommand::Feed { grams: Some(0) }.out_of_range().is_some());
        assert!(DeviceCommand::Feed { grams: Some(5_001) }.out_of_range().is_some());
        assert!(DeviceCommand::Feed { grams: Some(u16::MAX) }.out_of_range().is_some());

        let door = |ms| DeviceCommand::OpenDoor { duration_ms: Some(ms) };
        assert_eq!(door(1_000).out_of_range(), None);
        assert_eq!(door(300_000).out_of_range(), None);
        assert!(door(999).out_of_range().is_some());
        assert!(door(300_001).out_of_range().is_some());
        assert!(door(u32::MAX).out_of_range().is_some());
    }

    #[test]
    fn omitted_arguments_are_never_out_of_range() {
        assert_eq!(DeviceCommand::Feed { grams: None }.out_of_range(), None);
        assert_eq!(DeviceCommand::OpenDoor { duration_ms: None }.out_of_range(), None);
        assert_eq!(DeviceCommand::Restart.out_of_range(), None);
    }
}
