//! Command Router: turns inbound broker messages and HTTP form posts into
//! decisions for the controller.
//!
//! Pure decoding only.  Nothing here touches ports or state; the
//! [`Controller`](crate::app::service::Controller) executes whatever
//! [`Routed`] value comes back.  A decode failure never yields a partial
//! result.

use log::{debug, info, warn};

use crate::app::commands::{CommandDoc, DeviceCommand};
use crate::config::{ConfigPatch, DeviceType};
use crate::error::ProtocolError;
use crate::topics::{InboundTopic, TopicSet};

/// Outcome of routing one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Foreign topic or unrecognised command: no effect.
    Ignored,
    Command(DeviceCommand),
    ConfigPatch(ConfigPatch),
    /// Undecodable payload: logged and discarded.
    Malformed(ProtocolError),
}

/// Route one broker message by exact topic match.
pub fn route(topic: &str, payload: &[u8], topics: &TopicSet) -> Routed {
    match topics.classify(topic) {
        InboundTopic::Foreign => {
            debug!("Router: ignoring message on foreign topic {}", topic);
            Routed::Ignored
        }
        InboundTopic::Command => route_command(payload),
        InboundTopic::Config => route_config(payload),
    }
}

fn route_command(payload: &[u8]) -> Routed {
    let doc: CommandDoc = match serde_json::from_slice(payload) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Router: bad command payload: {}", e);
            return Routed::Malformed(ProtocolError::Malformed);
        }
    };
    let Some(name) = doc.command.as_deref() else {
        warn!("Router: command document without \"command\"");
        return Routed::Malformed(ProtocolError::MissingCommand);
    };
    match doc.to_command() {
        Some(cmd) => {
            info!("Router: command {:?}", cmd);
            Routed::Command(cmd)
        }
        None => {
            info!("Router: unrecognised command '{}' ignored", name);
            Routed::Ignored
        }
    }
}

fn route_config(payload: &[u8]) -> Routed {
    match serde_json::from_slice::<ConfigPatch>(payload) {
        Ok(patch) => Routed::ConfigPatch(patch),
        Err(e) => {
            warn!("Router: bad config payload: {}", e);
            Routed::Malformed(ProtocolError::Malformed)
        }
    }
}

// ───────────────────────────────────────────────────────────────
// HTTP form path
// ───────────────────────────────────────────────────────────────

/// Route a `POST /api/config` body.
pub fn route_form(body: &str) -> Routed {
    match parse_form(body).and_then(|fields| patch_from_form(&fields)) {
        Ok(patch) => Routed::ConfigPatch(patch),
        Err(e) => {
            warn!("Router: bad config form: {}", e);
            Routed::Malformed(e)
        }
    }
}

/// Decode an `application/x-www-form-urlencoded` body.
pub fn parse_form(body: &str) -> Result<Vec<(String, String)>, ProtocolError> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            Ok((url_decode(k)?, url_decode(v)?))
        })
        .collect()
}

fn url_decode(s: &str) -> Result<String, ProtocolError> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hex = bytes.get(i + 1..i + 3).ok_or(ProtocolError::BadForm)?;
                let hi = hex_val(hex[0]).ok_or(ProtocolError::BadForm)?;
                let lo = hex_val(hex[1]).ok_or(ProtocolError::BadForm)?;
                out.push((hi << 4) | lo);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8(out).map_err(|_| ProtocolError::BadForm)
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn form_bool(v: &str) -> Result<bool, ProtocolError> {
    match v {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(ProtocolError::BadForm),
    }
}

fn form_num(v: &str) -> Result<u32, ProtocolError> {
    v.trim().parse().map_err(|_| ProtocolError::BadForm)
}

/// Build a patch from decoded form fields.  Empty values leave the field
/// unchanged; unknown names are ignored.
pub fn patch_from_form(fields: &[(String, String)]) -> Result<ConfigPatch, ProtocolError> {
    let mut patch = ConfigPatch::default();
    for (name, value) in fields {
        if value.is_empty() {
            continue;
        }
        match name.as_str() {
            "wifiSSID" => patch.wifi_ssid = Some(value.clone()),
            "wifiPassword" => patch.wifi_password = Some(value.clone()),
            "mqttServer" => patch.mqtt_server = Some(value.clone()),
            "mqttPort" => patch.mqtt_port = Some(form_num(value)?),
            "mqttUsername" => patch.mqtt_username = Some(value.clone()),
            "mqttPassword" => patch.mqtt_password = Some(value.clone()),
            "deviceType" => {
                patch.device_type = Some(DeviceType::parse(value).ok_or(ProtocolError::BadForm)?);
            }
            "feederEnabled" => patch.feeder_enabled = Some(form_bool(value)?),
            "doorEnabled" => patch.door_enabled = Some(form_bool(value)?),
            "defaultFeedingAmount" => patch.default_feeding_amount = Some(form_num(value)?),
            "doorOpenDurationMs" | "doorOpenDuration" => {
                patch.door_open_duration_ms = Some(form_num(value)?);
            }
            "notificationsEnabled" => patch.notifications_enabled = Some(form_bool(value)?),
            "debugEnabled" => patch.debug_enabled = Some(form_bool(value)?),
            other => debug!("Router: ignoring form field '{}'", other),
        }
    }
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::DeviceIdentity;

    fn topics() -> TopicSet {
        TopicSet::for_device(&DeviceIdentity::parse("X").unwrap())
    }

    #[test]
    fn ping_on_own_command_topic() {
        let r = route("devices/X/command", br#"{"command":"ping"}"#, &topics());
        assert_eq!(r, Routed::Command(DeviceCommand::Ping));
    }

    #[test]
    fn other_device_is_ignored() {
        let r = route("devices/Y/command", br#"{"command":"restart"}"#, &topics());
        assert_eq!(r, Routed::Ignored);
    }

    #[test]
    fn unknown_command_is_ignored() {
        let r = route("devices/X/command", br#"{"command":"dance"}"#, &topics());
        assert_eq!(r, Routed::Ignored);
    }

    #[test]
    fn escaped_verb_decodes_like_plain_text() {
        let t = topics();
        assert_eq!(
            route("devices/X/command", br#"{"command":"fe\u0065d","amount":12}"#, &t),
            Routed::Command(DeviceCommand::Feed { grams: Some(12) })
        );
        assert_eq!(
            route("devices/X/command", br#"{"command":"close\u005fdoor"}"#, &t),
            Routed::Command(DeviceCommand::CloseDoor)
        );
    }

    #[test]
    fn feed_and_door_arguments() {
        let t = topics();
        assert_eq!(
            route("devices/X/command", br#"{"command":"feed","amount":30}"#, &t),
            Routed::Command(DeviceCommand::Feed { grams: Some(30) })
        );
        assert_eq!(
            route("devices/X/command", br#"{"command":"open_door"}"#, &t),
            Routed::Command(DeviceCommand::OpenDoor { duration_ms: None })
        );
    }

    #[test]
    fn bad_json_is_malformed() {
        let t = topics();
        assert_eq!(
            route("devices/X/command", b"{not json", &t),
            Routed::Malformed(ProtocolError::Malformed)
        );
        assert_eq!(
            route("devices/X/command", br#"{"cmd":"ping"}"#, &t),
            Routed::Malformed(ProtocolError::MissingCommand)
        );
        assert_eq!(
            route("devices/X/config", br#"{"mqttPort":"high"}"#, &t),
            Routed::Malformed(ProtocolError::Malformed)
        );
    }

    #[test]
    fn config_topic_yields_patch() {
        let r = route(
            "devices/X/config",
            br#"{"wifiSSID":"Kennel","feederEnabled":false}"#,
            &topics(),
        );
        let Routed::ConfigPatch(p) = r else {
            panic!("expected patch, got {r:?}");
        };
        assert_eq!(p.wifi_ssid.as_deref(), Some("Kennel"));
        assert_eq!(p.feeder_enabled, Some(false));
    }

    #[test]
    fn form_decoding_handles_escapes() {
        let f = parse_form("wifiSSID=Pet+Home%21&mqttPort=1883&&flag").unwrap();
        assert_eq!(f, vec![
            ("wifiSSID".to_string(), "Pet Home!".to_string()),
            ("mqttPort".to_string(), "1883".to_string()),
            ("flag".to_string(), String::new()),
        ]);
        assert_eq!(parse_form("a=%G1"), Err(ProtocolError::BadForm));
        assert_eq!(parse_form("a=%4"), Err(ProtocolError::BadForm));
        assert_eq!(parse_form("a=%FF"), Err(ProtocolError::BadForm));
    }

    #[test]
    fn form_patch_maps_fields() {
        let r = route_form(
            "wifiSSID=Kennel&wifiPassword=&deviceType=DOOR&doorEnabled=on&doorOpenDuration=5000&colour=red",
        );
        let Routed::ConfigPatch(p) = r else {
            panic!("expected patch, got {r:?}");
        };
        assert_eq!(p.wifi_ssid.as_deref(), Some("Kennel"));
        assert_eq!(p.wifi_password, None);
        assert_eq!(p.device_type, Some(DeviceType::Door));
        assert_eq!(p.door_enabled, Some(true));
        assert_eq!(p.door_open_duration_ms, Some(5_000));
    }

    #[test]
    fn form_rejects_bad_values() {
        assert_eq!(
            route_form("mqttPort=abc"),
            Routed::Malformed(ProtocolError::BadForm)
        );
        assert_eq!(
            route_form("feederEnabled=maybe"),
            Routed::Malformed(ProtocolError::BadForm)
        );
        assert_eq!(
            route_form("deviceType=toaster"),
            Routed::Malformed(ProtocolError::BadForm)
        );
    }
}
