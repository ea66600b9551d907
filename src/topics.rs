//! Device-scoped MQTT topic namespace.
//!
//! ```text
//!   devices/<deviceId>/status      ◀── heartbeat, status update, ping
//!   devices/<deviceId>/command     ──▶ restart | status | ping | verbs
//!   devices/<deviceId>/telemetry   ◀── full telemetry
//!   devices/<deviceId>/log         ◀── error reports
//!   devices/<deviceId>/config      ──▶ config patches
//! ```
//!
//! Rendered once per boot from the [`DeviceIdentity`]; nothing else ever
//! formats a topic string.

use core::fmt::Write;

use crate::identity::DeviceIdentity;

/// Long enough for `devices/` + 12-char ID + `/telemetry`.
pub type Topic = heapless::String<48>;

/// Which subscribed topic an inbound message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundTopic {
    Command,
    Config,
    /// Not one of ours (wrong device, unknown leaf, wildcard leak).
    Foreign,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    pub status: Topic,
    pub command: Topic,
    pub telemetry: Topic,
    pub log: Topic,
    pub config: Topic,
}

impl TopicSet {
    pub fn for_device(identity: &DeviceIdentity) -> Self {
        Self {
            status: render(identity, "status"),
            command: render(identity, "command"),
            telemetry: render(identity, "telemetry"),
            log: render(identity, "log"),
            config: render(identity, "config"),
        }
    }

    /// Exact-string match against the two inbound topics.
    pub fn classify(&self, topic: &str) -> InboundTopic {
        if topic == self.command.as_str() {
            InboundTopic::Command
        } else if topic == self.config.as_str() {
            InboundTopic::Config
        } else {
            InboundTopic::Foreign
        }
    }
}

fn render(identity: &DeviceIdentity, leaf: &str) -> Topic {
    let mut t = Topic::new();
    // Bounded: ID is at most 12 chars, the longest leaf is 9.
    let _ = write!(t, "devices/{}/{}", identity.as_str(), leaf);
    t
}
