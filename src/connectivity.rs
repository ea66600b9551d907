//! Connectivity Manager: WiFi association and MQTT session as one
//! per-tick state machine.
//!
//! ```text
//!                 begin_association
//!  DISCONNECTED ─────────────────────▶ ASSOCIATING ──[timeout]──▶ DISCONNECTED
//!       ▲                                  │
//!       │ link lost                        │ is_associated (polled)
//!       │                                  ▼
//!       ├──────────────────────────── ASSOCIATED ◀──[refused / timeout: back-off]─┐
//!       │                                  │                                      │
//!       │                                  │ connect                              │
//!       │                                  ▼                                      │
//!       │                          SESSION_CONNECTING ────────────────────────────┘
//!       │                                  │
//!       │                                  │ acknowledged + subscribe
//!       │                                  ▼
//!       └──────────────────────────── SESSION_ACTIVE ──[session lost]──▶ ASSOCIATED
//! ```
//!
//! [`ConnectivityManager::ensure_connected`] never blocks beyond the
//! adapters' own bounded calls and makes at most one connection attempt per
//! invocation.  A started session is polled through
//! [`BrokerPort::is_connected`] until it is acknowledged or
//! `session_connect_timeout_ms` passes.

use core::fmt::Write;

use log::{debug, info, warn};

use crate::app::ports::{BrokerPort, NetworkPort, SessionParams};
use crate::config::{CLIENT_ID_PREFIX, DeviceConfig, Timing};
use crate::error::ConnectivityError;
use crate::identity::DeviceIdentity;
use crate::topics::TopicSet;

/// MQTT keep-alive interval.
pub const MQTT_KEEPALIVE_SECS: u16 = 60;

/// `pet-smart-home-` + 12-char device ID.
pub type ClientId = heapless::String<32>;

pub fn client_id(identity: &DeviceIdentity) -> ClientId {
    let mut id = ClientId::new();
    // 15 + 12 bytes always fit.
    let _ = write!(id, "{}{}", CLIENT_ID_PREFIX, identity.as_str());
    id
}

// ───────────────────────────────────────────────────────────────
// Public state and events
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Disconnected,
    Associating,
    Associated,
    SessionConnecting,
    SessionActive,
}

/// Edge reported by one [`ConnectivityManager::ensure_connected`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Associated,
    /// The association attempt ended without a link (timeout, rejected
    /// start, or no credentials).
    AssociationTimedOut,
    SessionEstablished,
    SessionFailed,
    SessionLost,
    LinkLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityReport {
    pub state: ConnectivityState,
    pub event: Option<LinkEvent>,
    /// Set when the event is a failure worth reporting.
    pub error: Option<ConnectivityError>,
}

// ───────────────────────────────────────────────────────────────
// Manager
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Disconnected { retry_at_ms: u64 },
    Associating { started_ms: u64, next_poll_ms: u64 },
    Associated { next_attempt_ms: u64 },
    SessionConnecting { started_ms: u64 },
    SessionActive,
}

/// Everything `ensure_connected` needs to know about the device.
#[derive(Debug, Clone, Copy)]
pub struct LinkTarget<'a> {
    pub config: &'a DeviceConfig,
    pub client_id: &'a str,
    pub topics: &'a TopicSet,
}

pub struct ConnectivityManager {
    phase: Phase,
    timing: Timing,
    association_attempts: u32,
    session_attempts: u32,
}

impl ConnectivityManager {
    pub fn new(timing: Timing) -> Self {
        Self {
            phase: Phase::Disconnected { retry_at_ms: 0 },
            timing,
            association_attempts: 0,
            session_attempts: 0,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        match self.phase {
            Phase::Disconnected { .. } => ConnectivityState::Disconnected,
            Phase::Associating { .. } => ConnectivityState::Associating,
            Phase::Associated { .. } => ConnectivityState::Associated,
            Phase::SessionConnecting { .. } => ConnectivityState::SessionConnecting,
            Phase::SessionActive => ConnectivityState::SessionActive,
        }
    }

    pub fn is_session_active(&self) -> bool {
        self.phase == Phase::SessionActive
    }

    /// Association attempts started since boot.
    pub fn association_attempts(&self) -> u32 {
        self.association_attempts
    }

    /// Broker connect attempts since boot.
    pub fn session_attempts(&self) -> u32 {
        self.session_attempts
    }

    /// Advance the link one step.
    pub fn ensure_connected(
        &mut self,
        now_ms: u64,
        target: &LinkTarget<'_>,
        network: &mut dyn NetworkPort,
        broker: &mut dyn BrokerPort,
    ) -> ConnectivityReport {
        match self.phase {
            Phase::Disconnected { retry_at_ms } => {
                if now_ms < retry_at_ms {
                    return self.quiet();
                }
                self.start_association(now_ms, target.config, network)
            }

            Phase::Associating {
                started_ms,
                next_poll_ms,
            } => {
                let elapsed = now_ms.saturating_sub(started_ms);
                let timed_out = elapsed >= self.timing.association_timeout_ms;

                if (now_ms >= next_poll_ms || timed_out) && network.is_associated() {
                    info!("Link: associated after {} ms", elapsed);
                    self.phase = Phase::Associated {
                        next_attempt_ms: now_ms,
                    };
                    return self.report(Some(LinkEvent::Associated), None);
                }

                if timed_out {
                    warn!(
                        "Link: association timed out after {} ms",
                        self.timing.association_timeout_ms
                    );
                    network.disconnect();
                    self.phase = Phase::Disconnected { retry_at_ms: now_ms };
                    return self.report(
                        Some(LinkEvent::AssociationTimedOut),
                        Some(ConnectivityError::AssociationTimeout),
                    );
                }

                if now_ms >= next_poll_ms {
                    self.phase = Phase::Associating {
                        started_ms,
                        next_poll_ms: next_poll_ms + self.timing.association_poll_ms,
                    };
                }
                self.quiet()
            }

            Phase::Associated { next_attempt_ms } => {
                if !network.is_associated() {
                    warn!("Link: WiFi lost before session came up");
                    self.phase = Phase::Disconnected { retry_at_ms: now_ms };
                    return self.report(Some(LinkEvent::LinkLost), None);
                }
                if now_ms < next_attempt_ms {
                    return self.quiet();
                }
                self.start_session(now_ms, target, broker)
            }

            Phase::SessionConnecting { started_ms } => {
                if !network.is_associated() {
                    warn!("Link: WiFi lost while the session was connecting");
                    broker.disconnect();
                    self.phase = Phase::Disconnected { retry_at_ms: now_ms };
                    return self.report(Some(LinkEvent::LinkLost), None);
                }
                if broker.is_connected() {
                    return self.subscribe_all(now_ms, target, broker);
                }
                let elapsed = now_ms.saturating_sub(started_ms);
                if elapsed >= self.timing.session_connect_timeout_ms {
                    warn!("Link: broker did not acknowledge within {} ms", elapsed);
                    broker.disconnect();
                    return self.session_failed(now_ms, ConnectivityError::SessionRefused);
                }
                self.quiet()
            }

            Phase::SessionActive => {
                if !network.is_associated() {
                    warn!("Link: WiFi lost, dropping MQTT session");
                    broker.disconnect();
                    self.phase = Phase::Disconnected { retry_at_ms: now_ms };
                    return self.report(Some(LinkEvent::LinkLost), None);
                }
                if !broker.is_connected() {
                    warn!(
                        "Link: MQTT session lost, retrying in {} ms",
                        self.timing.session_retry_delay_ms
                    );
                    self.phase = Phase::Associated {
                        next_attempt_ms: now_ms + self.timing.session_retry_delay_ms,
                    };
                    return self.report(Some(LinkEvent::SessionLost), None);
                }
                self.quiet()
            }
        }
    }

    /// Fire-and-forget publish on the active session.
    pub fn publish(
        &self,
        broker: &mut dyn BrokerPort,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), ConnectivityError> {
        if !self.is_session_active() {
            return Err(ConnectivityError::NotConnected);
        }
        broker.publish(topic, payload).inspect_err(|e| {
            warn!("Link: publish to {} failed: {}", topic, e);
        })
    }

    /// Tear everything down; the next call starts from association.
    pub fn reset(&mut self, network: &mut dyn NetworkPort, broker: &mut dyn BrokerPort) {
        info!("Link: reset requested");
        broker.disconnect();
        network.disconnect();
        self.phase = Phase::Disconnected { retry_at_ms: 0 };
    }

    // ── internals ─────────────────────────────────────────────────

    fn start_association(
        &mut self,
        now_ms: u64,
        config: &DeviceConfig,
        network: &mut dyn NetworkPort,
    ) -> ConnectivityReport {
        if config.wifi_ssid.is_empty() {
            warn!("Link: no SSID configured");
            self.phase = Phase::Disconnected {
                retry_at_ms: now_ms + self.timing.association_timeout_ms,
            };
            return self.report(
                Some(LinkEvent::AssociationTimedOut),
                Some(ConnectivityError::NoCredentials),
            );
        }

        self.association_attempts = self.association_attempts.wrapping_add(1);
        info!(
            "Link: associating with '{}' (attempt {})",
            config.wifi_ssid, self.association_attempts
        );
        match network.begin_association(&config.wifi_ssid, &config.wifi_password) {
            Ok(()) => {
                self.phase = Phase::Associating {
                    started_ms: now_ms,
                    next_poll_ms: now_ms + self.timing.association_poll_ms,
                };
                self.quiet()
            }
            Err(e) => {
                warn!("Link: association start failed: {}", e);
                self.phase = Phase::Disconnected {
                    retry_at_ms: now_ms + self.timing.session_retry_delay_ms,
                };
                self.report(Some(LinkEvent::AssociationTimedOut), Some(e))
            }
        }
    }

    fn start_session(
        &mut self,
        now_ms: u64,
        target: &LinkTarget<'_>,
        broker: &mut dyn BrokerPort,
    ) -> ConnectivityReport {
        let cfg = target.config;
        let params = SessionParams {
            client_id: target.client_id,
            host: &cfg.mqtt_server,
            port: cfg.mqtt_port,
            username: &cfg.mqtt_username,
            password: &cfg.mqtt_password,
            keepalive_secs: MQTT_KEEPALIVE_SECS,
        };

        self.session_attempts = self.session_attempts.wrapping_add(1);
        info!(
            "Link: connecting to mqtt://{}:{} as {}",
            params.host, params.port, params.client_id
        );

        match broker.connect(&params) {
            Ok(()) => {
                self.phase = Phase::SessionConnecting { started_ms: now_ms };
                self.quiet()
            }
            Err(e) => self.session_failed(now_ms, e),
        }
    }

    fn subscribe_all(
        &mut self,
        now_ms: u64,
        target: &LinkTarget<'_>,
        broker: &mut dyn BrokerPort,
    ) -> ConnectivityReport {
        let subscribed = broker
            .subscribe(&target.topics.command)
            .and_then(|()| broker.subscribe(&target.topics.config));
        match subscribed {
            Ok(()) => {
                info!(
                    "Link: session up, subscribed to {} and {}",
                    target.topics.command, target.topics.config
                );
                self.phase = Phase::SessionActive;
                self.report(Some(LinkEvent::SessionEstablished), None)
            }
            Err(e) => {
                broker.disconnect();
                self.session_failed(now_ms, e)
            }
        }
    }

    fn session_failed(&mut self, now_ms: u64, e: ConnectivityError) -> ConnectivityReport {
        warn!(
            "Link: session failed ({}), retrying in {} ms",
            e, self.timing.session_retry_delay_ms
        );
        self.phase = Phase::Associated {
            next_attempt_ms: now_ms + self.timing.session_retry_delay_ms,
        };
        self.report(Some(LinkEvent::SessionFailed), Some(e))
    }

    fn quiet(&self) -> ConnectivityReport {
        debug!("Link: {:?}", self.phase);
        self.report(None, None)
    }

    fn report(
        &self,
        event: Option<LinkEvent>,
        error: Option<ConnectivityError>,
    ) -> ConnectivityReport {
        ConnectivityReport {
            state: self.state(),
            event,
            error,
        }
    }
}
