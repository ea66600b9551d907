//! MQTT session adapter and the inbound channel.
//!
//! [`MqttAdapter`] implements [`BrokerPort`].  On ESP-IDF the client runs
//! its own task; a small receiver thread turns connection events into a
//! connected flag and forwards received messages as
//! [`InboundEvent::Message`] over an `mpsc` channel.  Every client gets its
//! own flag, so a retiring receiver cannot mark its successor as down.
//!
//! [`ChannelInbound`] is the tick-side end of that channel and implements
//! [`InboundPort`].  The HTTP adapter clones the same sender, so broker
//! messages and form posts arrive in one ordered stream.
//!
//! ```text
//!  mqtt-rx thread ──┐
//!                   ├──▶ Sender<InboundEvent> ──▶ ChannelInbound ──▶ Inbox
//!  httpd task ──────┘
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use log::{debug, info, warn};

use crate::app::events::{InboundEvent, Inbox};
use crate::app::ports::{BrokerPort, InboundPort, SessionParams};
use crate::error::ConnectivityError;

#[cfg(target_os = "espidf")]
use std::time::Duration;

#[cfg(target_os = "espidf")]
use embedded_svc::mqtt::client::{Details, EventPayload, QoS};
#[cfg(target_os = "espidf")]
use esp_idf_svc::mqtt::client::{EspMqttClient, EspMqttConnection, MqttClientConfiguration};

/// Largest inbound payload forwarded to the core.
pub const MAX_INBOUND_PAYLOAD: usize = 2048;

/// Port that selects TLS.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const MQTTS_PORT: u16 = 8883;

// ───────────────────────────────────────────────────────────────
// Inbound channel
// ───────────────────────────────────────────────────────────────

/// Create the channel shared by every inbound transport.
pub fn inbound_channel() -> (Sender<InboundEvent>, ChannelInbound) {
    let (tx, rx) = mpsc::channel();
    (tx, ChannelInbound { rx })
}

pub struct ChannelInbound {
    rx: Receiver<InboundEvent>,
}

impl InboundPort for ChannelInbound {
    fn drain_into(&mut self, inbox: &mut Inbox) {
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    inbox.push(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("Inbound: all producers gone");
                    break;
                }
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Session flag
// ───────────────────────────────────────────────────────────────

/// Connected flag of the current client.  [`SessionFlag::renew`] gives each
/// new client its own flag, so stores from a retiring receiver thread land
/// on a flag nobody reads any more.
#[derive(Default)]
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
struct SessionFlag(Arc<AtomicBool>);

#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
impl SessionFlag {
    /// Start a new generation; the returned handle belongs to its receiver.
    fn renew(&mut self) -> Arc<AtomicBool> {
        self.0 = Arc::new(AtomicBool::new(false));
        Arc::clone(&self.0)
    }

    fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

// ───────────────────────────────────────────────────────────────
// MQTT adapter
// ───────────────────────────────────────────────────────────────

pub struct MqttAdapter {
    inbound: Sender<InboundEvent>,
    #[cfg(target_os = "espidf")]
    client: Option<EspMqttClient<'static>>,
    #[cfg(target_os = "espidf")]
    connected: SessionFlag,

    /// Simulation: broker accepts sessions.
    #[cfg(not(target_os = "espidf"))]
    sim_available: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_connected: bool,
    /// Simulation: publishes fail while the session stays up.
    #[cfg(not(target_os = "espidf"))]
    sim_publish_failing: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_subscriptions: Vec<String>,
    #[cfg(not(target_os = "espidf"))]
    sim_published: Vec<(String, Vec<u8>)>,
}

impl MqttAdapter {
    pub fn new(inbound: Sender<InboundEvent>) -> Self {
        Self {
            inbound,
            #[cfg(target_os = "espidf")]
            client: None,
            #[cfg(target_os = "espidf")]
            connected: SessionFlag::default(),
            #[cfg(not(target_os = "espidf"))]
            sim_available: true,
            #[cfg(not(target_os = "espidf"))]
            sim_connected: false,
            #[cfg(not(target_os = "espidf"))]
            sim_publish_failing: false,
            #[cfg(not(target_os = "espidf"))]
            sim_subscriptions: Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_published: Vec::new(),
        }
    }

    /// Hand a received message to the tick thread.
    fn forward(inbound: &Sender<InboundEvent>, topic: &str, data: &[u8]) {
        if data.len() > MAX_INBOUND_PAYLOAD {
            warn!(
                "MQTT: dropping oversized payload on {} ({} bytes)",
                topic,
                data.len()
            );
            return;
        }
        let event = InboundEvent::Message {
            topic: topic.into(),
            payload: data.to_vec(),
        };
        if inbound.send(event).is_err() {
            debug!("MQTT: inbound channel closed");
        }
    }
}

#[cfg(target_os = "espidf")]
impl MqttAdapter {
    fn spawn_receiver(
        &self,
        mut conn: EspMqttConnection,
        connected: Arc<AtomicBool>,
    ) -> Result<(), ConnectivityError> {
        let inbound = self.inbound.clone();
        std::thread::Builder::new()
            .name("mqtt-rx".into())
            .stack_size(6 * 1024)
            .spawn(move || {
                // Ends when the client is dropped.
                while let Ok(event) = conn.next() {
                    match event.payload() {
                        EventPayload::Connected(_) => {
                            connected.store(true, Ordering::Relaxed);
                        }
                        EventPayload::Disconnected => {
                            connected.store(false, Ordering::Relaxed);
                        }
                        EventPayload::Received {
                            topic: Some(topic),
                            data,
                            details: Details::Complete,
                            ..
                        } => Self::forward(&inbound, topic, data),
                        _ => {}
                    }
                }
                connected.store(false, Ordering::Relaxed);
                info!("MQTT: receiver stopped");
            })
            .map(|_| ())
            .map_err(|e| {
                warn!("MQTT: receiver thread spawn failed: {}", e);
                ConnectivityError::SessionRefused
            })
    }
}

// ───────────────────────────────────────────────────────────────
// BrokerPort
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
impl BrokerPort for MqttAdapter {
    fn connect(&mut self, params: &SessionParams<'_>) -> Result<(), ConnectivityError> {
        self.disconnect();

        let scheme = if params.port == MQTTS_PORT { "mqtts" } else { "mqtt" };
        let url = format!("{}://{}:{}", scheme, params.host, params.port);
        let conf = MqttClientConfiguration {
            client_id: Some(params.client_id),
            username: (!params.username.is_empty()).then_some(params.username),
            password: (!params.password.is_empty()).then_some(params.password),
            keep_alive_interval: Some(Duration::from_secs(u64::from(params.keepalive_secs))),
            crt_bundle_attach: (params.port == MQTTS_PORT)
                .then_some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };

        let (client, conn) = EspMqttClient::new(&url, &conf).map_err(|e| {
            warn!("MQTT: client creation failed: {:?}", e);
            ConnectivityError::SessionRefused
        })?;
        let flag = self.connected.renew();
        self.spawn_receiver(conn, flag)?;
        self.client = Some(client);
        info!("MQTT: session requested with {}", url);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.is_some() && self.connected.is_set()
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), ConnectivityError> {
        let client = self.client.as_mut().ok_or(ConnectivityError::NotConnected)?;
        client
            .subscribe(topic, QoS::AtLeastOnce)
            .map(|_| ())
            .map_err(|e| {
                warn!("MQTT: subscribe {} failed: {:?}", topic, e);
                ConnectivityError::SubscribeFailed
            })
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), ConnectivityError> {
        let client = self.client.as_mut().ok_or(ConnectivityError::NotConnected)?;
        client
            .enqueue(topic, QoS::AtMostOnce, false, payload)
            .map(|_| ())
            .map_err(|_| ConnectivityError::PublishFailed)
    }

    fn disconnect(&mut self) {
        if self.client.take().is_some() {
            info!("MQTT: session closed");
        }
        self.connected.clear();
    }
}

#[cfg(not(target_os = "espidf"))]
impl MqttAdapter {
    /// Simulation: make the broker refuse (or accept) sessions.  Refusing
    /// also drops a live session.
    pub fn set_available(&mut self, available: bool) {
        self.sim_available = available;
        if !available {
            self.sim_connected = false;
        }
    }

    /// Simulation: keep the session up but reject every publish.
    pub fn set_publish_failing(&mut self, failing: bool) {
        self.sim_publish_failing = failing;
    }

    /// Simulation: deliver a message as if the broker had pushed it.
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        if self.sim_subscriptions.iter().any(|t| t == topic) {
            Self::forward(&self.inbound, topic, payload);
        } else {
            debug!("MQTT(sim): no subscription for {}", topic);
        }
    }

    pub fn subscriptions(&self) -> &[String] {
        &self.sim_subscriptions
    }

    pub fn published(&self) -> &[(String, Vec<u8>)] {
        &self.sim_published
    }
}

#[cfg(not(target_os = "espidf"))]
impl BrokerPort for MqttAdapter {
    fn connect(&mut self, params: &SessionParams<'_>) -> Result<(), ConnectivityError> {
        if !self.sim_available {
            warn!("MQTT(sim): {}:{} refused", params.host, params.port);
            return Err(ConnectivityError::SessionRefused);
        }
        self.sim_connected = true;
        self.sim_subscriptions.clear();
        info!(
            "MQTT(sim): session up as {} on {}:{}",
            params.client_id, params.host, params.port
        );
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.sim_connected
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), ConnectivityError> {
        if !self.sim_connected {
            return Err(ConnectivityError::NotConnected);
        }
        self.sim_subscriptions.push(topic.into());
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), ConnectivityError> {
        if !self.sim_connected {
            return Err(ConnectivityError::NotConnected);
        }
        if self.sim_publish_failing {
            return Err(ConnectivityError::PublishFailed);
        }
        self.sim_published.push((topic.into(), payload.to_vec()));
        Ok(())
    }

    fn disconnect(&mut self) {
        self.sim_connected = false;
    }
}
