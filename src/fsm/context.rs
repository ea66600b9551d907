//! Shared mutable context threaded through every FSM handler.
//!
//! `DeviceContext` is the single struct that state handlers read from and
//! write to: the loaded configuration and identity, the link edge observed
//! this tick, and a few flags the controller consumes after the FSM has
//! run.  Think of it as the "blackboard" in a blackboard architecture.

use crate::config::{DeviceConfig, Timing};
use crate::connectivity::{ClientId, LinkEvent, client_id};
use crate::identity::DeviceIdentity;
use crate::store::LoadedConfig;
use crate::topics::TopicSet;

/// The shared context passed to every state handler function.
pub struct DeviceContext {
    // -- Timing --
    /// Ticks elapsed since the current state was entered.
    pub ticks_in_state: u64,
    /// Monotonic total tick count.
    pub total_ticks: u64,
    /// Monotonic milliseconds at the start of the current tick.
    pub now_ms: u64,
    pub timing: Timing,

    // -- Device --
    pub config: DeviceConfig,
    pub identity: DeviceIdentity,
    /// Rendered once from `identity`.
    pub topics: TopicSet,
    pub client_id: ClientId,
    /// Set once the Config Store has been read.
    pub config_loaded: bool,

    // -- Inputs for this tick --
    /// Edge reported by the Connectivity Manager this tick, if any.
    pub link_event: Option<LinkEvent>,

    // -- Outputs --
    /// Inbound commands and scheduled publications run only while set.
    pub operational: bool,
}

impl DeviceContext {
    /// Context before the store has been read: default config, placeholder
    /// identity.
    pub fn new(timing: Timing) -> Self {
        let identity = DeviceIdentity::from_mac(&[0; 6]);
        Self {
            ticks_in_state: 0,
            total_ticks: 0,
            now_ms: 0,
            timing,
            config: DeviceConfig::default(),
            topics: TopicSet::for_device(&identity),
            client_id: client_id(&identity),
            identity,
            config_loaded: false,
            link_event: None,
            operational: false,
        }
    }

    /// Install what the Config Store returned.
    pub fn adopt(&mut self, loaded: LoadedConfig) {
        self.topics = TopicSet::for_device(&loaded.identity);
        self.client_id = client_id(&loaded.identity);
        self.identity = loaded.identity;
        self.config = loaded.config;
        self.config_loaded = true;
    }

    /// Milliseconds elapsed since the current state was entered.
    pub fn ms_in_state(&self) -> u64 {
        self.ticks_in_state * self.timing.tick_interval_ms
    }
}
