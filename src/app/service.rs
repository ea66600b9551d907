//! Application service: the hexagonal core.
//!
//! [`Controller`] owns the FSM, the shared [`DeviceContext`], the
//! connectivity state machine, the publication scheduler, the maintenance
//! gate and the error reporter.  It owns no adapter: every port is
//! borrowed for one tick through [`DevicePorts`], which keeps the whole
//! orchestration testable with mock adapters.
//!
//! ```text
//!  NetworkPort ─┐                         ┌──▶ BrokerPort (publish)
//!  BrokerPort ──┤   ┌─────────────────┐   ├──▶ IndicatorPort
//!  InboundPort ─┼──▶│   Controller    │───┼──▶ PeripheralPort
//!  UpdatePort ──┤   │ FSM · Link ·    │   ├──▶ StoragePort
//!  SensorPort ──┘   │ Scheduler · Gate│   └──▶ EventSink
//!                   └─────────────────┘
//! ```
//!
//! ## Tick order
//!
//! 1. Update transport events.  While an update runs nothing else does.
//! 2. Factory-reset button.
//! 3. Connectivity step, then the FSM reacts to the link edge.
//! 4. Inbound queue (routed only in READY, discarded otherwise).
//! 5. Publication scheduler (READY only).
//! 6. Deferred restart.
//! 7. LED and buzzer.

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::{ConfigPatch, DeviceConfig, Timing};
use crate::connectivity::{ConnectivityManager, ConnectivityState, LinkEvent, LinkTarget};
use crate::drivers::led_patterns::{LedPatternEngine, pattern_for_state};
use crate::error::Error;
use crate::fsm::context::DeviceContext;
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::identity::DeviceIdentity;
use crate::maintenance::{FactoryResetDetector, ResetEvent, UpdateGate};
use crate::reporter::{ErrorReporter, RemoteLog};
use crate::router::{self, Routed};
use crate::scheduler::TelemetryScheduler;
use crate::store::ConfigStore;
use crate::telemetry::{StatusPayload, TelemetryPayload, TelemetrySnapshot};
use crate::topics::TopicSet;

use super::commands::DeviceCommand;
use super::events::{AppEvent, InboundEvent, Inbox, UpdateEvent};
use super::ports::{DevicePorts, EventSink, PublicationKind, SchedulerDelegate};

// ───────────────────────────────────────────────────────────────
// Controller
// ───────────────────────────────────────────────────────────────

/// The device orchestration core.
pub struct Controller {
    fsm: Fsm,
    ctx: DeviceContext,
    link: ConnectivityManager,
    scheduler: TelemetryScheduler,
    reset: FactoryResetDetector,
    update: UpdateGate,
    reporter: ErrorReporter,
    led: LedPatternEngine,
    inbox: Inbox,
    /// Monotonic deadline of a deferred restart (config change, update).
    pending_restart_at: Option<u64>,
    last_status: Option<StatusPayload>,
    last_tick_ms: u64,
}

impl Controller {
    /// Construct the controller.
    ///
    /// Does **not** touch any port: call [`start`](Self::start) next.
    pub fn new(timing: Timing) -> Self {
        Self {
            fsm: Fsm::new(build_state_table(), StateId::Initializing),
            ctx: DeviceContext::new(timing),
            link: ConnectivityManager::new(timing),
            scheduler: TelemetryScheduler::new(&timing),
            reset: FactoryResetDetector::new(timing.button_debounce_ms, timing.factory_reset_hold_ms),
            update: UpdateGate::new(),
            reporter: ErrorReporter::new(),
            led: LedPatternEngine::new(),
            inbox: Inbox::new(),
            pending_restart_at: None,
            last_status: None,
            last_tick_ms: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Enter INITIALIZING and load the persisted configuration.
    ///
    /// The FSM moves on to CONNECTING_WIFI on the first [`tick`](Self::tick).
    pub fn start(&mut self, now_ms: u64, ports: &mut DevicePorts<'_>) {
        self.ctx.now_ms = now_ms;
        self.last_tick_ms = now_ms;
        self.fsm.start(&mut self.ctx);

        let mac = ports.system.mac_address();
        let loaded = ConfigStore::new(&mut *ports.storage).load(&mac);
        self.ctx.adopt(loaded);
        self.scheduler.anchor(now_ms);

        info!(
            "Controller started: device {} ({}), firmware {}",
            self.ctx.identity,
            self.ctx.config.device_type.as_str(),
            crate::config::FIRMWARE_VERSION
        );
        ports.sink.emit(&AppEvent::Started(self.fsm.current_state()));
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one cooperative scheduling pass.  Never blocks beyond the
    /// adapters' own bounded calls.
    pub fn tick(&mut self, now_ms: u64, ports: &mut DevicePorts<'_>) {
        let delta_ms = now_ms.saturating_sub(self.last_tick_ms);
        self.last_tick_ms = now_ms;
        self.ctx.now_ms = now_ms;

        // 1. Update transport: exclusive while a transfer runs
        self.poll_updates(now_ms, ports);
        if self.update.is_updating() {
            self.discard_inbound(ports);
            self.drive_outputs(now_ms, delta_ms, ports);
            return;
        }

        // 2. Factory-reset button
        let pressed = ports.sensors.button_pressed();
        match self.reset.sample(pressed, now_ms) {
            Some(ResetEvent::HoldStarted) => info!("Button: hold started"),
            Some(ResetEvent::Cancelled) => info!("Button: released before factory reset"),
            Some(ResetEvent::Triggered) => {
                self.factory_reset(ports);
                self.drive_outputs(now_ms, delta_ms, ports);
                return;
            }
            None => {}
        }

        // 3. Connectivity, then let the FSM react to the edge
        self.step_link(now_ms, ports);

        // 4. Inbound
        self.process_inbound(now_ms, ports);

        // 5. Scheduled publications
        if self.ctx.operational {
            let mut publisher = Publisher {
                now_ms,
                state: self.fsm.current_state(),
                ctx: &self.ctx,
                link: &self.link,
                ports: &mut *ports,
                last_status: &mut self.last_status,
            };
            self.scheduler.tick(now_ms, &mut publisher);
        }

        // 6. Deferred restart
        if let Some(at) = self.pending_restart_at {
            if now_ms >= at {
                self.pending_restart_at = None;
                info!("Controller: restarting now");
                ports.system.restart();
            }
        }

        // 7. Indicators
        self.drive_outputs(now_ms, delta_ms, ports);
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn link_state(&self) -> ConnectivityState {
        self.link.state()
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.ctx.config
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.ctx.identity
    }

    pub fn topics(&self) -> &TopicSet {
        &self.ctx.topics
    }

    pub fn is_updating(&self) -> bool {
        self.update.is_updating()
    }

    /// Deadline of a scheduled restart, if any.
    pub fn pending_restart_at(&self) -> Option<u64> {
        self.pending_restart_at
    }

    /// Last status document built (what `GET /api/status` mirrors).
    pub fn last_status(&self) -> Option<&StatusPayload> {
        self.last_status.as_ref()
    }

    /// Conditions reported through the error path since boot.
    pub fn fault_count(&self) -> u32 {
        self.reporter.report_count()
    }

    pub fn last_fault(&self) -> Option<Error> {
        self.reporter.last_error()
    }

    pub fn scheduler(&self) -> &TelemetryScheduler {
        &self.scheduler
    }

    pub fn link(&self) -> &ConnectivityManager {
        &self.link
    }

    // ── Connectivity ──────────────────────────────────────────

    fn step_link(&mut self, now_ms: u64, ports: &mut DevicePorts<'_>) {
        let target = LinkTarget {
            config: &self.ctx.config,
            client_id: &self.ctx.client_id,
            topics: &self.ctx.topics,
        };
        let report =
            self.link
                .ensure_connected(now_ms, &target, &mut *ports.network, &mut *ports.broker);

        let prev = self.fsm.current_state();
        self.ctx.link_event = report.event;
        self.fsm.tick(&mut self.ctx);
        self.ctx.link_event = None;
        self.note_transition(prev, ports.sink);

        if let Some(err) = report.error {
            self.raise(now_ms, err.into(), ports);
        }

        if report.event == Some(LinkEvent::SessionEstablished) && self.ctx.operational {
            self.publish_status(now_ms, ports);
        }
    }

    /// Tear the link down so the current settings are used from scratch.
    fn relink(&mut self, ports: &mut DevicePorts<'_>) {
        self.link.reset(&mut *ports.network, &mut *ports.broker);
        if self.fsm.current_state() == StateId::Ready {
            self.transition_to(StateId::ConnectingWifi, ports.sink);
        }
    }

    // ── Inbound ───────────────────────────────────────────────

    fn process_inbound(&mut self, now_ms: u64, ports: &mut DevicePorts<'_>) {
        ports.inbound.drain_into(&mut self.inbox);
        while let Some(event) = self.inbox.pop() {
            let routed = match &event {
                InboundEvent::Message { .. } if !self.ctx.operational => {
                    debug!("Inbound: discarding message in {}", self.fsm.state_name());
                    continue;
                }
                // Forms are the local recovery path, so only maintenance drops them.
                InboundEvent::ConfigForm(_)
                    if self.fsm.current_state() == StateId::Maintenance =>
                {
                    debug!("Inbound: discarding form during maintenance");
                    continue;
                }
                InboundEvent::Message { topic, payload } => {
                    router::route(topic, payload, &self.ctx.topics)
                }
                InboundEvent::ConfigForm(body) => router::route_form(body),
            };
            self.execute(now_ms, routed, ports);
        }
    }

    fn discard_inbound(&mut self, ports: &mut DevicePorts<'_>) {
        ports.inbound.drain_into(&mut self.inbox);
        while self.inbox.pop().is_some() {
            debug!("Inbound: discarding event during update");
        }
    }

    fn execute(&mut self, now_ms: u64, routed: Routed, ports: &mut DevicePorts<'_>) {
        match routed {
            Routed::Ignored => {}
            Routed::Malformed(e) => debug!("Inbound: discarded ({})", e),
            Routed::Command(cmd) => self.run_command(now_ms, cmd, ports),
            Routed::ConfigPatch(patch) => self.apply_patch(now_ms, &patch, ports),
        }
    }

    fn run_command(&mut self, now_ms: u64, cmd: DeviceCommand, ports: &mut DevicePorts<'_>) {
        let config = self.ctx.config.clone();
        if cmd.needs_feeder() && !config.feeder_enabled {
            info!("Command: {:?} ignored, feeder disabled", cmd);
            return;
        }
        if cmd.needs_door() && !config.door_enabled {
            info!("Command: {:?} ignored, door disabled", cmd);
            return;
        }

        if let Some(why) = cmd.out_of_range() {
            warn!("Command: {:?} dropped, {}", cmd, why);
            return;
        }

        ports.sink.emit(&AppEvent::CommandHandled(cmd));
        match cmd {
            DeviceCommand::Restart => {
                info!("Command: restart requested");
                ports.system.restart();
            }
            DeviceCommand::Status | DeviceCommand::Ping => self.publish_status(now_ms, ports),
            DeviceCommand::Feed { grams } => {
                let grams = grams.unwrap_or(config.default_feeding_amount);
                info!("Command: feed {} g", grams);
                ports.peripherals.feed(grams);
            }
            DeviceCommand::OpenDoor { duration_ms } => {
                let duration = duration_ms.unwrap_or(config.door_open_duration_ms);
                info!("Command: open door for {} ms", duration);
                ports.peripherals.open_door(duration);
            }
            DeviceCommand::CloseDoor => {
                info!("Command: close door");
                ports.peripherals.close_door();
            }
        }
    }

    /// Validate, apply, persist, then schedule the restart.
    fn apply_patch(&mut self, now_ms: u64, patch: &ConfigPatch, ports: &mut DevicePorts<'_>) {
        if patch.is_empty() {
            info!("Config: no recognised field, nothing to do");
            return;
        }
        let next = match patch.applied_to(&self.ctx.config) {
            Ok(next) => next,
            Err(e) => {
                warn!("Config: patch rejected: {}", e);
                return;
            }
        };
        self.ctx.config = next;

        let persisted = match ConfigStore::new(&mut *ports.storage).save(&self.ctx.config) {
            Ok(()) => {
                let at = now_ms + self.ctx.timing.restart_grace_ms;
                info!("Config: saved, restart at {} ms", at);
                self.pending_restart_at = Some(at);
                true
            }
            Err(e) => {
                error!("Config: persist failed ({}), applying in memory only", e);
                self.relink(ports);
                false
            }
        };
        ports.sink.emit(&AppEvent::ConfigApplied { persisted });
    }

    fn publish_status(&mut self, now_ms: u64, ports: &mut DevicePorts<'_>) {
        let mut publisher = Publisher {
            now_ms,
            state: self.fsm.current_state(),
            ctx: &self.ctx,
            link: &self.link,
            ports,
            last_status: &mut self.last_status,
        };
        if !publisher.status() {
            debug!("Controller: on-demand status not delivered");
        }
    }

    // ── Maintenance ───────────────────────────────────────────

    fn poll_updates(&mut self, now_ms: u64, ports: &mut DevicePorts<'_>) {
        while let Some(event) = ports.update.poll_event() {
            match event {
                UpdateEvent::Started { total } => {
                    match self.update.begin(self.fsm.current_state(), total) {
                        Ok(()) => {
                            self.transition_to(StateId::OtaUpdate, ports.sink);
                            ports
                                .sink
                                .emit(&AppEvent::UpdateProgress { written: 0, total });
                        }
                        Err(e) => warn!("Update: start ignored: {}", e),
                    }
                }
                UpdateEvent::Progress { written, total } => {
                    if self.update.is_updating() {
                        self.update.progress(written, total);
                        ports
                            .sink
                            .emit(&AppEvent::UpdateProgress { written, total });
                    }
                }
                UpdateEvent::Completed => {
                    if let Some(resume) = self.update.complete() {
                        self.transition_to(resume, ports.sink);
                        let at = now_ms + self.ctx.timing.restart_grace_ms;
                        info!("Update: new image staged, restart at {} ms", at);
                        self.pending_restart_at = Some(at);
                    }
                }
                UpdateEvent::Failed(reason) => {
                    if self.update.is_updating() {
                        self.update.fail(reason);
                        self.raise(now_ms, Error::Update(reason), ports);
                    }
                }
            }
        }
    }

    fn factory_reset(&mut self, ports: &mut DevicePorts<'_>) {
        warn!("Button: factory reset");
        self.transition_to(StateId::Maintenance, ports.sink);
        if let Err(e) = ConfigStore::new(&mut *ports.storage).clear() {
            error!("Factory reset: clearing storage failed: {}", e);
        }
        ports.sink.emit(&AppEvent::FactoryReset);
        ports.system.restart();
    }

    // ── Error path ────────────────────────────────────────────

    /// The single reporting path: ERROR, alarm, best-effort remote log.
    fn raise(&mut self, now_ms: u64, err: Error, ports: &mut DevicePorts<'_>) {
        self.transition_to(StateId::Error, ports.sink);
        ports.sink.emit(&AppEvent::Fault(err));

        let epoch_secs = ports.system.epoch_secs();
        self.reporter.report(
            now_ms,
            err,
            RemoteLog {
                link: &self.link,
                broker: &mut *ports.broker,
                topic: &self.ctx.topics.log,
                identity: &self.ctx.identity,
                epoch_secs,
            },
        );

        // ERROR is only left through a fresh reconnect sequence.
        if self.link.is_session_active() {
            self.link.reset(&mut *ports.network, &mut *ports.broker);
        }
    }

    // ── Internal helpers ──────────────────────────────────────

    fn transition_to(&mut self, next: StateId, sink: &mut dyn EventSink) {
        let prev = self.fsm.current_state();
        self.fsm.force_transition(next, &mut self.ctx);
        self.note_transition(prev, sink);
    }

    fn note_transition(&mut self, prev: StateId, sink: &mut dyn EventSink) {
        let now = self.fsm.current_state();
        if now == prev {
            return;
        }
        if prev == StateId::Error {
            self.reporter.silence();
        }
        sink.emit(&AppEvent::StateChanged { from: prev, to: now });
    }

    fn drive_outputs(&mut self, now_ms: u64, delta_ms: u64, ports: &mut DevicePorts<'_>) {
        let state = self.fsm.current_state();
        self.led.set_state_pattern(pattern_for_state(state));
        self.led.set_alarm(state == StateId::Error);
        self.led.set_button_feedback(self.reset.is_holding());
        ports.indicator.set_led(self.led.tick(delta_ms));
        ports.indicator.set_buzzer(self.reporter.buzzer_on(now_ms));
    }
}

// ───────────────────────────────────────────────────────────────
// Publisher (scheduler delegate)
// ───────────────────────────────────────────────────────────────

/// Builds and publishes documents for one tick.  Every publication reads
/// a fresh snapshot first.
struct Publisher<'r, 'p> {
    now_ms: u64,
    state: StateId,
    ctx: &'r DeviceContext,
    link: &'r ConnectivityManager,
    ports: &'r mut DevicePorts<'p>,
    last_status: &'r mut Option<StatusPayload>,
}

impl Publisher<'_, '_> {
    fn snapshot(&mut self) -> TelemetrySnapshot {
        TelemetrySnapshot::capture(
            self.now_ms,
            &mut *self.ports.sensors,
            &*self.ports.network,
            &*self.ports.system,
            &*self.ports.peripherals,
        )
    }

    /// Returns `true` when the broker accepted the document.
    fn status(&mut self) -> bool {
        let ctx = self.ctx;
        let snap = self.snapshot();
        let epoch = self.ports.system.epoch_secs();
        let doc = StatusPayload::build(&ctx.identity, self.state, &snap, epoch, &ctx.config);
        let sent = self.send(&ctx.topics.status, &doc);
        self.ports.sink.emit(&AppEvent::Status(doc.clone()));
        *self.last_status = Some(doc);
        sent
    }

    fn telemetry(&mut self) -> bool {
        let ctx = self.ctx;
        let snap = self.snapshot();
        let epoch = self.ports.system.epoch_secs();
        let doc = TelemetryPayload::build(&ctx.identity, &snap, epoch);
        let sent = self.send(&ctx.topics.telemetry, &doc);
        self.ports.sink.emit(&AppEvent::Telemetry(doc));
        sent
    }

    fn send<T: Serialize>(&mut self, topic: &str, doc: &T) -> bool {
        match serde_json::to_vec(doc) {
            Ok(bytes) => self
                .link
                .publish(&mut *self.ports.broker, topic, &bytes)
                .is_ok(),
            Err(e) => {
                warn!("Publish: encoding for {} failed: {}", topic, e);
                false
            }
        }
    }
}

impl SchedulerDelegate for Publisher<'_, '_> {
    fn on_publication_due(&mut self, kind: PublicationKind) {
        let sent = match kind {
            PublicationKind::Heartbeat | PublicationKind::StatusUpdate => self.status(),
            PublicationKind::Telemetry => self.telemetry(),
        };
        if !sent {
            self.ports.sink.emit(&AppEvent::PublishSkipped(kind));
        }
    }
}
