//! Error/Alarm Reporter: the single path every fatal-looking condition
//! takes.
//!
//! The controller forces the FSM into ERROR and then calls
//! [`ErrorReporter::report`], which
//!
//! 1. restarts the bounded buzzer [`AlarmSequence`],
//! 2. publishes a `level: "ERROR"` log document if a session is up.
//!
//! Step 2 is best effort: a failed publish is logged locally and dropped.

use log::{debug, error};

use crate::app::ports::BrokerPort;
use crate::connectivity::ConnectivityManager;
use crate::error::Error;
use crate::identity::DeviceIdentity;
use crate::telemetry::LogPayload;

// ═══════════════════════════════════════════════════════════════
//  Alarm
// ═══════════════════════════════════════════════════════════════

const BEEP_ON_MS: u64 = 200;
const BEEP_OFF_MS: u64 = 200;
const BEEP_COUNT: u64 = 3;

/// Three 200 ms beeps separated by 200 ms of silence.
#[derive(Debug, Default)]
pub struct AlarmSequence {
    started_ms: Option<u64>,
}

impl AlarmSequence {
    pub fn restart(&mut self, now_ms: u64) {
        self.started_ms = Some(now_ms);
    }

    pub fn cancel(&mut self) {
        self.started_ms = None;
    }

    /// Buzzer level at `now_ms`; `false` once the sequence has run out.
    pub fn buzzer_on(&mut self, now_ms: u64) -> bool {
        let Some(start) = self.started_ms else {
            return false;
        };
        let elapsed = now_ms.saturating_sub(start);
        let period = BEEP_ON_MS + BEEP_OFF_MS;
        if elapsed >= BEEP_COUNT * period {
            self.started_ms = None;
            return false;
        }
        elapsed % period < BEEP_ON_MS
    }

    pub fn is_running(&self) -> bool {
        self.started_ms.is_some()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Reporter
// ═══════════════════════════════════════════════════════════════

/// Where a remote log line goes, borrowed for one report.
pub struct RemoteLog<'a> {
    pub link: &'a ConnectivityManager,
    pub broker: &'a mut dyn BrokerPort,
    pub topic: &'a str,
    pub identity: &'a DeviceIdentity,
    pub epoch_secs: u64,
}

#[derive(Debug, Default)]
pub struct ErrorReporter {
    alarm: AlarmSequence,
    reports: u32,
    last: Option<Error>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, now_ms: u64, err: Error, remote: RemoteLog<'_>) {
        self.reports = self.reports.wrapping_add(1);
        self.last = Some(err);
        error!("FAULT #{}: {}", self.reports, err);

        self.alarm.restart(now_ms);

        if !remote.link.is_session_active() {
            debug!("Reporter: no session, remote log skipped");
            return;
        }
        let doc = LogPayload::error(remote.identity, remote.epoch_secs, err.to_string());
        match serde_json::to_vec(&doc) {
            Ok(bytes) => {
                if remote.link.publish(remote.broker, remote.topic, &bytes).is_err() {
                    debug!("Reporter: remote log dropped");
                }
            }
            Err(e) => debug!("Reporter: log encode failed: {}", e),
        }
    }

    /// Drive the buzzer; call once per tick.
    pub fn buzzer_on(&mut self, now_ms: u64) -> bool {
        self.alarm.buzzer_on(now_ms)
    }

    /// Silence the buzzer (leaving ERROR).
    pub fn silence(&mut self) {
        self.alarm.cancel();
    }

    pub fn report_count(&self) -> u32 {
        self.reports
    }

    pub fn last_error(&self) -> Option<Error> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alarm_beeps_three_times() {
        let mut alarm = AlarmSequence::default();
        alarm.restart(1_000);
        let mut rising = 0;
        let mut prev = false;
        for t in (1_000..3_000).step_by(10) {
            let on = alarm.buzzer_on(t);
            if on && !prev {
                rising += 1;
            }
            prev = on;
        }
        assert_eq!(rising, 3);
        assert!(!alarm.is_running());
    }

    #[test]
    fn alarm_pattern_timing() {
        let mut alarm = AlarmSequence::default();
        alarm.restart(0);
        assert!(alarm.buzzer_on(0));
        assert!(alarm.buzzer_on(199));
        assert!(!alarm.buzzer_on(200));
        assert!(alarm.buzzer_on(400));
        assert!(!alarm.buzzer_on(1_200));
    }

    #[test]
    fn silent_without_report() {
        let mut alarm = AlarmSequence::default();
        assert!(!alarm.buzzer_on(0));
    }
}
