//! Status LED pattern engine with priority-based pattern selection.
//!
//! The status LED is a single GPIO, so every pattern is an on/off square
//! wave.  The controller calls `tick()` once per loop and writes the
//! returned level to the [`IndicatorPort`](crate::app::ports::IndicatorPort).
//!
//! ## Priority hierarchy (highest first)
//!
//! 1. **Alarm**: rapid flash while the device is in ERROR
//! 2. **Button**: fast blink while a factory-reset hold is being timed
//! 3. **FSM state**: one pattern per state, see [`pattern_for_state`]
//!
//! ## Pattern types
//!
//! | Pattern      | Description                      | Rate   |
//! |-------------|----------------------------------|--------|
//! | Solid        | Constant on                      | -      |
//! | SlowBlink    | On/off square wave               | 1 Hz   |
//! | FastBlink    | On/off square wave               | 4 Hz   |
//! | DoubleBlink  | Two quick flashes, then pause    | 1 Hz   |
//! | RapidFlash   | Very fast on/off                 | 8 Hz   |

use crate::fsm::StateId;

/// Pattern identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternId {
    Solid,
    SlowBlink,
    FastBlink,
    DoubleBlink,
    RapidFlash,
    Off,
}

/// LED pattern engine. Stack-allocated, no heap.
pub struct LedPatternEngine {
    phase_ms: u64,
    active: Option<PatternId>,
    state_pattern: Option<PatternId>,
    button_active: bool,
    alarm_active: bool,
}

impl LedPatternEngine {
    pub fn new() -> Self {
        Self {
            phase_ms: 0,
            active: None,
            state_pattern: None,
            button_active: false,
            alarm_active: false,
        }
    }

    /// Set the FSM-layer pattern (lowest priority).
    pub fn set_state_pattern(&mut self, pattern: PatternId) {
        self.state_pattern = Some(pattern);
    }

    /// Set or clear the factory-reset hold feedback.
    pub fn set_button_feedback(&mut self, active: bool) {
        self.button_active = active;
    }

    /// Set or clear the alarm pattern (highest priority).
    pub fn set_alarm(&mut self, active: bool) {
        self.alarm_active = active;
    }

    /// Advance the pattern phase and return the LED level.
    /// `delta_ms` is the time since the last call.
    pub fn tick(&mut self, delta_ms: u64) -> bool {
        self.phase_ms = self.phase_ms.wrapping_add(delta_ms);

        let selected = self.select_active();
        if selected != self.active {
            self.phase_ms = 0;
        }
        self.active = selected;

        self.active.is_some_and(|p| self.generate(p))
    }

    fn select_active(&self) -> Option<PatternId> {
        if self.alarm_active {
            Some(PatternId::RapidFlash)
        } else if self.button_active {
            Some(PatternId::FastBlink)
        } else {
            self.state_pattern
        }
    }

    fn generate(&self, pattern: PatternId) -> bool {
        match pattern {
            PatternId::Solid => true,
            PatternId::Off => false,
            PatternId::SlowBlink => (self.phase_ms % 1000) < 500,
            PatternId::FastBlink => (self.phase_ms % 250) < 125,
            PatternId::DoubleBlink => {
                let cycle = self.phase_ms % 1000;
                cycle < 100 || (200..300).contains(&cycle)
            }
            PatternId::RapidFlash => (self.phase_ms % 125) < 63,
        }
    }
}

impl Default for LedPatternEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Pattern shown for each controller state.
pub fn pattern_for_state(state: StateId) -> PatternId {
    match state {
        StateId::Initializing => PatternId::Solid,
        StateId::ConnectingWifi => PatternId::SlowBlink,
        StateId::ConnectingMqtt => PatternId::FastBlink,
        StateId::Ready => PatternId::Solid,
        StateId::Error => PatternId::RapidFlash,
        StateId::Maintenance => PatternId::Off,
        StateId::OtaUpdate => PatternId::DoubleBlink,
    }
}
