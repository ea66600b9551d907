//! Board adapters: bridge the on-board I/O to domain port traits.
//!
//! [`BoardSensors`] exposes the battery ADC, die temperature (where the
//! chip has one) and the reset button through [`SensorPort`].
//! [`BoardIndicator`] drives the status LED and buzzer through
//! [`IndicatorPort`].  These are the only types that touch board GPIO.
//! On non-espidf targets readings come from settable simulation fields
//! and output levels are recorded for inspection.

use crate::app::ports::{IndicatorPort, SensorPort};
use crate::drivers::hw_init;
use crate::pins;

// ── Sensors ───────────────────────────────────────────────────

pub struct BoardSensors {
    #[cfg(not(target_os = "espidf"))]
    sim_battery_v: f32,
    #[cfg(not(target_os = "espidf"))]
    sim_temperature: Option<f32>,
    #[cfg(not(target_os = "espidf"))]
    sim_button: bool,
}

#[cfg(target_os = "espidf")]
impl BoardSensors {
    /// Expects [`hw_init::init_peripherals`] to have run.
    pub fn new() -> Self {
        Self {}
    }
}

#[cfg(not(target_os = "espidf"))]
impl BoardSensors {
    pub fn new() -> Self {
        Self {
            sim_battery_v: 3.9,
            sim_temperature: Some(24.5),
            sim_button: false,
        }
    }

    pub fn set_battery_voltage(&mut self, volts: f32) {
        self.sim_battery_v = volts;
    }

    pub fn set_temperature(&mut self, celsius: Option<f32>) {
        self.sim_temperature = celsius;
    }

    pub fn set_button(&mut self, pressed: bool) {
        self.sim_button = pressed;
    }
}

impl Default for BoardSensors {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl SensorPort for BoardSensors {
    fn battery_voltage(&mut self) -> f32 {
        hw_init::battery_volts(hw_init::adc1_read(hw_init::ADC1_CH_BATTERY))
    }

    fn internal_temperature(&mut self) -> Option<f32> {
        // The ESP32 die sensor is not exposed by ESP-IDF 5.
        None
    }

    fn button_pressed(&mut self) -> bool {
        // Active LOW.
        !hw_init::gpio_read(pins::RESET_BUTTON_GPIO)
    }
}

#[cfg(not(target_os = "espidf"))]
impl SensorPort for BoardSensors {
    fn battery_voltage(&mut self) -> f32 {
        self.sim_battery_v
    }

    fn internal_temperature(&mut self) -> Option<f32> {
        self.sim_temperature
    }

    fn button_pressed(&mut self) -> bool {
        self.sim_button
    }
}

// ── Indicators ────────────────────────────────────────────────

/// Status LED and buzzer.  Levels are cached so the GPIO is only written
/// on change.
#[derive(Default)]
pub struct BoardIndicator {
    led_on: bool,
    buzzer_on: bool,
}

impl BoardIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn led_on(&self) -> bool {
        self.led_on
    }

    pub fn buzzer_on(&self) -> bool {
        self.buzzer_on
    }
}

impl IndicatorPort for BoardIndicator {
    fn set_led(&mut self, on: bool) {
        if on != self.led_on {
            hw_init::gpio_write(pins::STATUS_LED_GPIO, on);
            self.led_on = on;
        }
    }

    fn set_buzzer(&mut self, on: bool) {
        if on != self.buzzer_on {
            hw_init::gpio_write(pins::BUZZER_GPIO, on);
            self.buzzer_on = on;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_levels_are_tracked() {
        let mut ind = BoardIndicator::new();
        ind.set_led(true);
        ind.set_buzzer(true);
        assert!(ind.led_on());
        assert!(ind.buzzer_on());
        ind.set_buzzer(false);
        assert!(!ind.buzzer_on());
    }

    #[test]
    fn sim_readings_are_settable() {
        let mut board = BoardSensors::new();
        board.set_battery_voltage(3.5);
        board.set_temperature(None);
        board.set_button(true);
        assert_eq!(board.battery_voltage(), 3.5);
        assert_eq!(board.internal_temperature(), None);
        assert!(board.button_pressed());
    }
}
