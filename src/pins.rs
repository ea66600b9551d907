//! GPIO / peripheral pin assignments for the Pet Smart Home controller
//! board (ESP32 DevKit).
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Indicators
// ---------------------------------------------------------------------------

/// Status LED, active HIGH.
pub const STATUS_LED_GPIO: i32 = 2;
/// Piezo buzzer driver transistor, active HIGH.
pub const BUZZER_GPIO: i32 = 4;

// ---------------------------------------------------------------------------
// User input
// ---------------------------------------------------------------------------

/// BOOT button, doubles as factory reset.  Active LOW, internal pull-up.
pub const RESET_BUTTON_GPIO: i32 = 0;

// ---------------------------------------------------------------------------
// Battery sense (ADC1)
// ---------------------------------------------------------------------------

/// Battery terminal through a 1:2 resistive divider.  ADC1 channel 7.
pub const BATTERY_ADC_GPIO: i32 = 35;
/// Divider ratio: battery voltage = pin voltage × this.
pub const BATTERY_DIVIDER_RATIO: f32 = 2.0;
/// ADC full-scale reference (11 dB attenuation).
pub const ADC_REFERENCE_V: f32 = 3.3;
/// 12-bit conversion.
pub const ADC_MAX_COUNT: u16 = 4095;
