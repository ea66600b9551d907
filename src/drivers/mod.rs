//! Hardware initialisation and indicator pattern helpers.

pub mod hw_init;
pub mod led_patterns;
