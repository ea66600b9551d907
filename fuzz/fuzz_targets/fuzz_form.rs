//! Fuzz target: `router::route_form`
//!
//! Feeds arbitrary UTF-8 as a urlencoded config form.  Decoding must never
//! panic, and a body that decodes once must decode to the same fields
//! again.
//!
//! cargo fuzz run fuzz_form

#![no_main]

use libfuzzer_sys::fuzz_target;
use petsmart::config::DeviceConfig;
use petsmart::router::{self, Routed};

fuzz_target!(|data: &[u8]| {
    let Ok(body) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(fields) = router::parse_form(body) {
        assert_eq!(router::parse_form(body), Ok(fields));
    }

    if let Routed::ConfigPatch(patch) = router::route_form(body) {
        let _ = patch.applied_to(&DeviceConfig::default());
    }
});
