//! Fuzz target: `router::route`
//!
//! Splits the input into a topic selector byte and a payload, routes the
//! payload on the command, config or an arbitrary topic, and asserts the
//! router never panics and never acts on a foreign topic.  Any config
//! patch it yields must validate or be rejected without panicking.
//!
//! cargo fuzz run fuzz_router

#![no_main]

use libfuzzer_sys::fuzz_target;
use petsmart::config::DeviceConfig;
use petsmart::identity::DeviceIdentity;
use petsmart::router::{self, Routed};
use petsmart::topics::TopicSet;

fuzz_target!(|data: &[u8]| {
    let Some((&selector, payload)) = data.split_first() else {
        return;
    };
    let topics = TopicSet::for_device(&DeviceIdentity::from_mac(&[0x24, 0x6F, 0x28, 0, 0, 1]));

    let topic = match selector % 3 {
        0 => topics.command.as_str(),
        1 => topics.config.as_str(),
        _ => "devices/FFFFFFFFFFFF/command",
    };

    match router::route(topic, payload, &topics) {
        Routed::ConfigPatch(patch) => {
            assert_eq!(topic, topics.config.as_str(), "patch from a non-config topic");
            let _ = patch.applied_to(&DeviceConfig::default());
        }
        Routed::Command(_) => {
            assert_eq!(topic, topics.command.as_str(), "command from a non-command topic");
        }
        Routed::Ignored | Routed::Malformed(_) => {}
    }
});
