//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Anything `AppConfig::parse()` accepts must survive a serialize/parse
//! round trip.

#![no_main]

use libfuzzer_sys::fuzz_target;
use wgctl_config::AppConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = AppConfig::parse(s) {
        let text = toml::to_string(&config).expect("valid config serializes");
        AppConfig::parse(&text).expect("serialized config parses");
    }
});
