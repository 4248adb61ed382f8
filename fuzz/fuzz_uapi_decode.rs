//! Fuzz target for the UAPI response decoder and endpoint helpers.
//!
//! Run with: cargo +nightly fuzz run fuzz_uapi_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use wgctl_core::endpoint::{is_domain_endpoint, split_host_port};
use wgctl_core::uapi::codec::decode_response;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(state) = decode_response(text) {
        let announced = text.lines().filter(|l| l.starts_with("public_key=")).count();
        assert!(state.peers.len() <= announced);
    }

    for line in text.lines() {
        let _ = split_host_port(line);
        let _ = is_domain_endpoint(line);
    }
});
