#![deny(unsafe_code)]

//! Shared test utilities for the wgctl workspace.
//!
//! Fakes for the engine, resolver and UAPI peer, a config builder, a
//! socket-backed [`device::TestDevice`], and tracing setup, so individual
//! crate tests stay short.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! wgctl-test-utils = { workspace = true }
//! ```

pub mod config;
#[cfg(unix)]
pub mod device;
pub mod fakes;
pub mod tracing_setup;
#[cfg(unix)]
pub mod uapi_server;

use wgctl_core::PublicKey;

/// A deterministic, non-zero public key for tests.
pub fn test_key(n: u8) -> PublicKey {
    PublicKey::from_bytes([n.max(1); 32]).expect("non-zero key")
}
