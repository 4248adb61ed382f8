#![deny(unsafe_code)]

//! wgctl core: UAPI control client and DNS endpoint monitor.
//!
//! The control client speaks the line-oriented UAPI protocol to a running
//! tunnel interface over a Unix socket or a Windows named pipe. The DNS
//! monitor runs inside the engine process and keeps domain-based peer
//! endpoints pointed at their current address.

use std::future::Future;
use std::pin::Pin;

/// Boxed `Send` future returned by the async methods of object-safe traits
/// ([`Transport`], [`resolver::Resolver`]) consumed as `Arc<dyn _>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// UAPI control client: query, apply, discover.
pub mod client;
/// `host:port` endpoint helpers.
pub mod endpoint;
/// Surface of the tunnel engine consumed by the DNS monitor.
pub mod engine;
/// Curve25519 key types and encodings.
pub mod keys;
/// Periodic re-resolution of domain-based peer endpoints.
pub mod monitor;
/// Hostname resolution with IPv4 preference.
pub mod resolver;
/// Local control transports (Unix socket, named pipe).
pub mod transport;
/// UAPI wire format, state types, and the device-side handler.
pub mod uapi;

pub use client::{ClientError, ControlClient};
pub use engine::{Engine, PeerEndpoint, PeerHandle};
pub use keys::{PresharedKey, PrivateKey, PublicKey};
pub use monitor::{DnsMonitor, MonitoredPeerInfo, Registration};
pub use transport::{Connection, Transport, TransportError};
pub use uapi::{Configuration, InterfaceState, PeerConfig, PeerState};
