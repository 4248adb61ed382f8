//! Structured interface state and configuration exchanged over UAPI.
//!
//! [`InterfaceState`] is what a `get` decodes into; [`Configuration`] is what
//! a `set` is encoded from. Keys in a `Configuration` are kept in their
//! human (base64) form and validated only when the request is encoded.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::keys::{PresharedKey, PrivateKey, PublicKey};

/// Snapshot of an interface returned by a state query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InterfaceState {
    pub name: String,
    #[serde(skip)]
    pub private_key: Option<PrivateKey>,
    /// Derived from `private_key` by the decoder.
    pub public_key: Option<PublicKey>,
    pub listen_port: Option<u16>,
    pub fwmark: Option<u32>,
    /// Monitor polling interval reported by the engine, in seconds.
    pub dns_monitor_interval: Option<u64>,
    /// Number of peers the engine's DNS monitor is tracking.
    pub dns_monitored_peers: Option<u64>,
    pub peers: Vec<PeerState>,
}

impl InterfaceState {
    /// Find a peer by its public key.
    pub fn peer(&self, key: &PublicKey) -> Option<&PeerState> {
        self.peers.iter().find(|p| &p.public_key == key)
    }
}

/// Last handshake time as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Handshake {
    pub sec: u64,
    pub nsec: u32,
}

impl Handshake {
    /// `None` when the reported time does not fit in a `SystemTime`.
    pub fn as_system_time(&self) -> Option<SystemTime> {
        let since_epoch =
            Duration::from_secs(self.sec).checked_add(Duration::from_nanos(u64::from(self.nsec)))?;
        UNIX_EPOCH.checked_add(since_epoch)
    }
}

/// Per-peer state within an [`InterfaceState`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerState {
    pub public_key: PublicKey,
    #[serde(skip)]
    pub preshared_key: Option<PresharedKey>,
    pub endpoint: Option<String>,
    /// `None` when the peer has never completed a handshake.
    pub last_handshake: Option<Handshake>,
    pub rx_bytes: Option<u64>,
    pub tx_bytes: Option<u64>,
    pub allowed_ips: Vec<String>,
    /// Seconds; 0 means disabled.
    pub persistent_keepalive_interval: Option<u16>,
    pub protocol_version: Option<u32>,
}

impl PeerState {
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            preshared_key: None,
            endpoint: None,
            last_handshake: None,
            rx_bytes: None,
            tx_bytes: None,
            allowed_ips: Vec::new(),
            persistent_keepalive_interval: None,
            protocol_version: None,
        }
    }
}

/// Desired configuration applied to an interface with a `set` request.
///
/// ## TOML Example
///
/// ```toml
/// private_key = "yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk="
/// listen_port = 51820
///
/// [[peers]]
/// public_key = "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg="
/// endpoint = "vpn.example.com:51820"
/// allowed_ips = ["10.0.0.0/24"]
/// persistent_keepalive = 25
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Interface private key, base64.
    #[serde(default)]
    pub private_key: Option<String>,

    #[serde(default)]
    pub listen_port: Option<u16>,

    #[serde(default)]
    pub fwmark: Option<u32>,

    /// Remove every existing peer before applying `peers`.
    #[serde(default)]
    pub replace_peers: bool,

    /// DNS monitor polling interval in seconds (engine enforces a 10 s floor).
    #[serde(default)]
    pub dns_monitor_interval: Option<u64>,

    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

/// One peer within a [`Configuration`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Peer public key, base64.
    pub public_key: String,

    /// Preshared key, base64.
    #[serde(default)]
    pub preshared_key: Option<String>,

    /// `host:port`; the host may be a literal address or a domain name.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Always replaces the peer's current allowed-IP set.
    #[serde(default)]
    pub allowed_ips: Vec<String>,

    /// Keepalive interval in seconds; 0 disables it.
    #[serde(default)]
    pub persistent_keepalive: Option<u16>,

    /// Remove this peer instead of configuring it.
    #[serde(default)]
    pub remove: bool,
}
