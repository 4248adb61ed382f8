//! The slice of the tunnel engine that the DNS monitor and the device-side
//! UAPI handler drive.
//!
//! The engine owns peers, handshakes and packet I/O; none of that lives in
//! this crate. What lives here is the contract: look a peer up, parse an
//! endpoint, swap it under the peer's endpoint lock, and ask for a handshake.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use crate::keys::PublicKey;
use crate::uapi::IpcError;

/// Endpoint state of one live peer, guarded by the peer's own mutex.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerEndpoint {
    current: Option<SocketAddr>,
    clear_src_on_tx: bool,
}

impl PeerEndpoint {
    pub fn new(current: Option<SocketAddr>) -> Self {
        Self {
            current,
            clear_src_on_tx: false,
        }
    }

    pub fn current(&self) -> Option<SocketAddr> {
        self.current
    }

    pub fn set_endpoint(&mut self, addr: SocketAddr) {
        self.current = Some(addr);
    }

    /// The cached source address no longer matches the endpoint; the next
    /// transmit must pick a fresh one.
    pub fn mark_source_stale(&mut self) {
        self.clear_src_on_tx = true;
    }

    pub fn source_stale(&self) -> bool {
        self.clear_src_on_tx
    }
}

/// A live peer inside the engine.
pub trait PeerHandle: Send + Sync {
    fn endpoint(&self) -> &Mutex<PeerEndpoint>;

    /// Queue a handshake initiation. Must not block.
    fn trigger_handshake(&self);
}

/// Errors surfaced by an [`Engine`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

/// The engine surface.
///
/// `lookup_peer` is the only required method. The `ipc_*` methods back the
/// device-side UAPI handler; engines that do not expose a control socket can
/// leave the defaults, which report the operation as unsupported.
pub trait Engine: Send + Sync {
    fn lookup_peer(&self, key: &PublicKey) -> Option<Arc<dyn PeerHandle>>;

    fn parse_endpoint(&self, endpoint: &str) -> Result<SocketAddr, EngineError> {
        endpoint
            .parse()
            .map_err(|e: std::net::AddrParseError| EngineError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })
    }

    /// Engine-owned `key=value` pairs for a `get` response, in wire order.
    fn ipc_get(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Apply one interface-level `set` line.
    fn ipc_set_device(&self, key: &str, _value: &str) -> Result<(), IpcError> {
        Err(IpcError::unsupported(format!("device key {key:?}")))
    }

    /// Apply one `set` line scoped to `peer`.
    fn ipc_set_peer(&self, _peer: &PublicKey, key: &str, _value: &str) -> Result<(), IpcError> {
        Err(IpcError::unsupported(format!("peer key {key:?}")))
    }
}
