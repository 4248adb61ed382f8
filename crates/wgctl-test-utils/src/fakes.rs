//! In-memory stand-ins for the tunnel engine and the system resolver.

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use wgctl_core::BoxFuture;
use wgctl_core::engine::{Engine, PeerEndpoint, PeerHandle};
use wgctl_core::keys::PublicKey;
use wgctl_core::resolver::{ResolveError, Resolver};
use wgctl_core::uapi::IpcError;
use wgctl_core::uapi::codec::EADDRINUSE;

/// A live peer that counts handshake requests.
#[derive(Debug, Default)]
pub struct FakePeer {
    endpoint: Mutex<PeerEndpoint>,
    handshakes: AtomicUsize,
}

impl FakePeer {
    pub fn new(endpoint: Option<SocketAddr>) -> Self {
        Self {
            endpoint: Mutex::new(PeerEndpoint::new(endpoint)),
            handshakes: AtomicUsize::new(0),
        }
    }

    pub fn handshakes(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }

    pub fn current_endpoint(&self) -> Option<SocketAddr> {
        self.endpoint.lock().expect("endpoint lock").current()
    }

    pub fn source_stale(&self) -> bool {
        self.endpoint.lock().expect("endpoint lock").source_stale()
    }
}

impl PeerHandle for FakePeer {
    fn endpoint(&self) -> &Mutex<PeerEndpoint> {
        &self.endpoint
    }

    fn trigger_handshake(&self) {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct EngineState {
    listen_port: Option<u16>,
    fwmark: Option<u32>,
    peers: BTreeMap<PublicKey, Arc<FakePeer>>,
    device_lines: Vec<(String, String)>,
    peer_lines: Vec<(PublicKey, String, String)>,
}

/// An engine that keeps peers in memory and records every UAPI line it is
/// handed. Port `1` is always "in use".
#[derive(Debug, Default)]
pub struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_peer(&self, key: PublicKey, endpoint: Option<SocketAddr>) -> Arc<FakePeer> {
        let peer = Arc::new(FakePeer::new(endpoint));
        self.lock().peers.insert(key, Arc::clone(&peer));
        peer
    }

    pub fn peer(&self, key: &PublicKey) -> Option<Arc<FakePeer>> {
        self.lock().peers.get(key).cloned()
    }

    pub fn peer_count(&self) -> usize {
        self.lock().peers.len()
    }

    pub fn device_lines(&self) -> Vec<(String, String)> {
        self.lock().device_lines.clone()
    }

    pub fn peer_lines(&self) -> Vec<(PublicKey, String, String)> {
        self.lock().peer_lines.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().expect("engine state lock")
    }
}

impl Engine for FakeEngine {
    fn lookup_peer(&self, key: &PublicKey) -> Option<Arc<dyn PeerHandle>> {
        self.peer(key).map(|p| p as Arc<dyn PeerHandle>)
    }

    fn ipc_get(&self) -> Vec<(String, String)> {
        let state = self.lock();
        let mut out = Vec::new();
        if let Some(port) = state.listen_port {
            out.push(("listen_port".to_string(), port.to_string()));
        }
        if let Some(mark) = state.fwmark {
            out.push(("fwmark".to_string(), mark.to_string()));
        }
        for (key, peer) in &state.peers {
            out.push(("public_key".to_string(), key.to_hex()));
            if let Some(endpoint) = peer.current_endpoint() {
                out.push(("endpoint".to_string(), endpoint.to_string()));
            }
            out.push(("last_handshake_time_sec".to_string(), "0".to_string()));
            out.push(("protocol_version".to_string(), "1".to_string()));
        }
        out
    }

    fn ipc_set_device(&self, key: &str, value: &str) -> Result<(), IpcError> {
        let mut state = self.lock();
        match key {
            "listen_port" => {
                let port: u16 = value
                    .parse()
                    .map_err(|_| IpcError::invalid(format!("listen_port {value:?}")))?;
                if port == 1 {
                    return Err(IpcError::new(EADDRINUSE, "port 1 is in use"));
                }
                state.listen_port = Some(port);
            }
            "fwmark" => {
                state.fwmark = Some(
                    value
                        .parse()
                        .map_err(|_| IpcError::invalid(format!("fwmark {value:?}")))?,
                );
            }
            "replace_peers" if value == "true" => state.peers.clear(),
            "private_key" | "replace_peers" => {}
            other => return Err(IpcError::unsupported(format!("device key {other:?}"))),
        }
        state.device_lines.push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn ipc_set_peer(&self, peer: &PublicKey, key: &str, value: &str) -> Result<(), IpcError> {
        let mut state = self.lock();
        match key {
            "public_key" => {
                state
                    .peers
                    .entry(*peer)
                    .or_insert_with(|| Arc::new(FakePeer::new(None)));
            }
            "endpoint" => {
                let addr: SocketAddr = value
                    .parse()
                    .map_err(|_| IpcError::invalid(format!("endpoint {value:?}")))?;
                let live = state
                    .peers
                    .get(peer)
                    .ok_or_else(|| IpcError::invalid("endpoint for unknown peer"))?;
                live.endpoint().lock().expect("endpoint lock").set_endpoint(addr);
            }
            "remove" if value == "true" => {
                state.peers.remove(peer);
            }
            _ => {}
        }
        state
            .peer_lines
            .push((*peer, key.to_string(), value.to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Step {
    Resolve(Vec<IpAddr>),
    Fail,
}

/// A resolver that answers from a script, one step per lookup. Once the
/// script runs out every lookup fails.
#[derive(Debug, Default)]
pub struct ScriptedResolver {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl ScriptedResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Next lookup returns `addrs`.
    pub fn push_ok(&self, addrs: &[&str]) {
        let addrs = addrs
            .iter()
            .map(|a| a.parse().expect("test address"))
            .collect();
        self.script.lock().expect("script lock").push_back(Step::Resolve(addrs));
    }

    /// Next lookup fails.
    pub fn push_err(&self) {
        self.script.lock().expect("script lock").push_back(Step::Fail);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Resolver for ScriptedResolver {
    fn lookup<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<Vec<IpAddr>, ResolveError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().expect("script lock").pop_front();
        Box::pin(async move {
            match step {
                Some(Step::Resolve(addrs)) => Ok(addrs),
                Some(Step::Fail) | None => Err(ResolveError::Lookup {
                    host: host.to_string(),
                    source: io::Error::new(io::ErrorKind::NotFound, "scripted failure"),
                }),
            }
        })
    }
}
