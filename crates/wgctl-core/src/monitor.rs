//! DNS endpoint monitor.
//!
//! Peers configured with a domain-name endpoint are registered here. A single
//! background task re-resolves every registered host on a fixed interval; when
//! a host's address changes, the live peer's endpoint is swapped under its
//! endpoint lock and a new handshake is requested.
//!
//! Resolution failures never remove a peer or clear its last known address.
//! The peer simply keeps its current endpoint until a later tick succeeds.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wgctl_config::{MIN_MONITOR_INTERVAL_SECS, MonitorConfig};

use crate::endpoint::{EndpointError, join_host_port, split_host_port};
use crate::engine::{Engine, EngineError};
use crate::keys::PublicKey;
use crate::resolver::{ResolveError, Resolver, SystemResolver, resolve_preferred};

/// Polling interval used when none (or zero) is given.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Smallest interval accepted through [`DnsMonitor::set_interval_checked`].
pub const MIN_CONTROL_INTERVAL: Duration = Duration::from_secs(MIN_MONITOR_INTERVAL_SECS);

/// Consecutive failures after which a warning is logged, once.
pub const FAILURE_WARN_THRESHOLD: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error("monitor interval {requested:?} is below the minimum of {minimum:?}")]
    IntervalTooShort {
        requested: Duration,
        minimum: Duration,
    },

    #[error("peer {} is not known to the engine", .0.short())]
    PeerNotFound(PublicKey),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Outcome of [`DnsMonitor::add_peer`].
#[derive(Debug)]
pub enum Registration {
    /// The host is a literal address; nothing to monitor.
    Literal,
    /// Registered, and the host resolved right away.
    Monitored { resolved: IpAddr, endpoint: String },
    /// Registered without a known address; later ticks will keep trying.
    Unresolved { error: ResolveError },
}

#[derive(Debug, Clone)]
struct MonitoredPeer {
    host: String,
    port: String,
    last_resolved: Option<IpAddr>,
    last_check: SystemTime,
    failures: u32,
}

/// Point-in-time copy of one monitored peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitoredPeerInfo {
    pub host: String,
    pub port: String,
    pub last_resolved: Option<IpAddr>,
    pub last_check: SystemTime,
    pub failures: u32,
}

impl From<&MonitoredPeer> for MonitoredPeerInfo {
    fn from(peer: &MonitoredPeer) -> Self {
        Self {
            host: peer.host.clone(),
            port: peer.port.clone(),
            last_resolved: peer.last_resolved,
            last_check: peer.last_check,
            failures: peer.failures,
        }
    }
}

#[derive(Debug)]
struct MonitorState {
    peers: HashMap<PublicKey, MonitoredPeer>,
    interval: Duration,
}

/// Re-resolves domain endpoints and migrates peers whose address changed.
pub struct DnsMonitor {
    engine: Arc<dyn Engine>,
    resolver: Arc<dyn Resolver>,
    state: RwLock<MonitorState>,
    shutdown_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for DnsMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("DnsMonitor")
            .field("interval", &state.interval)
            .field("peers", &state.peers.len())
            .finish_non_exhaustive()
    }
}

impl DnsMonitor {
    /// A zero `interval` falls back to [`DEFAULT_INTERVAL`].
    pub fn new(engine: Arc<dyn Engine>, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_INTERVAL
        } else {
            interval
        };
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            engine,
            resolver: Arc::new(SystemResolver::default()),
            state: RwLock::new(MonitorState {
                peers: HashMap::new(),
                interval,
            }),
            shutdown_tx,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn from_config(engine: Arc<dyn Engine>, config: &MonitorConfig) -> Self {
        let resolver = SystemResolver::new(Duration::from_secs(config.resolve_timeout_secs));
        Self::new(engine, Duration::from_secs(config.interval_secs)).with_resolver(Arc::new(resolver))
    }

    // The guarded state is plain data; a panic elsewhere cannot leave it torn.
    fn read(&self) -> RwLockReadGuard<'_, MonitorState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MonitorState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the polling task.
    ///
    /// The interval is re-read before every sleep, so changes apply from the
    /// next cycle. Calling this twice runs two pollers. Once [`stop`] has been
    /// called the monitor stays stopped.
    ///
    /// [`stop`]: Self::stop
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        info!(interval = ?self.interval(), "DNS monitor started");

        tokio::spawn(async move {
            loop {
                if *shutdown_rx.borrow_and_update() {
                    break;
                }
                let interval = monitor.interval();
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    () = tokio::time::sleep(interval) => monitor.check_all_peers().await,
                }
            }
            info!("DNS monitor stopped");
        })
    }

    /// Ask the polling task to exit. Observed between ticks; does not wait.
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Start monitoring `key` if `endpoint`'s host is a domain name.
    ///
    /// Resolves once right away. A failed resolution still registers the
    /// peer. Never touches the engine.
    pub async fn add_peer(&self, key: PublicKey, endpoint: &str) -> Result<Registration, MonitorError> {
        let (host, port) = split_host_port(endpoint)?;
        if host.parse::<IpAddr>().is_ok() {
            return Ok(Registration::Literal);
        }

        let (last_resolved, registration) =
            match resolve_preferred(self.resolver.as_ref(), host).await {
                Ok(ip) => (
                    Some(ip),
                    Registration::Monitored {
                        resolved: ip,
                        endpoint: join_host_port(&ip.to_string(), port),
                    },
                ),
                Err(error) => {
                    debug!(peer = %key.short(), host, %error, "initial resolution failed");
                    (None, Registration::Unresolved { error })
                }
            };

        self.write().peers.insert(
            key,
            MonitoredPeer {
                host: host.to_string(),
                port: port.to_string(),
                last_resolved,
                last_check: SystemTime::now(),
                failures: 0,
            },
        );
        debug!(
            peer = %key.short(),
            host,
            resolved = ?last_resolved,
            "peer added to DNS monitor"
        );
        Ok(registration)
    }

    /// Stop monitoring `key`. Unknown keys are ignored.
    pub fn remove_peer(&self, key: &PublicKey) {
        if let Some(peer) = self.write().peers.remove(key) {
            debug!(peer = %key.short(), host = %peer.host, "peer removed from DNS monitor");
        }
    }

    /// Forget every monitored peer.
    pub fn clear(&self) {
        let mut state = self.write();
        let dropped = state.peers.len();
        state.peers.clear();
        debug!(dropped, "DNS monitor cleared");
    }

    /// Change the polling interval. Zero is ignored; there is no lower bound.
    pub fn set_interval(&self, interval: Duration) {
        if interval.is_zero() {
            return;
        }
        self.write().interval = interval;
    }

    /// Change the polling interval on behalf of a control request.
    pub fn set_interval_checked(&self, interval: Duration) -> Result<(), MonitorError> {
        if interval < MIN_CONTROL_INTERVAL {
            return Err(MonitorError::IntervalTooShort {
                requested: interval,
                minimum: MIN_CONTROL_INTERVAL,
            });
        }
        self.set_interval(interval);
        info!(interval = ?interval, "DNS monitor interval updated");
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        self.read().interval
    }

    pub fn list_monitored(&self) -> HashMap<PublicKey, MonitoredPeerInfo> {
        self.read()
            .peers
            .iter()
            .map(|(key, peer)| (*key, MonitoredPeerInfo::from(peer)))
            .collect()
    }

    pub fn monitored_count(&self) -> usize {
        self.read().peers.len()
    }

    /// Run one polling pass over every registered peer.
    pub async fn check_all_peers(&self) {
        let targets: Vec<(PublicKey, String, String)> = self
            .read()
            .peers
            .iter()
            .map(|(key, peer)| (*key, peer.host.clone(), peer.port.clone()))
            .collect();

        for (key, host, port) in targets {
            self.check_peer(key, &host, &port).await;
        }
    }

    async fn check_peer(&self, key: PublicKey, host: &str, port: &str) {
        let result = resolve_preferred(self.resolver.as_ref(), host).await;

        let (previous, current) = {
            let mut state = self.write();
            let Some(peer) = state.peers.get_mut(&key) else {
                debug!(peer = %key.short(), host, "peer unregistered during check");
                return;
            };
            peer.last_check = SystemTime::now();

            match result {
                Ok(ip) => {
                    peer.failures = 0;
                    (peer.last_resolved.replace(ip), ip)
                }
                Err(error) => {
                    peer.failures = peer.failures.saturating_add(1);
                    if peer.failures == FAILURE_WARN_THRESHOLD {
                        warn!(
                            peer = %key.short(),
                            host,
                            failures = peer.failures,
                            %error,
                            "DNS resolution keeps failing, keeping last known address"
                        );
                    } else {
                        debug!(
                            peer = %key.short(),
                            host,
                            failures = peer.failures,
                            %error,
                            "DNS resolution failed"
                        );
                    }
                    return;
                }
            }
        };

        let Some(previous) = previous else {
            return;
        };
        if previous == current {
            return;
        }

        info!(peer = %key.short(), host, from = %previous, to = %current, "endpoint address changed");
        match self.migrate_endpoint(&key, current, port) {
            Ok(()) => {}
            Err(MonitorError::PeerNotFound(_)) => {
                debug!(peer = %key.short(), "peer gone from engine, skipping migration");
            }
            Err(error) => {
                warn!(peer = %key.short(), host, %error, "endpoint migration failed");
            }
        }
    }

    /// Point the live peer at `ip:port` and request a handshake.
    fn migrate_endpoint(&self, key: &PublicKey, ip: IpAddr, port: &str) -> Result<(), MonitorError> {
        let peer = self
            .engine
            .lookup_peer(key)
            .ok_or(MonitorError::PeerNotFound(*key))?;
        let endpoint = self
            .engine
            .parse_endpoint(&join_host_port(&ip.to_string(), port))?;

        {
            let mut current = peer.endpoint().lock().unwrap_or_else(PoisonError::into_inner);
            if current.current().is_some() {
                current.mark_source_stale();
            }
            current.set_endpoint(endpoint);
        }

        peer.trigger_handshake();
        info!(peer = %key.short(), endpoint = %endpoint, "peer endpoint migrated");
        Ok(())
    }
}
