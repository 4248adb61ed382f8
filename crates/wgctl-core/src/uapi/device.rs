//! Engine-side UAPI request handling.
//!
//! [`DeviceUapi`] sits in front of an [`Engine`] and answers `get`/`set`
//! requests. It owns the DNS monitor's wire keys (`dns_monitor_interval`,
//! `dns_monitored_peers`) and keeps the monitor's peer set in step with the
//! peers a `set` configures. Everything else is the engine's business.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::codec::{EINVAL, ENOPROTOOPT, EPROTO, encode_errno};
use crate::endpoint::is_domain_endpoint;
use crate::engine::Engine;
use crate::keys::PublicKey;
use crate::monitor::{DnsMonitor, Registration};

/// A failed UAPI operation, reported to the client as `errno=<errno>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (errno {errno})")]
pub struct IpcError {
    pub errno: i64,
    pub message: String,
}

impl IpcError {
    pub fn new(errno: i64, message: impl Into<String>) -> Self {
        Self {
            errno,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(EINVAL, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(EPROTO, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ENOPROTOOPT, message)
    }
}

/// UAPI front end for one interface.
pub struct DeviceUapi {
    engine: Arc<dyn Engine>,
    monitor: Arc<DnsMonitor>,
}

impl std::fmt::Debug for DeviceUapi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceUapi")
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl DeviceUapi {
    pub fn new(engine: Arc<dyn Engine>, monitor: Arc<DnsMonitor>) -> Self {
        Self { engine, monitor }
    }

    pub fn monitor(&self) -> &Arc<DnsMonitor> {
        &self.monitor
    }

    /// Full `get` response, trailer included.
    pub fn get(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "dns_monitor_interval={}", self.monitor.interval().as_secs());
        let _ = writeln!(out, "dns_monitored_peers={}", self.monitor.monitored_count());
        for (key, value) in self.engine.ipc_get() {
            let _ = writeln!(out, "{key}={value}");
        }
        out.push_str(&encode_errno(0));
        out
    }

    /// Apply the body of a `set` request. Stops at the first failing line.
    pub async fn set(&self, lines: &[&str]) -> Result<(), IpcError> {
        let mut peer: Option<PublicKey> = None;

        for line in lines {
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| IpcError::protocol(format!("line without '=': {line:?}")))?;

            match (peer, key) {
                (_, "public_key") => {
                    let parsed = PublicKey::from_hex(value)
                        .map_err(|e| IpcError::invalid(format!("public_key: {e}")))?;
                    self.engine.ipc_set_peer(&parsed, key, value)?;
                    peer = Some(parsed);
                }
                (None, "dns_monitor_interval") => {
                    let secs: u64 = value.parse().map_err(|_| {
                        IpcError::invalid(format!("dns_monitor_interval: not a number: {value:?}"))
                    })?;
                    self.monitor
                        .set_interval_checked(Duration::from_secs(secs))
                        .map_err(|e| IpcError::invalid(e.to_string()))?;
                }
                (None, "replace_peers") => {
                    self.engine.ipc_set_device(key, value)?;
                    if value == "true" {
                        self.monitor.clear();
                    }
                }
                (None, _) => self.engine.ipc_set_device(key, value)?,
                (Some(current), "remove") => {
                    self.engine.ipc_set_peer(&current, key, value)?;
                    if value == "true" {
                        self.monitor.remove_peer(&current);
                    }
                }
                (Some(current), "endpoint") if is_domain_endpoint(value) => {
                    self.register_domain(current, value).await?;
                }
                (Some(current), "endpoint") => {
                    self.engine.ipc_set_peer(&current, key, value)?;
                    self.monitor.remove_peer(&current);
                }
                (Some(current), _) => self.engine.ipc_set_peer(&current, key, value)?,
            }
        }
        Ok(())
    }

    async fn register_domain(&self, peer: PublicKey, endpoint: &str) -> Result<(), IpcError> {
        let registration = self
            .monitor
            .add_peer(peer, endpoint)
            .await
            .map_err(|e| IpcError::invalid(e.to_string()))?;

        match registration {
            Registration::Monitored { endpoint: literal, .. } => {
                self.engine.ipc_set_peer(&peer, "endpoint", &literal)?;
                info!(peer = %peer.short(), domain = endpoint, resolved = %literal, "domain endpoint registered");
            }
            Registration::Unresolved { error } => {
                warn!(
                    peer = %peer.short(),
                    domain = endpoint,
                    %error,
                    "domain endpoint not resolvable yet, monitor will keep trying"
                );
            }
            Registration::Literal => self.engine.ipc_set_peer(&peer, "endpoint", endpoint)?,
        }
        Ok(())
    }

    /// Answer one request (first line `get=1` or `set=1`, body up to the
    /// first blank line).
    pub async fn handle(&self, request: &str) -> String {
        let mut lines = request.lines();
        match lines.next() {
            Some("get=1") => self.get(),
            Some("set=1") => {
                let body: Vec<&str> = lines.take_while(|line| !line.is_empty()).collect();
                match self.set(&body).await {
                    Ok(()) => encode_errno(0),
                    Err(e) => {
                        debug!(errno = e.errno, error = %e.message, "set request rejected");
                        encode_errno(e.errno)
                    }
                }
            }
            other => {
                debug!(operation = ?other, "unknown UAPI operation");
                encode_errno(EINVAL)
            }
        }
    }
}
