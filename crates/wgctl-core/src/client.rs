//! UAPI control client.
//!
//! Every operation opens its own connection, performs one request/response
//! exchange, and drops the connection.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use zeroize::Zeroize;

use wgctl_config::TransportConfig;

use crate::endpoint::{is_domain_endpoint, join_host_port, split_host_port};
use crate::resolver::{ResolveError, Resolver, SystemResolver, resolve_preferred};
use crate::transport::{self, Transport, TransportError};
use crate::uapi::codec::{
    EADDRINUSE, EINVAL, EIO, ENOPROTOOPT, decode_response, decode_set_response,
    encode_get_request, encode_set_request, read_response,
};
use crate::uapi::{Configuration, ConfigurationError, InterfaceState, ProtocolError};

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from [`ControlClient`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("interface {interface} rejected the request (errno {errno})")]
    Rejected { interface: String, errno: i64 },

    #[error("interface discovery is not available on this platform")]
    DiscoveryUnavailable,
}

impl ClientError {
    /// The errno the engine answered with, if any.
    pub fn errno(&self) -> Option<i64> {
        match self {
            Self::Rejected { errno, .. } => Some(*errno),
            Self::Protocol(ProtocolError::Errno(errno)) => Some(*errno),
            _ => None,
        }
    }

    /// Something the operator can act on, when there is one.
    pub fn hint(&self) -> Option<&'static str> {
        if let Self::Transport(e) = self {
            return e.hint();
        }
        if let Self::DiscoveryUnavailable = self {
            return Some("name the interface explicitly");
        }
        match self.errno()? {
            ENOPROTOOPT => Some("the engine does not support one of the requested settings"),
            EINVAL => Some("the engine rejected a value as invalid (check keys, endpoints, intervals)"),
            EADDRINUSE => Some("the listen port is already in use"),
            EIO => Some("the engine hit an I/O error applying the change"),
            _ => None,
        }
    }
}

/// Talks UAPI to interfaces through a [`Transport`].
#[derive(Clone)]
pub struct ControlClient {
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn Resolver>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl ControlClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            resolver: Arc::new(SystemResolver::default()),
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(transport::from_config(config))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .write_timeout(Duration::from_secs(config.write_timeout_secs))
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// One request, one response. Both deadlines are cleared on every path.
    async fn exchange(&self, name: &str, request: &[u8]) -> Result<String, ClientError> {
        let mut conn = self.transport.open(name).await?;

        conn.set_write_timeout(self.write_timeout);
        let written = conn.write_all(request).await;
        conn.clear_write_timeout();
        written.map_err(ProtocolError::from)?;

        conn.set_read_timeout(self.read_timeout);
        let response = read_response(&mut conn).await;
        conn.clear_read_timeout();
        Ok(response?)
    }

    /// Current state of interface `name`.
    pub async fn query(&self, name: &str) -> Result<InterfaceState, ClientError> {
        let text = self.exchange(name, encode_get_request()).await?;
        let mut state = decode_response(&text)?;
        state.name = name.to_string();
        debug!(interface = name, peers = state.peers.len(), "interface state fetched");
        Ok(state)
    }

    /// Apply `config` to interface `name`.
    ///
    /// Nothing is sent if the configuration does not encode.
    pub async fn apply(&self, name: &str, config: &Configuration) -> Result<(), ClientError> {
        let config = self.normalize_endpoints(config).await;
        let mut request = encode_set_request(&config)?;
        let exchanged = self.exchange(name, &request).await;
        request.zeroize();

        match decode_set_response(&exchanged?) {
            Ok(()) => {
                info!(interface = name, peers = config.peers.len(), "configuration applied");
                Ok(())
            }
            Err(ProtocolError::Errno(errno)) => Err(ClientError::Rejected {
                interface: name.to_string(),
                errno,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Change the engine's DNS monitor interval.
    pub async fn set_dns_interval(&self, name: &str, secs: u64) -> Result<(), ClientError> {
        let config = Configuration {
            dns_monitor_interval: Some(secs),
            ..Default::default()
        };
        self.apply(name, &config).await
    }

    /// Names of interfaces with a reachable control endpoint.
    pub async fn discover(&self) -> Result<Vec<String>, ClientError> {
        self.transport
            .discover()
            .await?
            .ok_or(ClientError::DiscoveryUnavailable)
    }

    /// Domain endpoints go out verbatim so the engine's monitor can track
    /// them. Anything else is passed through [`resolve_endpoint`], keeping the
    /// original text if that fails.
    async fn normalize_endpoints(&self, config: &Configuration) -> Configuration {
        let mut config = config.clone();
        for peer in &mut config.peers {
            let Some(endpoint) = peer.endpoint.as_mut() else {
                continue;
            };
            if is_domain_endpoint(endpoint) {
                debug!(endpoint = %endpoint, "domain endpoint left for the engine to monitor");
                continue;
            }
            match resolve_endpoint(self.resolver.as_ref(), endpoint).await {
                Ok(resolved) => *endpoint = resolved,
                Err(error) => {
                    warn!(endpoint = %endpoint, %error, "could not resolve endpoint, sending as is");
                }
            }
        }
        config
    }
}

/// Resolve `host:port` to `ip:port`, preferring IPv4. Literal addresses are
/// returned unchanged.
pub async fn resolve_endpoint(resolver: &dyn Resolver, endpoint: &str) -> Result<String, ClientError> {
    let (host, port) = split_host_port(endpoint).map_err(|e| ConfigurationError::Endpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    if host.parse::<IpAddr>().is_ok() {
        return Ok(endpoint.to_string());
    }
    let ip = resolve_preferred(resolver, host).await?;
    Ok(join_host_port(&ip.to_string(), port))
}
