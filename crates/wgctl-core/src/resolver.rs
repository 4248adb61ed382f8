//! Hostname resolution for endpoint hosts.
//!
//! [`Resolver`] is the seam the DNS monitor and the control client resolve
//! through; [`SystemResolver`] is the production implementation backed by the
//! operating system resolver.

use std::net::IpAddr;
use std::time::Duration;

use crate::BoxFuture;

/// Upper bound on a single lookup.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from resolving a hostname.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("lookup of {host} failed: {source}")]
    Lookup {
        host: String,
        source: std::io::Error,
    },

    #[error("lookup of {host} timed out after {timeout:?}")]
    Timeout { host: String, timeout: Duration },

    #[error("no IP addresses found for {host}")]
    NoAddresses { host: String },
}

/// Resolves a hostname to its addresses.
pub trait Resolver: Send + Sync {
    fn lookup<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<Vec<IpAddr>, ResolveError>>;
}

/// Resolver backed by `tokio::net::lookup_host`, bounded by a timeout.
#[derive(Debug, Clone)]
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLVE_TIMEOUT)
    }
}

impl Resolver for SystemResolver {
    fn lookup<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<Vec<IpAddr>, ResolveError>> {
        Box::pin(async move {
            let lookup = tokio::net::lookup_host((host, 0));
            let addrs = tokio::time::timeout(self.timeout, lookup)
                .await
                .map_err(|_| ResolveError::Timeout {
                    host: host.to_string(),
                    timeout: self.timeout,
                })?
                .map_err(|source| ResolveError::Lookup {
                    host: host.to_string(),
                    source,
                })?;

            let mut ips: Vec<IpAddr> = Vec::new();
            for addr in addrs {
                if !ips.contains(&addr.ip()) {
                    ips.push(addr.ip());
                }
            }
            Ok(ips)
        })
    }
}

/// First IPv4 address if there is one, else the first address of any family.
pub fn prefer_ipv4(addrs: &[IpAddr]) -> Option<IpAddr> {
    addrs
        .iter()
        .copied()
        .find(IpAddr::is_ipv4)
        .or_else(|| addrs.first().copied())
}

/// Resolve `host` and pick one address with [`prefer_ipv4`].
pub async fn resolve_preferred(resolver: &dyn Resolver, host: &str) -> Result<IpAddr, ResolveError> {
    let addrs = resolver.lookup(host).await?;
    prefer_ipv4(&addrs).ok_or_else(|| ResolveError::NoAddresses {
        host: host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Fixed(Vec<IpAddr>);

    impl Resolver for Fixed {
        fn lookup<'a>(&'a self, _host: &'a str) -> BoxFuture<'a, Result<Vec<IpAddr>, ResolveError>> {
            let addrs = self.0.clone();
            Box::pin(async move { Ok(addrs) })
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_prefer_ipv4() {
        let mixed = [ip("2001:db8::1"), ip("10.0.0.1"), ip("10.0.0.2")];
        assert_eq!(prefer_ipv4(&mixed), Some(ip("10.0.0.1")));

        let v6_only = [ip("2001:db8::2"), ip("2001:db8::1")];
        assert_eq!(prefer_ipv4(&v6_only), Some(ip("2001:db8::2")));

        assert_eq!(prefer_ipv4(&[]), None);
    }

    #[tokio::test]
    async fn test_resolve_preferred_empty_is_error() {
        let resolver = Fixed(Vec::new());
        let err = resolve_preferred(&resolver, "empty.test").await.unwrap_err();
        assert!(matches!(err, ResolveError::NoAddresses { .. }));
    }

    #[tokio::test]
    async fn test_resolve_preferred_picks_v4() {
        let resolver = Fixed(vec![ip("::1"), ip("127.0.0.1")]);
        let addr = resolve_preferred(&resolver, "localhost").await.unwrap();
        assert_eq!(addr, ip("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_system_resolver_literal_address() {
        // Literal addresses resolve without touching the network.
        let resolver = SystemResolver::default();
        let addrs = resolver.lookup("127.0.0.1").await.unwrap();
        assert_eq!(addrs, vec![ip("127.0.0.1")]);
    }
}
