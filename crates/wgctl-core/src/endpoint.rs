//! `host:port` splitting and classification.
//!
//! Follows the usual socket-address text rules: IPv6 hosts must be bracketed
//! (`[2001:db8::1]:51820`), and a bare host with more than one colon is
//! rejected rather than guessed at.

use std::net::IpAddr;

/// Why an endpoint string could not be split into host and port.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("missing port in address {0:?}")]
    MissingPort(String),

    #[error("too many colons in address {0:?}")]
    TooManyColons(String),

    #[error("missing ']' in address {0:?}")]
    MissingBracket(String),

    #[error("unexpected bracket in address {0:?}")]
    UnexpectedBracket(String),

    #[error("missing host in address {0:?}")]
    MissingHost(String),

    #[error("endpoint {0:?} contains an IP address, not a domain")]
    NotADomain(String),
}

/// Split `host:port` (or `[host]:port`) into its two parts.
pub fn split_host_port(endpoint: &str) -> Result<(&str, &str), EndpointError> {
    let colon = endpoint
        .rfind(':')
        .ok_or_else(|| EndpointError::MissingPort(endpoint.to_string()))?;
    let (host, port) = (&endpoint[..colon], &endpoint[colon + 1..]);

    let host = if let Some(rest) = host.strip_prefix('[') {
        let inner = rest
            .strip_suffix(']')
            .ok_or_else(|| EndpointError::MissingBracket(endpoint.to_string()))?;
        if inner.contains(['[', ']']) {
            return Err(EndpointError::UnexpectedBracket(endpoint.to_string()));
        }
        inner
    } else {
        if host.contains(':') {
            return Err(EndpointError::TooManyColons(endpoint.to_string()));
        }
        if host.contains(['[', ']']) {
            return Err(EndpointError::UnexpectedBracket(endpoint.to_string()));
        }
        host
    };

    if port.contains(['[', ']']) {
        return Err(EndpointError::UnexpectedBracket(endpoint.to_string()));
    }
    if host.is_empty() {
        return Err(EndpointError::MissingHost(endpoint.to_string()));
    }
    Ok((host, port))
}

/// Inverse of [`split_host_port`]: brackets hosts that contain a colon.
pub fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Whether `endpoint` is `host:port` with a host that is not a literal IP.
///
/// Anything that does not split cleanly is not a domain endpoint.
pub fn is_domain_endpoint(endpoint: &str) -> bool {
    match split_host_port(endpoint) {
        Ok((host, _)) => host.parse::<IpAddr>().is_err(),
        Err(_) => false,
    }
}

/// The domain part of a domain endpoint.
pub fn extract_domain(endpoint: &str) -> Result<&str, EndpointError> {
    let (host, _) = split_host_port(endpoint)?;
    if host.parse::<IpAddr>().is_ok() {
        return Err(EndpointError::NotADomain(endpoint.to_string()));
    }
    Ok(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_is_domain_endpoint() {
        let cases = [
            ("example.com:51820", true),
            ("192.168.1.1:51820", false),
            ("2001:db8::1:51820", false),
            ("localhost:51820", true),
            ("vpn.example.org:12345", true),
            ("[2001:db8::1]:51820", false),
            ("invalid", false),
            (":51820", false),
        ];
        for (endpoint, expected) in cases {
            assert_eq!(is_domain_endpoint(endpoint), expected, "{endpoint}");
        }
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(extract_domain("example.com:51820"), Ok("example.com"));
        assert_eq!(extract_domain("vpn.example.org:12345"), Ok("vpn.example.org"));
        assert!(matches!(
            extract_domain("192.168.1.1:51820"),
            Err(EndpointError::NotADomain(_))
        ));
        assert!(extract_domain("[2001:db8::1]:51820").is_err());
        assert!(matches!(
            extract_domain("invalid"),
            Err(EndpointError::MissingPort(_))
        ));
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("10.0.0.1:80"), Ok(("10.0.0.1", "80")));
        assert_eq!(split_host_port("[::1]:51820"), Ok(("::1", "51820")));
        assert!(matches!(
            split_host_port("[::1]"),
            Err(EndpointError::MissingBracket(_))
        ));
        assert!(matches!(
            split_host_port("a:b:c"),
            Err(EndpointError::TooManyColons(_))
        ));
        assert!(matches!(
            split_host_port("ho]st:1"),
            Err(EndpointError::UnexpectedBracket(_))
        ));
    }

    #[test]
    fn test_join_host_port() {
        assert_eq!(join_host_port("1.2.3.4", "51820"), "1.2.3.4:51820");
        assert_eq!(join_host_port("2001:db8::1", "51820"), "[2001:db8::1]:51820");
    }
}
