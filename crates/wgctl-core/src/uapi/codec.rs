//! UAPI wire codec.
//!
//! Requests and responses are newline-terminated `key=value` lines. A request
//! ends with a blank line; a response ends with `errno=<N>` followed by a blank
//! line, where `0` is success and anything else is a positive errno value.
//! Keys travel as lowercase hex on the wire.

use std::fmt::{Display, Write as _};
use std::io;
use std::net::IpAddr;

use wgctl_config::MIN_MONITOR_INTERVAL_SECS;

use super::types::{Configuration, Handshake, InterfaceState, PeerConfig, PeerState};
use crate::endpoint::split_host_port;
use crate::keys::{KeyError, PresharedKey, PrivateKey, PublicKey};
use crate::transport::Connection;

pub const EIO: i64 = 5;
pub const EINVAL: i64 = 22;
pub const ENOPROTOOPT: i64 = 55;
pub const EPROTO: i64 = 71;
pub const EADDRINUSE: i64 = 98;

const GET_REQUEST: &[u8] = b"get=1\n\n";

/// Errors from the response side of the protocol.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed response: {0}")]
    MalformedFraming(String),

    #[error("engine returned errno {0}")]
    Errno(i64),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A [`Configuration`] that cannot be put on the wire.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("invalid {field}: {source}")]
    Key {
        field: String,
        #[source]
        source: KeyError,
    },

    #[error("invalid endpoint {endpoint:?}: {reason}")]
    Endpoint { endpoint: String, reason: String },

    #[error("invalid port in endpoint {0:?}")]
    Port(String),

    #[error("invalid allowed IP {0:?}")]
    AllowedIp(String),

    #[error("dns_monitor_interval must be at least {MIN_MONITOR_INTERVAL_SECS}s, got {0}s")]
    Interval(u64),
}

pub fn encode_get_request() -> &'static [u8] {
    GET_REQUEST
}

/// Response trailer for `code`.
pub fn encode_errno(code: i64) -> String {
    format!("errno={code}\n\n")
}

fn put(out: &mut String, key: &str, value: impl Display) {
    // Writing into a String cannot fail.
    let _ = writeln!(out, "{key}={value}");
}

/// Encode a `set` request. Nothing is produced unless every field is valid.
///
/// The result may hold secret key material; callers should zeroize it once
/// written.
pub fn encode_set_request(config: &Configuration) -> Result<Vec<u8>, ConfigurationError> {
    let mut out = String::from("set=1\n");

    if let Some(encoded) = &config.private_key {
        let key = PrivateKey::from_base64(encoded).map_err(|source| ConfigurationError::Key {
            field: "private_key".to_string(),
            source,
        })?;
        put(&mut out, "private_key", key.to_hex());
    }
    if let Some(port) = config.listen_port {
        put(&mut out, "listen_port", port);
    }
    if let Some(mark) = config.fwmark {
        put(&mut out, "fwmark", mark);
    }
    if config.replace_peers {
        put(&mut out, "replace_peers", "true");
    }
    if let Some(secs) = config.dns_monitor_interval {
        if secs < MIN_MONITOR_INTERVAL_SECS {
            return Err(ConfigurationError::Interval(secs));
        }
        put(&mut out, "dns_monitor_interval", secs);
    }

    for peer in &config.peers {
        encode_peer(&mut out, peer)?;
    }

    out.push('\n');
    Ok(out.into_bytes())
}

fn encode_peer(out: &mut String, peer: &PeerConfig) -> Result<(), ConfigurationError> {
    let key = PublicKey::from_base64(&peer.public_key).map_err(|source| ConfigurationError::Key {
        field: "public_key".to_string(),
        source,
    })?;
    put(out, "public_key", key.to_hex());

    if peer.remove {
        put(out, "remove", "true");
        return Ok(());
    }

    if let Some(encoded) = &peer.preshared_key {
        let psk = PresharedKey::from_base64(encoded).map_err(|source| ConfigurationError::Key {
            field: format!("preshared_key for peer {}", key.short()),
            source,
        })?;
        put(out, "preshared_key", psk.to_hex());
    }
    if let Some(endpoint) = &peer.endpoint {
        validate_endpoint(endpoint)?;
        put(out, "endpoint", endpoint);
    }
    if let Some(keepalive) = peer.persistent_keepalive {
        put(out, "persistent_keepalive_interval", keepalive);
    }
    put(out, "replace_allowed_ips", "true");
    for cidr in &peer.allowed_ips {
        validate_allowed_ip(cidr)?;
        put(out, "allowed_ip", cidr.trim());
    }
    Ok(())
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigurationError> {
    if endpoint.contains(['\n', '\r']) {
        return Err(ConfigurationError::Endpoint {
            endpoint: endpoint.to_string(),
            reason: "contains a line break".to_string(),
        });
    }
    let (_, port) = split_host_port(endpoint).map_err(|e| ConfigurationError::Endpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    match port.parse::<u16>() {
        Ok(p) if p != 0 => Ok(()),
        _ => Err(ConfigurationError::Port(endpoint.to_string())),
    }
}

fn validate_allowed_ip(cidr: &str) -> Result<(), ConfigurationError> {
    let invalid = || ConfigurationError::AllowedIp(cidr.to_string());
    let (addr, prefix) = cidr.trim().split_once('/').ok_or_else(invalid)?;
    let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    if prefix > max {
        return Err(invalid());
    }
    Ok(())
}

/// Where decoded fields are attributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Interface,
    Peer(usize),
    /// After a `public_key` line that did not decode; fields are dropped.
    Discarded,
}

#[derive(Debug)]
struct Decoder {
    state: InterfaceState,
    cursor: Cursor,
    errno: Option<i64>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            state: InterfaceState::default(),
            cursor: Cursor::Interface,
            errno: None,
        }
    }
}

impl Decoder {
    fn feed(mut self, line: &str) -> Result<Self, ProtocolError> {
        if self.errno.is_some() {
            return Ok(self);
        }
        let Some((key, value)) = line.split_once('=') else {
            return Ok(self);
        };

        match key {
            "errno" => {
                let code = parse_errno(value)?;
                if code != 0 {
                    return Err(ProtocolError::Errno(code));
                }
                self.errno = Some(code);
            }
            "public_key" => {
                self.cursor = match PublicKey::from_hex(value) {
                    Ok(key) => {
                        self.state.peers.push(PeerState::new(key));
                        Cursor::Peer(self.state.peers.len() - 1)
                    }
                    Err(_) => Cursor::Discarded,
                };
            }
            _ => match self.cursor {
                Cursor::Interface => interface_field(&mut self.state, key, value),
                Cursor::Peer(i) => peer_field(&mut self.state.peers[i], key, value),
                Cursor::Discarded => {}
            },
        }
        Ok(self)
    }

    fn finish(self) -> Result<InterfaceState, ProtocolError> {
        if self.errno.is_none() {
            return Err(ProtocolError::MalformedFraming(
                "response has no errno line".to_string(),
            ));
        }
        let mut state = self.state;
        state.public_key = state.private_key.as_ref().map(PrivateKey::public_key);
        Ok(state)
    }
}

fn parse_errno(value: &str) -> Result<i64, ProtocolError> {
    value
        .trim()
        .parse()
        .map_err(|_| ProtocolError::MalformedFraming(format!("non-integer errno {value:?}")))
}

fn interface_field(state: &mut InterfaceState, key: &str, value: &str) {
    match key {
        "private_key" => {
            state.private_key = PrivateKey::from_hex(value).ok().filter(|k| !k.is_zero());
        }
        "listen_port" => state.listen_port = value.parse().ok(),
        "fwmark" => state.fwmark = value.parse().ok(),
        "dns_monitor_interval" => state.dns_monitor_interval = value.parse().ok(),
        "dns_monitored_peers" => state.dns_monitored_peers = value.parse().ok(),
        _ => {}
    }
}

fn peer_field(peer: &mut PeerState, key: &str, value: &str) {
    match key {
        "preshared_key" => {
            peer.preshared_key = PresharedKey::from_hex(value).ok().filter(|k| !k.is_zero());
        }
        "endpoint" if !value.is_empty() => peer.endpoint = Some(value.to_string()),
        "last_handshake_time_sec" => {
            peer.last_handshake = match value.parse::<u64>() {
                Ok(0) | Err(_) => None,
                Ok(sec) => Some(Handshake { sec, nsec: 0 }),
            };
        }
        "last_handshake_time_nsec" => {
            if let (Some(hs), Ok(nsec)) = (peer.last_handshake.as_mut(), value.parse()) {
                hs.nsec = nsec;
            }
        }
        "rx_bytes" => peer.rx_bytes = value.parse().ok(),
        "tx_bytes" => peer.tx_bytes = value.parse().ok(),
        "persistent_keepalive_interval" => {
            peer.persistent_keepalive_interval = value.parse().ok();
        }
        "allowed_ip" => peer.allowed_ips.push(value.to_string()),
        "protocol_version" => peer.protocol_version = value.parse().ok(),
        _ => {}
    }
}

/// Decode a `get` response into interface state.
pub fn decode_response(text: &str) -> Result<InterfaceState, ProtocolError> {
    text.lines()
        .try_fold(Decoder::default(), Decoder::feed)?
        .finish()
}

/// Check the errno of a `set` response; its other lines carry nothing.
pub fn decode_set_response(text: &str) -> Result<(), ProtocolError> {
    let line = text
        .lines()
        .find_map(|line| line.strip_prefix("errno="))
        .ok_or_else(|| ProtocolError::MalformedFraming("response has no errno line".to_string()))?;
    match parse_errno(line)? {
        0 => Ok(()),
        code => Err(ProtocolError::Errno(code)),
    }
}

/// Read one response: every line through `errno=` plus the blank line after it.
///
/// The connection's read deadline, if set, bounds the whole exchange.
pub async fn read_response(conn: &mut Connection) -> Result<String, ProtocolError> {
    let mut text = String::new();
    loop {
        let line = conn.read_line().await?.ok_or_else(|| {
            ProtocolError::MalformedFraming("connection closed before errno line".to_string())
        })?;
        let last = line.starts_with("errno=");
        text.push_str(&line);
        text.push('\n');
        if last {
            break;
        }
    }

    match conn.read_line().await? {
        Some(line) if !line.is_empty() => Err(ProtocolError::MalformedFraming(format!(
            "expected blank line after errno, got {line:?}"
        ))),
        // Peers that close right after the errno line are tolerated.
        _ => Ok(text),
    }
}
