//! Plain-text rendering of interface state for `wgctl show`.

use std::fmt::Write;
use std::time::{Duration, SystemTime};

use wgctl_core::{InterfaceState, PeerState};

/// Render `state` as an indented block, one section per peer.
pub fn render_interface(state: &InterfaceState, now: SystemTime) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "interface: {}", state.name);
    if let Some(key) = &state.public_key {
        let _ = writeln!(out, "  public key: {key}");
    }
    if state.private_key.is_some() {
        let _ = writeln!(out, "  private key: (hidden)");
    }
    if let Some(port) = state.listen_port {
        let _ = writeln!(out, "  listening port: {port}");
    }
    if let Some(mark) = state.fwmark.filter(|m| *m != 0) {
        let _ = writeln!(out, "  fwmark: {mark:#x}");
    }
    if let Some(secs) = state.dns_monitor_interval {
        let monitored = state.dns_monitored_peers.unwrap_or(0);
        let _ = writeln!(out, "  dns monitor: every {secs}s, {monitored} peer(s) tracked");
    }
    for peer in &state.peers {
        out.push('\n');
        render_peer(&mut out, peer, now);
    }
    out
}

fn render_peer(out: &mut String, peer: &PeerState, now: SystemTime) {
    let _ = writeln!(out, "peer: {}", peer.public_key);
    if peer.preshared_key.is_some() {
        let _ = writeln!(out, "  preshared key: (hidden)");
    }
    if let Some(endpoint) = &peer.endpoint {
        let _ = writeln!(out, "  endpoint: {endpoint}");
    }
    let allowed = if peer.allowed_ips.is_empty() {
        "(none)".to_string()
    } else {
        peer.allowed_ips.join(", ")
    };
    let _ = writeln!(out, "  allowed ips: {allowed}");
    if let Some(handshake) = &peer.last_handshake {
        let latest = match handshake.as_system_time() {
            Some(at) => format_ago(now.duration_since(at).unwrap_or_default()),
            None => "unknown".to_string(),
        };
        let _ = writeln!(out, "  latest handshake: {latest}");
    }
    if peer.rx_bytes.is_some() || peer.tx_bytes.is_some() {
        let _ = writeln!(
            out,
            "  transfer: {} received, {} sent",
            format_bytes(peer.rx_bytes.unwrap_or(0)),
            format_bytes(peer.tx_bytes.unwrap_or(0))
        );
    }
    if let Some(secs) = peer.persistent_keepalive_interval.filter(|s| *s != 0) {
        let _ = writeln!(out, "  persistent keepalive: every {secs}s");
    }
}

/// One line for an interface that could not be queried.
pub fn render_failure(name: &str, error: &dyn std::fmt::Display) -> String {
    format!("interface: {name} (error: {error})\n")
}

/// Binary-prefixed byte count, e.g. `1.50 KiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Coarse elapsed time: the two largest non-zero units.
pub fn format_ago(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs == 0 {
        return "just now".to_string();
    }
    let parts = [
        (secs / 86_400, "d"),
        (secs / 3600 % 24, "h"),
        (secs / 60 % 60, "m"),
        (secs % 60, "s"),
    ];
    let text: Vec<String> = parts
        .iter()
        .skip_while(|(n, _)| *n == 0)
        .take(2)
        .filter(|(n, _)| *n != 0)
        .map(|(n, unit)| format!("{n}{unit}"))
        .collect();
    format!("{} ago", text.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::UNIX_EPOCH;
    use wgctl_core::PublicKey;
    use wgctl_core::uapi::Handshake;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.50 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.00 GiB");
    }

    #[test]
    fn test_format_ago() {
        assert_eq!(format_ago(Duration::ZERO), "just now");
        assert_eq!(format_ago(Duration::from_secs(42)), "42s ago");
        assert_eq!(format_ago(Duration::from_secs(3605)), "1h ago");
        assert_eq!(format_ago(Duration::from_secs(90_061)), "1d 1h ago");
    }

    #[test]
    fn test_render_hides_secrets_and_lists_peers() {
        let key = PublicKey::from_bytes([9; 32]).unwrap();
        let mut peer = PeerState::new(key);
        peer.endpoint = Some("203.0.113.1:51820".to_string());
        peer.allowed_ips = vec!["10.0.0.2/32".to_string()];
        peer.last_handshake = Some(Handshake { sec: 1000, nsec: 0 });
        peer.rx_bytes = Some(2048);
        peer.tx_bytes = Some(10);

        let state = InterfaceState {
            name: "wg0".to_string(),
            listen_port: Some(51820),
            dns_monitor_interval: Some(60),
            dns_monitored_peers: Some(1),
            peers: vec![peer],
            ..Default::default()
        };
        let now = UNIX_EPOCH + Duration::from_secs(1065);
        let text = render_interface(&state, now);

        assert!(text.starts_with("interface: wg0\n"));
        assert!(text.contains("listening port: 51820"));
        assert!(text.contains("dns monitor: every 60s, 1 peer(s) tracked"));
        assert!(text.contains(&format!("peer: {key}")));
        assert!(text.contains("endpoint: 203.0.113.1:51820"));
        assert!(text.contains("latest handshake: 1m 5s ago"));
        assert!(text.contains("transfer: 2.00 KiB received, 10 B sent"));
        assert!(!text.contains("private key"));
    }

    #[test]
    fn test_render_out_of_range_handshake() {
        let mut peer = PeerState::new(PublicKey::from_bytes([3; 32]).unwrap());
        peer.last_handshake = Some(Handshake {
            sec: u64::MAX,
            nsec: 0,
        });
        let state = InterfaceState {
            name: "wg0".to_string(),
            peers: vec![peer],
            ..Default::default()
        };
        let text = render_interface(&state, SystemTime::now());
        assert!(text.contains("latest handshake: unknown"));
    }

    #[test]
    fn test_render_failure() {
        assert_eq!(
            render_failure("wg1", &"connection refused"),
            "interface: wg1 (error: connection refused)\n"
        );
    }
}
