//! DNS monitor behaviour against a fake engine and a scripted resolver.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use wgctl_core::monitor::{DnsMonitor, FAILURE_WARN_THRESHOLD, Registration};
use wgctl_test_utils::fakes::{FakeEngine, ScriptedResolver};
use wgctl_test_utils::test_key;

fn monitor(engine: &Arc<FakeEngine>, resolver: &Arc<ScriptedResolver>) -> Arc<DnsMonitor> {
    Arc::new(
        DnsMonitor::new(engine.clone(), Duration::from_secs(60)).with_resolver(resolver.clone()),
    )
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[test_log::test(tokio::test)]
async fn migrates_once_after_unresolved_registration() {
    let engine = FakeEngine::new();
    let resolver = ScriptedResolver::new();
    let key = test_key(1);
    let peer = engine.insert_peer(key, Some("9.9.9.9:51820".parse().unwrap()));
    let monitor = monitor(&engine, &resolver);

    resolver.push_err();
    resolver.push_ok(&["1.2.3.4"]);
    resolver.push_ok(&["5.6.7.8"]);

    let registration = monitor.add_peer(key, "example.com:51820").await.unwrap();
    assert!(matches!(registration, Registration::Unresolved { .. }));
    assert_eq!(monitor.monitored_count(), 1);
    assert_eq!(peer.handshakes(), 0);

    // First success only records the address.
    monitor.check_all_peers().await;
    assert_eq!(peer.handshakes(), 0);
    assert_eq!(peer.current_endpoint(), Some("9.9.9.9:51820".parse().unwrap()));

    monitor.check_all_peers().await;
    assert_eq!(peer.handshakes(), 1);
    assert_eq!(peer.current_endpoint(), Some("5.6.7.8:51820".parse().unwrap()));
    assert!(peer.source_stale());

    let info = &monitor.list_monitored()[&key];
    assert_eq!(info.last_resolved, Some(ip("5.6.7.8")));
    assert_eq!(info.host, "example.com");
    assert_eq!(info.port, "51820");
    assert_eq!(info.failures, 0);
}

#[test_log::test(tokio::test)]
async fn failures_keep_last_address() {
    let engine = FakeEngine::new();
    let resolver = ScriptedResolver::new();
    let key = test_key(2);
    let peer = engine.insert_peer(key, Some("1.2.3.4:51820".parse().unwrap()));
    let monitor = monitor(&engine, &resolver);

    resolver.push_ok(&["1.2.3.4"]);
    monitor.add_peer(key, "vpn.example.org:51820").await.unwrap();

    for _ in 0..FAILURE_WARN_THRESHOLD + 2 {
        resolver.push_err();
        monitor.check_all_peers().await;
    }
    let info = &monitor.list_monitored()[&key];
    assert_eq!(info.failures, FAILURE_WARN_THRESHOLD + 2);
    assert_eq!(info.last_resolved, Some(ip("1.2.3.4")));

    resolver.push_ok(&["1.2.3.4"]);
    monitor.check_all_peers().await;
    let info = &monitor.list_monitored()[&key];
    assert_eq!(info.failures, 0);
    assert_eq!(peer.handshakes(), 0);
}

#[tokio::test]
async fn registration_prefers_ipv4() {
    let engine = FakeEngine::new();
    let resolver = ScriptedResolver::new();
    let monitor = monitor(&engine, &resolver);

    resolver.push_ok(&["2001:db8::1", "10.0.0.1"]);
    match monitor.add_peer(test_key(3), "dual.example.com:51820").await.unwrap() {
        Registration::Monitored { resolved, endpoint } => {
            assert_eq!(resolved, ip("10.0.0.1"));
            assert_eq!(endpoint, "10.0.0.1:51820");
        }
        other => panic!("unexpected registration {other:?}"),
    }

    resolver.push_ok(&["2001:db8::1"]);
    match monitor.add_peer(test_key(4), "v6.example.com:51820").await.unwrap() {
        Registration::Monitored { endpoint, .. } => assert_eq!(endpoint, "[2001:db8::1]:51820"),
        other => panic!("unexpected registration {other:?}"),
    }
}

#[tokio::test]
async fn registration_never_touches_engine() {
    let engine = FakeEngine::new();
    let resolver = ScriptedResolver::new();
    let key = test_key(5);
    let peer = engine.insert_peer(key, None);
    let monitor = monitor(&engine, &resolver);

    resolver.push_ok(&["1.2.3.4"]);
    monitor.add_peer(key, "example.com:51820").await.unwrap();
    assert_eq!(peer.handshakes(), 0);
    assert_eq!(peer.current_endpoint(), None);
}

#[tokio::test]
async fn peer_missing_from_engine_is_skipped() {
    let engine = FakeEngine::new();
    let resolver = ScriptedResolver::new();
    let key = test_key(6);
    let monitor = monitor(&engine, &resolver);

    resolver.push_ok(&["1.2.3.4"]);
    resolver.push_ok(&["5.6.7.8"]);
    monitor.add_peer(key, "gone.example.com:51820").await.unwrap();
    monitor.check_all_peers().await;

    assert_eq!(
        monitor.list_monitored()[&key].last_resolved,
        Some(ip("5.6.7.8"))
    );
}

#[tokio::test]
async fn removed_peers_are_not_checked() {
    let engine = FakeEngine::new();
    let resolver = ScriptedResolver::new();
    let key = test_key(7);
    let monitor = monitor(&engine, &resolver);

    resolver.push_ok(&["1.2.3.4"]);
    monitor.add_peer(key, "example.com:51820").await.unwrap();
    monitor.remove_peer(&key);
    monitor.remove_peer(&key);

    let calls = resolver.calls();
    monitor.check_all_peers().await;
    assert_eq!(resolver.calls(), calls);
    assert!(monitor.list_monitored().is_empty());
}

#[tokio::test]
async fn literal_endpoints_are_not_monitored() {
    let engine = FakeEngine::new();
    let resolver = ScriptedResolver::new();
    let monitor = monitor(&engine, &resolver);

    for endpoint in ["192.168.1.1:51820", "[2001:db8::1]:51820"] {
        let registration = monitor.add_peer(test_key(8), endpoint).await.unwrap();
        assert!(matches!(registration, Registration::Literal));
    }
    assert_eq!(monitor.monitored_count(), 0);
    assert_eq!(resolver.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn polling_task_migrates_on_tick() {
    let engine = FakeEngine::new();
    let resolver = ScriptedResolver::new();
    let key = test_key(9);
    let peer = engine.insert_peer(key, Some("1.2.3.4:51820".parse().unwrap()));
    let monitor = monitor(&engine, &resolver);
    monitor.set_interval(Duration::from_secs(10));

    resolver.push_ok(&["1.2.3.4"]);
    resolver.push_ok(&["5.6.7.8"]);
    monitor.add_peer(key, "example.com:51820").await.unwrap();

    let task = monitor.start();
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(peer.handshakes(), 1);
    assert_eq!(peer.current_endpoint(), Some("5.6.7.8:51820".parse().unwrap()));

    monitor.stop();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("monitor task did not stop")
        .unwrap();
}
