//! Components built from tool configuration.
#![cfg(unix)]

use std::time::Duration;

use pretty_assertions::assert_eq;

use wgctl_core::{ControlClient, DnsMonitor};
use wgctl_test_utils::config::TestConfigBuilder;
use wgctl_test_utils::device::TestDevice;
use wgctl_test_utils::fakes::{FakeEngine, ScriptedResolver};
use wgctl_test_utils::tracing_setup::init_test_tracing;

#[tokio::test]
async fn client_from_config_reaches_socket_dir() {
    init_test_tracing();
    let device = TestDevice::start("wg0", ScriptedResolver::new()).await;
    let dir = device.socket_path.parent().expect("socket has a parent dir");

    let config = TestConfigBuilder::new()
        .socket_dir(dir)
        .dial_timeout_secs(1)
        .read_timeout_secs(2)
        .write_timeout_secs(2)
        .build();
    config.validate().unwrap();

    let client = ControlClient::from_config(&config.transport);
    assert_eq!(client.discover().await.unwrap(), vec!["wg0".to_string()]);
    let state = client.query("wg0").await.unwrap();
    assert_eq!(state.dns_monitor_interval, Some(60));

    assert!(client.transport().describe("wg0").ends_with("wg0.sock"));
    device.shutdown().await;
}

#[test]
fn monitor_from_config_uses_interval() {
    init_test_tracing();
    let config = TestConfigBuilder::new()
        .monitor_interval_secs(45)
        .resolve_timeout_secs(3)
        .log_level("debug")
        .build();
    config.validate().unwrap();

    let monitor = DnsMonitor::from_config(FakeEngine::new(), &config.monitor);
    assert_eq!(monitor.interval(), Duration::from_secs(45));
}

#[test]
fn builder_output_is_validated() {
    let config = TestConfigBuilder::new().monitor_interval_secs(5).build();
    assert!(config.validate().is_err());

    let config = TestConfigBuilder::new().log_level("loud").build();
    assert!(config.validate().is_err());
}
