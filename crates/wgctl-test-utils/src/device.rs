//! A complete engine-side UAPI endpoint for end-to-end tests.
//!
//! [`TestDevice`] wires a [`FakeEngine`] and a [`DnsMonitor`] behind a
//! [`DeviceUapi`], serves it on a socket in a temp directory, and hands out a
//! [`ControlClient`] pointed at it.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use wgctl_core::monitor::DnsMonitor;
use wgctl_core::transport::UnixSocketTransport;
use wgctl_core::uapi::{DeviceUapi, ShutdownSignal, serve};
use wgctl_core::ControlClient;

use crate::fakes::{FakeEngine, ScriptedResolver};

/// A served device plus a client for it.
///
/// The temp directory (and with it the socket) is removed when this value is
/// dropped, even on panic.
pub struct TestDevice {
    pub engine: Arc<FakeEngine>,
    pub monitor: Arc<DnsMonitor>,
    pub resolver: Arc<ScriptedResolver>,
    pub client: ControlClient,
    pub interface: String,
    pub socket_path: PathBuf,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    server: JoinHandle<io::Result<()>>,
    _temp_dir: TempDir,
}

impl TestDevice {
    /// Serve interface `name`. The monitor and the client share `resolver`.
    pub async fn start(name: &str, resolver: Arc<ScriptedResolver>) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let socket_path = temp_dir.path().join(format!("{name}.sock"));

        let engine = FakeEngine::new();
        let monitor = Arc::new(
            DnsMonitor::new(engine.clone(), Duration::from_secs(60))
                .with_resolver(resolver.clone()),
        );
        let device = Arc::new(DeviceUapi::new(engine.clone(), monitor.clone()));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let path = socket_path.clone();
        let server = tokio::spawn(async move { serve(&path, device, shutdown_rx).await });

        for _ in 0..200 {
            if socket_path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(socket_path.exists(), "UAPI socket never appeared");

        let transport = Arc::new(UnixSocketTransport::new(
            temp_dir.path(),
            Duration::from_secs(5),
        ));
        let client = ControlClient::new(transport).with_resolver(resolver.clone());

        Self {
            engine,
            monitor,
            resolver,
            client,
            interface: name.to_string(),
            socket_path,
            shutdown_tx,
            server,
            _temp_dir: temp_dir,
        }
    }

    /// Stop the listener and wait for it to clean up its socket.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(ShutdownSignal);
        self.server
            .await
            .expect("server task panicked")
            .expect("server returned an error");
    }
}
