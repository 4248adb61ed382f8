//! UAPI listener on a Unix domain socket.
//!
//! The engine process binds `<socket_dir>/<interface>.sock` and answers
//! requests through a [`DeviceUapi`]. A connection may carry any number of
//! requests back to back.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::codec::{EPROTO, encode_errno};
use super::device::DeviceUapi;
use crate::transport::Connection;

/// Largest request accepted on one connection before it is dropped.
pub const MAX_REQUEST_BYTES: usize = 1 << 20;

/// Time a client has to deliver one complete request.
pub const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Broadcast to stop [`serve`].
#[derive(Debug, Clone, Copy)]
pub struct ShutdownSignal;

/// Accept UAPI connections on `socket_path` until `shutdown_rx` fires.
///
/// A stale socket file is removed before binding and the socket is removed
/// again on exit.
pub async fn serve(
    socket_path: &Path,
    device: Arc<DeviceUapi>,
    mut shutdown_rx: broadcast::Receiver<ShutdownSignal>,
) -> io::Result<()> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    info!(path = %socket_path.display(), "UAPI listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let device = Arc::clone(&device);
                    let conn = Connection::new(stream, socket_path.display().to_string());
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, &device).await {
                            debug!(error = %e, "UAPI connection ended with error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "UAPI accept failed"),
            },
            _ = shutdown_rx.recv() => {
                info!("UAPI listener shutting down");
                break;
            }
        }
    }

    std::fs::remove_file(socket_path).ok();
    Ok(())
}

/// Serve requests on one connection until the client hangs up.
async fn handle_connection(mut conn: Connection, device: &DeviceUapi) -> io::Result<()> {
    loop {
        conn.set_read_timeout(REQUEST_READ_TIMEOUT);
        let mut request = String::new();
        loop {
            let budget = MAX_REQUEST_BYTES.saturating_sub(request.len());
            let line = match conn.read_line_limited(budget).await {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    conn.write_all(encode_errno(EPROTO).as_bytes()).await?;
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "request exceeds size limit",
                    ));
                }
                Err(e) => return Err(e),
            };
            if line.is_empty() {
                if request.is_empty() {
                    continue;
                }
                break;
            }
            request.push_str(&line);
            request.push('\n');
        }
        conn.clear_read_timeout();

        let response = device.handle(&request).await;
        conn.write_all(response.as_bytes()).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, PeerHandle};
    use crate::keys::PublicKey;
    use crate::monitor::DnsMonitor;
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct NoPeers;

    impl Engine for NoPeers {
        fn lookup_peer(&self, _key: &PublicKey) -> Option<Arc<dyn PeerHandle>> {
            None
        }
    }

    fn device() -> DeviceUapi {
        let engine: Arc<dyn Engine> = Arc::new(NoPeers);
        let monitor = Arc::new(DnsMonitor::new(engine.clone(), Duration::from_secs(60)));
        DeviceUapi::new(engine, monitor)
    }

    #[tokio::test]
    async fn test_connection_serves_back_to_back_requests() {
        let (server, mut client) = tokio::io::duplex(4096);
        let device = device();
        let serving = tokio::spawn(async move {
            handle_connection(Connection::new(server, "duplex"), &device).await
        });

        client.write_all(b"get=1\n\nget=1\n\n").await.unwrap();
        client.shutdown().await.unwrap();

        let mut replies = String::new();
        client.read_to_string(&mut replies).await.unwrap();
        assert_eq!(replies.matches("errno=0\n\n").count(), 2, "{replies:?}");
        serving.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_oversized_request_is_rejected() {
        let (server, client) = tokio::io::duplex(64 * 1024);
        let device = device();
        let serving = tokio::spawn(async move {
            handle_connection(Connection::new(server, "duplex"), &device).await
        });

        let (mut reader, mut writer) = tokio::io::split(client);
        // One endless line; the server hangs up long before it ends.
        tokio::spawn(async move {
            let chunk = vec![b'a'; 8192];
            while writer.write_all(&chunk).await.is_ok() {}
        });

        let mut reply = String::new();
        reader.read_to_string(&mut reply).await.unwrap();
        assert_eq!(reply, encode_errno(EPROTO));

        let err = serving.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_client_times_out() {
        let (server, mut client) = tokio::io::duplex(256);
        let device = device();
        client.write_all(b"get=1\n").await.unwrap();

        let err = handle_connection(Connection::new(server, "duplex"), &device)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        drop(client);
    }
}
