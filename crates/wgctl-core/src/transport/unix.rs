//! Unix domain socket transport: `<socket_dir>/<name>.sock`.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::UnixStream;
use tracing::debug;

use super::{Connection, Transport, TransportError, validate_name};
use crate::BoxFuture;

/// Default directory holding interface control sockets.
pub const DEFAULT_SOCKET_DIR: &str = "/var/run/wireguard";

const SOCKET_SUFFIX: &str = ".sock";

#[derive(Debug, Clone)]
pub struct UnixSocketTransport {
    socket_dir: PathBuf,
    dial_timeout: Duration,
}

impl UnixSocketTransport {
    pub fn new(socket_dir: impl Into<PathBuf>, dial_timeout: Duration) -> Self {
        Self {
            socket_dir: socket_dir.into(),
            dial_timeout,
        }
    }

    pub fn socket_dir(&self) -> &Path {
        &self.socket_dir
    }

    /// Socket path for interface `name`.
    pub fn socket_path(&self, name: &str) -> PathBuf {
        self.socket_dir.join(format!("{name}{SOCKET_SUFFIX}"))
    }

    async fn connect(&self, name: &str) -> Result<Connection, TransportError> {
        validate_name(name)?;
        let path = self.socket_path(name);
        let endpoint = path.display().to_string();

        if !path.exists() {
            return Err(TransportError::NotFound {
                interface: name.to_string(),
                endpoint,
            });
        }

        let dialed = tokio::time::timeout(self.dial_timeout, UnixStream::connect(&path)).await;
        let stream = match dialed {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(classify(name, endpoint, e)),
            Err(_) => {
                return Err(TransportError::ConnectFailed {
                    interface: name.to_string(),
                    endpoint,
                    source: io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect timed out after {:?}", self.dial_timeout),
                    ),
                });
            }
        };

        debug!(interface = name, path = %endpoint, "control socket connected");
        Ok(Connection::new(stream, endpoint))
    }

    async fn scan(&self) -> Result<Vec<String>, TransportError> {
        let discovery_err = |source| TransportError::Discovery {
            path: self.socket_dir.display().to_string(),
            source,
        };

        let mut dir = match tokio::fs::read_dir(&self.socket_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(discovery_err(e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(discovery_err)? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(name) = file_name.strip_suffix(SOCKET_SUFFIX) else {
                continue;
            };
            if name.is_empty() || entry.file_type().await.map_err(discovery_err)?.is_dir() {
                continue;
            }
            names.push(name.to_string());
        }
        names.sort();
        Ok(names)
    }
}

/// A socket file whose listener is gone refuses connections; treat it as absent.
fn classify(name: &str, endpoint: String, e: io::Error) -> TransportError {
    let interface = name.to_string();
    match e.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => {
            TransportError::NotFound { interface, endpoint }
        }
        io::ErrorKind::PermissionDenied => TransportError::PermissionDenied { interface, endpoint },
        _ => TransportError::ConnectFailed {
            interface,
            endpoint,
            source: e,
        },
    }
}

impl Transport for UnixSocketTransport {
    fn open<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Connection, TransportError>> {
        Box::pin(self.connect(name))
    }

    fn discover(&self) -> BoxFuture<'_, Result<Option<Vec<String>>, TransportError>> {
        Box::pin(async move { self.scan().await.map(Some) })
    }

    fn describe(&self, name: &str) -> String {
        self.socket_path(name).display().to_string()
    }
}
