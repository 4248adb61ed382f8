//! Local control transports.
//!
//! An interface's control endpoint is a Unix domain socket on Unix-likes and a
//! named pipe on Windows. Both are reached through the [`Transport`] trait and
//! hand back a [`Connection`]: a buffered duplex stream with independent read
//! and write deadlines.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::time::Instant;

use wgctl_config::TransportConfig;

use crate::BoxFuture;

#[cfg(windows)]
pub mod named_pipe;
#[cfg(unix)]
pub mod unix;

#[cfg(windows)]
pub use named_pipe::NamedPipeTransport;
#[cfg(unix)]
pub use unix::UnixSocketTransport;

/// Any byte stream a [`Connection`] can sit on.
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> DuplexStream for T {}

/// Errors from opening or enumerating control endpoints.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid interface name {0:?}")]
    InvalidName(String),

    #[error("interface {interface} not found at {endpoint}")]
    NotFound { interface: String, endpoint: String },

    #[error("permission denied opening {endpoint} for interface {interface}")]
    PermissionDenied { interface: String, endpoint: String },

    #[error("failed to connect to {endpoint} for interface {interface}: {source}")]
    ConnectFailed {
        interface: String,
        endpoint: String,
        source: io::Error,
    },

    #[error("failed to enumerate interfaces in {path}: {source}")]
    Discovery { path: String, source: io::Error },
}

impl TransportError {
    /// One line of guidance for the operator, when there is something to do.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { .. } => Some("is the interface up? check `wgctl interfaces`"),
            Self::PermissionDenied { .. } => {
                Some("the control socket is root-owned; run with elevated privileges")
            }
            Self::InvalidName(_) => Some("interface names may not contain path separators"),
            Self::ConnectFailed { .. } | Self::Discovery { .. } => None,
        }
    }
}

/// Reject names that would escape the socket directory or pipe namespace.
pub(crate) fn validate_name(name: &str) -> Result<(), TransportError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(TransportError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Opens control connections to named interfaces.
pub trait Transport: Send + Sync {
    fn open<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Connection, TransportError>>;

    /// Names of interfaces with a live control endpoint, sorted. `None` means
    /// this transport cannot enumerate.
    fn discover(&self) -> BoxFuture<'_, Result<Option<Vec<String>>, TransportError>>;

    /// Human-readable location of `name`'s endpoint, for messages.
    fn describe(&self, name: &str) -> String;
}

/// Build the platform transport from tool configuration.
#[cfg(unix)]
pub fn from_config(config: &TransportConfig) -> Arc<dyn Transport> {
    Arc::new(UnixSocketTransport::new(
        &config.socket_dir,
        Duration::from_secs(config.dial_timeout_secs),
    ))
}

/// Build the platform transport from tool configuration.
#[cfg(windows)]
pub fn from_config(config: &TransportConfig) -> Arc<dyn Transport> {
    Arc::new(NamedPipeTransport::new(
        &config.pipe_root,
        Duration::from_secs(config.dial_timeout_secs),
    ))
}

/// An open control connection.
pub struct Connection {
    stream: BufStream<Box<dyn DuplexStream>>,
    peer: String,
    read_deadline: Option<Instant>,
    write_deadline: Option<Instant>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("read_deadline", &self.read_deadline)
            .field("write_deadline", &self.write_deadline)
            .finish()
    }
}

async fn with_deadline<T>(
    deadline: Option<Instant>,
    op: &str,
    fut: impl std::future::Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut).await.map_err(|_| {
            io::Error::new(io::ErrorKind::TimedOut, format!("{op} deadline exceeded"))
        })?,
        None => fut.await,
    }
}

impl Connection {
    pub fn new(stream: impl DuplexStream + 'static, peer: impl Into<String>) -> Self {
        Self {
            stream: BufStream::new(Box::new(stream)),
            peer: peer.into(),
            read_deadline: None,
            write_deadline: None,
        }
    }

    /// Where this connection goes (socket path or pipe name).
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Every read from now until cleared must finish within `timeout` of this call.
    /// A timeout too large to represent leaves reads unbounded.
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_deadline = Instant::now().checked_add(timeout);
    }

    pub fn clear_read_timeout(&mut self) {
        self.read_deadline = None;
    }

    pub fn set_write_timeout(&mut self, timeout: Duration) {
        self.write_deadline = Instant::now().checked_add(timeout);
    }

    pub fn clear_write_timeout(&mut self) {
        self.write_deadline = None;
    }

    /// Write and flush all of `buf`.
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let stream = &mut self.stream;
        with_deadline(self.write_deadline, "write", async move {
            stream.write_all(buf).await?;
            stream.flush().await
        })
        .await
    }

    /// Next line without its terminator, or `None` at end of stream.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        self.read_line_limited(usize::MAX).await
    }

    /// Like [`read_line`](Self::read_line), but fails with `InvalidData` once
    /// `limit` bytes arrive without a newline.
    pub async fn read_line_limited(&mut self, limit: usize) -> io::Result<Option<String>> {
        if limit == 0 {
            return Err(line_too_long());
        }
        let mut line = String::new();
        let mut bounded = (&mut self.stream).take(limit as u64);
        let n = with_deadline(self.read_deadline, "read", bounded.read_line(&mut line)).await?;
        if n == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        } else if n >= limit {
            return Err(line_too_long());
        }
        Ok(Some(line))
    }
}

fn line_too_long() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "line exceeds length limit")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("wg0").is_ok());
        assert!(validate_name("utun-home.1").is_ok());
        for bad in ["", ".", "..", "../etc", "a/b", r"a\b"] {
            assert!(
                matches!(validate_name(bad), Err(TransportError::InvalidName(_))),
                "{bad:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_connection_lines() {
        let (client, mut server) = tokio::io::duplex(256);
        let mut conn = Connection::new(client, "duplex");

        server.write_all(b"a=1\r\nb=2\n\ntail").await.unwrap();
        drop(server);

        assert_eq!(conn.read_line().await.unwrap().as_deref(), Some("a=1"));
        assert_eq!(conn.read_line().await.unwrap().as_deref(), Some("b=2"));
        assert_eq!(conn.read_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(conn.read_line().await.unwrap().as_deref(), Some("tail"));
        assert_eq!(conn.read_line().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_deadline_expires() {
        let (client, _server) = tokio::io::duplex(64);
        let mut conn = Connection::new(client, "duplex");
        conn.set_read_timeout(Duration::from_secs(10));

        let err = conn.read_line().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        conn.clear_read_timeout();
        assert!(conn.read_deadline.is_none());
    }

    #[tokio::test]
    async fn test_unbounded_timeouts_do_not_overflow() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut conn = Connection::new(client, "duplex");
        conn.set_read_timeout(Duration::MAX);
        conn.set_write_timeout(Duration::MAX);
        assert!(conn.read_deadline.is_none());
        assert!(conn.write_deadline.is_none());

        server.write_all(b"errno=0\n").await.unwrap();
        assert_eq!(conn.read_line().await.unwrap().as_deref(), Some("errno=0"));
    }

    #[tokio::test]
    async fn test_read_line_limited() {
        let (client, mut server) = tokio::io::duplex(256);
        let mut conn = Connection::new(client, "duplex");
        server.write_all(b"get=1\nprivate_key=0123456789\n").await.unwrap();

        assert_eq!(conn.read_line_limited(6).await.unwrap().as_deref(), Some("get=1"));
        let err = conn.read_line_limited(8).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(
            conn.read_line_limited(0).await.unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
    }

    #[tokio::test]
    async fn test_write_reaches_peer() {
        let (client, server) = tokio::io::duplex(64);
        let mut conn = Connection::new(client, "duplex");
        conn.set_write_timeout(Duration::from_secs(5));
        conn.write_all(b"get=1\n\n").await.unwrap();
        drop(conn);

        let mut peer = Connection::new(server, "peer");
        assert_eq!(peer.read_line().await.unwrap().as_deref(), Some("get=1"));
        assert_eq!(peer.read_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(peer.read_line().await.unwrap(), None);
    }
}
