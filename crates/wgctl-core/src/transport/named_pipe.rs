//! Windows named pipe transport: `<pipe_root>\<name>`.

use std::io;
use std::time::Duration;

use tokio::net::windows::named_pipe::ClientOptions;
use tokio::time::Instant;
use tracing::debug;

use super::{Connection, Transport, TransportError, validate_name};
use crate::BoxFuture;

/// Default pipe namespace for interface control pipes.
pub const DEFAULT_PIPE_ROOT: &str = r"\\.\pipe\ProtectedPrefix\Administrators\WireGuard";

const ERROR_PIPE_BUSY: i32 = 231;
const BUSY_RETRY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct NamedPipeTransport {
    pipe_root: String,
    dial_timeout: Duration,
}

impl NamedPipeTransport {
    pub fn new(pipe_root: impl Into<String>, dial_timeout: Duration) -> Self {
        Self {
            pipe_root: pipe_root.into(),
            dial_timeout,
        }
    }

    pub fn pipe_name(&self, name: &str) -> String {
        format!(r"{}\{name}", self.pipe_root.trim_end_matches('\\'))
    }

    async fn connect(&self, name: &str) -> Result<Connection, TransportError> {
        validate_name(name)?;
        let endpoint = self.pipe_name(name);
        let deadline = Instant::now() + self.dial_timeout;

        loop {
            match ClientOptions::new().open(&endpoint) {
                Ok(client) => {
                    debug!(interface = name, pipe = %endpoint, "control pipe connected");
                    return Ok(Connection::new(client, endpoint));
                }
                Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) => {
                    if Instant::now() + BUSY_RETRY >= deadline {
                        return Err(TransportError::ConnectFailed {
                            interface: name.to_string(),
                            endpoint,
                            source: io::Error::new(
                                io::ErrorKind::TimedOut,
                                format!("pipe busy for {:?}", self.dial_timeout),
                            ),
                        });
                    }
                    tokio::time::sleep(BUSY_RETRY).await;
                }
                Err(e) => {
                    let interface = name.to_string();
                    return Err(match e.kind() {
                        io::ErrorKind::NotFound => TransportError::NotFound { interface, endpoint },
                        io::ErrorKind::PermissionDenied => {
                            TransportError::PermissionDenied { interface, endpoint }
                        }
                        _ => TransportError::ConnectFailed {
                            interface,
                            endpoint,
                            source: e,
                        },
                    });
                }
            }
        }
    }
}

impl Transport for NamedPipeTransport {
    fn open<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Connection, TransportError>> {
        Box::pin(self.connect(name))
    }

    /// The pipe namespace is not enumerable without privileges we do not assume.
    fn discover(&self) -> BoxFuture<'_, Result<Option<Vec<String>>, TransportError>> {
        Box::pin(async { Ok(None) })
    }

    fn describe(&self, name: &str) -> String {
        self.pipe_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_name() {
        let t = NamedPipeTransport::new(DEFAULT_PIPE_ROOT, Duration::from_secs(5));
        assert_eq!(
            t.pipe_name("wg0"),
            r"\\.\pipe\ProtectedPrefix\Administrators\WireGuard\wg0"
        );
    }

    #[tokio::test]
    async fn test_discover_unavailable() {
        let t = NamedPipeTransport::new(DEFAULT_PIPE_ROOT, Duration::from_secs(5));
        assert!(t.discover().await.unwrap().is_none());
    }
}
