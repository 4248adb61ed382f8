//! A canned UAPI endpoint for client tests.
//!
//! [`FakeUapiServer`] listens on `<tempdir>/<name>.sock`, records each request
//! it receives, and answers with the next canned response. When the canned
//! responses run out it stops answering but keeps the connection open, which
//! is how read deadlines are exercised.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

use wgctl_core::transport::{Connection, Transport, UnixSocketTransport};

pub struct FakeUapiServer {
    name: String,
    requests: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
    temp_dir: TempDir,
}

impl FakeUapiServer {
    /// Start serving `responses`, in order, on a socket named `name`.
    pub async fn start(name: &str, responses: Vec<String>) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join(format!("{name}.sock"));
        let listener = UnixListener::bind(&path).expect("failed to bind fake UAPI socket");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let responses = Arc::new(Mutex::new(responses));
        let recorded = Arc::clone(&requests);

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let recorded = Arc::clone(&recorded);
                let responses = Arc::clone(&responses);
                tokio::spawn(answer(stream, recorded, responses));
            }
        });

        Self {
            name: name.to_string(),
            requests,
            task,
            temp_dir,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A transport rooted at this server's socket directory.
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(UnixSocketTransport::new(
            self.temp_dir.path(),
            Duration::from_secs(5),
        ))
    }

    /// Every request received so far, each with its trailing blank line.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl Drop for FakeUapiServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn answer(
    stream: UnixStream,
    recorded: Arc<Mutex<Vec<String>>>,
    responses: Arc<Mutex<Vec<String>>>,
) {
    let mut conn = Connection::new(stream, "fake-uapi");
    let mut request = String::new();
    while let Ok(Some(line)) = conn.read_line().await {
        request.push_str(&line);
        request.push('\n');
        if line.is_empty() {
            break;
        }
    }
    recorded.lock().expect("requests lock").push(request);

    let next = {
        let mut responses = responses.lock().expect("responses lock");
        (!responses.is_empty()).then(|| responses.remove(0))
    };
    match next {
        Some(response) => {
            let _ = conn.write_all(response.as_bytes()).await;
        }
        // Hold the connection open without answering.
        None => std::future::pending::<()>().await,
    }
}
