//! Broker endpoint: the command/telemetry socket for the managed boards.
//!
//! Owned by the orchestrator and torn down with it. An endpoint built from an
//! absent config (or one without a socket path) is inert: `serve` binds
//! nothing and `shutdown` is a no-op.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use boardhub_core::BrokerConfig;

use crate::error::{io_err, HubError};
use crate::protocol::{BrokerCommand, BrokerReply};

/// Answers broker requests. Implemented by the orchestrator.
#[async_trait]
pub trait BrokerHandler: Send + Sync {
    async fn handle(&self, command: BrokerCommand) -> BrokerReply;
}

/// Cheap-to-clone handle to the single broker endpoint.
#[derive(Clone)]
pub struct BrokerEndpoint {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    config: Option<BrokerConfig>,
    shutdown: broadcast::Sender<()>,
    closed: AtomicBool,
    bound: Mutex<Option<PathBuf>>,
}

impl BrokerEndpoint {
    pub fn new(config: Option<BrokerConfig>) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(BrokerInner {
                config,
                shutdown,
                closed: AtomicBool::new(false),
                bound: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> Option<&BrokerConfig> {
        self.inner.config.as_ref()
    }

    /// Configured socket path, if any.
    pub fn socket(&self) -> Option<&Path> {
        self.config().and_then(|c| c.socket.as_deref())
    }

    pub fn is_serving(&self) -> bool {
        self.bound().is_some()
    }

    fn bound(&self) -> std::sync::MutexGuard<'_, Option<PathBuf>> {
        self.inner.bound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds the socket and spawns the accept loop.
    ///
    /// The handler is held weakly; once it is gone every request is answered
    /// with an error.
    pub async fn serve(&self, handler: Weak<dyn BrokerHandler>) -> Result<Option<PathBuf>, HubError> {
        let Some(socket) = self.socket().map(Path::to_path_buf) else {
            tracing::debug!("no broker socket configured; endpoint disabled");
            return Ok(None);
        };
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(HubError::Protocol(
                "broker endpoint has been shut down".to_string(),
            ));
        }
        if self.is_serving() {
            return Err(HubError::Protocol(format!(
                "broker endpoint already serving on {}",
                socket.display()
            )));
        }

        if let Some(parent) = socket.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
        }
        let listener = bind_owner_only(&socket).await?;
        *self.bound() = Some(socket.clone());

        let shutdown_rx = self.inner.shutdown.subscribe();
        tokio::spawn(accept_loop(listener, socket.clone(), handler, shutdown_rx));
        Ok(Some(socket))
    }

    /// Stops accepting connections and removes the socket. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.shutdown.send(());
        if let Some(socket) = self.bound().take() {
            match fs::remove_file(&socket) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(socket = %socket.display(), error = %err, "failed to remove broker socket")
                }
            }
            tracing::info!(socket = %socket.display(), "broker endpoint closed");
        }
    }
}

async fn accept_loop(
    listener: UnixListener,
    socket: PathBuf,
    handler: Weak<dyn BrokerHandler>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        let stream = tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(err) => {
                    tracing::error!(socket = %socket.display(), error = %err, "broker accept failed");
                    break;
                }
            },
        };
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(err) = answer(stream, handler).await {
                tracing::warn!(error = %err, "broker connection dropped");
            }
        });
    }
}

/// Reads one command line, dispatches it, writes one reply line.
async fn answer(stream: UnixStream, handler: Weak<dyn BrokerHandler>) -> Result<(), HubError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut line = String::new();
    BufReader::new(read_half)
        .read_line(&mut line)
        .await
        .map_err(|e| io_err("broker socket", e))?;
    if line.trim().is_empty() {
        return Ok(());
    }

    let reply = match serde_json::from_str::<BrokerCommand>(line.trim()) {
        Err(err) => BrokerReply::error(format!("malformed command: {err}")),
        Ok(command) => match handler.upgrade() {
            Some(handler) => {
                tracing::debug!(?command, "broker command");
                handler.handle(command).await
            }
            None => BrokerReply::error("orchestrator is no longer running"),
        },
    };

    let mut payload = serde_json::to_vec(&reply)?;
    payload.push(b'\n');
    write_half
        .write_all(&payload)
        .await
        .map_err(|e| io_err("broker socket", e))?;
    write_half
        .shutdown()
        .await
        .map_err(|e| io_err("broker socket", e))
}

/// Binds `socket` with 0600 permissions. A leftover socket file nobody
/// answers on is replaced; a live one is an error.
async fn bind_owner_only(socket: &Path) -> Result<UnixListener, HubError> {
    if socket.exists() {
        if UnixStream::connect(socket).await.is_ok() {
            return Err(HubError::Protocol(format!(
                "broker socket already in use: {}",
                socket.display()
            )));
        }
        tracing::warn!(socket = %socket.display(), "replacing stale broker socket");
        match fs::remove_file(socket) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(io_err(socket, err)),
        }
    }

    let listener = UnixListener::bind(socket).map_err(|e| io_err(socket, e))?;
    fs::set_permissions(socket, fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(socket, e))?;
    Ok(listener)
}
