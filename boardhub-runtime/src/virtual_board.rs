//! Virtual board: a software stand-in for a device-attached controller.
//!
//! Definition keys:
//! - `delay_ms`: simulated connection latency (default 0)
//! - `fail`: `true` or a message string; startup fails after the delay
//! - `port`: fixed TCP port; otherwise a free port is discovered
//!
//! "Connecting" binds a loopback TCP listener, which is how the board gets
//! its port. The listener is held until `stop()`. A `stop()` issued while a
//! start is still connecting aborts that start instead of queueing behind it.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::watch;

use boardhub_core::{BoardDefinition, BoardId};

use crate::board::{
    BoardContext, BoardController, BoardEmitter, BoardFactory, BoardRef, BoardState,
};
use crate::error::BoardError;

#[derive(Debug, Default, Clone, Copy)]
struct Snapshot {
    state: BoardState,
    port: Option<u16>,
}

pub struct VirtualBoard {
    id: BoardId,
    definition: BoardDefinition,
    emitter: BoardEmitter,
    snapshot: Mutex<Snapshot>,
    /// Serializes start/stop; `Some` while connected.
    link: tokio::sync::Mutex<Option<TcpListener>>,
    /// Bumped by every `stop()`; pending starts watch it.
    stops: watch::Sender<u64>,
}

impl VirtualBoard {
    pub fn new(ctx: BoardContext, definition: BoardDefinition) -> Self {
        Self {
            id: ctx.id,
            definition,
            emitter: ctx.emitter,
            snapshot: Mutex::new(Snapshot::default()),
            link: tokio::sync::Mutex::new(None),
            stops: watch::channel(0).0,
        }
    }

    pub fn definition(&self) -> &BoardDefinition {
        &self.definition
    }

    fn set(&self, state: BoardState, port: Option<u16>) {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        *snapshot = Snapshot { state, port };
    }

    fn read(&self) -> Snapshot {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn delay(&self) -> Duration {
        Duration::from_millis(self.definition.get_u64("delay_ms").unwrap_or(0))
    }

    fn simulated_failure(&self) -> Option<String> {
        match self.definition.get("fail") {
            Some(serde_json::Value::Bool(true)) => Some("simulated connection failure".to_string()),
            Some(serde_json::Value::String(reason)) => Some(reason.clone()),
            _ => None,
        }
    }

    fn requested_port(&self) -> u16 {
        self.definition
            .get_u64("port")
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(0)
    }

    fn fail(&self, error: BoardError) -> BoardError {
        self.set(BoardState::Failed, None);
        self.emitter.error(error.clone());
        error
    }
}

#[async_trait]
impl BoardController for VirtualBoard {
    fn id(&self) -> &BoardId {
        &self.id
    }

    fn port(&self) -> Option<u16> {
        self.read().port
    }

    fn state(&self) -> BoardState {
        self.read().state
    }

    async fn start(&self) -> Result<(), BoardError> {
        // Subscribed before queueing on the link so a stop issued while this
        // call waits is still observed.
        let mut stops = self.stops.subscribe();
        let mut link = self.link.lock().await;
        if link.is_some() {
            return Ok(());
        }

        self.set(BoardState::Starting, None);
        tracing::debug!(board = %self.id, "connecting");
        tokio::select! {
            biased;
            _ = stops.changed() => {
                self.set(BoardState::Stopped, None);
                tracing::debug!(board = %self.id, "start aborted by stop");
                return Err(BoardError::Aborted { board: self.id.clone() });
            }
            _ = tokio::time::sleep(self.delay()) => {}
        }

        if let Some(reason) = self.simulated_failure() {
            return Err(self.fail(BoardError::Connect {
                board: self.id.clone(),
                reason,
            }));
        }

        let requested = self.requested_port();
        let listener = match TcpListener::bind(("127.0.0.1", requested)).await {
            Ok(listener) => listener,
            Err(err) => {
                return Err(self.fail(BoardError::Port {
                    board: self.id.clone(),
                    port: requested,
                    source: Arc::new(err),
                }))
            }
        };
        let port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(err) => {
                return Err(self.fail(BoardError::Port {
                    board: self.id.clone(),
                    port: requested,
                    source: Arc::new(err),
                }))
            }
        };

        *link = Some(listener);
        self.set(BoardState::Ready, Some(port));
        drop(link);
        self.emitter.ready();
        Ok(())
    }

    async fn stop(&self) {
        self.stops.send_modify(|generation| *generation = generation.wrapping_add(1));
        let mut link = self.link.lock().await;
        link.take();
        self.set(BoardState::Stopped, None);
        tracing::debug!(board = %self.id, "stopped");
    }
}

/// Builds a [`VirtualBoard`] for every definition.
#[derive(Debug, Default, Clone, Copy)]
pub struct VirtualBoardFactory;

impl BoardFactory for VirtualBoardFactory {
    fn create(&self, ctx: BoardContext, definition: BoardDefinition) -> BoardRef {
        Arc::new(VirtualBoard::new(ctx, definition))
    }
}
