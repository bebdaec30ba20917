//! # Board controller contract.
//!
//! A board controller owns one device connection and its start/stop
//! lifecycle. The orchestrator never looks inside: it constructs controllers
//! through a [`BoardFactory`], awaits [`BoardController::start`], and relays
//! whatever the controller reports through its [`BoardEmitter`].
//!
//! ## Contract
//! - Construction is infallible; bad definitions surface from `start()`.
//! - `start()` is idempotent: a ready board returns `Ok(())` without
//!   reconnecting.
//! - Each terminal outcome of `start()` is reported exactly once through the
//!   emitter (`ready()` or `error()`).
//! - `stop()` is best-effort and never fails. It should not queue behind an
//!   in-flight `start()`.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use boardhub_core::{BoardDefinition, BoardId};

use crate::error::BoardError;
use crate::events::{EventBus, HubEvent};
use crate::host::Host;

/// Shared handle to a live controller.
pub type BoardRef = Arc<dyn BoardController>;

/// Lifecycle state of a board controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardState {
    #[default]
    NotStarted,
    Starting,
    Ready,
    Stopped,
    Failed,
}

impl fmt::Display for BoardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardState::NotStarted => write!(f, "not_started"),
            BoardState::Starting => write!(f, "starting"),
            BoardState::Ready => write!(f, "ready"),
            BoardState::Stopped => write!(f, "stopped"),
            BoardState::Failed => write!(f, "failed"),
        }
    }
}

/// Point-in-time view of a board, as reported by the broker `status` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardStatus {
    pub id: BoardId,
    pub state: BoardState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[async_trait]
pub trait BoardController: Send + Sync + 'static {
    fn id(&self) -> &BoardId;

    /// Port assigned during startup; `None` until ready.
    fn port(&self) -> Option<u16>;

    fn state(&self) -> BoardState;

    async fn start(&self) -> Result<(), BoardError>;

    async fn stop(&self);

    fn status(&self) -> BoardStatus {
        BoardStatus {
            id: self.id().clone(),
            state: self.state(),
            port: self.port(),
        }
    }
}

/// Everything a controller receives from the orchestrator at construction.
#[derive(Clone)]
pub struct BoardContext {
    pub id: BoardId,
    pub host: Host,
    pub emitter: BoardEmitter,
}

/// Builds controllers from normalized definitions (definition `id` is set).
pub trait BoardFactory: Send + Sync {
    fn create(&self, ctx: BoardContext, definition: BoardDefinition) -> BoardRef;
}

/// A board's event outlet, wired to the orchestrator's [`EventBus`].
#[derive(Clone)]
pub struct BoardEmitter {
    id: BoardId,
    bus: EventBus,
    board: Arc<OnceLock<Weak<dyn BoardController>>>,
}

impl BoardEmitter {
    pub(crate) fn new(id: BoardId, bus: EventBus) -> Self {
        Self {
            id,
            bus,
            board: Arc::new(OnceLock::new()),
        }
    }

    /// Attaches the controller this emitter speaks for. First bind wins.
    pub(crate) fn bind(&self, board: &BoardRef) {
        let _ = self.board.set(Arc::downgrade(board));
    }

    pub fn id(&self) -> &BoardId {
        &self.id
    }

    /// Announces readiness and re-emits the controller as a `Ready` event.
    pub fn ready(&self) {
        let Some(board) = self.board.get().and_then(Weak::upgrade) else {
            tracing::debug!(board = %self.id, "ready reported by an unbound board");
            return;
        };
        match board.port() {
            Some(port) => tracing::info!(board = %self.id, port, "board ready"),
            None => tracing::info!(board = %self.id, "board ready"),
        }
        self.bus.publish(HubEvent::Ready(board));
    }

    /// Forwards a board error unchanged.
    pub fn error(&self, error: BoardError) {
        self.bus.publish(HubEvent::Error {
            board: self.id.clone(),
            error: Arc::new(error),
        });
    }
}
