//! # Orchestrator event surface.
//!
//! [`EventBus`] is a thin wrapper around [`tokio::sync::broadcast`]. Every
//! board publishes through its [`BoardEmitter`](crate::BoardEmitter), which
//! holds a clone of the orchestrator's bus, so a host subscribes once and
//! observes every board.
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks and never fails.
//! - **FIFO per publisher**: no ordering across distinct boards.
//! - **No persistence**: events sent with no live receiver are dropped.
//! - **Lag**: slow receivers observe `RecvError::Lagged(n)` and skip `n` events.

use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast;

use boardhub_core::BoardId;

use crate::board::{BoardController, BoardRef};
use crate::error::BoardError;

/// Events multiplexed from all registered boards plus orchestrator notices.
#[derive(Clone)]
pub enum HubEvent {
    /// A board finished startup; payload is the ready controller.
    Ready(BoardRef),
    /// A board reported an error, forwarded unchanged.
    Error {
        board: BoardId,
        error: Arc<BoardError>,
    },
    /// A board was added to the registry after construction.
    BoardRegistered(BoardId),
    /// Orchestrator notice: a start-all sweep recorded this board as failed.
    StartFailed {
        board: BoardId,
        error: Arc<BoardError>,
    },
}

impl HubEvent {
    pub fn board_id(&self) -> BoardId {
        match self {
            HubEvent::Ready(board) => board.id().clone(),
            HubEvent::Error { board, .. }
            | HubEvent::BoardRegistered(board)
            | HubEvent::StartFailed { board, .. } => board.clone(),
        }
    }
}

impl fmt::Debug for HubEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubEvent::Ready(board) => f
                .debug_struct("Ready")
                .field("board", board.id())
                .field("port", &board.port())
                .finish(),
            HubEvent::Error { board, error } => f
                .debug_struct("Error")
                .field("board", board)
                .field("error", error)
                .finish(),
            HubEvent::BoardRegistered(board) => {
                f.debug_tuple("BoardRegistered").field(board).finish()
            }
            HubEvent::StartFailed { board, error } => f
                .debug_struct("StartFailed")
                .field("board", board)
                .field("error", error)
                .finish(),
        }
    }
}

/// Broadcast channel for [`HubEvent`]s. Cheap to clone.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<HubEvent>,
}

impl EventBus {
    /// Creates a bus with the given shared capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: HubEvent) {
        let _ = self.tx.send(event);
    }

    /// A receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.tx.subscribe()
    }
}
