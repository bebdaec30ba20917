use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use boardhub_core::{BoardId, ConfigError};

/// Failure of a single board. Cloneable so one failure can be both
/// reported in a settlement and forwarded on the event bus.
#[derive(Debug, Clone, Error)]
pub enum BoardError {
    #[error("board {board} failed to connect: {reason}")]
    Connect { board: BoardId, reason: String },

    #[error("board {board} could not bind port {port}: {source}")]
    Port {
        board: BoardId,
        port: u16,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("board {board} panicked during start: {reason}")]
    Panicked { board: BoardId, reason: String },

    #[error("board {board} start aborted by stop")]
    Aborted { board: BoardId },

    #[error("board '{board}' not found")]
    NotRegistered { board: BoardId },
}

impl BoardError {
    pub fn board(&self) -> &BoardId {
        match self {
            BoardError::Connect { board, .. }
            | BoardError::Port { board, .. }
            | BoardError::Panicked { board, .. }
            | BoardError::Aborted { board }
            | BoardError::NotRegistered { board } => board,
        }
    }
}

/// Error surface for the orchestrator, broker endpoint and daemon runtime.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("board '{id}' not found")]
    BoardNotFound { id: String },

    #[error("board definition has no id and none was supplied")]
    MissingBoardId,

    #[error("board '{id}' is already registered")]
    DuplicateBoardId { id: String },

    #[error(transparent)]
    Board(#[from] Arc<BoardError>),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("broker protocol error: {0}")]
    Protocol(String),

    #[error("broker rejected request: {0}")]
    BrokerRejected(String),

    #[error("broker is not running (socket missing: {socket})")]
    BrokerNotRunning { socket: PathBuf },
}

impl From<BoardError> for HubError {
    fn from(err: BoardError) -> Self {
        HubError::Board(Arc::new(err))
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> HubError {
    HubError::Io {
        path: path.into(),
        source,
    }
}
