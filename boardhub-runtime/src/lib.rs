//! Board-collection runtime: controller contract, orchestrator, broker endpoint.

pub mod board;
pub mod broker;
mod error;
pub mod events;
pub mod host;
pub mod orchestrator;
pub mod protocol;
pub mod registry;
mod runtime;
pub mod virtual_board;

pub use board::{
    BoardContext, BoardController, BoardEmitter, BoardFactory, BoardRef, BoardState, BoardStatus,
};
pub use broker::{BrokerEndpoint, BrokerHandler};
pub use error::{BoardError, HubError};
pub use events::{EventBus, HubEvent};
pub use host::Host;
pub use orchestrator::{BoardOutcome, Orchestrator, Settlement, StartReport, StartTarget};
pub use protocol::{BrokerClient, BrokerCommand, BrokerReply, HubStatus, StartedBoard};
pub use runtime::{run, run_with, start_blocking, LogFormat};
pub use virtual_board::{VirtualBoard, VirtualBoardFactory};
