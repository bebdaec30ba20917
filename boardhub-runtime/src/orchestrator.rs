//! # Board-collection orchestrator.
//!
//! Turns a [`HubConfig`] into a registry of board controllers and starts
//! them with per-board failure isolation.
//!
//! ## Architecture
//! ```text
//! HubConfig ─► resolve_boards ─► build_board (per entry) ─► BoardRegistry
//!                                   ├─► BoardEmitter ──► EventBus ──► host subscribers
//!                                   └─► Host::on_stop ──► board.stop()
//!
//! start(All)        ─► snapshot ─► spawn start() per board ─► join in order ─► Settlement
//! start(Many)       ─► lookup each ─► spawn start() per hit ─► join in order ─► Settlement
//! start(Id)         ─► lookup ─────────────────────────────► board.start()
//! start(Definition) ─► build_board ─► register ────────────► board.start()
//! start(Board)      ───────────────────────────────────────► board.start()
//! ```
//!
//! ## Rules
//! - A start-all sweep never fails as a whole; each board's outcome is
//!   captured separately, including panics.
//! - Settlement order is registry order, not completion order.
//! - A sweep only covers boards registered when it began.
//! - A list start settles like a sweep; unknown ids become rejected outcomes.
//! - Single-board starts propagate that board's failure.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use boardhub_core::{config, BoardDefinition, BoardId, HubConfig};

use crate::board::{
    BoardContext, BoardController, BoardEmitter, BoardFactory, BoardRef, BoardState, BoardStatus,
};
use crate::broker::{BrokerEndpoint, BrokerHandler};
use crate::error::{BoardError, HubError};
use crate::events::{EventBus, HubEvent};
use crate::host::Host;
use crate::protocol::{BrokerCommand, BrokerReply, HubStatus, StartedBoard};
use crate::registry::BoardRegistry;

/// What to start.
#[derive(Clone)]
pub enum StartTarget {
    /// Every board currently registered.
    All,
    /// Several registered boards, by id, settled like [`StartTarget::All`].
    Many(Vec<BoardId>),
    /// A registered board, by id.
    Id(BoardId),
    /// A new board: construct, register under its resolved id, then start.
    Definition {
        definition: BoardDefinition,
        id: Option<String>,
    },
    /// An existing controller.
    Board(BoardRef),
}

impl From<&str> for StartTarget {
    fn from(id: &str) -> Self {
        StartTarget::Id(BoardId::from(id))
    }
}

impl From<BoardId> for StartTarget {
    fn from(id: BoardId) -> Self {
        StartTarget::Id(id)
    }
}

impl From<Vec<BoardId>> for StartTarget {
    fn from(ids: Vec<BoardId>) -> Self {
        StartTarget::Many(ids)
    }
}

impl From<BoardDefinition> for StartTarget {
    fn from(definition: BoardDefinition) -> Self {
        StartTarget::Definition {
            definition,
            id: None,
        }
    }
}

impl From<BoardRef> for StartTarget {
    fn from(board: BoardRef) -> Self {
        StartTarget::Board(board)
    }
}

/// Result of [`Orchestrator::start`].
pub enum StartReport {
    All(Settlement),
    Single(Result<BoardRef, HubError>),
}

/// Terminal outcome of one board within a sweep.
#[derive(Clone)]
pub struct BoardOutcome {
    pub id: BoardId,
    pub result: Result<BoardRef, Arc<BoardError>>,
}

impl BoardOutcome {
    pub fn is_fulfilled(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-board outcomes of a start-all sweep, in registry order.
#[derive(Clone, Default)]
pub struct Settlement {
    pub outcomes: Vec<BoardOutcome>,
}

impl Settlement {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn fulfilled(&self) -> impl Iterator<Item = &BoardOutcome> {
        self.outcomes.iter().filter(|o| o.is_fulfilled())
    }

    pub fn rejected(&self) -> impl Iterator<Item = &BoardOutcome> {
        self.outcomes.iter().filter(|o| !o.is_fulfilled())
    }

    pub fn get(&self, id: &str) -> Option<&BoardOutcome> {
        self.outcomes.iter().find(|o| o.id.as_str() == id)
    }

    /// Wire form of every outcome, in settlement order.
    pub fn reports(&self) -> Vec<StartedBoard> {
        self.outcomes
            .iter()
            .map(|outcome| match &outcome.result {
                Ok(board) => StartedBoard {
                    id: outcome.id.clone(),
                    state: board.state(),
                    port: board.port(),
                    error: None,
                },
                Err(err) => StartedBoard {
                    id: outcome.id.clone(),
                    state: BoardState::Failed,
                    port: None,
                    error: Some(err.to_string()),
                },
            })
            .collect()
    }
}

pub struct Orchestrator {
    host: Host,
    config: HubConfig,
    broker: BrokerEndpoint,
    events: EventBus,
    factory: Arc<dyn BoardFactory>,
    registry: RwLock<BoardRegistry>,
}

impl Orchestrator {
    /// Builds the registry from `config.boards` and takes ownership of the
    /// broker endpoint. Both boards and broker are torn down on host stop.
    pub fn new(
        host: Host,
        config: HubConfig,
        factory: Arc<dyn BoardFactory>,
    ) -> Result<Arc<Self>, HubError> {
        let resolved = config::resolve_boards(&config)?;
        for id in &resolved.duplicates {
            tracing::warn!(board = %id, "duplicate board id in config; later entry wins");
        }
        if resolved.unnamed > 0 {
            tracing::debug!(count = resolved.unnamed, "skipping board entries without an id");
        }

        let events = EventBus::new(config.event_capacity);
        let mut registry = BoardRegistry::default();
        for (id, definition) in resolved.entries {
            let board = build_board(&host, &events, factory.as_ref(), id.clone(), definition);
            registry.insert(id, board);
        }
        tracing::debug!(boards = registry.len(), "board registry built");

        let broker = BrokerEndpoint::new(config.broker.clone());
        {
            let broker = broker.clone();
            host.on_stop(move || async move { broker.shutdown() });
        }

        Ok(Arc::new(Self {
            host,
            config,
            broker,
            events,
            factory,
            registry: RwLock::new(registry),
        }))
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Constructs and wires a controller without registering it.
    ///
    /// The caller's definition is left untouched; the controller receives a
    /// normalized copy carrying the resolved id.
    pub fn create_board(
        &self,
        definition: &BoardDefinition,
        candidate_id: Option<&str>,
    ) -> Result<BoardRef, HubError> {
        let (id, normalized) =
            config::normalize(definition, candidate_id).ok_or(HubError::MissingBoardId)?;
        Ok(build_board(
            &self.host,
            &self.events,
            self.factory.as_ref(),
            id,
            normalized,
        ))
    }

    // -----------------------------------------------------------------------
    // Start protocol
    // -----------------------------------------------------------------------

    pub async fn start(&self, target: StartTarget) -> StartReport {
        match target {
            StartTarget::All => StartReport::All(self.start_all().await),
            StartTarget::Many(ids) => StartReport::All(self.start_many(&ids).await),
            StartTarget::Id(id) => StartReport::Single(self.start_board(id.as_str()).await),
            StartTarget::Definition { definition, id } => {
                StartReport::Single(self.start_definition(&definition, id.as_deref()).await)
            }
            StartTarget::Board(board) => StartReport::Single(self.start_controller(board).await),
        }
    }

    /// Starts every registered board concurrently and waits for all of them
    /// to settle. Never fails as a whole.
    pub async fn start_all(&self) -> Settlement {
        let snapshot = self.registry.read().await.snapshot();
        tracing::info!(boards = snapshot.len(), "starting all boards");
        self.settle(
            snapshot
                .into_iter()
                .map(|(id, board)| (id, Some(board)))
                .collect(),
        )
        .await
    }

    /// Starts the listed boards concurrently and settles them in list order.
    /// Ids that are not registered are reported as rejected outcomes.
    pub async fn start_many(&self, ids: &[BoardId]) -> Settlement {
        let targets: Vec<_> = {
            let registry = self.registry.read().await;
            ids.iter()
                .map(|id| (id.clone(), registry.get(id.as_str())))
                .collect()
        };
        tracing::info!(boards = ids.len(), "starting listed boards");
        self.settle(targets).await
    }

    /// Spawns `start()` for every resolved board, then joins the tasks in
    /// input order so the settlement mirrors it regardless of completion
    /// order.
    async fn settle(&self, targets: Vec<(BoardId, Option<BoardRef>)>) -> Settlement {
        let tasks: Vec<_> = targets
            .into_iter()
            .map(|(id, board)| {
                let task = board.map(|board| {
                    let starting = board.clone();
                    (board, tokio::spawn(async move { starting.start().await }))
                });
                (id, task)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (id, task) in tasks {
            let result = match task {
                Some((board, handle)) => match handle.await {
                    Ok(Ok(())) => Ok(board),
                    Ok(Err(err)) => Err(Arc::new(err)),
                    Err(join) => Err(Arc::new(BoardError::Panicked {
                        board: id.clone(),
                        reason: join.to_string(),
                    })),
                },
                None => Err(Arc::new(BoardError::NotRegistered { board: id.clone() })),
            };
            if let Err(err) = &result {
                tracing::warn!(board = %id, error = %err, "board failed to start");
                self.events.publish(HubEvent::StartFailed {
                    board: id.clone(),
                    error: err.clone(),
                });
            }
            outcomes.push(BoardOutcome { id, result });
        }

        Settlement { outcomes }
    }

    /// Starts one registered board; its failure is returned to the caller.
    pub async fn start_board(&self, id: &str) -> Result<BoardRef, HubError> {
        let board = self
            .board(id)
            .await
            .ok_or_else(|| HubError::BoardNotFound { id: id.to_string() })?;
        self.start_controller(board).await
    }

    /// Constructs a board from `definition`, registers it, then starts it.
    ///
    /// An id that is already registered is replaced (last write wins) unless
    /// the config sets `strict_ids`, in which case nothing is constructed. A
    /// replaced controller is stopped.
    pub async fn start_definition(
        &self,
        definition: &BoardDefinition,
        id: Option<&str>,
    ) -> Result<BoardRef, HubError> {
        let (board_id, normalized) =
            config::normalize(definition, id).ok_or(HubError::MissingBoardId)?;
        let (board, replaced) = {
            let mut registry = self.registry.write().await;
            if self.config.strict_ids && registry.contains(board_id.as_str()) {
                return Err(HubError::DuplicateBoardId { id: board_id.0 });
            }
            let board = build_board(
                &self.host,
                &self.events,
                self.factory.as_ref(),
                board_id.clone(),
                normalized,
            );
            let replaced = registry.insert(board_id.clone(), board.clone());
            (board, replaced)
        };
        if let Some(replaced) = replaced {
            tracing::warn!(board = %board_id, "replacing registered board");
            replaced.stop().await;
        }
        self.events.publish(HubEvent::BoardRegistered(board_id));
        self.start_controller(board).await
    }

    pub async fn start_controller(&self, board: BoardRef) -> Result<BoardRef, HubError> {
        board.start().await?;
        Ok(board)
    }

    /// Stops every registered board. Boards stay registered.
    pub async fn stop_all(&self) {
        let snapshot = self.registry.read().await.snapshot();
        for (_, board) in snapshot {
            board.stop().await;
        }
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub async fn board(&self, id: &str) -> Option<BoardRef> {
        self.registry.read().await.get(id)
    }

    pub async fn boards(&self) -> Vec<BoardRef> {
        self.registry
            .read()
            .await
            .snapshot()
            .into_iter()
            .map(|(_, board)| board)
            .collect()
    }

    pub async fn ids(&self) -> Vec<BoardId> {
        self.registry.read().await.ids()
    }

    pub async fn len(&self) -> usize {
        self.registry.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.registry.read().await.is_empty()
    }

    pub async fn statuses(&self) -> Vec<BoardStatus> {
        self.boards().await.iter().map(|board| board.status()).collect()
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn broker(&self) -> &BrokerEndpoint {
        &self.broker
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    /// Binds the broker endpoint (if configured) with this orchestrator as
    /// its command handler. Returns the socket path when one was bound.
    pub async fn serve_broker(self: &Arc<Self>) -> Result<Option<PathBuf>, HubError> {
        let handler: Weak<dyn BrokerHandler> = Arc::downgrade(self) as Weak<dyn BrokerHandler>;
        self.broker.serve(handler).await
    }
}

#[async_trait]
impl BrokerHandler for Orchestrator {
    async fn handle(&self, command: BrokerCommand) -> BrokerReply {
        match command {
            BrokerCommand::Status => BrokerReply::Status(HubStatus {
                running: !self.host.is_stopped(),
                boards: self.statuses().await,
            }),
            BrokerCommand::Start { boards } => {
                let settlement = if boards.is_empty() {
                    self.start_all().await
                } else {
                    self.start_many(&boards).await
                };
                BrokerReply::Started {
                    boards: settlement.reports(),
                }
            }
            BrokerCommand::Stop => {
                let host = self.host.clone();
                tokio::spawn(async move { host.stop().await });
                BrokerReply::Stopping
            }
        }
    }
}

/// Constructs a controller and wires its events and host teardown.
fn build_board(
    host: &Host,
    events: &EventBus,
    factory: &dyn BoardFactory,
    id: BoardId,
    definition: BoardDefinition,
) -> BoardRef {
    let emitter = BoardEmitter::new(id.clone(), events.clone());
    let ctx = BoardContext {
        id,
        host: host.clone(),
        emitter: emitter.clone(),
    };
    let board = factory.create(ctx, definition);
    emitter.bind(&board);

    let weak = Arc::downgrade(&board);
    host.on_stop(move || async move {
        if let Some(board) = weak.upgrade() {
            board.stop().await;
        }
    });
    board
}
