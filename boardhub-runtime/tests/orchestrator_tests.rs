//! Orchestrator registry construction, start protocol and event forwarding.
//!
//! Boards here are scripted through their definition:
//! `outcome: ok | fail | panic` and optional `delay_ms`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::broadcast;

use boardhub_core::{BoardDefinition, BoardId, HubConfig};
use boardhub_runtime::{
    BoardContext, BoardController, BoardEmitter, BoardError, BoardFactory, BoardRef, BoardState,
    Host, HubError, HubEvent, Orchestrator, StartReport, StartTarget, VirtualBoardFactory,
};

// ---------------------------------------------------------------------------
// Scripted board
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Counters {
    created: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

struct ScriptedBoard {
    id: BoardId,
    definition: BoardDefinition,
    emitter: BoardEmitter,
    state: Mutex<BoardState>,
    counters: Arc<Counters>,
}

#[async_trait]
impl BoardController for ScriptedBoard {
    fn id(&self) -> &BoardId {
        &self.id
    }

    fn port(&self) -> Option<u16> {
        (self.state() == BoardState::Ready).then_some(4000)
    }

    fn state(&self) -> BoardState {
        *self.state.lock().unwrap()
    }

    async fn start(&self) -> Result<(), BoardError> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        if self.state() == BoardState::Ready {
            return Ok(());
        }
        *self.state.lock().unwrap() = BoardState::Starting;
        if let Some(ms) = self.definition.get_u64("delay_ms") {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        match self.definition.get_str("outcome").unwrap_or("ok") {
            "fail" => {
                *self.state.lock().unwrap() = BoardState::Failed;
                let err = BoardError::Connect {
                    board: self.id.clone(),
                    reason: "port busy".to_string(),
                };
                self.emitter.error(err.clone());
                Err(err)
            }
            "panic" => panic!("firmware exploded"),
            _ => {
                *self.state.lock().unwrap() = BoardState::Ready;
                self.emitter.ready();
                Ok(())
            }
        }
    }

    async fn stop(&self) {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = BoardState::Stopped;
    }
}

#[derive(Default)]
struct ScriptedFactory {
    counters: Arc<Counters>,
}

impl BoardFactory for ScriptedFactory {
    fn create(&self, ctx: BoardContext, definition: BoardDefinition) -> BoardRef {
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Arc::new(ScriptedBoard {
            id: ctx.id,
            definition,
            emitter: ctx.emitter,
            state: Mutex::new(BoardState::NotStarted),
            counters: self.counters.clone(),
        })
    }
}

fn hub(config: serde_json::Value) -> (Arc<Orchestrator>, Host, Arc<Counters>) {
    let config: HubConfig = serde_json::from_value(config).expect("config");
    let factory = ScriptedFactory::default();
    let counters = factory.counters.clone();
    let host = Host::new();
    let hub = Orchestrator::new(host.clone(), config, Arc::new(factory)).expect("orchestrator");
    (hub, host, counters)
}

fn drain(rx: &mut broadcast::Receiver<HubEvent>) -> Vec<HubEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn ids(boards: &[BoardRef]) -> Vec<String> {
    boards.iter().map(|b| b.id().0.clone()).collect()
}

// ---------------------------------------------------------------------------
// 1. Registry construction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn registry_keeps_only_object_entries() {
    let (hub, _, _) = hub(json!({
        "boards": { "a": { "type": "x" }, "junk": [1, 2, 3], "b": "_" }
    }));
    assert_eq!(hub.len().await, 1);
    assert!(hub.board("a").await.is_some());
}

#[tokio::test]
async fn absent_boards_builds_empty_registry() {
    let (hub, _, _) = hub(json!({}));
    assert!(hub.is_empty().await);
    assert!(hub.start_all().await.is_empty());
}

#[tokio::test]
async fn key_becomes_board_id_and_definition_is_normalized() {
    let (hub, _, _) = hub(json!({ "boards": { "uno": { "type": "x" } } }));
    let board = hub.board("uno").await.expect("uno");
    assert_eq!(board.id().as_str(), "uno");
}

#[tokio::test]
async fn strict_ids_rejects_duplicates_at_construction() {
    let config: HubConfig = serde_json::from_value(json!({
        "strict_ids": true,
        "boards": { "a": {}, "": { "id": "a" } }
    }))
    .expect("config");
    let result = Orchestrator::new(Host::new(), config, Arc::new(ScriptedFactory::default()));
    assert!(matches!(result, Err(HubError::Config(_))));
}

#[tokio::test]
async fn create_board_uses_candidate_and_does_not_register() {
    let (hub, _, _) = hub(json!({}));
    let definition = BoardDefinition::new().set("type", "x");

    let board = hub.create_board(&definition, Some("cand")).expect("create");

    assert_eq!(board.id().as_str(), "cand");
    assert_eq!(definition.id(), None, "caller's definition must not be mutated");
    assert!(hub.is_empty().await);
}

#[tokio::test]
async fn create_board_without_any_id_fails() {
    let (hub, _, _) = hub(json!({}));
    let err = hub.create_board(&BoardDefinition::new(), None).err().expect("error");
    assert!(matches!(err, HubError::MissingBoardId));
}

// ---------------------------------------------------------------------------
// 2. Start all
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_all_isolates_failures_and_keeps_registry_order() {
    let (hub, _, _) = hub(json!({
        "boards": {
            "d": { "outcome": "ok", "delay_ms": 30 },
            "c": { "outcome": "fail" },
            "b": { "outcome": "ok" },
            "a": { "outcome": "fail", "delay_ms": 10 }
        }
    }));

    let settlement = hub.start_all().await;

    let order: Vec<&str> = settlement.outcomes.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(order, ["d", "c", "b", "a"]);
    assert_eq!(settlement.len(), 4);
    assert_eq!(settlement.rejected().count(), 2);
    for id in ["d", "b"] {
        let board = hub.board(id).await.expect("board");
        assert_eq!(board.state(), BoardState::Ready, "{id} must reach ready");
    }
}

#[tokio::test]
async fn start_all_events_fire_once_per_board() {
    let (hub, _, _) = hub(json!({
        "boards": { "a": { "outcome": "ok" }, "b": { "outcome": "fail" } }
    }));
    let mut rx = hub.subscribe();

    let settlement = hub.start_all().await;

    assert!(settlement.get("a").expect("a").is_fulfilled());
    assert!(!settlement.get("b").expect("b").is_fulfilled());

    let events = drain(&mut rx);
    let ready: Vec<BoardId> = events
        .iter()
        .filter_map(|e| match e {
            HubEvent::Ready(board) => Some(board.id().clone()),
            _ => None,
        })
        .collect();
    let errors: Vec<BoardId> = events
        .iter()
        .filter_map(|e| match e {
            HubEvent::Error { board, .. } => Some(board.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(ready, vec![BoardId::from("a")]);
    assert_eq!(errors, vec![BoardId::from("b")]);
    assert!(events
        .iter()
        .any(|e| matches!(e, HubEvent::StartFailed { board, .. } if board.as_str() == "b")));
}

#[tokio::test]
async fn panicking_board_is_reported_as_failed() {
    let (hub, _, _) = hub(json!({
        "boards": { "ok": {}, "boom": { "outcome": "panic" } }
    }));

    let settlement = hub.start_all().await;

    assert!(settlement.get("ok").expect("ok").is_fulfilled());
    let boom = settlement.get("boom").expect("boom");
    match &boom.result {
        Err(err) => assert!(matches!(**err, BoardError::Panicked { .. })),
        Ok(_) => panic!("panicking board must not be fulfilled"),
    }
}

#[tokio::test(start_paused = true)]
async fn board_registered_during_sweep_is_not_included() {
    let (hub, _, counters) = hub(json!({
        "boards": { "slow": { "delay_ms": 50 } }
    }));

    let sweep = {
        let hub = hub.clone();
        tokio::spawn(async move { hub.start_all().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    hub.start_definition(&BoardDefinition::new(), Some("late"))
        .await
        .expect("late start");

    let settlement = sweep.await.expect("join");
    assert_eq!(settlement.len(), 1);
    assert!(settlement.get("late").is_none());
    assert_eq!(hub.len().await, 2);
    assert_eq!(counters.starts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn start_many_settles_in_list_order_with_unknown_ids_rejected() {
    let (hub, _, counters) = hub(json!({
        "boards": {
            "a": { "outcome": "ok", "delay_ms": 20 },
            "b": { "outcome": "fail" },
            "c": { "outcome": "ok" }
        }
    }));
    let mut rx = hub.subscribe();

    let settlement = hub
        .start_many(&[BoardId::from("b"), BoardId::from("ghost"), BoardId::from("a")])
        .await;

    let order: Vec<&str> = settlement.outcomes.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(order, ["b", "ghost", "a"]);
    assert!(settlement.get("a").expect("a").is_fulfilled());
    match &settlement.get("ghost").expect("ghost").result {
        Err(err) => assert!(matches!(**err, BoardError::NotRegistered { .. })),
        Ok(_) => panic!("unknown id must be rejected"),
    }
    assert_eq!(settlement.rejected().count(), 2);
    assert_eq!(counters.starts.load(Ordering::SeqCst), 2, "c is not in the list");
    assert_eq!(
        hub.board("c").await.expect("c").state(),
        BoardState::NotStarted
    );
    let failed = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, HubEvent::StartFailed { .. }))
        .count();
    assert_eq!(failed, 2);
}

#[tokio::test]
async fn start_target_many_reports_a_settlement() {
    let (hub, _, _) = hub(json!({ "boards": { "a": {}, "b": {} } }));
    let ids = vec![BoardId::from("a"), BoardId::from("b")];
    match hub.start(ids.into()).await {
        StartReport::All(settlement) => {
            assert_eq!(settlement.fulfilled().count(), 2);
            assert_eq!(settlement.reports().len(), 2);
        }
        StartReport::Single(_) => panic!("expected settlement"),
    }
}

// ---------------------------------------------------------------------------
// 3. Single-board starts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_unknown_id_is_not_found() {
    let (hub, _, _) = hub(json!({ "boards": { "a": {} } }));
    let err = hub.start_board("ghost").await.err().expect("error");
    assert!(matches!(err, HubError::BoardNotFound { ref id } if id == "ghost"));
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn single_board_failure_propagates() {
    let (hub, _, _) = hub(json!({ "boards": { "b": { "outcome": "fail" } } }));
    let err = hub.start_board("b").await.err().expect("error");
    assert!(matches!(err, HubError::Board(_)));
    assert!(err.to_string().contains("port busy"));
}

#[tokio::test]
async fn start_definition_grows_registry_by_one() {
    let (hub, _, _) = hub(json!({ "boards": { "a": {} } }));
    let mut rx = hub.subscribe();

    let board = hub
        .start_definition(&BoardDefinition::new().set("id", "new"), None)
        .await
        .expect("start");

    assert_eq!(board.state(), BoardState::Ready);
    assert_eq!(hub.len().await, 2);
    assert!(hub.board("new").await.is_some());
    assert_eq!(ids(&hub.boards().await), ["a", "new"]);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, HubEvent::BoardRegistered(id) if id.as_str() == "new")));
}

#[tokio::test]
async fn strict_duplicate_is_rejected_before_construction() {
    let (hub, _, counters) = hub(json!({ "strict_ids": true, "boards": { "a": {} } }));
    assert_eq!(counters.created.load(Ordering::SeqCst), 1);

    let err = hub
        .start_definition(&BoardDefinition::new(), Some("a"))
        .await
        .err()
        .expect("error");

    assert!(matches!(err, HubError::DuplicateBoardId { .. }));
    assert_eq!(hub.len().await, 1);
    assert_eq!(
        counters.created.load(Ordering::SeqCst),
        1,
        "a rejected duplicate must not build a controller"
    );
}

#[tokio::test]
async fn replacing_a_board_stops_the_previous_controller() {
    let (hub, _, counters) = hub(json!({ "boards": { "a": {}, "b": {} } }));
    hub.start_board("a").await.expect("start a");
    let previous = hub.board("a").await.expect("a");

    let replacement = hub
        .start_definition(&BoardDefinition::new().set("rev", 2), Some("a"))
        .await
        .expect("replace");

    assert_eq!(previous.state(), BoardState::Stopped);
    assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    assert_eq!(replacement.state(), BoardState::Ready);
    assert!(Arc::ptr_eq(&hub.board("a").await.expect("a"), &replacement));
    assert_eq!(ids(&hub.boards().await), ["a", "b"], "replacement keeps its slot");
}

#[tokio::test]
async fn start_dispatches_every_target_shape() {
    let (hub, _, _) = hub(json!({ "boards": { "a": {}, "b": {} } }));

    match hub.start(StartTarget::All).await {
        StartReport::All(settlement) => assert_eq!(settlement.fulfilled().count(), 2),
        StartReport::Single(_) => panic!("expected settlement"),
    }

    match hub.start("a".into()).await {
        StartReport::Single(result) => assert_eq!(result.expect("a").id().as_str(), "a"),
        StartReport::All(_) => panic!("expected single"),
    }

    let definition = BoardDefinition::new().set("type", "x");
    match hub
        .start(StartTarget::Definition {
            definition,
            id: Some("c".to_string()),
        })
        .await
    {
        StartReport::Single(result) => assert_eq!(result.expect("c").id().as_str(), "c"),
        StartReport::All(_) => panic!("expected single"),
    }

    let existing = hub.board("b").await.expect("b");
    match hub.start(StartTarget::Board(existing)).await {
        StartReport::Single(result) => assert!(result.is_ok()),
        StartReport::All(_) => panic!("expected single"),
    }
    assert_eq!(hub.len().await, 3);
}

#[tokio::test]
async fn start_on_ready_board_delegates_without_reconnecting() {
    let (hub, _, counters) = hub(json!({ "boards": { "a": {} } }));
    let mut rx = hub.subscribe();

    hub.start_board("a").await.expect("first");
    hub.start_board("a").await.expect("second");

    assert_eq!(counters.starts.load(Ordering::SeqCst), 2);
    let ready = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, HubEvent::Ready(_)))
        .count();
    assert_eq!(ready, 1, "a ready board must not re-announce readiness");
}

// ---------------------------------------------------------------------------
// 4. Host lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn host_stop_cascades_to_every_board() {
    let (hub, host, counters) = hub(json!({ "boards": { "a": {}, "b": {} } }));
    hub.start_all().await;
    hub.start_definition(&BoardDefinition::new(), Some("late"))
        .await
        .expect("late");

    host.stop().await;

    assert_eq!(counters.stops.load(Ordering::SeqCst), 3);
    for board in hub.boards().await {
        assert_eq!(board.state(), BoardState::Stopped);
    }
    assert_eq!(hub.len().await, 3, "stop must not deregister");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connecting_board_does_not_block_host_stop() {
    let config: HubConfig = serde_json::from_value(json!({
        "boards": { "stuck": { "delay_ms": 600_000 }, "fine": {} }
    }))
    .expect("config");
    let host = Host::new();
    let hub = Orchestrator::new(host.clone(), config, Arc::new(VirtualBoardFactory))
        .expect("orchestrator");

    hub.start_board("fine").await.expect("fine");
    let stuck = hub.board("stuck").await.expect("stuck");
    let pending = {
        let stuck = stuck.clone();
        tokio::spawn(async move { stuck.start().await })
    };
    while stuck.state() != BoardState::Starting {
        tokio::task::yield_now().await;
    }

    tokio::time::timeout(Duration::from_secs(2), host.stop())
        .await
        .expect("host stop must not wait on a connecting board");

    assert_eq!(hub.board("fine").await.expect("fine").state(), BoardState::Stopped);
    assert_eq!(stuck.state(), BoardState::Stopped);
    let aborted = pending.await.expect("join").unwrap_err();
    assert!(matches!(aborted, BoardError::Aborted { .. }), "got: {aborted}");
}

#[tokio::test]
async fn stop_all_keeps_registry() {
    let (hub, _, counters) = hub(json!({ "boards": { "a": {}, "b": {} } }));
    hub.start_all().await;
    hub.stop_all().await;
    assert_eq!(counters.stops.load(Ordering::SeqCst), 2);
    assert_eq!(hub.len().await, 2);
}
