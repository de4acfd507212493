// Shared fixtures for the session integration tests: an in-memory GameApi,
// a fake transport, and wire JSON builders.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use courtside_core::model::{GameView, Mirror};
use courtside_core::projection::ProjectionOptions;
use courtside_sync::api::{ApiError, GameApi, Mutation, MutationReply};
use courtside_sync::session::GameSession;
use courtside_sync::transport::TransportEvent;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch, Semaphore};

// ===========================================================================
// FakeApi
// ===========================================================================

/// Serves stored snapshots and answers mutations from a script. Mutations
/// wait on a gate so tests can observe the optimistic state before the
/// server answers.
pub struct FakeApi {
    snapshots: Mutex<HashMap<String, GameView>>,
    replies: Mutex<VecDeque<Result<MutationReply, ApiError>>>,
    calls: Mutex<Vec<String>>,
    answered: AtomicUsize,
    gate: Semaphore,
}

impl FakeApi {
    /// Mutations answer immediately.
    pub fn open() -> Arc<Self> {
        Arc::new(Self::with_permits(1_000_000))
    }

    /// Mutations block until `release` is called.
    pub fn held() -> Arc<Self> {
        Arc::new(Self::with_permits(0))
    }

    fn with_permits(permits: usize) -> Self {
        Self {
            snapshots: Mutex::new(HashMap::new()),
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            answered: AtomicUsize::new(0),
            gate: Semaphore::new(permits),
        }
    }

    pub fn store(&self, view: GameView) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(view.game.id.clone(), view);
    }

    /// Queue the reply for the next mutation. Unscripted mutations succeed
    /// with `MutationReply::Done`.
    pub fn script(&self, reply: Result<MutationReply, ApiError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn release(&self) {
        self.gate.add_permits(1_000);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Mutations that have returned a reply.
    pub fn answered(&self) -> usize {
        self.answered.load(Ordering::SeqCst)
    }

    pub fn fetches(&self, game_id: &str) -> usize {
        let key = format!("fetch {game_id}");
        self.calls().iter().filter(|c| **c == key).count()
    }
}

#[async_trait]
impl GameApi for FakeApi {
    async fn fetch_game(&self, game_id: &str) -> Result<GameView, ApiError> {
        self.calls.lock().unwrap().push(format!("fetch {game_id}"));
        self.snapshots
            .lock()
            .unwrap()
            .get(game_id)
            .cloned()
            .ok_or(ApiError::Rejected {
                status: 404,
                message: "Game not found".into(),
            })
    }

    async fn execute(
        &self,
        game_id: &str,
        mutation: &Mutation,
    ) -> Result<MutationReply, ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{game_id}: {}", mutation.describe()));
        let _permit = self.gate.acquire().await.unwrap();
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(MutationReply::Done));
        self.answered.fetch_add(1, Ordering::SeqCst);
        reply
    }
}

// ===========================================================================
// Harness
// ===========================================================================

pub struct Harness {
    pub session: GameSession,
    pub transport: mpsc::Sender<TransportEvent>,
    pub sent: mpsc::UnboundedReceiver<String>,
    pub api: Arc<FakeApi>,
}

impl Harness {
    pub fn new(api: Arc<FakeApi>) -> Self {
        let (transport, events) = mpsc::channel(64);
        let (outbound, sent) = mpsc::unbounded_channel();
        let session = GameSession::with_parts(
            events,
            outbound,
            api.clone(),
            ProjectionOptions::default(),
        );
        Self {
            session,
            transport,
            sent,
            api,
        }
    }

    pub async fn emit(&self, event: TransportEvent) {
        self.transport.send(event).await.unwrap();
    }

    pub async fn push(&self, frame: String) {
        self.emit(TransportEvent::Frame(frame)).await;
    }

    /// Event names of every frame written so far.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(frame) = self.sent.try_recv() {
            let value: Value = serde_json::from_str(&frame).unwrap();
            names.push(value["event"].as_str().unwrap().to_string());
        }
        names
    }

    /// Wait until a frame with event name `name` is written.
    pub async fn expect_sent(&mut self, name: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let frame = self.sent.recv().await.expect("outbound closed");
                let value: Value = serde_json::from_str(&frame).unwrap();
                if value["event"] == name {
                    return;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no `{name}` frame was sent"));
    }
}

/// Wait until the published mirror satisfies `pred`.
pub async fn wait_for(
    rx: &mut watch::Receiver<Mirror>,
    pred: impl Fn(&Mirror) -> bool,
) -> Mirror {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let current = rx.borrow().clone();
            if pred(&current) {
                return current;
            }
            rx.changed().await.expect("session stopped publishing");
        }
    })
    .await
    .expect("mirror never reached the expected state")
}

pub fn is_live(mirror: &Mirror) -> bool {
    mirror.view().is_some()
}

/// Poll `cond` until it holds.
pub async fn eventually(cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}

// ===========================================================================
// Wire JSON
// ===========================================================================

pub fn lineup(id: i64, team: &str, number: u32, name: &str) -> Value {
    json!({
        "id": id,
        "team": team,
        "number": number,
        "member_name": name,
        "playing_status": "PLAYING",
        "arrived_at": "2024-05-04T19:00:00Z",
    })
}

pub fn game(game_id: &str, status: &str) -> Value {
    json!({
        "id": game_id,
        "status": status,
        "team_home": "Hawks",
        "team_away": "Owls",
        "current_quarter": 0,
        "created_at": "2024-05-04T18:00:00Z",
    })
}

pub fn snapshot_json(game_id: &str, home: Vec<Value>, away: Vec<Value>, quarters: Vec<Value>) -> Value {
    json!({
        "game": game(game_id, "IN_PROGRESS"),
        "lineups": {"home": home, "away": away},
        "quarters": quarters,
    })
}

pub fn view(data: Value) -> GameView {
    serde_json::from_value(data).unwrap()
}

/// Two home players and one away player, no quarters.
pub fn starting_view(game_id: &str) -> GameView {
    view(snapshot_json(
        game_id,
        vec![lineup(1, "HOME", 1, "Yoon"), lineup(2, "HOME", 2, "Baek")],
        vec![lineup(3, "AWAY", 1, "Choi")],
        vec![],
    ))
}

/// A `game_update` frame carrying one event.
pub fn update(kind: &str, data: Value) -> String {
    json!({"event": "game_update", "data": {"type": kind, "data": data}}).to_string()
}

/// A top-level `game_state` frame.
pub fn state_frame(data: Value) -> String {
    json!({"event": "game_state", "data": data}).to_string()
}
