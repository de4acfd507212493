// Game session: the single writer that owns the mirror.
//
// One task runs `run`, selecting over transport events, user commands and
// REST completions. Reducer application, optimistic patches and rollbacks
// all happen here, so they never interleave. Consumers hold a
// `GameSubscription` and observe the mirror through a watch channel.

use std::sync::Arc;

use courtside_core::event::ServerEvent;
use courtside_core::lineup::{QuarterPlan, Transfer};
use courtside_core::model::{GameId, LineupId, Mirror, Score};
use courtside_core::projection::{project, GameProjection, ProjectionOptions};
use courtside_core::reducer::reduce;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ArrivalRequest, GameApi, HttpGameApi, Mutation};
use crate::channel::{ChannelManager, JoinKind};
use crate::config::Config;
use crate::coordinator::{Completion, Coordinator, MutationError, MutationResult};
use crate::protocol::{decode_frame, Inbound};
use crate::transport::{ReconnectPolicy, TransportEvent, WsTransport};

/// Requests from subscription handles to the session task.
///
/// Handle commands carry the generation the handle was opened under. A
/// handle outlives its generation when its game is closed or another game is
/// opened; its commands are then ignored even if the same game was opened
/// again since.
#[derive(Debug)]
pub enum SessionCommand {
    Open {
        game_id: GameId,
        reply: oneshot::Sender<Opened>,
    },
    Close {
        game_id: GameId,
        generation: u64,
    },
    Mutate {
        game_id: GameId,
        generation: u64,
        mutation: Mutation,
        reply: oneshot::Sender<MutationResult>,
    },
    Reconcile {
        game_id: GameId,
        generation: u64,
    },
    Shutdown,
}

/// Answer to [`SessionCommand::Open`].
#[derive(Debug)]
pub struct Opened {
    pub mirror: watch::Receiver<Mirror>,
    pub generation: u64,
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Everything the session task owns.
pub struct SessionState {
    channel: ChannelManager,
    coordinator: Coordinator,
    mirror: Mirror,
    publisher: Option<watch::Sender<Mirror>>,
    /// Live subscriptions to the open game.
    subscribers: usize,
}

impl SessionState {
    pub fn new(channel: ChannelManager, coordinator: Coordinator) -> Self {
        Self {
            channel,
            coordinator,
            mirror: Mirror::Pending,
            publisher: None,
            subscribers: 0,
        }
    }

    fn open_game(&self) -> Option<&str> {
        self.channel.game_id()
    }

    /// Whether a handle opened for `game_id` under `generation` still
    /// belongs to the open subscription.
    fn is_current(&self, game_id: &str, generation: u64) -> bool {
        self.open_game() == Some(game_id) && self.coordinator.generation() == generation
    }

    fn publish(&self) {
        if let Some(publisher) = &self.publisher {
            publisher.send_replace(self.mirror.clone());
        }
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                if let Some(JoinKind::Rejoin) = self.channel.on_connected() {
                    info!("Rejoined after reconnect, awaiting snapshot");
                }
            }
            TransportEvent::Disconnected => self.channel.on_disconnected(),
            TransportEvent::Reconnecting { attempt } => self.channel.on_reconnecting(attempt),
            TransportEvent::GaveUp => {
                warn!("Realtime channel gave up, falling back to REST");
                self.channel.on_gave_up();
                self.reconcile();
            }
            TransportEvent::Frame(text) => self.handle_frame(&text),
        }
    }

    fn handle_frame(&mut self, text: &str) {
        match decode_frame(text) {
            Ok(Inbound::Event(event)) => self.apply_event(event),
            Ok(Inbound::Joined { game_id }) => debug!("Server confirmed join of {game_id:?}"),
            Ok(Inbound::ServerError(message)) => warn!("Server error: {message}"),
            Ok(Inbound::Ignored) => {}
            Err(e) => warn!("Dropping malformed frame: {e}"),
        }
    }

    /// Run one event through the channel gate and the reducer.
    pub fn apply_event(&mut self, event: ServerEvent) {
        if !self.channel.accept(&event) {
            return;
        }

        let out = reduce(&self.mirror, &event);
        if !out.resync {
            self.coordinator.supersede(&event);
        }
        if out.mirror != self.mirror {
            debug!("Applied `{}`", event.kind());
            if out.mirror.is_gone() {
                info!("Game was deleted");
            }
            self.mirror = out.mirror;
            self.publish();
        }
        if out.resync {
            self.reconcile();
        }
    }

    /// Bring the mirror back in step with the server: a socket
    /// `request_game_state` when joined, a REST fetch otherwise.
    pub fn reconcile(&mut self) {
        let Some(game_id) = self.open_game().map(str::to_string) else {
            return;
        };
        if self.mirror.is_gone() {
            return;
        }
        if self.channel.request_snapshot() {
            info!("Requested snapshot of {game_id} over the socket");
        } else {
            info!("Fetching snapshot of {game_id} over REST");
            self.coordinator.fetch_snapshot(&game_id);
        }
    }

    pub fn handle_completion(&mut self, completion: Completion) {
        let settlement = self.coordinator.settle(&mut self.mirror, completion);
        if settlement.changed {
            self.publish();
        }
        if let Some(view) = settlement.snapshot {
            self.apply_event(ServerEvent::GameState(view));
        }
        if settlement.reconcile {
            self.reconcile();
        }
    }

    pub fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Open { game_id, reply } => {
                let mirror = self.open(&game_id);
                let _ = reply.send(Opened {
                    mirror,
                    generation: self.coordinator.generation(),
                });
            }
            SessionCommand::Close {
                game_id,
                generation,
            } => self.close(&game_id, generation),
            SessionCommand::Mutate {
                game_id,
                generation,
                mutation,
                reply,
            } => {
                if !self.is_current(&game_id, generation) {
                    let _ = reply.send(Err(MutationError::Detached {
                        operation: mutation.describe(),
                    }));
                    return;
                }
                if self
                    .coordinator
                    .begin(&game_id, &mut self.mirror, mutation, reply)
                {
                    self.publish();
                }
            }
            SessionCommand::Reconcile {
                game_id,
                generation,
            } => {
                if self.is_current(&game_id, generation) {
                    self.reconcile();
                }
            }
            SessionCommand::Shutdown => {}
        }
    }

    fn open(&mut self, game_id: &str) -> watch::Receiver<Mirror> {
        if self.open_game() == Some(game_id) {
            if let Some(publisher) = &self.publisher {
                self.subscribers += 1;
                return publisher.subscribe();
            }
        }

        info!("Opening game {game_id}");
        self.coordinator.detach_all();
        self.channel.open(game_id);
        self.mirror = Mirror::Pending;
        self.subscribers = 1;

        let (publisher, rx) = watch::channel(Mirror::Pending);
        self.publisher = Some(publisher);

        // Initial load over REST; the socket snapshot may win the race.
        self.coordinator.fetch_snapshot(game_id);
        rx
    }

    fn close(&mut self, game_id: &str, generation: u64) {
        if !self.is_current(game_id, generation) {
            debug!("Ignoring close of {game_id} from an earlier subscription (gen {generation})");
            return;
        }
        self.subscribers = self.subscribers.saturating_sub(1);
        if self.subscribers > 0 {
            return;
        }

        info!("Closing game {game_id}");
        self.channel.close();
        self.coordinator.detach_all();
        self.mirror = Mirror::Pending;
        self.publisher = None;
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the session loop until `Shutdown` or until every handle is gone.
///
/// Listens on three channels using `tokio::select!`:
/// 1. Transport events (connection transitions and frames)
/// 2. Commands from `GameSession` / `GameSubscription` handles
/// 3. Completions of REST calls spawned by the coordinator
pub async fn run(
    mut state: SessionState,
    mut events: mpsc::Receiver<TransportEvent>,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    mut completions: mpsc::UnboundedReceiver<Completion>,
) {
    info!("Session loop started");

    // The transport may stop for good; stop polling its channel then so
    // select! never spins on a closed receiver.
    let mut transport_open = true;

    loop {
        tokio::select! {
            // --- Transport events (only poll when channel is open) ---
            event = events.recv(), if transport_open => {
                match event {
                    Some(event) => state.handle_transport_event(event),
                    None => {
                        info!("Transport channel closed");
                        transport_open = false;
                        state.channel.on_gave_up();
                    }
                }
            }

            // --- Commands ---
            command = commands.recv() => {
                match command {
                    Some(SessionCommand::Shutdown) => {
                        info!("Shutdown requested");
                        break;
                    }
                    Some(command) => state.handle_command(command),
                    None => {
                        info!("All session handles dropped, shutting down");
                        break;
                    }
                }
            }

            // --- REST completions ---
            Some(completion) = completions.recv() => {
                state.handle_completion(completion);
            }
        }
    }

    state.coordinator.detach_all();
    state.channel.close();
    info!("Session loop exiting");
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Owner-side handle to a running session.
pub struct GameSession {
    commands: mpsc::UnboundedSender<SessionCommand>,
    options: ProjectionOptions,
    task: JoinHandle<()>,
}

impl GameSession {
    /// Spawn the WebSocket transport and the session loop for `config`.
    pub fn connect(config: &Config) -> GameSession {
        let transport = WsTransport::spawn(
            config.server.ws_url.clone(),
            ReconnectPolicy::from(&config.realtime),
            config.realtime.event_buffer,
        );
        let api: Arc<dyn GameApi> = Arc::new(HttpGameApi::new(config.server.api_url.clone()));
        GameSession::with_parts(
            transport.events,
            transport.outbound,
            api,
            config.display.clone(),
        )
    }

    /// Spawn the session loop over an existing transport and API.
    pub fn with_parts(
        events: mpsc::Receiver<TransportEvent>,
        outbound: mpsc::UnboundedSender<String>,
        api: Arc<dyn GameApi>,
        options: ProjectionOptions,
    ) -> GameSession {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let state = SessionState::new(ChannelManager::new(outbound), Coordinator::new(api, done_tx));
        let task = tokio::spawn(run(state, events, command_rx, done_rx));
        GameSession {
            commands,
            options,
            task,
        }
    }

    /// Open `game_id` (leaving any other game) and follow it.
    pub async fn subscribe(&self, game_id: &str) -> Result<GameSubscription, MutationError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Open {
                game_id: game_id.to_string(),
                reply,
            })
            .map_err(|_| MutationError::SessionClosed)?;
        let opened = rx.await.map_err(|_| MutationError::SessionClosed)?;
        Ok(GameSubscription {
            game_id: game_id.to_string(),
            generation: opened.generation,
            mirror: opened.mirror,
            commands: self.commands.clone(),
            options: self.options.clone(),
        })
    }

    /// Stop the session loop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.commands.send(SessionCommand::Shutdown);
        if let Err(e) = self.task.await {
            warn!("Session task ended abnormally: {e}");
        }
    }
}

/// A consumer's view of one game. Dropping it unsubscribes; the room is left
/// once the last subscription for the game is gone.
pub struct GameSubscription {
    game_id: GameId,
    generation: u64,
    mirror: watch::Receiver<Mirror>,
    commands: mpsc::UnboundedSender<SessionCommand>,
    options: ProjectionOptions,
}

impl GameSubscription {
    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn current(&self) -> Mirror {
        self.mirror.borrow().clone()
    }

    /// Wait for the next published mirror. Returns false once the session
    /// stopped or switched to another game.
    pub async fn changed(&mut self) -> bool {
        self.mirror.changed().await.is_ok()
    }

    /// The watch receiver, for consumers that select over it directly.
    pub fn receiver(&self) -> watch::Receiver<Mirror> {
        self.mirror.clone()
    }

    /// Render-ready projection of the current mirror, if a view is loaded.
    pub fn projection(&self) -> Option<GameProjection> {
        self.mirror
            .borrow()
            .view()
            .map(|view| project(view, &self.options))
    }

    /// Send a mutation and wait for it to settle.
    pub async fn mutate(&self, mutation: Mutation) -> MutationResult {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Mutate {
                game_id: self.game_id.clone(),
                generation: self.generation,
                mutation,
                reply,
            })
            .map_err(|_| MutationError::SessionClosed)?;
        rx.await.map_err(|_| MutationError::SessionClosed)?
    }

    /// Ask the session to resync this game from the server.
    pub fn reconcile(&self) {
        let _ = self.commands.send(SessionCommand::Reconcile {
            game_id: self.game_id.clone(),
            generation: self.generation,
        });
    }

    pub async fn arrive(&self, request: ArrivalRequest) -> MutationResult {
        self.mutate(Mutation::Arrival(request)).await
    }

    pub async fn remove(&self, lineup_id: LineupId) -> MutationResult {
        self.mutate(Mutation::Remove { lineup_id }).await
    }

    pub async fn toggle_status(&self, lineup_id: LineupId) -> MutationResult {
        self.mutate(Mutation::ToggleStatus { lineup_id }).await
    }

    pub async fn swap(&self, transfer: Transfer) -> MutationResult {
        self.mutate(Mutation::Swap(transfer)).await
    }

    pub async fn start_quarter(&self, plan: QuarterPlan) -> MutationResult {
        self.mutate(Mutation::StartQuarter(plan)).await
    }

    pub async fn end_quarter(&self, quarter: u32) -> MutationResult {
        self.mutate(Mutation::EndQuarter { quarter }).await
    }

    pub async fn cancel_quarter(&self, quarter: u32) -> MutationResult {
        self.mutate(Mutation::CancelQuarter { quarter }).await
    }

    pub async fn update_score(&self, quarter: u32, score: Score) -> MutationResult {
        self.mutate(Mutation::UpdateScore { quarter, score }).await
    }

    pub async fn start_game(
        &self,
        team_home: Option<String>,
        team_away: Option<String>,
    ) -> MutationResult {
        self.mutate(Mutation::StartGame {
            team_home,
            team_away,
        })
        .await
    }

    pub async fn end_game(&self) -> MutationResult {
        self.mutate(Mutation::EndGame).await
    }
}

impl Drop for GameSubscription {
    fn drop(&mut self) {
        let _ = self.commands.send(SessionCommand::Close {
            game_id: self.game_id.clone(),
            generation: self.generation,
        });
    }
}
