// Realtime channel manager: room membership for the open game over one
// socket.
//
// The manager reacts to transport transitions and decides what to emit
// (`join_game`, `leave_game`, `request_game_state`) and which incoming events
// may reach the reducer. It never sleeps or retries; timing belongs to the
// transport.

use courtside_core::event::ServerEvent;
use courtside_core::model::GameId;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::ClientMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No game open, or the transport gave up.
    Disconnected,
    /// A game is open and the socket is not up yet.
    Connecting,
    Joined,
    /// The socket dropped after a join; a rejoin follows the next connect.
    Reconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// First join for this game; the server pushes the initial snapshot.
    First,
    /// Join after a drop; a snapshot was requested and deltas are held back
    /// until it lands.
    Rejoin,
}

pub struct ChannelManager {
    state: ChannelState,
    game_id: Option<GameId>,
    transport_up: bool,
    joined_before: bool,
    awaiting_snapshot: bool,
    outbound: mpsc::UnboundedSender<String>,
}

impl ChannelManager {
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            state: ChannelState::Disconnected,
            game_id: None,
            transport_up: false,
            joined_before: false,
            awaiting_snapshot: false,
            outbound,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn game_id(&self) -> Option<&str> {
        self.game_id.as_deref()
    }

    pub fn is_joined(&self) -> bool {
        self.state == ChannelState::Joined
    }

    pub fn awaiting_snapshot(&self) -> bool {
        self.awaiting_snapshot
    }

    /// Start following `game_id`, leaving any other room first. Returns the
    /// join performed now, if the socket is up.
    pub fn open(&mut self, game_id: &str) -> Option<JoinKind> {
        if self.game_id.as_deref() == Some(game_id) {
            debug!("Game {game_id} already open");
            return None;
        }
        if self.game_id.is_some() {
            self.close();
        }

        self.game_id = Some(game_id.to_string());
        self.joined_before = false;
        self.awaiting_snapshot = false;

        if self.transport_up {
            Some(self.join())
        } else {
            self.state = ChannelState::Connecting;
            None
        }
    }

    /// Leave the current room. Safe to call with nothing open.
    pub fn close(&mut self) {
        let Some(game_id) = self.game_id.take() else {
            return;
        };
        if self.state == ChannelState::Joined {
            info!("Leaving game {game_id}");
            self.send(ClientMessage::LeaveGame { game_id });
        }
        self.state = ChannelState::Disconnected;
        self.joined_before = false;
        self.awaiting_snapshot = false;
    }

    pub fn on_connected(&mut self) -> Option<JoinKind> {
        self.transport_up = true;
        if self.game_id.is_none() {
            return None;
        }
        Some(self.join())
    }

    pub fn on_disconnected(&mut self) {
        self.transport_up = false;
        self.state = match (self.state, self.game_id.is_some()) {
            (_, false) => ChannelState::Disconnected,
            (ChannelState::Joined | ChannelState::Reconnecting, true) => {
                ChannelState::Reconnecting
            }
            (_, true) => ChannelState::Connecting,
        };
        info!("Socket down, channel {:?}", self.state);
    }

    pub fn on_reconnecting(&mut self, attempt: u32) {
        debug!("Reconnect attempt {attempt} ({:?})", self.state);
    }

    /// The transport stopped for good.
    pub fn on_gave_up(&mut self) {
        self.transport_up = false;
        self.state = ChannelState::Disconnected;
        self.awaiting_snapshot = false;
    }

    /// Ask the server for a fresh snapshot over the socket. Returns false when
    /// not joined; the caller must reconcile another way.
    pub fn request_snapshot(&mut self) -> bool {
        let Some(game_id) = self.game_id.clone() else {
            return false;
        };
        if !self.is_joined() {
            return false;
        }
        self.awaiting_snapshot = true;
        self.send(ClientMessage::RequestGameState { game_id });
        true
    }

    /// Whether `event` may be applied to the open game's mirror.
    pub fn accept(&mut self, event: &ServerEvent) -> bool {
        let Some(game_id) = self.game_id.as_deref() else {
            debug!("No game open, dropping `{}`", event.kind());
            return false;
        };

        if let ServerEvent::GameState(view) = event {
            if view.game.id != game_id {
                warn!(
                    "Dropping snapshot for game {} while following {game_id}",
                    view.game.id
                );
                return false;
            }
            self.awaiting_snapshot = false;
            return true;
        }

        if self.awaiting_snapshot {
            debug!("Awaiting snapshot, dropping `{}`", event.kind());
            return false;
        }
        true
    }

    fn join(&mut self) -> JoinKind {
        let Some(game_id) = self.game_id.clone() else {
            return JoinKind::First;
        };

        info!("Joining game {game_id}");
        self.send(ClientMessage::JoinGame {
            game_id: game_id.clone(),
        });
        self.state = ChannelState::Joined;

        if self.joined_before {
            self.awaiting_snapshot = true;
            self.send(ClientMessage::RequestGameState { game_id });
            JoinKind::Rejoin
        } else {
            self.joined_before = true;
            JoinKind::First
        }
    }

    fn send(&self, message: ClientMessage) {
        if self.outbound.send(message.to_frame()).is_err() {
            debug!("Transport stopped, dropping {message:?}");
        }
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
