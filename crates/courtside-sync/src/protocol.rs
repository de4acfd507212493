// WebSocket frame protocol: `{"event": name, "data": payload}` in both
// directions.

use courtside_core::event::{EventError, ServerEvent, WireUpdate};
use courtside_core::model::GameId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Messages the client emits on the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinGame { game_id: GameId },
    LeaveGame { game_id: GameId },
    RequestGameState { game_id: GameId },
}

impl ClientMessage {
    pub fn to_frame(&self) -> String {
        // Only string fields; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Event(#[from] EventError),
}

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(ServerEvent),
    /// The server acknowledged a `join_game`.
    Joined { game_id: Option<GameId> },
    ServerError(String),
    /// Well-formed but of no interest (unknown event name, unknown kind).
    Ignored,
}

#[derive(Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JoinedPayload {
    Room { game_id: GameId },
    Bare(GameId),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorPayload {
    Message { message: String },
    Bare(String),
}

pub fn decode_frame(text: &str) -> Result<Inbound, FrameError> {
    let frame: Frame = serde_json::from_str(text)?;

    let inbound = match frame.event.as_str() {
        "game_update" => {
            let update: WireUpdate = serde_json::from_value(frame.data)?;
            ServerEvent::from_update(update)?.map_or(Inbound::Ignored, Inbound::Event)
        }
        "joined_game" => {
            let game_id = match serde_json::from_value::<JoinedPayload>(frame.data) {
                Ok(JoinedPayload::Room { game_id }) | Ok(JoinedPayload::Bare(game_id)) => {
                    Some(game_id)
                }
                Err(_) => None,
            };
            Inbound::Joined { game_id }
        }
        "error" => {
            let message = match serde_json::from_value::<ErrorPayload>(frame.data.clone()) {
                Ok(ErrorPayload::Message { message }) | Ok(ErrorPayload::Bare(message)) => message,
                Err(_) => frame.data.to_string(),
            };
            Inbound::ServerError(message)
        }
        // `game_state` and any kind pushed directly as a top-level event.
        kind => match ServerEvent::from_wire(kind, frame.data)? {
            Some(event) => event.into(),
            None => {
                debug!("Ignoring frame `{kind}`");
                Inbound::Ignored
            }
        },
    };

    Ok(inbound)
}

impl From<ServerEvent> for Inbound {
    fn from(event: ServerEvent) -> Self {
        Inbound::Event(event)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
