// Server event normalization.
//
// The server pushes `{type, data}` updates whose payload shapes vary per kind
// (some carry full replacement arrays, some carry a bare entity, some carry an
// optional roster). Everything is decoded here into the closed `ServerEvent`
// union so the reducer never has to ask whether a field is present.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::model::{Game, GameView, LineupEntry, Quarter, Score, Team, TeamPair};

#[derive(Debug, Error)]
pub enum EventError {
    #[error("malformed `{kind}` payload: {source}")]
    Malformed {
        kind: String,
        source: serde_json::Error,
    },
}

/// One authoritative change pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Full replacement of the mirror.
    GameState(GameView),
    GameStarted(Game),
    GameEnded(Game),
    PlayerArrived(LineupEntry),
    /// `lineups` is the complete resulting roster for `team`; `None` when the
    /// server omitted it and the mirror can no longer be patched.
    PlayerRemoved {
        team: Team,
        lineups: Option<Vec<LineupEntry>>,
    },
    /// Replacement rosters for every team the swap touched. A cross-team swap
    /// arrives as one event naming both sides.
    LineupSwapped {
        lineups: TeamPair<Option<Vec<LineupEntry>>>,
    },
    /// A single entry changed in place (playing/bench toggle, rename).
    LineupUpdated(LineupEntry),
    QuarterStarted(Quarter),
    QuarterEnded(Quarter),
    QuarterUpdated(Quarter),
    QuarterCancelled(Quarter),
    ScoreUpdated {
        quarter: u32,
        score: Score,
    },
    GameDeleted,
}

/// The `{type, data}` envelope used for incremental updates.
#[derive(Debug, Clone, Deserialize)]
pub struct WireUpdate {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

// ---------------------------------------------------------------------------
// Payload shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum GamePayload {
    Wrapped { game: Game },
    Bare(Game),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuarterPayload {
    Wrapped { quarter: Quarter },
    Bare(Quarter),
}

#[derive(Deserialize)]
struct LineupPayload {
    lineup: LineupEntry,
}

#[derive(Deserialize)]
struct RemovedPayload {
    team: Team,
    #[serde(default)]
    lineups: Option<Vec<LineupEntry>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SwappedPayload {
    SingleTeam {
        team: Team,
        #[serde(default)]
        lineups: Option<Vec<LineupEntry>>,
    },
    BothTeams {
        #[serde(default)]
        lineups: TeamPair<Option<Vec<LineupEntry>>>,
    },
}

#[derive(Deserialize)]
struct ScorePayload {
    quarter: u32,
    score_home: u32,
    score_away: u32,
}

impl From<GamePayload> for Game {
    fn from(payload: GamePayload) -> Self {
        match payload {
            GamePayload::Wrapped { game } | GamePayload::Bare(game) => game,
        }
    }
}

impl From<QuarterPayload> for Quarter {
    fn from(payload: QuarterPayload) -> Self {
        match payload {
            QuarterPayload::Wrapped { quarter } | QuarterPayload::Bare(quarter) => quarter,
        }
    }
}

fn parse<T: for<'de> Deserialize<'de>>(kind: &str, data: Value) -> Result<T, EventError> {
    serde_json::from_value(data).map_err(|source| EventError::Malformed {
        kind: kind.to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

impl ServerEvent {
    /// Decode one update. Unknown kinds yield `Ok(None)` so newer servers can
    /// add events without breaking older clients.
    pub fn from_wire(kind: &str, data: Value) -> Result<Option<ServerEvent>, EventError> {
        let event = match kind {
            "game_state" => ServerEvent::GameState(parse(kind, data)?),
            "game_started" => ServerEvent::GameStarted(parse::<GamePayload>(kind, data)?.into()),
            "game_ended" => ServerEvent::GameEnded(parse::<GamePayload>(kind, data)?.into()),
            "player_arrived" => {
                ServerEvent::PlayerArrived(parse::<LineupPayload>(kind, data)?.lineup)
            }
            "player_removed" => {
                let payload: RemovedPayload = parse(kind, data)?;
                ServerEvent::PlayerRemoved {
                    team: payload.team,
                    lineups: payload.lineups,
                }
            }
            "lineup_swapped" => {
                let lineups = match parse::<SwappedPayload>(kind, data)? {
                    SwappedPayload::SingleTeam { team, lineups } => {
                        let mut pair = TeamPair::default();
                        *pair.get_mut(team) = lineups;
                        pair
                    }
                    SwappedPayload::BothTeams { lineups } => lineups,
                };
                ServerEvent::LineupSwapped { lineups }
            }
            "lineup_updated" => {
                ServerEvent::LineupUpdated(parse::<LineupPayload>(kind, data)?.lineup)
            }
            "quarter_started" => {
                ServerEvent::QuarterStarted(parse::<QuarterPayload>(kind, data)?.into())
            }
            "quarter_ended" => {
                ServerEvent::QuarterEnded(parse::<QuarterPayload>(kind, data)?.into())
            }
            "quarter_updated" => {
                ServerEvent::QuarterUpdated(parse::<QuarterPayload>(kind, data)?.into())
            }
            "quarter_cancelled" => {
                ServerEvent::QuarterCancelled(parse::<QuarterPayload>(kind, data)?.into())
            }
            "score_updated" => {
                let payload: ScorePayload = parse(kind, data)?;
                ServerEvent::ScoreUpdated {
                    quarter: payload.quarter,
                    score: Score::new(payload.score_home, payload.score_away),
                }
            }
            "game_deleted" => ServerEvent::GameDeleted,
            other => {
                warn!("Ignoring unknown server event kind `{}`", other);
                return Ok(None);
            }
        };
        Ok(Some(event))
    }

    /// Decode a `{type, data}` envelope.
    pub fn from_update(update: WireUpdate) -> Result<Option<ServerEvent>, EventError> {
        ServerEvent::from_wire(&update.kind, update.data)
    }

    /// The wire name of this event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::GameState(_) => "game_state",
            ServerEvent::GameStarted(_) => "game_started",
            ServerEvent::GameEnded(_) => "game_ended",
            ServerEvent::PlayerArrived(_) => "player_arrived",
            ServerEvent::PlayerRemoved { .. } => "player_removed",
            ServerEvent::LineupSwapped { .. } => "lineup_swapped",
            ServerEvent::LineupUpdated(_) => "lineup_updated",
            ServerEvent::QuarterStarted(_) => "quarter_started",
            ServerEvent::QuarterEnded(_) => "quarter_ended",
            ServerEvent::QuarterUpdated(_) => "quarter_updated",
            ServerEvent::QuarterCancelled(_) => "quarter_cancelled",
            ServerEvent::ScoreUpdated { .. } => "score_updated",
            ServerEvent::GameDeleted => "game_deleted",
        }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self, ServerEvent::GameState(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
