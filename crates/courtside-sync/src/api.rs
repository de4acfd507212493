// REST client for the game server.
//
// Every route lives under `{api_url}/api/game/{game_id}` and answers with a
// `{success, data?, error?}` envelope. Business rules are the server's; this
// module only shapes requests and unwraps replies.

use async_trait::async_trait;
use courtside_core::lineup::{QuarterPlan, Transfer};
use courtside_core::model::{GameView, LineupEntry, LineupId, Score, Team, TeamPair};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrivalRequest {
    pub team: Team,
    /// Display name of the arriving member (or guest).
    pub member: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

/// A user-initiated change, sent to the server as one REST call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Arrival(ArrivalRequest),
    Remove { lineup_id: LineupId },
    ToggleStatus { lineup_id: LineupId },
    Swap(Transfer),
    StartQuarter(QuarterPlan),
    EndQuarter { quarter: u32 },
    CancelQuarter { quarter: u32 },
    UpdateScore { quarter: u32, score: Score },
    StartGame {
        team_home: Option<String>,
        team_away: Option<String>,
    },
    EndGame,
}

impl Mutation {
    /// Short human-readable description for logs and errors.
    pub fn describe(&self) -> String {
        match self {
            Mutation::Arrival(req) => format!("arrival of {} ({})", req.member, req.team),
            Mutation::Remove { lineup_id } => format!("removal of lineup {lineup_id}"),
            Mutation::ToggleStatus { lineup_id } => format!("status toggle of lineup {lineup_id}"),
            Mutation::Swap(t) => format!(
                "swap {}#{} -> {}#{}",
                t.from.team, t.from.number, t.to.team, t.to.number
            ),
            Mutation::StartQuarter(plan) => format!("start of quarter {}", plan.quarter_number),
            Mutation::EndQuarter { quarter } => format!("end of quarter {quarter}"),
            Mutation::CancelQuarter { quarter } => format!("cancellation of quarter {quarter}"),
            Mutation::UpdateScore { quarter, score } => format!(
                "score {}-{} for quarter {quarter}",
                score.home, score.away
            ),
            Mutation::StartGame { .. } => "game start".to_string(),
            Mutation::EndGame => "game end".to_string(),
        }
    }

    /// Whether the mirror is patched before the server confirms.
    pub fn is_optimistic(&self) -> bool {
        matches!(self, Mutation::Swap(_))
    }

    /// Method, path (relative to the game) and body of the REST call.
    pub fn route(&self) -> Route {
        match self {
            Mutation::Arrival(req) => Route::new(Method::POST, "/lineup/arrival").body(json!(req)),
            Mutation::Remove { lineup_id } => {
                Route::new(Method::DELETE, format!("/lineup/{lineup_id}"))
            }
            Mutation::ToggleStatus { lineup_id } => {
                Route::new(Method::PUT, format!("/lineup/{lineup_id}/toggle-status"))
            }
            Mutation::Swap(t) => Route::new(Method::PUT, "/lineup/swap").body(json!({
                "from_team": t.from.team,
                "from_number": t.from.number,
                "to_team": t.to.team,
                "to_number": t.to.number,
            })),
            Mutation::StartQuarter(plan) => {
                Route::new(Method::POST, "/quarter/start").body(json!({
                    "playing_home": plan.playing.home,
                    "bench_home": plan.bench.home,
                    "playing_away": plan.playing.away,
                    "bench_away": plan.bench.away,
                }))
            }
            Mutation::EndQuarter { quarter } => {
                Route::new(Method::POST, format!("/quarter/{quarter}/end"))
            }
            Mutation::CancelQuarter { quarter } => {
                Route::new(Method::DELETE, format!("/quarter/{quarter}/cancel"))
            }
            Mutation::UpdateScore { quarter, score } => {
                Route::new(Method::PUT, format!("/quarter/{quarter}/score")).body(json!({
                    "score_home": score.home,
                    "score_away": score.away,
                }))
            }
            Mutation::StartGame {
                team_home,
                team_away,
            } => Route::new(Method::POST, "/start").body(json!({
                "team_home": team_home,
                "team_away": team_away,
            })),
            Mutation::EndGame => Route::new(Method::POST, "/end").body(json!({})),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl Route {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Route {
            method,
            path: path.into(),
            body: None,
        }
    }

    fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// What a successful mutation returned that the client can use directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationReply {
    Done,
    /// Authoritative rosters after a swap.
    Lineups(TeamPair<Vec<LineupEntry>>),
}

// ---------------------------------------------------------------------------
// GameApi
// ---------------------------------------------------------------------------

#[async_trait]
pub trait GameApi: Send + Sync {
    /// Full snapshot of one game.
    async fn fetch_game(&self, game_id: &str) -> Result<GameView, ApiError>;

    async fn execute(&self, game_id: &str, mutation: &Mutation)
        -> Result<MutationReply, ApiError>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SwapReply {
    lineups: TeamPair<Vec<LineupEntry>>,
}

/// `GameApi` over HTTP with reqwest.
pub struct HttpGameApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGameApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, game_id: &str, path: &str) -> String {
        format!("{}/api/game/{game_id}{path}", self.base_url)
    }

    async fn send(&self, game_id: &str, route: Route) -> Result<Value, ApiError> {
        let url = self.url(game_id, &route.path);
        debug!("{} {url}", route.method);

        let mut request = self.http.request(route.method, &url);
        if let Some(body) = &route.body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();

        let envelope = match response.json::<Envelope>().await {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(ApiError::Decode(e.to_string())),
            Err(_) => {
                return Err(ApiError::Rejected {
                    status: status.as_u16(),
                    message: status.canonical_reason().unwrap_or("error").to_string(),
                })
            }
        };

        unwrap_envelope(status.as_u16(), envelope)
    }
}

fn unwrap_envelope(status: u16, envelope: Envelope) -> Result<Value, ApiError> {
    if (200..300).contains(&status) && envelope.success {
        return Ok(envelope.data);
    }
    let message = envelope
        .error
        .unwrap_or_else(|| "request was not successful".to_string());
    warn!("Server rejected request ({status}): {message}");
    Err(ApiError::Rejected { status, message })
}

fn decode_reply(mutation: &Mutation, data: Value) -> Result<MutationReply, ApiError> {
    match mutation {
        Mutation::Swap(_) => {
            let reply: SwapReply =
                serde_json::from_value(data).map_err(|e| ApiError::Decode(e.to_string()))?;
            Ok(MutationReply::Lineups(reply.lineups))
        }
        _ => Ok(MutationReply::Done),
    }
}

#[async_trait]
impl GameApi for HttpGameApi {
    async fn fetch_game(&self, game_id: &str) -> Result<GameView, ApiError> {
        let data = self.send(game_id, Route::new(Method::GET, "")).await?;
        serde_json::from_value(data).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn execute(
        &self,
        game_id: &str,
        mutation: &Mutation,
    ) -> Result<MutationReply, ApiError> {
        let data = self.send(game_id, mutation.route()).await?;
        decode_reply(mutation, data)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
