// Entity model: Game, LineupEntry, Quarter and the mirrored GameView aggregate.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard upper bound on quarters per game.
pub const MAX_QUARTERS: usize = 10;

pub type GameId = String;
pub type LineupId = i64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("team_home and team_away must both be set or both be unset")]
    UnpairedTeams,

    #[error("team_home and team_away must differ (both are `{0}`)")]
    SameTeams(String),
}

/// A structural rule of [`GameView`] that does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("{team} lineup number {number} is held by more than one entry")]
    DuplicateNumber { team: Team, number: u32 },

    #[error("{team} lineup entry {id} has non-positive number")]
    NonPositiveNumber { team: Team, id: LineupId },

    #[error("lineup entry {id} is filed under {filed} but belongs to {actual}")]
    MisfiledEntry {
        id: LineupId,
        filed: Team,
        actual: Team,
    },

    #[error("quarters {first} and {second} are both in progress")]
    MultipleLiveQuarters { first: u32, second: u32 },

    #[error("expected quarter {expected}, found quarter {found}")]
    NonContiguousQuarters { expected: u32, found: u32 },

    #[error("{0} quarters exceeds the limit of 10")]
    TooManyQuarters(usize),

    #[error(transparent)]
    Teams(#[from] ModelError),
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Team {
    #[serde(alias = "home")]
    Home,
    #[serde(alias = "away")]
    Away,
}

impl Team {
    pub const BOTH: [Team; 2] = [Team::Home, Team::Away];

    pub fn other(self) -> Team {
        match self {
            Team::Home => Team::Away,
            Team::Away => Team::Home,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Team::Home => "HOME",
            Team::Away => "AWAY",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a game. Declaration order is the only legal direction of
/// travel, so `Ord` doubles as the monotonicity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Preparing,
    InProgress,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayingStatus {
    #[default]
    Playing,
    Bench,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuarterStatus {
    InProgress,
    Ended,
    Cancelled,
}

// ---------------------------------------------------------------------------
// TeamPair
// ---------------------------------------------------------------------------

/// A value held once per side. Serializes as `{"home": .., "away": ..}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamPair<T> {
    #[serde(default)]
    pub home: T,
    #[serde(default)]
    pub away: T,
}

impl<T> TeamPair<T> {
    pub fn new(home: T, away: T) -> Self {
        TeamPair { home, away }
    }

    pub fn get(&self, team: Team) -> &T {
        match team {
            Team::Home => &self.home,
            Team::Away => &self.away,
        }
    }

    pub fn get_mut(&mut self, team: Team) -> &mut T {
        match team {
            Team::Home => &mut self.home,
            Team::Away => &mut self.away,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(Team, T) -> U) -> TeamPair<U> {
        TeamPair {
            home: f(Team::Home, self.home),
            away: f(Team::Away, self.away),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Team, &T)> {
        [(Team::Home, &self.home), (Team::Away, &self.away)].into_iter()
    }
}

/// Cumulative points per side.
pub type Score = TeamPair<u32>;

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub status: GameStatus,
    #[serde(default)]
    pub team_home: Option<String>,
    #[serde(default)]
    pub team_away: Option<String>,
    #[serde(default)]
    pub current_quarter: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl Game {
    /// Check the pairing rule for assigned team names.
    pub fn validate_teams(&self) -> Result<(), ModelError> {
        match (&self.team_home, &self.team_away) {
            (None, None) => Ok(()),
            (Some(home), Some(away)) if home == away => Err(ModelError::SameTeams(home.clone())),
            (Some(_), Some(_)) => Ok(()),
            _ => Err(ModelError::UnpairedTeams),
        }
    }

    /// Display name for one side: the assigned team name, or HOME/AWAY
    /// before teams are chosen.
    pub fn team_name(&self, team: Team) -> &str {
        let assigned = match team {
            Team::Home => self.team_home.as_deref(),
            Team::Away => self.team_away.as_deref(),
        };
        assigned.unwrap_or(team.as_str())
    }
}

// ---------------------------------------------------------------------------
// Lineup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineupEntry {
    pub id: LineupId,
    pub team: Team,
    /// Per-team ordinal handle, assigned at arrival and never reused.
    pub number: u32,
    pub member_name: String,
    #[serde(default)]
    pub member_id: Option<String>,
    /// Sub-team the member is registered with, if any.
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub is_guest: bool,
    #[serde(default)]
    pub playing_status: PlayingStatus,
    pub arrived_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Quarter
// ---------------------------------------------------------------------------

/// Name binding for one lineup number, frozen when a quarter starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub name: String,
    #[serde(default)]
    pub member_id: Option<String>,
    #[serde(default)]
    pub is_guest: bool,
}

impl From<&LineupEntry> for SnapshotEntry {
    fn from(entry: &LineupEntry) -> Self {
        SnapshotEntry {
            name: entry.member_name.clone(),
            member_id: entry.member_id.clone(),
            is_guest: entry.is_guest,
        }
    }
}

pub type LineupSnapshot = TeamPair<BTreeMap<u32, SnapshotEntry>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quarter {
    pub number: u32,
    pub status: QuarterStatus,
    #[serde(default)]
    pub playing: TeamPair<Vec<u32>>,
    #[serde(default)]
    pub bench: TeamPair<Vec<u32>>,
    #[serde(default)]
    pub lineup_snapshot: LineupSnapshot,
    #[serde(default)]
    pub score: Score,
}

impl Quarter {
    pub fn is_live(&self) -> bool {
        self.status == QuarterStatus::InProgress
    }

    pub fn has_snapshot(&self) -> bool {
        !self.lineup_snapshot.home.is_empty() || !self.lineup_snapshot.away.is_empty()
    }

    /// Name frozen for `number` when this quarter started.
    pub fn snapshot_name(&self, team: Team, number: u32) -> Option<&str> {
        self.lineup_snapshot
            .get(team)
            .get(&number)
            .map(|entry| entry.name.as_str())
    }
}

/// Freeze the name bound to every current lineup number.
pub fn capture_snapshot(lineups: &TeamPair<Vec<LineupEntry>>) -> LineupSnapshot {
    lineups.clone().map(|_, entries| {
        entries
            .iter()
            .map(|entry| (entry.number, SnapshotEntry::from(entry)))
            .collect()
    })
}

// ---------------------------------------------------------------------------
// GameView
// ---------------------------------------------------------------------------

/// The full client-side mirror of one game's server state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameView {
    pub game: Game,
    #[serde(default)]
    pub lineups: TeamPair<Vec<LineupEntry>>,
    #[serde(default)]
    pub quarters: Vec<Quarter>,
}

impl GameView {
    pub fn new(game: Game) -> Self {
        GameView {
            game,
            lineups: TeamPair::default(),
            quarters: Vec::new(),
        }
    }

    pub fn live_quarter(&self) -> Option<&Quarter> {
        self.quarters.iter().find(|q| q.is_live())
    }

    pub fn quarter(&self, number: u32) -> Option<&Quarter> {
        self.quarters.iter().find(|q| q.number == number)
    }

    pub fn quarter_mut(&mut self, number: u32) -> Option<&mut Quarter> {
        self.quarters.iter_mut().find(|q| q.number == number)
    }

    pub fn entry(&self, team: Team, number: u32) -> Option<&LineupEntry> {
        self.lineups.get(team).iter().find(|e| e.number == number)
    }

    pub fn entry_by_id(&self, id: LineupId) -> Option<&LineupEntry> {
        self.lineups
            .home
            .iter()
            .chain(self.lineups.away.iter())
            .find(|e| e.id == id)
    }

    /// Verify the structural rules every mirrored view must satisfy.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.game.validate_teams()?;

        for (team, entries) in self.lineups.iter() {
            let mut seen = HashSet::new();
            for entry in entries {
                if entry.team != team {
                    return Err(InvariantViolation::MisfiledEntry {
                        id: entry.id,
                        filed: team,
                        actual: entry.team,
                    });
                }
                if entry.number == 0 {
                    return Err(InvariantViolation::NonPositiveNumber { team, id: entry.id });
                }
                if !seen.insert(entry.number) {
                    return Err(InvariantViolation::DuplicateNumber {
                        team,
                        number: entry.number,
                    });
                }
            }
        }

        if self.quarters.len() > MAX_QUARTERS {
            return Err(InvariantViolation::TooManyQuarters(self.quarters.len()));
        }

        let mut live: Option<u32> = None;
        for (idx, quarter) in self.quarters.iter().enumerate() {
            let expected = idx as u32 + 1;
            if quarter.number != expected {
                return Err(InvariantViolation::NonContiguousQuarters {
                    expected,
                    found: quarter.number,
                });
            }
            if quarter.is_live() {
                if let Some(first) = live {
                    return Err(InvariantViolation::MultipleLiveQuarters {
                        first,
                        second: quarter.number,
                    });
                }
                live = Some(quarter.number);
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mirror
// ---------------------------------------------------------------------------

/// What a consumer of one game currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Mirror {
    /// Subscribed, but the first full snapshot has not arrived yet.
    #[default]
    Pending,
    Live(GameView),
    /// The game was deleted. Terminal.
    Gone,
}

impl Mirror {
    pub fn view(&self) -> Option<&GameView> {
        match self {
            Mirror::Live(view) => Some(view),
            _ => None,
        }
    }

    pub fn view_mut(&mut self) -> Option<&mut GameView> {
        match self {
            Mirror::Live(view) => Some(view),
            _ => None,
        }
    }

    pub fn is_gone(&self) -> bool {
        matches!(self, Mirror::Gone)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
