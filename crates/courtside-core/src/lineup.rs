// Lineup operations: drag-and-drop transfers between lineup slots and the
// court/bench plan submitted when a quarter starts.

use std::collections::HashSet;

use thiserror::Error;

use crate::model::{GameStatus, GameView, LineupEntry, PlayingStatus, Team, TeamPair, MAX_QUARTERS};

/// Players each side fields while a quarter is live.
pub const PLAYERS_ON_COURT: usize = 5;

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

/// A lineup position: one team's ordinal handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub team: Team,
    pub number: u32,
}

impl Slot {
    pub fn new(team: Team, number: u32) -> Self {
        Slot { team, number }
    }
}

/// Drag the entry at `from` onto `to`. An occupant of `to` moves to `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub from: Slot,
    pub to: Slot,
}

impl Transfer {
    pub fn new(from: Slot, to: Slot) -> Self {
        Transfer { from, to }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferRejected {
    #[error("dropped onto its own slot")]
    SelfDrop,

    #[error("no {team} entry holds number {number}")]
    EmptySource { team: Team, number: u32 },

    #[error("lineup numbers start at 1")]
    InvalidNumber,

    #[error("cannot exchange a {from:?} entry with a {to:?} entry")]
    StatusMismatch {
        from: PlayingStatus,
        to: PlayingStatus,
    },

    #[error("the game is finished")]
    GameFinished,
}

/// Check a transfer against the mirrored view before anything is patched.
pub fn validate_transfer(view: &GameView, transfer: &Transfer) -> Result<(), TransferRejected> {
    if transfer.from == transfer.to {
        return Err(TransferRejected::SelfDrop);
    }
    if transfer.from.number == 0 || transfer.to.number == 0 {
        return Err(TransferRejected::InvalidNumber);
    }
    if view.game.status == GameStatus::Finished {
        return Err(TransferRejected::GameFinished);
    }

    let source = view
        .entry(transfer.from.team, transfer.from.number)
        .ok_or(TransferRejected::EmptySource {
            team: transfer.from.team,
            number: transfer.from.number,
        })?;

    if let Some(target) = view.entry(transfer.to.team, transfer.to.number) {
        if target.playing_status != source.playing_status {
            return Err(TransferRejected::StatusMismatch {
                from: source.playing_status,
                to: target.playing_status,
            });
        }
    }

    Ok(())
}

/// The optimistic patch for a transfer: both affected rosters with the
/// source and any occupant exchanged. Returns the input unchanged when the
/// source slot is empty.
pub fn apply_transfer(
    lineups: &TeamPair<Vec<LineupEntry>>,
    transfer: &Transfer,
) -> TeamPair<Vec<LineupEntry>> {
    let find = |slot: Slot| {
        lineups
            .get(slot.team)
            .iter()
            .find(|e| e.number == slot.number)
            .cloned()
    };

    let Some(mut source) = find(transfer.from) else {
        return lineups.clone();
    };
    let target = find(transfer.to);

    let mut next = lineups.clone();
    next.get_mut(transfer.from.team).retain(|e| e.id != source.id);
    if let Some(target) = &target {
        next.get_mut(transfer.to.team).retain(|e| e.id != target.id);
    }

    source.team = transfer.to.team;
    source.number = transfer.to.number;
    next.get_mut(transfer.to.team).push(source);

    if let Some(mut target) = target {
        target.team = transfer.from.team;
        target.number = transfer.from.number;
        next.get_mut(transfer.from.team).push(target);
    }

    for team in Team::BOTH {
        next.get_mut(team).sort_by_key(|e| e.number);
    }
    next
}

// ---------------------------------------------------------------------------
// Quarter plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Playing,
    Bench,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("quarter {0} is still in progress")]
    LiveQuarter(u32),

    #[error("all 10 quarters have been played")]
    QuarterLimit,

    #[error("the game is not in progress")]
    GameNotInProgress,

    #[error("{team} needs exactly 5 players on court, has {count}")]
    WrongCourtSize { team: Team, count: usize },

    #[error("{team} number {number} is listed twice")]
    DuplicateNumber { team: Team, number: u32 },

    #[error("{team} has no entry with number {number}")]
    UnknownNumber { team: Team, number: u32 },

    #[error("{team} has no {position:?} position {index}")]
    SlotOutOfRange {
        team: Team,
        position: Position,
        index: usize,
    },
}

/// Court and bench assignment for the next quarter, by lineup number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarterPlan {
    pub quarter_number: u32,
    pub playing: TeamPair<Vec<u32>>,
    pub bench: TeamPair<Vec<u32>>,
}

impl QuarterPlan {
    /// A plan for the next quarter with every rostered number on the bench.
    pub fn from_view(view: &GameView) -> Self {
        QuarterPlan {
            quarter_number: view.quarters.len() as u32 + 1,
            playing: TeamPair::default(),
            bench: view
                .lineups
                .clone()
                .map(|_, entries| entries.iter().map(|e| e.number).collect()),
        }
    }

    fn list_mut(&mut self, team: Team, position: Position) -> &mut Vec<u32> {
        match position {
            Position::Playing => self.playing.get_mut(team),
            Position::Bench => self.bench.get_mut(team),
        }
    }

    /// Move `number` between court and bench. Returns false when the team
    /// lists no such number.
    pub fn toggle(&mut self, team: Team, number: u32) -> bool {
        if let Some(idx) = self.playing.get(team).iter().position(|&n| n == number) {
            self.playing.get_mut(team).remove(idx);
            self.bench.get_mut(team).push(number);
            return true;
        }
        if let Some(idx) = self.bench.get(team).iter().position(|&n| n == number) {
            self.bench.get_mut(team).remove(idx);
            self.playing.get_mut(team).push(number);
            return true;
        }
        false
    }

    /// Exchange two positions of one team, on the same list or across
    /// court and bench.
    pub fn swap_positions(
        &mut self,
        team: Team,
        from: (Position, usize),
        to: (Position, usize),
    ) -> Result<(), PlanError> {
        for (position, index) in [from, to] {
            let len = self.list_mut(team, position).len();
            if index >= len {
                return Err(PlanError::SlotOutOfRange {
                    team,
                    position,
                    index,
                });
            }
        }
        if from == to {
            return Ok(());
        }

        if from.0 == to.0 {
            self.list_mut(team, from.0).swap(from.1, to.1);
        } else {
            let a = self.list_mut(team, from.0)[from.1];
            let b = self.list_mut(team, to.0)[to.1];
            self.list_mut(team, from.0)[from.1] = b;
            self.list_mut(team, to.0)[to.1] = a;
        }
        Ok(())
    }

    /// Check the plan against the view it will be submitted for.
    pub fn validate(&self, view: &GameView) -> Result<(), PlanError> {
        if view.game.status != GameStatus::InProgress {
            return Err(PlanError::GameNotInProgress);
        }
        if let Some(live) = view.live_quarter() {
            return Err(PlanError::LiveQuarter(live.number));
        }
        if view.quarters.len() >= MAX_QUARTERS {
            return Err(PlanError::QuarterLimit);
        }

        for team in Team::BOTH {
            let playing = self.playing.get(team);
            if playing.len() != PLAYERS_ON_COURT {
                return Err(PlanError::WrongCourtSize {
                    team,
                    count: playing.len(),
                });
            }

            let mut seen = HashSet::new();
            for &number in playing.iter().chain(self.bench.get(team)) {
                if !seen.insert(number) {
                    return Err(PlanError::DuplicateNumber { team, number });
                }
                if view.entry(team, number).is_none() {
                    return Err(PlanError::UnknownNumber { team, number });
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
