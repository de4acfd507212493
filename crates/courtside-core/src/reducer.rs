// Event reducer: folds one server event into the mirror.
//
// Every event carries the full replacement value for the sub-entity it
// touches, so applying the same event twice is the same as applying it once.
// When an event cannot be placed (a roster omitted, a quarter we never saw)
// the mirror is left untouched and the caller is told to resync from a full
// snapshot instead of guessing.

use tracing::{debug, warn};

use crate::event::ServerEvent;
use crate::model::{GameView, LineupEntry, Mirror, Quarter, Team, MAX_QUARTERS};

/// Result of folding one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reduction {
    pub mirror: Mirror,
    /// The event could not be applied against the current mirror; a full
    /// `game_state` is needed to get back in step.
    pub resync: bool,
}

impl Reduction {
    fn applied(mirror: Mirror) -> Self {
        Reduction {
            mirror,
            resync: false,
        }
    }

    fn stale(mirror: Mirror) -> Self {
        Reduction {
            mirror,
            resync: true,
        }
    }
}

/// What happened to a live view.
enum Delta {
    Applied(GameView),
    Unchanged,
    Stale,
}

/// Fold `event` into `mirror`. Pure and total.
pub fn reduce(mirror: &Mirror, event: &ServerEvent) -> Reduction {
    match (mirror, event) {
        (Mirror::Gone, _) => {
            debug!("Game is gone, dropping `{}`", event.kind());
            Reduction::applied(Mirror::Gone)
        }
        (_, ServerEvent::GameDeleted) => Reduction::applied(Mirror::Gone),
        (_, ServerEvent::GameState(view)) => Reduction::applied(Mirror::Live(view.clone())),
        (Mirror::Pending, _) => {
            debug!("No snapshot yet, dropping `{}`", event.kind());
            Reduction::applied(Mirror::Pending)
        }
        (Mirror::Live(view), _) => match apply_delta(view, event) {
            Delta::Applied(next) => Reduction::applied(Mirror::Live(next)),
            Delta::Unchanged => Reduction::applied(mirror.clone()),
            Delta::Stale => {
                warn!("`{}` does not fit the local mirror, resync needed", event.kind());
                Reduction::stale(mirror.clone())
            }
        },
    }
}

/// Fold a sequence of events, reporting whether any of them asked for a
/// resync.
pub fn reduce_all<'a>(
    mirror: &Mirror,
    events: impl IntoIterator<Item = &'a ServerEvent>,
) -> Reduction {
    let mut acc = Reduction::applied(mirror.clone());
    for event in events {
        let next = reduce(&acc.mirror, event);
        acc = Reduction {
            mirror: next.mirror,
            resync: acc.resync || next.resync,
        };
    }
    acc
}

fn apply_delta(view: &GameView, event: &ServerEvent) -> Delta {
    match event {
        ServerEvent::GameStarted(game) | ServerEvent::GameEnded(game) => {
            if game.id != view.game.id {
                warn!(
                    "Dropping `{}` for game {} while viewing {}",
                    event.kind(),
                    game.id,
                    view.game.id
                );
                return Delta::Unchanged;
            }
            if game.status < view.game.status {
                debug!(
                    "Ignoring status regression {:?} -> {:?}",
                    view.game.status, game.status
                );
                return Delta::Unchanged;
            }
            let mut next = view.clone();
            next.game = game.clone();
            Delta::Applied(next)
        }

        ServerEvent::PlayerArrived(entry) => {
            let mut next = view.clone();
            upsert_arrival(&mut next, entry);
            Delta::Applied(next)
        }

        ServerEvent::PlayerRemoved { team, lineups } => match lineups {
            Some(roster) => {
                let mut next = view.clone();
                *next.lineups.get_mut(*team) = roster.clone();
                Delta::Applied(next)
            }
            None => Delta::Stale,
        },

        ServerEvent::LineupSwapped { lineups } => {
            if lineups.home.is_none() && lineups.away.is_none() {
                return Delta::Stale;
            }
            let mut next = view.clone();
            for (team, roster) in lineups.iter() {
                if let Some(roster) = roster {
                    *next.lineups.get_mut(team) = roster.clone();
                }
            }
            Delta::Applied(next)
        }

        ServerEvent::LineupUpdated(entry) => {
            let mut next = view.clone();
            let roster = next.lineups.get_mut(entry.team);
            match roster.iter_mut().find(|e| e.id == entry.id) {
                Some(slot) => {
                    *slot = entry.clone();
                    Delta::Applied(next)
                }
                None => Delta::Stale,
            }
        }

        ServerEvent::QuarterStarted(quarter) => start_quarter(view, quarter),

        ServerEvent::QuarterEnded(quarter)
        | ServerEvent::QuarterUpdated(quarter)
        | ServerEvent::QuarterCancelled(quarter) => replace_quarter(view, quarter),

        ServerEvent::ScoreUpdated { quarter, score } => {
            let mut next = view.clone();
            match next.quarter_mut(*quarter) {
                Some(q) => {
                    q.score = score.clone();
                    Delta::Applied(next)
                }
                None => Delta::Stale,
            }
        }

        // Handled before a live view is consulted.
        ServerEvent::GameState(_) | ServerEvent::GameDeleted => Delta::Unchanged,
    }
}

/// Append an arrival, or overwrite the entry it replays.
fn upsert_arrival(view: &mut GameView, entry: &LineupEntry) {
    // A replay may follow a swap that moved the entry to the other side.
    view.lineups
        .get_mut(entry.team.other())
        .retain(|e| e.id != entry.id);

    let roster = view.lineups.get_mut(entry.team);
    match roster
        .iter()
        .position(|e| e.id == entry.id || e.number == entry.number)
    {
        Some(idx) => roster[idx] = entry.clone(),
        None => roster.push(entry.clone()),
    }
}

fn start_quarter(view: &GameView, quarter: &Quarter) -> Delta {
    if view.quarter(quarter.number).is_some() {
        // Replay of a start we already hold.
        return replace_quarter(view, quarter);
    }

    let expected = view.quarters.len() as u32 + 1;
    if quarter.number > MAX_QUARTERS as u32 {
        warn!("Ignoring quarter {} beyond the limit", quarter.number);
        return Delta::Unchanged;
    }
    if quarter.number != expected {
        return Delta::Stale;
    }
    if quarter.is_live() && view.live_quarter().is_some() {
        // We missed the end of the previous quarter.
        return Delta::Stale;
    }

    let mut next = view.clone();
    next.quarters.push(quarter.clone());
    next.game.current_quarter = quarter.number;
    Delta::Applied(next)
}

fn replace_quarter(view: &GameView, quarter: &Quarter) -> Delta {
    let Some(existing) = view.quarter(quarter.number) else {
        return Delta::Stale;
    };
    if quarter.is_live()
        && view
            .live_quarter()
            .is_some_and(|live| live.number != quarter.number)
    {
        return Delta::Stale;
    }

    let mut replacement = quarter.clone();
    // The snapshot is frozen at quarter start; later deltas never rewrite it.
    if existing.has_snapshot() {
        replacement.lineup_snapshot = existing.lineup_snapshot.clone();
    }

    let mut next = view.clone();
    if let Some(slot) = next.quarter_mut(quarter.number) {
        *slot = replacement;
    }
    if next.quarters.last().map(|q| q.number) == Some(quarter.number) {
        next.game.current_quarter = quarter.number;
    }
    Delta::Applied(next)
}

/// Whether an event touches only the given team's roster. Used by callers
/// that hold optimistic patches for a single side.
pub fn touches_roster(event: &ServerEvent, team: Team) -> bool {
    match event {
        ServerEvent::PlayerArrived(entry) | ServerEvent::LineupUpdated(entry) => {
            entry.team == team
        }
        ServerEvent::PlayerRemoved { team: t, .. } => *t == team,
        ServerEvent::LineupSwapped { lineups } => lineups.get(team).is_some(),
        ServerEvent::GameState(_) => true,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
