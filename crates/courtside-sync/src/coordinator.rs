// Optimistic mutation coordinator.
//
// Sends user mutations to the REST API on spawned tasks and settles their
// results back on the session task. Only swaps patch the mirror before the
// server answers; everything else waits for the authoritative push.

use std::collections::HashMap;
use std::sync::Arc;

use courtside_core::event::ServerEvent;
use courtside_core::lineup::{apply_transfer, validate_transfer, PlanError, TransferRejected};
use courtside_core::model::{GameView, LineupEntry, Mirror, Team, TeamPair};
use courtside_core::reducer::touches_roster;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::api::{ApiError, GameApi, Mutation, MutationReply};

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("the game was deleted")]
    Gone,

    #[error("the game has not loaded yet")]
    NotLoaded,

    #[error("swap rejected: {0}")]
    Rejected(#[from] TransferRejected),

    #[error("invalid quarter plan: {0}")]
    Plan(#[from] PlanError),

    #[error("{operation} failed: {source}")]
    Api {
        operation: String,
        source: ApiError,
    },

    #[error("{operation} was abandoned because the game was closed")]
    Detached { operation: String },

    #[error("the session has stopped")]
    SessionClosed,
}

/// The view after a mutation settled (optimistic or authoritative).
pub type MutationResult = Result<Mirror, MutationError>;

/// Result of a spawned REST task, delivered back to the session loop.
#[derive(Debug)]
pub enum Completion {
    Mutation {
        generation: u64,
        ticket: u64,
        result: Result<MutationReply, ApiError>,
    },
    Snapshot {
        generation: u64,
        result: Result<GameView, ApiError>,
    },
}

/// What settling a completion did to the mirror.
#[derive(Debug, Default, PartialEq)]
pub struct Settlement {
    /// The mirror was modified and should be republished.
    pub changed: bool,
    /// The mirror may have diverged; reconcile from the server.
    pub reconcile: bool,
    /// A fetched snapshot to run through the reducer.
    pub snapshot: Option<GameView>,
}

struct InFlight {
    mutation: Mutation,
    /// Lineups as they were before the optimistic patch.
    rollback: Option<TeamPair<Vec<LineupEntry>>>,
    /// A pushed roster change landed after this request was sent, so the
    /// rosters in its reply may be older than the mirror.
    superseded: bool,
    reply: oneshot::Sender<MutationResult>,
}

pub struct Coordinator {
    api: Arc<dyn GameApi>,
    done_tx: mpsc::UnboundedSender<Completion>,
    in_flight: HashMap<u64, InFlight>,
    next_ticket: u64,
    /// Bumped whenever the open game changes. Completions carrying an older
    /// value belong to a previous subscription and are discarded.
    generation: u64,
}

impl Coordinator {
    pub fn new(api: Arc<dyn GameApi>, done_tx: mpsc::UnboundedSender<Completion>) -> Self {
        Self {
            api,
            done_tx,
            in_flight: HashMap::new(),
            next_ticket: 0,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    /// Validate `mutation`, apply its optimistic patch if it has one, and
    /// send it to the server. Returns true when the mirror was patched.
    ///
    /// Local rejections (deleted game, invalid swap, invalid plan) are
    /// answered on `reply` immediately without contacting the server.
    pub fn begin(
        &mut self,
        game_id: &str,
        mirror: &mut Mirror,
        mutation: Mutation,
        reply: oneshot::Sender<MutationResult>,
    ) -> bool {
        let view = match mirror {
            Mirror::Gone => {
                let _ = reply.send(Err(MutationError::Gone));
                return false;
            }
            Mirror::Pending => {
                let _ = reply.send(Err(MutationError::NotLoaded));
                return false;
            }
            Mirror::Live(view) => view,
        };

        let mut rollback = None;
        match &mutation {
            Mutation::Swap(transfer) => {
                if let Err(e) = validate_transfer(view, transfer) {
                    debug!("Swap rejected locally: {e}");
                    let _ = reply.send(Err(e.into()));
                    return false;
                }
                rollback = Some(view.lineups.clone());
                view.lineups = apply_transfer(&view.lineups, transfer);
            }
            Mutation::StartQuarter(plan) => {
                if let Err(e) = plan.validate(view) {
                    let _ = reply.send(Err(e.into()));
                    return false;
                }
            }
            _ => {}
        }
        let patched = rollback.is_some();

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let generation = self.generation;

        info!(
            "Sending {} (ticket {ticket}, gen {generation})",
            mutation.describe()
        );

        let api = Arc::clone(&self.api);
        let done_tx = self.done_tx.clone();
        let game_id = game_id.to_string();
        let request = mutation.clone();
        tokio::spawn(async move {
            let result = api.execute(&game_id, &request).await;
            let _ = done_tx.send(Completion::Mutation {
                generation,
                ticket,
                result,
            });
        });

        self.in_flight.insert(
            ticket,
            InFlight {
                mutation,
                rollback,
                superseded: false,
                reply,
            },
        );
        patched
    }

    /// Fetch a full snapshot over REST. The result arrives as a
    /// [`Completion::Snapshot`].
    pub fn fetch_snapshot(&self, game_id: &str) {
        let api = Arc::clone(&self.api);
        let done_tx = self.done_tx.clone();
        let game_id = game_id.to_string();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = api.fetch_game(&game_id).await;
            let _ = done_tx.send(Completion::Snapshot { generation, result });
        });
    }

    /// Apply a completion to the mirror.
    ///
    /// **Generation check**: a completion whose generation differs from the
    /// current one was started for a game that is no longer open. Its caller
    /// was already answered by `detach_all`, so it is dropped here.
    ///
    /// **Swap success**: the returned rosters replace both arrays. When they
    /// match the optimistic patch nothing changes. A superseded swap keeps
    /// the mirror as is and reconciles instead.
    ///
    /// **Failure**: an optimistic patch is rolled back to the pre-mutation
    /// lineups, and every failure asks for a reconcile since the server's
    /// view is unknown.
    pub fn settle(&mut self, mirror: &mut Mirror, completion: Completion) -> Settlement {
        match completion {
            Completion::Snapshot { generation, result } => {
                if generation != self.generation {
                    debug!(
                        "Discarding stale snapshot (gen {generation}, current {})",
                        self.generation
                    );
                    return Settlement::default();
                }
                match result {
                    Ok(view) => Settlement {
                        snapshot: Some(view),
                        ..Settlement::default()
                    },
                    Err(e) => {
                        warn!("Snapshot fetch failed: {e}");
                        Settlement::default()
                    }
                }
            }

            Completion::Mutation {
                generation,
                ticket,
                result,
            } => {
                if generation != self.generation {
                    debug!(
                        "Discarding stale completion {ticket} (gen {generation}, current {})",
                        self.generation
                    );
                    return Settlement::default();
                }
                let Some(flight) = self.in_flight.remove(&ticket) else {
                    debug!("No in-flight mutation for ticket {ticket}");
                    return Settlement::default();
                };
                let operation = flight.mutation.describe();

                match result {
                    Ok(_) if flight.superseded => {
                        debug!("{operation} confirmed after a pushed roster change, reconciling");
                        let _ = flight.reply.send(Ok(mirror.clone()));
                        Settlement {
                            reconcile: true,
                            ..Settlement::default()
                        }
                    }
                    Ok(reply) => {
                        debug!("{operation} confirmed");
                        let mut changed = false;
                        if let (MutationReply::Lineups(lineups), Some(view)) =
                            (reply, mirror.view_mut())
                        {
                            if view.lineups != lineups {
                                view.lineups = lineups;
                                changed = true;
                            }
                        }
                        let _ = flight.reply.send(Ok(mirror.clone()));
                        Settlement {
                            changed,
                            ..Settlement::default()
                        }
                    }
                    Err(source) => {
                        warn!("{operation} failed: {source}");
                        let mut changed = false;
                        if let (Some(rollback), Some(view)) = (flight.rollback, mirror.view_mut()) {
                            view.lineups = rollback;
                            changed = true;
                        }
                        let _ = flight
                            .reply
                            .send(Err(MutationError::Api { operation, source }));
                        Settlement {
                            changed,
                            reconcile: true,
                            snapshot: None,
                        }
                    }
                }
            }
        }
    }

    /// An authoritative roster change was applied. Neither a rollback nor
    /// the rosters in a later reply may overwrite it, so pending swaps lose
    /// their rollback and their reply only triggers a reconcile.
    pub fn supersede(&mut self, event: &ServerEvent) {
        if !Team::BOTH.iter().any(|&team| touches_roster(event, team)) {
            return;
        }
        for flight in self.in_flight.values_mut() {
            if flight.mutation.is_optimistic() && !flight.superseded {
                flight.rollback = None;
                flight.superseded = true;
                debug!(
                    "{} superseded by `{}`",
                    flight.mutation.describe(),
                    event.kind()
                );
            }
        }
    }

    /// Abandon every in-flight mutation: answer their callers and start a new
    /// generation so their completions are ignored.
    pub fn detach_all(&mut self) {
        self.generation += 1;
        for (_, flight) in self.in_flight.drain() {
            let operation = flight.mutation.describe();
            debug!("Detaching {operation}");
            let _ = flight.reply.send(Err(MutationError::Detached { operation }));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
