// Properties of the mirror pipeline, driven from wire JSON.
//
// Every test decodes server payloads through `ServerEvent::from_wire` and
// folds them with `reduce`, so normalization and reduction are exercised
// together the way the sync layer uses them.

use courtside_core::event::ServerEvent;
use courtside_core::lineup::{apply_transfer, validate_transfer, Slot, Transfer};
use courtside_core::model::{GameStatus, GameView, Mirror, PlayingStatus, QuarterStatus, Team};
use courtside_core::projection::{project, ProjectionOptions};
use courtside_core::reducer::{reduce, reduce_all};

use serde_json::{json, Value};

// ===========================================================================
// Test helpers
// ===========================================================================

fn lineup(id: i64, team: &str, number: u32, name: &str) -> Value {
    json!({
        "id": id,
        "team": team,
        "number": number,
        "member_name": name,
        "playing_status": "PLAYING",
        "arrived_at": "2024-05-04T19:00:00Z",
    })
}

fn game(status: &str) -> Value {
    json!({
        "id": "g1",
        "status": status,
        "team_home": "Hawks",
        "team_away": "Owls",
        "current_quarter": 0,
        "created_at": "2024-05-04T18:00:00Z",
    })
}

fn snapshot(home: Vec<Value>, away: Vec<Value>, quarters: Vec<Value>) -> Value {
    json!({
        "game": game("IN_PROGRESS"),
        "lineups": {"home": home, "away": away},
        "quarters": quarters,
    })
}

fn event(kind: &str, data: Value) -> ServerEvent {
    ServerEvent::from_wire(kind, data)
        .expect("payload should decode")
        .expect("kind should be known")
}

fn live(data: Value) -> Mirror {
    match event("game_state", data) {
        ServerEvent::GameState(view) => Mirror::Live(view),
        other => panic!("expected snapshot, got {}", other.kind()),
    }
}

fn view(mirror: &Mirror) -> &GameView {
    mirror.view().expect("mirror should be live")
}

fn base() -> Mirror {
    live(snapshot(
        vec![lineup(1, "HOME", 1, "Yoon"), lineup(2, "HOME", 2, "Baek")],
        vec![lineup(3, "AWAY", 1, "Choi")],
        vec![],
    ))
}

/// A mixed delta stream touching every sub-entity.
fn delta_stream() -> Vec<ServerEvent> {
    vec![
        event(
            "player_arrived",
            json!({"lineup": lineup(4, "AWAY", 2, "Guest X")}),
        ),
        event(
            "quarter_started",
            json!({"quarter": {"number": 1, "status": "IN_PROGRESS",
                   "playing": {"home": [1, 2], "away": [1, 2]},
                   "lineup_snapshot": {"home": {"1": {"name": "Yoon"}, "2": {"name": "Baek"}},
                                       "away": {"1": {"name": "Choi"}, "2": {"name": "Guest X"}}}}}),
        ),
        event(
            "score_updated",
            json!({"quarter": 1, "score_home": 7, "score_away": 4}),
        ),
        event(
            "lineup_updated",
            json!({"lineup": {"id": 2, "team": "HOME", "number": 2, "member_name": "Baek",
                              "playing_status": "BENCH", "arrived_at": "2024-05-04T19:00:00Z"}}),
        ),
        event(
            "quarter_ended",
            json!({"number": 1, "status": "ENDED", "score": {"home": 9, "away": 4}}),
        ),
    ]
}

// ===========================================================================
// Test: Idempotence
// ===========================================================================

#[test]
fn replaying_every_delta_is_a_no_op() {
    let mut mirror = base();
    for e in delta_stream() {
        let once = reduce(&mirror, &e);
        let twice = reduce(&once.mirror, &e);
        assert_eq!(once.mirror, twice.mirror, "`{}` is not idempotent", e.kind());
        mirror = once.mirror;
    }
}

#[test]
fn replaying_whole_stream_converges() {
    let events = delta_stream();
    let once = reduce_all(&base(), &events);
    let twice = reduce_all(&once.mirror, &events);
    assert!(!once.resync);
    assert_eq!(once.mirror, twice.mirror);
}

// ===========================================================================
// Test: Reconciliation convergence
// ===========================================================================

#[test]
fn snapshot_wins_over_any_local_history() {
    let authoritative = snapshot(
        vec![lineup(1, "HOME", 1, "Yoon")],
        vec![lineup(3, "AWAY", 1, "Choi"), lineup(5, "AWAY", 3, "Moon")],
        vec![json!({"number": 1, "status": "ENDED", "score": {"home": 2, "away": 0}})],
    );
    let expected = live(authoritative.clone());

    // Arbitrary prefixes of the stream, including one that asked for resync.
    let mut stream = delta_stream();
    stream.insert(2, event("player_removed", json!({"team": "HOME"})));
    for cut in 0..=stream.len() {
        let diverged = reduce_all(&base(), &stream[..cut]).mirror;
        let settled = reduce(&diverged, &event("game_state", authoritative.clone()));
        assert_eq!(settled.mirror, expected, "prefix {cut} did not converge");
        assert!(!settled.resync);
    }
}

#[test]
fn pending_mirror_converges_on_first_snapshot() {
    let out = reduce_all(&Mirror::Pending, &delta_stream());
    assert_eq!(out.mirror, Mirror::Pending);

    let empty = snapshot(vec![], vec![], vec![]);
    let settled = reduce(&out.mirror, &event("game_state", empty.clone()));
    assert_eq!(settled.mirror, live(empty));
}

// ===========================================================================
// Test: Number uniqueness and quarter exclusivity
// ===========================================================================

#[test]
fn invariants_hold_along_the_stream() {
    let mut mirror = base();
    for e in delta_stream() {
        mirror = reduce(&mirror, &e).mirror;
        assert_eq!(view(&mirror).check_invariants(), Ok(()), "after `{}`", e.kind());
    }
}

#[test]
fn missed_quarter_end_triggers_resync_not_second_live_quarter() {
    let mirror = reduce_all(&base(), &delta_stream()[..2]).mirror;
    let out = reduce(
        &mirror,
        &event("quarter_started", json!({"number": 2, "status": "IN_PROGRESS"})),
    );
    assert!(out.resync);
    let live: Vec<_> = view(&out.mirror)
        .quarters
        .iter()
        .filter(|q| q.status == QuarterStatus::InProgress)
        .collect();
    assert_eq!(live.len(), 1);
}

// ===========================================================================
// Test: Swap atomicity
// ===========================================================================

#[test]
fn confirmed_cross_team_swap_is_atomic() {
    let mirror = base();
    let transfer = Transfer::new(Slot::new(Team::Home, 2), Slot::new(Team::Away, 1));
    validate_transfer(view(&mirror), &transfer).expect("swap should be valid");

    let patched = apply_transfer(&view(&mirror).lineups, &transfer);
    let confirmed = reduce(
        &mirror,
        &event(
            "lineup_swapped",
            json!({"lineups": {
                "home": [lineup(1, "HOME", 1, "Yoon"), lineup(3, "HOME", 2, "Choi")],
                "away": [lineup(2, "AWAY", 1, "Baek")],
            }}),
        ),
    );
    let after = view(&confirmed.mirror);

    // Either both sides moved or neither did.
    assert_eq!(after.lineups, patched);
    assert_eq!(after.entry(Team::Home, 2).map(|e| e.member_name.as_str()), Some("Choi"));
    assert_eq!(after.entry(Team::Away, 1).map(|e| e.member_name.as_str()), Some("Baek"));
    assert_eq!(after.check_invariants(), Ok(()));
}

#[test]
fn single_team_swap_form_touches_one_side() {
    let mirror = base();
    let out = reduce(
        &mirror,
        &event(
            "lineup_swapped",
            json!({"team": "HOME", "lineups": [lineup(2, "HOME", 1, "Baek"), lineup(1, "HOME", 2, "Yoon")]}),
        ),
    );
    let after = view(&out.mirror);
    assert_eq!(after.lineups.home[0].member_name, "Baek");
    assert_eq!(after.lineups.away, view(&mirror).lineups.away);
}

// ===========================================================================
// Test: Snapshot immutability
// ===========================================================================

#[test]
fn departed_guest_keeps_name_in_ended_quarter() {
    let mut mirror = reduce_all(&base(), &delta_stream()).mirror;

    // Guest X (away #2) leaves after quarter 1.
    mirror = reduce(
        &mirror,
        &event(
            "player_removed",
            json!({"team": "AWAY", "lineups": [lineup(3, "AWAY", 1, "Choi")]}),
        ),
    )
    .mirror;
    // A later quarter_updated from the server carries no snapshot at all.
    mirror = reduce(
        &mirror,
        &event(
            "quarter_updated",
            json!({"number": 1, "status": "ENDED", "playing": {"home": [1, 2], "away": [1, 2]},
                   "score": {"home": 9, "away": 4}}),
        ),
    )
    .mirror;

    let projection = project(view(&mirror), &ProjectionOptions::default());
    let names: Vec<_> = projection.quarters[0]
        .playing
        .away
        .iter()
        .map(|n| n.name.as_str())
        .collect();
    assert_eq!(names, vec!["Choi", "Guest X"]);
}

// ===========================================================================
// Test: Terminal and lifecycle events
// ===========================================================================

#[test]
fn game_deleted_is_terminal_for_every_event() {
    let gone = reduce(&base(), &event("game_deleted", Value::Null)).mirror;
    let mut all = delta_stream();
    all.push(event("game_state", snapshot(vec![], vec![], vec![])));
    assert_eq!(reduce_all(&gone, &all).mirror, Mirror::Gone);
}

#[test]
fn game_end_then_stale_start_keeps_finished() {
    let ended = reduce(&base(), &event("game_ended", json!({"game": game("FINISHED")}))).mirror;
    let replay = reduce(&ended, &event("game_started", game("IN_PROGRESS"))).mirror;
    assert_eq!(view(&replay).game.status, GameStatus::Finished);
}

#[test]
fn toggle_reaches_projection_counts() {
    let mirror = reduce_all(&base(), &delta_stream()).mirror;
    let v = view(&mirror);
    assert_eq!(v.entry(Team::Home, 2).map(|e| e.playing_status), Some(PlayingStatus::Bench));
    let projection = project(v, &ProjectionOptions::default());
    assert_eq!(projection.panels.home.bench_count, 1);
    assert_eq!(projection.totals.home, 9);
}
