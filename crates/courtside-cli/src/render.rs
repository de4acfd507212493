// Plain-text rendering of a game projection for the terminal.

use std::fmt::Write;

use courtside_core::model::{GameStatus, Mirror, QuarterStatus, Team};
use courtside_core::projection::{GameProjection, NamedNumber, TeamPanel};

pub fn render(mirror: &Mirror, projection: Option<&GameProjection>) -> String {
    match (mirror, projection) {
        (Mirror::Gone, _) => "game was deleted\n".to_string(),
        (_, None) => "loading...\n".to_string(),
        (_, Some(p)) => render_projection(p),
    }
}

fn status_label(status: GameStatus) -> &'static str {
    match status {
        GameStatus::Preparing => "preparing",
        GameStatus::InProgress => "in progress",
        GameStatus::Finished => "finished",
    }
}

fn render_projection(p: &GameProjection) -> String {
    let mut out = String::new();

    let _ = write!(
        out,
        "{} {} - {} {}  [{}",
        p.panels.home.name,
        p.totals.home,
        p.totals.away,
        p.panels.away.name,
        status_label(p.status)
    );
    if let Some(q) = p.live_quarter {
        let _ = write!(out, ", Q{q} live");
    }
    if let Some(winner) = p.winner {
        let _ = write!(out, ", {} wins", p.panels.get(winner).name);
    }
    let _ = writeln!(out, "]");

    for team in Team::BOTH {
        render_panel(&mut out, p.panels.get(team));
    }

    for q in &p.quarters {
        let status = match q.status {
            QuarterStatus::InProgress => "live",
            QuarterStatus::Ended => "ended",
            QuarterStatus::Cancelled => "cancelled",
        };
        let _ = writeln!(
            out,
            "  Q{} {:<9} {:>3}-{:<3} (total {}-{})",
            q.number,
            status,
            q.points.home,
            q.points.away,
            q.cumulative.home,
            q.cumulative.away
        );
        for team in Team::BOTH {
            let court = q.playing.get(team);
            if !court.is_empty() {
                let _ = writeln!(out, "      {team}: {}", names(court));
            }
        }
    }

    if p.can_start_quarter {
        let _ = writeln!(out, "  next quarter can start");
    }
    out
}

fn render_panel(out: &mut String, panel: &TeamPanel) {
    let _ = writeln!(
        out,
        "{} ({}): {} playing, {} bench",
        panel.name, panel.total, panel.playing_count, panel.bench_count
    );
    for group in &panel.groups {
        if let Some(team_id) = &group.team_id {
            let _ = writeln!(out, "  [{team_id}]");
        }
        for row in &group.rows {
            let _ = writeln!(
                out,
                "  #{:<3} {}{}  (id {}, {:?})",
                row.number,
                row.display_name,
                if row.is_guest { " *" } else { "" },
                row.id,
                row.playing_status
            );
        }
    }
}

fn names(list: &[NamedNumber]) -> String {
    list.iter()
        .map(|n| format!("#{} {}", n.number, n.name))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtside_core::model::GameView;
    use courtside_core::projection::{project, ProjectionOptions};
    use serde_json::json;

    fn view() -> GameView {
        serde_json::from_value(json!({
            "game": {
                "id": "g1",
                "status": "IN_PROGRESS",
                "team_home": "Hawks",
                "team_away": "Owls",
                "current_quarter": 1,
                "created_at": "2024-05-04T18:00:00Z",
            },
            "lineups": {
                "home": [{"id": 1, "team": "HOME", "number": 1, "member_name": "Yoon",
                          "arrived_at": "2024-05-04T19:00:00Z"}],
                "away": [],
            },
            "quarters": [{
                "number": 1,
                "status": "IN_PROGRESS",
                "playing": {"home": [1], "away": []},
                "lineup_snapshot": {"home": {"1": {"name": "Yoon"}}},
                "score": {"home": 12, "away": 9},
            }],
        }))
        .unwrap()
    }

    #[test]
    fn header_shows_score_and_live_quarter() {
        let view = view();
        let p = project(&view, &ProjectionOptions::default());
        let text = render(&Mirror::Live(view), Some(&p));
        let header = text.lines().next().unwrap();
        assert_eq!(header, "Hawks 12 - 9 Owls  [in progress, Q1 live]");
        assert!(text.contains("HOME: #1 Yoon"));
    }

    #[test]
    fn placeholder_before_load_and_after_delete() {
        assert_eq!(render(&Mirror::Pending, None), "loading...\n");
        assert_eq!(render(&Mirror::Gone, None), "game was deleted\n");
    }
}
