// View projection: render-ready groupings derived from a GameView.
//
// Everything here is a pure function of the view and the display options.
// Presentation-only concerns (sorting, duplicate-name suffixes, scoreboard
// arithmetic) live here and nowhere else.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{
    GameStatus, GameView, LineupEntry, LineupId, PlayingStatus, Quarter, QuarterStatus, Score,
    Team, TeamPair, MAX_QUARTERS,
};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RosterSort {
    /// Arrival order, ties broken by number.
    #[default]
    Arrival,
    Alphabetical,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionOptions {
    #[serde(default)]
    pub sort: RosterSort,
    /// Split each panel by the members' registered sub-team.
    #[serde(default)]
    pub group_by_team: bool,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRow {
    pub id: LineupId,
    pub number: u32,
    pub display_name: String,
    pub is_guest: bool,
    pub playing_status: PlayingStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterGroup {
    /// `None` collects members without a registered sub-team, and is the
    /// only group when grouping is off.
    pub team_id: Option<String>,
    pub rows: Vec<RosterRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamPanel {
    pub team: Team,
    pub name: String,
    pub groups: Vec<RosterGroup>,
    pub playing_count: usize,
    pub bench_count: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedNumber {
    pub number: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarterRow {
    pub number: u32,
    pub status: QuarterStatus,
    /// Points scored in this quarter alone.
    pub points: TeamPair<i64>,
    /// Running total at the end of this quarter.
    pub cumulative: Score,
    pub playing: TeamPair<Vec<NamedNumber>>,
    pub bench: TeamPair<Vec<NamedNumber>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameProjection {
    pub status: GameStatus,
    pub panels: TeamPair<TeamPanel>,
    pub live_quarter: Option<u32>,
    pub current_quarter: u32,
    pub totals: Score,
    pub quarters: Vec<QuarterRow>,
    pub can_start_quarter: bool,
    /// Side ahead on points once the game is finished. `None` on a tie.
    pub winner: Option<Team>,
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

pub fn project(view: &GameView, options: &ProjectionOptions) -> GameProjection {
    let names = display_names(view);
    let panels = TeamPair::new(
        team_panel(view, Team::Home, &names, options),
        team_panel(view, Team::Away, &names, options),
    );

    let quarters = quarter_rows(view);
    let totals = running_total(&view.quarters);
    let live_quarter = view.live_quarter().map(|q| q.number);

    let winner = match view.game.status {
        GameStatus::Finished if totals.home > totals.away => Some(Team::Home),
        GameStatus::Finished if totals.away > totals.home => Some(Team::Away),
        _ => None,
    };

    GameProjection {
        status: view.game.status,
        panels,
        live_quarter,
        current_quarter: view.game.current_quarter,
        totals,
        quarters,
        can_start_quarter: can_start_quarter(view),
        winner,
    }
}

/// A new quarter needs a game in progress, no live quarter, and room under
/// the quarter limit.
pub fn can_start_quarter(view: &GameView) -> bool {
    view.game.status == GameStatus::InProgress
        && view.live_quarter().is_none()
        && view.quarters.len() < MAX_QUARTERS
}

/// Game total: the cumulative score of the last quarter that was not
/// cancelled.
pub fn running_total(quarters: &[Quarter]) -> Score {
    quarters
        .iter()
        .rev()
        .find(|q| q.status != QuarterStatus::Cancelled)
        .map(|q| q.score.clone())
        .unwrap_or_default()
}

/// Display names keyed by lineup id. Members sharing a name across the game
/// get an id suffix long enough to tell them apart.
fn display_names(view: &GameView) -> HashMap<LineupId, String> {
    let mut by_name: HashMap<&str, Vec<&LineupEntry>> = HashMap::new();
    for entry in view.lineups.home.iter().chain(view.lineups.away.iter()) {
        by_name
            .entry(entry.member_name.as_str())
            .or_default()
            .push(entry);
    }

    let mut names = HashMap::new();
    for (name, group) in by_name {
        if let [only] = group.as_slice() {
            names.insert(only.id, name.to_string());
            continue;
        }
        for (entry, suffix) in group.iter().zip(short_ids(&group)) {
            names.insert(entry.id, format!("{name} ({suffix})"));
        }
    }
    names
}

const SHORT_ID_WIDTH: usize = 4;

/// The shortest id tails (at least four characters) that are distinct
/// across `group`. Ids sharing a prefix differ at the end.
fn short_ids(group: &[&LineupEntry]) -> Vec<String> {
    let ids: Vec<Vec<char>> = group
        .iter()
        .map(|entry| match &entry.member_id {
            Some(member_id) => member_id.chars().collect(),
            None => entry.id.to_string().chars().collect(),
        })
        .collect();
    let longest = ids.iter().map(Vec::len).max().unwrap_or(0);

    let width = (SHORT_ID_WIDTH..longest)
        .find(|&width| {
            let tails: HashSet<&[char]> = ids.iter().map(|id| tail(id, width)).collect();
            tails.len() == ids.len()
        })
        .unwrap_or(longest);

    ids.iter().map(|id| tail(id, width).iter().collect()).collect()
}

fn tail(id: &[char], width: usize) -> &[char] {
    &id[id.len().saturating_sub(width)..]
}

fn team_panel(
    view: &GameView,
    team: Team,
    names: &HashMap<LineupId, String>,
    options: &ProjectionOptions,
) -> TeamPanel {
    let entries = view.lineups.get(team);

    let mut sorted: Vec<&LineupEntry> = entries.iter().collect();
    match options.sort {
        RosterSort::Arrival => sorted.sort_by_key(|e| (e.arrived_at, e.number)),
        RosterSort::Alphabetical => {
            sorted.sort_by_key(|e| (e.member_name.to_lowercase(), e.number))
        }
    }

    let row = |entry: &LineupEntry| RosterRow {
        id: entry.id,
        number: entry.number,
        display_name: names
            .get(&entry.id)
            .cloned()
            .unwrap_or_else(|| entry.member_name.clone()),
        is_guest: entry.is_guest,
        playing_status: entry.playing_status,
    };

    let groups = if options.group_by_team {
        let mut by_team: BTreeMap<&str, Vec<RosterRow>> = BTreeMap::new();
        let mut unaffiliated = Vec::new();
        for entry in &sorted {
            match entry.team_id.as_deref() {
                Some(team_id) => by_team.entry(team_id).or_default().push(row(entry)),
                None => unaffiliated.push(row(entry)),
            }
        }
        let mut groups: Vec<RosterGroup> = by_team
            .into_iter()
            .map(|(team_id, rows)| RosterGroup {
                team_id: Some(team_id.to_string()),
                rows,
            })
            .collect();
        if !unaffiliated.is_empty() {
            groups.push(RosterGroup {
                team_id: None,
                rows: unaffiliated,
            });
        }
        groups
    } else {
        vec![RosterGroup {
            team_id: None,
            rows: sorted.iter().map(|e| row(e)).collect(),
        }]
    };

    let playing_count = entries
        .iter()
        .filter(|e| e.playing_status == PlayingStatus::Playing)
        .count();

    TeamPanel {
        team,
        name: view.game.team_name(team).to_string(),
        groups,
        playing_count,
        bench_count: entries.len() - playing_count,
        total: entries.len(),
    }
}

fn quarter_rows(view: &GameView) -> Vec<QuarterRow> {
    let mut previous = Score::default();
    view.quarters
        .iter()
        .map(|quarter| {
            let points = if quarter.status == QuarterStatus::Cancelled {
                TeamPair::default()
            } else {
                let points = TeamPair::new(
                    i64::from(quarter.score.home) - i64::from(previous.home),
                    i64::from(quarter.score.away) - i64::from(previous.away),
                );
                previous = quarter.score.clone();
                points
            };

            let named = |team: Team, numbers: &[u32]| -> Vec<NamedNumber> {
                numbers
                    .iter()
                    .map(|&number| NamedNumber {
                        number,
                        name: resolve_name(view, quarter, team, number),
                    })
                    .collect()
            };

            QuarterRow {
                number: quarter.number,
                status: quarter.status,
                points,
                cumulative: quarter.score.clone(),
                playing: TeamPair::new(
                    named(Team::Home, &quarter.playing.home),
                    named(Team::Away, &quarter.playing.away),
                ),
                bench: TeamPair::new(
                    named(Team::Home, &quarter.bench.home),
                    named(Team::Away, &quarter.bench.away),
                ),
            }
        })
        .collect()
}

/// Name shown for a number inside a quarter: the name frozen at quarter
/// start, then whoever holds the number now, then `#n`.
pub fn resolve_name(view: &GameView, quarter: &Quarter, team: Team, number: u32) -> String {
    if let Some(name) = quarter.snapshot_name(team, number) {
        return name.to_string();
    }
    match view.entry(team, number) {
        Some(entry) => entry.member_name.clone(),
        None => format!("#{number}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{capture_snapshot, Game};
    use chrono::{Duration, TimeZone, Utc};

    fn entry(id: i64, team: Team, number: u32, name: &str, minute: i64) -> LineupEntry {
        LineupEntry {
            id,
            team,
            number,
            member_name: name.into(),
            member_id: None,
            team_id: None,
            is_guest: false,
            playing_status: PlayingStatus::Playing,
            arrived_at: Utc.with_ymd_and_hms(2024, 5, 4, 19, 0, 0).unwrap()
                + Duration::minutes(minute),
        }
    }

    fn quarter(number: u32, status: QuarterStatus, home: u32, away: u32) -> Quarter {
        Quarter {
            number,
            status,
            playing: TeamPair::default(),
            bench: TeamPair::default(),
            lineup_snapshot: TeamPair::default(),
            score: Score::new(home, away),
        }
    }

    fn view() -> GameView {
        let mut view = GameView::new(Game {
            id: "g1".into(),
            status: GameStatus::InProgress,
            team_home: Some("Hawks".into()),
            team_away: Some("Owls".into()),
            current_quarter: 0,
            created_at: Utc.with_ymd_and_hms(2024, 5, 4, 18, 0, 0).unwrap(),
            started_at: None,
        });
        view.lineups.home = vec![
            entry(1, Team::Home, 1, "Yoon", 0),
            entry(2, Team::Home, 2, "Baek", 5),
        ];
        view.lineups.away = vec![entry(3, Team::Away, 1, "Choi", 2)];
        view
    }

    #[test]
    fn panels_use_team_names_and_counts() {
        let mut v = view();
        v.lineups.home[1].playing_status = PlayingStatus::Bench;
        let p = project(&v, &ProjectionOptions::default());

        assert_eq!(p.panels.home.name, "Hawks");
        assert_eq!(p.panels.home.playing_count, 1);
        assert_eq!(p.panels.home.bench_count, 1);
        assert_eq!(p.panels.away.total, 1);
    }

    #[test]
    fn alphabetical_sort_reorders_rows() {
        let opts = ProjectionOptions {
            sort: RosterSort::Alphabetical,
            group_by_team: false,
        };
        let p = project(&view(), &opts);
        let names: Vec<_> = p.panels.home.groups[0]
            .rows
            .iter()
            .map(|r| r.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["Baek", "Yoon"]);

        let p = project(&view(), &ProjectionOptions::default());
        assert_eq!(p.panels.home.groups[0].rows[0].display_name, "Yoon");
    }

    #[test]
    fn duplicate_names_get_short_id() {
        let mut v = view();
        v.lineups.away[0].member_name = "Yoon".into();
        v.lineups.away[0].member_id = Some("m-20931".into());
        let p = project(&v, &ProjectionOptions::default());

        assert_eq!(p.panels.home.groups[0].rows[0].display_name, "Yoon (1)");
        assert_eq!(p.panels.away.groups[0].rows[0].display_name, "Yoon (0931)");
        assert_eq!(p.panels.home.groups[0].rows[1].display_name, "Baek");
    }

    #[test]
    fn shared_id_prefix_still_tells_names_apart() {
        let mut v = view();
        v.lineups.home[0].member_id = Some("m-20777".into());
        v.lineups.away[0].member_name = "Yoon".into();
        v.lineups.away[0].member_id = Some("m-20931".into());
        let p = project(&v, &ProjectionOptions::default());

        let home = &p.panels.home.groups[0].rows[0].display_name;
        let away = &p.panels.away.groups[0].rows[0].display_name;
        assert_eq!(home, "Yoon (0777)");
        assert_eq!(away, "Yoon (0931)");
    }

    #[test]
    fn short_id_grows_until_unique() {
        let mut v = view();
        v.lineups.home[0].member_id = Some("a-10931".into());
        v.lineups.away[0].member_name = "Yoon".into();
        v.lineups.away[0].member_id = Some("b-20931".into());
        let p = project(&v, &ProjectionOptions::default());

        assert_eq!(p.panels.home.groups[0].rows[0].display_name, "Yoon (10931)");
        assert_eq!(p.panels.away.groups[0].rows[0].display_name, "Yoon (20931)");
    }

    #[test]
    fn grouping_puts_unaffiliated_last() {
        let mut v = view();
        v.lineups.home[1].team_id = Some("t-red".into());
        let opts = ProjectionOptions {
            sort: RosterSort::Arrival,
            group_by_team: true,
        };
        let p = project(&v, &opts);
        let groups = &p.panels.home.groups;
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].team_id.as_deref(), Some("t-red"));
        assert_eq!(groups[1].team_id, None);
        assert_eq!(groups[1].rows[0].display_name, "Yoon");
    }

    #[test]
    fn scoreboard_uses_cumulative_scores() {
        let mut v = view();
        v.quarters = vec![
            quarter(1, QuarterStatus::Ended, 12, 9),
            quarter(2, QuarterStatus::Cancelled, 0, 0),
            quarter(3, QuarterStatus::InProgress, 20, 21),
        ];
        let p = project(&v, &ProjectionOptions::default());

        assert_eq!(p.totals, Score::new(20, 21));
        assert_eq!(p.quarters[0].points, TeamPair::new(12, 9));
        assert_eq!(p.quarters[1].points, TeamPair::new(0, 0));
        assert_eq!(p.quarters[2].points, TeamPair::new(8, 12));
        assert_eq!(p.live_quarter, Some(3));
        assert!(!p.can_start_quarter);
    }

    #[test]
    fn quarter_names_come_from_snapshot() {
        let mut v = view();
        let mut q1 = quarter(1, QuarterStatus::Ended, 0, 0);
        q1.playing.home = vec![1, 2, 7];
        q1.lineup_snapshot = capture_snapshot(&v.lineups);
        v.quarters = vec![q1];

        // #2 left and the number now resolves nowhere in the roster.
        v.lineups.home.remove(1);
        v.lineups.home[0].member_name = "Renamed".into();

        let p = project(&v, &ProjectionOptions::default());
        let names: Vec<_> = p.quarters[0]
            .playing
            .home
            .iter()
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(names, vec!["Yoon", "Baek", "#7"]);
    }

    #[test]
    fn roster_fallback_without_snapshot() {
        let mut v = view();
        let mut q1 = quarter(1, QuarterStatus::Ended, 0, 0);
        q1.bench.away = vec![1];
        v.quarters = vec![q1];
        let p = project(&v, &ProjectionOptions::default());
        assert_eq!(p.quarters[0].bench.away[0].name, "Choi");
    }

    #[test]
    fn start_gated_by_status_and_limit() {
        let mut v = view();
        assert!(can_start_quarter(&v));

        v.quarters = (1..=10)
            .map(|n| quarter(n, QuarterStatus::Ended, n, n))
            .collect();
        assert!(!can_start_quarter(&v));

        v.quarters.clear();
        v.game.status = GameStatus::Preparing;
        assert!(!can_start_quarter(&v));
    }

    #[test]
    fn finished_game_names_winner() {
        let mut v = view();
        v.game.status = GameStatus::Finished;
        v.quarters = vec![quarter(1, QuarterStatus::Ended, 30, 28)];
        let p = project(&v, &ProjectionOptions::default());
        assert_eq!(p.winner, Some(Team::Home));

        v.quarters[0].score = Score::new(28, 28);
        assert_eq!(project(&v, &ProjectionOptions::default()).winner, None);
    }
}
