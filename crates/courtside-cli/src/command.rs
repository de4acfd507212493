// Line commands typed on stdin while following a game.

use anyhow::{bail, Context};
use courtside_core::lineup::{QuarterPlan, Slot, Transfer};
use courtside_core::model::{GameView, Score, Team, TeamPair};
use courtside_sync::api::{ArrivalRequest, Mutation};

pub const HELP: &str = "\
commands:
  arrive <home|away> <name...>        register an arrival
  remove <lineup-id>                  remove a lineup entry
  toggle <lineup-id>                  flip playing/bench
  swap <team> <n> <team> <n>          move a number to another slot
  start home=1,2,3,4,5 away=6,7,8,9,10
                                      start the next quarter
  end <quarter>                       end a quarter
  cancel <quarter>                    cancel a quarter
  score <quarter> <home> <away>       set a quarter's score
  begin [home-name] [away-name]       start the game
  finish                              end the game
  sync                                resync from the server
  help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Sync,
    Mutate(Mutation),
    /// Numbers on court per team; the plan is completed against the current
    /// view when submitted.
    StartQuarter(TeamPair<Vec<u32>>),
}

pub fn parse(line: &str) -> anyhow::Result<Command> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        bail!("empty command");
    };
    let args: Vec<&str> = words.collect();

    let command = match verb {
        "help" | "?" => Command::Help,
        "quit" | "q" => Command::Quit,
        "sync" => Command::Sync,
        "arrive" => {
            let [team, name @ ..] = args.as_slice() else {
                bail!("usage: {verb} <home|away> <name...>");
            };
            if name.is_empty() {
                bail!("usage: {verb} <home|away> <name...>");
            }
            Command::Mutate(Mutation::Arrival(ArrivalRequest {
                team: team_arg(team)?,
                member: name.join(" "),
                member_id: None,
                team_id: None,
            }))
        }
        "remove" => Command::Mutate(Mutation::Remove {
            lineup_id: single(&args, "remove <lineup-id>")?,
        }),
        "toggle" => Command::Mutate(Mutation::ToggleStatus {
            lineup_id: single(&args, "toggle <lineup-id>")?,
        }),
        "swap" => {
            let [from_team, from_number, to_team, to_number] = args.as_slice() else {
                bail!("usage: swap <team> <n> <team> <n>");
            };
            Command::Mutate(Mutation::Swap(Transfer::new(
                Slot::new(team_arg(from_team)?, number(from_number)?),
                Slot::new(team_arg(to_team)?, number(to_number)?),
            )))
        }
        "start" => {
            let mut playing = TeamPair::<Vec<u32>>::default();
            for arg in &args {
                let (team, list) = arg
                    .split_once('=')
                    .with_context(|| format!("expected team=numbers, got `{arg}`"))?;
                *playing.get_mut(team_arg(team)?) = list
                    .split(',')
                    .filter(|n| !n.is_empty())
                    .map(number)
                    .collect::<anyhow::Result<_>>()?;
            }
            Command::StartQuarter(playing)
        }
        "end" => Command::Mutate(Mutation::EndQuarter {
            quarter: single(&args, "end <quarter>")?,
        }),
        "cancel" => Command::Mutate(Mutation::CancelQuarter {
            quarter: single(&args, "cancel <quarter>")?,
        }),
        "score" => {
            let [quarter, home, away] = args.as_slice() else {
                bail!("usage: score <quarter> <home> <away>");
            };
            Command::Mutate(Mutation::UpdateScore {
                quarter: number(quarter)?,
                score: Score::new(number(home)?, number(away)?),
            })
        }
        "begin" => Command::Mutate(Mutation::StartGame {
            team_home: args.first().map(|s| s.to_string()),
            team_away: args.get(1).map(|s| s.to_string()),
        }),
        "finish" => Command::Mutate(Mutation::EndGame),
        other => bail!("unknown command `{other}` (try `help`)"),
    };
    Ok(command)
}

/// Complete a quarter start against `view`: listed numbers go on court,
/// everyone else on the bench.
pub fn plan_quarter(
    view: &GameView,
    playing: &TeamPair<Vec<u32>>,
) -> anyhow::Result<QuarterPlan> {
    let mut plan = QuarterPlan::from_view(view);
    for team in Team::BOTH {
        for &n in playing.get(team) {
            if !plan.toggle(team, n) {
                bail!("{team} has no player #{n}");
            }
        }
    }
    Ok(plan)
}

fn team_arg(word: &str) -> anyhow::Result<Team> {
    match word.to_ascii_lowercase().as_str() {
        "home" | "h" => Ok(Team::Home),
        "away" | "a" => Ok(Team::Away),
        _ => bail!("expected home or away, got `{word}`"),
    }
}

fn number<T: std::str::FromStr>(word: &str) -> anyhow::Result<T> {
    word.parse()
        .map_err(|_| anyhow::anyhow!("expected a number, got `{word}`"))
}

fn single<T: std::str::FromStr>(args: &[&str], usage: &str) -> anyhow::Result<T> {
    match args {
        [value] => number(value),
        _ => bail!("usage: {usage}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_swap() {
        let cmd = parse("swap home 2 away 1").unwrap();
        assert_eq!(
            cmd,
            Command::Mutate(Mutation::Swap(Transfer::new(
                Slot::new(Team::Home, 2),
                Slot::new(Team::Away, 1),
            )))
        );
    }

    #[test]
    fn arrival_keeps_full_name() {
        match parse("arrive away Kim Min Jae").unwrap() {
            Command::Mutate(Mutation::Arrival(req)) => {
                assert_eq!(req.team, Team::Away);
                assert_eq!(req.member, "Kim Min Jae");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn start_lists_court_numbers() {
        let cmd = parse("start home=1,2,3,4,5 away=3,4,5,6,7").unwrap();
        let Command::StartQuarter(playing) = cmd else {
            panic!("expected quarter start");
        };
        assert_eq!(playing.home, vec![1, 2, 3, 4, 5]);
        assert_eq!(playing.away, vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn score_needs_three_numbers() {
        assert!(parse("score 1 20").is_err());
        assert_eq!(
            parse("score 1 20 18").unwrap(),
            Command::Mutate(Mutation::UpdateScore {
                quarter: 1,
                score: Score::new(20, 18),
            })
        );
    }

    #[test]
    fn rejects_unknown_and_bad_numbers() {
        assert!(parse("dunk").is_err());
        assert!(parse("remove x").is_err());
        assert!(parse("swap left 1 away 2").is_err());
        assert!(parse("   ").is_err());
    }
}
