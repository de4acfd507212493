// Courtside terminal client.
//
// Startup sequence:
// 1. Initialize tracing (log to file, stdout is for the game view)
// 2. Load config
// 3. Connect the session (WebSocket transport + REST client)
// 4. Subscribe to the game named on the command line
// 5. Redraw on every mirror change; read commands from stdin
// 6. Leave the game and shut the session down on quit or Ctrl+C

mod command;
mod render;

use anyhow::Context;
use command::Command;
use courtside_sync::config;
use courtside_sync::session::{GameSession, GameSubscription};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Courtside starting up");

    let game_id = std::env::args()
        .nth(1)
        .context("usage: courtside <game-id>")?;

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: api={}, ws={}, {} reconnect attempts",
        config.server.api_url, config.server.ws_url, config.realtime.reconnection_attempts
    );

    // 3. Connect
    let session = GameSession::connect(&config);

    // 4. Subscribe
    let sub = session
        .subscribe(&game_id)
        .await
        .context("failed to open game")?;
    let mut mirror = sub.receiver();
    println!("following game {game_id} (type `help` for commands)");

    // 5. Redraw and command loop
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            changed = mirror.changed() => {
                if changed.is_err() {
                    info!("Session stopped publishing");
                    break;
                }
                let current = mirror.borrow_and_update().clone();
                print!("{}", render::render(&current, sub.projection().as_ref()));
            }

            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if !run_command(&sub, &line).await {
                        break;
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("Failed to read stdin: {e}");
                    stdin_open = false;
                }
            },

            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received");
                break;
            }
        }
    }

    // 6. Cleanup
    drop(sub);
    session.shutdown().await;
    info!("Courtside shut down cleanly");
    Ok(())
}

/// Execute one typed command. Returns false when the user asked to quit.
async fn run_command(sub: &GameSubscription, line: &str) -> bool {
    let command = match command::parse(line) {
        Ok(command) => command,
        Err(e) => {
            println!("{e}");
            return true;
        }
    };

    let result = match command {
        Command::Help => {
            println!("{}", command::HELP);
            return true;
        }
        Command::Quit => return false,
        Command::Sync => {
            sub.reconcile();
            return true;
        }
        Command::StartQuarter(playing) => {
            let plan = match sub.current().view() {
                Some(view) => command::plan_quarter(view, &playing),
                None => Err(anyhow::anyhow!("the game has not loaded yet")),
            };
            match plan {
                Ok(plan) => sub.start_quarter(plan).await,
                Err(e) => {
                    println!("{e}");
                    return true;
                }
            }
        }
        Command::Mutate(mutation) => sub.mutate(mutation).await,
    };

    if let Err(e) = result {
        warn!("Command `{line}` failed: {e}");
        println!("{e}");
    }
    true
}

/// Initialize tracing to log to a file (stdout carries the game view).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("courtside.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("courtside=info,courtside_sync=info,courtside_core=info,warn")
        }))
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
