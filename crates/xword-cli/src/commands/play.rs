//! Play command handler
//!
//! Runs a game session and reads line commands from stdin:
//!
//! ```text
//! enter 0 0 A        clear 0 0         cursor 2 3
//! check 0 0 [1 1 ..] reveal 0 0        reset 0 0
//! ping 4 4           say hello there   join
//! name Ada           color hsl(1,2%,3%)
//! mode [autocheck] [pencil]            reconnect      quit
//! ```

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use xword_core::{
    spawn_game_task, ChatMessage, Config, Coordinates, GameClient, GameCommand, GameEngine,
    GameHandle, GameUpdate, Grid, Identity, InputMode, SessionOptions, SnapshotStore,
    SnapshotTarget, WebSocketTransport,
};

use crate::output::Output;
use crate::puzzle::load_puzzle;

/// Options for `xword play`
#[derive(Debug, Clone, Default)]
pub struct PlayOptions {
    pub puzzle: Option<PathBuf>,
    pub game: Option<String>,
    pub offline: bool,
    pub defer_join: bool,
    pub autocheck: bool,
    pub pencil: bool,
}

/// One parsed stdin line
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Command(GameCommand),
    Quit,
}

/// Start a session and play until stdin closes or `quit`
pub async fn play(options: PlayOptions, config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    config.offline |= options.offline;
    config.defer_join |= options.defer_join;

    let identity = Identity::load(&config)?;
    let puzzle = options.puzzle.as_deref().map(load_puzzle).transpose()?;
    let (grid, clues) = puzzle
        .as_ref()
        .map(|p| (p.grid(), p.clues()))
        .unwrap_or_default();
    let store = SnapshotStore::from_config(&config);

    let (session_id, target) = if config.is_offline() {
        let Some(puzzle) = &puzzle else {
            bail!("Offline play needs a puzzle file (--puzzle)");
        };
        (puzzle.pid.clone(), SnapshotTarget::offline(store, &puzzle.pid))
    } else {
        let game_id = options
            .game
            .clone()
            .context("Online play needs a game id (--game), or use --offline")?;
        (game_id.clone(), SnapshotTarget::game(store, game_id))
    };

    let mut engine = GameEngine::new(identity.user_id.clone(), grid.clone(), clues)
        .with_snapshots(target);
    engine.set_input_mode(InputMode {
        autocheck: options.autocheck,
        pencil: options.pencil,
    });
    let session = SessionOptions::from_config(&session_id, &config);

    let client = match config.server_url.as_deref() {
        Some(url) if !config.is_offline() => {
            info!("Playing {} on {}", session_id, url);
            let transport = WebSocketTransport::new(url);
            GameClient::new(session, identity, engine, Box::new(transport))
        }
        _ => GameClient::offline(session, identity, engine),
    };

    output.message(&format!("Playing {}. Type 'quit' to leave.", session_id));
    let board = if grid.is_empty() { None } else { Some(grid) };
    run_session(spawn_game_task(client), board, output).await
}

async fn run_session(
    mut handle: GameHandle,
    mut grid: Option<Grid>,
    output: &Output,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut chat = ChatLog::default();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_line(&line) {
                    Ok(Some(Input::Quit)) => break,
                    Ok(Some(Input::Command(command))) => handle.send(command).await?,
                    Ok(None) => {}
                    Err(e) => eprintln!("{}", e),
                }
            }
            update = handle.updates.recv() => {
                let Some(update) = update else { break };
                track_grid(&mut grid, &update);
                match &update {
                    GameUpdate::SolutionChanged { solution, state, .. } => {
                        output.print_board(grid.as_ref(), solution, *state)
                    }
                    GameUpdate::ChatReceived { message, .. } => {
                        if chat.accept(message) {
                            output.print_update(&update);
                            if let Some(ts) = message.timestamp {
                                handle.send(GameCommand::MarkChatRead(ts)).await?;
                            }
                        }
                    }
                    _ => output.print_update(&update),
                }
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

/// Adopt the grid of a puzzle resolved during the session
fn track_grid(grid: &mut Option<Grid>, update: &GameUpdate) {
    if let GameUpdate::PuzzleLoaded(loaded) = update {
        *grid = Some(loaded.clone());
    }
}

/// Drops the server echo of chat lines already shown optimistically
#[derive(Debug, Default)]
pub struct ChatLog {
    seen: HashSet<String>,
}

impl ChatLog {
    /// True the first time a message is seen
    pub fn accept(&mut self, message: &ChatMessage) -> bool {
        match &message.client_message_id {
            Some(id) => self.seen.insert(id.clone()),
            None => true,
        }
    }
}

/// Parse one line of player input; blank lines yield `None`
pub fn parse_line(line: &str) -> Result<Option<Input>> {
    let line = line.trim();
    let Some((verb, rest)) = split_verb(line) else {
        return Ok(None);
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    let command = match verb {
        "quit" | "exit" => return Ok(Some(Input::Quit)),
        "enter" => {
            let [r, c, value] = args[..] else {
                bail!("usage: enter <row> <col> <value>");
            };
            GameCommand::Enter {
                at: coordinates(r, c)?,
                value: value.to_string(),
            }
        }
        "clear" => GameCommand::Clear(single(&args, verb)?),
        "cursor" => GameCommand::MoveCursor(single(&args, verb)?),
        "ping" => GameCommand::Ping(single(&args, verb)?),
        "check" => GameCommand::Check(cells(&args, verb)?),
        "reveal" => GameCommand::Reveal(cells(&args, verb)?),
        "reset" => GameCommand::Reset(cells(&args, verb)?),
        "say" => {
            if rest.is_empty() {
                bail!("usage: say <message>");
            }
            GameCommand::SendMessage(rest.to_string())
        }
        "name" => GameCommand::SetDisplayName(required(rest, "usage: name <display name>")?),
        "color" => GameCommand::SetColor(required(rest, "usage: color <css color>")?),
        "mode" => GameCommand::SetInputMode(InputMode {
            autocheck: args.contains(&"autocheck"),
            pencil: args.contains(&"pencil"),
        }),
        "join" => GameCommand::Join,
        "reconnect" => GameCommand::Reconnect,
        other => bail!("unknown command '{}'", other),
    };
    Ok(Some(Input::Command(command)))
}

fn split_verb(line: &str) -> Option<(&str, &str)> {
    if line.is_empty() {
        return None;
    }
    Some(match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    })
}

fn required(rest: &str, usage: &str) -> Result<String> {
    if rest.is_empty() {
        bail!("{}", usage);
    }
    Ok(rest.to_string())
}

fn coordinates(r: &str, c: &str) -> Result<Coordinates> {
    let r = r.parse().with_context(|| format!("bad row '{}'", r))?;
    let c = c.parse().with_context(|| format!("bad column '{}'", c))?;
    Ok(Coordinates::new(r, c))
}

fn single(args: &[&str], verb: &str) -> Result<Coordinates> {
    match args {
        [r, c] => coordinates(r, c),
        _ => bail!("usage: {} <row> <col>", verb),
    }
}

fn cells(args: &[&str], verb: &str) -> Result<Vec<Coordinates>> {
    if args.is_empty() || args.len() % 2 != 0 {
        bail!("usage: {} <row> <col> [<row> <col> ...]", verb);
    }
    args.chunks(2)
        .map(|pair| coordinates(pair[0], pair[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(line: &str) -> GameCommand {
        match parse_line(line).unwrap() {
            Some(Input::Command(command)) => command,
            other => panic!("expected a command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_cell_commands() {
        assert_eq!(
            command("enter 1 2 q"),
            GameCommand::Enter {
                at: Coordinates::new(1, 2),
                value: "q".into()
            }
        );
        assert_eq!(command("clear 0 0"), GameCommand::Clear(Coordinates::new(0, 0)));
        assert_eq!(
            command("check 0 0 1 1"),
            GameCommand::Check(vec![Coordinates::new(0, 0), Coordinates::new(1, 1)])
        );
        assert_eq!(
            command("  ping 3 4 "),
            GameCommand::Ping(Coordinates::new(3, 4))
        );
    }

    #[test]
    fn test_parse_text_commands() {
        assert_eq!(
            command("say hello   there"),
            GameCommand::SendMessage("hello   there".into())
        );
        assert_eq!(
            command("name Ada Lovelace"),
            GameCommand::SetDisplayName("Ada Lovelace".into())
        );
        assert_eq!(
            command("mode pencil"),
            GameCommand::SetInputMode(InputMode {
                autocheck: false,
                pencil: true
            })
        );
        assert_eq!(parse_line("quit").unwrap(), Some(Input::Quit));
        assert_eq!(parse_line("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_line("enter 1 2").is_err());
        assert!(parse_line("check 1").is_err());
        assert!(parse_line("cursor a b").is_err());
        assert!(parse_line("say").is_err());
        assert!(parse_line("dance").is_err());
    }

    #[test]
    fn test_grid_adopted_when_puzzle_loads() {
        let mut grid = None;
        track_grid(&mut grid, &GameUpdate::Rejected(xword_core::GameError::NoPuzzle));
        assert!(grid.is_none());

        let loaded = Grid::from_rows([["A", "."]]);
        track_grid(&mut grid, &GameUpdate::PuzzleLoaded(loaded.clone()));
        assert_eq!(grid, Some(loaded));
    }

    #[test]
    fn test_chat_log_drops_echo() {
        let mut log = ChatLog::default();
        let message = ChatMessage {
            sender_id: "me".into(),
            sender: "Me".into(),
            text: "hi".into(),
            client_message_id: Some("c1".into()),
            timestamp: None,
        };
        assert!(log.accept(&message));
        assert!(!log.accept(&message));

        let anonymous = ChatMessage {
            client_message_id: None,
            ..message
        };
        assert!(log.accept(&anonymous));
        assert!(log.accept(&anonymous));
    }
}
