//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag), one object per line while playing
//! - Quiet mode for scripting (--quiet flag)

use chrono::{TimeZone, Utc};
use serde_json::json;
use xword_core::{ChatMessage, GameUpdate, Grid, Player, SaveState, Solution, SolutionState};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print the board
    pub fn print_board(&self, grid: Option<&Grid>, solution: &Solution, state: SolutionState) {
        match self.format {
            OutputFormat::Human => {
                println!("{}", render_board(grid, solution));
                println!(
                    "{}/{} filled, {}",
                    solution.filled_count(),
                    fillable(grid, solution),
                    state_label(state)
                );
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    json!({"type": "board", "state": state, "solution": solution})
                );
            }
            OutputFormat::Quiet => println!("{}", state_label(state)),
        }
    }

    /// Print a saved snapshot
    pub fn print_snapshot(&self, id: &str, state: &SaveState, grid: Option<&Grid>) {
        let solved = grid.map(|g| xword_core::grid::resolve_solution_state(g, &state.solution));
        match self.format {
            OutputFormat::Human => {
                println!("Game: {}", id);
                println!(
                    "Size: {}x{}",
                    state.solution.rows(),
                    state.solution.cols()
                );
                if let Some(ts) = state.last_read_chat {
                    println!("Chat read up to: {}", format_timestamp(ts));
                }
                println!();
                println!("{}", render_board(grid, &state.solution));
                match solved {
                    Some(s) => println!("{}", state_label(s)),
                    None => println!("{} square(s) filled", state.solution.filled_count()),
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "id": id,
                        "state": solved,
                        "lastReadChat": state.last_read_chat,
                        "solution": state.solution,
                    })
                );
            }
            OutputFormat::Quiet => {
                println!("{}", state.solution.filled_count());
            }
        }
    }

    /// Print one update from the game task
    ///
    /// Solution updates are printed by the caller, which knows the grid.
    pub fn print_update(&self, update: &GameUpdate) {
        match self.format {
            OutputFormat::Human => {
                if let Some(line) = describe(update) {
                    println!("{}", line);
                }
            }
            OutputFormat::Json => println!("{}", update_json(update)),
            OutputFormat::Quiet => {
                if let GameUpdate::Rejected(e) = update {
                    eprintln!("{}", e);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Board as text: `#` block, `.` empty, otherwise the first letter entered
pub fn render_board(grid: Option<&Grid>, solution: &Solution) -> String {
    solution
        .cells()
        .iter()
        .enumerate()
        .map(|(r, row)| {
            row.iter()
                .enumerate()
                .map(|(c, entry)| {
                    let at = xword_core::Coordinates::new(r, c);
                    if grid.and_then(|g| g.cell(at)).is_some_and(|cell| cell.is_block()) {
                        return '#';
                    }
                    entry
                        .as_ref()
                        .and_then(|e| e.value.chars().next())
                        .unwrap_or('.')
                })
                .map(String::from)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn fillable(grid: Option<&Grid>, solution: &Solution) -> usize {
    match grid {
        Some(grid) => grid.answers().iter().filter(|a| a.is_some()).count(),
        None => solution.rows() * solution.cols(),
    }
}

fn state_label(state: SolutionState) -> &'static str {
    match state {
        SolutionState::Correct => "solved",
        SolutionState::Incorrect => "complete but incorrect",
        SolutionState::Incomplete => "in progress",
    }
}

fn format_timestamp(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn chat_line(message: &ChatMessage, from: Option<&Player>) -> String {
    let name = from.map(Player::label).unwrap_or(message.sender.as_str());
    match message.sent_at() {
        Some(at) => format!("[{}] <{}> {}", at.format("%H:%M"), name, message.text),
        None => format!("<{}> {}", name, message.text),
    }
}

fn describe(update: &GameUpdate) -> Option<String> {
    match update {
        GameUpdate::SolutionChanged { .. } | GameUpdate::CursorsChanged(_) => None,
        GameUpdate::ChatReceived { message, from } => Some(chat_line(message, from.as_ref())),
        GameUpdate::PlayerJoined(player) => Some(format!("* {} joined", player.label())),
        GameUpdate::PingReceived { user_id, cell } => {
            Some(format!("* {} pinged {}", user_id, cell))
        }
        GameUpdate::PuzzleLoaded(grid) => {
            Some(format!("* puzzle loaded ({}x{})", grid.rows(), grid.cols()))
        }
        GameUpdate::ConnectionChanged(state) => Some(format!("* {}", state)),
        GameUpdate::Rejected(e) => Some(format!("! {}", e)),
    }
}

fn update_json(update: &GameUpdate) -> serde_json::Value {
    match update {
        GameUpdate::SolutionChanged {
            solution,
            is_bulk,
            state,
        } => json!({"type": "solution", "bulk": is_bulk, "state": state, "solution": solution}),
        GameUpdate::CursorsChanged(cursors) => json!({"type": "cursors", "cursors": cursors}),
        GameUpdate::ChatReceived { message, from } => {
            json!({"type": "chat", "message": message, "from": from})
        }
        GameUpdate::PlayerJoined(player) => json!({"type": "playerJoined", "player": player}),
        GameUpdate::PingReceived { user_id, cell } => {
            json!({"type": "ping", "userId": user_id, "cell": cell})
        }
        GameUpdate::PuzzleLoaded(grid) => {
            json!({"type": "puzzleLoaded", "rows": grid.rows(), "cols": grid.cols()})
        }
        GameUpdate::ConnectionChanged(state) => json!({"type": "connection", "state": state}),
        GameUpdate::Rejected(e) => json!({"type": "rejected", "error": e.to_string()}),
    }
}
