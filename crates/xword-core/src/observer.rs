//! Observer notifications
//!
//! The engine is the single source of truth; any number of consumers
//! subscribe and receive [`GameUpdate`]s over unbounded channels.
//! Subscribers that drop their receiver are pruned on the next send.

use std::collections::BTreeMap;

use tokio::sync::mpsc;

use crate::engine::GameError;
use crate::grid::{Grid, Solution, SolutionState};
use crate::models::{ChatMessage, Coordinates, Cursor, Player};
use crate::sync::ConnectionState;

/// Changes pushed to consumers
#[derive(Debug, Clone, PartialEq)]
pub enum GameUpdate {
    /// The solution changed; `is_bulk` marks the single update after a replay
    SolutionChanged {
        solution: Solution,
        is_bulk: bool,
        state: SolutionState,
    },
    /// Cursor positions or the players behind them changed
    CursorsChanged(BTreeMap<String, Cursor>),
    /// A chat line arrived; `from` is the sender when known
    ChatReceived {
        message: ChatMessage,
        from: Option<Player>,
    },
    /// A player set both name and color for the first time
    PlayerJoined(Player),
    /// Someone pinged a square
    PingReceived { user_id: String, cell: Coordinates },
    /// A `create` resolved a puzzle that was not known locally
    PuzzleLoaded(Grid),
    /// Connection state machine moved
    ConnectionChanged(ConnectionState),
    /// A local action was refused and nothing was sent
    Rejected(GameError),
}

impl GameUpdate {
    /// `SolutionChanged` shorthand for solved checks
    pub fn is_solved(&self) -> bool {
        matches!(
            self,
            GameUpdate::SolutionChanged {
                state: SolutionState::Correct,
                ..
            }
        )
    }
}

/// List of subscribed consumers
#[derive(Debug, Default)]
pub struct Observers {
    senders: Vec<mpsc::UnboundedSender<GameUpdate>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new consumer
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<GameUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.push(tx);
        rx
    }

    /// Deliver to every live consumer
    pub fn notify(&mut self, update: GameUpdate) {
        self.senders.retain(|tx| tx.send(update.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}
