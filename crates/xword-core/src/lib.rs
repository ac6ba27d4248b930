//! xword Core Library
//!
//! This crate provides the client side of a shared crossword game: several
//! players solve the same puzzle at once, and every change travels as a
//! small event through a game server.
//!
//! # Architecture
//!
//! - **Event log**: the server's ordered event history is the source of truth
//! - **Engine**: applies events to the local solution, dropping stale echoes
//!   of our own edits
//! - **Sync driver**: joins the game, replays the full log on every
//!   (re)connect, then streams live events
//! - **Snapshots**: the solution is saved locally after each change so a game
//!   can be shown, or played offline, without the server
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let identity = Identity::load(&config)?;
//! let engine = GameEngine::new(&identity.user_id, grid, clues)
//!     .with_snapshots(SnapshotTarget::game(SnapshotStore::from_config(&config), game_id));
//! let client = GameClient::new(options, identity, engine, Box::new(WebSocketTransport::new(url)));
//! let mut handle = spawn_game_task(client);
//! ```
//!
//! # Modules
//!
//! - `events`: Wire event model
//! - `grid`: Puzzle grid, solution matrix and completion state
//! - `engine`: Reconciliation engine (main entry point for game state)
//! - `sync`: Connection state machine, transports and the game task
//! - `storage`: Per-game snapshot files
//! - `config`: Application configuration

pub mod config;
pub mod engine;
pub mod events;
pub mod grid;
pub mod identity;
pub mod models;
pub mod observer;
pub mod storage;
pub mod sync;

pub use config::Config;
pub use engine::{GameEngine, GameError, InputMode, SnapshotTarget};
pub use events::{DecodeError, EventKind, GameEvent};
pub use grid::{CellEntry, Clues, Correctness, Grid, Solution, SolutionState};
pub use identity::Identity;
pub use models::{ChatMessage, Coordinates, Cursor, Player};
pub use observer::GameUpdate;
pub use storage::{SaveState, SnapshotStore, StorageError};
pub use sync::{
    spawn_game_task, ConnectionState, GameClient, GameCommand, GameHandle, SessionOptions,
    WebSocketTransport,
};
