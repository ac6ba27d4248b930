//! Sync driver for a shared game
//!
//! Keeps the local engine in step with a game server over named events.
//!
//! ## Protocol
//!
//! 1. Connect the transport
//! 2. Emit `join_game` with the game id
//! 3. Announce ourselves (`updateDisplayName` + `updateColor`) unless joining is deferred
//! 4. Request `sync_all_game_events` and replay the full log from empty
//! 5. Apply each live `game_event` batch as it arrives
//!
//! ## Usage
//!
//! ```ignore
//! let client = GameClient::new(options, identity, engine, Box::new(WebSocketTransport::new(url)));
//! let mut handle = spawn_game_task(client);
//! handle.send(GameCommand::Enter { at, value: "A".into() }).await?;
//! ```

mod client;
pub mod message;
mod persistent;
mod state;
pub mod transport;

pub use client::{GameClient, GameCommand, SessionOptions};
pub use persistent::{spawn_game_task, GameHandle};
pub use state::{ConnectionState, LinkEvent};
pub use transport::{MockTransport, Transport, TransportError, TransportEvent, WebSocketTransport};
