//! Game session client
//!
//! One connected session against a game server: join the game room, announce
//! ourselves, replay the full event log, then stream live events into the
//! engine while forwarding local actions as outbound events.

use std::time::Duration;

use anyhow::Result;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::message::names;
use super::state::{ConnectionState, LinkEvent};
use super::transport::{Transport, TransportError, TransportEvent};
use crate::config::Config;
use crate::engine::{GameEngine, InputMode};
use crate::events::{EventKind, GameEvent};
use crate::identity::Identity;
use crate::models::Coordinates;
use crate::observer::GameUpdate;

/// Per-game session settings
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub game_id: String,
    /// Observe without announcing ourselves until `Join`
    pub defer_join: bool,
    pub ack_timeout: Duration,
    pub sync_timeout: Duration,
    pub initial_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

impl SessionOptions {
    pub fn new(game_id: impl Into<String>) -> Self {
        Self::from_config(game_id, &Config::default())
    }

    pub fn from_config(game_id: impl Into<String>, config: &Config) -> Self {
        Self {
            game_id: game_id.into(),
            defer_join: config.defer_join,
            ack_timeout: config.ack_timeout(),
            sync_timeout: config.sync_timeout(),
            initial_reconnect_delay: config.initial_reconnect_delay(),
            max_reconnect_delay: config.max_reconnect_delay(),
        }
    }
}

/// Commands sent to the game task
#[derive(Debug, Clone, PartialEq)]
pub enum GameCommand {
    Enter { at: Coordinates, value: String },
    Clear(Coordinates),
    MoveCursor(Coordinates),
    Check(Vec<Coordinates>),
    Reveal(Vec<Coordinates>),
    Reset(Vec<Coordinates>),
    Ping(Coordinates),
    SendMessage(String),
    SetDisplayName(String),
    SetColor(String),
    SetInputMode(InputMode),
    MarkChatRead(i64),
    /// Announce ourselves after a deferred join
    Join,
    /// Drop the connection and reconnect now
    Reconnect,
    Shutdown,
}

/// What the task loop should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Reconnect,
    Shutdown,
}

enum Step {
    Command(Option<GameCommand>),
    Inbound(TransportEvent),
}

/// Drives one game: owns the engine and, unless offline, the transport
pub struct GameClient {
    options: SessionOptions,
    identity: Identity,
    engine: GameEngine,
    transport: Option<Box<dyn Transport>>,
    state: ConnectionState,
    status_tx: watch::Sender<ConnectionState>,
    /// Whether we announce ourselves on each (re)connect
    joined: bool,
    /// Outbound events produced while not connected
    outbox: Vec<Queued>,
}

/// An outbound payload waiting for the next session
#[derive(Debug)]
struct Queued {
    dedup_key: Option<String>,
    payload: Value,
}

impl GameClient {
    pub fn new(
        options: SessionOptions,
        identity: Identity,
        engine: GameEngine,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self::build(options, identity, engine, Some(transport))
    }

    /// Client that never touches the network; the snapshot is the only truth
    pub fn offline(options: SessionOptions, identity: Identity, engine: GameEngine) -> Self {
        Self::build(options, identity, engine, None)
    }

    fn build(
        options: SessionOptions,
        identity: Identity,
        engine: GameEngine,
        transport: Option<Box<dyn Transport>>,
    ) -> Self {
        let (status_tx, _) = watch::channel(ConnectionState::Disconnected);
        let joined = !options.defer_join;
        Self {
            options,
            identity,
            engine,
            transport,
            state: ConnectionState::Disconnected,
            status_tx,
            joined,
            outbox: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<GameUpdate> {
        self.engine.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionState> {
        self.status_tx.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn engine(&self) -> &GameEngine {
        &self.engine
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn is_offline(&self) -> bool {
        self.transport.is_none()
    }

    pub(crate) fn transition(&mut self, event: LinkEvent) {
        let Some(next) = self.state.next(event) else {
            debug!("Ignoring {:?} in state {}", event, self.state);
            return;
        };
        if next == self.state {
            return;
        }
        info!("Connection {} -> {}", self.state, next);
        self.state = next;
        self.status_tx.send_replace(next);
        self.engine.notify(GameUpdate::ConnectionChanged(next));
    }

    /// Connect, sync, and serve until the connection ends or a command
    /// asks to stop
    pub(crate) async fn connect_and_serve(
        &mut self,
        commands: &mut mpsc::Receiver<GameCommand>,
    ) -> Result<Flow> {
        let transport = self
            .transport
            .as_mut()
            .ok_or(TransportError::NotConnected)?;
        transport.connect().await?;
        self.transition(LinkEvent::TransportConnected);

        self.start_session().await?;
        Ok(self.serve(commands).await)
    }

    /// Join, announce, flush queued edits, then replay the full log
    async fn start_session(&mut self) -> Result<(), TransportError> {
        let game_id = self.options.game_id.clone();
        let ack_timeout = self.options.ack_timeout;
        let sync_timeout = self.options.sync_timeout;
        let outbox = std::mem::take(&mut self.outbox);

        let transport = self
            .transport
            .as_mut()
            .ok_or(TransportError::NotConnected)?;
        transport
            .emit(names::JOIN_GAME, json!(game_id), ack_timeout)
            .await?;
        let mut queued = outbox.into_iter();
        while let Some(item) = queued.next() {
            if let Err(e) = transport
                .emit(names::GAME_EVENT, item.payload, ack_timeout)
                .await
            {
                // The failed one is dropped, the rest wait for the next session
                self.outbox.extend(queued);
                return Err(e);
            }
        }

        if self.joined {
            self.announce().await;
        }

        let transport = self
            .transport
            .as_mut()
            .ok_or(TransportError::NotConnected)?;
        let log = transport
            .request(names::SYNC_ALL_GAME_EVENTS, json!(game_id), sync_timeout)
            .await?;
        self.engine.replay(&log);
        self.transition(LinkEvent::SyncCompleted);
        Ok(())
    }

    async fn serve(&mut self, commands: &mut mpsc::Receiver<GameCommand>) -> Flow {
        loop {
            let step = {
                let Some(transport) = self.transport.as_mut() else {
                    return Flow::Shutdown;
                };
                tokio::select! {
                    command = commands.recv() => Step::Command(command),
                    inbound = transport.recv() => Step::Inbound(inbound),
                }
            };

            match step {
                Step::Command(None) => return Flow::Shutdown,
                Step::Command(Some(command)) => match self.handle_command(command).await {
                    Flow::Continue => {}
                    flow => return flow,
                },
                Step::Inbound(TransportEvent::Message { event, data }) => {
                    self.handle_inbound(&event, &data)
                }
                Step::Inbound(TransportEvent::Disconnected) => {
                    info!("Server closed the connection");
                    return Flow::Continue;
                }
            }
        }
    }

    fn handle_inbound(&mut self, event: &str, data: &Value) {
        if event == names::GAME_EVENT {
            self.engine.apply(data);
        } else {
            debug!("Ignoring server event '{}'", event);
        }
    }

    /// Apply a local action and send what it produced
    pub(crate) async fn handle_command(&mut self, command: GameCommand) -> Flow {
        let result = match command {
            GameCommand::Enter { at, value } => self.engine.enter(at, &value),
            GameCommand::Clear(at) => self.engine.clear(at),
            GameCommand::MoveCursor(at) => self.engine.move_cursor(at),
            GameCommand::Check(cells) => self.engine.check(cells),
            GameCommand::Reveal(cells) => self.engine.reveal(cells),
            GameCommand::Reset(cells) => self.engine.reset(cells),
            GameCommand::Ping(at) => self.engine.ping(at),
            GameCommand::SendMessage(text) => self.engine.send_message(&text),
            GameCommand::SetDisplayName(name) => {
                self.identity.display_name = name.clone();
                Ok(self.engine.set_display_name(name))
            }
            GameCommand::SetColor(color) => {
                self.identity.color = color.clone();
                Ok(self.engine.set_color(color))
            }
            GameCommand::SetInputMode(mode) => {
                self.engine.set_input_mode(mode);
                return Flow::Continue;
            }
            GameCommand::MarkChatRead(timestamp) => {
                self.engine.mark_chat_read(timestamp);
                return Flow::Continue;
            }
            GameCommand::Join => {
                self.join().await;
                return Flow::Continue;
            }
            GameCommand::Reconnect => return Flow::Reconnect,
            GameCommand::Shutdown => return Flow::Shutdown,
        };

        match result {
            Ok(event) => self.send_event(event).await,
            Err(e) => {
                debug!("Rejected local action: {}", e);
                self.engine.notify(GameUpdate::Rejected(e));
            }
        }
        Flow::Continue
    }

    async fn join(&mut self) {
        if self.joined {
            debug!("Already joined {}", self.options.game_id);
            return;
        }
        self.joined = true;
        // Otherwise the next session announces us
        if self.state.is_live() || self.is_offline() {
            self.announce().await;
        }
    }

    async fn announce(&mut self) {
        let name = self
            .engine
            .set_display_name(self.identity.display_name.clone());
        self.send_event(name).await;
        let color = self.engine.set_color(self.identity.color.clone());
        self.send_event(color).await;
    }

    /// Send a game event
    ///
    /// Offline this is a no-op. While reconnecting the event waits in the
    /// outbox, where a newer event with the same dedup key replaces it.
    /// Cursor moves are not queued, and a failed emit is not retried.
    async fn send_event(&mut self, event: GameEvent) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        let payload = event.outbound(&self.options.game_id);
        if !self.state.is_live() {
            if matches!(event.kind, EventKind::UpdateCursor(_)) {
                debug!("Dropping cursor move while disconnected");
                return;
            }
            debug!("Queueing {} until reconnected", event.type_name());
            let dedup_key = event.dedup_key();
            if dedup_key.is_some() {
                self.outbox.retain(|queued| queued.dedup_key != dedup_key);
            }
            self.outbox.push(Queued { dedup_key, payload });
            return;
        }
        if let Err(e) = transport
            .emit(names::GAME_EVENT, payload, self.options.ack_timeout)
            .await
        {
            warn!("Failed to send {}: {}", event.type_name(), e);
        }
    }

    pub(crate) async fn close_transport(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            transport.close().await;
        }
    }

    /// Outbound events waiting for a connection
    pub fn queued(&self) -> usize {
        self.outbox.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Clues, Grid};
    use crate::sync::transport::MockTransport;

    fn identity() -> Identity {
        Identity {
            user_id: "me".into(),
            display_name: "Me".into(),
            color: "hsl(1,40%,60%)".into(),
        }
    }

    fn client(transport: &MockTransport, defer_join: bool) -> GameClient {
        let mut options = SessionOptions::new("g1");
        options.defer_join = defer_join;
        let engine = GameEngine::new(
            "me",
            Grid::from_rows([["A", "B"], [".", "C"]]),
            Clues::default(),
        );
        GameClient::new(options, identity(), engine, Box::new(transport.clone()))
    }

    #[tokio::test]
    async fn test_session_order() {
        let transport = MockTransport::new();
        transport.set_reply(names::SYNC_ALL_GAME_EVENTS, json!([]));
        let mut client = client(&transport, false);

        client.transition(LinkEvent::ConnectAttempt);
        client.transport.as_mut().unwrap().connect().await.unwrap();
        client.transition(LinkEvent::TransportConnected);
        client.start_session().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Connected);

        let sent: Vec<String> = transport.sent().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            sent,
            vec![
                names::JOIN_GAME,
                names::GAME_EVENT,
                names::GAME_EVENT,
                names::SYNC_ALL_GAME_EVENTS
            ]
        );
        let announced = transport.sent_named(names::GAME_EVENT);
        assert_eq!(announced[0]["event"]["type"], "updateDisplayName");
        assert_eq!(announced[1]["event"]["type"], "updateColor");
        assert_eq!(announced[0]["gameId"], "g1");
    }

    #[tokio::test]
    async fn test_deferred_join_skips_announce() {
        let transport = MockTransport::new();
        transport.set_reply(names::SYNC_ALL_GAME_EVENTS, json!([]));
        let mut client = client(&transport, true);

        client.transition(LinkEvent::ConnectAttempt);
        client.transport.as_mut().unwrap().connect().await.unwrap();
        client.transition(LinkEvent::TransportConnected);
        client.start_session().await.unwrap();
        assert!(transport.sent_named(names::GAME_EVENT).is_empty());

        client.handle_command(GameCommand::Join).await;
        assert_eq!(transport.sent_named(names::GAME_EVENT).len(), 2);

        // A second join is a no-op
        client.handle_command(GameCommand::Join).await;
        assert_eq!(transport.sent_named(names::GAME_EVENT).len(), 2);
    }

    #[tokio::test]
    async fn test_commands_while_disconnected_are_queued() {
        let transport = MockTransport::new();
        let mut client = client(&transport, false);

        client
            .handle_command(GameCommand::Enter {
                at: Coordinates::new(0, 0),
                value: "a".into(),
            })
            .await;
        assert_eq!(client.queued(), 1);
        assert!(transport.sent().is_empty());
        assert_eq!(
            client
                .engine()
                .solution()
                .get(Coordinates::new(0, 0))
                .map(|e| e.value.as_str()),
            Some("A")
        );
    }

    #[tokio::test]
    async fn test_outbox_keeps_latest_per_key() {
        let transport = MockTransport::new();
        transport.set_reply(names::SYNC_ALL_GAME_EVENTS, json!([]));
        let mut client = client(&transport, true);

        for i in 0..500 {
            client
                .handle_command(GameCommand::MoveCursor(Coordinates::new(i % 2, 0)))
                .await;
        }
        for value in ["X", "Y", "A"] {
            client
                .handle_command(GameCommand::Enter {
                    at: Coordinates::new(0, 0),
                    value: value.into(),
                })
                .await;
        }
        client
            .handle_command(GameCommand::Enter {
                at: Coordinates::new(0, 1),
                value: "B".into(),
            })
            .await;
        assert_eq!(client.queued(), 2);

        client.transition(LinkEvent::ConnectAttempt);
        client.transport.as_mut().unwrap().connect().await.unwrap();
        client.transition(LinkEvent::TransportConnected);
        client.start_session().await.unwrap();

        let flushed = transport.sent_named(names::GAME_EVENT);
        assert!(!flushed
            .iter()
            .any(|p| p["event"]["type"] == "updateCursor"));
        let values: Vec<&Value> = flushed
            .iter()
            .map(|p| &p["event"]["params"]["value"])
            .collect();
        assert_eq!(values, vec![&json!("A"), &json!("B")]);
        assert_eq!(client.queued(), 0);
    }

    #[tokio::test]
    async fn test_failed_emit_is_not_retried() {
        let transport = MockTransport::new();
        transport.set_reply(names::SYNC_ALL_GAME_EVENTS, json!([]));
        let mut client = client(&transport, true);

        client.transition(LinkEvent::ConnectAttempt);
        client.transport.as_mut().unwrap().connect().await.unwrap();
        client.transition(LinkEvent::TransportConnected);
        client.start_session().await.unwrap();

        // The socket is gone but the driver has not noticed yet
        client.transport.as_mut().unwrap().close().await;
        client
            .handle_command(GameCommand::Enter {
                at: Coordinates::new(0, 0),
                value: "A".into(),
            })
            .await;
        assert_eq!(client.queued(), 0);
        assert!(transport.sent_named(names::GAME_EVENT).is_empty());
    }

    #[tokio::test]
    async fn test_offline_client_never_queues() {
        let options = SessionOptions::new("p1");
        let engine = GameEngine::new("me", Grid::from_rows([["A"]]), Clues::default());
        let mut client = GameClient::offline(options, identity(), engine);
        let mut updates = client.subscribe();

        client
            .handle_command(GameCommand::Enter {
                at: Coordinates::new(0, 0),
                value: "A".into(),
            })
            .await;
        assert_eq!(client.queued(), 0);

        let mut solved = false;
        while let Ok(update) = updates.try_recv() {
            solved |= update.is_solved();
        }
        assert!(solved);
    }

    #[tokio::test]
    async fn test_rejected_action_is_reported() {
        let transport = MockTransport::new();
        let mut client = client(&transport, false);
        let mut updates = client.subscribe();

        client
            .handle_command(GameCommand::Enter {
                at: Coordinates::new(1, 0),
                value: "A".into(),
            })
            .await;
        assert!(matches!(
            updates.try_recv().unwrap(),
            GameUpdate::Rejected(crate::engine::GameError::Block(_))
        ));
        assert_eq!(client.queued(), 0);
    }
}
