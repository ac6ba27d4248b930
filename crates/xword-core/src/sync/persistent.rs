//! Persistent game task
//!
//! Runs a [`GameClient`] on its own task, keeping the connection alive with
//! exponential backoff. Local commands keep working while reconnecting; what
//! they send waits in the outbox until the next session.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::client::{Flow, GameClient, GameCommand};
use super::state::{ConnectionState, LinkEvent};
use crate::observer::GameUpdate;

/// Handle to control the game task
pub struct GameHandle {
    /// Send commands to the game task
    pub commands: mpsc::Sender<GameCommand>,
    /// Receive observer updates
    pub updates: mpsc::UnboundedReceiver<GameUpdate>,
    /// Watch connection state
    pub status: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl GameHandle {
    pub async fn send(&self, command: GameCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .context("Game task has stopped")
    }

    /// Ask the task to stop and wait for it
    pub async fn shutdown(self) {
        let _ = self.commands.send(GameCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!("Game task ended abnormally: {}", e);
        }
    }
}

/// Spawn the game task
///
/// Offline clients only serve commands. Online clients connect and
/// reconnect until shut down.
pub fn spawn_game_task(mut client: GameClient) -> GameHandle {
    let (command_tx, command_rx) = mpsc::channel(64);
    let updates = client.subscribe();
    let status = client.subscribe_status();

    let task = tokio::spawn(async move {
        if client.is_offline() {
            offline_loop(client, command_rx).await;
        } else {
            game_task_loop(client, command_rx).await;
        }
    });

    GameHandle {
        commands: command_tx,
        updates,
        status,
        task,
    }
}

async fn offline_loop(mut client: GameClient, mut commands: mpsc::Receiver<GameCommand>) {
    info!("Playing {} offline", client.options().game_id);
    while let Some(command) = commands.recv().await {
        match client.handle_command(command).await {
            Flow::Shutdown => break,
            Flow::Reconnect => debug!("Reconnect ignored while offline"),
            Flow::Continue => {}
        }
    }
}

/// Main loop with reconnection
async fn game_task_loop(mut client: GameClient, mut commands: mpsc::Receiver<GameCommand>) {
    let initial_delay = client.options().initial_reconnect_delay;
    let max_delay = client.options().max_reconnect_delay;
    let mut reconnect_delay = initial_delay;

    loop {
        client.transition(LinkEvent::ConnectAttempt);

        match client.connect_and_serve(&mut commands).await {
            Ok(Flow::Shutdown) => break,
            Ok(Flow::Reconnect) => {
                info!("Reconnecting");
                client.close_transport().await;
                reconnect_delay = initial_delay;
                continue;
            }
            Ok(Flow::Continue) => {
                // Connection closed normally, reset backoff
                reconnect_delay = initial_delay;
            }
            Err(e) => warn!("Connection error: {:#}", e),
        }

        client.close_transport().await;
        client.transition(LinkEvent::TransportLost);

        debug!("Retrying in {:?}", reconnect_delay);
        match wait_for_retry(&mut client, &mut commands, reconnect_delay).await {
            Flow::Shutdown => break,
            Flow::Reconnect => reconnect_delay = initial_delay,
            Flow::Continue => reconnect_delay = next_delay(reconnect_delay, max_delay),
        }
    }

    client.close_transport().await;
    client.transition(LinkEvent::Shutdown);
}

/// Wait out the backoff while still serving local commands
async fn wait_for_retry(
    client: &mut GameClient,
    commands: &mut mpsc::Receiver<GameCommand>,
    delay: Duration,
) -> Flow {
    let deadline = Instant::now() + delay;
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return Flow::Continue,
            command = commands.recv() => {
                let Some(command) = command else {
                    return Flow::Shutdown;
                };
                match client.handle_command(command).await {
                    Flow::Continue => {}
                    flow => return flow,
                }
            }
        }
    }
}

fn next_delay(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}
