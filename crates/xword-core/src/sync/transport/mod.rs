//! Transport abstraction
//!
//! The driver talks to the server through named events:
//! - `connect()` opens the connection
//! - `emit()` sends an event and tracks its acknowledgement without waiting
//! - `request()` sends an event and waits for the acknowledgement payload
//! - `recv()` yields the next inbound event, or reports the connection lost
//! - `close()` shuts the connection down
//!
//! Implementations: [`WebSocketTransport`] for real servers and
//! [`MockTransport`] for tests.

mod mock;
mod websocket;

pub use mock::MockTransport;
pub use websocket::WebSocketTransport;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("timed out waiting for '{0}' acknowledgement")]
    Timeout(String),
}

/// Something that arrived from the server
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A named event and its payload
    Message { event: String, data: Value },
    /// The connection dropped
    Disconnected,
}

/// Connection to a game server
#[async_trait]
pub trait Transport: Send {
    /// Open the connection
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Send an event without waiting for its acknowledgement
    ///
    /// A missing acknowledgement is dropped after `ack_timeout` with a debug
    /// log; the caller never hears about it.
    async fn emit(
        &mut self,
        event: &str,
        data: Value,
        ack_timeout: Duration,
    ) -> Result<(), TransportError>;

    /// Send an event and wait for the acknowledgement payload
    async fn request(
        &mut self,
        event: &str,
        data: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError>;

    /// Next inbound event
    ///
    /// Must be cancel-safe; the driver polls it inside `select!`.
    async fn recv(&mut self) -> TransportEvent;

    fn is_connected(&self) -> bool;

    /// Close the connection
    async fn close(&mut self);
}
