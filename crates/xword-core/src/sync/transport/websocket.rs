//! WebSocket transport
//!
//! JSON text frames over `tokio-tungstenite`. Acknowledgements for
//! fire-and-forget emits are tracked with a deadline and pruned while
//! reading; nothing ever waits on them.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{Transport, TransportError, TransportEvent};
use crate::sync::message::{AckId, ClientFrame, ServerFrame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug)]
struct PendingAck {
    event: String,
    deadline: Instant,
}

/// Transport over a WebSocket connection
pub struct WebSocketTransport {
    url: String,
    connect_timeout: Duration,
    write: Option<SplitSink<WsStream, Message>>,
    read: Option<SplitStream<WsStream>>,
    next_ack: AckId,
    pending: HashMap<AckId, PendingAck>,
    /// Events read while waiting for a request's acknowledgement
    backlog: VecDeque<TransportEvent>,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
            write: None,
            read: None,
            next_ack: 0,
            pending: HashMap::new(),
            backlog: VecDeque::new(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Acknowledgements still outstanding
    pub fn pending_acks(&self) -> usize {
        self.pending.len()
    }

    fn next_ack_id(&mut self) -> AckId {
        self.next_ack += 1;
        self.next_ack
    }

    async fn send_frame(&mut self, frame: ClientFrame) -> Result<(), TransportError> {
        let write = self.write.as_mut().ok_or(TransportError::NotConnected)?;
        let text = frame
            .encode()
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        write
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Next decodable frame, `None` once the connection is gone
    async fn read_frame(&mut self) -> Option<ServerFrame> {
        let read = self.read.as_mut()?;
        loop {
            let text = match read.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => text,
                    Err(_) => {
                        warn!("Ignoring non-UTF-8 binary frame");
                        continue;
                    }
                },
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    return None;
                }
                Some(Ok(_)) => continue,
            };

            match ServerFrame::decode(&text) {
                Ok(frame) => return Some(frame),
                Err(e) => warn!("Failed to decode frame: {}", e),
            }
        }
    }

    fn settle_ack(&mut self, ack: AckId) {
        match self.pending.remove(&ack) {
            Some(pending) => debug!("'{}' acknowledged", pending.event),
            None => debug!("Acknowledgement {} arrived after its deadline", ack),
        }
    }

    fn prune_acks(&mut self) {
        let now = Instant::now();
        self.pending.retain(|_, pending| {
            let live = pending.deadline > now;
            if !live {
                debug!("No acknowledgement for '{}', dropping", pending.event);
            }
            live
        });
    }

    fn drop_connection(&mut self) {
        self.write = None;
        self.read = None;
        self.pending.clear();
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        debug!("Connecting to {}", self.url);
        let (stream, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
                .await
                .map_err(|_| TransportError::ConnectionFailed(format!("timed out: {}", self.url)))?
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (write, read) = stream.split();
        self.write = Some(write);
        self.read = Some(read);
        self.pending.clear();
        self.backlog.clear();
        info!("Connected to {}", self.url);
        Ok(())
    }

    async fn emit(
        &mut self,
        event: &str,
        data: Value,
        ack_timeout: Duration,
    ) -> Result<(), TransportError> {
        let ack = self.next_ack_id();
        self.send_frame(ClientFrame::new(event, data, Some(ack)))
            .await?;
        self.pending.insert(
            ack,
            PendingAck {
                event: event.to_string(),
                deadline: Instant::now() + ack_timeout,
            },
        );
        Ok(())
    }

    async fn request(
        &mut self,
        event: &str,
        data: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let ack = self.next_ack_id();
        self.send_frame(ClientFrame::new(event, data, Some(ack)))
            .await?;

        let deadline = Instant::now() + timeout;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.read_frame())
                .await
                .map_err(|_| TransportError::Timeout(event.to_string()))?;

            match frame {
                Some(ServerFrame::Ack { ack: id, data }) if id == ack => return Ok(data),
                Some(ServerFrame::Ack { ack: other, .. }) => self.settle_ack(other),
                Some(ServerFrame::Event { event, data }) => {
                    self.backlog.push_back(TransportEvent::Message { event, data })
                }
                None => {
                    self.drop_connection();
                    return Err(TransportError::ConnectionClosed);
                }
            }
        }
    }

    async fn recv(&mut self) -> TransportEvent {
        if let Some(event) = self.backlog.pop_front() {
            return event;
        }
        loop {
            self.prune_acks();
            match self.read_frame().await {
                Some(ServerFrame::Event { event, data }) => {
                    return TransportEvent::Message { event, data }
                }
                Some(ServerFrame::Ack { ack, .. }) => self.settle_ack(ack),
                None => {
                    self.drop_connection();
                    return TransportEvent::Disconnected;
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.write.is_some()
    }

    async fn close(&mut self) {
        if let Some(mut write) = self.write.take() {
            write.close().await.ok();
        }
        self.drop_connection();
    }
}
