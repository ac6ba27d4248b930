//! Mock transport for testing.
//!
//! Inbound events are pushed by the test, request replies are scripted per
//! event name and everything sent is recorded in order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{Transport, TransportError, TransportEvent};

/// Mock transport for testing.
///
/// Clones share state, so a test keeps one clone while the driver owns another.
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    inbound_tx: mpsc::UnboundedSender<TransportEvent>,
    inbound_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<TransportEvent>>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connected: bool,
    connects: usize,
    sent: Vec<(String, Value)>,
    replies: HashMap<String, Value>,
    failing_connects: usize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner::default())),
            inbound_tx,
            inbound_rx: Arc::new(tokio::sync::Mutex::new(inbound_rx)),
        }
    }

    fn inner(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver a named event to the next `recv()`
    pub fn push(&self, event: &str, data: Value) {
        let _ = self.inbound_tx.send(TransportEvent::Message {
            event: event.to_string(),
            data,
        });
    }

    /// Simulate the server dropping the connection
    pub fn drop_connection(&self) {
        let _ = self.inbound_tx.send(TransportEvent::Disconnected);
    }

    /// Answer every `request(event, ..)` with `data`
    pub fn set_reply(&self, event: &str, data: Value) {
        self.inner().replies.insert(event.to_string(), data);
    }

    /// Fail the next `count` connection attempts
    pub fn fail_connects(&self, count: usize) {
        self.inner().failing_connects = count;
    }

    /// Everything emitted or requested, in order
    pub fn sent(&self) -> Vec<(String, Value)> {
        self.inner().sent.clone()
    }

    /// Payloads sent under `event`
    pub fn sent_named(&self, event: &str) -> Vec<Value> {
        self.inner()
            .sent
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Successful connection attempts so far
    pub fn connects(&self) -> usize {
        self.inner().connects
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut inner = self.inner();
        if inner.failing_connects > 0 {
            inner.failing_connects -= 1;
            return Err(TransportError::ConnectionFailed("mock refused".into()));
        }
        inner.connected = true;
        inner.connects += 1;
        Ok(())
    }

    async fn emit(
        &mut self,
        event: &str,
        data: Value,
        _ack_timeout: Duration,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner();
        if !inner.connected {
            return Err(TransportError::NotConnected);
        }
        inner.sent.push((event.to_string(), data));
        Ok(())
    }

    async fn request(
        &mut self,
        event: &str,
        data: Value,
        _timeout: Duration,
    ) -> Result<Value, TransportError> {
        let mut inner = self.inner();
        if !inner.connected {
            return Err(TransportError::NotConnected);
        }
        inner.sent.push((event.to_string(), data));
        inner
            .replies
            .get(event)
            .cloned()
            .ok_or_else(|| TransportError::Timeout(event.to_string()))
    }

    async fn recv(&mut self) -> TransportEvent {
        let event = self.inbound_rx.lock().await.recv().await;
        match event {
            Some(TransportEvent::Message { event, data }) => TransportEvent::Message { event, data },
            Some(TransportEvent::Disconnected) | None => {
                self.inner().connected = false;
                TransportEvent::Disconnected
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.inner().connected
    }

    async fn close(&mut self) {
        self.inner().connected = false;
    }
}
