//! Mock implementations for testing
//!
//! Provides a scripted [`MockTransport`] so the connection state machine and
//! the bridge loop can be exercised without a broker. Clones share all state,
//! so a test keeps one clone as a handle after moving the other into the code
//! under test.

use crate::transport::{mqtt::ConnectionState, IncomingMessage, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

/// Something the mock broker delivers from `next_message`
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Message(IncomingMessage),
    /// The session fails with this reason
    ConnectionLost(String),
}

#[derive(Debug, Error)]
#[error("Mock transport error: {0}")]
pub struct MockTransportError(pub String);

/// Mock transport for testing
#[derive(Debug, Clone)]
pub struct MockTransport {
    pub connect_attempts: Arc<Mutex<Vec<Instant>>>,
    pub subscriptions: Arc<Mutex<Vec<Vec<String>>>>,
    pub disconnects: Arc<Mutex<u32>>,
    pub connect_failures: Arc<Mutex<u32>>,
    pub subscribe_failures: Arc<Mutex<u32>>,
    pub fail_disconnect: Arc<Mutex<bool>>,
    pub should_fail: bool,
    events_tx: mpsc::UnboundedSender<MockEvent>,
    events_rx: Arc<Mutex<mpsc::UnboundedReceiver<MockEvent>>>,
    state: ConnectionState,
}

impl Default for MockTransport {
    fn default() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            connect_attempts: Arc::default(),
            subscriptions: Arc::default(),
            disconnects: Arc::default(),
            connect_failures: Arc::default(),
            subscribe_failures: Arc::default(),
            fail_disconnect: Arc::default(),
            should_fail: false,
            events_tx,
            events_rx: Arc::new(Mutex::new(events_rx)),
            state: ConnectionState::Disconnected("Not connected".to_string()),
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose every connect attempt fails
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// Fail the next `count` connect attempts, then succeed
    pub async fn fail_next_connects(&self, count: u32) {
        *self.connect_failures.lock().await = count;
    }

    /// Fail the next `count` subscribe calls, then succeed
    pub async fn fail_next_subscribes(&self, count: u32) {
        *self.subscribe_failures.lock().await = count;
    }

    pub async fn fail_disconnects(&self) {
        *self.fail_disconnect.lock().await = true;
    }

    /// Queue a message for delivery
    pub fn send_message(&self, topic: &str, payload: impl Into<Bytes>) {
        let _ = self
            .events_tx
            .send(MockEvent::Message(IncomingMessage::new(topic, payload)));
    }

    /// Queue a session failure, delivered in order with messages
    pub fn drop_connection(&self, reason: &str) {
        let _ = self
            .events_tx
            .send(MockEvent::ConnectionLost(reason.to_string()));
    }

    pub async fn connect_attempts(&self) -> Vec<Instant> {
        self.connect_attempts.lock().await.clone()
    }

    pub async fn subscriptions(&self) -> Vec<Vec<String>> {
        self.subscriptions.lock().await.clone()
    }

    pub async fn disconnect_count(&self) -> u32 {
        *self.disconnects.lock().await
    }

    /// Consume one scripted failure from `counter`, if any is left
    async fn take_failure(counter: &Mutex<u32>) -> bool {
        let mut remaining = counter.lock().await;
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        self.connect_attempts.lock().await.push(Instant::now());

        if self.should_fail || Self::take_failure(&self.connect_failures).await {
            self.state = ConnectionState::Disconnected("Mock connection failure".to_string());
            return Err(MockTransportError("Mock connection failure".to_string()));
        }

        self.state = ConnectionState::Connecting;
        Ok(())
    }

    async fn subscribe(&mut self, topics: &[String]) -> Result<(), Self::Error> {
        if self.state != ConnectionState::Connecting && self.state != ConnectionState::Connected {
            return Err(MockTransportError("Subscribe while not connected".to_string()));
        }

        if Self::take_failure(&self.subscribe_failures).await {
            self.state = ConnectionState::Disconnected("Mock subscribe failure".to_string());
            return Err(MockTransportError("Mock subscribe failure".to_string()));
        }

        self.subscriptions.lock().await.push(topics.to_vec());
        self.state = ConnectionState::Connected;
        Ok(())
    }

    async fn next_message(&mut self) -> Result<IncomingMessage, Self::Error> {
        if self.state != ConnectionState::Connected {
            return Err(MockTransportError(format!(
                "Not connected - current state: {:?}",
                self.state
            )));
        }

        let received = self.events_rx.lock().await.recv().await;
        let event = match received {
            Some(event) => event,
            // Unreachable while this transport holds a sender
            None => std::future::pending().await,
        };

        match event {
            MockEvent::Message(message) => Ok(message),
            MockEvent::ConnectionLost(reason) => {
                self.state = ConnectionState::Disconnected(reason.clone());
                Err(MockTransportError(reason))
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        *self.disconnects.lock().await += 1;
        self.state = ConnectionState::Disconnected("Client disconnected".to_string());

        if *self.fail_disconnect.lock().await {
            return Err(MockTransportError("Mock disconnect failure".to_string()));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    fn connection_state(&self) -> ConnectionState {
        self.state.clone()
    }
}
