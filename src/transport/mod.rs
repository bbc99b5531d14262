//! Transport layer for receiving broker messages
//!
//! This module provides the broker abstraction and its MQTT implementation.

use bytes::Bytes;

pub mod mqtt;

pub use mqtt::ConnectionState;

/// A message delivered on a subscribed topic
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Bytes,
    /// Set when the broker replayed a retained message on subscribe
    pub retain: bool,
}

impl IncomingMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: false,
        }
    }
}

/// Transport trait for a subscribe-only broker session
///
/// This trait provides an abstraction over the broker connection so the
/// connection state machine and main loop can be driven by a scripted mock
/// in tests. Each successful `connect` starts a fresh session and drops any
/// previous one.
#[async_trait::async_trait]
pub trait Transport: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new session with the broker
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Subscribe the current session to all `topics`
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), Self::Error>;

    /// Wait for the next message on any subscribed topic
    ///
    /// An error means the session is no longer usable.
    async fn next_message(&mut self) -> Result<IncomingMessage, Self::Error>;

    /// Close the current session
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Check if transport is currently connected
    fn is_connected(&self) -> bool;

    /// Get current connection state
    fn connection_state(&self) -> ConnectionState;
}

/// Type alias for MQTT transport
pub type MqttTransport = mqtt::MqttClient;
