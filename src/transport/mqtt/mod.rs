//! MQTT client implementation
//!
//! This module separates pure functions from I/O operations for better
//! testability.
//!
//! # Architecture
//!
//! - [`connection`] - Connection state, reconnect policy and MQTT options
//! - [`message_handler`] - Pure routing of rumqttc events
//! - [`health_monitor`] - Pure reconnection and heartbeat decisions
//! - [`client`] - Impure I/O against the broker
//!
//! # Usage
//!
//! ```rust,no_run
//! use mqtt2template::transport::mqtt::MqttClient;
//! use mqtt2template::transport::Transport;
//!
//! # tokio_test::block_on(async {
//! let mut client = MqttClient::new("mqtt://localhost:1883");
//! client.connect().await?;
//! client.subscribe(&["sensor/temp".to_string()]).await?;
//! let message = client.next_message().await?;
//! println!("{}: {} bytes", message.topic, message.payload.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;

// Re-export public types for convenience
pub use client::MqttClient;
pub use connection::{
    build_client_id, configure_mqtt_options, redact_broker_url, ConnectionState, MqttError,
    ReconnectConfig,
};
pub use health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
pub use message_handler::{EventRoute, MessageHandler};
