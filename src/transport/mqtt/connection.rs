//! Pure connection state management for MQTT client
//!
//! This module contains pure functions for connection state management,
//! reconnect policy and MQTT option construction.

use crate::config::BridgeConfig;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Connection state for MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Attempting to connect
    Connecting,
    /// Connected and subscribed
    Connected,
    /// Disconnected with reason
    Disconnected(String),
    /// Waiting before the given retry attempt
    Reconnecting(u32),
    /// Permanently disconnected - max reconnection attempts exceeded
    PermanentlyDisconnected(String),
}

/// Reconnection policy: pure exponential backoff, no jitter, no cap
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of retries after the first failed attempt (None = unlimited)
    pub max_retries: Option<u32>,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt
    pub backoff_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: Some(10),
            initial_delay: Duration::from_secs(5),
            backoff_factor: 1.5,
        }
    }
}

impl ReconnectConfig {
    /// Build the policy from validated configuration (0 retries = unlimited)
    pub fn from_bridge_config(config: &BridgeConfig) -> Self {
        Self {
            max_retries: (config.max_connection_retries > 0)
                .then_some(config.max_connection_retries),
            initial_delay: Duration::try_from_secs_f64(config.retry_delay_secs)
                .unwrap_or_default(),
            backoff_factor: config.retry_backoff_factor,
        }
    }

    /// Delay before retry number `retry` (1-based): `initial × factor^(retry-1)`
    pub fn calculate_backoff_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Broker refused subscription: {0}")]
    SubscriptionRefused(String),
    #[error("No subscription acknowledgement within {0:?}")]
    SubscribeTimeout(Duration),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("No connection acknowledgement within {0:?}")]
    ConnectTimeout(Duration),
}

/// Unique client id per session so a stale session on the broker never
/// collides with the new one. Kept within the 23 bytes every broker accepts.
pub fn build_client_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let prefix: String = prefix.chars().take(14).collect();
    format!("{prefix}-{}", &suffix[..8])
}

/// Broker URL with any password replaced, for logs
pub fn redact_broker_url(broker_url: &str) -> String {
    match Url::parse(broker_url) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        _ => broker_url.to_string(),
    }
}

/// Pure function to configure MQTT options from a broker URL
///
/// `mqtt://` and `tcp://` are plain TCP (default port 1883), `mqtts://` and
/// `ssl://` use TLS (default port 8883). Credentials come from the URL userinfo.
pub fn configure_mqtt_options(broker_url: &str, client_id: &str) -> Result<MqttOptions, MqttError> {
    let invalid = || MqttError::InvalidBrokerUrl(redact_broker_url(broker_url));

    let url = Url::parse(broker_url).map_err(|_| invalid())?;
    let tls = match url.scheme() {
        "mqtt" | "tcp" => false,
        "mqtts" | "ssl" => true,
        _ => return Err(invalid()),
    };

    let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    let mut mqtt_options = MqttOptions::new(client_id, host, port);

    if tls {
        let transport = RumqttcTransport::tls_with_default_config();
        mqtt_options.set_transport(transport);
    }

    if !url.username().is_empty() {
        let password = url.password().unwrap_or_default();
        mqtt_options.set_credentials(url.username(), password);
    }

    mqtt_options.set_keep_alive(Duration::from_secs(60));

    // Rendered payloads can be large; the default broker limit is too small
    mqtt_options.set_max_packet_size(Some(256 * 1024));

    Ok(mqtt_options)
}
