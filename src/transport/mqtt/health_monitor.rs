//! Pure health monitoring and reconnection logic for MQTT client
//!
//! This module contains pure functions for reconnection decisions, heartbeat
//! stall detection and connection state transitions.

use super::connection::{ConnectionState, ReconnectConfig};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Pure health monitoring and reconnection decision logic
pub struct HealthMonitor;

impl HealthMonitor {
    /// Decide what to do after `failed_attempts` consecutive connection failures
    ///
    /// With a retry limit of N, failures 1..=N each earn a retry and failure
    /// N+1 is final.
    pub fn should_attempt_reconnection(
        failed_attempts: u32,
        config: &ReconnectConfig,
        shutdown_requested: bool,
    ) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }

        if let Some(max_retries) = config.max_retries {
            if failed_attempts > max_retries {
                return ReconnectionDecision::AbortMaxAttemptsExceeded;
            }
        }

        ReconnectionDecision::Proceed {
            retry: failed_attempts,
            delay: config.calculate_backoff_delay(failed_attempts),
        }
    }

    /// Whether the session should be considered stalled: nothing received for
    /// strictly longer than `interval`
    pub fn is_stalled(last_message_at: Instant, now: Instant, interval: Duration) -> bool {
        now.saturating_duration_since(last_message_at) > interval
    }

    /// Determine next state after connection event (pure function)
    pub fn determine_next_state(event: ConnectionEvent) -> ConnectionState {
        match event {
            ConnectionEvent::ConnectStarted => ConnectionState::Connecting,
            ConnectionEvent::Subscribed => ConnectionState::Connected,
            ConnectionEvent::ConnectFailed(reason) => ConnectionState::Disconnected(reason),
            ConnectionEvent::ConnectionLost(reason) => ConnectionState::Disconnected(reason),
            ConnectionEvent::ClientDisconnected => {
                ConnectionState::Disconnected("Client disconnected".to_string())
            }
            ConnectionEvent::ReconnectionScheduled(retry) => ConnectionState::Reconnecting(retry),
            ConnectionEvent::PermanentFailure(reason) => {
                ConnectionState::PermanentlyDisconnected(reason)
            }
        }
    }

    /// Log connection state transition (pure logging function)
    pub fn log_state_transition(from: &ConnectionState, to: &ConnectionState) {
        match (from, to) {
            (ConnectionState::Reconnecting(_), ConnectionState::Connecting) => {}
            (_, ConnectionState::Connected) => {
                info!("MQTT connection established");
            }
            (ConnectionState::Connected, ConnectionState::Disconnected(reason)) => {
                warn!("MQTT connection lost: {}", reason);
            }
            (_, ConnectionState::Reconnecting(retry)) => {
                tracing::debug!("Scheduling reconnection attempt {}", retry);
            }
            (_, ConnectionState::PermanentlyDisconnected(reason)) => {
                error!("MQTT connection permanently failed: {}", reason);
            }
            _ => {
                tracing::debug!("MQTT connection state: {:?} -> {:?}", from, to);
            }
        }
    }
}

/// Decision result for reconnection attempts
#[derive(Debug, PartialEq)]
pub enum ReconnectionDecision {
    /// Sleep `delay`, then make retry number `retry`
    Proceed { retry: u32, delay: Duration },
    /// Abort reconnection - shutdown requested
    AbortShutdownRequested,
    /// Abort reconnection - max retries exceeded
    AbortMaxAttemptsExceeded,
}

/// Connection events that trigger state transitions
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A connect attempt is starting
    ConnectStarted,
    /// Connected and the subscription request was accepted
    Subscribed,
    /// Connect or subscribe failed
    ConnectFailed(String),
    /// An established session failed
    ConnectionLost(String),
    /// We closed the session ourselves
    ClientDisconnected,
    /// Waiting before the given retry
    ReconnectionScheduled(u32),
    /// Permanent failure - no more retries
    PermanentFailure(String),
}
