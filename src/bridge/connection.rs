//! Broker session lifecycle
//!
//! [`BrokerConnection`] owns the transport and the reconnect policy. It is
//! the only place a session is opened or closed, so the reconnect path always
//! reuses the configuration of the initial connect.

use super::{interruptible_sleep, shutdown_signalled};
use crate::config::ConfigError;
use crate::connection_span;
use crate::error::{error_chain, BridgeError, BridgeResult};
use crate::transport::mqtt::{
    ConnectionEvent, HealthMonitor, ReconnectConfig, ReconnectionDecision,
};
use crate::transport::{ConnectionState, IncomingMessage, Transport};
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

pub struct BrokerConnection<T: Transport> {
    transport: T,
    policy: ReconnectConfig,
    topics: Vec<String>,
    shutdown_rx: watch::Receiver<bool>,
    established: u32,
    /// Backoff or give-up state; cleared whenever an attempt starts
    retry_state: Option<ConnectionState>,
}

impl<T: Transport> BrokerConnection<T> {
    pub fn new(
        transport: T,
        policy: ReconnectConfig,
        topics: Vec<String>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            transport,
            policy,
            topics,
            shutdown_rx,
            established: 0,
            retry_state: None,
        }
    }

    /// Connect and subscribe, retrying with exponential backoff
    ///
    /// Fails with [`BridgeError::ConnectionExhausted`] once the retry limit is
    /// exceeded and with [`BridgeError::ShutdownRequested`] if shutdown is
    /// signalled while connecting or sleeping.
    pub async fn connect_with_retry(&mut self) -> BridgeResult<()> {
        if self.topics.is_empty() {
            error!("No topics with template bindings; refusing to connect");
            return Err(BridgeError::Config(ConfigError::NoValidTopics));
        }

        let span = connection_span!(session = self.established + 1);
        self.retry_until_connected().instrument(span).await
    }

    async fn retry_until_connected(&mut self) -> BridgeResult<()> {
        let mut failed_attempts = 0u32;

        loop {
            if *self.shutdown_rx.borrow() {
                return Err(BridgeError::ShutdownRequested);
            }

            self.retry_state = None;
            let error = match self.attempt().await {
                Ok(()) => {
                    self.established += 1;
                    if self.established > 1 {
                        info!(
                            "Reconnected after {} failed attempts; subscribed to {} topics",
                            failed_attempts,
                            self.topics.len()
                        );
                    } else {
                        info!("Subscribed to topics: {}", self.topics.join(", "));
                    }
                    return Ok(());
                }
                Err(BridgeError::ShutdownRequested) => return Err(BridgeError::ShutdownRequested),
                Err(e) => e,
            };

            failed_attempts = failed_attempts.saturating_add(1);
            warn!(
                attempt = failed_attempts,
                "Connection attempt failed: {}",
                error_chain(&error)
            );

            let decision = HealthMonitor::should_attempt_reconnection(
                failed_attempts,
                &self.policy,
                *self.shutdown_rx.borrow(),
            );

            match decision {
                ReconnectionDecision::Proceed { retry, delay } => {
                    let max_display = self
                        .policy
                        .max_retries
                        .map_or("∞".to_string(), |max| max.to_string());
                    self.record(ConnectionEvent::ReconnectionScheduled(retry));
                    info!(
                        "Attempting reconnection {}/{} after {:?} delay",
                        retry, max_display, delay
                    );

                    if !interruptible_sleep(self.shutdown_rx.clone(), delay).await {
                        return Err(BridgeError::ShutdownRequested);
                    }
                }
                ReconnectionDecision::AbortShutdownRequested => {
                    return Err(BridgeError::ShutdownRequested);
                }
                ReconnectionDecision::AbortMaxAttemptsExceeded => {
                    self.record(ConnectionEvent::PermanentFailure(format!(
                        "giving up after {failed_attempts} failed attempts"
                    )));
                    return Err(BridgeError::ConnectionExhausted {
                        attempts: failed_attempts,
                    });
                }
            }
        }
    }

    /// One connect + subscribe, abandoned if shutdown is signalled meanwhile
    async fn attempt(&mut self) -> BridgeResult<()> {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let transport = &mut self.transport;
        let topics = &self.topics;

        tokio::select! {
            result = async {
                transport.connect().await.map_err(BridgeError::connection)?;
                transport.subscribe(topics).await.map_err(BridgeError::connection)
            } => result,
            _ = shutdown_signalled(&mut shutdown_rx) => Err(BridgeError::ShutdownRequested),
        }
    }

    /// Close the session, best effort. Failures are logged and never escalated.
    pub async fn disconnect(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            warn!("Error while disconnecting from broker: {}", error_chain(&e));
        }
    }

    /// Drop the current session and establish a new one
    pub async fn reconnect(&mut self) -> BridgeResult<()> {
        self.disconnect().await;
        self.connect_with_retry().await
    }

    /// Wait for the next message. Any error means the session is gone.
    pub async fn next_message(&mut self) -> BridgeResult<IncomingMessage> {
        self.transport
            .next_message()
            .await
            .map_err(BridgeError::connection)
    }

    /// Number of successful reconnects after the initial connect
    pub fn reconnect_count(&self) -> u32 {
        self.established.saturating_sub(1)
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Backoff and give-up states take precedence over the transport's own
    pub fn connection_state(&self) -> ConnectionState {
        self.retry_state
            .clone()
            .unwrap_or_else(|| self.transport.connection_state())
    }

    fn record(&mut self, event: ConnectionEvent) {
        let next = HealthMonitor::determine_next_state(event);
        HealthMonitor::log_state_transition(&self.connection_state(), &next);
        self.retry_state = Some(next);
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use std::time::Duration;
    use tokio::time::Instant;

    fn policy(max_retries: Option<u32>) -> ReconnectConfig {
        ReconnectConfig {
            max_retries,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
        }
    }

    fn topics() -> Vec<String> {
        vec!["sensor/temp".to_string(), "sensor/humidity".to_string()]
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_first_try() {
        // Arrange
        let transport = MockTransport::new();
        let handle = transport.clone();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut connection = BrokerConnection::new(transport, policy(Some(3)), topics(), shutdown_rx);

        // Act
        connection.connect_with_retry().await.unwrap();

        // Assert
        assert!(connection.is_connected());
        assert_eq!(handle.connect_attempts().await.len(), 1);
        assert_eq!(handle.subscriptions().await, vec![topics()]);
        assert_eq!(connection.reconnect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_are_exponential() {
        // Arrange: three failures, then success
        let transport = MockTransport::new();
        let handle = transport.clone();
        handle.fail_next_connects(3).await;
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut connection = BrokerConnection::new(transport, policy(Some(5)), topics(), shutdown_rx);

        // Act
        connection.connect_with_retry().await.unwrap();

        // Assert: gaps of 1s, 2s, 4s
        let attempts = handle.connect_attempts().await;
        assert_eq!(attempts.len(), 4);
        let gaps: Vec<Duration> = attempts.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_max_retries() {
        // Arrange
        let transport = MockTransport::with_failure();
        let handle = transport.clone();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut connection = BrokerConnection::new(transport, policy(Some(3)), topics(), shutdown_rx);

        // Act
        let result = connection.connect_with_retry().await;

        // Assert: initial attempt plus three retries
        match result {
            Err(BridgeError::ConnectionExhausted { attempts }) => assert_eq!(attempts, 4),
            other => panic!("expected ConnectionExhausted, got {other:?}"),
        }
        assert_eq!(handle.connect_attempts().await.len(), 4);
        assert!(handle.subscriptions().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_failure_counts_as_failed_attempt() {
        let transport = MockTransport::new();
        let handle = transport.clone();
        handle.fail_next_subscribes(1).await;
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut connection = BrokerConnection::new(transport, policy(Some(3)), topics(), shutdown_rx);

        let start = Instant::now();
        connection.connect_with_retry().await.unwrap();

        assert_eq!(handle.connect_attempts().await.len(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_empty_topics_fail_before_connecting() {
        let transport = MockTransport::new();
        let handle = transport.clone();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut connection = BrokerConnection::new(transport, policy(Some(3)), Vec::new(), shutdown_rx);

        let result = connection.connect_with_retry().await;

        assert!(matches!(
            result,
            Err(BridgeError::Config(ConfigError::NoValidTopics))
        ));
        assert!(result.unwrap_err().is_fatal());
        assert!(handle.connect_attempts().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_backoff() {
        // Arrange: unlimited retries against a broker that never answers
        let transport = MockTransport::with_failure();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut connection = BrokerConnection::new(transport, policy(None), topics(), shutdown_rx);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            let _ = shutdown_tx.send(true);
        });

        // Act
        let result = connection.connect_with_retry().await;

        // Assert
        assert!(matches!(result, Err(BridgeError::ShutdownRequested)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_is_reconnecting_during_backoff() {
        // Arrange: shutdown lands in the middle of the second backoff sleep
        let transport = MockTransport::with_failure();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut connection = BrokerConnection::new(transport, policy(None), topics(), shutdown_rx);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            let _ = shutdown_tx.send(true);
        });

        // Act
        let result = connection.connect_with_retry().await;

        // Assert: first retry at 1s failed, waiting for retry 2
        assert!(matches!(result, Err(BridgeError::ShutdownRequested)));
        assert_eq!(connection.connection_state(), ConnectionState::Reconnecting(2));
        assert!(!connection.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_is_permanently_disconnected_after_exhaustion() {
        let transport = MockTransport::with_failure();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut connection = BrokerConnection::new(transport, policy(Some(1)), topics(), shutdown_rx);

        let result = connection.connect_with_retry().await;

        assert!(matches!(
            result,
            Err(BridgeError::ConnectionExhausted { attempts: 2 })
        ));
        assert!(matches!(
            connection.connection_state(),
            ConnectionState::PermanentlyDisconnected(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_retry_clears_reconnecting_state() {
        let transport = MockTransport::new();
        let handle = transport.clone();
        handle.fail_next_connects(2).await;
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut connection = BrokerConnection::new(transport, policy(Some(3)), topics(), shutdown_rx);

        connection.connect_with_retry().await.unwrap();

        assert_eq!(connection.connection_state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_disconnects_first() {
        let transport = MockTransport::new();
        let handle = transport.clone();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut connection = BrokerConnection::new(transport, policy(Some(3)), topics(), shutdown_rx);
        connection.connect_with_retry().await.unwrap();

        connection.reconnect().await.unwrap();

        assert_eq!(handle.disconnect_count().await, 1);
        assert_eq!(handle.connect_attempts().await.len(), 2);
        assert_eq!(handle.subscriptions().await, vec![topics(), topics()]);
        assert_eq!(connection.reconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_errors_are_swallowed() {
        let transport = MockTransport::new();
        let handle = transport.clone();
        handle.fail_disconnects().await;
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut connection = BrokerConnection::new(transport, policy(Some(3)), topics(), shutdown_rx);

        // Must not panic or return an error
        connection.disconnect().await;

        assert_eq!(handle.disconnect_count().await, 1);
    }
}
