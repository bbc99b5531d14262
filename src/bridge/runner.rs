//! The bridge event loop
//!
//! One task owns the connection, the processor and the watchdog. Message
//! receipt, heartbeat ticks and shutdown are multiplexed with `select!`, so a
//! reconnect always finishes before the next receive and nothing needs a lock.

use super::connection::BrokerConnection;
use super::processor::{MessageOutcome, MessageProcessor};
use super::shutdown_signalled;
use super::watchdog::{HeartbeatWatchdog, HEARTBEAT_POLL_PERIOD};
use crate::config::BridgeConfig;
use crate::error::{error_chain, BridgeError, BridgeResult};
use crate::message_span;
use crate::templates::TemplateRegistry;
use crate::transport::mqtt::ReconnectConfig;
use crate::transport::{IncomingMessage, Transport};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

/// Pause after an unexpected processing error before receiving again
pub const ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Counters reported at shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub messages_received: u64,
    pub messages_processed: u64,
    pub unhandled_messages: u64,
    pub payload_errors: u64,
    pub outputs_written: u64,
    pub binding_failures: u64,
    pub heartbeat_reconnects: u64,
    pub reconnects: u32,
}

pub struct Bridge<T: Transport> {
    connection: BrokerConnection<T>,
    processor: MessageProcessor,
    watchdog: HeartbeatWatchdog,
    shutdown_rx: watch::Receiver<bool>,
    error_pause: Duration,
    stats: BridgeStats,
}

impl<T: Transport> Bridge<T> {
    pub fn new(
        config: &BridgeConfig,
        registry: TemplateRegistry,
        transport: T,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let topics = registry.topics_with_bindings();
        let connection = BrokerConnection::new(
            transport,
            ReconnectConfig::from_bridge_config(config),
            topics,
            shutdown_rx.clone(),
        );

        Self {
            connection,
            processor: MessageProcessor::new(registry, config.atomic_writes),
            watchdog: HeartbeatWatchdog::with_poll_period(
                Duration::from_secs(config.heartbeat_interval_secs),
                HEARTBEAT_POLL_PERIOD,
            ),
            shutdown_rx,
            error_pause: ERROR_PAUSE,
            stats: BridgeStats::default(),
        }
    }

    pub fn with_error_pause(mut self, pause: Duration) -> Self {
        self.error_pause = pause;
        self
    }

    /// Run until shutdown or a fatal error
    ///
    /// Shutdown is a normal return carrying the final counters. The session is
    /// closed on every exit path.
    pub async fn run(mut self) -> BridgeResult<BridgeStats> {
        let result = self.run_loop().await;

        self.connection.disconnect().await;
        self.stats.reconnects = self.connection.reconnect_count();

        match result {
            Ok(()) | Err(BridgeError::ShutdownRequested) => {
                info!(
                    messages_received = self.stats.messages_received,
                    messages_processed = self.stats.messages_processed,
                    outputs_written = self.stats.outputs_written,
                    binding_failures = self.stats.binding_failures,
                    reconnects = self.stats.reconnects,
                    "Bridge stopped"
                );
                Ok(self.stats)
            }
            Err(e) => Err(e),
        }
    }

    async fn run_loop(&mut self) -> BridgeResult<()> {
        self.connection.connect_with_retry().await?;
        self.watchdog.reset();
        info!(
            "Bridge running: {} topics, {} templates",
            self.connection.topics().len(),
            self.processor.registry().binding_count()
        );

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                biased;

                _ = shutdown_signalled(&mut shutdown_rx) => {
                    info!("Shutdown signal received, stopping bridge");
                    return Ok(());
                }

                _ = self.watchdog.tick() => {
                    if self.watchdog.is_stalled() {
                        info!(
                            "No message received for {:?}, reconnecting",
                            self.watchdog.idle_for()
                        );
                        self.stats.heartbeat_reconnects += 1;
                        self.connection.reconnect().await?;
                        self.watchdog.reset();
                    }
                }

                received = self.connection.next_message() => match received {
                    Ok(message) => self.handle_message(message).await,
                    Err(e) => {
                        warn!("Connection lost: {}", error_chain(&e));
                        self.connection.reconnect().await?;
                        self.watchdog.reset();
                    }
                }
            }
        }
    }

    async fn handle_message(&mut self, message: IncomingMessage) {
        self.watchdog.record_message();
        self.stats.messages_received += 1;

        let span = message_span!(topic = %message.topic, retain = message.retain);
        let result = async {
            info!("Received message on topic '{}'", message.topic);
            debug!("Payload: {}", String::from_utf8_lossy(&message.payload));
            self.processor.process(&message.topic, &message.payload).await
        }
        .instrument(span)
        .await;

        match result {
            Ok(MessageOutcome::Unhandled) => {
                self.stats.unhandled_messages += 1;
            }
            Ok(MessageOutcome::Rendered(report)) => {
                self.stats.messages_processed += 1;
                self.stats.outputs_written += report.outputs.len() as u64;
                self.stats.binding_failures += report.failures.len() as u64;
            }
            Err(e @ BridgeError::PayloadParse { .. }) => {
                error!("{}", e);
                self.stats.payload_errors += 1;
            }
            Err(e) => {
                error!(kind = e.kind(), "Unexpected processing error: {}", error_chain(&e));
                tokio::time::sleep(self.error_pause).await;
            }
        }
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    pub fn connection(&self) -> &BrokerConnection<T> {
        &self.connection
    }
}
