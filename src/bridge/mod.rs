//! The topic-driven rendering pipeline
//!
//! - [`connection`] - broker session lifecycle with exponential-backoff retry
//! - [`watchdog`] - heartbeat stall detection
//! - [`processor`] - per-message payload parsing, template reload, render and write
//! - [`runner`] - the single-task event loop tying the three together

pub mod connection;
pub mod processor;
pub mod runner;
pub mod watchdog;

pub use connection::BrokerConnection;
pub use processor::{BindingFailure, MessageOutcome, MessageProcessor, RenderReport};
pub use runner::{Bridge, BridgeStats};
pub use watchdog::{HeartbeatWatchdog, HEARTBEAT_POLL_PERIOD};

use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Resolve once shutdown has been signalled
///
/// A dropped sender means nobody can ever request shutdown, so this never resolves.
pub(crate) async fn shutdown_signalled(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Perform interruptible sleep with shutdown monitoring
/// Returns true if sleep completed, false if shutdown requested
pub(crate) async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown_signalled(&mut shutdown_rx) => {
            info!("Shutdown signal received during reconnection delay, stopping");
            false
        }
        _ = tokio::time::sleep(delay) => true,
    }
}
