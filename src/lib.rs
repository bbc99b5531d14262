//! mqtt2template - render MQTT messages into files through templates
//!
//! # Overview
//!
//! The bridge subscribes to every configured topic, parses each message
//! payload as a JSON object and renders the topic's templates with the
//! payload's keys as variables, writing each result to its output file.
//!
//! - Template sources are hot-reloaded when their modification time advances
//! - Lost connections are re-established with exponential backoff
//! - A heartbeat watchdog reconnects sessions that go silent
//! - A broken template or malformed message never stops the bridge
//!
//! # Quick Start
//!
//! ```rust
//! use mqtt2template::config::BridgeConfig;
//!
//! let config = BridgeConfig::from_json_str(r#"{
//!     "mqtt_broker_url": "mqtt://localhost:1883",
//!     "topics": {
//!         "sensor/temp": { "template": "temp.tmpl", "output": "temp.txt" }
//!     }
//! }"#).unwrap();
//!
//! assert_eq!(config.topics[0].topic, "sensor/temp");
//! assert_eq!(config.max_connection_retries, 10);
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod observability;
pub mod templates;
pub mod testing;
pub mod transport;

pub use bridge::{Bridge, BridgeStats};
pub use config::{BridgeConfig, ConfigError};
pub use error::{BridgeError, BridgeResult};
pub use templates::TemplateRegistry;
pub use transport::mqtt::MqttClient;
