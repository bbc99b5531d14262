//! Configuration loading and validation for the template bridge
//!
//! The JSON file is parsed into a private raw structure and then validated into
//! [`BridgeConfig`]. Malformed required fields are rejected outright; malformed
//! topic entries are skipped and recorded in [`BridgeConfig::skipped_topics`]
//! so the caller can report them once logging is up.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Location of the configuration file when none is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "/config/config.json";

/// Validated bridge configuration. Immutable after load.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BridgeConfig {
    /// MQTT broker endpoint, e.g. `mqtt://broker:1883`
    pub broker_url: String,
    /// Enable informational logging
    pub verbose: bool,
    /// Maximum failed connection retries before giving up (0 = unlimited)
    pub max_connection_retries: u32,
    /// Delay before the first retry, in seconds
    pub retry_delay_secs: f64,
    /// Multiplier applied to the delay after each failed attempt
    pub retry_backoff_factor: f64,
    /// Reconnect when no message has arrived for this many seconds
    pub heartbeat_interval_secs: u64,
    /// Write outputs through a temporary file and rename
    pub atomic_writes: bool,
    /// Topics with at least one template binding, in topic name order
    pub topics: Vec<TopicConfig>,
    /// Topic entries that were rejected during validation
    #[serde(skip)]
    pub skipped_topics: Vec<SkippedTopic>,
}

/// A topic and its ordered template bindings
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TopicConfig {
    pub topic: String,
    pub bindings: Vec<BindingConfig>,
}

/// One template source rendered to one output file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BindingConfig {
    pub template: PathBuf,
    pub output: PathBuf,
}

/// A topic entry that was not usable, with the reason
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedTopic {
    pub topic: String,
    pub reason: String,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("MQTT broker URL is not defined (mqtt_broker_url)")]
    MissingBrokerUrl,
    #[error("No valid topics defined")]
    NoValidTopics,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    mqtt_broker_url: Option<String>,
    #[serde(default)]
    verbose: bool,
    #[serde(default = "default_max_connection_retries")]
    max_connection_retries: u32,
    #[serde(default = "default_retry_delay_seconds")]
    retry_delay_seconds: f64,
    #[serde(default = "default_retry_backoff_factor")]
    retry_backoff_factor: f64,
    #[serde(default = "default_heartbeat_interval_seconds")]
    heartbeat_interval_seconds: u64,
    #[serde(default)]
    atomic_writes: bool,
    #[serde(default)]
    topics: BTreeMap<String, serde_json::Value>,
}

/// The two accepted shapes of a topic entry
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TopicEntry {
    Single(BindingConfig),
    Multiple(BindingList),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BindingList {
    templates: Vec<BindingConfig>,
}

fn default_max_connection_retries() -> u32 {
    10
}

fn default_retry_delay_seconds() -> f64 {
    5.0
}

fn default_retry_backoff_factor() -> f64 {
    1.5
}

fn default_heartbeat_interval_seconds() -> u64 {
    60
}

impl BridgeConfig {
    /// Load and validate configuration from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Parse and validate configuration from JSON text
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(content)?;
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        let broker_url = raw
            .mqtt_broker_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingBrokerUrl)?;
        let broker_url = normalize_broker_url(&broker_url)?;

        if !raw.retry_delay_seconds.is_finite() || raw.retry_delay_seconds < 0.0 {
            return Err(ConfigError::InvalidConfig(format!(
                "retry_delay_seconds must be a non-negative number, got {}",
                raw.retry_delay_seconds
            )));
        }
        if !raw.retry_backoff_factor.is_finite() || raw.retry_backoff_factor < 1.0 {
            return Err(ConfigError::InvalidConfig(format!(
                "retry_backoff_factor must be at least 1, got {}",
                raw.retry_backoff_factor
            )));
        }
        if raw.heartbeat_interval_seconds == 0 {
            return Err(ConfigError::InvalidConfig(
                "heartbeat_interval_seconds must be greater than 0".to_string(),
            ));
        }

        let (topics, skipped_topics) = parse_topics(raw.topics);
        if topics.is_empty() {
            return Err(ConfigError::NoValidTopics);
        }

        Ok(Self {
            broker_url,
            verbose: raw.verbose,
            max_connection_retries: raw.max_connection_retries,
            retry_delay_secs: raw.retry_delay_seconds,
            retry_backoff_factor: raw.retry_backoff_factor,
            heartbeat_interval_secs: raw.heartbeat_interval_seconds,
            atomic_writes: raw.atomic_writes,
            topics,
            skipped_topics,
        })
    }

    /// Verbose logging is on when either the CLI flag or the config asks for it
    pub fn is_verbose(&self, cli_verbose: bool) -> bool {
        cli_verbose || self.verbose
    }

    /// Total number of template bindings across all topics
    pub fn binding_count(&self) -> usize {
        self.topics.iter().map(|t| t.bindings.len()).sum()
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self::from_json_str(
            r#"{
                "mqtt_broker_url": "mqtt://localhost:1883",
                "topics": {
                    "sensor/temp": { "template": "temp.tmpl", "output": "temp.txt" }
                }
            }"#,
        )
        .expect("Test config should parse")
    }
}

/// Check the broker endpoint before any connect attempt
///
/// A bare `host[:port]` is taken as `mqtt://host[:port]`. Only the plain
/// (`mqtt`, `tcp`) and TLS (`mqtts`, `ssl`) schemes are accepted, and a host
/// is required.
fn normalize_broker_url(raw: &str) -> Result<String, ConfigError> {
    let broker_url = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("mqtt://{raw}")
    };

    let url = Url::parse(&broker_url).map_err(|e| {
        ConfigError::InvalidConfig(format!("mqtt_broker_url is not a valid URL: {e}"))
    })?;

    if !matches!(url.scheme(), "mqtt" | "tcp" | "mqtts" | "ssl") {
        return Err(ConfigError::InvalidConfig(format!(
            "mqtt_broker_url scheme '{}' is not supported (use mqtt, tcp, mqtts or ssl)",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::InvalidConfig(
            "mqtt_broker_url has no host".to_string(),
        ));
    }

    Ok(broker_url)
}

/// Split raw topic entries into usable topics and skipped ones
fn parse_topics(
    entries: BTreeMap<String, serde_json::Value>,
) -> (Vec<TopicConfig>, Vec<SkippedTopic>) {
    let mut topics = Vec::new();
    let mut skipped = Vec::new();

    for (topic, value) in entries {
        if topic.trim().is_empty() {
            skipped.push(SkippedTopic {
                topic,
                reason: "topic name is empty".to_string(),
            });
            continue;
        }

        let bindings = match serde_json::from_value::<TopicEntry>(value) {
            Ok(TopicEntry::Single(binding)) => vec![binding],
            Ok(TopicEntry::Multiple(list)) => list.templates,
            Err(_) => {
                skipped.push(SkippedTopic {
                    topic,
                    reason: "expected either {\"template\", \"output\"} or {\"templates\": [...]}"
                        .to_string(),
                });
                continue;
            }
        };

        if bindings.is_empty() {
            skipped.push(SkippedTopic {
                topic,
                reason: "template list is empty".to_string(),
            });
            continue;
        }

        topics.push(TopicConfig { topic, bindings });
    }

    (topics, skipped)
}
