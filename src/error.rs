//! Error types for the template bridge
//!
//! Every failure the pipeline can produce is a [`BridgeError`] variant. Callers
//! decide what to do by matching on the variant or asking [`BridgeError::is_fatal`],
//! never by inspecting message text.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Failed to load template {path}: {message}")]
    TemplateLoad { path: PathBuf, message: String },

    #[error("Connection error")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Giving up after {attempts} failed connection attempts")]
    ConnectionExhausted { attempts: u32 },

    #[error("Failed to parse payload on topic '{topic}': {message}")]
    PayloadParse { topic: String, message: String },

    #[error("Failed to reload template {path}: {message}")]
    TemplateReload { path: PathBuf, message: String },

    #[error("Failed to render template {path}: {message}")]
    Render { path: PathBuf, message: String },

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Shutdown requested")]
    ShutdownRequested,
}

impl BridgeError {
    /// Whether this error must terminate the process
    ///
    /// Only startup configuration/template problems and exhausted connection
    /// retries are fatal. Everything scoped to one message or one binding is not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::Config(_)
                | BridgeError::TemplateLoad { .. }
                | BridgeError::ConnectionExhausted { .. }
        )
    }

    /// Short, stable name of the error kind for structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Config(_) => "config",
            BridgeError::TemplateLoad { .. } => "template_load",
            BridgeError::Connection(_) => "connection",
            BridgeError::ConnectionExhausted { .. } => "connection_exhausted",
            BridgeError::PayloadParse { .. } => "payload_parse",
            BridgeError::TemplateReload { .. } => "template_reload",
            BridgeError::Render { .. } => "render",
            BridgeError::Io { .. } => "io",
            BridgeError::ShutdownRequested => "shutdown",
        }
    }

    /// Create connection error from any transport error
    pub fn connection<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection(Box::new(error))
    }

    /// Create payload parse error
    pub fn payload_parse<T: Into<String>, M: Into<String>>(topic: T, message: M) -> Self {
        Self::PayloadParse {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create template load error
    pub fn template_load<P: Into<PathBuf>, M: Into<String>>(path: P, message: M) -> Self {
        Self::TemplateLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create template reload error
    pub fn template_reload<P: Into<PathBuf>, M: Into<String>>(path: P, message: M) -> Self {
        Self::TemplateReload {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create render error
    pub fn render<P: Into<PathBuf>, M: Into<String>>(path: P, message: M) -> Self {
        Self::Render {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create I/O error bound to the path it happened on
    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Flatten an error and its sources into one line
///
/// Template engine errors keep the useful part (line, column, undefined
/// variable) in the source chain rather than the top-level message.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
