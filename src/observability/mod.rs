//! Observability for the template bridge
//!
//! Structured logging via `tracing`, configured from the environment and the
//! verbose setting.

pub mod logging;

// Re-export for convenience
pub use logging::{init_default_logging, init_logging, LogFormat};

// Span macros for structured logging
pub use logging::{connection_span, message_span};
