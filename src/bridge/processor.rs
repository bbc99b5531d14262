//! Per-message processing
//!
//! Parses the payload once, then runs every binding of the topic
//! independently: reload if the source changed, render, write. A failing
//! binding is recorded in the [`RenderReport`] and never stops its siblings.

use crate::error::{error_chain, BridgeError, BridgeResult};
use crate::templates::{ReloadStatus, TemplateBinding, TemplateRegistry};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What happened to one message
#[derive(Debug)]
pub enum MessageOutcome {
    /// No bindings exist for the topic
    Unhandled,
    Rendered(RenderReport),
}

/// Per-binding results for one message
#[derive(Debug, Default)]
pub struct RenderReport {
    /// Output files written, in binding order
    pub outputs: Vec<PathBuf>,
    /// Bindings that produced no output
    pub failures: Vec<BindingFailure>,
    /// Bindings whose changed source failed to compile; they rendered with the
    /// previous template
    pub reload_failures: Vec<BindingFailure>,
}

impl RenderReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub struct BindingFailure {
    /// Zero-based position of the binding in the topic's configuration
    pub index: usize,
    pub error: BridgeError,
}

pub struct MessageProcessor {
    registry: TemplateRegistry,
    atomic_writes: bool,
}

impl MessageProcessor {
    pub fn new(registry: TemplateRegistry, atomic_writes: bool) -> Self {
        Self {
            registry,
            atomic_writes,
        }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn topics_with_bindings(&self) -> Vec<String> {
        self.registry.topics_with_bindings()
    }

    /// Process one message. Only a malformed payload is returned as an error;
    /// binding failures are reported in the outcome.
    pub async fn process(&mut self, topic: &str, payload: &[u8]) -> BridgeResult<MessageOutcome> {
        let data = parse_payload(topic, payload)?;

        let Some(bindings) = self.registry.bindings_mut(topic) else {
            info!("Received message for unhandled topic: {}", topic);
            return Ok(MessageOutcome::Unhandled);
        };

        let mut report = RenderReport::default();
        for (index, binding) in bindings.iter_mut().enumerate() {
            Self::process_binding(topic, index, binding, &data, self.atomic_writes, &mut report)
                .await;
        }

        Ok(MessageOutcome::Rendered(report))
    }

    async fn process_binding(
        topic: &str,
        index: usize,
        binding: &mut TemplateBinding,
        data: &Map<String, Value>,
        atomic_writes: bool,
        report: &mut RenderReport,
    ) {
        match binding.check_and_reload().await {
            Ok(ReloadStatus::Reloaded) => {
                debug!("Topic '{}' template {} now in service", topic, index + 1);
            }
            Ok(ReloadStatus::Unchanged | ReloadStatus::SourceUnavailable) => {}
            Err(e) => {
                warn!("{}; keeping previous template", error_chain(&e));
                report.reload_failures.push(BindingFailure { index, error: e });
            }
        }

        let rendered = match binding.render(data) {
            Ok(rendered) => rendered,
            Err(e) => {
                error!("{}", error_chain(&e));
                report.failures.push(BindingFailure { index, error: e });
                return;
            }
        };

        let output_path = binding.output_path();
        match write_output(output_path, &rendered, atomic_writes).await {
            Ok(()) => {
                info!(
                    "Generated file for topic '{}' (template {}): {}",
                    topic,
                    index + 1,
                    output_path.display()
                );
                report.outputs.push(output_path.to_path_buf());
            }
            Err(e) => {
                error!("{}", error_chain(&e));
                report.failures.push(BindingFailure { index, error: e });
            }
        }
    }
}

/// Parse a payload as a UTF-8 JSON object; its keys become template variables
pub fn parse_payload(topic: &str, payload: &[u8]) -> BridgeResult<Map<String, Value>> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| BridgeError::payload_parse(topic, format!("payload is not UTF-8: {e}")))?;

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(BridgeError::payload_parse(
            topic,
            format!("expected a JSON object, got {}", json_kind(&other)),
        )),
        Err(e) => Err(BridgeError::payload_parse(topic, e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Write the rendered text, creating the parent directory if needed
async fn write_output(path: &Path, contents: &str, atomic: bool) -> BridgeResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BridgeError::io(parent, e))?;
    }

    if !atomic {
        return tokio::fs::write(path, contents)
            .await
            .map_err(|e| BridgeError::io(path, e));
    }

    let temp_path = temp_path_for(path);
    tokio::fs::write(&temp_path, contents)
        .await
        .map_err(|e| BridgeError::io(&temp_path, e))?;

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await {
            debug!(
                "Could not remove temporary file {}: {}",
                temp_path.display(),
                cleanup
            );
        }
        return Err(BridgeError::io(path, e));
    }

    Ok(())
}

/// Hidden sibling of the output, so the rename never crosses filesystems
fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    path.with_file_name(format!(".{file_name}.{suffix}.tmp"))
}
