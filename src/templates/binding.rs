//! A single template source bound to a single output file

use crate::error::{error_chain, BridgeError, BridgeResult};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tera::{Context, Tera};
use tokio::fs;
use tracing::{debug, info};

/// A compiled Tera template holding exactly one named template
pub struct CompiledTemplate {
    tera: Tera,
    name: String,
}

impl CompiledTemplate {
    /// Compile template text. `name` only shows up in engine error messages.
    pub fn compile(name: &str, source: &str) -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        // Outputs are plain text files, never HTML-escaped
        tera.autoescape_on(vec![]);
        tera.add_raw_template(name, source)?;
        Ok(Self {
            tera,
            name: name.to_string(),
        })
    }

    /// Render with the top-level keys of `data` as template variables
    pub fn render(&self, data: &Map<String, Value>) -> Result<String, tera::Error> {
        let context = Context::from_serialize(data)?;
        self.tera.render(&self.name, &context)
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .finish()
    }
}

/// Result of a hot-reload check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadStatus {
    /// Source mtime is not newer than the compiled one
    Unchanged,
    /// Source was newer and compiled successfully
    Reloaded,
    /// Source metadata could not be read; the binding was left as is
    SourceUnavailable,
}

/// Template source, compiled form, output path and the source mtime that
/// produced the compiled form
#[derive(Debug)]
pub struct TemplateBinding {
    source_path: PathBuf,
    output_path: PathBuf,
    template: CompiledTemplate,
    source_modified_at: SystemTime,
}

impl TemplateBinding {
    /// Read and compile `source_path`. Missing or uncompilable sources are a
    /// [`BridgeError::TemplateLoad`].
    pub async fn load(source_path: &Path, output_path: &Path) -> BridgeResult<Self> {
        let (source, modified) = read_source(source_path).await.map_err(|e| {
            let message = if e.kind() == std::io::ErrorKind::NotFound {
                "template file not found".to_string()
            } else {
                error_chain(&e)
            };
            BridgeError::template_load(source_path, message)
        })?;

        let template = compile(source_path, &source)
            .map_err(|e| BridgeError::template_load(source_path, error_chain(&e)))?;

        info!("Loaded template: {}", source_path.display());
        Ok(Self {
            source_path: source_path.to_path_buf(),
            output_path: output_path.to_path_buf(),
            template,
            source_modified_at: modified,
        })
    }

    /// Recompile when the source file has a newer modification time.
    ///
    /// The compiled template and recorded mtime change together or not at all.
    /// A failed recompile returns [`BridgeError::TemplateReload`] and keeps the
    /// previous template in service.
    pub async fn check_and_reload(&mut self) -> BridgeResult<ReloadStatus> {
        let modified = match source_modified_at(&self.source_path).await {
            Ok(modified) => modified,
            Err(e) => {
                debug!(
                    "Cannot stat template {}, keeping current version: {}",
                    self.source_path.display(),
                    e
                );
                return Ok(ReloadStatus::SourceUnavailable);
            }
        };

        if modified <= self.source_modified_at {
            return Ok(ReloadStatus::Unchanged);
        }

        info!(
            "Template {} has changed, reloading...",
            self.source_path.display()
        );

        let source = fs::read_to_string(&self.source_path)
            .await
            .map_err(|e| BridgeError::template_reload(&self.source_path, error_chain(&e)))?;
        let template = compile(&self.source_path, &source)
            .map_err(|e| BridgeError::template_reload(&self.source_path, error_chain(&e)))?;

        self.template = template;
        self.source_modified_at = modified;
        Ok(ReloadStatus::Reloaded)
    }

    /// Render the current template against a payload object
    pub fn render(&self, data: &Map<String, Value>) -> BridgeResult<String> {
        self.template
            .render(data)
            .map_err(|e| BridgeError::render(&self.source_path, error_chain(&e)))
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Modification time of the source that produced the current template
    pub fn source_modified_at(&self) -> SystemTime {
        self.source_modified_at
    }
}

fn compile(path: &Path, source: &str) -> Result<CompiledTemplate, tera::Error> {
    CompiledTemplate::compile(&path.to_string_lossy(), source)
}

async fn source_modified_at(path: &Path) -> std::io::Result<SystemTime> {
    fs::metadata(path).await?.modified()
}

/// Read template text, taking the mtime first so a concurrent edit is picked
/// up by the next reload check rather than missed
async fn read_source(path: &Path) -> std::io::Result<(String, SystemTime)> {
    let modified = source_modified_at(path).await?;
    let source = fs::read_to_string(path).await?;
    Ok((source, modified))
}
