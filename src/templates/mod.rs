//! Topic to template registry
//!
//! Each topic owns an ordered list of [`TemplateBinding`]s. Bindings compile
//! their source with Tera at load time and recompile in place when the source
//! file's modification time moves forward.

pub mod binding;
pub mod registry;

pub use binding::{CompiledTemplate, ReloadStatus, TemplateBinding};
pub use registry::TemplateRegistry;
