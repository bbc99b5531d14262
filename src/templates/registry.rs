//! Registry of template bindings keyed by topic

use super::binding::TemplateBinding;
use crate::config::BridgeConfig;
use crate::error::BridgeResult;
use std::collections::BTreeMap;
use std::path::Path;

/// Topic name to ordered template bindings.
///
/// Built once at startup and then owned by the message processor, which is
/// the only code path that reloads bindings.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    topics: BTreeMap<String, Vec<TemplateBinding>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every binding named in the configuration. Any missing or broken
    /// template fails the whole load.
    pub async fn from_config(config: &BridgeConfig) -> BridgeResult<Self> {
        let mut registry = Self::new();
        for topic in &config.topics {
            for binding in &topic.bindings {
                registry
                    .load(&topic.topic, &binding.template, &binding.output)
                    .await?;
            }
        }
        Ok(registry)
    }

    /// Compile `source_path` and append it to the bindings of `topic`
    pub async fn load(
        &mut self,
        topic: &str,
        source_path: &Path,
        output_path: &Path,
    ) -> BridgeResult<()> {
        let binding = TemplateBinding::load(source_path, output_path).await?;
        self.topics
            .entry(topic.to_string())
            .or_default()
            .push(binding);
        Ok(())
    }

    /// Topics that have at least one binding, i.e. the subscription set
    pub fn topics_with_bindings(&self) -> Vec<String> {
        self.topics
            .iter()
            .filter(|(_, bindings)| !bindings.is_empty())
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    /// Bindings for `topic`, or `None` when the topic is not handled
    pub fn bindings(&self, topic: &str) -> Option<&[TemplateBinding]> {
        self.topics
            .get(topic)
            .filter(|bindings| !bindings.is_empty())
            .map(Vec::as_slice)
    }

    /// Mutable bindings for `topic`, for reload-then-render
    pub fn bindings_mut(&mut self, topic: &str) -> Option<&mut [TemplateBinding]> {
        self.topics
            .get_mut(topic)
            .filter(|bindings| !bindings.is_empty())
            .map(Vec::as_mut_slice)
    }

    pub fn binding_count(&self) -> usize {
        self.topics.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.binding_count() == 0
    }
}
