//! User-facing grammar records
//!
//! An [`EditorGrammar`] is one entry of the grammar list: where it lives, how
//! its JSON maps onto nodes, and what it advertises. The plugin is loaded
//! lazily and can be reloaded on demand; a failed reload keeps the previous
//! plugin.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::endpoint::{OPTION_EDITOR_URL, OPTION_SUPPORTS};
use crate::error::GrammarResult;
use crate::loader::GrammarLoader;
use crate::plugin::{string_list, GrammarPlugin};
use crate::tree::FieldMapping;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorGrammar {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_mapping: Option<FieldMapping>,
    #[serde(default)]
    pub root_tags: Vec<String>,
    /// Shipped with the tool rather than added by the user
    #[serde(default)]
    pub predefined: bool,
    #[serde(default)]
    pub supports: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_editor_url: Option<String>,
    #[serde(skip)]
    pub plugin: Option<Arc<GrammarPlugin>>,
    /// Message of the last failed load
    #[serde(skip)]
    pub load_error: Option<String>,
}

impl EditorGrammar {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            json_mapping: None,
            root_tags: Vec::new(),
            predefined: false,
            supports: Vec::new(),
            external_editor_url: None,
            plugin: None,
            load_error: None,
        }
    }

    pub fn with_mapping(mut self, mapping: FieldMapping) -> Self {
        self.json_mapping = Some(mapping);
        self
    }

    pub fn predefined(mut self) -> Self {
        self.predefined = true;
        self
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.supports.iter().any(|c| c == capability)
    }

    pub fn is_loaded(&self) -> bool {
        self.plugin.is_some()
    }

    /// Build a record around an already loaded plugin, reading what it
    /// advertises. The name defaults to the URL.
    pub async fn from_plugin(url: impl Into<String>, plugin: Arc<GrammarPlugin>) -> Self {
        let url = url.into();
        let mut grammar = Self::new(url.clone(), url);
        grammar.describe(&plugin).await;
        grammar.plugin = Some(plugin);
        grammar
    }

    /// Plugin for this grammar, loading it on first use
    pub async fn ensure_loaded(
        &mut self,
        loader: &GrammarLoader,
        client_id: &str,
    ) -> GrammarResult<Arc<GrammarPlugin>> {
        match &self.plugin {
            Some(plugin) => Ok(Arc::clone(plugin)),
            None => self.reload(loader, client_id).await,
        }
    }

    /// Load a fresh plugin, replacing the current one on success
    pub async fn reload(
        &mut self,
        loader: &GrammarLoader,
        client_id: &str,
    ) -> GrammarResult<Arc<GrammarPlugin>> {
        match loader.load(client_id, &self.url, self.json_mapping.clone()).await {
            Ok(plugin) => {
                let plugin = Arc::new(plugin);
                self.describe(&plugin).await;
                self.plugin = Some(Arc::clone(&plugin));
                self.load_error = None;
                info!(grammar = %self.name, root_tags = ?self.root_tags, "Grammar ready");
                Ok(plugin)
            }
            Err(e) => {
                warn!(grammar = %self.name, error = %e, "Keeping previous grammar plugin");
                self.load_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Refresh capabilities, editor URL and root tags from `plugin`
    async fn describe(&mut self, plugin: &GrammarPlugin) {
        self.supports = match plugin.endpoint() {
            Some(endpoint) if !endpoint.capabilities.is_empty() => endpoint.capabilities.clone(),
            _ => string_list(option_or_none(plugin, OPTION_SUPPORTS).await),
        };

        self.external_editor_url = match option_or_none(plugin, OPTION_EDITOR_URL).await {
            Some(Value::String(url)) if !url.is_empty() => Some(url),
            _ => None,
        };

        match plugin.root_tags().await {
            Ok(tags) if !tags.is_empty() => self.root_tags = tags,
            Ok(_) => {}
            Err(e) => debug!(grammar = %self.name, error = %e, "Root tags unavailable"),
        }
    }
}

async fn option_or_none(plugin: &GrammarPlugin, key: &str) -> Option<Value> {
    match plugin.get_option(key).await {
        Ok(value) => value,
        Err(e) => {
            debug!(key, error = %e, "Grammar option unavailable");
            None
        }
    }
}

pub fn find_by_url<'a>(grammars: &'a [EditorGrammar], url: &str) -> Option<&'a EditorGrammar> {
    grammars.iter().find(|g| g.url == url)
}

pub fn find_index(grammars: &[EditorGrammar], url: &str) -> Option<usize> {
    grammars.iter().position(|g| g.url == url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{GrammarModule, ModuleExports, StaticAdapter};
    use crate::endpoint::{OPTION_ROOT_TAGS, SUPPORTS_ROOT_TAGS};
    use async_trait::async_trait;
    use serde_json::json;

    struct Described;

    #[async_trait]
    impl GrammarModule for Described {
        fn exports(&self) -> ModuleExports {
            ModuleExports {
                parse: false,
                eval: false,
                get_option: true,
            }
        }

        async fn get_option(&self, _client_id: &str, key: &str) -> GrammarResult<Option<Value>> {
            Ok(match key {
                OPTION_SUPPORTS => Some(json!([SUPPORTS_ROOT_TAGS])),
                OPTION_EDITOR_URL => Some(json!("https://editor.local/g")),
                OPTION_ROOT_TAGS => Some(json!(["Program", "Statement"])),
                _ => None,
            })
        }
    }

    #[tokio::test]
    async fn test_from_plugin_reads_options() {
        let plugin = GrammarPlugin::new(Arc::new(StaticAdapter::new(Arc::new(Described), "c1")), None);
        let grammar = EditorGrammar::from_plugin("https://x/g", Arc::new(plugin)).await;
        assert_eq!(grammar.name, "https://x/g");
        assert!(grammar.supports(SUPPORTS_ROOT_TAGS));
        assert_eq!(grammar.root_tags, vec!["Program", "Statement"]);
        assert_eq!(
            grammar.external_editor_url.as_deref(),
            Some("https://editor.local/g")
        );
        assert!(grammar.is_loaded());
    }

    #[test]
    fn test_find_helpers() {
        let grammars = vec![
            EditorGrammar::new("a", "https://x/a").predefined(),
            EditorGrammar::new("b", "https://x/b"),
        ];
        assert_eq!(find_index(&grammars, "https://x/b"), Some(1));
        assert_eq!(find_by_url(&grammars, "https://x/a").map(|g| g.name.as_str()), Some("a"));
        assert!(find_by_url(&grammars, "https://x/c").is_none());
    }

    #[test]
    fn test_serialized_record_omits_runtime_fields() {
        let mut grammar = EditorGrammar::new("a", "https://x/a");
        grammar.load_error = Some("boom".into());
        let value = serde_json::to_value(&grammar).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "a", "url": "https://x/a", "rootTags": [],
                "predefined": false, "supports": []
            })
        );
        let back: EditorGrammar = serde_json::from_value(value).unwrap();
        assert!(back.load_error.is_none() && back.plugin.is_none());
    }
}
