//! Grammar plugin
//!
//! The single call surface the rest of the system uses for one loaded
//! grammar. Wraps an adapter, checks capabilities before calling, and turns
//! raw parse results into hydrated trees using the plugin's field mapping.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::adapter::{AdapterCapabilities, CompileStatus, EvalRequest, GrammarAdapter};
use crate::endpoint::{GrammarEndpoint, TransportKind, OPTION_ROOT_TAGS};
use crate::error::{GrammarError, GrammarResult};
use crate::tree::{normalize, FieldMapping, NodeRef};

/// One loaded grammar
pub struct GrammarPlugin {
    adapter: Arc<dyn GrammarAdapter>,
    mapping: FieldMapping,
    endpoint: Option<GrammarEndpoint>,
}

impl GrammarPlugin {
    /// Wrap an adapter; `mapping` defaults to the canonical field names
    pub fn new(adapter: Arc<dyn GrammarAdapter>, mapping: Option<FieldMapping>) -> Self {
        Self {
            adapter,
            mapping: mapping.unwrap_or_default(),
            endpoint: None,
        }
    }

    pub(crate) fn with_mapping(mut self, mapping: FieldMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub(crate) fn with_endpoint(mut self, endpoint: GrammarEndpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Endpoint this plugin was loaded from, if it came through the loader
    pub fn endpoint(&self) -> Option<&GrammarEndpoint> {
        self.endpoint.as_ref()
    }

    pub fn transport(&self) -> TransportKind {
        self.adapter.transport()
    }

    pub fn capabilities(&self) -> AdapterCapabilities {
        self.adapter.capabilities()
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Parse `input` starting at production `root_tag`
    pub async fn parse(&self, root_tag: &str, input: &str) -> GrammarResult<NodeRef> {
        if !self.capabilities().parse {
            return Err(GrammarError::ParseUnavailable);
        }

        let started = Instant::now();
        let raw = self
            .adapter
            .eval(EvalRequest::parse(root_tag, input))
            .await?
            .ok_or(GrammarError::ParseUnavailable)?;

        if raw.is_falsy() {
            return Err(GrammarError::EmptyResult);
        }

        let shape = raw.shape();
        let tree = normalize(raw, &self.mapping)?;
        debug!(
            root_tag,
            ?shape,
            nodes = tree.size(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Parsed input"
        );
        Ok(tree)
    }

    /// Evaluate `input` against `context`.
    ///
    /// `Ok(None)` when the backend answers that evaluation is not offered or
    /// returns `null`.
    pub async fn eval(
        &self,
        root_tag: &str,
        input: &str,
        context: &Value,
    ) -> GrammarResult<Option<Value>> {
        if !self.capabilities().eval {
            return Err(GrammarError::EvalUnavailable);
        }

        let raw = match self
            .adapter
            .eval(EvalRequest::run(root_tag, input, context))
            .await?
        {
            Some(raw) => raw,
            None => {
                debug!(root_tag, "Evaluation not offered by backend");
                return Ok(None);
            }
        };

        // `0`, `false` and `""` are valid output
        match raw.into_value()? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }

    /// Read a backend option; `None` when the option is not offered
    pub async fn get_option(&self, key: &str) -> GrammarResult<Option<Value>> {
        if !self.capabilities().get_option {
            return Ok(None);
        }
        self.adapter.get_option(key).await
    }

    /// Root productions the grammar advertises
    pub async fn root_tags(&self) -> GrammarResult<Vec<String>> {
        let tags = self.get_option(OPTION_ROOT_TAGS).await?;
        Ok(string_list(tags))
    }

    /// Recompile the grammar from source
    pub async fn recompile(&self, source: &str) -> GrammarResult<Option<CompileStatus>> {
        if !self.capabilities().recompile {
            return Err(GrammarError::UnsupportedOperation {
                operation: "recompile",
            });
        }
        self.adapter.recompile(source).await
    }
}

impl fmt::Debug for GrammarPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrammarPlugin")
            .field("transport", &self.transport())
            .field("endpoint", &self.endpoint.as_ref().map(|e| &e.resolved_url))
            .field("mapping", &self.mapping)
            .finish()
    }
}

/// Read a JSON string array, ignoring non-string members
pub(crate) fn string_list(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => vec![s],
        _ => Vec::new(),
    }
}
