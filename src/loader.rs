//! Grammar loader
//!
//! Orchestrates probe -> adapter -> plugin for one URL and client identity.
//! The loader holds no plugin itself; every call returns a fresh
//! [`GrammarPlugin`] owned by the caller, which replaces whatever the caller
//! held before.

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::adapter::{build_adapter, ModuleLoader, ModuleRegistry};
use crate::config::GrammarConfig;
use crate::endpoint::{EndpointProber, OPTION_JSON_MAPPING};
use crate::error::{GrammarError, GrammarResult};
use crate::plugin::GrammarPlugin;
use crate::tree::FieldMapping;

/// Factory for grammar plugins
#[derive(Clone)]
pub struct GrammarLoader {
    config: GrammarConfig,
    prober: EndpointProber,
    modules: Arc<dyn ModuleLoader>,
}

impl GrammarLoader {
    /// Loader without any registered static modules
    pub fn new(config: GrammarConfig) -> GrammarResult<Self> {
        Self::with_modules(config, Arc::new(ModuleRegistry::new()))
    }

    pub fn with_modules(config: GrammarConfig, modules: Arc<dyn ModuleLoader>) -> GrammarResult<Self> {
        let prober = EndpointProber::new(&config)?;
        Ok(Self {
            config,
            prober,
            modules,
        })
    }

    pub fn config(&self) -> &GrammarConfig {
        &self.config
    }

    /// Load the grammar at `url` for `client_id`.
    ///
    /// Without an explicit `mapping` the backend's `jsonMapping` option is
    /// used when offered, otherwise the canonical field names. Any failure
    /// is logged and returned as `GrammarLoad`.
    pub async fn load(
        &self,
        client_id: &str,
        url: &str,
        mapping: Option<FieldMapping>,
    ) -> GrammarResult<GrammarPlugin> {
        match self.load_inner(client_id, url, mapping).await {
            Ok(plugin) => Ok(plugin),
            Err(e) => {
                error!(url = %url, error = %e, "Error loading grammar");
                Err(GrammarError::load(url, e))
            }
        }
    }

    async fn load_inner(
        &self,
        client_id: &str,
        url: &str,
        mapping: Option<FieldMapping>,
    ) -> GrammarResult<GrammarPlugin> {
        let target = self.config.rewrite_url(url);
        if target != url {
            debug!(from = %url, to = %target, "Rewrote grammar URL through relay");
        }

        let endpoint = self.prober.probe(client_id, &target).await?;
        let adapter = build_adapter(&endpoint, client_id, &self.config, self.modules.as_ref()).await?;
        let mut plugin = GrammarPlugin::new(adapter, mapping.clone());

        if mapping.is_none() {
            if let Some(advertised) = advertised_mapping(&plugin).await {
                plugin = plugin.with_mapping(advertised);
            }
        }

        info!(
            url = %url,
            transport = %endpoint.transport,
            resolved = %endpoint.resolved_url,
            "Grammar loaded"
        );
        Ok(plugin.with_endpoint(endpoint))
    }
}

/// Mapping offered by the backend itself; failures fall back to defaults
async fn advertised_mapping(plugin: &GrammarPlugin) -> Option<FieldMapping> {
    match plugin.get_option(OPTION_JSON_MAPPING).await {
        Ok(Some(value)) if value.is_object() => match serde_json::from_value(value) {
            Ok(mapping) => Some(mapping),
            Err(e) => {
                debug!(error = %e, "Ignoring malformed advertised mapping");
                None
            }
        },
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "Backend mapping option unavailable");
            None
        }
    }
}

impl std::fmt::Debug for GrammarLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrammarLoader")
            .field("config", &self.config)
            .finish()
    }
}
