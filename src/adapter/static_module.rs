//! Static grammar modules
//!
//! A static endpoint serves a module file (`index.js` / `index.es.js`). In a
//! Rust host the module is an in-process [`GrammarModule`] that a
//! [`ModuleLoader`] resolves from the probed module URL. The adapter exposes
//! exactly what the module exports; `recompile` is never available.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use super::{AdapterCapabilities, CompileStatus, EvalMode, EvalRequest, GrammarAdapter};
use crate::endpoint::TransportKind;
use crate::error::{GrammarError, GrammarResult};
use crate::tree::RawResult;

const MODULE_FILES: [&str; 2] = ["/index.js", "/index.es.js"];

/// Functions a module exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModuleExports {
    pub parse: bool,
    pub eval: bool,
    pub get_option: bool,
}

impl ModuleExports {
    pub fn all() -> Self {
        Self {
            parse: true,
            eval: true,
            get_option: true,
        }
    }
}

/// An in-process grammar implementation.
///
/// Default bodies mean "not exported"; implementors override what they
/// declare in [`GrammarModule::exports`]. Each call may return `Ok(None)` for
/// "no result".
#[async_trait]
pub trait GrammarModule: Send + Sync {
    fn exports(&self) -> ModuleExports;

    async fn parse(
        &self,
        _client_id: &str,
        _root_tag: &str,
        _input: &str,
    ) -> GrammarResult<Option<RawResult>> {
        Err(GrammarError::ParseUnavailable)
    }

    async fn eval(
        &self,
        _client_id: &str,
        _root_tag: &str,
        _input: &str,
        _context: &Value,
    ) -> GrammarResult<Option<RawResult>> {
        Err(GrammarError::EvalUnavailable)
    }

    async fn get_option(&self, _client_id: &str, _key: &str) -> GrammarResult<Option<Value>> {
        Ok(None)
    }
}

/// Resolves a probed module URL into a module instance
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, module_url: &str) -> GrammarResult<Arc<dyn GrammarModule>>;
}

type ModuleFactory = Arc<dyn Fn() -> Arc<dyn GrammarModule> + Send + Sync>;

/// Loader backed by modules the host registers up front.
///
/// A module registered under a base URL (`https://x/g`) also answers for the
/// module files probed beneath it (`https://x/g/index.js`).
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    factories: Arc<RwLock<HashMap<String, ModuleFactory>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module constructor; each load builds a fresh instance
    pub fn register<F>(&self, url: impl AsRef<str>, factory: F)
    where
        F: Fn() -> Arc<dyn GrammarModule> + Send + Sync + 'static,
    {
        let key = registry_key(url.as_ref());
        debug!(url = %key, "Registered grammar module");
        self.factories
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, Arc::new(factory));
    }

    /// Register one shared module instance
    pub fn register_instance(&self, url: impl AsRef<str>, module: Arc<dyn GrammarModule>) {
        self.register(url, move || Arc::clone(&module));
    }

    pub fn contains(&self, url: &str) -> bool {
        self.find(url).is_some()
    }

    fn find(&self, url: &str) -> Option<ModuleFactory> {
        let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
        let key = registry_key(url);
        if let Some(f) = factories.get(&key) {
            return Some(Arc::clone(f));
        }
        MODULE_FILES
            .iter()
            .find_map(|file| key.strip_suffix(file))
            .and_then(|base| factories.get(base))
            .cloned()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
        let mut urls: Vec<&String> = factories.keys().collect();
        urls.sort();
        f.debug_struct("ModuleRegistry").field("modules", &urls).finish()
    }
}

#[async_trait]
impl ModuleLoader for ModuleRegistry {
    async fn load(&self, module_url: &str) -> GrammarResult<Arc<dyn GrammarModule>> {
        let factory = self
            .find(module_url)
            .ok_or_else(|| GrammarError::ModuleNotFound {
                url: module_url.to_string(),
            })?;
        info!(url = %module_url, "Grammar module loaded");
        Ok(factory())
    }
}

fn registry_key(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Adapter over an in-process module
pub struct StaticAdapter {
    module: Arc<dyn GrammarModule>,
    client_id: String,
}

impl StaticAdapter {
    pub fn new(module: Arc<dyn GrammarModule>, client_id: &str) -> Self {
        Self {
            module,
            client_id: client_id.to_string(),
        }
    }
}

impl fmt::Debug for StaticAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticAdapter")
            .field("client_id", &self.client_id)
            .field("exports", &self.module.exports())
            .finish()
    }
}

#[async_trait]
impl GrammarAdapter for StaticAdapter {
    fn transport(&self) -> TransportKind {
        TransportKind::Static
    }

    fn capabilities(&self) -> AdapterCapabilities {
        let exports = self.module.exports();
        AdapterCapabilities {
            parse: exports.parse,
            eval: exports.eval,
            get_option: exports.get_option,
            recompile: false,
        }
    }

    async fn eval(&self, request: EvalRequest<'_>) -> GrammarResult<Option<RawResult>> {
        let exports = self.module.exports();
        match request.mode {
            EvalMode::Parse if exports.parse => {
                self.module
                    .parse(&self.client_id, request.root_tag, request.input)
                    .await
            }
            EvalMode::Parse => Err(GrammarError::ParseUnavailable),
            EvalMode::Run if exports.eval => {
                let empty = Value::Object(Default::default());
                let context = request.context.unwrap_or(&empty);
                self.module
                    .eval(&self.client_id, request.root_tag, request.input, context)
                    .await
            }
            EvalMode::Run => Err(GrammarError::EvalUnavailable),
        }
    }

    async fn get_option(&self, key: &str) -> GrammarResult<Option<Value>> {
        if !self.module.exports().get_option {
            return Ok(None);
        }
        self.module.get_option(&self.client_id, key).await
    }

    async fn recompile(&self, _source: &str) -> GrammarResult<Option<CompileStatus>> {
        Err(GrammarError::UnsupportedOperation {
            operation: "recompile",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl GrammarModule for Echo {
        fn exports(&self) -> ModuleExports {
            ModuleExports {
                parse: true,
                eval: false,
                get_option: true,
            }
        }

        async fn parse(
            &self,
            client_id: &str,
            root_tag: &str,
            input: &str,
        ) -> GrammarResult<Option<RawResult>> {
            Ok(Some(RawResult::PlainJson(json!({
                "name": root_tag, "start": 0, "end": input.len(), "client": client_id
            }))))
        }

        async fn get_option(&self, _client_id: &str, key: &str) -> GrammarResult<Option<Value>> {
            Ok((key == "rootTags").then(|| json!(["Program"])))
        }
    }

    #[tokio::test]
    async fn test_registry_resolves_module_files_under_base() {
        let registry = ModuleRegistry::new();
        registry.register("https://x/g/", || Arc::new(Echo) as Arc<dyn GrammarModule>);
        assert!(registry.contains("https://x/g/index.js"));
        assert!(registry.contains("https://x/g/index.es.js"));
        assert!(!registry.contains("https://x/other/index.js"));
        assert!(registry.load("https://x/g/index.js").await.is_ok());
    }

    #[tokio::test]
    async fn test_unregistered_module_is_not_found() {
        let registry = ModuleRegistry::new();
        let err = registry.load("https://x/g/index.js").await.err().unwrap();
        assert!(matches!(err, GrammarError::ModuleNotFound { .. }));
    }

    #[tokio::test]
    async fn test_static_adapter_exposes_module_exports() {
        let adapter = StaticAdapter::new(Arc::new(Echo), "c1");
        let caps = adapter.capabilities();
        assert!(caps.parse && caps.get_option);
        assert!(!caps.eval && !caps.recompile);

        let raw = adapter
            .eval(EvalRequest::parse("Program", "abc"))
            .await
            .unwrap()
            .unwrap();
        match raw {
            RawResult::PlainJson(v) => assert_eq!(v["client"], json!("c1")),
            other => panic!("unexpected {:?}", other),
        }

        let ctx = json!({});
        let err = adapter
            .eval(EvalRequest::run("Program", "abc", &ctx))
            .await
            .unwrap_err();
        assert!(matches!(err, GrammarError::EvalUnavailable));
    }

    #[tokio::test]
    async fn test_static_recompile_is_unsupported() {
        let adapter = StaticAdapter::new(Arc::new(Echo), "c1");
        assert!(matches!(
            adapter.recompile("g").await,
            Err(GrammarError::UnsupportedOperation { .. })
        ));
        assert_eq!(
            adapter.get_option("rootTags").await.unwrap(),
            Some(json!(["Program"]))
        );
    }
}
