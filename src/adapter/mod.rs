//! Endpoint adapters
//!
//! One capability interface (`eval` in PARSE/RUN mode, `get_option`,
//! `recompile`) implemented once per transport:
//! - [`LiveAdapter`]: HTTP calls against a live grammar service
//! - [`StaticAdapter`]: an in-process [`GrammarModule`] resolved by a [`ModuleLoader`]
//!
//! Adapters are bound to one endpoint and one client identity and keep no
//! other state between calls.

pub mod live;
pub mod static_module;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::config::GrammarConfig;
use crate::endpoint::{GrammarEndpoint, TransportKind};
use crate::error::GrammarResult;
use crate::tree::RawResult;

pub use live::LiveAdapter;
pub use static_module::{GrammarModule, ModuleExports, ModuleLoader, ModuleRegistry, StaticAdapter};

/// Compile status returned by `recompile`; its shape belongs to the backend
pub type CompileStatus = Value;

/// Evaluation mode sent with every eval call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvalMode {
    Parse,
    Run,
}

impl EvalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvalMode::Parse => "PARSE",
            EvalMode::Run => "RUN",
        }
    }
}

impl fmt::Display for EvalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments of one eval call
#[derive(Debug, Clone, Copy)]
pub struct EvalRequest<'a> {
    pub root_tag: &'a str,
    pub input: &'a str,
    pub mode: EvalMode,
    /// Evaluation context; only meaningful in RUN mode
    pub context: Option<&'a Value>,
}

impl<'a> EvalRequest<'a> {
    pub fn parse(root_tag: &'a str, input: &'a str) -> Self {
        Self {
            root_tag,
            input,
            mode: EvalMode::Parse,
            context: None,
        }
    }

    pub fn run(root_tag: &'a str, input: &'a str, context: &'a Value) -> Self {
        Self {
            root_tag,
            input,
            mode: EvalMode::Run,
            context: Some(context),
        }
    }
}

/// Which calls an adapter offers. Checked before invocation; a call that is
/// offered may still report "not offered" at call time (live 404).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdapterCapabilities {
    pub parse: bool,
    pub eval: bool,
    pub get_option: bool,
    pub recompile: bool,
}

/// Uniform capability interface over both transports.
///
/// `Ok(None)` means the backend does not offer the call (discovered while
/// calling); errors are hard failures the caller may retry.
#[async_trait]
pub trait GrammarAdapter: Send + Sync {
    fn transport(&self) -> TransportKind;

    fn capabilities(&self) -> AdapterCapabilities;

    async fn eval(&self, request: EvalRequest<'_>) -> GrammarResult<Option<RawResult>>;

    async fn get_option(&self, key: &str) -> GrammarResult<Option<Value>>;

    async fn recompile(&self, source: &str) -> GrammarResult<Option<CompileStatus>>;
}

/// Build the adapter matching `endpoint.transport`
pub async fn build_adapter(
    endpoint: &GrammarEndpoint,
    client_id: &str,
    config: &GrammarConfig,
    modules: &dyn ModuleLoader,
) -> GrammarResult<Arc<dyn GrammarAdapter>> {
    match endpoint.transport {
        TransportKind::Live => {
            let adapter = LiveAdapter::new(endpoint, client_id, config)?;
            Ok(Arc::new(adapter))
        }
        TransportKind::Static => {
            let module = modules.load(&endpoint.resolved_url).await?;
            Ok(Arc::new(StaticAdapter::new(module, client_id)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_eval_mode_wire_names() {
        assert_eq!(EvalMode::Parse.to_string(), "PARSE");
        assert_eq!(serde_json::to_value(EvalMode::Run).unwrap(), json!("RUN"));
    }

    #[test]
    fn test_eval_request_constructors() {
        let ctx = json!({"x": 1});
        let parse = EvalRequest::parse("Program", "1+1");
        assert_eq!(parse.mode, EvalMode::Parse);
        assert!(parse.context.is_none());
        let run = EvalRequest::run("Program", "1+1", &ctx);
        assert_eq!(run.mode, EvalMode::Run);
        assert_eq!(run.context, Some(&ctx));
    }
}
