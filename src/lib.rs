//! grammar-inspector: grammar plugin loading, AST normalization and an
//! incremental inspector engine
//!
//! This crate contains:
//! - Endpoint probing (live HTTP grammar service vs. static module)
//! - Adapters giving both transports one `eval` / `get_option` / `recompile` surface
//! - `GrammarPlugin`, the single call surface for one loaded grammar
//! - Tree normalization of heterogeneous backend results into `HydratedNode` trees
//! - `GrammarLoader`, a pure factory from (client id, URL) to plugin
//! - `Inspector`, a debounced, stale-result-safe engine deriving tree, marks and output
//!
//! # Example
//!
//! ```no_run
//! use grammar_inspector::{GrammarConfig, GrammarLoader, Inspector, InspectorConfig};
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let loader = GrammarLoader::new(GrammarConfig::from_env())?;
//! let plugin = Arc::new(loader.load("client-1", "http://localhost:8080/calc", None).await?);
//!
//! let inspector = Inspector::spawn(InspectorConfig::default());
//! inspector.set_plugin(Some(plugin))?;
//! inspector.set_context_str("{\"x\": 2}")?;
//! inspector.set_expression("1 + x")?;
//!
//! let state = inspector.settle(Duration::from_secs(10)).await?;
//! println!("{:?}", state.output);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod grammar;
pub mod inspector;
pub mod loader;
pub mod plugin;
pub mod session;
pub mod tree;

// Re-export commonly used types
pub use adapter::{
    AdapterCapabilities, EvalMode, EvalRequest, GrammarAdapter, GrammarModule, ModuleExports,
    ModuleLoader, ModuleRegistry,
};
pub use config::{GrammarConfig, InspectorConfig, RelayRule};
pub use endpoint::{EndpointProber, GrammarEndpoint, TransportKind};
pub use error::{GrammarError, GrammarResult, InspectorError};
pub use grammar::EditorGrammar;
pub use inspector::{Inspector, InspectorState, Notification, NotificationLevel};
pub use loader::GrammarLoader;
pub use plugin::GrammarPlugin;
pub use session::SessionEnvelope;
pub use tree::{find_node_at, FieldMapping, HighlightMark, HydratedNode, NodeRef, RawResult};
