//! Grammar endpoints
//!
//! An endpoint is a grammar backend reachable by URL: either a statically
//! served module or a live HTTP parsing service. The prober decides which.

pub mod prober;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use prober::EndpointProber;

/// Option key naming the endpoint type in the capability query
pub const OPTION_ENDPOINT_TYPE: &str = "endpointType";
/// Option key listing advertised capabilities
pub const OPTION_SUPPORTS: &str = "supports";
/// Option key listing selectable root productions
pub const OPTION_ROOT_TAGS: &str = "rootTags";
/// Option key for an external grammar editor URL
pub const OPTION_EDITOR_URL: &str = "editorUrl";
/// Option key for a backend supplied field mapping
pub const OPTION_JSON_MAPPING: &str = "jsonMapping";

/// `endpointType` value announced by live services
pub const ENDPOINT_TYPE_LIVE: &str = "LIVE";

pub const SUPPORTS_FORK: &str = "supports-fork";
pub const SUPPORTS_RECOMPILE: &str = "supports-recompile";
pub const SUPPORTS_EXTERNAL_EDITOR: &str = "supports-external-editor";
pub const SUPPORTS_ROOT_TAGS: &str = "supports-root-tags";

/// How an endpoint is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportKind {
    /// Module file served as-is (`index.js` / `index.es.js`)
    Static,
    /// HTTP service answering `/opt`, `/eval`, `/recompile`
    Live,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Static => write!(f, "STATIC"),
            TransportKind::Live => write!(f, "LIVE"),
        }
    }
}

/// One probed backend. Immutable once created by the prober.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarEndpoint {
    /// URL as given by the user (after relay rewrite)
    pub url: String,
    pub transport: TransportKind,
    pub capabilities: Vec<String>,
    /// Base URL for live calls, module file URL for static endpoints
    pub resolved_url: String,
}

impl GrammarEndpoint {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}
