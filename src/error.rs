//! Error handling for grammar loading, normalization and inspection
//!
//! Infrastructure failures (network, missing modules, adapter contract
//! violations) are `GrammarError`s. Failures caused by user-editable input
//! never show up here; the inspector folds them into state fields instead.

use thiserror::Error;

/// Result alias used across the grammar layer
pub type GrammarResult<T> = std::result::Result<T, GrammarError>;

/// Main error type for endpoint discovery, adapters and plugins
#[derive(Error, Debug)]
pub enum GrammarError {
    #[error("Invalid grammar endpoint: {url}")]
    UnreachableEndpoint { url: String },

    #[error("Error loading grammar from {url}: {cause}")]
    GrammarLoad {
        url: String,
        #[source]
        cause: Box<GrammarError>,
    },

    #[error("Grammar does not offer a parse capability")]
    ParseUnavailable,

    #[error("Grammar does not offer an eval capability")]
    EvalUnavailable,

    #[error("Grammar returned an empty result")]
    EmptyResult,

    #[error("Attempt to call unsupported {operation}")]
    UnsupportedOperation { operation: &'static str },

    #[error("No mapping provided with JSON result")]
    MissingMapping,

    #[error("Unknown result shape: {0}")]
    UnknownShape(String),

    #[error("No grammar module registered for {url}")]
    ModuleNotFound { url: String },

    #[error("Grammar module failed: {0}")]
    Module(String),

    #[error("{operation} failed at {url}: HTTP {status} {status_text}")]
    Status {
        operation: &'static str,
        url: String,
        status: u16,
        status_text: String,
    },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GrammarError {
    /// Wrap a probe/adapter failure as a load failure for `url`
    pub fn load(url: impl Into<String>, cause: GrammarError) -> Self {
        GrammarError::GrammarLoad {
            url: url.into(),
            cause: Box::new(cause),
        }
    }

    /// Map a transport error, keeping timeouts distinguishable
    pub(crate) fn from_request(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GrammarError::Timeout {
                url: url.to_string(),
            }
        } else {
            GrammarError::Http(err)
        }
    }

    /// Contract violations between the core and a misbehaving backend
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            GrammarError::MissingMapping | GrammarError::UnknownShape(_)
        )
    }
}

/// Errors raised by the inspector engine handle
#[derive(Error, Debug)]
pub enum InspectorError {
    #[error("Inspector engine has shut down")]
    Closed,

    #[error("Timed out waiting for the inspector to settle")]
    SettleTimeout,
}
