//! Live grammar endpoint adapter
//!
//! Every call is one HTTP request against the probed base URL:
//!
//! ```text
//! GET  {base}/opt?clientId=&key=<option>                       -> option value
//! POST {base}/eval?clientId=&rootTag=&mode=PARSE|RUN[&ctx=]    -> parse/eval result (body: input text)
//! POST {base}/recompile?clientId=                              -> compile status (body: grammar source)
//! ```
//!
//! A 404 means the call is not offered and surfaces as `Ok(None)`. Any other
//! non-200 status is a hard failure carrying the status text.

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, error};

use super::{AdapterCapabilities, CompileStatus, EvalMode, EvalRequest, GrammarAdapter};
use crate::config::GrammarConfig;
use crate::endpoint::{prober::OPT_PATH, GrammarEndpoint, TransportKind, SUPPORTS_RECOMPILE};
use crate::error::{GrammarError, GrammarResult};
use crate::tree::RawResult;

const EVAL_PATH: &str = "/eval";
const RECOMPILE_PATH: &str = "/recompile";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Adapter for a live HTTP grammar service
#[derive(Debug, Clone)]
pub struct LiveAdapter {
    http: Client,
    base_url: String,
    client_id: String,
    supports_recompile: bool,
}

impl LiveAdapter {
    pub fn new(
        endpoint: &GrammarEndpoint,
        client_id: &str,
        config: &GrammarConfig,
    ) -> GrammarResult<Self> {
        let http = Client::builder().timeout(config.http_timeout).build()?;
        Ok(Self::with_client(endpoint, client_id, http))
    }

    pub fn with_client(endpoint: &GrammarEndpoint, client_id: &str, http: Client) -> Self {
        Self {
            http,
            base_url: endpoint.resolved_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            supports_recompile: endpoint.supports(SUPPORTS_RECOMPILE),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Shared status handling: 200 -> body, 404 -> not offered, else failure
    async fn read_json(
        &self,
        operation: &'static str,
        url: &str,
        response: Response,
    ) -> GrammarResult<Option<Value>> {
        let status = response.status();
        debug!(operation, url = %url, status = %status, "Live endpoint replied");

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status != StatusCode::OK {
            let status_text = status.canonical_reason().unwrap_or("").to_string();
            error!(operation, url = %url, status = %status, "Live endpoint call failed");
            return Err(GrammarError::Status {
                operation,
                url: url.to_string(),
                status: status.as_u16(),
                status_text,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| GrammarError::from_request(url, e))?;
        if text.trim().is_empty() {
            return Ok(Some(Value::Null));
        }
        Ok(Some(serde_json::from_str(&text)?))
    }
}

#[async_trait]
impl GrammarAdapter for LiveAdapter {
    fn transport(&self) -> TransportKind {
        TransportKind::Live
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            parse: true,
            eval: true,
            get_option: true,
            recompile: self.supports_recompile,
        }
    }

    async fn eval(&self, request: EvalRequest<'_>) -> GrammarResult<Option<RawResult>> {
        let url = self.url(EVAL_PATH);

        let mut query: Vec<(&str, String)> = vec![
            ("clientId", self.client_id.clone()),
            ("rootTag", request.root_tag.to_string()),
            ("mode", request.mode.as_str().to_string()),
        ];
        if let (EvalMode::Run, Some(ctx)) = (request.mode, request.context) {
            query.push(("ctx", serde_json::to_string(ctx)?));
        }

        let response = self
            .http
            .post(&url)
            .query(&query)
            .header(CONTENT_TYPE, TEXT_PLAIN)
            .body(request.input.to_string())
            .send()
            .await
            .map_err(|e| GrammarError::from_request(&url, e))?;

        let body = self.read_json("eval", &url, response).await?;
        Ok(body.map(RawResult::from_json))
    }

    async fn get_option(&self, key: &str) -> GrammarResult<Option<Value>> {
        let url = self.url(OPT_PATH);

        let response = self
            .http
            .get(&url)
            .query(&[("clientId", self.client_id.as_str()), ("key", key)])
            .send()
            .await
            .map_err(|e| GrammarError::from_request(&url, e))?;

        let body = self.read_json("getOption", &url, response).await?;
        Ok(body.map(|v| extract_option(v, key)))
    }

    async fn recompile(&self, source: &str) -> GrammarResult<Option<CompileStatus>> {
        if !self.supports_recompile {
            return Err(GrammarError::UnsupportedOperation {
                operation: "recompile",
            });
        }
        let url = self.url(RECOMPILE_PATH);

        let response = self
            .http
            .post(&url)
            .query(&[("clientId", self.client_id.as_str())])
            .header(CONTENT_TYPE, TEXT_PLAIN)
            .body(source.to_string())
            .send()
            .await
            .map_err(|e| GrammarError::from_request(&url, e))?;

        self.read_json("recompile", &url, response).await
    }
}

/// `/opt` answers either the bare value or an object keyed by option name
fn extract_option(body: Value, key: &str) -> Value {
    match body {
        Value::Object(mut obj) if obj.contains_key(key) => obj.remove(key).unwrap_or(Value::Null),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn endpoint(caps: &[&str]) -> GrammarEndpoint {
        GrammarEndpoint {
            url: "http://127.0.0.1:1/g".into(),
            transport: TransportKind::Live,
            capabilities: caps.iter().map(|c| c.to_string()).collect(),
            resolved_url: "http://127.0.0.1:1/g/".into(),
        }
    }

    #[test]
    fn test_extract_option() {
        assert_eq!(
            extract_option(json!({"rootTags": ["Program"]}), "rootTags"),
            json!(["Program"])
        );
        assert_eq!(extract_option(json!(["Program"]), "rootTags"), json!(["Program"]));
        assert_eq!(extract_option(json!({"other": 1}), "rootTags"), json!({"other": 1}));
    }

    #[test]
    fn test_capabilities_follow_endpoint() {
        let adapter = LiveAdapter::with_client(&endpoint(&[]), "c1", Client::new());
        assert!(!adapter.capabilities().recompile);
        assert!(adapter.capabilities().parse);
        assert_eq!(adapter.base_url(), "http://127.0.0.1:1/g");

        let adapter =
            LiveAdapter::with_client(&endpoint(&[SUPPORTS_RECOMPILE]), "c1", Client::new());
        assert!(adapter.capabilities().recompile);
    }

    #[tokio::test]
    async fn test_recompile_without_capability_is_unsupported() {
        let adapter = LiveAdapter::with_client(&endpoint(&[]), "c1", Client::new());
        let err = adapter.recompile("grammar").await.unwrap_err();
        assert!(matches!(
            err,
            GrammarError::UnsupportedOperation {
                operation: "recompile"
            }
        ));
    }
}
