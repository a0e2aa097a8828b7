//! Endpoint prober
//!
//! Works out what kind of grammar backend a URL exposes. Order matters and
//! the first match wins:
//! 1. live capability query (`GET {url}/opt?key=endpointType,supports`)
//! 2. `HEAD {url}/index.js`, falling back to `HEAD {url}/index.es.js`
//!
//! Probing has no side effects beyond network I/O and is safe to retry.

use reqwest::{header::CONTENT_TYPE, Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use super::{
    GrammarEndpoint, TransportKind, ENDPOINT_TYPE_LIVE, OPTION_ENDPOINT_TYPE, OPTION_SUPPORTS,
};
use crate::config::GrammarConfig;
use crate::error::{GrammarError, GrammarResult};

pub(crate) const OPT_PATH: &str = "/opt";
const STATIC_CANDIDATES: [&str; 2] = ["/index.js", "/index.es.js"];
const JS_MEDIA_TYPE_MARKER: &str = "javascript";

/// Body of the live capability query
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapabilityResponse {
    #[serde(default)]
    endpoint_type: Option<String>,
    #[serde(default)]
    supports: Vec<String>,
}

/// Classifies grammar URLs as live or static endpoints
#[derive(Debug, Clone)]
pub struct EndpointProber {
    http: Client,
}

impl EndpointProber {
    pub fn new(config: &GrammarConfig) -> GrammarResult<Self> {
        let http = Client::builder().timeout(config.http_timeout).build()?;
        Ok(Self { http })
    }

    /// Reuse an existing HTTP client
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    /// Probe `url` on behalf of `client_id`.
    ///
    /// Fails with `UnreachableEndpoint` when neither a live service nor a
    /// static module answers.
    pub async fn probe(&self, client_id: &str, url: &str) -> GrammarResult<GrammarEndpoint> {
        let base = normalize_base(url)?;

        if let Some(capabilities) = self.query_live(client_id, &base).await {
            info!(url = %base, ?capabilities, "Probed live grammar endpoint");
            return Ok(GrammarEndpoint {
                url: url.to_string(),
                transport: TransportKind::Live,
                capabilities,
                resolved_url: base,
            });
        }

        for candidate in STATIC_CANDIDATES {
            let file_url = format!("{}{}", base, candidate);
            match self.head(client_id, &file_url).await {
                Some(resp) if resp.status() == StatusCode::NOT_FOUND => continue,
                Some(resp) if resp.status() == StatusCode::OK && is_javascript(&resp) => {
                    info!(url = %file_url, "Probed static grammar module");
                    return Ok(GrammarEndpoint {
                        url: url.to_string(),
                        transport: TransportKind::Static,
                        capabilities: Vec::new(),
                        resolved_url: file_url,
                    });
                }
                Some(resp) => {
                    debug!(url = %file_url, status = %resp.status(), "Static probe rejected");
                    break;
                }
                // unreachable file counts as absent
                None => continue,
            }
        }

        info!(url = %url, "Invalid grammar endpoint");
        Err(GrammarError::UnreachableEndpoint {
            url: url.to_string(),
        })
    }

    /// Capabilities of a live endpoint, or `None` if `base` is not one
    async fn query_live(&self, client_id: &str, base: &str) -> Option<Vec<String>> {
        let opt_url = format!("{}{}", base, OPT_PATH);
        let key = format!("{},{}", OPTION_ENDPOINT_TYPE, OPTION_SUPPORTS);

        let response = match self
            .http
            .get(&opt_url)
            .query(&[("clientId", client_id), ("key", key.as_str())])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!(url = %opt_url, error = %e, "Capability query failed");
                return None;
            }
        };

        if response.status() != StatusCode::OK {
            debug!(url = %opt_url, status = %response.status(), "Capability query not answered");
            return None;
        }

        match response.json::<CapabilityResponse>().await {
            Ok(caps) if caps.endpoint_type.as_deref() == Some(ENDPOINT_TYPE_LIVE) => {
                Some(caps.supports)
            }
            Ok(caps) => {
                debug!(url = %opt_url, endpoint_type = ?caps.endpoint_type, "Not a live endpoint");
                None
            }
            Err(e) => {
                debug!(url = %opt_url, error = %e, "Capability response unreadable");
                None
            }
        }
    }

    async fn head(&self, client_id: &str, file_url: &str) -> Option<Response> {
        match self
            .http
            .head(file_url)
            .query(&[("clientId", client_id)])
            .send()
            .await
        {
            Ok(r) => Some(r),
            Err(e) => {
                debug!(url = %file_url, error = %e, "Static probe failed");
                None
            }
        }
    }
}

fn is_javascript(resp: &Response) -> bool {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().contains(JS_MEDIA_TYPE_MARKER))
        .unwrap_or(false)
}

/// Validate `url` and strip trailing slashes so suffixes append cleanly
pub(crate) fn normalize_base(url: &str) -> GrammarResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    Url::parse(trimmed).map_err(|source| GrammarError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_strips_trailing_slash() {
        assert_eq!(normalize_base("https://x/g/").unwrap(), "https://x/g");
        assert_eq!(normalize_base(" https://x/g ").unwrap(), "https://x/g");
    }

    #[test]
    fn test_normalize_base_rejects_garbage() {
        assert!(matches!(
            normalize_base("not a url"),
            Err(GrammarError::InvalidUrl { .. })
        ));
    }
}
