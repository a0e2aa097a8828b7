//! Runtime configuration
//!
//! Reads config from env vars:
//!   GRAMMAR_HTTP_TIMEOUT_MS  timeout for every endpoint request (default: 5000)
//!   GRAMMAR_RELAY_PREFIX     relay URL prepended to matching hosts
//!   GRAMMAR_RELAY_HOSTS      comma separated hosts that need the relay (default: github.com)
//!   GRAMMAR_RELAY_DISABLED   set to `1`/`true` to turn the rewrite off
//!   INSPECTOR_DEBOUNCE_MS    debounce window for derived recomputation (default: 300)

use std::time::Duration;

const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5000;
const DEFAULT_DEBOUNCE_MS: u64 = 300;
const DEFAULT_RELAY_PREFIX: &str = "https://cors-anywhere.herokuapp.com/";
const DEFAULT_RELAY_HOST: &str = "github.com";

/// URL rewrite applied before probing.
///
/// Grammar URLs pointing at one of `hosts` are served through `prefix`
/// (a cross-origin relay).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRule {
    pub prefix: String,
    pub hosts: Vec<String>,
}

impl RelayRule {
    pub fn new(prefix: impl Into<String>, hosts: Vec<String>) -> Self {
        Self {
            prefix: prefix.into(),
            hosts,
        }
    }

    /// Rewrite `url` when it mentions one of the relay hosts
    pub fn apply(&self, url: &str) -> String {
        if url.starts_with(&self.prefix) {
            return url.to_string();
        }
        if self.hosts.iter().any(|h| !h.is_empty() && url.contains(h)) {
            format!("{}{}", self.prefix, url)
        } else {
            url.to_string()
        }
    }
}

impl Default for RelayRule {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_PREFIX, vec![DEFAULT_RELAY_HOST.to_string()])
    }
}

/// Loader and transport configuration
#[derive(Debug, Clone)]
pub struct GrammarConfig {
    /// Timeout applied to every probe and live-endpoint call
    pub http_timeout: Duration,
    /// Optional relay rewrite; `None` leaves URLs untouched
    pub relay: Option<RelayRule>,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS),
            relay: Some(RelayRule::default()),
        }
    }
}

impl GrammarConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = env_u64("GRAMMAR_HTTP_TIMEOUT_MS") {
            config.http_timeout = Duration::from_millis(ms);
        }

        let disabled = std::env::var("GRAMMAR_RELAY_DISABLED")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        if disabled {
            config.relay = None;
        } else {
            let mut rule = RelayRule::default();
            if let Ok(prefix) = std::env::var("GRAMMAR_RELAY_PREFIX") {
                rule.prefix = prefix;
            }
            if let Ok(hosts) = std::env::var("GRAMMAR_RELAY_HOSTS") {
                rule.hosts = hosts
                    .split(',')
                    .map(|h| h.trim().to_string())
                    .filter(|h| !h.is_empty())
                    .collect();
            }
            config.relay = Some(rule);
        }

        config
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn without_relay(mut self) -> Self {
        self.relay = None;
        self
    }

    /// Apply the relay rewrite (if any) to a grammar URL
    pub fn rewrite_url(&self, url: &str) -> String {
        match &self.relay {
            Some(rule) => rule.apply(url),
            None => url.to_string(),
        }
    }
}

/// Inspector engine configuration
#[derive(Debug, Clone)]
pub struct InspectorConfig {
    /// Quiet period before a derived value is recomputed
    pub debounce: Duration,
    /// Capacity of the notification broadcast channel
    pub notification_capacity: usize,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            notification_capacity: 16,
        }
    }
}

impl InspectorConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = env_u64("INSPECTOR_DEBOUNCE_MS") {
            config.debounce = Duration::from_millis(ms);
        }
        config
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
