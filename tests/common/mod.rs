//! Shared fixtures for integration tests
//!
//! `spawn_grammar_server` starts an in-process axum server on an ephemeral
//! port that plays every kind of grammar backend, keyed by the first path
//! segment:
//!
//! - `/live/*`     live service; RUN-mode eval answers 404
//! - `/calc/*`     live service that evaluates (sum of digits + ctx.x)
//! - `/broken/*`   live service whose eval fails with 500
//! - `/slow/*`     live service whose eval takes 2s
//! - `/static/*`   static module at `index.js`
//! - `/es/*`       static module at `index.es.js` only
//! - `/html/*`     `index.js` served with an HTML content type
//!
//! Every request is recorded as `METHOD /path` so tests can assert which
//! probes ran.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use grammar_inspector::{GrammarError, GrammarModule, GrammarResult, ModuleExports, RawResult};

const LIVE_NAMES: [&str; 4] = ["live", "calc", "broken", "slow"];

#[derive(Clone, Default)]
pub struct Hits(Arc<Mutex<Vec<String>>>);

impl Hits {
    fn record(&self, method: &Method, path: &str) {
        self.0.lock().unwrap().push(format!("{} {}", method, path));
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn any(&self, needle: &str) -> bool {
        self.all().iter().any(|h| h.contains(needle))
    }
}

pub struct GrammarServer {
    pub base: String,
    pub hits: Hits,
}

impl GrammarServer {
    pub fn url(&self, name: &str) -> String {
        format!("{}/{}", self.base, name)
    }
}

pub async fn spawn_grammar_server() -> GrammarServer {
    let hits = Hits::default();
    let app = Router::new()
        .route("/:name/opt", get(opt))
        .route("/:name/eval", post(eval))
        .route("/:name/recompile", post(recompile))
        .route("/:name/:file", get(module_file))
        .with_state(hits.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    GrammarServer {
        base: format!("http://{}", addr),
        hits,
    }
}

async fn opt(
    State(hits): State<Hits>,
    Path(name): Path<String>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    hits.record(&Method::GET, &format!("/{}/opt", name));
    if !LIVE_NAMES.contains(&name.as_str()) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let key = q.get("key").cloned().unwrap_or_default();
    if key.contains("endpointType") {
        let supports = if name == "calc" {
            json!(["supports-recompile", "supports-root-tags"])
        } else {
            json!([])
        };
        return Json(json!({"endpointType": "LIVE", "supports": supports})).into_response();
    }
    match key.as_str() {
        "rootTags" => Json(json!({"rootTags": ["Program", "Expression"]})).into_response(),
        "editorUrl" => Json(json!("https://editor.local/calc")).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn eval(
    State(hits): State<Hits>,
    Path(name): Path<String>,
    Query(q): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    hits.record(&Method::POST, &format!("/{}/eval", name));
    let input = String::from_utf8_lossy(&body).to_string();
    let mode = q.get("mode").map(String::as_str).unwrap_or("");

    match (name.as_str(), mode) {
        ("broken", _) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        (_, "PARSE") => Json(tree_json(&input)).into_response(),
        ("live", "RUN") => StatusCode::NOT_FOUND.into_response(),
        ("slow", "RUN") => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(json!(0)).into_response()
        }
        ("calc", "RUN") => {
            let ctx: Value = q
                .get("ctx")
                .and_then(|c| serde_json::from_str(c).ok())
                .unwrap_or(json!({}));
            Json(json!(digit_sum(&input) + ctx["x"].as_i64().unwrap_or(0))).into_response()
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn recompile(
    State(hits): State<Hits>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    hits.record(&Method::POST, &format!("/{}/recompile", name));
    if name != "calc" {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({"compiled": true, "bytes": body.len()})).into_response()
}

async fn module_file(
    State(hits): State<Hits>,
    method: Method,
    Path((name, file)): Path<(String, String)>,
) -> Response {
    hits.record(&method, &format!("/{}/{}", name, file));
    match (name.as_str(), file.as_str()) {
        ("static", "index.js") | ("es", "index.es.js") => (
            [(header::CONTENT_TYPE, "application/javascript")],
            "export default class Grammar {}",
        )
            .into_response(),
        ("html", "index.js") => (
            [(header::CONTENT_TYPE, "text/html")],
            "<html></html>",
        )
            .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Tiny arithmetic "grammar": digits are numbers, `+` is an operator, any
/// other character is an error node
pub fn tree_json(input: &str) -> Value {
    let children: Vec<Value> = input
        .chars()
        .enumerate()
        .filter(|(_, c)| !c.is_whitespace())
        .map(|(i, c)| match c {
            '0'..='9' => json!({
                "name": "Num", "start": i, "end": i + 1,
                "tokenType": "number", "value": c.to_digit(10)
            }),
            '+' => json!({"name": "Op", "start": i, "end": i + 1, "tokenType": "operator"}),
            other => json!({
                "name": "Error", "start": i, "end": i + 1,
                "error": format!("unexpected '{}'", other)
            }),
        })
        .collect();
    json!({
        "name": "Program",
        "start": 0,
        "end": input.chars().count(),
        "children": children
    })
}

pub fn digit_sum(input: &str) -> i64 {
    input
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(i64::from)
        .sum()
}

// ---------------------------------------------------------------------------
// In-process modules
// ---------------------------------------------------------------------------

/// Static module with the same arithmetic grammar. Parse and eval sleep for
/// `delay_for(input)` so tests can make earlier inputs finish later. Input
/// containing `!` crashes the parser, input containing `?` comes back as
/// `{json, mapping: null}` and a context with `"fail": true` fails
/// evaluation.
pub struct CalcModule {
    pub delay_for: fn(&str) -> Duration,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub root_tags: bool,
}

impl CalcModule {
    pub fn new() -> Self {
        Self::with_delay(|_| Duration::ZERO)
    }

    pub fn with_delay(delay_for: fn(&str) -> Duration) -> Self {
        Self {
            delay_for,
            calls: Arc::default(),
            root_tags: true,
        }
    }

    /// Same grammar, but no `rootTags` option
    pub fn without_root_tags() -> Self {
        Self {
            root_tags: false,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GrammarModule for CalcModule {
    fn exports(&self) -> ModuleExports {
        ModuleExports::all()
    }

    async fn parse(
        &self,
        _client_id: &str,
        root_tag: &str,
        input: &str,
    ) -> GrammarResult<Option<RawResult>> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("parse:{}:{}", root_tag, input));
        tokio::time::sleep((self.delay_for)(input)).await;
        if input.contains('!') {
            return Err(GrammarError::Module("parser crashed".into()));
        }
        if input.contains('?') {
            return Ok(Some(RawResult::from_json(
                json!({"json": tree_json(input), "mapping": null}),
            )));
        }
        Ok(Some(RawResult::PlainJson(tree_json(input))))
    }

    async fn eval(
        &self,
        _client_id: &str,
        _root_tag: &str,
        input: &str,
        context: &Value,
    ) -> GrammarResult<Option<RawResult>> {
        self.calls.lock().unwrap().push(format!("eval:{}", input));
        tokio::time::sleep((self.delay_for)(input)).await;
        if context["fail"] == json!(true) {
            return Err(GrammarError::Module("division by zero".into()));
        }
        let total = digit_sum(input) + context["x"].as_i64().unwrap_or(0);
        Ok(Some(RawResult::Primitive(json!(total))))
    }

    async fn get_option(&self, _client_id: &str, key: &str) -> GrammarResult<Option<Value>> {
        self.calls.lock().unwrap().push(format!("option:{}", key));
        Ok((self.root_tags && key == "rootTags").then(|| json!(["Program", "Expression"])))
    }
}
