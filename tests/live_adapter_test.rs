//! Live grammar service calls through a loaded plugin

mod common;

use serde_json::json;
use std::time::Duration;

use common::spawn_grammar_server;
use grammar_inspector::{GrammarConfig, GrammarError, GrammarLoader, TransportKind};

fn loader() -> GrammarLoader {
    GrammarLoader::new(GrammarConfig::default().without_relay()).unwrap()
}

#[tokio::test]
async fn test_parse_over_http() {
    let server = spawn_grammar_server().await;
    let plugin = loader().load("c1", &server.url("live"), None).await.unwrap();
    assert_eq!(plugin.transport(), TransportKind::Live);

    let tree = plugin.parse("Program", "1+x").await.unwrap();
    assert_eq!((tree.name.as_str(), tree.start, tree.end), ("Program", 0, 3));
    let names: Vec<_> = tree.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Num", "Op", "Error"]);
    assert_eq!(tree.children[0].token_type.as_deref(), Some("number"));
    assert_eq!(tree.children[2].error.as_deref(), Some("unexpected 'x'"));
}

#[tokio::test]
async fn test_eval_not_found_resolves_to_none() {
    let server = spawn_grammar_server().await;
    let plugin = loader().load("c1", &server.url("live"), None).await.unwrap();

    let output = plugin.eval("Program", "1+1", &json!({})).await.unwrap();
    assert_eq!(output, None);
    assert!(server.hits.any("POST /live/eval"));
}

#[tokio::test]
async fn test_eval_sends_context() {
    let server = spawn_grammar_server().await;
    let plugin = loader().load("c1", &server.url("calc"), None).await.unwrap();

    let output = plugin.eval("Program", "1+2", &json!({"x": 10})).await.unwrap();
    assert_eq!(output, Some(json!(13)));
}

#[tokio::test]
async fn test_server_error_carries_status() {
    let server = spawn_grammar_server().await;
    let plugin = loader().load("c1", &server.url("broken"), None).await.unwrap();

    match plugin.parse("Program", "1").await.unwrap_err() {
        GrammarError::Status {
            status,
            status_text,
            ..
        } => {
            assert_eq!(status, 500);
            assert_eq!(status_text, "Internal Server Error");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_options_and_root_tags() {
    let server = spawn_grammar_server().await;
    let plugin = loader().load("c1", &server.url("calc"), None).await.unwrap();

    assert_eq!(plugin.root_tags().await.unwrap(), vec!["Program", "Expression"]);
    assert_eq!(
        plugin.get_option("editorUrl").await.unwrap(),
        Some(json!("https://editor.local/calc"))
    );
    assert_eq!(plugin.get_option("unknown").await.unwrap(), None);
}

#[tokio::test]
async fn test_recompile_follows_advertised_capability() {
    let server = spawn_grammar_server().await;

    let calc = loader().load("c1", &server.url("calc"), None).await.unwrap();
    let status = calc.recompile("Program = Num+").await.unwrap();
    assert_eq!(status, Some(json!({"compiled": true, "bytes": 14})));

    let live = loader().load("c1", &server.url("live"), None).await.unwrap();
    assert!(matches!(
        live.recompile("Program = Num+").await,
        Err(GrammarError::UnsupportedOperation { .. })
    ));
    assert!(!server.hits.any("POST /live/recompile"));
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let server = spawn_grammar_server().await;
    let config = GrammarConfig::default()
        .without_relay()
        .with_timeout(Duration::from_millis(200));
    let plugin = GrammarLoader::new(config)
        .unwrap()
        .load("c1", &server.url("slow"), None)
        .await
        .unwrap();

    let err = plugin.eval("Program", "1", &json!({})).await.unwrap_err();
    assert!(matches!(err, GrammarError::Timeout { .. }), "{:?}", err);
}
