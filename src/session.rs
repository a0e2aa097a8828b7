//! Session envelope
//!
//! The JSON document a session is saved to and restored from. Only
//! `expression`, `contextStr`, `grammarTag` and the active grammar feed the
//! inspector; `layout` belongs to the view and is carried opaquely.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GrammarResult;
use crate::grammar::EditorGrammar;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionEnvelope {
    pub expression: String,
    pub context_str: String,
    pub grammar_tag: Option<String>,
    pub grammars: Vec<EditorGrammar>,
    pub grammar_idx: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<Value>,
}

impl SessionEnvelope {
    /// Pretty-printed JSON
    pub fn export(&self) -> GrammarResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Restore a session; the saved layout is dropped unless `include_layout`
    pub fn import(text: &str, include_layout: bool) -> GrammarResult<Self> {
        let mut session: SessionEnvelope = serde_json::from_str(text)?;
        if !include_layout {
            session.layout = None;
        }
        Ok(session)
    }

    /// Grammar at `grammar_idx`, if the index is in range
    pub fn active_grammar(&self) -> Option<&EditorGrammar> {
        self.grammars.get(self.grammar_idx)
    }

    pub fn active_grammar_mut(&mut self) -> Option<&mut EditorGrammar> {
        self.grammars.get_mut(self.grammar_idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> SessionEnvelope {
        SessionEnvelope {
            expression: "1+1".into(),
            context_str: "{\"x\": 1}".into(),
            grammar_tag: Some("Program".into()),
            grammars: vec![
                EditorGrammar::new("calc", "https://x/calc").predefined(),
                EditorGrammar::new("json", "https://x/json"),
            ],
            grammar_idx: 1,
            layout: Some(json!({"panels": [1, 2]})),
        }
    }

    #[test]
    fn test_export_uses_camel_case() {
        let text = sample().export().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["contextStr"], json!("{\"x\": 1}"));
        assert_eq!(value["grammarTag"], json!("Program"));
        assert_eq!(value["grammarIdx"], json!(1));
        assert_eq!(value["grammars"][0]["predefined"], json!(true));
    }

    #[test]
    fn test_import_drops_layout_on_request() {
        let text = sample().export().unwrap();
        let with = SessionEnvelope::import(&text, true).unwrap();
        assert_eq!(with.layout, Some(json!({"panels": [1, 2]})));
        let without = SessionEnvelope::import(&text, false).unwrap();
        assert_eq!(without.layout, None);
        assert_eq!(without.active_grammar().map(|g| g.name.as_str()), Some("json"));
    }

    #[test]
    fn test_import_tolerates_missing_fields() {
        let session = SessionEnvelope::import(r#"{"expression": "a"}"#, true).unwrap();
        assert_eq!(session.expression, "a");
        assert!(session.grammars.is_empty());
        assert!(session.active_grammar().is_none());
    }

    #[test]
    fn test_import_rejects_malformed_text() {
        assert!(SessionEnvelope::import("not json", true).is_err());
    }
}
