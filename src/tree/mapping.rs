//! JSON-to-tree field mapping
//!
//! A mapping names, for each canonical node field, the key under which a
//! backend stores it. Keys may be dotted paths (`type.name`) reaching into
//! nested objects. Mapping is applied to the top object and then recursively
//! to every element of the array found under the mapped `children` key.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::node::{HydratedNode, NodeRef};
use crate::error::{GrammarError, GrammarResult};

/// Error message used for nodes whose error flag is a bare `true`
const FLAGGED_ERROR: &str = "error";

/// Name-to-key table for the normalizer; absent entries fall back to the
/// canonical field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldMapping {
    pub name: String,
    pub start: String,
    pub end: String,
    pub children: String,
    pub skip: String,
    pub error: String,
    pub value: String,
    pub token_type: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            name: "name".into(),
            start: "start".into(),
            end: "end".into(),
            children: "children".into(),
            skip: "skip".into(),
            error: "error".into(),
            value: "value".into(),
            token_type: "tokenType".into(),
        }
    }
}

impl FieldMapping {
    /// Mapping whose keys equal the canonical field names
    pub fn identity() -> Self {
        Self::default()
    }

    /// Reshape `json` (and, recursively, its children) into a hydrated tree
    pub fn map_tree(&self, json: &Value) -> GrammarResult<NodeRef> {
        let obj = match json {
            Value::Object(_) => json,
            other => return Err(GrammarError::UnknownShape(shape_hint(other))),
        };

        let start = lookup(obj, &self.start).and_then(as_offset).unwrap_or(0);
        let end = lookup(obj, &self.end)
            .and_then(as_offset)
            .unwrap_or(start)
            .max(start);

        let children = match lookup(obj, &self.children) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|child| self.map_tree(child))
                .collect::<GrammarResult<Vec<_>>>()?,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => return Err(GrammarError::UnknownShape(shape_hint(other))),
        };

        Ok(Arc::new(HydratedNode {
            name: lookup(obj, &self.name).map(as_text).unwrap_or_default(),
            start,
            end,
            children,
            token_type: lookup(obj, &self.token_type)
                .filter(|v| !v.is_null())
                .map(as_text),
            skip: lookup(obj, &self.skip).map(is_truthy).unwrap_or(false),
            error: lookup(obj, &self.error).and_then(as_error),
            value: lookup(obj, &self.value).filter(|v| !v.is_null()).cloned(),
        }))
    }
}

/// Resolve a dotted key path inside a JSON object
pub(crate) fn lookup<'a>(obj: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    // exact keys win over path splitting so "a.b" as a literal key still works
    if let Some(v) = obj.get(path) {
        return Some(v);
    }
    path.split('.').try_fold(obj, |cur, key| cur.get(key))
}

fn as_offset(v: &Value) -> Option<usize> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .map(|u| u as usize)
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as usize)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_error(v: &Value) -> Option<String> {
    match v {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some(FLAGGED_ERROR.to_string()),
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// JavaScript-style truthiness
pub(crate) fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub(crate) fn shape_hint(v: &Value) -> String {
    let text = v.to_string();
    if text.len() > 80 {
        let cut = (0..=80).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
        format!("{}...", &text[..cut])
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_default_mapping_on_canonical_json() {
        let json = json!({
            "name": "Add", "start": 0, "end": 3,
            "children": [
                {"name": "Num", "start": 0, "end": 1, "value": 1, "tokenType": "number"},
                {"name": "Num", "start": 2, "end": 3, "value": 1}
            ]
        });
        let tree = FieldMapping::default().map_tree(&json).unwrap();
        assert_eq!(tree.name, "Add");
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[0].token_type.as_deref(), Some("number"));
        assert_eq!(tree.children[1].value, Some(json!(1)));
    }

    #[test]
    fn test_identity_mapping_round_trips_canonical_tree() {
        let original = HydratedNode::new("Program", 0, 5)
            .with_children(vec![
                HydratedNode::new("Stmt", 0, 4)
                    .with_children(vec![HydratedNode::new("Missing", 4, 4).with_error("expected ;")]),
                HydratedNode::new("Num", 4, 5)
                    .with_token_type("number")
                    .with_value(json!(7)),
            ])
            .into_ref();
        let json = serde_json::to_value(&original).unwrap();
        let mapped = FieldMapping::identity().map_tree(&json).unwrap();
        assert_eq!(mapped, original);
    }

    #[test]
    fn test_dotted_paths_and_custom_keys() {
        let mapping: FieldMapping = serde_json::from_value(json!({
            "name": "type.name",
            "start": "from",
            "end": "to",
            "children": "kids"
        }))
        .unwrap();
        let json = json!({
            "type": {"name": "Add"}, "from": 0, "to": 3,
            "kids": [{"type": {"name": "Num"}, "from": 0, "to": 1, "kids": []}]
        });
        let tree = mapping.map_tree(&json).unwrap();
        assert_eq!(tree.name, "Add");
        assert_eq!((tree.start, tree.end), (0, 3));
        assert_eq!(tree.children[0].name, "Num");
        // unspecified keys keep their defaults
        assert_eq!(mapping.skip, "skip");
    }

    #[test]
    fn test_error_flag_variants() {
        let mapping = FieldMapping::default();
        let flagged = mapping
            .map_tree(&json!({"name": "E", "start": 1, "end": 1, "error": true}))
            .unwrap();
        assert_eq!(flagged.error.as_deref(), Some("error"));
        let clean = mapping
            .map_tree(&json!({"name": "E", "start": 1, "end": 2, "error": null}))
            .unwrap();
        assert!(clean.error.is_none());
    }

    #[test]
    fn test_end_never_precedes_start() {
        let tree = FieldMapping::default()
            .map_tree(&json!({"name": "X", "start": 5, "end": 2}))
            .unwrap();
        assert_eq!((tree.start, tree.end), (5, 5));
    }

    #[test]
    fn test_non_object_child_is_rejected() {
        let err = FieldMapping::default()
            .map_tree(&json!({"name": "X", "children": [1]}))
            .unwrap_err();
        assert!(matches!(err, GrammarError::UnknownShape(_)));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!({})));
        assert!(is_truthy(&json!("0")));
    }
}
