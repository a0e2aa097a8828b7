//! Pure recompute functions for the synchronous derived values

use serde_json::Value;

use crate::tree::{traverse, HighlightMark, NodeRef};

pub(crate) const EXPECTED_OBJECT: &str = "expected Object literal";

/// Parse the context text. Blank text is an empty context; anything but a
/// JSON object is rejected.
pub fn parse_context(text: &str) -> Result<Value, String> {
    if text.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(EXPECTED_OBJECT.to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Annotations collected in one pre-order walk of a fresh tree
#[derive(Debug, Default)]
pub struct TreeWalk {
    pub tokens: Vec<NodeRef>,
    pub marks: Vec<HighlightMark>,
    /// First error in document order
    pub first_error: Option<String>,
}

pub fn walk_tree(root: &NodeRef) -> TreeWalk {
    let mut walk = TreeWalk::default();
    for (node, _depth) in traverse(root) {
        if walk.first_error.is_none() {
            walk.first_error = node.error.clone();
        }
        if node.is_highlighted() {
            walk.marks.push(HighlightMark::syntax(&node));
            walk.tokens.push(node);
        }
    }
    walk
}
