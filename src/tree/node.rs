//! Canonical hydrated AST node
//!
//! Nodes are shared through `Arc` so the inspector can hand out token lists
//! and selections without cloning subtrees. Equality is structural.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Shared handle to a hydrated node
pub type NodeRef = Arc<HydratedNode>;

/// Fully materialized AST node with concrete span and children.
///
/// `start <= end` always holds; `start == end` marks a zero-width
/// (virtual or missing) token. Children are in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydratedNode {
    pub name: String,
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub children: Vec<NodeRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub skip: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl HydratedNode {
    pub fn new(name: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            name: name.into(),
            start,
            end: end.max(start),
            children: Vec::new(),
            token_type: None,
            skip: false,
            error: None,
            value: None,
        }
    }

    pub fn with_children(mut self, children: Vec<HydratedNode>) -> Self {
        self.children = children.into_iter().map(Arc::new).collect();
        self
    }

    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn into_ref(self) -> NodeRef {
        Arc::new(self)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_zero_width(&self) -> bool {
        self.start == self.end
    }

    /// Whether `[start, end)` contains `offset`
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Nodes the editor highlights: classified tokens and error nodes
    pub fn is_highlighted(&self) -> bool {
        self.token_type.is_some() || self.error.is_some()
    }

    /// Number of nodes in this subtree
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(|c| c.size()).sum::<usize>()
    }
}

/// Pre-order, document-order traversal over a tree.
pub fn traverse(root: &NodeRef) -> Traverse {
    Traverse {
        stack: vec![(Arc::clone(root), 0)],
    }
}

/// Iterator returned by [`traverse`]; yields each node with its depth
pub struct Traverse {
    stack: Vec<(NodeRef, usize)>,
}

impl Iterator for Traverse {
    type Item = (NodeRef, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let (node, depth) = self.stack.pop()?;
        for child in node.children.iter().rev() {
            self.stack.push((Arc::clone(child), depth + 1));
        }
        Some((node, depth))
    }
}

/// Node under a text offset.
///
/// Offsets at or before the root's start, or at or beyond its end, resolve
/// to `None`. Otherwise descends into the child containing the offset until
/// no child does; a leaf reached on the way is returned directly. Siblings are
/// assumed non-overlapping, so each level is a binary search over children
/// and the whole lookup is bounded by tree depth.
pub fn find_node_at(root: &NodeRef, offset: usize) -> Option<NodeRef> {
    if offset >= root.end || offset <= root.start {
        return None;
    }

    let mut node = Arc::clone(root);
    loop {
        match containing_child(&node, offset) {
            Some(child) if child.is_leaf() => return Some(child),
            Some(child) => node = child,
            None => return Some(node),
        }
    }
}

fn containing_child(node: &HydratedNode, offset: usize) -> Option<NodeRef> {
    let upper = node.children.partition_point(|c| c.start <= offset);
    // zero-width siblings sitting at the same start never contain anything
    node.children[..upper]
        .iter()
        .rev()
        .find(|c| !c.is_zero_width())
        .filter(|c| c.contains(offset))
        .cloned()
}

/// Highlight range for one node in the code editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightMark {
    pub start: usize,
    pub end: usize,
    pub class: String,
}

impl HighlightMark {
    /// Build the mark for `node` using CSS class `mark-{class}`.
    ///
    /// Zero-width nodes widen to one character: the preceding one
    /// (`-after`) or, at position 0, the following one (`-before`).
    pub fn for_node(node: &HydratedNode, class: &str) -> Self {
        let mut start = node.start;
        let mut end = node.end;
        let mut suffix = "";

        if start == end {
            if start > 0 {
                start -= 1;
                suffix = "-after";
            } else {
                end += 1;
                suffix = "-before";
            }
        }

        Self {
            start,
            end,
            class: format!("mark-{}{}", class, suffix),
        }
    }

    /// Syntax mark for a highlighted token or error node
    pub fn syntax(node: &HydratedNode) -> Self {
        let class = match (&node.token_type, &node.error) {
            (Some(token_type), _) => token_type.as_str(),
            (None, _) => "error",
        };
        Self::for_node(node, class)
    }

    /// Mark for the current selection
    pub fn selection(node: &HydratedNode) -> Self {
        Self::for_node(node, "selection")
    }
}
