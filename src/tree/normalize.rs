//! Raw adapter results and their normalization into hydrated trees
//!
//! Adapters declare the shape of what they return by constructing a
//! [`RawResult`] variant; the JSON transport classifies response bodies with
//! [`RawResult::from_json`] in the fixed priority primitive, then
//! `{json, mapping}`, then plain JSON. `null` is plain JSON and falsy, so it
//! is rejected as an empty result before normalization.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::mapping::{is_truthy, FieldMapping};
use super::node::{HydratedNode, NodeRef};
use crate::error::{GrammarError, GrammarResult};

/// Name given to the single node built from a primitive result
pub const PRIMITIVE_NODE_NAME: &str = "value";

/// Shape tag of a raw result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawShape {
    Primitive,
    Json,
    JsonWithMapping,
    Iterator,
}

/// Lazily materialized tree handed out by in-process grammar modules.
///
/// Implementors expose one node at a time; [`PrebuiltTree::hydrate`] walks
/// the whole structure and materializes it.
pub trait LazyNode: Send + Sync {
    fn name(&self) -> String;
    fn start(&self) -> usize;
    fn end(&self) -> usize;
    fn children(&self) -> Vec<Box<dyn LazyNode>>;

    fn token_type(&self) -> Option<String> {
        None
    }

    fn skip(&self) -> bool {
        false
    }

    fn error(&self) -> Option<String> {
        None
    }

    fn value(&self) -> Option<Value> {
        None
    }
}

/// A tree that already follows the canonical node contract
pub enum PrebuiltTree {
    Hydrated(NodeRef),
    Dehydrated(Box<dyn LazyNode>),
}

impl PrebuiltTree {
    pub fn is_hydrated(&self) -> bool {
        matches!(self, PrebuiltTree::Hydrated(_))
    }

    /// Force full hydration
    pub fn hydrate(self) -> NodeRef {
        match self {
            PrebuiltTree::Hydrated(node) => node,
            PrebuiltTree::Dehydrated(lazy) => hydrate_lazy(lazy.as_ref()),
        }
    }
}

fn hydrate_lazy(lazy: &dyn LazyNode) -> NodeRef {
    let start = lazy.start();
    Arc::new(HydratedNode {
        name: lazy.name(),
        start,
        end: lazy.end().max(start),
        children: lazy
            .children()
            .iter()
            .map(|c| hydrate_lazy(c.as_ref()))
            .collect(),
        token_type: lazy.token_type(),
        skip: lazy.skip(),
        error: lazy.error(),
        value: lazy.value(),
    })
}

impl fmt::Debug for PrebuiltTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrebuiltTree::Hydrated(node) => f.debug_tuple("Hydrated").field(&node.name).finish(),
            PrebuiltTree::Dehydrated(lazy) => f.debug_tuple("Dehydrated").field(&lazy.name()).finish(),
        }
    }
}

/// Result of a parse/eval call before normalization
#[derive(Debug)]
pub enum RawResult {
    /// String, number or boolean
    Primitive(Value),
    /// Object to be reshaped with the plugin-wide mapping
    PlainJson(Value),
    /// Object carrying its own mapping; `mapping` is kept raw so a `null`
    /// mapping can be reported as `MissingMapping`
    JsonWithMapping { json: Value, mapping: Value },
    /// Already a canonical tree
    PreBuiltTree(PrebuiltTree),
}

impl RawResult {
    /// Classify a JSON body
    pub fn from_json(value: Value) -> Self {
        match value {
            v @ (Value::Bool(_) | Value::Number(_) | Value::String(_)) => RawResult::Primitive(v),
            Value::Object(mut obj) if obj.contains_key("json") && obj.contains_key("mapping") => {
                let json = obj.remove("json").unwrap_or(Value::Null);
                let mapping = obj.remove("mapping").unwrap_or(Value::Null);
                RawResult::JsonWithMapping { json, mapping }
            }
            other => RawResult::PlainJson(other),
        }
    }

    pub fn shape(&self) -> RawShape {
        match self {
            RawResult::Primitive(_) => RawShape::Primitive,
            RawResult::PlainJson(_) => RawShape::Json,
            RawResult::JsonWithMapping { .. } => RawShape::JsonWithMapping,
            RawResult::PreBuiltTree(_) => RawShape::Iterator,
        }
    }

    /// Falsy results count as empty: `null`, `false`, `0` and `""`
    pub fn is_falsy(&self) -> bool {
        match self {
            RawResult::Primitive(v) | RawResult::PlainJson(v) => !is_truthy(v),
            _ => false,
        }
    }

    /// Plain value view, used for evaluation output
    pub fn into_value(self) -> GrammarResult<Value> {
        match self {
            RawResult::Primitive(v) | RawResult::PlainJson(v) => Ok(v),
            RawResult::JsonWithMapping { json, .. } => Ok(json),
            RawResult::PreBuiltTree(tree) => Ok(serde_json::to_value(&*tree.hydrate())?),
        }
    }
}

/// Convert any raw result into a hydrated tree
pub fn normalize(raw: RawResult, mapping: &FieldMapping) -> GrammarResult<NodeRef> {
    match raw {
        RawResult::Primitive(value) => {
            let text = match &value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let node = HydratedNode::new(PRIMITIVE_NODE_NAME, 0, text.chars().count())
                .with_value(value);
            Ok(Arc::new(node))
        }
        RawResult::PlainJson(json) => mapping.map_tree(&json),
        RawResult::JsonWithMapping { json, mapping } => {
            if mapping.is_null() {
                return Err(GrammarError::MissingMapping);
            }
            let mapping: FieldMapping = serde_json::from_value(mapping)?;
            mapping.map_tree(&json)
        }
        RawResult::PreBuiltTree(tree) => Ok(tree.hydrate()),
    }
}
