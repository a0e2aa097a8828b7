//! Tree normalization
//!
//! Converts whatever a grammar backend returns (primitive, bare JSON,
//! JSON with its own mapping, or a prebuilt tree) into one canonical
//! hydrated tree.

pub mod mapping;
pub mod node;
pub mod normalize;

pub use mapping::FieldMapping;
pub use node::{find_node_at, traverse, HighlightMark, HydratedNode, NodeRef, Traverse};
pub use normalize::{normalize, LazyNode, PrebuiltTree, RawResult, RawShape, PRIMITIVE_NODE_NAME};
