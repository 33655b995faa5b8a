//! mlang_ast: Syntax tree model for the mlang formula language.
//!
//! Defines the closed [`NodeKind`] enumeration, the typed Ast node payloads,
//! the [`NodeIdMapCollection`] that owns and indexes every node by stable
//! id, and the [`XorNode`] references inspection uses on partial parses.

pub mod node;
pub mod node_id_map;
pub mod node_kind;
pub mod xor_node;

pub use node::{AstNode, NodeData, NodeId};
pub use node_id_map::{ContextNode, NodeIdMapCollection};
pub use node_kind::NodeKind;
pub use xor_node::XorNode;
