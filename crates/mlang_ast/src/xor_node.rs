//! Ast-or-context node references.
//!
//! Inspection operates on partial parses, where the node under a cursor may
//! still be an open (or error-retained) context node. An [`XorNode`] lets
//! callers handle both without caring which map the id resolved from.

use crate::node::{AstNode, NodeId};
use crate::node_id_map::ContextNode;
use crate::node_kind::NodeKind;

/// A reference to either a finished Ast node or an in-progress context node.
#[derive(Debug, Clone, Copy)]
pub enum XorNode<'a> {
    Ast(&'a AstNode),
    Context(&'a ContextNode),
}

impl XorNode<'_> {
    pub fn id(&self) -> NodeId {
        match self {
            XorNode::Ast(node) => node.id(),
            XorNode::Context(context) => context.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            XorNode::Ast(node) => node.kind(),
            XorNode::Context(context) => context.kind,
        }
    }

    pub fn is_ast(&self) -> bool {
        matches!(self, XorNode::Ast(_))
    }

    pub fn as_ast(&self) -> Option<&AstNode> {
        match self {
            XorNode::Ast(node) => Some(node),
            XorNode::Context(_) => None,
        }
    }
}
