//! The node-id map: the single owner of all syntax node storage.
//!
//! Finished Ast nodes and in-progress context nodes live in id-keyed maps;
//! parent/child structure is held in parallel id indexes. Ids are the only
//! cross-references between nodes, which keeps the Ast/context split free of
//! cyclic ownership.

use crate::node::{AstNode, NodeId};
use crate::node_kind::NodeKind;
use crate::xor_node::XorNode;
use mlang_core::text::TokenIndex;
use mlang_diagnostics::CommonError;
use rustc_hash::FxHashMap;

/// A syntax node while it is being built. Mirrors the Ast node it will be
/// promoted to; shares the same id.
#[derive(Debug, Clone)]
pub struct ContextNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub parent_id: Option<NodeId>,
    /// Ordinal slot within the parent. `None` only for the root.
    pub attribute_index: Option<u32>,
    /// The next child slot to fill.
    pub attribute_counter: u32,
    /// Tentative first token. Widened when an already-parsed head is
    /// re-parented under this context.
    pub token_index_start: TokenIndex,
}

/// Bidirectional parent/child index over Ast nodes and in-progress context
/// nodes, keyed by stable numeric id.
///
/// Invariants (for every successful parse):
/// - every non-root id has exactly one `parent_id` entry and appears exactly
///   once in its parent's child list, at its attribute index;
/// - child ordering reflects source order;
/// - an id is never in both the Ast and the context map;
/// - `leaf_node_ids` holds exactly the leaf Ast nodes, in end order.
#[derive(Debug, Clone, Default)]
pub struct NodeIdMapCollection {
    ast_node_by_id: FxHashMap<NodeId, AstNode>,
    context_node_by_id: FxHashMap<NodeId, ContextNode>,
    child_ids_by_id: FxHashMap<NodeId, Vec<NodeId>>,
    parent_id_by_id: FxHashMap<NodeId, NodeId>,
    maybe_right_most_leaf: Option<NodeId>,
    leaf_node_ids: Vec<NodeId>,
}

impl NodeIdMapCollection {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn ast_node(&self, id: NodeId) -> Option<&AstNode> {
        self.ast_node_by_id.get(&id)
    }

    pub fn expect_ast_node(&self, id: NodeId) -> Result<&AstNode, CommonError> {
        self.ast_node(id)
            .ok_or_else(|| CommonError::invariant("missing Ast node", id))
    }

    pub fn context_node(&self, id: NodeId) -> Option<&ContextNode> {
        self.context_node_by_id.get(&id)
    }

    /// Look up a node as either Ast or context.
    pub fn xor_node(&self, id: NodeId) -> Option<XorNode<'_>> {
        if let Some(node) = self.ast_node(id) {
            Some(XorNode::Ast(node))
        } else {
            self.context_node(id).map(XorNode::Context)
        }
    }

    pub fn expect_xor_node(&self, id: NodeId) -> Result<XorNode<'_>, CommonError> {
        self.xor_node(id)
            .ok_or_else(|| CommonError::invariant("unknown node id", id))
    }

    pub fn parent_id(&self, id: NodeId) -> Option<NodeId> {
        self.parent_id_by_id.get(&id).copied()
    }

    pub fn child_ids(&self, id: NodeId) -> &[NodeId] {
        self.child_ids_by_id
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn leaf_node_ids(&self) -> &[NodeId] {
        &self.leaf_node_ids
    }

    pub fn maybe_right_most_leaf(&self) -> Option<NodeId> {
        self.maybe_right_most_leaf
    }

    pub fn ast_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ast_node_by_id.keys().copied()
    }

    pub fn ast_nodes(&self) -> impl Iterator<Item = &AstNode> {
        self.ast_node_by_id.values()
    }

    pub fn context_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.context_node_by_id.keys().copied()
    }

    pub fn context_node_count(&self) -> usize {
        self.context_node_by_id.len()
    }

    pub fn ast_node_count(&self) -> usize {
        self.ast_node_by_id.len()
    }

    /// All `(child, parent)` pairs.
    pub fn parent_entries(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.parent_id_by_id.iter().map(|(c, p)| (*c, *p))
    }

    /// The elements of an ArrayWrapper node.
    pub fn array_elements(&self, id: NodeId) -> Option<&[NodeId]> {
        match self.ast_node(id)? {
            AstNode::ArrayWrapper(wrapper) => Some(&wrapper.elements),
            _ => None,
        }
    }

    /// The wrapped node of a Csv element.
    pub fn csv_content(&self, id: NodeId) -> Option<NodeId> {
        match self.ast_node(id)? {
            AstNode::Csv(csv) => Some(csv.node),
            _ => None,
        }
    }

    // ========================================================================
    // Mutation — used by the parser's context-tree builder
    // ========================================================================

    /// Insert a freshly opened context node and wire its parent/child links.
    pub fn insert_context_node(&mut self, node: ContextNode) {
        let id = node.id;
        if let Some(parent_id) = node.parent_id {
            self.parent_id_by_id.insert(id, parent_id);
            self.child_ids_by_id.entry(parent_id).or_default().push(id);
        }
        self.context_node_by_id.insert(id, node);
    }

    /// Promote a context node to its finished Ast node. The context entry is
    /// removed in the same step, so an id is never in both maps.
    pub fn promote_context(&mut self, node: AstNode) -> Result<ContextNode, CommonError> {
        let id = node.id();
        let context = self
            .context_node_by_id
            .remove(&id)
            .ok_or_else(|| CommonError::invariant("promoting id with no open context", id))?;
        if context.kind != node.kind() {
            return Err(CommonError::invariant(
                "promoted node kind differs from its context",
                (context.kind, node.kind()),
            ));
        }
        if node.is_leaf() {
            self.leaf_node_ids.push(id);
            self.maybe_right_most_leaf = Some(id);
        }
        self.ast_node_by_id.insert(id, node);
        Ok(context)
    }

    /// Remove a context entry without promoting it (the discard half of
    /// `deleteContext`).
    pub fn remove_context_node(&mut self, id: NodeId) -> Result<ContextNode, CommonError> {
        self.context_node_by_id
            .remove(&id)
            .ok_or_else(|| CommonError::invariant("removing id with no open context", id))
    }

    pub fn context_node_mut(&mut self, id: NodeId) -> Option<&mut ContextNode> {
        self.context_node_by_id.get_mut(&id)
    }

    /// Wire a parent/child link for a node that currently has no parent.
    pub fn link_child(&mut self, parent_id: NodeId, child_id: NodeId) {
        self.parent_id_by_id.insert(child_id, parent_id);
        self.child_ids_by_id.entry(parent_id).or_default().push(child_id);
    }

    /// Remove `child` from `parent`'s child list and drop its parent entry.
    pub fn unlink_child(&mut self, parent_id: NodeId, child_id: NodeId) {
        if let Some(children) = self.child_ids_by_id.get_mut(&parent_id) {
            children.retain(|id| *id != child_id);
            if children.is_empty() {
                self.child_ids_by_id.remove(&parent_id);
            }
        }
        self.parent_id_by_id.remove(&child_id);
    }

    /// Replace `old_child` with `new_child` in `parent`'s list, preserving
    /// the slot position.
    pub fn replace_child(
        &mut self,
        parent_id: NodeId,
        old_child: NodeId,
        new_child: NodeId,
    ) -> Result<(), CommonError> {
        let children = self
            .child_ids_by_id
            .get_mut(&parent_id)
            .ok_or_else(|| CommonError::invariant("parent has no child list", parent_id))?;
        let slot = children
            .iter()
            .position(|id| *id == old_child)
            .ok_or_else(|| CommonError::invariant("child not under parent", (parent_id, old_child)))?;
        children[slot] = new_child;
        self.parent_id_by_id.remove(&old_child);
        self.parent_id_by_id.insert(new_child, parent_id);
        Ok(())
    }

    /// Re-parent an already-finished node under a context that opened after
    /// it. This is the tree surgery required by recursive primary
    /// expressions and by left-associative operator folding: the head is
    /// parsed before its enclosing node's kind is known.
    pub fn relocate_under(
        &mut self,
        child_id: NodeId,
        new_parent_id: NodeId,
    ) -> Result<(), CommonError> {
        let old_parent = self
            .parent_id(child_id)
            .ok_or_else(|| CommonError::invariant("relocating the root", child_id))?;
        self.unlink_child(old_parent, child_id);
        self.parent_id_by_id.insert(child_id, new_parent_id);
        let children = self.child_ids_by_id.entry(new_parent_id).or_default();
        if !children.is_empty() {
            return Err(CommonError::invariant(
                "relocation target already has children",
                new_parent_id,
            ));
        }
        children.push(child_id);
        Ok(())
    }

    /// Rewrite a node's attribute index after a splice or relocation. Works
    /// on both promoted and still-open nodes.
    pub fn set_attribute_index(
        &mut self,
        id: NodeId,
        attribute_index: Option<u32>,
    ) -> Result<(), CommonError> {
        if let Some(node) = self.ast_node_by_id.get_mut(&id) {
            node.data_mut().attribute_index = attribute_index;
            return Ok(());
        }
        if let Some(context) = self.context_node_by_id.get_mut(&id) {
            context.attribute_index = attribute_index;
            return Ok(());
        }
        Err(CommonError::invariant("unknown node id", id))
    }

    /// Drop every node issued after `watermark` and truncate the indexes to
    /// the survivors. Ids are monotonic, so "issued after" is a single
    /// comparison; this is the restore half of the parser's fast backup.
    pub fn discard_after(&mut self, watermark: u32) {
        self.ast_node_by_id.retain(|id, _| id.value() <= watermark);
        self.context_node_by_id.retain(|id, _| id.value() <= watermark);
        self.parent_id_by_id
            .retain(|child, parent| child.value() <= watermark && parent.value() <= watermark);
        self.child_ids_by_id.retain(|parent, children| {
            if parent.value() > watermark {
                return false;
            }
            children.retain(|child| child.value() <= watermark);
            !children.is_empty()
        });
        self.leaf_node_ids.retain(|id| id.value() <= watermark);
        self.maybe_right_most_leaf = self.leaf_node_ids.last().copied();
    }
}
