//! The context-tree builder.
//!
//! While the grammar readers run, every production in progress is mirrored
//! by a context node in the node-id map. Opening a production pushes a new
//! current context; closing it promotes the context to its finished Ast
//! node and pops back to the parent. The builder also implements the fast
//! backup/restore used by lookahead and the two tree-surgery operations
//! (single-child splice, head re-parenting) the grammar needs.

use mlang_ast::node_id_map::ContextNode;
use mlang_ast::{AstNode, NodeId, NodeIdMapCollection, NodeKind};
use mlang_core::text::TokenIndex;
use mlang_diagnostics::CommonError;

/// Context-tree half of a fast state backup. Ids are issued monotonically,
/// so everything created after the backup is identified by a single id
/// watermark; only the current context's attribute counter needs an
/// explicit snapshot.
#[derive(Debug, Clone)]
pub(crate) struct ContextBackup {
    id_counter: u32,
    maybe_root_id: Option<NodeId>,
    maybe_current_context_id: Option<NodeId>,
    current_attribute_counter: Option<u32>,
}

/// Owner of the node-id map during parsing.
#[derive(Debug, Default)]
pub(crate) struct ContextState {
    pub(crate) collection: NodeIdMapCollection,
    id_counter: u32,
    maybe_root_id: Option<NodeId>,
    maybe_current_context_id: Option<NodeId>,
}

impl ContextState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root_id(&self) -> Option<NodeId> {
        self.maybe_root_id
    }

    pub fn current_context(&self) -> Result<&ContextNode, CommonError> {
        let id = self
            .maybe_current_context_id
            .ok_or_else(|| CommonError::invariant("no open context", ()))?;
        self.collection
            .context_node(id)
            .ok_or_else(|| CommonError::invariant("current context missing from the map", id))
    }

    pub fn into_collection(self) -> NodeIdMapCollection {
        self.collection
    }

    /// Open a new context as a child of the current one and make it current.
    pub fn start(
        &mut self,
        kind: NodeKind,
        token_index_start: TokenIndex,
    ) -> Result<NodeId, CommonError> {
        self.id_counter += 1;
        let id = NodeId::new(self.id_counter);

        let (parent_id, attribute_index) = match self.maybe_current_context_id {
            Some(parent_id) => {
                let parent = self
                    .collection
                    .context_node_mut(parent_id)
                    .ok_or_else(|| CommonError::invariant("parent context missing", parent_id))?;
                let index = parent.attribute_counter;
                parent.attribute_counter += 1;
                (Some(parent_id), Some(index))
            }
            None => (None, None),
        };

        self.collection.insert_context_node(ContextNode {
            id,
            kind,
            parent_id,
            attribute_index,
            attribute_counter: 0,
            token_index_start,
        });
        if self.maybe_root_id.is_none() {
            self.maybe_root_id = Some(id);
        }
        self.maybe_current_context_id = Some(id);
        Ok(id)
    }

    /// Close the current context by promoting it to `node`. The node's id
    /// must match the current context; the parent becomes current again.
    pub fn end(&mut self, node: AstNode) -> Result<NodeId, CommonError> {
        let current_id = self
            .maybe_current_context_id
            .ok_or_else(|| CommonError::invariant("ending a context with none open", node.id()))?;
        if node.id() != current_id {
            return Err(CommonError::invariant(
                "ended node does not match the current context",
                (node.id(), current_id),
            ));
        }
        let context = self.collection.promote_context(node)?;
        self.maybe_current_context_id = context.parent_id;
        Ok(current_id)
    }

    /// Discard the current context, splicing its single child (if any) into
    /// the slot the context occupied. Used when a production collapses into
    /// its operand, e.g. a metadata expression with no `meta` suffix.
    pub fn delete(&mut self) -> Result<Option<NodeId>, CommonError> {
        let current_id = self
            .maybe_current_context_id
            .ok_or_else(|| CommonError::invariant("deleting a context with none open", ()))?;
        let children = self.collection.child_ids(current_id).to_vec();
        if children.len() > 1 {
            return Err(CommonError::invariant(
                "deleted context has more than one child",
                (current_id, children.len()),
            ));
        }
        let context = self.collection.remove_context_node(current_id)?;
        let maybe_child = children.first().copied();

        match (context.parent_id, maybe_child) {
            (Some(parent_id), Some(child_id)) => {
                self.collection.unlink_child(current_id, child_id);
                self.collection
                    .replace_child(parent_id, current_id, child_id)?;
                self.collection
                    .set_attribute_index(child_id, context.attribute_index)?;
            }
            (Some(parent_id), None) => {
                self.collection.unlink_child(parent_id, current_id);
                // Free the slot the context had claimed.
                let parent = self
                    .collection
                    .context_node_mut(parent_id)
                    .ok_or_else(|| CommonError::invariant("parent context missing", parent_id))?;
                parent.attribute_counter -= 1;
            }
            (None, Some(child_id)) => {
                self.collection.unlink_child(current_id, child_id);
                self.collection.set_attribute_index(child_id, None)?;
                self.maybe_root_id = Some(child_id);
            }
            (None, None) => {
                self.maybe_root_id = None;
            }
        }

        self.maybe_current_context_id = context.parent_id;
        Ok(maybe_child)
    }

    /// Advance the current context's next-slot counter without creating a
    /// child. Keeps slot indices stable when an optional element is absent.
    pub fn increment_attribute_counter(&mut self) -> Result<(), CommonError> {
        let current_id = self
            .maybe_current_context_id
            .ok_or_else(|| CommonError::invariant("no open context to advance", ()))?;
        let context = self
            .collection
            .context_node_mut(current_id)
            .ok_or_else(|| CommonError::invariant("current context missing from the map", current_id))?;
        context.attribute_counter += 1;
        Ok(())
    }

    /// Re-parent `head` — an already-finished node — under the context that
    /// was just opened. The head was parsed before the enclosing node's
    /// kind was known, so the context takes over the head's slot and widens
    /// its token start back to the head's first token.
    pub fn attach_head(
        &mut self,
        head_id: NodeId,
        head_token_start: TokenIndex,
    ) -> Result<(), CommonError> {
        let current_id = self
            .maybe_current_context_id
            .ok_or_else(|| CommonError::invariant("no open context to attach a head to", head_id))?;
        let head_attribute_index = self.collection.expect_ast_node(head_id)?.data().attribute_index;

        match self.collection.parent_id(head_id) {
            Some(_) => {
                self.collection.relocate_under(head_id, current_id)?;
                self.collection
                    .set_attribute_index(current_id, head_attribute_index)?;
                let context = self
                    .collection
                    .context_node(current_id)
                    .ok_or_else(|| CommonError::invariant("current context missing", current_id))?;
                if let Some(parent_id) = context.parent_id {
                    // The head's slot and the context's slot collapsed into one.
                    let parent = self
                        .collection
                        .context_node_mut(parent_id)
                        .ok_or_else(|| CommonError::invariant("parent context missing", parent_id))?;
                    parent.attribute_counter -= 1;
                }
            }
            None => {
                // The head was the root; the new context replaces it.
                self.collection.link_child(current_id, head_id);
                self.collection.set_attribute_index(current_id, None)?;
                self.maybe_root_id = Some(current_id);
            }
        }

        self.collection.set_attribute_index(head_id, Some(0))?;
        let context = self
            .collection
            .context_node_mut(current_id)
            .ok_or_else(|| CommonError::invariant("current context missing", current_id))?;
        context.attribute_counter = 1;
        context.token_index_start = head_token_start;
        Ok(())
    }

    // ========================================================================
    // Fast backup/restore
    // ========================================================================

    pub fn backup(&self) -> ContextBackup {
        let current_attribute_counter = self
            .maybe_current_context_id
            .and_then(|id| self.collection.context_node(id))
            .map(|context| context.attribute_counter);
        ContextBackup {
            id_counter: self.id_counter,
            maybe_root_id: self.maybe_root_id,
            maybe_current_context_id: self.maybe_current_context_id,
            current_attribute_counter,
        }
    }

    pub fn rollback(&mut self, backup: &ContextBackup) -> Result<(), CommonError> {
        self.collection.discard_after(backup.id_counter);
        self.id_counter = backup.id_counter;
        self.maybe_root_id = backup.maybe_root_id;
        self.maybe_current_context_id = backup.maybe_current_context_id;
        if let Some(current_id) = backup.maybe_current_context_id {
            let counter = backup.current_attribute_counter.ok_or_else(|| {
                CommonError::invariant("backup missing the current context counter", current_id)
            })?;
            let context = self.collection.context_node_mut(current_id).ok_or_else(|| {
                CommonError::invariant("restored context missing from the map", current_id)
            })?;
            context.attribute_counter = counter;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlang_ast::node::{Constant, NodeData};
    use mlang_core::text::TokenRange;

    fn constant(state: &ContextState, id: NodeId) -> AstNode {
        let context = state.collection.context_node(id).unwrap();
        AstNode::Constant(Constant {
            data: NodeData {
                id,
                kind: context.kind,
                attribute_index: context.attribute_index,
                token_range: TokenRange::new(context.token_index_start, context.token_index_start),
                is_leaf: true,
            },
            literal: "x".to_string(),
        })
    }

    #[test]
    fn start_end_promotes_and_pops() {
        let mut state = ContextState::new();
        let root = state.start(NodeKind::Constant, 0).unwrap();
        assert_eq!(state.root_id(), Some(root));

        let node = constant(&state, root);
        state.end(node).unwrap();
        assert!(state.collection.context_node(root).is_none());
        assert!(state.collection.ast_node(root).is_some());
        assert!(state.current_context().is_err());
    }

    #[test]
    fn ending_the_wrong_node_is_an_invariant_failure() {
        let mut state = ContextState::new();
        let root = state.start(NodeKind::Constant, 0).unwrap();
        let mut node = constant(&state, root);
        // Forge a mismatched id.
        if let AstNode::Constant(ref mut inner) = node {
            inner.data.id = NodeId::new(42);
        }
        assert!(state.end(node).is_err());
    }

    #[test]
    fn delete_with_zero_children_frees_the_slot() {
        let mut state = ContextState::new();
        state.start(NodeKind::MetadataExpression, 0).unwrap();
        let child = state.start(NodeKind::Constant, 0).unwrap();
        state.delete().unwrap();

        assert!(state.collection.context_node(child).is_none());
        // The next child reclaims attribute slot zero.
        let next = state.start(NodeKind::Constant, 0).unwrap();
        let context = state.collection.context_node(next).unwrap();
        assert_eq!(context.attribute_index, Some(0));
    }

    #[test]
    fn delete_splices_a_single_child_into_the_parent_slot() {
        let mut state = ContextState::new();
        let outer = state.start(NodeKind::IfExpression, 0).unwrap();
        let middle = state.start(NodeKind::MetadataExpression, 0).unwrap();
        let inner = state.start(NodeKind::Constant, 0).unwrap();
        state.end(constant(&state, inner)).unwrap();

        let spliced = state.delete().unwrap();
        assert_eq!(spliced, Some(inner));
        assert!(state.collection.context_node(middle).is_none());
        assert_eq!(state.collection.parent_id(inner), Some(outer));
        assert_eq!(state.collection.child_ids(outer), &[inner]);
        assert_eq!(
            state.collection.ast_node(inner).unwrap().data().attribute_index,
            Some(0)
        );
    }

    #[test]
    fn rollback_restores_the_watermark_and_counter() {
        let mut state = ContextState::new();
        let root = state.start(NodeKind::IfExpression, 0).unwrap();
        let first = state.start(NodeKind::Constant, 0).unwrap();
        state.end(constant(&state, first)).unwrap();

        let backup = state.backup();
        let second = state.start(NodeKind::Constant, 1).unwrap();
        state.end(constant(&state, second)).unwrap();

        state.rollback(&backup).unwrap();
        assert!(state.collection.ast_node(second).is_none());
        assert!(state.collection.ast_node(first).is_some());
        assert_eq!(state.collection.child_ids(root), &[first]);
        // The next start reuses the discarded id and slot.
        let replayed = state.start(NodeKind::Constant, 1).unwrap();
        assert_eq!(replayed, second);
        let context = state.collection.context_node(replayed).unwrap();
        assert_eq!(context.attribute_index, Some(1));
    }
}
