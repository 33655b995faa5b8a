//! The per-document inspection cache and its given/delta split.
//!
//! A cache is opaque to callers and reusable across inspection calls over
//! the same document. Each call computes into a private delta; only a
//! successful call merges the delta back, so an abandoned computation never
//! pollutes the shared cache. Entries are only ever added.

use crate::scope::ScopeItemByKey;
use crate::types::Type;
use mlang_ast::{NodeId, NodeIdMapCollection};
use rustc_hash::{FxHashMap, FxHashSet};

/// Memoized scope-by-node-id and type-by-node-id for one document.
///
/// Single-owner: callers sharing a cache must serialize inspection calls.
#[derive(Debug, Default)]
pub struct TypeCache {
    pub(crate) scope_by_id: FxHashMap<NodeId, ScopeItemByKey>,
    pub(crate) type_by_id: FxHashMap<NodeId, Type>,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of memoized scopes. Grows monotonically.
    pub fn scope_entry_count(&self) -> usize {
        self.scope_by_id.len()
    }

    /// Number of memoized types. Grows monotonically.
    pub fn type_entry_count(&self) -> usize {
        self.type_by_id.len()
    }

    pub(crate) fn merge(&mut self, delta: TypeCache) {
        self.scope_by_id.extend(delta.scope_by_id);
        self.type_by_id.extend(delta.type_by_id);
    }
}

/// One inspection call in flight: the immutable document, a read-only view
/// of the carried-in cache, and the delta being produced.
pub(crate) struct Inspector<'a> {
    pub collection: &'a NodeIdMapCollection,
    pub given: Option<&'a TypeCache>,
    pub delta: TypeCache,
    /// Nodes currently being typed; a re-entry is a cycle.
    pub in_progress: FxHashSet<NodeId>,
}

impl<'a> Inspector<'a> {
    pub fn new(collection: &'a NodeIdMapCollection, given: Option<&'a TypeCache>) -> Self {
        Self {
            collection,
            given,
            delta: TypeCache::new(),
            in_progress: FxHashSet::default(),
        }
    }

    pub fn cached_scope(&self, id: NodeId) -> Option<&ScopeItemByKey> {
        self.delta
            .scope_by_id
            .get(&id)
            .or_else(|| self.given.and_then(|cache| cache.scope_by_id.get(&id)))
    }

    pub fn cached_type(&self, id: NodeId) -> Option<&Type> {
        self.delta
            .type_by_id
            .get(&id)
            .or_else(|| self.given.and_then(|cache| cache.type_by_id.get(&id)))
    }

    /// The attribute index of a node, whichever map it lives in.
    pub fn attribute_index(&self, id: NodeId) -> Option<u32> {
        match self.collection.xor_node(id)? {
            mlang_ast::XorNode::Ast(node) => node.data().attribute_index,
            mlang_ast::XorNode::Context(context) => context.attribute_index,
        }
    }

    /// The child occupying a given attribute slot, if it was ever produced.
    pub fn nth_child(&self, parent: NodeId, attribute_index: u32) -> Option<NodeId> {
        self.collection
            .child_ids(parent)
            .iter()
            .copied()
            .find(|child| self.attribute_index(*child) == Some(attribute_index))
    }

    /// The literal of a leaf Ast node.
    pub fn leaf_literal(&self, id: NodeId) -> Option<&str> {
        self.collection.ast_node(id)?.maybe_literal()
    }
}
