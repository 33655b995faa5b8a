//! Scope inspection.
//!
//! For a target node, walk its ancestors through the node-id map and
//! accumulate name bindings with innermost-wins shadowing. The walk is
//! structural (child slots by attribute index), so it works identically on
//! finished Ast nodes and on the context nodes of a partial parse.

use crate::cache::Inspector;
use indexmap::IndexMap;
use mlang_ast::{NodeId, NodeKind};
use mlang_diagnostics::CommonError;
use rustc_hash::FxHashSet;

/// What a name in scope refers to.
#[derive(Debug, Clone)]
pub enum ScopeItem {
    /// `_`, bound by an enclosing each expression.
    Each { each_id: NodeId },
    /// A let-expression variable. `is_recursive` marks the binding that
    /// contains the target itself, reachable via `@`.
    LetVariable {
        key_id: NodeId,
        maybe_value_id: Option<NodeId>,
        is_recursive: bool,
    },
    /// A record-expression member, in scope of its sibling values.
    RecordField {
        key_id: NodeId,
        maybe_value_id: Option<NodeId>,
        is_recursive: bool,
    },
    /// A function parameter, in scope of the function body.
    Parameter {
        parameter_id: NodeId,
        name_id: NodeId,
        is_optional: bool,
        maybe_type_id: Option<NodeId>,
    },
    /// A section member, in scope of every member expression.
    SectionMember {
        key_id: NodeId,
        maybe_value_id: Option<NodeId>,
        is_recursive: bool,
    },
}

/// Name → scope item, in discovery order (innermost first).
pub type ScopeItemByKey = IndexMap<String, ScopeItem>;

// Child slots, by attribute index.
const LET_VARIABLE_LIST_SLOT: u32 = 1;
const RECORD_CONTENT_SLOT: u32 = 1;
const SECTION_MEMBERS_SLOT: u32 = 3;
const SECTION_MEMBER_KVP_SLOT: u32 = 1;
const FUNCTION_PARAMETER_LIST_SLOT: u32 = 0;
const FUNCTION_BODY_SLOT: u32 = 3;
const WRAPPED_CONTENT_SLOT: u32 = 1;
const CSV_NODE_SLOT: u32 = 0;
const KVP_KEY_SLOT: u32 = 0;
const KVP_VALUE_SLOT: u32 = 2;
const EACH_PAIRED_SLOT: u32 = 1;
const PARAMETER_OPTIONAL_SLOT: u32 = 0;
const PARAMETER_NAME_SLOT: u32 = 1;
const PARAMETER_TYPE_SLOT: u32 = 2;

impl Inspector<'_> {
    /// The scope visible at `node_id`.
    pub fn scope_for(&mut self, node_id: NodeId) -> Result<ScopeItemByKey, CommonError> {
        if let Some(scope) = self.cached_scope(node_id) {
            return Ok(scope.clone());
        }
        // The walk needs the node to exist, even though only its ancestors
        // contribute bindings.
        self.collection.expect_xor_node(node_id)?;

        let mut path = FxHashSet::default();
        path.insert(node_id);

        let mut scope = ScopeItemByKey::new();
        let mut child = node_id;
        while let Some(parent) = self.collection.parent_id(child) {
            let parent_kind = self.collection.expect_xor_node(parent)?.kind();
            match parent_kind {
                NodeKind::LetExpression => {
                    self.collect_paired_bindings(
                        parent,
                        LET_VARIABLE_LIST_SLOT,
                        &path,
                        &mut scope,
                        BindingKind::Let,
                    );
                }
                NodeKind::RecordExpression => {
                    // Record members only see each other: bindings apply when
                    // the walk came up out of the record's content.
                    if self.nth_child(parent, RECORD_CONTENT_SLOT) == Some(child) {
                        self.collect_record_bindings(parent, &path, &mut scope);
                    }
                }
                NodeKind::Section => {
                    self.collect_section_bindings(parent, &path, &mut scope);
                }
                NodeKind::FunctionExpression => {
                    if self.nth_child(parent, FUNCTION_BODY_SLOT) == Some(child) {
                        self.collect_parameter_bindings(parent, &mut scope);
                    }
                }
                NodeKind::EachExpression => {
                    if self.nth_child(parent, EACH_PAIRED_SLOT) == Some(child)
                        && !scope.contains_key("_")
                    {
                        scope.insert("_".to_string(), ScopeItem::Each { each_id: parent });
                    }
                }
                _ => {}
            }
            path.insert(parent);
            child = parent;
        }

        self.delta.scope_by_id.insert(node_id, scope.clone());
        Ok(scope)
    }

    /// Let-style bindings: an ArrayWrapper of Csv-wrapped key-value pairs in
    /// the given slot.
    fn collect_paired_bindings(
        &self,
        parent: NodeId,
        list_slot: u32,
        path: &FxHashSet<NodeId>,
        scope: &mut ScopeItemByKey,
        binding_kind: BindingKind,
    ) {
        let Some(list) = self.nth_child(parent, list_slot) else {
            return;
        };
        for csv in self.collection.child_ids(list).iter().copied() {
            let Some(kvp) = self.nth_child(csv, CSV_NODE_SLOT) else {
                continue;
            };
            self.collect_kvp_binding(kvp, path, scope, binding_kind);
        }
    }

    fn collect_record_bindings(
        &self,
        record: NodeId,
        path: &FxHashSet<NodeId>,
        scope: &mut ScopeItemByKey,
    ) {
        let Some(content) = self.nth_child(record, RECORD_CONTENT_SLOT) else {
            return;
        };
        for csv in self.collection.child_ids(content).iter().copied() {
            let Some(kvp) = self.nth_child(csv, CSV_NODE_SLOT) else {
                continue;
            };
            self.collect_kvp_binding(kvp, path, scope, BindingKind::Record);
        }
    }

    fn collect_section_bindings(
        &self,
        section: NodeId,
        path: &FxHashSet<NodeId>,
        scope: &mut ScopeItemByKey,
    ) {
        let Some(members) = self.nth_child(section, SECTION_MEMBERS_SLOT) else {
            return;
        };
        for member in self.collection.child_ids(members).iter().copied() {
            let Some(kvp) = self.nth_child(member, SECTION_MEMBER_KVP_SLOT) else {
                continue;
            };
            self.collect_kvp_binding(kvp, path, scope, BindingKind::Section);
        }
    }

    fn collect_kvp_binding(
        &self,
        kvp: NodeId,
        path: &FxHashSet<NodeId>,
        scope: &mut ScopeItemByKey,
        binding_kind: BindingKind,
    ) {
        let Some(key_id) = self.nth_child(kvp, KVP_KEY_SLOT) else {
            return;
        };
        // A key still open in a partial parse has no literal yet.
        let Some(name) = self.leaf_literal(key_id) else {
            return;
        };
        if scope.contains_key(name) {
            return;
        }
        let maybe_value_id = self.nth_child(kvp, KVP_VALUE_SLOT);
        let is_recursive = path.contains(&kvp);
        let item = match binding_kind {
            BindingKind::Let => ScopeItem::LetVariable {
                key_id,
                maybe_value_id,
                is_recursive,
            },
            BindingKind::Record => ScopeItem::RecordField {
                key_id,
                maybe_value_id,
                is_recursive,
            },
            BindingKind::Section => ScopeItem::SectionMember {
                key_id,
                maybe_value_id,
                is_recursive,
            },
        };
        scope.insert(name.to_string(), item);
    }

    fn collect_parameter_bindings(&self, function: NodeId, scope: &mut ScopeItemByKey) {
        let Some(parameter_list) = self.nth_child(function, FUNCTION_PARAMETER_LIST_SLOT) else {
            return;
        };
        let Some(content) = self.nth_child(parameter_list, WRAPPED_CONTENT_SLOT) else {
            return;
        };
        for csv in self.collection.child_ids(content).iter().copied() {
            let Some(parameter_id) = self.nth_child(csv, CSV_NODE_SLOT) else {
                continue;
            };
            let Some(name_id) = self.nth_child(parameter_id, PARAMETER_NAME_SLOT) else {
                continue;
            };
            let Some(name) = self.leaf_literal(name_id) else {
                continue;
            };
            if scope.contains_key(name) {
                continue;
            }
            let is_optional = self.nth_child(parameter_id, PARAMETER_OPTIONAL_SLOT).is_some();
            let maybe_type_id = self.nth_child(parameter_id, PARAMETER_TYPE_SLOT);
            scope.insert(
                name.to_string(),
                ScopeItem::Parameter {
                    parameter_id,
                    name_id,
                    is_optional,
                    maybe_type_id,
                },
            );
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BindingKind {
    Let,
    Record,
    Section,
}
