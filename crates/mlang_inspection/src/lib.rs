//! mlang_inspection: Scope, type, and autocomplete services over parsed
//! (or partially parsed) mlang documents.
//!
//! All entry points are pure over the immutable node-id map, modulo writes
//! into the optional [`TypeCache`]. A computation that fails never touches
//! the cache: entries are produced into a delta that is merged only on
//! success.

mod autocomplete;
mod cache;
mod scope;
mod type_check;
mod types;

pub use autocomplete::autocomplete_keyword;
pub use cache::TypeCache;
pub use scope::{ScopeItem, ScopeItemByKey};
pub use types::{Type, TypeKind};

use cache::Inspector;
use indexmap::IndexMap;
use mlang_ast::{NodeId, NodeIdMapCollection};
use mlang_diagnostics::CommonError;

/// The names visible at a node, innermost binding first.
pub fn try_node_scope(
    collection: &NodeIdMapCollection,
    node_id: NodeId,
    maybe_cache: Option<&mut TypeCache>,
) -> Result<ScopeItemByKey, CommonError> {
    with_cache(collection, maybe_cache, |inspector| {
        inspector.scope_for(node_id)
    })
}

/// The names visible at a node together with their types.
pub fn try_scope_type(
    collection: &NodeIdMapCollection,
    node_id: NodeId,
    maybe_cache: Option<&mut TypeCache>,
) -> Result<IndexMap<String, Type>, CommonError> {
    with_cache(collection, maybe_cache, |inspector| {
        let scope = inspector.scope_for(node_id)?;
        let mut typed = IndexMap::with_capacity(scope.len());
        for (name, item) in scope.iter() {
            let item_type = inspector.type_of_scope_item(item)?;
            typed.insert(name.clone(), item_type);
        }
        Ok(typed)
    })
}

/// The type of a node. The node may be an Ast node or, on a partial parse,
/// a context node (which types as unknown).
pub fn try_type(
    collection: &NodeIdMapCollection,
    node_id: NodeId,
    maybe_cache: Option<&mut TypeCache>,
) -> Result<Type, CommonError> {
    with_cache(collection, maybe_cache, |inspector| {
        inspector.type_for(node_id)
    })
}

/// Run one inspection computation under the given/delta cache split: the
/// delta merges into the carried-in cache only when the computation
/// succeeds.
fn with_cache<T>(
    collection: &NodeIdMapCollection,
    maybe_cache: Option<&mut TypeCache>,
    compute: impl FnOnce(&mut Inspector<'_>) -> Result<T, CommonError>,
) -> Result<T, CommonError> {
    match maybe_cache {
        Some(cache) => {
            let mut inspector = Inspector::new(collection, Some(&*cache));
            let result = compute(&mut inspector);
            let delta = inspector.delta;
            match result {
                Ok(value) => {
                    cache.merge(delta);
                    Ok(value)
                }
                Err(err) => Err(err),
            }
        }
        None => {
            let mut inspector = Inspector::new(collection, None);
            compute(&mut inspector)
        }
    }
}
