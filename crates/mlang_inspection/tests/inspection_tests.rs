//! Inspection integration tests.
//!
//! Exercises the parse → inspect pipeline: scope accumulation with
//! shadowing, type analysis, cache behavior, autocomplete, and inspection
//! over partial parses.

use mlang_ast::{NodeId, NodeKind};
use mlang_inspection::{
    autocomplete_keyword, try_node_scope, try_scope_type, try_type, ScopeItem, Type, TypeCache,
    TypeKind,
};
use mlang_lexer::{Keyword, TokenSnapshot};
use mlang_parser::{try_parse, ParseOk, ParseSettings, ParserError, TriedParse};

fn parse(source: &str) -> ParseOk {
    let snapshot = TokenSnapshot::new(source).expect("lexing should succeed");
    try_parse(&ParseSettings::default(), &snapshot).expect("parsing should succeed")
}

/// The id of the IdentifierExpression referencing `literal`.
fn find_reference(ok: &ParseOk, literal: &str) -> NodeId {
    ok.leaf_node_ids
        .iter()
        .copied()
        .find_map(|id| {
            let leaf = ok.node_id_map.ast_node(id)?;
            if leaf.kind() != NodeKind::Identifier || leaf.maybe_literal() != Some(literal) {
                return None;
            }
            let parent = ok.node_id_map.parent_id(id)?;
            let parent_node = ok.node_id_map.ast_node(parent)?;
            (parent_node.kind() == NodeKind::IdentifierExpression).then_some(parent)
        })
        .unwrap_or_else(|| panic!("no reference to {:?}", literal))
}

// ============================================================================
// Scope
// ============================================================================

#[test]
fn let_members_are_in_scope_of_each_other() {
    let ok = parse("let x = 1, y = x in y");
    let reference = find_reference(&ok, "x");
    let scope = try_node_scope(&ok.node_id_map, reference, None).unwrap();

    assert!(matches!(
        scope.get("x"),
        Some(ScopeItem::LetVariable {
            is_recursive: false,
            ..
        })
    ));
    // The reference sits inside y's own value, so y is only reachable
    // recursively.
    assert!(matches!(
        scope.get("y"),
        Some(ScopeItem::LetVariable {
            is_recursive: true,
            ..
        })
    ));
}

#[test]
fn record_members_see_their_siblings() {
    let ok = parse("[a = 1, b = a]");
    let reference = find_reference(&ok, "a");
    let scope = try_node_scope(&ok.node_id_map, reference, None).unwrap();
    assert!(matches!(
        scope.get("a"),
        Some(ScopeItem::RecordField {
            is_recursive: false,
            ..
        })
    ));
    assert!(matches!(
        scope.get("b"),
        Some(ScopeItem::RecordField {
            is_recursive: true,
            ..
        })
    ));
}

#[test]
fn parameters_bind_in_the_function_body() {
    let ok = parse("(x, optional y) => x");
    let reference = find_reference(&ok, "x");
    let scope = try_node_scope(&ok.node_id_map, reference, None).unwrap();
    assert!(matches!(
        scope.get("x"),
        Some(ScopeItem::Parameter {
            is_optional: false,
            ..
        })
    ));
    assert!(matches!(
        scope.get("y"),
        Some(ScopeItem::Parameter {
            is_optional: true,
            ..
        })
    ));
}

#[test]
fn each_binds_underscore() {
    let ok = parse("each _");
    let reference = find_reference(&ok, "_");
    let scope = try_node_scope(&ok.node_id_map, reference, None).unwrap();
    assert!(matches!(scope.get("_"), Some(ScopeItem::Each { .. })));
}

#[test]
fn section_members_share_one_scope() {
    let ok = parse("section s; x = 1; shared y = x;");
    let reference = find_reference(&ok, "x");
    let scope = try_node_scope(&ok.node_id_map, reference, None).unwrap();
    assert!(matches!(scope.get("x"), Some(ScopeItem::SectionMember { .. })));
    assert!(matches!(scope.get("y"), Some(ScopeItem::SectionMember { .. })));
}

#[test]
fn innermost_binding_shadows() {
    let ok = parse("let x = 1 in let x = \"s\" in x");
    let reference = find_reference(&ok, "x");
    let resolved = try_type(&ok.node_id_map, reference, None).unwrap();
    assert_eq!(resolved, Type::new(TypeKind::Text));
}

// ============================================================================
// Types
// ============================================================================

#[test]
fn literal_and_branch_types() {
    let ok = parse("if true then 1 else 2");
    assert_eq!(
        try_type(&ok.node_id_map, ok.root_id, None).unwrap(),
        Type::new(TypeKind::Number)
    );

    let ok = parse("if true then 1 else \"s\"");
    assert_eq!(
        try_type(&ok.node_id_map, ok.root_id, None).unwrap(),
        Type::any()
    );
}

#[test]
fn record_types_keep_field_order() {
    let ok = parse("[a = 1, b = \"s\"]");
    let record_type = try_type(&ok.node_id_map, ok.root_id, None).unwrap();
    match record_type.kind {
        TypeKind::Record { fields } => {
            let names: Vec<&String> = fields.keys().collect();
            assert_eq!(names, ["a", "b"]);
            assert_eq!(fields["a"], Type::new(TypeKind::Number));
            assert_eq!(fields["b"], Type::new(TypeKind::Text));
        }
        other => panic!("expected a record type, got {:?}", other),
    }
}

#[test]
fn invocation_takes_the_declared_return_path() {
    let ok = parse("let f = (x as number) => \"s\" in f(1)");
    assert_eq!(
        try_type(&ok.node_id_map, ok.root_id, None).unwrap(),
        Type::new(TypeKind::Text)
    );
}

#[test]
fn annotations_resolve_to_primitive_types() {
    let ok = parse("(x as nullable number) => x");
    let reference = find_reference(&ok, "x");
    let resolved = try_type(&ok.node_id_map, reference, None).unwrap();
    assert_eq!(resolved, Type::nullable(TypeKind::Number));
}

#[test]
fn mutually_recursive_bindings_type_as_unknown() {
    let ok = parse("let a = b, b = a in a");
    let resolved = try_type(&ok.node_id_map, ok.root_id, None).unwrap();
    assert_eq!(resolved.kind, TypeKind::Unknown);
}

#[test]
fn scope_type_labels_every_binding() {
    let ok = parse("let x = 1, y = \"s\" in y");
    let reference = find_reference(&ok, "y");
    let typed = try_scope_type(&ok.node_id_map, reference, None).unwrap();
    assert_eq!(typed["x"], Type::new(TypeKind::Number));
    assert_eq!(typed["y"], Type::new(TypeKind::Text));
}

// ============================================================================
// Cache behavior
// ============================================================================

#[test]
fn cache_only_grows() {
    let ok = parse("let x = 1, y = x in y");
    let mut cache = TypeCache::new();

    let y_reference = find_reference(&ok, "y");
    try_scope_type(&ok.node_id_map, y_reference, Some(&mut cache)).unwrap();
    let scopes_after_first = cache.scope_entry_count();
    let types_after_first = cache.type_entry_count();
    assert!(scopes_after_first > 0);
    assert!(types_after_first > 0);

    let x_reference = find_reference(&ok, "x");
    try_scope_type(&ok.node_id_map, x_reference, Some(&mut cache)).unwrap();
    assert!(cache.scope_entry_count() >= scopes_after_first);
    assert!(cache.type_entry_count() >= types_after_first);

    // Re-asking answers from the cache and never shrinks it.
    try_scope_type(&ok.node_id_map, y_reference, Some(&mut cache)).unwrap();
    assert!(cache.scope_entry_count() >= scopes_after_first);
}

#[test]
fn failed_inspection_leaves_the_cache_untouched() {
    let ok = parse("let x = 1 in x");
    let mut cache = TypeCache::new();
    try_type(&ok.node_id_map, ok.root_id, Some(&mut cache)).unwrap();
    let scopes = cache.scope_entry_count();
    let types = cache.type_entry_count();

    let bogus = NodeId::new(9999);
    assert!(try_type(&ok.node_id_map, bogus, Some(&mut cache)).is_err());
    assert_eq!(cache.scope_entry_count(), scopes);
    assert_eq!(cache.type_entry_count(), types);
}

// ============================================================================
// Partial parses
// ============================================================================

#[test]
fn scope_works_on_a_failed_parse() {
    let snapshot = TokenSnapshot::new("let x = 1, y = ").unwrap();
    let error = match try_parse(&ParseSettings::default(), &snapshot) {
        Err(ParserError::Syntax(error)) => error,
        other => panic!("expected a syntax error, got {:?}", other.map(|_| ())),
    };

    let leaf = error
        .node_id_map
        .maybe_right_most_leaf()
        .expect("a right-most leaf survives the failure");
    let scope = try_node_scope(&error.node_id_map, leaf, None).unwrap();
    assert!(matches!(
        scope.get("x"),
        Some(ScopeItem::LetVariable {
            is_recursive: false,
            ..
        })
    ));
    // y's value is still an open context node; the binding is visible and
    // types as unknown.
    let Some(ScopeItem::LetVariable {
        is_recursive: true,
        maybe_value_id: Some(value_id),
        ..
    }) = scope.get("y")
    else {
        panic!("expected a recursive binding for y");
    };
    let value_type = try_type(&error.node_id_map, *value_id, None).unwrap();
    assert_eq!(value_type.kind, TypeKind::Unknown);
}

// ============================================================================
// Autocomplete
// ============================================================================

fn tried(source: &str) -> (TriedParse, TokenSnapshot) {
    let snapshot = TokenSnapshot::new(source).unwrap();
    let tried = try_parse(&ParseSettings::default(), &snapshot);
    (tried, snapshot)
}

#[test]
fn identifier_prefix_suggests_expression_keywords() {
    let (outcome, snapshot) = tried("t");
    let keywords = autocomplete_keyword(&outcome, &snapshot, 1);
    assert_eq!(keywords, [Keyword::True, Keyword::Try, Keyword::Type]);
}

#[test]
fn failed_parse_suggests_the_expected_keyword() {
    let (outcome, snapshot) = tried("if 1 t");
    let keywords = autocomplete_keyword(&outcome, &snapshot, 6);
    assert_eq!(keywords, [Keyword::Then]);
}

#[test]
fn non_identifier_cursor_uses_expected_kinds_unfiltered() {
    let (outcome, snapshot) = tried("1 +");
    let keywords = autocomplete_keyword(&outcome, &snapshot, 3);
    assert_eq!(keywords, [Keyword::False, Keyword::True]);
}
