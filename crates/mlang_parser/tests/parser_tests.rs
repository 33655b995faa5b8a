//! Parser integration tests.
//!
//! Covers the document driver, the grammar reader, disambiguation, and the
//! structural invariants of the node-id map.

use mlang_ast::{AstNode, NodeId, NodeKind};
use mlang_lexer::{TokenKind, TokenSnapshot};
use mlang_parser::{try_parse, ParseOk, ParseSettings, ParserError, SyntaxError, SyntaxErrorKind};
use std::collections::BTreeSet;

fn parse(source: &str) -> ParseOk {
    let snapshot = TokenSnapshot::new(source).expect("lexing should succeed");
    try_parse(&ParseSettings::default(), &snapshot).expect("parsing should succeed")
}

fn parse_error(source: &str) -> SyntaxError {
    let snapshot = TokenSnapshot::new(source).expect("lexing should succeed");
    match try_parse(&ParseSettings::default(), &snapshot) {
        Err(ParserError::Syntax(error)) => error,
        Err(ParserError::Invariant(error)) => panic!("unexpected invariant failure: {}", error),
        Ok(_) => panic!("expected a parse failure for {:?}", source),
    }
}

fn node<'a>(ok: &'a ParseOk, id: NodeId) -> &'a AstNode {
    ok.node_id_map.ast_node(id).expect("node should exist")
}

fn root<'a>(ok: &'a ParseOk) -> &'a AstNode {
    node(ok, ok.root_id)
}

fn literal_of(ok: &ParseOk, id: NodeId) -> &str {
    node(ok, id).maybe_literal().expect("leaf literal")
}

/// A canonical rendering of the tree: kinds and literals in DFS order.
/// Ids are excluded on purpose so re-parses compare structurally.
fn structure(ok: &ParseOk) -> String {
    fn visit(ok: &ParseOk, id: NodeId, out: &mut String) {
        let current = node(ok, id);
        out.push_str(&format!("{:?}", current.kind()));
        if let Some(literal) = current.maybe_literal() {
            out.push_str(&format!("({})", literal));
        }
        out.push('[');
        for child in ok.node_id_map.child_ids(id) {
            visit(ok, *child, out);
            out.push(' ');
        }
        out.push(']');
    }
    let mut out = String::new();
    visit(ok, ok.root_id, &mut out);
    out
}

/// The node-id map invariants every successful parse must satisfy.
fn check_invariants(ok: &ParseOk) {
    let map = &ok.node_id_map;
    assert_eq!(map.context_node_count(), 0, "no contexts survive success");

    // Id coverage: ast ids equal the set reachable from the root.
    let mut reachable = BTreeSet::new();
    let mut stack = vec![ok.root_id];
    while let Some(id) = stack.pop() {
        assert!(reachable.insert(id), "node {} reached twice", id);
        stack.extend(map.child_ids(id).iter().copied());
    }
    let all_ids: BTreeSet<NodeId> = map.ast_ids().collect();
    assert_eq!(reachable, all_ids, "ast ids must equal the reachable set");

    // Parent symmetry, child ordering, and token ranges.
    for (child, parent) in map.parent_entries() {
        assert!(
            map.child_ids(parent).contains(&child),
            "child {} missing from parent {}'s list",
            child,
            parent
        );
    }
    for id in map.ast_ids() {
        let children = map.child_ids(id);
        let parent_range = node(ok, id).token_range();
        let mut previous_attribute = None;
        let mut previous_end = parent_range.token_index_start;
        let mut previous_id = None;
        for child in children {
            let child_node = node(ok, *child);
            let attribute = child_node.data().attribute_index;
            assert!(
                attribute > previous_attribute,
                "attribute indices must increase within {}",
                id
            );
            previous_attribute = attribute;

            let range = child_node.token_range();
            assert!(
                range.token_index_start >= previous_end,
                "sibling token ranges must be disjoint and increasing in {}",
                id
            );
            previous_end = range.token_index_end;
            assert!(
                parent_range.covers(&range),
                "parent {} must cover child {}",
                id,
                child
            );

            // Smaller token start implies smaller id among siblings.
            if let Some(previous) = previous_id {
                assert!(*child > previous, "sibling ids must increase in source order");
            }
            previous_id = Some(*child);
        }
    }

    // Leaf set correctness.
    let leaf_set: BTreeSet<NodeId> = map.leaf_node_ids().iter().copied().collect();
    let expected: BTreeSet<NodeId> = map
        .ast_nodes()
        .filter(|n| n.is_leaf())
        .map(|n| n.id())
        .collect();
    assert_eq!(leaf_set, expected);
    assert_eq!(ok.leaf_node_ids.len(), leaf_set.len());
}

// ============================================================================
// Core expression shapes
// ============================================================================

#[test]
fn if_expression_has_literal_children() {
    let ok = parse("if 1 then 2 else 3");
    let AstNode::IfExpression(if_expression) = root(&ok) else {
        panic!("expected an IfExpression root");
    };
    assert_eq!(literal_of(&ok, if_expression.condition), "1");
    assert_eq!(literal_of(&ok, if_expression.true_expression), "2");
    assert_eq!(literal_of(&ok, if_expression.false_expression), "3");
    assert_eq!(literal_of(&ok, if_expression.if_constant), "if");
    check_invariants(&ok);
}

#[test]
fn function_expression_with_one_parameter() {
    let ok = parse("(x) => x + 1");
    let AstNode::FunctionExpression(function) = root(&ok) else {
        panic!("expected a FunctionExpression root");
    };

    let AstNode::ParameterList(parameter_list) = node(&ok, function.parameter_list) else {
        panic!("expected a ParameterList");
    };
    let csvs = ok
        .node_id_map
        .array_elements(parameter_list.content)
        .expect("parameter array");
    assert_eq!(csvs.len(), 1);
    let parameter = ok.node_id_map.csv_content(csvs[0]).unwrap();
    let AstNode::Parameter(parameter) = node(&ok, parameter) else {
        panic!("expected a Parameter");
    };
    assert_eq!(literal_of(&ok, parameter.name), "x");
    assert!(parameter.maybe_optional_constant.is_none());

    assert_eq!(
        node(&ok, function.expression).kind(),
        NodeKind::ArithmeticExpression
    );
    check_invariants(&ok);
}

#[test]
fn record_expression_tracks_comma_presence() {
    let ok = parse("[a = 1, b = 2]");
    let AstNode::RecordExpression(record) = root(&ok) else {
        panic!("expected a RecordExpression root");
    };
    let csvs = ok
        .node_id_map
        .array_elements(record.content)
        .expect("record content");
    assert_eq!(csvs.len(), 2);

    let AstNode::Csv(first) = node(&ok, csvs[0]) else {
        panic!("expected a Csv");
    };
    let AstNode::Csv(second) = node(&ok, csvs[1]) else {
        panic!("expected a Csv");
    };
    assert!(first.maybe_comma_constant.is_some());
    assert!(second.maybe_comma_constant.is_none());

    let AstNode::GeneralizedIdentifierPairedExpression(pair) =
        node(&ok, first.node)
    else {
        panic!("expected a key-value pair");
    };
    assert_eq!(literal_of(&ok, pair.key), "a");
    check_invariants(&ok);
}

#[test]
fn try_otherwise_builds_invoke_expressions() {
    let ok = parse("try f() otherwise g()");
    let AstNode::ErrorHandlingExpression(handler) = root(&ok) else {
        panic!("expected an ErrorHandlingExpression root");
    };
    assert!(handler.maybe_otherwise_expression.is_some());

    let AstNode::RecursivePrimaryExpression(protected) =
        node(&ok, handler.protected_expression)
    else {
        panic!("expected a RecursivePrimaryExpression");
    };
    assert_eq!(
        node(&ok, protected.head).kind(),
        NodeKind::IdentifierExpression
    );
    let accesses = ok
        .node_id_map
        .array_elements(protected.recursive_expressions)
        .unwrap();
    assert_eq!(accesses.len(), 1);
    assert_eq!(node(&ok, accesses[0]).kind(), NodeKind::InvokeExpression);

    let otherwise = handler.maybe_otherwise_expression.unwrap();
    let AstNode::OtherwiseExpression(otherwise) = node(&ok, otherwise) else {
        panic!("expected an OtherwiseExpression");
    };
    assert_eq!(
        node(&ok, otherwise.paired).kind(),
        NodeKind::RecursivePrimaryExpression
    );
    check_invariants(&ok);
}

#[test]
fn let_expression_binds_variables() {
    let ok = parse("let x = 1, y = x in y");
    let AstNode::LetExpression(let_expression) = root(&ok) else {
        panic!("expected a LetExpression root");
    };
    let csvs = ok
        .node_id_map
        .array_elements(let_expression.variable_list)
        .unwrap();
    assert_eq!(csvs.len(), 2);
    check_invariants(&ok);
}

#[test]
fn ladder_folds_left_associatively_within_a_level() {
    // One arithmetic level: `1 + 2 * 3` folds as `(1 + 2) * 3`.
    let ok = parse("1 + 2 * 3");
    let AstNode::ArithmeticExpression(outer) = root(&ok) else {
        panic!("expected an ArithmeticExpression root");
    };
    assert_eq!(literal_of(&ok, outer.operator_constant), "*");
    assert_eq!(
        node(&ok, outer.left).kind(),
        NodeKind::ArithmeticExpression
    );
    assert_eq!(literal_of(&ok, outer.right), "3");

    let AstNode::ArithmeticExpression(inner) = node(&ok, outer.left) else {
        panic!("expected a nested ArithmeticExpression");
    };
    assert_eq!(literal_of(&ok, inner.left), "1");
    assert_eq!(literal_of(&ok, inner.right), "2");
    check_invariants(&ok);
}

#[test]
fn metadata_expression_and_collapse() {
    let ok = parse("1 meta [a = 1]");
    assert_eq!(root(&ok).kind(), NodeKind::MetadataExpression);
    check_invariants(&ok);

    // Without the suffix the metadata context collapses away entirely.
    let ok = parse("1");
    assert_eq!(root(&ok).kind(), NodeKind::LiteralExpression);
    check_invariants(&ok);
}

#[test]
fn unary_operator_sequences() {
    let ok = parse("- - not 1");
    let AstNode::UnaryExpression(unary) = root(&ok) else {
        panic!("expected a UnaryExpression root");
    };
    let operators = ok.node_id_map.array_elements(unary.operators).unwrap();
    assert_eq!(operators.len(), 3);
    assert_eq!(literal_of(&ok, unary.type_expression), "1");
    check_invariants(&ok);
}

#[test]
fn list_items_may_be_ranges() {
    let ok = parse("{1..3, 4}");
    let AstNode::ListExpression(list) = root(&ok) else {
        panic!("expected a ListExpression root");
    };
    let csvs = ok.node_id_map.array_elements(list.content).unwrap();
    assert_eq!(csvs.len(), 2);
    let first = ok.node_id_map.csv_content(csvs[0]).unwrap();
    assert_eq!(node(&ok, first).kind(), NodeKind::RangeExpression);
    let second = ok.node_id_map.csv_content(csvs[1]).unwrap();
    assert_eq!(node(&ok, second).kind(), NodeKind::LiteralExpression);
    check_invariants(&ok);
}

#[test]
fn empty_wrapped_contents() {
    check_invariants(&parse("{}"));
    check_invariants(&parse("[]"));
    check_invariants(&parse("f()"));
    check_invariants(&parse("() => 1"));
}

#[test]
fn hash_keywords_act_as_identifiers() {
    let ok = parse("#table({}, {})");
    let AstNode::RecursivePrimaryExpression(recursive) = root(&ok) else {
        panic!("expected a RecursivePrimaryExpression root");
    };
    let AstNode::IdentifierExpression(head) = node(&ok, recursive.head) else {
        panic!("expected an IdentifierExpression head");
    };
    assert_eq!(literal_of(&ok, head.identifier), "#table");
    check_invariants(&ok);
}

#[test]
fn item_access_and_field_access_chains() {
    let ok = parse("x{0}?[a][[b], [c]]");
    let AstNode::RecursivePrimaryExpression(recursive) = root(&ok) else {
        panic!("expected a RecursivePrimaryExpression root");
    };
    let accesses = ok
        .node_id_map
        .array_elements(recursive.recursive_expressions)
        .unwrap();
    assert_eq!(accesses.len(), 3);
    assert_eq!(node(&ok, accesses[0]).kind(), NodeKind::ItemAccessExpression);
    assert_eq!(node(&ok, accesses[1]).kind(), NodeKind::FieldSelector);
    assert_eq!(node(&ok, accesses[2]).kind(), NodeKind::FieldProjection);

    let AstNode::ItemAccessExpression(item_access) = node(&ok, accesses[0]) else {
        panic!("expected an ItemAccessExpression");
    };
    assert!(item_access.maybe_optional_constant.is_some());
    check_invariants(&ok);
}

// ============================================================================
// Generalized identifiers
// ============================================================================

#[test]
fn generalized_identifier_spans_contiguous_tokens() {
    // `1.a` lexes as two contiguous tokens; the record key glues them back.
    let ok = parse("[1.a = 2]");
    let AstNode::RecordExpression(record) = root(&ok) else {
        panic!("expected a RecordExpression root");
    };
    let csvs = ok.node_id_map.array_elements(record.content).unwrap();
    let pair = ok.node_id_map.csv_content(csvs[0]).unwrap();
    let AstNode::GeneralizedIdentifierPairedExpression(pair) = node(&ok, pair) else {
        panic!("expected a key-value pair");
    };
    assert_eq!(literal_of(&ok, pair.key), "1.a");
    check_invariants(&ok);
}

#[test]
fn generalized_identifier_of_digits() {
    let ok = parse("[1 = 2]");
    let AstNode::RecordExpression(record) = root(&ok) else {
        panic!("expected a RecordExpression root");
    };
    let csvs = ok.node_id_map.array_elements(record.content).unwrap();
    let pair = ok.node_id_map.csv_content(csvs[0]).unwrap();
    let AstNode::GeneralizedIdentifierPairedExpression(pair) = node(&ok, pair) else {
        panic!("expected a key-value pair");
    };
    let key = node(&ok, pair.key);
    assert_eq!(key.kind(), NodeKind::GeneralizedIdentifier);
    assert_eq!(key.maybe_literal(), Some("1"));
    check_invariants(&ok);
}

#[test]
fn whitespace_breaks_a_generalized_identifier() {
    // `a b` is two identifiers with a gap: the key stops at `a` and the
    // reader then fails looking for `=`.
    let error = parse_error("[a b = 1]");
    assert!(matches!(
        error.kind,
        SyntaxErrorKind::ExpectedTokenKind {
            expected: TokenKind::Equal,
            ..
        }
    ));
}

// ============================================================================
// Disambiguation
// ============================================================================

#[test]
fn parenthesis_disambiguation() {
    assert_eq!(parse("(x) => x").root_kind(), NodeKind::FunctionExpression);
    assert_eq!(
        parse("(x as number) => x").root_kind(),
        NodeKind::FunctionExpression
    );
    // Return annotation between `)` and `=>` still means a function.
    assert_eq!(
        parse("(x) as number => x").root_kind(),
        NodeKind::FunctionExpression
    );
    assert_eq!(
        parse("(1)").root_kind(),
        NodeKind::ParenthesizedExpression
    );
    // `as` with no arrow after the type is an as-expression.
    assert_eq!(parse("(1) as number").root_kind(), NodeKind::AsExpression);
}

trait RootKind {
    fn root_kind(&self) -> NodeKind;
}

impl RootKind for ParseOk {
    fn root_kind(&self) -> NodeKind {
        self.node_id_map.ast_node(self.root_id).unwrap().kind()
    }
}

#[test]
fn bracket_disambiguation() {
    assert_eq!(parse("[a = 1]").root_kind(), NodeKind::RecordExpression);
    assert_eq!(parse("[]").root_kind(), NodeKind::RecordExpression);
    assert_eq!(parse("[a]").root_kind(), NodeKind::FieldSelector);
    assert_eq!(parse("[a]?").root_kind(), NodeKind::FieldSelector);
    assert_eq!(parse("[[a], [b]]").root_kind(), NodeKind::FieldProjection);
}

#[test]
fn unterminated_parentheses_error() {
    let error = parse_error("if (x then 1 else 2");
    assert!(matches!(
        error.kind,
        SyntaxErrorKind::UnterminatedParentheses { .. }
    ));
}

#[test]
fn unterminated_bracket_error() {
    let error = parse_error("if [a then 1 else 2");
    assert!(matches!(
        error.kind,
        SyntaxErrorKind::UnterminatedBracket { .. }
    ));
}

// ============================================================================
// Types
// ============================================================================

#[test]
fn type_expressions_parse() {
    assert_eq!(parse("type number").root_kind(), NodeKind::TypePrimaryType);
    check_invariants(&parse("type [a = number, optional b = text]"));
    check_invariants(&parse("type {number}"));
    check_invariants(&parse("type nullable number"));
    check_invariants(&parse("type table [a = number]"));
    check_invariants(&parse("type function (x as number) as number"));
    check_invariants(&parse("x is number"));
    check_invariants(&parse("x as nullable number"));
    check_invariants(&parse("(x as nullable number) => x"));
}

#[test]
fn invalid_primitive_type_error() {
    let error = parse_error("x as foo");
    match error.kind {
        SyntaxErrorKind::InvalidPrimitiveType { literal, .. } => {
            assert_eq!(literal, "foo");
        }
        other => panic!("expected InvalidPrimitiveType, got {:?}", other),
    }
}

// ============================================================================
// Parameter lists
// ============================================================================

#[test]
fn optional_parameters_after_required_ones() {
    check_invariants(&parse("(x, optional y) => x"));
    check_invariants(&parse("(optional x, optional y) => 1"));
}

#[test]
fn required_parameter_after_optional_fails() {
    let error = parse_error("(optional x, y) => 1");
    assert!(matches!(
        error.kind,
        SyntaxErrorKind::RequiredParameterAfterOptional { .. }
    ));
}

// ============================================================================
// Document driver
// ============================================================================

#[test]
fn section_document_parses() {
    let ok = parse("section hello; shared x = 1; y = 2;");
    let AstNode::Section(section) = root(&ok) else {
        panic!("expected a Section root");
    };
    assert!(section.maybe_name.is_some());
    let members = ok.node_id_map.array_elements(section.members).unwrap();
    assert_eq!(members.len(), 2);

    let AstNode::SectionMember(first) = node(&ok, members[0]) else {
        panic!("expected a SectionMember");
    };
    assert!(first.maybe_shared_constant.is_some());
    let AstNode::SectionMember(second) = node(&ok, members[1]) else {
        panic!("expected a SectionMember");
    };
    assert!(second.maybe_shared_constant.is_none());
    check_invariants(&ok);
}

#[test]
fn malformed_section_keeps_its_context_tree() {
    let error = parse_error("section; shared ;");
    match &error.kind {
        SyntaxErrorKind::ExpectedTokenKind {
            expected: TokenKind::Identifier,
            maybe_found: Some(found),
        } => {
            assert_eq!(found.kind, TokenKind::Semicolon);
            assert_eq!(found.position_start.code_unit, 16);
        }
        other => panic!("expected ExpectedTokenKind(Identifier), got {:?}", other),
    }

    // The failed attempt's context tree survives, rooted at a Section node.
    assert!(error.node_id_map.context_node_count() > 0);
    let root_context = error
        .node_id_map
        .context_ids()
        .filter_map(|id| error.node_id_map.context_node(id))
        .find(|context| context.parent_id.is_none())
        .expect("a root context");
    assert_eq!(root_context.kind, NodeKind::Section);
}

#[test]
fn driver_prefers_the_attempt_that_consumed_more() {
    // The expression attempt consumed one token before discovering trailing
    // input; the section attempt died at token zero.
    let error = parse_error("1 2");
    assert!(matches!(
        error.kind,
        SyntaxErrorKind::UnusedTokensRemain { .. }
    ));
}

#[test]
fn document_retry_prefers_section_error_on_tie() {
    // Both attempts die at token zero; the section attempt's error is the
    // one reported.
    let error = parse_error(";");
    assert!(matches!(
        error.kind,
        SyntaxErrorKind::ExpectedTokenKind {
            expected: TokenKind::KeywordSection,
            ..
        }
    ));
}

#[test]
fn locale_threads_through_error_messages() {
    let error = parse_error("if 1 t");
    let message = error.message();
    assert!(message.contains("'then'"), "unexpected message: {}", message);
    assert!(message.contains("1:6"), "unexpected message: {}", message);
}

// ============================================================================
// Structural properties
// ============================================================================

#[test]
fn reparse_is_structurally_idempotent() {
    let sources = [
        "if 1 then 2 else 3",
        "(x) => x + 1",
        "[a = 1, b = [c = {1..2}]]",
        "try f(x, y) otherwise error \"boom\"",
        "let x = 1, y = x in each _ + y",
        "section s; shared x = 1;",
    ];
    for source in sources {
        assert_eq!(
            structure(&parse(source)),
            structure(&parse(source)),
            "re-parse of {:?} changed structure",
            source
        );
    }
}

#[test]
fn invariants_hold_across_grammar_coverage() {
    let sources = [
        "1",
        "x",
        "@x",
        "\"text\" & \"more\"",
        "1 + 2 - 3 * 4 / 5 & \"s\"",
        "1 < 2",
        "1 <> 2 = true",
        "not true or false and true",
        "x is number",
        "each [price] * 2",
        "error \"nope\"",
        "try 1",
        "...",
        "f(1)(2)",
        "x[a]?",
        "let x = (y) => y in x(1)",
        "if f() then [a = 1][a] else {1}{0}",
        "section s; x = 1; shared y = each _;",
    ];
    for source in sources {
        check_invariants(&parse(source));
    }
}
