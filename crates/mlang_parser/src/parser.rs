//! The formula-language parser.
//!
//! A recursive descent parser over an immutable token snapshot. Every
//! production opens a context node, reads its children in order, and either
//! promotes the context to a finished Ast node or deletes it (collapsing
//! into its single child). The node-id map is built as a side effect and is
//! the only owner of node storage.

use crate::context::ContextState;
use crate::disambiguation::{BracketDisambiguation, ParenthesisDisambiguation};
use crate::error::{ReadError, ReadResult, SyntaxError, SyntaxErrorKind, TokenSummary};
use crate::{ParseOk, ParseSettings};
use mlang_ast::node::{
    ArrayWrapper, BinOpExpression, Constant, Csv, ErrorHandlingExpression, FieldSpecification,
    FieldTypeSpecification, FunctionExpression, FunctionType, Identifier, IdentifierExpression,
    IfExpression, KeyValuePair, LetExpression, LiteralExpression, LiteralKind, NodeData,
    NotImplementedExpression, PairedConstant, Parameter, PrimitiveType, PrimitiveTypeKind,
    RecordType, RecursivePrimaryExpression, Section, SectionMember, TableType, UnaryExpression,
    Wrapped,
};
use mlang_ast::{AstNode, NodeId, NodeKind};
use mlang_core::text::{TokenPosition, TokenRange};
use mlang_diagnostics::{CommonError, Locale};
use mlang_lexer::{Token, TokenKind, TokenSnapshot};

/// A captured parser state: token cursor plus the context-tree watermark.
/// Restoring rewinds the cursor and discards everything built afterwards.
#[derive(Debug)]
pub(crate) struct FastStateBackup {
    token_index: usize,
    context: crate::context::ContextBackup,
}

const LOGICAL_OPERATORS: &[TokenKind] = &[TokenKind::KeywordAnd, TokenKind::KeywordOr];
const EQUALITY_OPERATORS: &[TokenKind] = &[TokenKind::Equal, TokenKind::NotEqual];
const RELATIONAL_OPERATORS: &[TokenKind] = &[
    TokenKind::LessThan,
    TokenKind::LessThanEqualTo,
    TokenKind::GreaterThan,
    TokenKind::GreaterThanEqualTo,
];
const ARITHMETIC_OPERATORS: &[TokenKind] = &[
    TokenKind::Plus,
    TokenKind::Minus,
    TokenKind::Ampersand,
    TokenKind::Asterisk,
    TokenKind::Division,
];
const UNARY_OPERATORS: &[TokenKind] = &[TokenKind::Plus, TokenKind::Minus, TokenKind::KeywordNot];
const LITERAL_TOKEN_KINDS: &[TokenKind] = &[
    TokenKind::NumericLiteral,
    TokenKind::HexLiteral,
    TokenKind::TextLiteral,
    TokenKind::KeywordTrue,
    TokenKind::KeywordFalse,
    TokenKind::NullLiteral,
];
const PRIMITIVE_TYPE_START_KINDS: &[TokenKind] = &[
    TokenKind::Identifier,
    TokenKind::KeywordType,
    TokenKind::NullLiteral,
];

/// The parser. Exclusively owned by one `try_parse` attempt; never shared.
pub(crate) struct Parser<'t> {
    snapshot: &'t TokenSnapshot,
    tokens: &'t [Token],
    token_index: usize,
    // Denormalized for hot reads.
    maybe_current_token: Option<&'t Token>,
    maybe_current_kind: Option<TokenKind>,
    context: ContextState,
    locale: Locale,
}

impl<'t> Parser<'t> {
    pub fn new(settings: &ParseSettings, snapshot: &'t TokenSnapshot) -> Self {
        let tokens = snapshot.tokens();
        Self {
            snapshot,
            tokens,
            token_index: 0,
            maybe_current_token: tokens.first(),
            maybe_current_kind: tokens.first().map(|token| token.kind),
            context: ContextState::new(),
            locale: settings.locale,
        }
    }

    // ========================================================================
    // Token cursor
    // ========================================================================

    #[inline]
    pub(crate) fn current_kind(&self) -> Option<TokenKind> {
        self.maybe_current_kind
    }

    #[inline]
    fn is_on(&self, kind: TokenKind) -> bool {
        self.maybe_current_kind == Some(kind)
    }

    #[inline]
    fn is_on_any(&self, kinds: &[TokenKind]) -> bool {
        match self.maybe_current_kind {
            Some(kind) => kinds.contains(&kind),
            None => false,
        }
    }

    fn is_on_identifier_literal(&self, literal: &str) -> bool {
        self.is_on(TokenKind::Identifier)
            && self.maybe_current_token.map(|token| token.data.as_str()) == Some(literal)
    }

    /// The kind of the token `offset` positions ahead of the cursor.
    #[inline]
    pub(crate) fn peek_token_kind(&self, offset: usize) -> Option<TokenKind> {
        self.tokens.get(self.token_index + offset).map(|t| t.kind)
    }

    fn refresh(&mut self) {
        self.maybe_current_token = self.tokens.get(self.token_index);
        self.maybe_current_kind = self.maybe_current_token.map(|token| token.kind);
    }

    fn advance(&mut self) {
        self.token_index += 1;
        self.refresh();
    }

    fn jump_to(&mut self, token_index: usize) {
        self.token_index = token_index;
        self.refresh();
    }

    /// Move the cursor `offset` tokens forward. Only the parenthesis
    /// disambiguator's probe uses this, always under a state backup.
    pub(crate) fn jump_ahead(&mut self, offset: usize) {
        self.jump_to(self.token_index + offset);
    }

    /// A position for error reporting: the current token's start, or the
    /// end of the last token once the stream is exhausted.
    pub(crate) fn current_position(&self) -> TokenPosition {
        match self.maybe_current_token {
            Some(token) => token.position_start,
            None => self
                .tokens
                .last()
                .map(|token| token.position_end)
                .unwrap_or_else(TokenPosition::start),
        }
    }

    pub(crate) fn maybe_current_token_summary(&self) -> Option<TokenSummary> {
        self.maybe_current_token.map(TokenSummary::from)
    }

    fn expected(&self, expected: TokenKind) -> ReadError {
        ReadError::Syntax(SyntaxErrorKind::ExpectedTokenKind {
            expected,
            maybe_found: self.maybe_current_token_summary(),
        })
    }

    fn expected_any(&self, expected: &'static [TokenKind]) -> ReadError {
        ReadError::Syntax(SyntaxErrorKind::ExpectedAnyTokenKind {
            expected,
            maybe_found: self.maybe_current_token_summary(),
        })
    }

    // ========================================================================
    // Reader primitives
    // ========================================================================

    /// Consume the current token and return its raw text. Reading past the
    /// end of the stream is an invariant failure: callers check first.
    fn read_token(&mut self) -> ReadResult<String> {
        let token = self.maybe_current_token.ok_or_else(|| {
            CommonError::invariant("read past the end of the token stream", self.token_index)
        })?;
        let data = token.data.clone();
        self.advance();
        Ok(data)
    }

    /// Read a token of the given kind as a single-token Constant node.
    fn read_token_kind_as_constant(&mut self, kind: TokenKind) -> ReadResult<NodeId> {
        if !self.is_on(kind) {
            return Err(self.expected(kind));
        }
        self.read_current_token_as_constant()
    }

    /// Read the current token as a Constant node; the caller has already
    /// verified its kind.
    fn read_current_token_as_constant(&mut self) -> ReadResult<NodeId> {
        self.start_context(NodeKind::Constant)?;
        let literal = self.read_token()?;
        self.finish(|data| AstNode::Constant(Constant { data, literal }))
    }

    /// The `maybe` variant: on a kind mismatch the attribute counter still
    /// advances so later child slots keep stable indices.
    fn maybe_read_token_kind_as_constant(&mut self, kind: TokenKind) -> ReadResult<Option<NodeId>> {
        if self.is_on(kind) {
            Ok(Some(self.read_current_token_as_constant()?))
        } else {
            self.context.increment_attribute_counter()?;
            Ok(None)
        }
    }

    /// Contextual keywords (`optional`, `nullable`, `table`, `function`) are
    /// plain identifiers; these helpers match on their text.
    fn read_identifier_literal_as_constant(&mut self, literal: &str) -> ReadResult<NodeId> {
        if !self.is_on_identifier_literal(literal) {
            return Err(self.expected(TokenKind::Identifier));
        }
        self.read_current_token_as_constant()
    }

    fn maybe_read_identifier_literal_as_constant(
        &mut self,
        literal: &str,
    ) -> ReadResult<Option<NodeId>> {
        if self.is_on_identifier_literal(literal) {
            Ok(Some(self.read_current_token_as_constant()?))
        } else {
            self.context.increment_attribute_counter()?;
            Ok(None)
        }
    }

    // ========================================================================
    // Context plumbing
    // ========================================================================

    fn start_context(&mut self, kind: NodeKind) -> ReadResult<NodeId> {
        Ok(self.context.start(kind, self.token_index as u32)?)
    }

    /// Open a context that adopts an already-parsed head node as its first
    /// child. The context takes over the head's slot and token start.
    fn start_context_with_head(&mut self, kind: NodeKind, head: NodeId) -> ReadResult<()> {
        let head_token_start = self
            .context
            .collection
            .expect_ast_node(head)?
            .token_range()
            .token_index_start;
        self.context.start(kind, self.token_index as u32)?;
        self.context.attach_head(head, head_token_start)?;
        Ok(())
    }

    /// Seal the current context into a finished node. The node data carries
    /// the sealed token range ending at the current cursor.
    fn finish(&mut self, build: impl FnOnce(NodeData) -> AstNode) -> ReadResult<NodeId> {
        let context = self.context.current_context()?;
        let data = NodeData {
            id: context.id,
            kind: context.kind,
            attribute_index: context.attribute_index,
            token_range: TokenRange::new(context.token_index_start, self.token_index as u32),
            is_leaf: context.kind.is_leaf_kind(),
        };
        Ok(self.context.end(build(data))?)
    }

    fn delete_context(&mut self) -> ReadResult<Option<NodeId>> {
        Ok(self.context.delete()?)
    }

    pub(crate) fn fast_state_backup(&self) -> FastStateBackup {
        FastStateBackup {
            token_index: self.token_index,
            context: self.context.backup(),
        }
    }

    pub(crate) fn apply_fast_state_backup(&mut self, backup: &FastStateBackup) -> ReadResult<()> {
        self.context.rollback(&backup.context)?;
        self.jump_to(backup.token_index);
        Ok(())
    }

    // ========================================================================
    // Finalization — used by the document driver
    // ========================================================================

    pub(crate) fn into_syntax_error(self, kind: SyntaxErrorKind) -> SyntaxError {
        SyntaxError {
            kind,
            tokens_consumed: self.token_index as u32,
            node_id_map: self.context.into_collection(),
            locale: self.locale,
        }
    }

    pub(crate) fn into_parse_ok(self) -> Result<ParseOk, CommonError> {
        let root_id = self
            .context
            .root_id()
            .ok_or_else(|| CommonError::invariant("successful parse produced no root", ()))?;
        let node_id_map = self.context.into_collection();
        if node_id_map.context_node_count() != 0 {
            return Err(CommonError::invariant(
                "successful parse left contexts open",
                node_id_map.context_node_count(),
            ));
        }
        let leaf_node_ids = node_id_map.leaf_node_ids().to_vec();
        Ok(ParseOk {
            root_id,
            node_id_map,
            leaf_node_ids,
        })
    }

    // ========================================================================
    // Document
    // ========================================================================

    /// The expression-document start production.
    pub(crate) fn read_expression(&mut self) -> ReadResult<NodeId> {
        match self.maybe_current_kind {
            Some(TokenKind::KeywordEach) => self.read_each_expression(),
            Some(TokenKind::KeywordLet) => self.read_let_expression(),
            Some(TokenKind::KeywordIf) => self.read_if_expression(),
            Some(TokenKind::KeywordError) => self.read_error_raising_expression(),
            Some(TokenKind::KeywordTry) => self.read_error_handling_expression(),
            Some(TokenKind::LeftParenthesis) => match self.disambiguate_parenthesis()? {
                ParenthesisDisambiguation::FunctionExpression => self.read_function_expression(),
                ParenthesisDisambiguation::ParenthesizedExpression => {
                    self.read_logical_expression()
                }
            },
            _ => self.read_logical_expression(),
        }
    }

    /// The section-document start production.
    pub(crate) fn read_section(&mut self) -> ReadResult<NodeId> {
        self.start_context(NodeKind::Section)?;
        let section_constant = self.read_token_kind_as_constant(TokenKind::KeywordSection)?;
        let maybe_name = if self.is_on(TokenKind::Identifier) {
            Some(self.read_identifier()?)
        } else {
            self.context.increment_attribute_counter()?;
            None
        };
        let semicolon_constant = self.read_token_kind_as_constant(TokenKind::Semicolon)?;

        self.start_context(NodeKind::ArrayWrapper)?;
        let mut elements = Vec::new();
        while self.maybe_current_kind.is_some() {
            elements.push(self.read_section_member()?);
        }
        let members = self.finish(|data| AstNode::ArrayWrapper(ArrayWrapper { data, elements }))?;

        self.finish(|data| {
            AstNode::Section(Section {
                data,
                section_constant,
                maybe_name,
                semicolon_constant,
                members,
            })
        })
    }

    fn read_section_member(&mut self) -> ReadResult<NodeId> {
        self.start_context(NodeKind::SectionMember)?;
        let maybe_shared_constant =
            self.maybe_read_token_kind_as_constant(TokenKind::KeywordShared)?;
        let key_value_pair = self.read_key_value_pair(
            NodeKind::IdentifierPairedExpression,
            AstNode::IdentifierPairedExpression,
            Self::read_identifier,
        )?;
        let semicolon_constant = self.read_token_kind_as_constant(TokenKind::Semicolon)?;
        self.finish(|data| {
            AstNode::SectionMember(SectionMember {
                data,
                maybe_shared_constant,
                key_value_pair,
                semicolon_constant,
            })
        })
    }

    // ========================================================================
    // Binary operator ladder (lowest precedence first)
    // ========================================================================

    /// `operand (op operand)*`, folded left-associatively. Each fold opens a
    /// context that adopts the accumulated left side as its head.
    fn read_bin_op_expression(
        &mut self,
        kind: NodeKind,
        wrap: fn(BinOpExpression) -> AstNode,
        operators: &'static [TokenKind],
        read_left: fn(&mut Self) -> ReadResult<NodeId>,
        read_right: fn(&mut Self) -> ReadResult<NodeId>,
    ) -> ReadResult<NodeId> {
        let mut left = read_left(self)?;
        while self.is_on_any(operators) {
            self.start_context_with_head(kind, left)?;
            let operator_constant = self.read_current_token_as_constant()?;
            let right = read_right(self)?;
            left = self.finish(|data| {
                wrap(BinOpExpression {
                    data,
                    left,
                    operator_constant,
                    right,
                })
            })?;
        }
        Ok(left)
    }

    fn read_logical_expression(&mut self) -> ReadResult<NodeId> {
        self.read_bin_op_expression(
            NodeKind::LogicalExpression,
            AstNode::LogicalExpression,
            LOGICAL_OPERATORS,
            Self::read_is_expression,
            Self::read_is_expression,
        )
    }

    fn read_is_expression(&mut self) -> ReadResult<NodeId> {
        self.read_bin_op_expression(
            NodeKind::IsExpression,
            AstNode::IsExpression,
            &[TokenKind::KeywordIs],
            Self::read_as_expression,
            Self::read_nullable_primitive_type,
        )
    }

    fn read_as_expression(&mut self) -> ReadResult<NodeId> {
        self.read_bin_op_expression(
            NodeKind::AsExpression,
            AstNode::AsExpression,
            &[TokenKind::KeywordAs],
            Self::read_equality_expression,
            Self::read_nullable_primitive_type,
        )
    }

    fn read_equality_expression(&mut self) -> ReadResult<NodeId> {
        self.read_bin_op_expression(
            NodeKind::EqualityExpression,
            AstNode::EqualityExpression,
            EQUALITY_OPERATORS,
            Self::read_relational_expression,
            Self::read_relational_expression,
        )
    }

    fn read_relational_expression(&mut self) -> ReadResult<NodeId> {
        self.read_bin_op_expression(
            NodeKind::RelationalExpression,
            AstNode::RelationalExpression,
            RELATIONAL_OPERATORS,
            Self::read_arithmetic_expression,
            Self::read_arithmetic_expression,
        )
    }

    fn read_arithmetic_expression(&mut self) -> ReadResult<NodeId> {
        self.read_bin_op_expression(
            NodeKind::ArithmeticExpression,
            AstNode::ArithmeticExpression,
            ARITHMETIC_OPERATORS,
            Self::read_metadata_expression,
            Self::read_metadata_expression,
        )
    }

    /// `unary (meta unary)?` — right-associative with a single optional
    /// suffix. Without the suffix the context collapses into its operand.
    fn read_metadata_expression(&mut self) -> ReadResult<NodeId> {
        self.start_context(NodeKind::MetadataExpression)?;
        let left = self.read_unary_expression()?;
        if self.is_on(TokenKind::KeywordMeta) {
            let operator_constant = self.read_token_kind_as_constant(TokenKind::KeywordMeta)?;
            let right = self.read_unary_expression()?;
            self.finish(|data| {
                AstNode::MetadataExpression(BinOpExpression {
                    data,
                    left,
                    operator_constant,
                    right,
                })
            })
        } else {
            self.delete_context()?;
            Ok(left)
        }
    }

    fn read_unary_expression(&mut self) -> ReadResult<NodeId> {
        if !self.is_on_any(UNARY_OPERATORS) {
            return self.read_type_expression();
        }
        self.start_context(NodeKind::UnaryExpression)?;
        self.start_context(NodeKind::ArrayWrapper)?;
        let mut elements = Vec::new();
        while self.is_on_any(UNARY_OPERATORS) {
            elements.push(self.read_current_token_as_constant()?);
        }
        let operators = self.finish(|data| AstNode::ArrayWrapper(ArrayWrapper { data, elements }))?;
        let type_expression = self.read_type_expression()?;
        self.finish(|data| {
            AstNode::UnaryExpression(UnaryExpression {
                data,
                operators,
                type_expression,
            })
        })
    }

    // ========================================================================
    // Keyword expressions
    // ========================================================================

    fn read_paired_constant(
        &mut self,
        kind: NodeKind,
        constant_kind: TokenKind,
        wrap: fn(PairedConstant) -> AstNode,
        read_paired: fn(&mut Self) -> ReadResult<NodeId>,
    ) -> ReadResult<NodeId> {
        self.start_context(kind)?;
        let constant = self.read_token_kind_as_constant(constant_kind)?;
        let paired = read_paired(self)?;
        self.finish(|data| {
            wrap(PairedConstant {
                data,
                constant,
                paired,
            })
        })
    }

    fn read_each_expression(&mut self) -> ReadResult<NodeId> {
        self.read_paired_constant(
            NodeKind::EachExpression,
            TokenKind::KeywordEach,
            AstNode::EachExpression,
            Self::read_expression,
        )
    }

    fn read_error_raising_expression(&mut self) -> ReadResult<NodeId> {
        self.read_paired_constant(
            NodeKind::ErrorRaisingExpression,
            TokenKind::KeywordError,
            AstNode::ErrorRaisingExpression,
            Self::read_expression,
        )
    }

    fn read_error_handling_expression(&mut self) -> ReadResult<NodeId> {
        self.start_context(NodeKind::ErrorHandlingExpression)?;
        let try_constant = self.read_token_kind_as_constant(TokenKind::KeywordTry)?;
        let protected_expression = self.read_expression()?;
        let maybe_otherwise_expression = if self.is_on(TokenKind::KeywordOtherwise) {
            Some(self.read_paired_constant(
                NodeKind::OtherwiseExpression,
                TokenKind::KeywordOtherwise,
                AstNode::OtherwiseExpression,
                Self::read_expression,
            )?)
        } else {
            self.context.increment_attribute_counter()?;
            None
        };
        self.finish(|data| {
            AstNode::ErrorHandlingExpression(ErrorHandlingExpression {
                data,
                try_constant,
                protected_expression,
                maybe_otherwise_expression,
            })
        })
    }

    fn read_if_expression(&mut self) -> ReadResult<NodeId> {
        self.start_context(NodeKind::IfExpression)?;
        let if_constant = self.read_token_kind_as_constant(TokenKind::KeywordIf)?;
        let condition = self.read_expression()?;
        let then_constant = self.read_token_kind_as_constant(TokenKind::KeywordThen)?;
        let true_expression = self.read_expression()?;
        let else_constant = self.read_token_kind_as_constant(TokenKind::KeywordElse)?;
        let false_expression = self.read_expression()?;
        self.finish(|data| {
            AstNode::IfExpression(IfExpression {
                data,
                if_constant,
                condition,
                then_constant,
                true_expression,
                else_constant,
                false_expression,
            })
        })
    }

    fn read_let_expression(&mut self) -> ReadResult<NodeId> {
        self.start_context(NodeKind::LetExpression)?;
        let let_constant = self.read_token_kind_as_constant(TokenKind::KeywordLet)?;
        let variable_list = self.read_csv_array(
            |parser| {
                parser.read_key_value_pair(
                    NodeKind::IdentifierPairedExpression,
                    AstNode::IdentifierPairedExpression,
                    Self::read_identifier,
                )
            },
            TokenKind::KeywordIn,
        )?;
        let in_constant = self.read_token_kind_as_constant(TokenKind::KeywordIn)?;
        let expression = self.read_expression()?;
        self.finish(|data| {
            AstNode::LetExpression(LetExpression {
                data,
                let_constant,
                variable_list,
                in_constant,
                expression,
            })
        })
    }

    fn read_function_expression(&mut self) -> ReadResult<NodeId> {
        self.start_context(NodeKind::FunctionExpression)?;
        let parameter_list = self.read_parameter_list(Self::maybe_read_expression_parameter_type)?;
        let maybe_return_type = if self.is_on(TokenKind::KeywordAs) {
            Some(self.read_as_nullable_primitive_type()?)
        } else {
            self.context.increment_attribute_counter()?;
            None
        };
        let fat_arrow_constant = self.read_token_kind_as_constant(TokenKind::FatArrow)?;
        let expression = self.read_expression()?;
        self.finish(|data| {
            AstNode::FunctionExpression(FunctionExpression {
                data,
                parameter_list,
                maybe_return_type,
                fat_arrow_constant,
                expression,
            })
        })
    }

    // ========================================================================
    // Primary expressions
    // ========================================================================

    fn read_primary_expression(&mut self) -> ReadResult<NodeId> {
        let head = match self.maybe_current_kind {
            Some(TokenKind::AtSign) | Some(TokenKind::Identifier) => {
                self.read_identifier_expression()?
            }
            Some(TokenKind::LeftParenthesis) => self.read_parenthesized_expression()?,
            Some(TokenKind::LeftBracket) => match self.disambiguate_bracket()? {
                BracketDisambiguation::FieldProjection => self.read_field_projection()?,
                BracketDisambiguation::FieldSelection => self.read_field_selector(true)?,
                BracketDisambiguation::Record => self.read_record_expression()?,
            },
            Some(TokenKind::LeftBrace) => self.read_list_expression()?,
            Some(TokenKind::Ellipsis) => self.read_not_implemented_expression()?,
            Some(kind) if kind.is_hash_keyword() => self.read_keyword_as_identifier_expression()?,
            _ => self.read_literal_expression()?,
        };

        if self.is_on_any(&[
            TokenKind::LeftParenthesis,
            TokenKind::LeftBracket,
            TokenKind::LeftBrace,
        ]) {
            self.read_recursive_primary_expression(head)
        } else {
            Ok(head)
        }
    }

    /// The head primary is already emitted; adopt it as the first child and
    /// read the invoke/item-access/field-access chain.
    fn read_recursive_primary_expression(&mut self, head: NodeId) -> ReadResult<NodeId> {
        self.start_context_with_head(NodeKind::RecursivePrimaryExpression, head)?;

        self.start_context(NodeKind::ArrayWrapper)?;
        let mut elements = Vec::new();
        loop {
            match self.maybe_current_kind {
                Some(TokenKind::LeftParenthesis) => elements.push(self.read_invoke_expression()?),
                Some(TokenKind::LeftBracket) => match self.disambiguate_bracket()? {
                    BracketDisambiguation::FieldProjection => {
                        elements.push(self.read_field_projection()?)
                    }
                    _ => elements.push(self.read_field_selector(true)?),
                },
                Some(TokenKind::LeftBrace) => elements.push(self.read_item_access_expression()?),
                _ => break,
            }
        }
        let recursive_expressions =
            self.finish(|data| AstNode::ArrayWrapper(ArrayWrapper { data, elements }))?;

        self.finish(|data| {
            AstNode::RecursivePrimaryExpression(RecursivePrimaryExpression {
                data,
                head,
                recursive_expressions,
            })
        })
    }

    fn read_identifier_expression(&mut self) -> ReadResult<NodeId> {
        self.start_context(NodeKind::IdentifierExpression)?;
        let maybe_inclusive_constant = self.maybe_read_token_kind_as_constant(TokenKind::AtSign)?;
        let identifier = self.read_identifier()?;
        self.finish(|data| {
            AstNode::IdentifierExpression(IdentifierExpression {
                data,
                maybe_inclusive_constant,
                identifier,
            })
        })
    }

    /// Keywords like `#table` act as identifiers in primary position.
    fn read_keyword_as_identifier_expression(&mut self) -> ReadResult<NodeId> {
        self.start_context(NodeKind::IdentifierExpression)?;
        // No inclusive-@ slot for keyword identifiers.
        self.context.increment_attribute_counter()?;
        self.start_context(NodeKind::Identifier)?;
        let literal = self.read_token()?;
        let identifier = self.finish(|data| AstNode::Identifier(Identifier { data, literal }))?;
        self.finish(|data| {
            AstNode::IdentifierExpression(IdentifierExpression {
                data,
                maybe_inclusive_constant: None,
                identifier,
            })
        })
    }

    fn read_identifier(&mut self) -> ReadResult<NodeId> {
        if !self.is_on(TokenKind::Identifier) {
            return Err(self.expected(TokenKind::Identifier));
        }
        self.start_context(NodeKind::Identifier)?;
        let literal = self.read_token()?;
        self.finish(|data| AstNode::Identifier(Identifier { data, literal }))
    }

    /// Generalized identifiers accept a run of contiguous identifier-like
    /// tokens with no whitespace between them. The literal is reconstructed
    /// by slicing the source between the first and last token. A run that is
    /// a single all-digit numeric token is admitted as well.
    fn read_generalized_identifier(&mut self) -> ReadResult<NodeId> {
        let on_component = self
            .maybe_current_kind
            .map_or(false, |kind| kind.is_generalized_identifier_component());
        if !on_component {
            return Err(self.expected_any(&[TokenKind::Identifier]));
        }

        let first = self.token_index;
        let mut end = first + 1;
        while let Some(token) = self.tokens.get(end) {
            if !token.kind.is_generalized_identifier_component() {
                break;
            }
            let previous = &self.tokens[end - 1];
            if token.position_start.code_unit != previous.position_end.code_unit {
                break;
            }
            end += 1;
        }

        self.start_context(NodeKind::GeneralizedIdentifier)?;
        let literal = self.snapshot.slice(
            self.tokens[first].position_start.code_unit,
            self.tokens[end - 1].position_end.code_unit,
        );
        self.jump_to(end);
        self.finish(|data| AstNode::GeneralizedIdentifier(Identifier { data, literal }))
    }

    fn read_literal_expression(&mut self) -> ReadResult<NodeId> {
        let literal_kind = match self.maybe_current_kind {
            Some(TokenKind::NumericLiteral) | Some(TokenKind::HexLiteral) => LiteralKind::Numeric,
            Some(TokenKind::TextLiteral) => LiteralKind::Text,
            Some(TokenKind::KeywordTrue) | Some(TokenKind::KeywordFalse) => LiteralKind::Logical,
            Some(TokenKind::NullLiteral) => LiteralKind::Null,
            _ => return Err(self.expected_any(LITERAL_TOKEN_KINDS)),
        };
        self.start_context(NodeKind::LiteralExpression)?;
        let literal = self.read_token()?;
        self.finish(|data| {
            AstNode::LiteralExpression(LiteralExpression {
                data,
                literal,
                literal_kind,
            })
        })
    }

    fn read_not_implemented_expression(&mut self) -> ReadResult<NodeId> {
        self.start_context(NodeKind::NotImplementedExpression)?;
        let ellipsis_constant = self.read_token_kind_as_constant(TokenKind::Ellipsis)?;
        self.finish(|data| {
            AstNode::NotImplementedExpression(NotImplementedExpression {
                data,
                ellipsis_constant,
            })
        })
    }

    // ========================================================================
    // Wrapped readers
    // ========================================================================

    fn read_wrapped(
        &mut self,
        kind: NodeKind,
        wrap: fn(Wrapped) -> AstNode,
        open: TokenKind,
        read_content: impl FnOnce(&mut Self) -> ReadResult<NodeId>,
        close: TokenKind,
        allow_optional: bool,
    ) -> ReadResult<NodeId> {
        self.start_context(kind)?;
        let open_constant = self.read_token_kind_as_constant(open)?;
        let content = read_content(self)?;
        let close_constant = self.read_token_kind_as_constant(close)?;
        let maybe_optional_constant = if allow_optional {
            self.maybe_read_token_kind_as_constant(TokenKind::QuestionMark)?
        } else {
            None
        };
        self.finish(|data| {
            wrap(Wrapped {
                data,
                open_constant,
                content,
                close_constant,
                maybe_optional_constant,
            })
        })
    }

    fn read_parenthesized_expression(&mut self) -> ReadResult<NodeId> {
        self.read_wrapped(
            NodeKind::ParenthesizedExpression,
            AstNode::ParenthesizedExpression,
            TokenKind::LeftParenthesis,
            |parser| parser.read_expression(),
            TokenKind::RightParenthesis,
            false,
        )
    }

    fn read_invoke_expression(&mut self) -> ReadResult<NodeId> {
        self.read_wrapped(
            NodeKind::InvokeExpression,
            AstNode::InvokeExpression,
            TokenKind::LeftParenthesis,
            |parser| parser.read_csv_array(Self::read_expression, TokenKind::RightParenthesis),
            TokenKind::RightParenthesis,
            false,
        )
    }

    fn read_list_expression(&mut self) -> ReadResult<NodeId> {
        self.read_wrapped(
            NodeKind::ListExpression,
            AstNode::ListExpression,
            TokenKind::LeftBrace,
            |parser| parser.read_csv_array(Self::read_list_item, TokenKind::RightBrace),
            TokenKind::RightBrace,
            false,
        )
    }

    /// A list item is `expression (".." expression)?`.
    fn read_list_item(&mut self) -> ReadResult<NodeId> {
        self.start_context(NodeKind::RangeExpression)?;
        let left = self.read_expression()?;
        if self.is_on(TokenKind::DotDot) {
            let operator_constant = self.read_token_kind_as_constant(TokenKind::DotDot)?;
            let right = self.read_expression()?;
            self.finish(|data| {
                AstNode::RangeExpression(BinOpExpression {
                    data,
                    left,
                    operator_constant,
                    right,
                })
            })
        } else {
            self.delete_context()?;
            Ok(left)
        }
    }

    fn read_record_expression(&mut self) -> ReadResult<NodeId> {
        self.read_wrapped(
            NodeKind::RecordExpression,
            AstNode::RecordExpression,
            TokenKind::LeftBracket,
            |parser| {
                parser.read_csv_array(
                    |p| {
                        p.read_key_value_pair(
                            NodeKind::GeneralizedIdentifierPairedExpression,
                            AstNode::GeneralizedIdentifierPairedExpression,
                            Self::read_generalized_identifier,
                        )
                    },
                    TokenKind::RightBracket,
                )
            },
            TokenKind::RightBracket,
            false,
        )
    }

    fn read_item_access_expression(&mut self) -> ReadResult<NodeId> {
        self.read_wrapped(
            NodeKind::ItemAccessExpression,
            AstNode::ItemAccessExpression,
            TokenKind::LeftBrace,
            |parser| parser.read_expression(),
            TokenKind::RightBrace,
            true,
        )
    }

    fn read_field_selector(&mut self, allow_optional: bool) -> ReadResult<NodeId> {
        self.read_wrapped(
            NodeKind::FieldSelector,
            AstNode::FieldSelector,
            TokenKind::LeftBracket,
            |parser| parser.read_generalized_identifier(),
            TokenKind::RightBracket,
            allow_optional,
        )
    }

    fn read_field_projection(&mut self) -> ReadResult<NodeId> {
        self.read_wrapped(
            NodeKind::FieldProjection,
            AstNode::FieldProjection,
            TokenKind::LeftBracket,
            |parser| {
                parser.read_csv_array(|p| p.read_field_selector(false), TokenKind::RightBracket)
            },
            TokenKind::RightBracket,
            true,
        )
    }

    // ========================================================================
    // Csv and key-value readers
    // ========================================================================

    /// `value (',' value)*` with an optional trailing comma, emitted as an
    /// ArrayWrapper of Csv nodes each recording its own comma.
    fn read_csv_array(
        &mut self,
        read_element: impl Fn(&mut Self) -> ReadResult<NodeId>,
        terminator: TokenKind,
    ) -> ReadResult<NodeId> {
        self.start_context(NodeKind::ArrayWrapper)?;
        let mut elements = Vec::new();
        loop {
            if self.is_on(terminator) {
                break;
            }
            self.start_context(NodeKind::Csv)?;
            let node = read_element(self)?;
            let maybe_comma_constant = self.maybe_read_token_kind_as_constant(TokenKind::Comma)?;
            let has_comma = maybe_comma_constant.is_some();
            let csv = self.finish(|data| {
                AstNode::Csv(Csv {
                    data,
                    node,
                    maybe_comma_constant,
                })
            })?;
            elements.push(csv);
            if !has_comma {
                break;
            }
        }
        self.finish(|data| AstNode::ArrayWrapper(ArrayWrapper { data, elements }))
    }

    fn read_key_value_pair(
        &mut self,
        kind: NodeKind,
        wrap: fn(KeyValuePair) -> AstNode,
        read_key: fn(&mut Self) -> ReadResult<NodeId>,
    ) -> ReadResult<NodeId> {
        self.start_context(kind)?;
        let key = read_key(self)?;
        let equal_constant = self.read_token_kind_as_constant(TokenKind::Equal)?;
        let value = self.read_expression()?;
        self.finish(|data| {
            wrap(KeyValuePair {
                data,
                key,
                equal_constant,
                value,
            })
        })
    }

    // ========================================================================
    // Parameter lists
    // ========================================================================

    /// `( param (, param)* )`. Once an optional parameter has been seen,
    /// every subsequent parameter must be optional too.
    fn read_parameter_list(
        &mut self,
        read_parameter_type: fn(&mut Self) -> ReadResult<Option<NodeId>>,
    ) -> ReadResult<NodeId> {
        self.start_context(NodeKind::ParameterList)?;
        let open_constant = self.read_token_kind_as_constant(TokenKind::LeftParenthesis)?;

        self.start_context(NodeKind::ArrayWrapper)?;
        let mut elements = Vec::new();
        let mut seen_optional = false;
        loop {
            if self.is_on(TokenKind::RightParenthesis) {
                break;
            }
            let parameter_position = self.current_position();
            self.start_context(NodeKind::Csv)?;
            self.start_context(NodeKind::Parameter)?;
            let maybe_optional_constant =
                self.maybe_read_identifier_literal_as_constant("optional")?;
            if maybe_optional_constant.is_none() && seen_optional {
                return Err(ReadError::Syntax(
                    SyntaxErrorKind::RequiredParameterAfterOptional {
                        position: parameter_position,
                    },
                ));
            }
            seen_optional |= maybe_optional_constant.is_some();
            let name = self.read_identifier()?;
            let maybe_parameter_type = read_parameter_type(self)?;
            let parameter = self.finish(|data| {
                AstNode::Parameter(Parameter {
                    data,
                    maybe_optional_constant,
                    name,
                    maybe_parameter_type,
                })
            })?;
            let maybe_comma_constant = self.maybe_read_token_kind_as_constant(TokenKind::Comma)?;
            let has_comma = maybe_comma_constant.is_some();
            let csv = self.finish(|data| {
                AstNode::Csv(Csv {
                    data,
                    node: parameter,
                    maybe_comma_constant,
                })
            })?;
            elements.push(csv);
            if !has_comma {
                break;
            }
        }
        let content = self.finish(|data| AstNode::ArrayWrapper(ArrayWrapper { data, elements }))?;

        let close_constant = self.read_token_kind_as_constant(TokenKind::RightParenthesis)?;
        self.finish(|data| {
            AstNode::ParameterList(Wrapped {
                data,
                open_constant,
                content,
                close_constant,
                maybe_optional_constant: None,
            })
        })
    }

    /// Expression-function parameters may carry `as <nullable primitive
    /// type>`; the annotation is optional.
    fn maybe_read_expression_parameter_type(&mut self) -> ReadResult<Option<NodeId>> {
        if self.is_on(TokenKind::KeywordAs) {
            Ok(Some(self.read_as_nullable_primitive_type()?))
        } else {
            self.context.increment_attribute_counter()?;
            Ok(None)
        }
    }

    /// Function-type parameters require the annotation.
    fn read_required_parameter_type(&mut self) -> ReadResult<Option<NodeId>> {
        Ok(Some(self.read_as_nullable_primitive_type()?))
    }

    fn read_as_nullable_primitive_type(&mut self) -> ReadResult<NodeId> {
        self.read_paired_constant(
            NodeKind::AsNullablePrimitiveType,
            TokenKind::KeywordAs,
            AstNode::AsNullablePrimitiveType,
            Self::read_nullable_primitive_type,
        )
    }

    // ========================================================================
    // Types
    // ========================================================================

    /// `type <primary type>`, or a primary expression.
    fn read_type_expression(&mut self) -> ReadResult<NodeId> {
        if self.is_on(TokenKind::KeywordType) {
            self.read_paired_constant(
                NodeKind::TypePrimaryType,
                TokenKind::KeywordType,
                AstNode::TypePrimaryType,
                Self::read_primary_type,
            )
        } else {
            self.read_primary_expression()
        }
    }

    /// A type in annotation position: attempt a primary type, and on a
    /// syntax failure restore the backup and fall back to a primary
    /// expression.
    fn read_type(&mut self) -> ReadResult<NodeId> {
        let backup = self.fast_state_backup();
        match self.read_primary_type() {
            Ok(id) => Ok(id),
            Err(ReadError::Syntax(_)) => {
                self.apply_fast_state_backup(&backup)?;
                self.read_primary_expression()
            }
            Err(invariant) => Err(invariant),
        }
    }

    pub(crate) fn read_primary_type(&mut self) -> ReadResult<NodeId> {
        match self.maybe_current_kind {
            Some(TokenKind::LeftBracket) => self.read_record_type(),
            Some(TokenKind::LeftBrace) => self.read_list_type(),
            Some(TokenKind::Identifier) if self.is_on_identifier_literal("function")
                && self.peek_token_kind(1) == Some(TokenKind::LeftParenthesis) =>
            {
                self.read_function_type()
            }
            Some(TokenKind::Identifier) if self.is_on_identifier_literal("table")
                && self.peek_token_kind(1) == Some(TokenKind::LeftBracket) =>
            {
                self.read_table_type()
            }
            Some(TokenKind::Identifier) if self.is_on_identifier_literal("nullable") => {
                self.start_context(NodeKind::NullableType)?;
                let constant = self.read_identifier_literal_as_constant("nullable")?;
                let paired = self.read_type()?;
                self.finish(|data| {
                    AstNode::NullableType(PairedConstant {
                        data,
                        constant,
                        paired,
                    })
                })
            }
            _ => self.read_primitive_type(),
        }
    }

    /// The primitive type whitelist. On a non-whitelisted identifier the
    /// state backup is restored before the error returns, so the caller can
    /// try alternatives with an untouched cursor.
    pub(crate) fn read_primitive_type(&mut self) -> ReadResult<NodeId> {
        let backup = self.fast_state_backup();
        match self.maybe_current_kind {
            Some(TokenKind::KeywordType) => {
                self.start_context(NodeKind::PrimitiveType)?;
                let literal = self.read_token()?;
                self.finish(|data| {
                    AstNode::PrimitiveType(PrimitiveType {
                        data,
                        literal,
                        primitive_kind: PrimitiveTypeKind::Type,
                    })
                })
            }
            Some(TokenKind::NullLiteral) => {
                self.start_context(NodeKind::PrimitiveType)?;
                let literal = self.read_token()?;
                self.finish(|data| {
                    AstNode::PrimitiveType(PrimitiveType {
                        data,
                        literal,
                        primitive_kind: PrimitiveTypeKind::Null,
                    })
                })
            }
            Some(TokenKind::Identifier) => {
                let position = self.current_position();
                self.start_context(NodeKind::PrimitiveType)?;
                let literal = self.read_token()?;
                match PrimitiveTypeKind::from_identifier_literal(&literal) {
                    Some(primitive_kind) => self.finish(|data| {
                        AstNode::PrimitiveType(PrimitiveType {
                            data,
                            literal,
                            primitive_kind,
                        })
                    }),
                    None => {
                        self.apply_fast_state_backup(&backup)?;
                        Err(ReadError::Syntax(SyntaxErrorKind::InvalidPrimitiveType {
                            literal,
                            position,
                        }))
                    }
                }
            }
            _ => Err(self.expected_any(PRIMITIVE_TYPE_START_KINDS)),
        }
    }

    pub(crate) fn read_nullable_primitive_type(&mut self) -> ReadResult<NodeId> {
        if self.is_on_identifier_literal("nullable") {
            self.start_context(NodeKind::NullablePrimitiveType)?;
            let constant = self.read_identifier_literal_as_constant("nullable")?;
            let paired = self.read_primitive_type()?;
            self.finish(|data| {
                AstNode::NullablePrimitiveType(PairedConstant {
                    data,
                    constant,
                    paired,
                })
            })
        } else {
            self.read_primitive_type()
        }
    }

    fn read_record_type(&mut self) -> ReadResult<NodeId> {
        self.start_context(NodeKind::RecordType)?;
        let fields = self.read_field_specification_list()?;
        self.finish(|data| AstNode::RecordType(RecordType { data, fields }))
    }

    fn read_list_type(&mut self) -> ReadResult<NodeId> {
        self.read_wrapped(
            NodeKind::ListType,
            AstNode::ListType,
            TokenKind::LeftBrace,
            |parser| parser.read_type(),
            TokenKind::RightBrace,
            false,
        )
    }

    fn read_table_type(&mut self) -> ReadResult<NodeId> {
        self.start_context(NodeKind::TableType)?;
        let table_constant = self.read_identifier_literal_as_constant("table")?;
        let row_type = self.read_field_specification_list()?;
        self.finish(|data| {
            AstNode::TableType(TableType {
                data,
                table_constant,
                row_type,
            })
        })
    }

    fn read_function_type(&mut self) -> ReadResult<NodeId> {
        self.start_context(NodeKind::FunctionType)?;
        let function_constant = self.read_identifier_literal_as_constant("function")?;
        let parameter_list = self.read_parameter_list(Self::read_required_parameter_type)?;
        let return_type = self.read_as_nullable_primitive_type()?;
        self.finish(|data| {
            AstNode::FunctionType(FunctionType {
                data,
                function_constant,
                parameter_list,
                return_type,
            })
        })
    }

    fn read_field_specification_list(&mut self) -> ReadResult<NodeId> {
        self.read_wrapped(
            NodeKind::FieldSpecificationList,
            AstNode::FieldSpecificationList,
            TokenKind::LeftBracket,
            |parser| parser.read_csv_array(Self::read_field_specification, TokenKind::RightBracket),
            TokenKind::RightBracket,
            false,
        )
    }

    fn read_field_specification(&mut self) -> ReadResult<NodeId> {
        self.start_context(NodeKind::FieldSpecification)?;
        let maybe_optional_constant = self.maybe_read_identifier_literal_as_constant("optional")?;
        let name = self.read_generalized_identifier()?;
        let maybe_field_type = if self.is_on(TokenKind::Equal) {
            self.start_context(NodeKind::FieldTypeSpecification)?;
            let equal_constant = self.read_token_kind_as_constant(TokenKind::Equal)?;
            let field_type = self.read_type()?;
            Some(self.finish(|data| {
                AstNode::FieldTypeSpecification(FieldTypeSpecification {
                    data,
                    equal_constant,
                    field_type,
                })
            })?)
        } else {
            self.context.increment_attribute_counter()?;
            None
        };
        self.finish(|data| {
            AstNode::FieldSpecification(FieldSpecification {
                data,
                maybe_optional_constant,
                name,
                maybe_field_type,
            })
        })
    }
}
