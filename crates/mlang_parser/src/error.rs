//! Parse error definitions.
//!
//! Grammar readers signal failure with a [`SyntaxErrorKind`]; the document
//! driver wraps the winning failure with the partial context tree so tooling
//! can inspect what was parsed before the error. Invariant failures pass
//! through unmodified — they are always fatal.

use mlang_ast::NodeIdMapCollection;
use mlang_core::text::TokenPosition;
use mlang_diagnostics::{format_message, CommonError, Locale};
use mlang_lexer::{Token, TokenKind};
use std::fmt;

/// A detached copy of the token a failure occurred at.
#[derive(Debug, Clone)]
pub struct TokenSummary {
    pub kind: TokenKind,
    pub data: String,
    pub position_start: TokenPosition,
}

impl From<&Token> for TokenSummary {
    fn from(token: &Token) -> Self {
        Self {
            kind: token.kind,
            data: token.data.clone(),
            position_start: token.position_start,
        }
    }
}

/// The category of a syntax failure.
#[derive(Debug, Clone)]
pub enum SyntaxErrorKind {
    /// The parser expected one specific token kind. `maybe_found` is `None`
    /// when the token stream ended instead.
    ExpectedTokenKind {
        expected: TokenKind,
        maybe_found: Option<TokenSummary>,
    },
    /// Disjunctive form of `ExpectedTokenKind`.
    ExpectedAnyTokenKind {
        expected: &'static [TokenKind],
        maybe_found: Option<TokenSummary>,
    },
    /// An identifier in primitive-type position is not in the whitelist.
    InvalidPrimitiveType {
        literal: String,
        position: TokenPosition,
    },
    /// Parsing succeeded but tokens follow the document.
    UnusedTokensRemain { first_unused: TokenSummary },
    /// The parenthesis disambiguator reached the end of the stream.
    UnterminatedParentheses { open_position: TokenPosition },
    /// The bracket disambiguator reached the end of the stream.
    UnterminatedBracket { open_position: TokenPosition },
    /// A required parameter follows an optional one.
    RequiredParameterAfterOptional { position: TokenPosition },
}

impl SyntaxErrorKind {
    pub fn message(&self, locale: Locale) -> String {
        let templates = locale.templates();
        match self {
            SyntaxErrorKind::ExpectedTokenKind {
                expected,
                maybe_found,
            } => match maybe_found {
                Some(found) => format_message(
                    templates.expected_token_kind,
                    &[
                        &expected.to_string(),
                        &found.position_start.to_string(),
                        &found.kind.to_string(),
                    ],
                ),
                None => format_message(templates.end_of_stream, &[&expected.to_string()]),
            },
            SyntaxErrorKind::ExpectedAnyTokenKind {
                expected,
                maybe_found,
            } => {
                let expected_list = expected
                    .iter()
                    .map(|kind| kind.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                match maybe_found {
                    Some(found) => format_message(
                        templates.expected_any_token_kind,
                        &[
                            &expected_list,
                            &found.position_start.to_string(),
                            &found.kind.to_string(),
                        ],
                    ),
                    None => format_message(templates.end_of_stream, &[&expected_list]),
                }
            }
            SyntaxErrorKind::InvalidPrimitiveType { literal, position } => format_message(
                templates.invalid_primitive_type,
                &[literal, &position.to_string()],
            ),
            SyntaxErrorKind::UnusedTokensRemain { first_unused } => format_message(
                templates.unused_tokens_remain,
                &[&first_unused.position_start.to_string()],
            ),
            SyntaxErrorKind::UnterminatedParentheses { open_position } => format_message(
                templates.unterminated_parentheses,
                &[&open_position.to_string()],
            ),
            SyntaxErrorKind::UnterminatedBracket { open_position } => format_message(
                templates.unterminated_bracket,
                &[&open_position.to_string()],
            ),
            SyntaxErrorKind::RequiredParameterAfterOptional { position } => format_message(
                templates.required_parameter_after_optional,
                &[&position.to_string()],
            ),
        }
    }
}

/// A syntax failure, wrapped with what the parser built before failing.
///
/// `node_id_map` retains the context nodes that were still open at the
/// failure point, so editor tooling can inspect the partial parse.
#[derive(Debug, Clone)]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    /// How many tokens the failing attempt consumed. The document driver
    /// ranks competing attempts by this count.
    pub tokens_consumed: u32,
    pub node_id_map: NodeIdMapCollection,
    pub locale: Locale,
}

impl SyntaxError {
    pub fn message(&self) -> String {
        self.kind.message(self.locale)
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for SyntaxError {}

/// The error type of `try_parse`.
#[derive(Debug, Clone)]
pub enum ParserError {
    /// A should-never-happen assertion, surfaced unmodified.
    Invariant(CommonError),
    /// A plain parse failure.
    Syntax(SyntaxError),
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParserError::Invariant(err) => write!(f, "{}", err),
            ParserError::Syntax(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ParserError {}

impl From<CommonError> for ParserError {
    fn from(err: CommonError) -> Self {
        ParserError::Invariant(err)
    }
}

/// The failure type grammar readers propagate with `?`. Converted into a
/// [`ParserError`] at the document driver, which attaches the context tree.
#[derive(Debug)]
pub(crate) enum ReadError {
    Invariant(CommonError),
    Syntax(SyntaxErrorKind),
}

impl From<CommonError> for ReadError {
    fn from(err: CommonError) -> Self {
        ReadError::Invariant(err)
    }
}

impl From<SyntaxErrorKind> for ReadError {
    fn from(kind: SyntaxErrorKind) -> Self {
        ReadError::Syntax(kind)
    }
}

pub(crate) type ReadResult<T> = Result<T, ReadError>;
