//! Bounded lookahead for the two ambiguous openings.
//!
//! A `(` may start a function expression head (`(params) => ...`) or a
//! parenthesized expression; a `[` may start a record, a field selection, or
//! a field projection. Both procedures classify the opening by scanning
//! forward over token kinds and leave the parser cursor untouched on return.

use crate::error::{ReadError, ReadResult, SyntaxErrorKind};
use crate::parser::Parser;
use mlang_lexer::TokenKind;

/// What a `(` opening turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParenthesisDisambiguation {
    FunctionExpression,
    ParenthesizedExpression,
}

/// What a `[` opening turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BracketDisambiguation {
    FieldProjection,
    FieldSelection,
    Record,
}

impl<'t> Parser<'t> {
    /// Classify the `(` under the cursor. Scans forward tracking parenthesis
    /// depth; at the matching `)` the following token decides: `=>` means a
    /// function expression, and `as` requires probing a nullable primitive
    /// type (under a state backup) to see whether `=>` follows the return
    /// annotation.
    pub(crate) fn disambiguate_parenthesis(&mut self) -> ReadResult<ParenthesisDisambiguation> {
        let open_position = self.current_position();
        let mut offset = 1usize;
        let mut depth = 1u32;
        while let Some(kind) = self.peek_token_kind(offset) {
            match kind {
                TokenKind::LeftParenthesis => depth += 1,
                TokenKind::RightParenthesis => {
                    depth -= 1;
                    if depth == 0 {
                        return match self.peek_token_kind(offset + 1) {
                            Some(TokenKind::FatArrow) => {
                                Ok(ParenthesisDisambiguation::FunctionExpression)
                            }
                            Some(TokenKind::KeywordAs) => {
                                self.probe_function_return_type(offset + 2)
                            }
                            _ => Ok(ParenthesisDisambiguation::ParenthesizedExpression),
                        };
                    }
                }
                _ => {}
            }
            offset += 1;
        }
        Err(ReadError::Syntax(SyntaxErrorKind::UnterminatedParentheses {
            open_position,
        }))
    }

    /// `(params) as <type> => ...` versus `(expr) as <type>`: consume a
    /// nullable primitive type from `type_offset` under a saved state, then
    /// check for `=>`. The backup is restored on every path.
    fn probe_function_return_type(
        &mut self,
        type_offset: usize,
    ) -> ReadResult<ParenthesisDisambiguation> {
        let backup = self.fast_state_backup();
        self.jump_ahead(type_offset);
        let outcome = self.read_nullable_primitive_type();
        let result = match outcome {
            Ok(_) => {
                if self.current_kind() == Some(TokenKind::FatArrow) {
                    ParenthesisDisambiguation::FunctionExpression
                } else {
                    ParenthesisDisambiguation::ParenthesizedExpression
                }
            }
            Err(ReadError::Syntax(_)) => ParenthesisDisambiguation::ParenthesizedExpression,
            Err(invariant) => {
                self.apply_fast_state_backup(&backup)?;
                return Err(invariant);
            }
        };
        self.apply_fast_state_backup(&backup)?;
        Ok(result)
    }

    /// Classify the `[` under the cursor. `[[` is a projection and `[]` a
    /// record; otherwise scan forward until `=` (record) or `]` (selection).
    /// The scan consumes nothing.
    pub(crate) fn disambiguate_bracket(&mut self) -> ReadResult<BracketDisambiguation> {
        let open_position = self.current_position();
        match self.peek_token_kind(1) {
            Some(TokenKind::LeftBracket) => return Ok(BracketDisambiguation::FieldProjection),
            Some(TokenKind::RightBracket) => return Ok(BracketDisambiguation::Record),
            None => {
                return Err(ReadError::Syntax(SyntaxErrorKind::UnterminatedBracket {
                    open_position,
                }))
            }
            Some(_) => {}
        }

        let mut offset = 1usize;
        loop {
            match self.peek_token_kind(offset) {
                Some(TokenKind::Equal) => return Ok(BracketDisambiguation::Record),
                Some(TokenKind::RightBracket) => return Ok(BracketDisambiguation::FieldSelection),
                Some(_) => offset += 1,
                None => {
                    return Err(ReadError::Syntax(SyntaxErrorKind::UnterminatedBracket {
                        open_position,
                    }))
                }
            }
        }
    }
}
