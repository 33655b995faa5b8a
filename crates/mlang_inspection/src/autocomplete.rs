//! Keyword autocomplete.
//!
//! Works off a parse outcome and a cursor position. A failed parse knows
//! exactly which token kinds it expected, so those drive the suggestions; a
//! successful parse suggests expression-start keywords that extend the
//! identifier under the cursor. Either way the token ending at the cursor
//! prefix-filters the candidates.

use mlang_lexer::{Keyword, TokenKind, TokenSnapshot};
use mlang_parser::{ParserError, SyntaxErrorKind, TriedParse};

/// Keywords that could legally be typed at `position_code_unit`, sorted.
pub fn autocomplete_keyword(
    tried: &TriedParse,
    snapshot: &TokenSnapshot,
    position_code_unit: u32,
) -> Vec<Keyword> {
    let maybe_prefix = identifier_prefix_at(snapshot, position_code_unit);

    let candidates: Vec<Keyword> = match tried {
        Ok(_) => match maybe_prefix {
            // Only an identifier can still grow into a keyword.
            Some(_) => Keyword::EXPRESSION.to_vec(),
            None => Vec::new(),
        },
        Err(ParserError::Syntax(error)) => expected_keywords(&error.kind),
        Err(ParserError::Invariant(_)) => Vec::new(),
    };

    let mut keywords: Vec<Keyword> = match maybe_prefix {
        Some(prefix) => candidates
            .into_iter()
            .filter(|keyword| keyword.as_str().starts_with(&prefix))
            .collect(),
        None => candidates,
    };
    keywords.sort();
    keywords.dedup();
    keywords
}

/// The partial identifier the cursor sits at the end of, if any.
fn identifier_prefix_at(snapshot: &TokenSnapshot, position_code_unit: u32) -> Option<String> {
    let token = snapshot.tokens().iter().find(|token| {
        token.position_start.code_unit < position_code_unit
            && position_code_unit <= token.position_end.code_unit
    })?;
    if token.kind != TokenKind::Identifier {
        return None;
    }
    let length = (position_code_unit - token.position_start.code_unit) as usize;
    Some(token.data.chars().take(length).collect())
}

/// The keywords a failed parse said it expected.
fn expected_keywords(kind: &SyntaxErrorKind) -> Vec<Keyword> {
    match kind {
        SyntaxErrorKind::ExpectedTokenKind { expected, .. } => {
            expected.keyword().into_iter().collect()
        }
        SyntaxErrorKind::ExpectedAnyTokenKind { expected, .. } => expected
            .iter()
            .filter_map(|token_kind| token_kind.keyword())
            .collect(),
        _ => Vec::new(),
    }
}
