//! mlang_parser: Recursive descent parser for the mlang formula language.
//!
//! The entry point is [`try_parse`]. A document has two legal shapes — an
//! expression or a section — and the driver tries the expression start
//! first, retrying from token zero with a fresh context tree on failure.
//! When both attempts fail, the error from whichever attempt consumed more
//! tokens wins, on the theory that it got closer to what the user meant.

mod context;
mod disambiguation;
mod error;
mod parser;

pub use error::{ParserError, SyntaxError, SyntaxErrorKind, TokenSummary};

use error::ReadError;
use mlang_ast::{NodeId, NodeIdMapCollection};
use mlang_diagnostics::{CommonError, Locale};
use mlang_lexer::TokenSnapshot;
use parser::Parser;

/// Parse-time settings. `locale` selects the message-template table used to
/// render any resulting error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseSettings {
    pub locale: Locale,
}

/// The published result of a successful parse: the document root, the
/// finalized node-id map, and the leaf ids in source order. All three are
/// immutable from here on and may be shared freely.
#[derive(Debug, Clone)]
pub struct ParseOk {
    pub root_id: NodeId,
    pub node_id_map: NodeIdMapCollection,
    pub leaf_node_ids: Vec<NodeId>,
}

/// The outcome of [`try_parse`].
pub type TriedParse = Result<ParseOk, ParserError>;

#[derive(Debug, Clone, Copy)]
enum StartProduction {
    Expression,
    Section,
}

/// Parse a token snapshot as a document.
pub fn try_parse(settings: &ParseSettings, snapshot: &TokenSnapshot) -> TriedParse {
    let expression_error = match run_attempt(settings, snapshot, StartProduction::Expression) {
        Ok(ok) => return Ok(ok),
        Err(AttemptError::Invariant(err)) => return Err(ParserError::Invariant(err)),
        Err(AttemptError::Syntax(err)) => err,
    };

    match run_attempt(settings, snapshot, StartProduction::Section) {
        Ok(ok) => Ok(ok),
        Err(AttemptError::Invariant(err)) => Err(ParserError::Invariant(err)),
        Err(AttemptError::Syntax(section_error)) => {
            // Larger consumed-token count wins; the section attempt wins ties.
            let winner = if section_error.tokens_consumed >= expression_error.tokens_consumed {
                section_error
            } else {
                expression_error
            };
            Err(ParserError::Syntax(winner))
        }
    }
}

enum AttemptError {
    Invariant(CommonError),
    Syntax(SyntaxError),
}

fn run_attempt(
    settings: &ParseSettings,
    snapshot: &TokenSnapshot,
    start: StartProduction,
) -> Result<ParseOk, AttemptError> {
    let mut parser = Parser::new(settings, snapshot);
    let read = match start {
        StartProduction::Expression => parser.read_expression(),
        StartProduction::Section => parser.read_section(),
    };
    match read {
        Err(ReadError::Invariant(err)) => Err(AttemptError::Invariant(err)),
        Err(ReadError::Syntax(kind)) => Err(AttemptError::Syntax(parser.into_syntax_error(kind))),
        Ok(_) => match parser.maybe_current_token_summary() {
            // A successful start production must consume the whole document.
            Some(first_unused) => {
                let kind = SyntaxErrorKind::UnusedTokensRemain { first_unused };
                Err(AttemptError::Syntax(parser.into_syntax_error(kind)))
            }
            None => parser.into_parse_ok().map_err(AttemptError::Invariant),
        },
    }
}
