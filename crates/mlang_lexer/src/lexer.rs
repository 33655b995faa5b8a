//! The formula-language lexer.
//!
//! A single-pass character scanner that converts source text into the
//! immutable token snapshot the parser consumes. Positions are tracked in
//! code units with line/line-offset bookkeeping so every token carries a
//! human-readable location.

use crate::token::{Token, TokenKind};
use mlang_core::text::TokenPosition;
use mlang_diagnostics::{format_message, Locale};
use std::fmt;

/// The reason lexing failed.
#[derive(Debug, Clone)]
pub enum LexErrorKind {
    InvalidCharacter(char),
    UnterminatedText,
    UnterminatedComment,
    UnterminatedQuotedIdentifier,
    UnknownHashKeyword(String),
}

/// A lexing failure with the position it occurred at.
#[derive(Debug, Clone)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub position: TokenPosition,
}

impl LexError {
    fn new(kind: LexErrorKind, position: TokenPosition) -> Self {
        Self { kind, position }
    }

    pub fn message(&self, locale: Locale) -> String {
        let templates = locale.templates();
        let position = self.position.to_string();
        match &self.kind {
            LexErrorKind::InvalidCharacter(c) => format_message(
                templates.lex_invalid_character,
                &[&c.to_string(), &position],
            ),
            LexErrorKind::UnterminatedText => {
                format_message(templates.lex_unterminated_text, &[&position])
            }
            LexErrorKind::UnterminatedComment => {
                format_message(templates.lex_unterminated_comment, &[&position])
            }
            LexErrorKind::UnterminatedQuotedIdentifier => {
                format_message(templates.lex_unterminated_quoted_identifier, &[&position])
            }
            LexErrorKind::UnknownHashKeyword(text) => {
                format_message(templates.lex_unknown_hash_keyword, &[text, &position])
            }
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message(Locale::default()))
    }
}

impl std::error::Error for LexError {}

/// The immutable output of lexing: the source text plus its token vector.
///
/// Once built, a snapshot is never modified; any number of readers may share
/// it. Token indices into [`TokenSnapshot::tokens`] are used as identity
/// throughout the parser and the node-id map.
#[derive(Debug, Clone)]
pub struct TokenSnapshot {
    text: String,
    chars: Vec<char>,
    tokens: Vec<Token>,
}

impl TokenSnapshot {
    /// Lex `text` to completion, producing a snapshot or the first error.
    pub fn new(text: &str) -> Result<TokenSnapshot, LexError> {
        let chars: Vec<char> = text.chars().collect();
        let tokens = Lexer::new(&chars).tokenize()?;
        Ok(TokenSnapshot {
            text: text.to_string(),
            chars,
            tokens,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn token(&self, token_index: usize) -> Option<&Token> {
        self.tokens.get(token_index)
    }

    /// Slice the source between two absolute code-unit offsets.
    ///
    /// Used to reconstruct generalized identifier literals that span
    /// multiple contiguous tokens.
    pub fn slice(&self, code_unit_start: u32, code_unit_end: u32) -> String {
        self.chars[code_unit_start as usize..code_unit_end as usize]
            .iter()
            .collect()
    }
}

/// The scanner. Owns a cursor over the char vector and line bookkeeping.
struct Lexer<'a> {
    chars: &'a [char],
    pos: usize,
    line_number: u32,
    line_start: usize,
}

impl<'a> Lexer<'a> {
    fn new(chars: &'a [char]) -> Self {
        Self {
            chars,
            pos: 0,
            line_number: 0,
            line_start: 0,
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let Some(c) = self.peek() else {
                break;
            };
            tokens.push(self.read_token(c)?);
        }
        Ok(tokens)
    }

    // ========================================================================
    // Cursor
    // ========================================================================

    #[inline]
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    #[inline]
    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    /// Advance one character, updating line bookkeeping.
    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += 1;
            if c == '\n' {
                self.line_number += 1;
                self.line_start = self.pos;
            }
        }
    }

    fn position(&self) -> TokenPosition {
        TokenPosition::new(
            self.pos as u32,
            self.line_number,
            (self.pos - self.line_start) as u32,
        )
    }

    fn slice(&self, start: usize) -> String {
        self.chars[start..self.pos].iter().collect()
    }

    // ========================================================================
    // Trivia
    // ========================================================================

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => self.bump(),
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => self.skip_block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    /// Block comments nest.
    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        let start = self.position();
        self.bump();
        self.bump();
        let mut depth = 1u32;
        while depth > 0 {
            match (self.peek(), self.peek_at(1)) {
                (Some('/'), Some('*')) => {
                    depth += 1;
                    self.bump();
                    self.bump();
                }
                (Some('*'), Some('/')) => {
                    depth -= 1;
                    self.bump();
                    self.bump();
                }
                (Some(_), _) => self.bump(),
                (None, _) => {
                    return Err(LexError::new(LexErrorKind::UnterminatedComment, start));
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Tokens
    // ========================================================================

    fn read_token(&mut self, c: char) -> Result<Token, LexError> {
        let start = self.position();
        let start_pos = self.pos;

        let kind = match c {
            ',' => self.single(TokenKind::Comma),
            ';' => self.single(TokenKind::Semicolon),
            '(' => self.single(TokenKind::LeftParenthesis),
            ')' => self.single(TokenKind::RightParenthesis),
            '[' => self.single(TokenKind::LeftBracket),
            ']' => self.single(TokenKind::RightBracket),
            '{' => self.single(TokenKind::LeftBrace),
            '}' => self.single(TokenKind::RightBrace),
            '@' => self.single(TokenKind::AtSign),
            '&' => self.single(TokenKind::Ampersand),
            '*' => self.single(TokenKind::Asterisk),
            '+' => self.single(TokenKind::Plus),
            '-' => self.single(TokenKind::Minus),
            '/' => self.single(TokenKind::Division),
            '?' => {
                self.bump();
                if self.peek() == Some('?') {
                    self.bump();
                    TokenKind::NullCoalescingOperator
                } else {
                    TokenKind::QuestionMark
                }
            }
            '=' => {
                self.bump();
                if self.peek() == Some('>') {
                    self.bump();
                    TokenKind::FatArrow
                } else {
                    TokenKind::Equal
                }
            }
            '<' => {
                self.bump();
                match self.peek() {
                    Some('=') => {
                        self.bump();
                        TokenKind::LessThanEqualTo
                    }
                    Some('>') => {
                        self.bump();
                        TokenKind::NotEqual
                    }
                    _ => TokenKind::LessThan,
                }
            }
            '>' => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::GreaterThanEqualTo
                } else {
                    TokenKind::GreaterThan
                }
            }
            '.' => self.read_dot(start)?,
            '"' => self.read_text_literal(start)?,
            '#' => self.read_hash(start)?,
            '0'..='9' => self.read_numeric_literal(),
            c if is_identifier_start(c) => self.read_identifier_or_keyword(),
            other => {
                return Err(LexError::new(LexErrorKind::InvalidCharacter(other), start));
            }
        };

        let data = self.slice(start_pos);
        Ok(Token::new(kind, data, start, self.position()))
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn read_dot(&mut self, start: TokenPosition) -> Result<TokenKind, LexError> {
        if self.peek_at(1) == Some('.') {
            self.bump();
            self.bump();
            if self.peek() == Some('.') {
                self.bump();
                Ok(TokenKind::Ellipsis)
            } else {
                Ok(TokenKind::DotDot)
            }
        } else if matches!(self.peek_at(1), Some('0'..='9')) {
            Ok(self.read_numeric_literal())
        } else {
            Err(LexError::new(LexErrorKind::InvalidCharacter('.'), start))
        }
    }

    fn read_numeric_literal(&mut self) -> TokenKind {
        // 0x... hex literal
        if self.peek() == Some('0')
            && matches!(self.peek_at(1), Some('x') | Some('X'))
            && matches!(self.peek_at(2), Some(c) if c.is_ascii_hexdigit())
        {
            self.bump();
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.bump();
            }
            return TokenKind::HexLiteral;
        }

        while matches!(self.peek(), Some('0'..='9')) {
            self.bump();
        }
        // A fraction dot, but never the start of a '..' operator: `1..2` is
        // three tokens.
        if self.peek() == Some('.') && self.peek_at(1) != Some('.') {
            self.bump();
            while matches!(self.peek(), Some('0'..='9')) {
                self.bump();
            }
        }
        // Exponent, only when digits actually follow.
        if matches!(self.peek(), Some('e') | Some('E')) {
            let digits_at = match self.peek_at(1) {
                Some('+') | Some('-') => 2,
                _ => 1,
            };
            if matches!(self.peek_at(digits_at), Some('0'..='9')) {
                for _ in 0..digits_at {
                    self.bump();
                }
                while matches!(self.peek(), Some('0'..='9')) {
                    self.bump();
                }
            }
        }
        TokenKind::NumericLiteral
    }

    fn read_text_literal(&mut self, start: TokenPosition) -> Result<TokenKind, LexError> {
        self.bump();
        loop {
            match self.peek() {
                Some('"') => {
                    self.bump();
                    // "" is an escaped quote, not a terminator.
                    if self.peek() == Some('"') {
                        self.bump();
                    } else {
                        return Ok(TokenKind::TextLiteral);
                    }
                }
                Some(_) => self.bump(),
                None => return Err(LexError::new(LexErrorKind::UnterminatedText, start)),
            }
        }
    }

    /// `#"..."` quoted identifiers and `#date`-style hash keywords.
    fn read_hash(&mut self, start: TokenPosition) -> Result<TokenKind, LexError> {
        let start_pos = self.pos;
        self.bump();
        if self.peek() == Some('"') {
            self.bump();
            loop {
                match self.peek() {
                    Some('"') => {
                        self.bump();
                        if self.peek() == Some('"') {
                            self.bump();
                        } else {
                            return Ok(TokenKind::Identifier);
                        }
                    }
                    Some(_) => self.bump(),
                    None => {
                        return Err(LexError::new(
                            LexErrorKind::UnterminatedQuotedIdentifier,
                            start,
                        ));
                    }
                }
            }
        }

        while matches!(self.peek(), Some(c) if c.is_ascii_alphabetic()) {
            self.bump();
        }
        let text = self.slice(start_pos);
        TokenKind::from_hash_keyword_text(&text)
            .ok_or_else(|| LexError::new(LexErrorKind::UnknownHashKeyword(text), start))
    }

    fn read_identifier_or_keyword(&mut self) -> TokenKind {
        let start_pos = self.pos;
        self.bump();
        loop {
            match self.peek() {
                Some(c) if is_identifier_part(c) => self.bump(),
                // Dotted identifiers: the dot joins only when an identifier
                // character follows, so `a..b` stays three tokens.
                Some('.') if matches!(self.peek_at(1), Some(c) if is_identifier_part(c)) => {
                    self.bump();
                }
                _ => break,
            }
        }
        let text = self.slice(start_pos);
        TokenKind::from_keyword_text(&text).unwrap_or(TokenKind::Identifier)
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        TokenSnapshot::new(text)
            .unwrap()
            .tokens()
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_range_is_not_a_fraction() {
        assert_eq!(
            kinds("1..2"),
            vec![
                TokenKind::NumericLiteral,
                TokenKind::DotDot,
                TokenKind::NumericLiteral
            ]
        );
    }

    #[test]
    fn test_trailing_fraction_dot() {
        // `1.a` lexes as the numeric literal `1.` followed by an identifier.
        assert_eq!(kinds("1.a"), vec![TokenKind::NumericLiteral, TokenKind::Identifier]);
    }

    #[test]
    fn test_nested_block_comment() {
        assert_eq!(kinds("/* a /* b */ c */ 1"), vec![TokenKind::NumericLiteral]);
    }

    #[test]
    fn test_escaped_quote_in_text() {
        let snapshot = TokenSnapshot::new(r#""a""b""#).unwrap();
        assert_eq!(snapshot.tokens().len(), 1);
        assert_eq!(snapshot.tokens()[0].kind, TokenKind::TextLiteral);
        assert_eq!(snapshot.tokens()[0].data, r#""a""b""#);
    }

    #[test]
    fn test_line_positions() {
        let snapshot = TokenSnapshot::new("1\n  2").unwrap();
        let second = &snapshot.tokens()[1];
        assert_eq!(second.position_start.line_number, 1);
        assert_eq!(second.position_start.line_code_unit, 2);
        assert_eq!(second.position_start.code_unit, 4);
    }

    #[test]
    fn test_unknown_hash_keyword() {
        let err = TokenSnapshot::new("#bogus").unwrap_err();
        assert!(matches!(err.kind, LexErrorKind::UnknownHashKeyword(_)));
    }

    #[test]
    fn test_unterminated_text() {
        let err = TokenSnapshot::new("\"abc").unwrap_err();
        assert!(matches!(err.kind, LexErrorKind::UnterminatedText));
    }
}
