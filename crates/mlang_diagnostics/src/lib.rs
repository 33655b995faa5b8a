//! mlang_diagnostics: Message templates and error formatting infrastructure.
//!
//! Every user-facing error in the toolkit is rendered through a locale-keyed
//! template table. Templates carry `{0}`, `{1}`, ... placeholders that are
//! substituted with call-site arguments by [`format_message`].

use std::fmt;

/// A locale naming one entry in the template table.
///
/// Callers thread a `Locale` through settings; error types resolve their
/// message template against it at display time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Locale {
    #[default]
    EnUs,
}

impl Locale {
    /// The BCP-47 tag for this locale.
    pub fn tag(&self) -> &'static str {
        match self {
            Locale::EnUs => "en-US",
        }
    }

    /// Resolve the template table for this locale.
    pub fn templates(&self) -> &'static TemplateTable {
        match self {
            Locale::EnUs => &EN_US,
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// One message template per reportable failure. Adding a locale means adding
/// one more `TemplateTable` constant and a `Locale` variant.
#[derive(Debug)]
pub struct TemplateTable {
    pub invariant_failure: &'static str,
    pub expected_token_kind: &'static str,
    pub expected_any_token_kind: &'static str,
    pub invalid_primitive_type: &'static str,
    pub unused_tokens_remain: &'static str,
    pub unterminated_parentheses: &'static str,
    pub unterminated_bracket: &'static str,
    pub required_parameter_after_optional: &'static str,
    pub end_of_stream: &'static str,
    pub lex_invalid_character: &'static str,
    pub lex_unterminated_text: &'static str,
    pub lex_unterminated_comment: &'static str,
    pub lex_unterminated_quoted_identifier: &'static str,
    pub lex_unknown_hash_keyword: &'static str,
}

pub const EN_US: TemplateTable = TemplateTable {
    invariant_failure: "Internal invariant violated: {0}. Details: {1}",
    expected_token_kind: "Expected {0} at {1}, but found {2}.",
    expected_any_token_kind: "Expected one of {0} at {1}, but found {2}.",
    invalid_primitive_type: "'{0}' at {1} is not a primitive type.",
    unused_tokens_remain: "The document ended but unused tokens remain, starting at {0}.",
    unterminated_parentheses: "The parenthesis opened at {0} is never closed.",
    unterminated_bracket: "The bracket opened at {0} is never closed.",
    required_parameter_after_optional: "The required parameter at {0} follows an optional parameter.",
    end_of_stream: "Expected {0}, but the document ended.",
    lex_invalid_character: "Invalid character '{0}' at {1}.",
    lex_unterminated_text: "The text literal starting at {0} is never terminated.",
    lex_unterminated_comment: "The block comment starting at {0} is never terminated.",
    lex_unterminated_quoted_identifier: "The quoted identifier starting at {0} is never terminated.",
    lex_unknown_hash_keyword: "'{0}' at {1} is not a keyword.",
};

/// Format a message template by replacing `{0}`, `{1}`, etc. with arguments.
pub fn format_message(template: &str, args: &[&str]) -> String {
    let mut result = template.to_string();
    for (i, arg) in args.iter().enumerate() {
        result = result.replace(&format!("{{{}}}", i), arg);
    }
    result
}

/// A should-never-happen assertion failure.
///
/// Invariant failures are always fatal and are surfaced unmodified; no
/// caller is expected to recover from one.
#[derive(Debug, Clone)]
pub struct CommonError {
    /// What was violated.
    pub description: String,
    /// Call-site detail, already rendered.
    pub details: String,
}

impl CommonError {
    pub fn invariant(description: impl Into<String>, details: impl fmt::Debug) -> Self {
        Self {
            description: description.into(),
            details: format!("{:?}", details),
        }
    }

    pub fn message(&self, locale: Locale) -> String {
        format_message(
            locale.templates().invariant_failure,
            &[&self.description, &self.details],
        )
    }
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message(Locale::default()))
    }
}

impl std::error::Error for CommonError {}
