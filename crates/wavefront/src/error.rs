//! # Error Types
//!
//! Error types for grammar construction and parsing.
//!
//! Two families exist:
//!
//! - [`GrammarError`]: raised while building a [`Grammar`](crate::grammar::Grammar).
//!   A grammar either loads completely or not at all; no error of this family
//!   can occur at parse time.
//! - [`ParseError`]: raised by the parse driver. Local match failures are
//!   ordinary control flow inside the matcher and never surface here; what
//!   does surface is illegal input, top-level grammar ambiguity, or a broken
//!   internal invariant (which indicates corrupted grammar or recursion data).

use thiserror::Error;

/// Errors raised while constructing a grammar.
#[derive(Debug, Clone, Error)]
pub enum GrammarError {
    #[error("rule '{0}' is referenced but never defined")]
    UndefinedRule(String),

    #[error("rule '{0}' is defined more than once")]
    DuplicateRule(String),

    #[error("rule '{0}' has no children")]
    EmptyRule(String),

    #[error("no top rule configured")]
    NoTopRule,

    #[error("recursion table for '{rule}' is malformed: {reason}")]
    BadRecursionTable { rule: String, reason: String },
}

/// Errors raised by the parse driver.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// No top rule matched at the current cursor. The cursor is restored to
    /// the statement start before this is returned.
    #[error("illegal syntax at line {line}, token {token}")]
    IllegalSyntax { line: u32, token: u32 },

    /// A non-recursive top rule committed to more than one end position.
    #[error("ambiguous parse: top rule '{rule}' admits {count} matches at token {start}")]
    TopLevelAmbiguity {
        rule: String,
        start: u32,
        count: usize,
    },

    /// An internal invariant did not hold, e.g. sort-out could not find a
    /// child realizing a required end position.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}
