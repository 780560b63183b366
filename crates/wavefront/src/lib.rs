//! # Wavefront
//!
//! A table-driven top-down parser that accepts left-recursive grammars
//! directly.
//!
//! ## Overview
//!
//! Most LL-style matchers reject left recursion outright. Wavefront instead
//! precomputes every left-recursive cycle of the grammar and, when matching
//! reaches the lead rule of a recursion, runs a bounded widening loop: the
//! first pass matches only the non-recursive exits, and each further pass
//! re-traverses the lead with the previous result published in the match
//! cache, connecting re-entries to the previous pass instead of descending.
//! The matched range grows monotonically and is bounded by the token count,
//! so the loop terminates at the longest prefix the rule can match.
//!
//! Everything attempted along the way is recorded in an *appeal tree*; a
//! post-pass ("sort-out") reduces it to the single deterministic parse tree
//! (longest match, first-child tiebreak), patches in subtrees elided by
//! cache hits, and shrinks edges no grammar action addresses.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use wavefront::grammar::{Elem, GrammarBuilder};
//! use wavefront::lexer::{OpId, Token, VecTokenSource};
//! use wavefront::parser::Parser;
//!
//! // Add : ONEOF(Id, Add '+' Id) — directly left recursive.
//! let grammar = GrammarBuilder::new()
//!     .rule(
//!         "Add",
//!         Elem::one_of([
//!             Elem::rule("Id"),
//!             Elem::concat([Elem::rule("Add"), Elem::op(OpId::Add), Elem::rule("Id")]),
//!         ]),
//!     )
//!     .rule("Id", Elem::identifier())
//!     .top_rule("Add")
//!     .build()
//!     .unwrap();
//!
//! let source = VecTokenSource::single_line(vec![
//!     Token::ident("a"),
//!     Token::Operator(OpId::Add),
//!     Token::ident("b"),
//! ]);
//! let mut parser = Parser::new(&grammar, source);
//! let tree = parser.parse_statement().unwrap().expect("one statement");
//! assert_eq!(tree.node(tree.root()).end, 2);
//! ```
//!
//! ## Modules
//!
//! - [`grammar`] — rule tables, builder, recursion analysis, look-ahead
//! - [`lexer`] — the token model and the token-source interface
//! - [`parser`] — the matcher, wavefront driver, and sort-out
//! - [`tree`] — the owned parse tree handed to an AST factory
//! - [`error`] — grammar and parse errors

pub mod error;
pub mod grammar;
pub mod lexer;
pub mod parser;
pub mod tree;

pub use error::{GrammarError, ParseError};
pub use grammar::{Elem, Grammar, GrammarBuilder, RuleId, RuleKind};
pub use lexer::{Token, TokenSource, VecTokenSource};
pub use parser::{ParseMetrics, Parser, ParserConfig};
pub use tree::{Module, ParseTree, TreeNode, TreeNodeId};
