//! # Parser
//!
//! The matcher and its driver.
//!
//! ## Overview
//!
//! [`Parser`] owns everything one parse needs: the token vector and cursor,
//! the appeal-node arena, the match cache and failed set, and the stack of
//! live wavefronts. The grammar is borrowed and immutable; no state is
//! shared between parser instances.
//!
//! [`Parser::parse_statement`] pulls tokens from the lexer line by line,
//! matches one top-level construct, reduces the appeal tree to a single
//! parse tree, and advances the cursor past the consumed range.
//! [`Parser::parse_module`] repeats that to end of input.

pub mod appeal;
pub mod cache;
mod matcher;
mod sortout;
mod wavefront;

use std::time::{Duration, Instant};

use smallvec::SmallVec;
use tracing::debug;

use crate::error::ParseError;
use crate::grammar::{Grammar, RuleId};
use crate::lexer::{Token, TokenSource};
use crate::tree::{Module, ParseTree};
use appeal::AppealArena;
use cache::{FailedSet, SuccCache};
use wavefront::WavefrontFrame;

/// Verbosity and trace switches. Each trace flag gates one family of
/// `tracing` events, mirroring one phase of the engine.
#[derive(Debug, Clone, Default)]
pub struct ParserConfig {
    pub verbosity: u8,
    /// Rule-table enter/exit events.
    pub trace_table: bool,
    /// Wavefront instance and connect events.
    pub trace_left_rec: bool,
    /// Failure resets performed by the appeal pass.
    pub trace_appeal: bool,
    /// Per-instance visited-set events.
    pub trace_visited: bool,
    /// Failed-set updates.
    pub trace_failed: bool,
    /// Sort-out node selection.
    pub trace_sortout: bool,
    /// Reserved for a downstream AST factory.
    pub trace_ast_build: bool,
    /// Patch-was-succ rounds.
    pub trace_patch: bool,
    /// Non-fatal oddities.
    pub trace_warning: bool,
    /// Record wall time of match and build phases.
    pub timing: bool,
    /// Treat a top rule committing to more than one end position as a
    /// fatal grammar ambiguity instead of taking the longest match.
    pub strict_top_match: bool,
}

/// Counters collected across the statements of one parser.
#[derive(Debug, Clone, Default)]
pub struct ParseMetrics {
    pub statements: usize,
    pub tokens_consumed: usize,
    pub nodes_created: usize,
    pub cache_hits: usize,
    pub wavefront_iterations: usize,
    pub patch_rounds: usize,
    pub parse_time: Duration,
    pub build_time: Duration,
}

/// The parsing engine. One instance per input; not shareable across
/// threads while a parse is running.
pub struct Parser<'g, S> {
    grammar: &'g Grammar,
    source: S,
    config: ParserConfig,
    /// Tokens read so far; positions are stable for the parser's lifetime.
    tokens: Vec<Token>,
    /// Next unmatched position.
    cur: u32,
    pub(crate) arena: AppealArena,
    pub(crate) cache: SuccCache,
    pub(crate) failed: FailedSet,
    pub(crate) frames: Vec<WavefrontFrame>,
    /// End positions of the current attempt; an output parameter shared by
    /// the kind traversals.
    pub(crate) succ: SmallVec<[u32; 8]>,
    metrics: ParseMetrics,
    pub(crate) indent: usize,
}

impl<'g, S: TokenSource> Parser<'g, S> {
    #[must_use]
    pub fn new(grammar: &'g Grammar, source: S) -> Self {
        Self::with_config(grammar, source, ParserConfig::default())
    }

    #[must_use]
    pub fn with_config(grammar: &'g Grammar, source: S, config: ParserConfig) -> Self {
        let rule_count = grammar.rule_count();
        Self {
            grammar,
            source,
            config,
            tokens: Vec::new(),
            cur: 0,
            arena: AppealArena::new(),
            cache: SuccCache::new(rule_count),
            failed: FailedSet::new(rule_count),
            frames: Vec::new(),
            succ: SmallVec::new(),
            metrics: ParseMetrics::default(),
            indent: 0,
        }
    }

    #[must_use]
    pub const fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    #[must_use]
    pub const fn config(&self) -> &ParserConfig {
        &self.config
    }

    #[must_use]
    pub const fn metrics(&self) -> &ParseMetrics {
        &self.metrics
    }

    /// The next unmatched token position.
    #[must_use]
    pub const fn cursor(&self) -> u32 {
        self.cur
    }

    /// The token at a position, if already read.
    #[must_use]
    pub fn token_at(&self, pos: u32) -> Option<&Token> {
        self.tokens.get(pos as usize)
    }

    /// Cached end positions for a rule at a start position. Diagnostic
    /// accessor; the cache is cleared at the top of the next statement.
    #[must_use]
    pub fn cached_matches(&self, rule: RuleId, start: u32) -> Option<&[u32]> {
        self.cache.entry(rule, start).map(|e| e.ends.as_slice())
    }

    /// Whether a rule is recorded as failed at a start position.
    #[must_use]
    pub fn was_failed(&self, rule: RuleId, start: u32) -> bool {
        self.failed.was_failed(rule, start)
    }

    /// Parse a single top-level construct.
    ///
    /// Returns `Ok(None)` at end of input. On success the cursor has
    /// advanced exactly past the matched range; on [`ParseError`] it is
    /// restored to the statement start.
    ///
    /// # Errors
    /// [`ParseError::IllegalSyntax`] when no top rule matches,
    /// [`ParseError::TopLevelAmbiguity`] when the winning top rule admits
    /// several end positions under
    /// [`strict_top_match`](ParserConfig::strict_top_match),
    /// [`ParseError::Internal`] when sort-out meets an impossible tree.
    pub fn parse_statement(&mut self) -> Result<Option<ParseTree>, ParseError> {
        self.cache.clear_all();
        self.failed.clear_all();
        self.arena.clear();
        self.frames.clear();
        self.succ.clear();

        if self.lex_one_line() == 0 {
            return Ok(None);
        }

        let stmt_start = self.cur;
        let match_timer = self.config.timing.then(Instant::now);

        let root = self.arena.alloc_pseudo();
        let mut winner = None;
        let tops: SmallVec<[RuleId; 4]> = self.grammar.top_rules().iter().copied().collect();
        for top in tops {
            self.arena.clear_children(root);
            self.cur = stmt_start;
            if self.traverse_rule(top, root) {
                let top_node = *self
                    .arena
                    .node(root)
                    .children
                    .last()
                    .expect("successful traversal attaches a child");
                winner = Some((top, top_node));
                break;
            }
        }

        if let Some(timer) = match_timer {
            self.metrics.parse_time += timer.elapsed();
        }

        let Some((top, top_node)) = winner else {
            self.cur = stmt_start;
            debug!(
                line = self.source.line_number(),
                token = stmt_start,
                "illegal syntax"
            );
            return Err(ParseError::IllegalSyntax {
                line: self.source.line_number(),
                token: stmt_start,
            });
        };

        let matches = self.arena.node(top_node).matches.clone();
        let Some(final_match) = matches.iter().copied().max() else {
            // The winning top rule matched zero tokens; committing would
            // leave the cursor in place and loop forever.
            self.cur = stmt_start;
            return Err(ParseError::IllegalSyntax {
                line: self.source.line_number(),
                token: stmt_start,
            });
        };

        // The engine commits to the longest match. Strict mode instead
        // requires the top rule to admit exactly one end position, the way
        // statement-shaped grammars do.
        if self.config.strict_top_match && matches.len() > 1 {
            self.cur = stmt_start;
            return Err(ParseError::TopLevelAmbiguity {
                rule: self.grammar.name(top).to_string(),
                start: stmt_start,
                count: matches.len(),
            });
        }

        self.cur = final_match + 1;

        let build_timer = self.config.timing.then(Instant::now);
        self.sort_out(root, top_node, final_match)?;
        self.patch_was_succ(root)?;
        self.simplify(root)?;

        let sorted_root = self.arena.node(root).sorted_children[0];
        let tree = ParseTree::build(self.grammar, &self.arena, sorted_root);

        if let Some(timer) = build_timer {
            self.metrics.build_time += timer.elapsed();
        }
        self.metrics.statements += 1;
        self.metrics.tokens_consumed += (final_match + 1 - stmt_start) as usize;
        self.metrics.nodes_created += self.arena.len();

        Ok(Some(tree))
    }

    /// Parse every statement to end of input.
    ///
    /// # Errors
    /// Propagates the first statement failure; see
    /// [`parse_statement`](Self::parse_statement).
    pub fn parse_module(&mut self) -> Result<Module, ParseError> {
        let mut module = Module::default();
        while let Some(tree) = self.parse_statement()? {
            module.trees.push(tree);
        }
        Ok(module)
    }

    /// Lex every useful token of the current line, appending to the token
    /// vector; reads further lines until at least one token arrives.
    /// Returns the number of tokens pending at the cursor, 0 at end of
    /// input. Whitespace and comments are filtered here.
    pub(crate) fn lex_one_line(&mut self) -> usize {
        if (self.cur as usize) < self.tokens.len() {
            return self.tokens.len() - self.cur as usize;
        }

        let mut count = 0;
        while count == 0 {
            while !self.source.end_of_line() && !self.source.end_of_file() {
                let Some(token) = self.source.lex_token() else {
                    break;
                };
                if !token.is_whitespace() && !token.is_comment() {
                    self.tokens.push(token);
                    count += 1;
                }
            }
            if count == 0 {
                if self.source.end_of_file() || !self.source.read_next_line() {
                    break;
                }
            }
        }
        count
    }

    /// Step the cursor, pulling the next line when the read tokens run out.
    pub(crate) fn move_cur_token(&mut self) {
        self.cur += 1;
        if self.cur as usize == self.tokens.len() {
            self.lex_one_line();
        }
    }

    /// Whether a token exists at the cursor, reading ahead if needed.
    pub(crate) fn token_available(&mut self) -> bool {
        (self.cur as usize) < self.tokens.len() || self.lex_one_line() > 0
    }

    pub(crate) const fn cur(&self) -> u32 {
        self.cur
    }

    pub(crate) fn set_cur(&mut self, pos: u32) {
        self.cur = pos;
    }

    pub(crate) fn current_token(&self) -> &Token {
        &self.tokens[self.cur as usize]
    }

    pub(crate) fn bump_cache_hits(&mut self) {
        self.metrics.cache_hits += 1;
    }

    pub(crate) fn bump_wavefront_iterations(&mut self) {
        self.metrics.wavefront_iterations += 1;
    }

    pub(crate) fn bump_patch_rounds(&mut self) {
        self.metrics.patch_rounds += 1;
    }
}
