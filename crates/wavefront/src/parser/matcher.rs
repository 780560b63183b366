//! # Matcher
//!
//! Depth-first traversal over the rule tables, producing the appeal tree.
//!
//! Conventions shared by every traversal here:
//!
//! - `self.succ` is the output parameter holding the end positions of the
//!   current attempt; every entry point clears it.
//! - the cursor is saved on entry and restored on failure; on success it
//!   lands one past the largest end position.
//! - failures are recorded in the failed set and successes in the match
//!   cache, except for the two special rules, which are cheap enough to
//!   re-check and deliberately skip the cache.

use smallvec::SmallVec;
use tracing::trace;

use crate::grammar::{ChildRef, RuleId, RuleKind};
use crate::lexer::{Token, TokenSource};
use crate::parser::appeal::{AppealStatus, NodeId};
use crate::parser::Parser;

impl<S: TokenSource> Parser<'_, S> {
    /// Attempt rule `rule` at the cursor, attaching the attempt under
    /// `parent`. Returns whether the rule matched; end positions are left
    /// in `self.succ`.
    pub(crate) fn traverse_rule(&mut self, rule: RuleId, parent: NodeId) -> bool {
        let grammar = self.grammar();
        self.indent += 2;
        if self.config().trace_table {
            trace!(
                depth = self.indent,
                "enter {}@{}",
                grammar.name(rule),
                self.cur()
            );
        }

        let node = self.arena.alloc_rule(rule, self.cur());
        self.arena.add_child(parent, node);
        let saved = self.cur();
        let kind = grammar.rule(rule).kind;

        // Nothing left to read: zero-capable kinds still succeed with an
        // empty match set, everything else fails without a record.
        if !self.token_available() {
            let matched = matches!(kind, RuleKind::ZeroOrMore | RuleKind::ZeroOrOne);
            self.arena.node_mut(node).status = if matched {
                AppealStatus::Succ
            } else {
                AppealStatus::Na
            };
            self.succ.clear();
            return self.exit_table(rule, node, matched);
        }

        let is_done = self.traverse_pre(rule, node);
        let group = grammar.recursion().group_of(rule);
        let in_group = group.is_some();

        // Inside a recursion group a recorded failure is only final once
        // the group result is done; an early instance may fail where a
        // later one succeeds.
        if self.arena.node(node).status.is_fail() && (!in_group || is_done) {
            self.set_cur(saved);
            self.succ.clear();
            return self.exit_table(rule, node, false);
        }

        if !matches!(kind, RuleKind::ZeroOrMore | RuleKind::ZeroOrOne)
            && self.lookahead_rejects(rule, saved)
        {
            self.arena.node_mut(node).status = AppealStatus::FailLookAhead;
            self.failed.remember_failure(rule, saved);
            self.set_cur(saved);
            self.succ.clear();
            return self.exit_table(rule, node, false);
        }

        if self.arena.node(node).status.is_succ() && (!in_group || is_done) {
            // Cache hit outside any live recursion: the pre-pass has
            // already loaded the matches and advanced the cursor.
            return self.exit_table(rule, node, true);
        }

        let frame = group.and_then(|g| self.find_frame(g, saved));
        if let Some(fi) = frame {
            if self.frames[fi].visited.contains(&rule) {
                // Already traversed in this wavefront instance; the
                // pre-pass result stands.
                let matched = self.arena.node(node).status.is_succ();
                if !matched {
                    self.set_cur(saved);
                    self.succ.clear();
                }
                return self.exit_table(rule, node, matched);
            }

            if grammar.recursion().is_lead(rule) {
                if self.frames[fi].lead_visited.contains(&rule) {
                    if self.frames[fi].instance == 0 {
                        // Second appearance inside the first instance:
                        // deferred failure, remembered for appeal, never
                        // recorded in the failed set.
                        self.arena.node_mut(node).status = AppealStatus::Fail2ndOf1stInstance;
                        self.frames[fi].appeal_points.push(node);
                        self.set_cur(saved);
                        self.succ.clear();
                        return self.exit_table(rule, node, false);
                    }
                    // Later instance: connect to the previous one instead
                    // of recursing.
                    self.arena.node_mut(node).status = AppealStatus::Succ;
                    let matched = self.connect_previous(fi, node);
                    return self.exit_table(rule, node, matched);
                }
                // Another lead of the same group, first appearance in this
                // instance.
                self.frames[fi].lead_visited.push(rule);
            }
        }

        // The pre-pass may have advanced the cursor; the body re-traverses
        // from the original position.
        self.set_cur(saved);

        if grammar.recursion().is_lead(rule) && frame.is_none() {
            let matched = self.traverse_lead(rule, node);
            if matched {
                if !self.arena.node(node).status.is_succ() {
                    self.arena.node_mut(node).status = AppealStatus::Succ;
                }
                self.succ.clear();
                let matches = self.arena.node(node).matches.clone();
                self.succ.extend(matches);
            } else {
                self.arena.node_mut(node).status = AppealStatus::FailChildrenFailed;
                self.succ.clear();
            }
            return self.exit_table(rule, node, matched);
        }

        let matched = self.traverse_rule_regular(rule, node);
        if let Some(fi) = frame {
            if self.config().trace_visited {
                trace!(depth = self.indent, "visited {}@{}", grammar.name(rule), saved);
            }
            self.frames[fi].visited.push(rule);
        }
        if !in_group && matched {
            self.cache.mark_done(rule, saved);
        }
        self.exit_table(rule, node, matched)
    }

    fn exit_table(&mut self, rule: RuleId, node: NodeId, matched: bool) -> bool {
        if self.config().trace_table {
            trace!(
                depth = self.indent,
                "exit {}@{} {:?} -> {:?}",
                self.grammar().name(rule),
                self.cur(),
                self.arena.node(node).status,
                self.succ
            );
        }
        self.indent -= 2;
        matched
    }

    /// The pre-pass: replay a cached result before considering descent.
    /// Loads cached end positions into the node and `self.succ`, advancing
    /// the cursor past the longest one. Returns the cache `done` flag.
    fn traverse_pre(&mut self, rule: RuleId, node: NodeId) -> bool {
        let start = self.cur();
        let mut is_done = false;

        if let Some(entry) = self.cache.entry(rule, start) {
            debug_assert!(
                !self.failed.was_failed(rule, start),
                "success and failure recorded for the same (rule, start)"
            );
            is_done = entry.done;
            let ends: SmallVec<[u32; 4]> = entry.ends.clone();

            self.bump_cache_hits();
            self.succ.clear();
            self.succ.extend(ends.iter().copied());
            let mut longest = None;
            for &e in &ends {
                self.arena.node_mut(node).add_match(e);
                longest = Some(longest.map_or(e, |l: u32| l.max(e)));
            }
            // A zero-match success leaves the cursor in place.
            if let Some(l) = longest {
                self.set_cur(l);
                self.move_cur_token();
            }
            self.arena.node_mut(node).status = AppealStatus::SuccWasSucc;
        }

        if self.failed.was_failed(rule, start) {
            self.arena.node_mut(node).status = AppealStatus::FailWasFailed;
        }

        is_done
    }

    /// The look-ahead gate: reject when the token at `at` matches no entry.
    /// Advisory text entries always accept.
    fn lookahead_rejects(&self, rule: RuleId, at: u32) -> bool {
        use crate::grammar::LookAhead;

        let Some(token) = self.token_at(at) else {
            return true;
        };
        let grammar = self.grammar();
        for la in grammar.lookahead(rule) {
            let accepted = match *la {
                LookAhead::Token(id) => token == grammar.token(id),
                LookAhead::AnyIdentifier => token.is_identifier(),
                LookAhead::AnyLiteral => token.is_literal(),
                LookAhead::Text => true,
            };
            if accepted {
                return false;
            }
        }
        true
    }

    /// The kind dispatch, shared by plain descent and wavefront instances.
    /// Updates the cache and the failed set from the outcome.
    pub(crate) fn traverse_rule_regular(&mut self, rule: RuleId, node: NodeId) -> bool {
        let grammar = self.grammar();
        let old_pos = self.cur();
        self.succ.clear();

        let status = self.arena.node(node).status;
        let was_succ = matches!(
            status,
            AppealStatus::SuccWasSucc | AppealStatus::SuccStillWasSucc
        );
        let longest_before = if was_succ {
            self.arena.node(node).longest_match()
        } else {
            None
        };

        if rule == grammar.identifier_rule() {
            return self.traverse_identifier(rule, node);
        }
        if rule == grammar.literal_rule() {
            return self.traverse_literal(rule, node);
        }

        let kind = grammar.rule(rule).kind;
        let matched = match kind {
            RuleKind::OneOf => self.traverse_one_of(rule, node),
            RuleKind::ZeroOrMore => self.traverse_zero_or_more(rule, node),
            RuleKind::ZeroOrOne => self.traverse_zero_or_one(rule, node),
            RuleKind::Concatenate => self.traverse_concatenate(rule, node),
            RuleKind::Data => {
                let child = grammar.rule(rule).children[0];
                self.traverse_elem(child, node)
            }
            RuleKind::Null => false,
        };

        if matched {
            let longest = self.succ.iter().copied().max();
            let improved = match longest_before {
                None => true,
                Some(before) => longest.is_some_and(|l| l > before),
            };
            if !was_succ || improved {
                self.record_success(rule, old_pos, node);
                self.arena.node_mut(node).status = AppealStatus::Succ;
            } else {
                self.arena.node_mut(node).status = AppealStatus::SuccStillWasSucc;
            }
            self.failed.reset_failure(rule, old_pos);
            true
        } else {
            self.arena.node_mut(node).status = AppealStatus::FailChildrenFailed;
            self.set_cur(old_pos);
            if self.config().trace_failed {
                trace!(depth = self.indent, "failed {}@{}", grammar.name(rule), old_pos);
            }
            self.failed.remember_failure(rule, old_pos);
            false
        }
    }

    /// Write the current attempt's end positions into the node and the
    /// match cache, registering the node as a realizer.
    fn record_success(&mut self, rule: RuleId, start: u32, node: NodeId) {
        for i in 0..self.succ.len() {
            let m = self.succ[i];
            self.arena.node_mut(node).add_match(m);
        }
        let ends: SmallVec<[u32; 8]> = self.succ.clone();
        self.cache.remember_success(rule, start, node, &ends);
    }

    /// The reserved Identifier rule: check the token category, never
    /// descend, never cache.
    fn traverse_identifier(&mut self, rule: RuleId, node: NodeId) -> bool {
        let token = self.current_token().clone();
        if token.is_identifier() {
            self.special_table_succ(node, token);
            true
        } else {
            self.special_table_fail(rule, node, AppealStatus::FailNotIdentifier);
            false
        }
    }

    /// The reserved Literal rule; same contract as Identifier.
    fn traverse_literal(&mut self, rule: RuleId, node: NodeId) -> bool {
        let token = self.current_token().clone();
        if token.is_literal() {
            self.special_table_succ(node, token);
            true
        } else {
            self.special_table_fail(rule, node, AppealStatus::FailNotLiteral);
            false
        }
    }

    /// A special rule matched: the node becomes a token leaf covering
    /// exactly the cursor position.
    fn special_table_succ(&mut self, node: NodeId, token: Token) {
        let pos = self.cur();
        self.succ.clear();
        self.succ.push(pos);
        let slot = self.arena.node_mut(node);
        slot.status = AppealStatus::Succ;
        slot.content = crate::parser::appeal::NodeContent::Token(token);
        slot.add_match(pos);
        self.move_cur_token();
    }

    fn special_table_fail(&mut self, rule: RuleId, node: NodeId, status: AppealStatus) {
        self.failed.remember_failure(rule, self.cur());
        self.arena.node_mut(node).status = status;
        self.succ.clear();
    }

    /// Match one exact token. A node is created only on success.
    fn traverse_token(&mut self, id: crate::grammar::TokenId, parent: NodeId) -> bool {
        if !self.token_available() {
            self.succ.clear();
            return false;
        }
        let expected = self.grammar().token(id);
        if self.current_token() != expected {
            self.succ.clear();
            return false;
        }

        let pos = self.cur();
        let token = self.current_token().clone();
        let node = self.arena.alloc_token(token, pos);
        self.arena.node_mut(node).status = AppealStatus::Succ;
        self.arena.node_mut(node).add_match(pos);
        self.arena.add_child(parent, node);

        self.succ.clear();
        self.succ.push(pos);
        self.move_cur_token();
        true
    }

    /// Attempt one child element. The cursor is restored when a sub-rule
    /// fails.
    pub(crate) fn traverse_elem(&mut self, child: ChildRef, parent: NodeId) -> bool {
        let old_pos = self.cur();
        self.succ.clear();
        match child {
            ChildRef::Token(id) => self.traverse_token(id, parent),
            ChildRef::Rule(rule) => {
                let found = self.traverse_rule(rule, parent);
                if !found {
                    self.set_cur(old_pos);
                }
                found
            }
            // Chars and strings were merged into tokens by the lexer; type
            // tokens are an AST-factory concern. None can match here.
            ChildRef::Char(_) | ChildRef::Str(_) | ChildRef::Type(_) => false,
        }
    }

    /// OneOf: try every child at the same start, union the end positions,
    /// and leave the cursor after the longest match. `SINGLE_MATCH` stops
    /// at the first successful child.
    fn traverse_one_of(&mut self, rule: RuleId, node: NodeId) -> bool {
        let grammar = self.grammar();
        let single = grammar
            .rule(rule)
            .properties
            .contains(crate::grammar::RuleProperties::SINGLE_MATCH);
        let child_count = grammar.rule(rule).children.len();

        let old_pos = self.cur();
        let mut new_pos = self.cur();
        let mut found = false;
        let mut all: SmallVec<[u32; 8]> = SmallVec::new();

        for i in 0..child_count {
            let child = grammar.rule(rule).children[i];
            let sub_found = self.traverse_elem(child, node);
            found |= sub_found;
            if sub_found {
                for j in 0..self.succ.len() {
                    let m = self.succ[j];
                    if !all.contains(&m) {
                        all.push(m);
                    }
                }
                new_pos = new_pos.max(self.cur());
                self.set_cur(old_pos);
                if single {
                    break;
                }
            }
        }

        self.succ.clear();
        self.succ.extend(all);
        self.set_cur(new_pos);
        found
    }

    /// Concatenate: walk children left to right, carrying the full set of
    /// previous end positions. Zero-capable children propagate each
    /// previous end unchanged. A final set holding only "nothing consumed"
    /// is a failure.
    fn traverse_concatenate(&mut self, rule: RuleId, node: NodeId) -> bool {
        let grammar = self.grammar();
        let child_count = grammar.rule(rule).children.len();
        let saved = self.cur();
        // One before the start; -1 when the statement begins at 0.
        let nothing: i64 = i64::from(saved) - 1;

        let mut prev: SmallVec<[i64; 8]> = SmallVec::new();
        prev.push(nothing);
        let mut fin: SmallVec<[i64; 8]> = SmallVec::new();
        let mut found = true;

        for i in 0..child_count {
            let child = grammar.rule(rule).children[i];
            let is_zero = match child {
                ChildRef::Rule(r) => matches!(
                    grammar.rule(r).kind,
                    RuleKind::ZeroOrMore | RuleKind::ZeroOrOne
                ),
                _ => false,
            };

            let mut found_sub = false;
            let mut sub: SmallVec<[i64; 8]> = SmallVec::new();
            let starts = prev.clone();
            for &p in &starts {
                self.set_cur((p + 1) as u32);
                let sub_found = self.traverse_elem(child, node);
                found_sub |= sub_found;
                if sub_found {
                    let mut dup_with_prev = false;
                    for j in 0..self.succ.len() {
                        let m = i64::from(self.succ[j]);
                        if !sub.contains(&m) {
                            sub.push(m);
                        }
                        if m == p {
                            dup_with_prev = true;
                        }
                    }
                    // A zero-capable child also passes its start through
                    // unconsumed.
                    if is_zero && !dup_with_prev && !sub.contains(&p) {
                        sub.push(p);
                    }
                }
            }

            if found_sub {
                // A zero-capable child may have matched nothing at all; the
                // previous ends then stand as-is.
                if !sub.is_empty() {
                    fin.clone_from(&sub);
                    prev = sub;
                }
            } else {
                found = false;
                break;
            }
        }

        // Only the "nothing consumed" pseudo-end survived: every child was
        // zero-capable and matched zero.
        if fin.len() == 1 && fin[0] == nothing {
            found = false;
        }

        if found {
            self.succ.clear();
            let mut longest = nothing;
            for &e in &fin {
                if e != nothing {
                    self.succ.push(e as u32);
                }
                longest = longest.max(e);
            }
            self.set_cur((longest + 1) as u32);
            true
        } else {
            self.succ.clear();
            self.set_cur(saved);
            false
        }
    }

    /// ZeroOrMore: iterate the sole child from every new end position until
    /// no new ground is gained. Always succeeds; an empty result set means
    /// zero matches. Visited start positions guard against zero-matching
    /// children looping.
    fn traverse_zero_or_more(&mut self, rule: RuleId, node: NodeId) -> bool {
        let grammar = self.grammar();
        let child = grammar.rule(rule).children[0];
        let saved = self.cur();

        let mut prev: SmallVec<[i64; 8]> = SmallVec::new();
        prev.push(i64::from(saved) - 1);
        let mut visited: SmallVec<[i64; 8]> = SmallVec::new();
        let mut fin: SmallVec<[u32; 8]> = SmallVec::new();

        loop {
            let mut found_sub = false;
            let mut sub: SmallVec<[u32; 8]> = SmallVec::new();
            let starts = prev.clone();
            for &p in &starts {
                self.set_cur((p + 1) as u32);
                visited.push(p);
                let sub_found = self.traverse_elem(child, node);
                found_sub |= sub_found;
                if sub_found {
                    for j in 0..self.succ.len() {
                        let m = self.succ[j];
                        if !sub.contains(&m) {
                            sub.push(m);
                        }
                    }
                }
            }

            // A zero-capable child succeeding without tokens counts as a
            // stop.
            if found_sub && !sub.is_empty() {
                for &t in &sub {
                    if !fin.contains(&t) {
                        fin.push(t);
                    }
                }
                prev.clear();
                for &t in &sub {
                    if !visited.contains(&i64::from(t)) {
                        prev.push(i64::from(t));
                    }
                }
                if prev.is_empty() {
                    break;
                }
            } else {
                break;
            }
        }

        self.succ.clear();
        self.succ.extend(fin.iter().copied());
        match fin.iter().copied().max() {
            Some(m) => self.set_cur(m + 1),
            None => self.set_cur(saved),
        }
        true
    }

    /// ZeroOrOne: one attempt; success regardless, with whatever end
    /// positions the child produced.
    fn traverse_zero_or_one(&mut self, rule: RuleId, node: NodeId) -> bool {
        let child = self.grammar().rule(rule).children[0];
        let found = self.traverse_elem(child, node);
        if !found {
            self.succ.clear();
        }
        true
    }

    /// Undo mistaken failures on the branch from `from` up to (excluding)
    /// `root`, which ultimately succeeded. Speculative descents inside the
    /// first wavefront instance record failures that would otherwise
    /// short-circuit later attempts.
    pub(crate) fn appeal(&mut self, from: NodeId, root: NodeId) {
        let mut cursor = self.arena.node(from).parent;
        while let Some(id) = cursor {
            if id == root {
                break;
            }
            let node = self.arena.node(id);
            if node.status == AppealStatus::FailChildrenFailed {
                if let Some(rule) = node.rule() {
                    let start = node.start;
                    if self.config().trace_appeal {
                        trace!(
                            depth = self.indent,
                            "appeal: reset failed {}@{}",
                            self.grammar().name(rule),
                            start
                        );
                    }
                    self.failed.reset_failure(rule, start);
                }
            }
            cursor = self.arena.node(id).parent;
        }
    }
}
