//! # Wavefront Left Recursion
//!
//! A left-recursive lead rule defines a fixpoint: the longest prefix the
//! rule matches. It is computed by iterated widening. The first instance
//! explores only paths that exit the recursion without re-entering the lead
//! (a re-entry is a deferred failure). Every later instance re-traverses
//! the lead with the previous instance's result published in the cache;
//! re-entries connect to the previous instance's node instead of
//! descending. Iteration stops when the longest match stops growing, which
//! the token count bounds.
//!
//! One wavefront per `(group, start)` may be live at a time; the frames
//! form a stack because groups can nest at different starts.

use smallvec::SmallVec;
use tracing::trace;

use crate::grammar::{GroupId, RuleId};
use crate::lexer::TokenSource;
use crate::parser::appeal::{AppealStatus, NodeId};
use crate::parser::Parser;

/// Live state of one wavefront.
#[derive(Debug)]
pub(crate) struct WavefrontFrame {
    pub group: GroupId,
    pub start: u32,
    /// 0 is the first instance.
    pub instance: u32,
    /// Leads of the group entered in the current instance. The second
    /// appearance of any of them is a re-entry.
    pub lead_visited: SmallVec<[RuleId; 2]>,
    /// Recursion nodes fully traversed in the current instance; re-entering
    /// one replays its pre-pass result instead of descending again.
    pub visited: SmallVec<[RuleId; 8]>,
    /// The previous instance's lead node, the connect target.
    pub prev_lead: Option<NodeId>,
    /// Deferred-failure nodes of the first instance, appealed once the
    /// instance succeeds.
    pub appeal_points: Vec<NodeId>,
}

impl<S: TokenSource> Parser<'_, S> {
    /// The live wavefront for `(group, start)`, if any.
    pub(crate) fn find_frame(&self, group: GroupId, start: u32) -> Option<usize> {
        self.frames
            .iter()
            .position(|f| f.group == group && f.start == start)
    }

    /// Run the wavefront for lead `rule` at the cursor. On success the
    /// accumulated end positions are in `node`'s matches and the cache, and
    /// the cursor sits past the longest one.
    pub(crate) fn traverse_lead(&mut self, rule: RuleId, node: NodeId) -> bool {
        let grammar = self.grammar();
        let group = grammar
            .recursion()
            .group_of(rule)
            .expect("a lead rule belongs to a group");
        let start = self.cur();

        self.frames.push(WavefrontFrame {
            group,
            start,
            instance: 0,
            lead_visited: SmallVec::new(),
            visited: SmallVec::new(),
            prev_lead: None,
            appeal_points: Vec::new(),
        });
        let fi = self.frames.len() - 1;

        let mut longest: Option<u32> = None;
        loop {
            let instance = self.frames[fi].instance;
            self.bump_wavefront_iterations();
            if self.config().trace_left_rec {
                trace!(
                    depth = self.indent,
                    "wavefront {}@{} instance {}",
                    grammar.name(rule),
                    start,
                    instance
                );
            }

            self.frames[fi].lead_visited.clear();
            self.frames[fi].lead_visited.push(rule);
            self.frames[fi].visited.clear();
            self.set_cur(start);

            let inst = self.arena.alloc_rule(rule, start);
            self.arena.add_child(node, inst);
            let found = self.traverse_rule_regular(rule, inst);

            if !found {
                if instance == 0 {
                    // The seed set is empty: the whole recursion fails.
                    self.frames.pop();
                    self.set_cur(start);
                    return false;
                }
                // A later instance failing outright cannot extend anything.
                break;
            }

            if instance == 0 {
                // Failures recorded while speculative descent hit the
                // deferred re-entries were mistaken; clear them so later
                // instances can retry those branches.
                let points = std::mem::take(&mut self.frames[fi].appeal_points);
                for point in points {
                    self.appeal(point, inst);
                }
            }

            self.arena.copy_match(node, inst);

            let inst_longest = self.arena.node(inst).longest_match();
            let grew = match (longest, inst_longest) {
                (None, Some(_)) => true,
                (Some(old), Some(new)) => new > old,
                _ => false,
            };
            if !grew {
                break;
            }
            longest = inst_longest;
            self.frames[fi].prev_lead = Some(inst);
            self.frames[fi].instance += 1;
        }

        // Converged. The whole group's results at this start are final.
        let group_rules: SmallVec<[RuleId; 4]> = grammar
            .recursion()
            .rules_in_group(group)
            .iter()
            .copied()
            .collect();
        for r in group_rules {
            self.cache.mark_done(r, start);
        }
        self.frames.pop();

        match self.arena.node(node).longest_match() {
            Some(l) => {
                self.set_cur(l);
                self.move_cur_token();
                true
            }
            None => {
                // Every instance succeeded with zero matches.
                self.set_cur(start);
                true
            }
        }
    }

    /// Connect a lead re-entry to the previous instance: adopt its node as
    /// the sole child and take over its end positions.
    pub(crate) fn connect_previous(&mut self, fi: usize, node: NodeId) -> bool {
        let Some(prev) = self.frames[fi].prev_lead else {
            self.arena.node_mut(node).status = AppealStatus::FailChildrenFailed;
            self.succ.clear();
            return false;
        };

        if self.config().trace_left_rec {
            let name = self
                .arena
                .node(node)
                .rule()
                .map(|r| self.grammar().name(r).to_string())
                .unwrap_or_default();
            trace!(
                depth = self.indent,
                "connect previous {}@{}",
                name,
                self.arena.node(node).start
            );
        }

        self.arena.add_child(node, prev);
        self.arena.copy_match(node, prev);

        self.succ.clear();
        let matches = self.arena.node(node).matches.clone();
        self.succ.extend(matches);
        if let Some(longest) = self.arena.node(node).longest_match() {
            self.set_cur(longest);
            self.move_cur_token();
        }
        true
    }
}
