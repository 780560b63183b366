//! # Sort-Out & Simplify
//!
//! The reduction of the appeal tree to a single deterministic parse tree.
//!
//! Matching resembles map-reduce: the match phase grows end-position sets,
//! and sort-out reduces them. Starting from the committed top match, each
//! node selects the children that realize its `final_match` — first
//! successful child for a OneOf, a right-to-left chain for Concatenate and
//! ZeroOrMore — so that the selected children cover exactly
//! `start..=final_match` with no overlap and no gap.
//!
//! Afterwards `patch_was_succ` restores subtrees elided by cache hits, and
//! `simplify` shrinks transparent edges no grammar action addresses.

use std::collections::VecDeque;

use tracing::trace;

use crate::error::ParseError;
use crate::grammar::{ChildRef, RuleId, RuleKind};
use crate::lexer::TokenSource;
use crate::parser::appeal::{AppealStatus, NodeId};
use crate::parser::Parser;

impl<S: TokenSource> Parser<'_, S> {
    /// Reduce the appeal tree under `root` (the statement pseudo-root) to
    /// the unique tree realizing `final_match` at `top`.
    pub(crate) fn sort_out(
        &mut self,
        root: NodeId,
        top: NodeId,
        final_match: u32,
    ) -> Result<(), ParseError> {
        {
            let slot = self.arena.node_mut(root);
            slot.status = AppealStatus::Succ;
            slot.sorted = true;
            slot.final_match = final_match;
            slot.sorted_children.clear();
            slot.sorted_children.push(top);
        }
        {
            let slot = self.arena.node_mut(top);
            slot.final_match = final_match;
            slot.sorted = true;
        }

        let mut queue = VecDeque::new();
        queue.push_back(top);
        while let Some(id) = queue.pop_front() {
            self.sort_out_node(&mut queue, id)?;
        }

        if self.config().trace_sortout {
            trace!("sort-out complete, {} arena nodes", self.arena.len());
        }
        Ok(())
    }

    /// Sort one node whose `final_match` has been fixed by its parent.
    fn sort_out_node(&mut self, queue: &mut VecDeque<NodeId>, id: NodeId) -> Result<(), ParseError> {
        let node = self.arena.node(id);
        debug_assert!(node.sorted, "sort_out_node on an unsorted node");

        if node.is_token() {
            let start = node.start;
            self.arena.node_mut(id).final_match = start;
            return Ok(());
        }

        // Cache-replayed nodes have no descended body; patch_was_succ
        // attaches the realizer's subtree later. Re-traversals that did not
        // extend a cached result report ends their own descent may not
        // realize, so they are patched the same way.
        if matches!(
            node.status,
            AppealStatus::SuccWasSucc | AppealStatus::SuccStillWasSucc
        ) {
            return Ok(());
        }

        let Some(rule) = node.rule() else {
            return Err(ParseError::Internal(
                "pseudo-root reached by sort-out".to_string(),
            ));
        };

        if self.grammar().is_special(rule) {
            // A matched special rule became a token leaf; an unmatched one
            // is never selected.
            return Ok(());
        }

        if self.is_connect_only(id, rule) {
            return self.sort_out_recursion_head(queue, id);
        }

        match self.grammar().rule(rule).kind {
            RuleKind::OneOf => self.sort_out_one_of(queue, id),
            RuleKind::Concatenate => self.sort_out_concatenate(queue, id, rule),
            RuleKind::ZeroOrMore => self.sort_out_zero_or_more(queue, id),
            RuleKind::ZeroOrOne => self.sort_out_zero_or_one(queue, id),
            RuleKind::Data => self.sort_out_data(queue, id, rule),
            RuleKind::Null => Ok(()),
        }
    }

    /// Whether `id` is a recursion head that merely connects lead
    /// instances: every child is itself a lead node of the same group.
    fn is_connect_only(&self, id: NodeId, rule: RuleId) -> bool {
        let recursion = self.grammar().recursion();
        let Some(group) = recursion.group_of(rule) else {
            return false;
        };
        if !recursion.is_lead(rule) {
            return false;
        }
        let children = &self.arena.node(id).children;
        !children.is_empty()
            && children.iter().all(|&c| {
                self.arena.node(c).rule().is_some_and(|r| {
                    recursion.is_lead(r) && recursion.group_of(r) == Some(group)
                })
            })
    }

    /// A recursion head adopts the first successful instance that realizes
    /// its final match; earlier (shorter) instances and the non-growing
    /// last instance are skipped.
    fn sort_out_recursion_head(
        &mut self,
        queue: &mut VecDeque<NodeId>,
        id: NodeId,
    ) -> Result<(), ParseError> {
        let parent_match = self.arena.node(id).final_match;
        let children = self.arena.node(id).children.clone();

        for child in children {
            let node = self.arena.node(child);
            if node.status.is_fail() || !node.find_match(parent_match) {
                continue;
            }
            self.commit_child(queue, id, child, parent_match);
            return Ok(());
        }

        Err(ParseError::Internal(format!(
            "recursion head has no instance realizing end {parent_match}"
        )))
    }

    /// Record `child` as the next sorted child of `parent`.
    fn commit_child(
        &mut self,
        queue: &mut VecDeque<NodeId>,
        parent: NodeId,
        child: NodeId,
        final_match: u32,
    ) {
        {
            let slot = self.arena.node_mut(child);
            slot.final_match = final_match;
            slot.sorted = true;
        }
        self.arena.set_parent(child, parent);
        self.arena.node_mut(parent).sorted_children.push(child);
        if !self.arena.node(child).is_token() {
            queue.push_back(child);
        } else {
            let start = self.arena.node(child).start;
            self.arena.node_mut(child).final_match = start;
        }
    }

    fn sort_out_one_of(
        &mut self,
        queue: &mut VecDeque<NodeId>,
        id: NodeId,
    ) -> Result<(), ParseError> {
        // All children may be zero-capable and have matched nothing.
        if self.arena.node(id).matches.is_empty() {
            return Ok(());
        }
        let parent_match = self.arena.node(id).final_match;
        let children = self.arena.node(id).children.clone();

        for child in children {
            let node = self.arena.node(child);
            if node.status.is_fail() {
                continue;
            }
            let realizes = if node.is_token() {
                node.start == parent_match
            } else {
                node.find_match(parent_match)
            };
            if realizes {
                // First good child wins.
                self.commit_child(queue, id, child, parent_match);
                return Ok(());
            }
        }

        Err(ParseError::Internal(format!(
            "oneof node has no child realizing end {parent_match}"
        )))
    }

    fn sort_out_zero_or_more(
        &mut self,
        queue: &mut VecDeque<NodeId>,
        id: NodeId,
    ) -> Result<(), ParseError> {
        if self.arena.node(id).matches.is_empty() {
            return Ok(());
        }
        let parent_start = self.arena.node(id).start;
        let parent_match = self.arena.node(id).final_match;
        let children = self.arena.node(id).children.clone();

        // Chain backwards from the final match to the start; every link is
        // one iteration of the sole child shape.
        let mut chosen: Vec<NodeId> = Vec::new();
        let mut last = parent_match;
        loop {
            let mut good = None;
            for &child in &children {
                if chosen.contains(&child) {
                    continue;
                }
                let node = self.arena.node(child);
                if node.status.is_succ() && node.find_match(last) {
                    good = Some(child);
                    break;
                }
            }
            let Some(child) = good else {
                return Err(ParseError::Internal(format!(
                    "zero-or-more chain broken at end {last}"
                )));
            };

            chosen.push(child);
            let child_start = self.arena.node(child).start;
            {
                let slot = self.arena.node_mut(child);
                slot.final_match = last;
                slot.sorted = true;
            }
            self.arena.set_parent(child, id);
            if child_start == parent_start {
                break;
            }
            if child_start == 0 {
                return Err(ParseError::Internal(
                    "zero-or-more chain ran past the statement start".to_string(),
                ));
            }
            last = child_start - 1;
        }

        for &child in chosen.iter().rev() {
            self.arena.node_mut(id).sorted_children.push(child);
            if self.arena.node(child).is_token() {
                let start = self.arena.node(child).start;
                self.arena.node_mut(child).final_match = start;
            } else {
                queue.push_back(child);
            }
        }
        Ok(())
    }

    fn sort_out_zero_or_one(
        &mut self,
        queue: &mut VecDeque<NodeId>,
        id: NodeId,
    ) -> Result<(), ParseError> {
        if self.arena.node(id).matches.is_empty() {
            return Ok(());
        }
        let parent_match = self.arena.node(id).final_match;
        let Some(&child) = self.arena.node(id).children.first() else {
            return Ok(());
        };
        if self.arena.node(child).status.is_fail() {
            return Ok(());
        }

        let node = self.arena.node(child);
        let ok = if node.is_token() {
            node.start == parent_match
        } else {
            node.find_match(parent_match)
        };
        if !ok {
            return Err(ParseError::Internal(format!(
                "zero-or-one child does not realize end {parent_match}"
            )));
        }
        self.commit_child(queue, id, child, parent_match);
        Ok(())
    }

    fn sort_out_data(
        &mut self,
        queue: &mut VecDeque<NodeId>,
        id: NodeId,
        rule: RuleId,
    ) -> Result<(), ParseError> {
        if self.arena.node(id).matches.is_empty() {
            return Ok(());
        }
        let parent_match = self.arena.node(id).final_match;
        let elem = self.grammar().rule(rule).children[0];
        let Some(child) = self.find_elem_child(id, elem, parent_match) else {
            return Err(ParseError::Internal(format!(
                "data node has no child realizing end {parent_match}"
            )));
        };
        self.commit_child(queue, id, child, parent_match);
        Ok(())
    }

    fn sort_out_concatenate(
        &mut self,
        queue: &mut VecDeque<NodeId>,
        id: NodeId,
        rule: RuleId,
    ) -> Result<(), ParseError> {
        if self.arena.node(id).matches.is_empty() {
            return Ok(());
        }
        let parent_start = self.arena.node(id).start;
        let parent_match = self.arena.node(id).final_match;
        let elems = self.grammar().rule(rule).children.clone();

        let mut chosen: Vec<NodeId> = Vec::new();
        let mut last = i64::from(parent_match);
        for &elem in elems.iter().rev() {
            let child = if last < i64::from(parent_start) {
                // The range is exhausted; only zero-matching slots remain.
                None
            } else {
                self.find_elem_child(id, elem, last as u32)
            };

            match child {
                Some(child) => {
                    {
                        let slot = self.arena.node_mut(child);
                        slot.final_match = last as u32;
                        slot.sorted = true;
                    }
                    self.arena.set_parent(child, id);
                    last = i64::from(self.arena.node(child).start) - 1;
                    chosen.push(child);
                }
                None => {
                    // Only a zero-capable slot may contribute nothing.
                    let zero_ok = match elem {
                        ChildRef::Rule(r) => matches!(
                            self.grammar().rule(r).kind,
                            RuleKind::ZeroOrMore | RuleKind::ZeroOrOne
                        ),
                        _ => false,
                    };
                    if !zero_ok {
                        return Err(ParseError::Internal(format!(
                            "concatenation slot has no child realizing end {last}"
                        )));
                    }
                }
            }
        }

        if last + 1 != i64::from(parent_start) {
            return Err(ParseError::Internal(format!(
                "concatenation covers {}..{} instead of {}..{}",
                last + 1,
                parent_match,
                parent_start,
                parent_match
            )));
        }

        for &child in chosen.iter().rev() {
            self.arena.node_mut(id).sorted_children.push(child);
            if self.arena.node(child).is_token() {
                let start = self.arena.node(child).start;
                self.arena.node_mut(child).final_match = start;
            } else {
                queue.push_back(child);
            }
        }
        Ok(())
    }

    /// Find an attempted child matching the element shape with `m` in its
    /// end set. When several attempts qualify the latest wins, matching the
    /// traversal's own preference for later, wider attempts.
    fn find_elem_child(&self, parent: NodeId, elem: ChildRef, m: u32) -> Option<NodeId> {
        let grammar = self.grammar();
        let mut found = None;
        for &child in &self.arena.node(parent).children {
            let node = self.arena.node(child);
            if !node.status.is_succ() || !node.find_match(m) {
                continue;
            }
            let shape_matches = match elem {
                ChildRef::Rule(r) if grammar.is_special(r) => match node.token() {
                    Some(token) => {
                        if r == grammar.identifier_rule() {
                            token.is_identifier()
                        } else {
                            token.is_literal()
                        }
                    }
                    None => false,
                },
                ChildRef::Rule(r) => node.rule() == Some(r),
                ChildRef::Token(id) => node
                    .token()
                    .is_some_and(|token| token == grammar.token(id)),
                ChildRef::Char(_) | ChildRef::Str(_) | ChildRef::Type(_) => false,
            };
            if shape_matches {
                found = Some(child);
            }
        }
        found
    }

    /// Restore subtrees elided by cache replay: for every was-succ node in
    /// the sorted tree, find the youngest realizer covering its final
    /// match, sort it supplementally, and adopt its children. Repeats until
    /// no was-succ node remains.
    pub(crate) fn patch_was_succ(&mut self, root: NodeId) -> Result<(), ParseError> {
        let mut rounds = 0usize;
        loop {
            rounds += 1;
            self.bump_patch_rounds();
            if rounds > self.arena.len() + 1 {
                return Err(ParseError::Internal(
                    "patch-was-succ did not converge".to_string(),
                ));
            }

            let was_succ = self.collect_was_succ(root);
            if was_succ.is_empty() {
                return Ok(());
            }
            if self.config().trace_patch {
                trace!(round = rounds, count = was_succ.len(), "patching cache hits");
            }

            for ws in was_succ {
                let patch = self.find_patch_node(ws)?;
                if !self.arena.node(patch).sorted {
                    let final_match = self.arena.node(ws).final_match;
                    self.supplemental_sort_out(patch, final_match)?;
                }
                let children = self.arena.node(patch).sorted_children.clone();
                for &child in &children {
                    self.arena.set_parent(child, ws);
                }
                let slot = self.arena.node_mut(ws);
                slot.sorted_children = children;
                slot.status = AppealStatus::Succ;
            }
        }
    }

    /// Was-succ nodes reachable in the sorted tree; the walk does not
    /// descend into them since their sorted children are not theirs yet.
    fn collect_was_succ(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(root);
        while let Some(id) = queue.pop_front() {
            let node = self.arena.node(id);
            if matches!(
                node.status,
                AppealStatus::SuccWasSucc | AppealStatus::SuccStillWasSucc
            ) {
                out.push(id);
            } else {
                for &child in &node.sorted_children {
                    queue.push_back(child);
                }
            }
        }
        out
    }

    /// The youngest (deepest) realizer of `ws`'s rule at its start whose
    /// end set covers the required final match. Incomparable candidates
    /// fall back to registration order, which favors the earliest and
    /// smallest realizing subtree.
    fn find_patch_node(&self, ws: NodeId) -> Result<NodeId, ParseError> {
        let node = self.arena.node(ws);
        let rule = node.rule().ok_or_else(|| {
            ParseError::Internal("was-succ patch target is not a rule node".to_string())
        })?;
        let start = node.start;
        let final_match = node.final_match;

        let entry = self.cache.entry(rule, start).ok_or_else(|| {
            ParseError::Internal(format!(
                "no cache entry behind was-succ node for rule {} at {start}",
                self.grammar().name(rule)
            ))
        })?;

        let mut youngest: Option<NodeId> = None;
        for &candidate in &entry.nodes {
            if candidate == ws || !self.arena.node(candidate).find_match(final_match) {
                continue;
            }
            match youngest {
                None => youngest = Some(candidate),
                Some(current) => {
                    if self.arena.descendant_of(candidate, current) {
                        youngest = Some(candidate);
                    }
                }
            }
        }

        youngest.ok_or_else(|| {
            ParseError::Internal(format!(
                "no realizer covers end {final_match} for rule {} at {start}",
                self.grammar().name(rule)
            ))
        })
    }

    /// Sort-out rooted at a patch node, against an externally fixed final
    /// match.
    fn supplemental_sort_out(&mut self, root: NodeId, final_match: u32) -> Result<(), ParseError> {
        {
            let slot = self.arena.node_mut(root);
            slot.final_match = final_match;
            slot.sorted = true;
        }
        let mut queue = VecDeque::new();
        queue.push_back(root);
        while let Some(id) = queue.pop_front() {
            self.sort_out_node(&mut queue, id)?;
        }
        Ok(())
    }

    /// Shrink transparent edges: a node with exactly one sorted child whose
    /// slot no action addresses is replaced by that child. An edge between
    /// two lead nodes of the same group is shrunk unconditionally. The
    /// surviving node remembers the original child slot in
    /// `simplified_index` so actions can still address it.
    pub(crate) fn simplify(&mut self, root: NodeId) -> Result<(), ParseError> {
        let top = self.arena.node(root).sorted_children[0];
        let mut queue = VecDeque::new();
        queue.push_back(top);

        while let Some(id) = queue.pop_front() {
            if self.arena.node(id).is_token() {
                continue;
            }
            let survivor = self.shrink_edges(root, id)?;
            for &child in &self.arena.node(survivor).sorted_children {
                queue.push_back(child);
            }
        }
        Ok(())
    }

    fn shrink_edges(&mut self, root: NodeId, start_node: NodeId) -> Result<NodeId, ParseError> {
        let mut node = start_node;
        // The slot the first shrunk ancestor occupied in its own parent;
        // computed once and inherited by every survivor on this chain.
        let mut index = 0u32;

        loop {
            if self.arena.node(node).sorted_children.len() != 1 {
                break;
            }
            let child = self.arena.node(node).sorted_children[0];

            match self.sorted_child_index(node, child) {
                Some(slot) => {
                    let rule = self.arena.node(node).rule().ok_or_else(|| {
                        ParseError::Internal("token node with sorted children".to_string())
                    })?;
                    if self.grammar().rule(rule).action_refers_to(slot) {
                        break;
                    }
                }
                None => {
                    // The only unindexable edge is the connection between
                    // two leads of the same recursion; it is shrunk
                    // unconditionally since one of the pair keeps the
                    // actions.
                    let parent_rule = self.arena.node(node).rule();
                    let child_rule = self.arena.node(child).rule();
                    let leads_connected = match (parent_rule, child_rule) {
                        (Some(p), Some(c)) => {
                            let recursion = self.grammar().recursion();
                            recursion.is_lead(p)
                                && recursion.is_lead(c)
                                && recursion.in_same_group(p, c)
                        }
                        _ => false,
                    };
                    if !leads_connected {
                        return Err(ParseError::Internal(
                            "sorted child has no slot in its parent rule".to_string(),
                        ));
                    }
                }
            }

            let parent = self.arena.node(node).parent.ok_or_else(|| {
                ParseError::Internal("sorted node without a parent".to_string())
            })?;
            if !self.arena.replace_sorted_child(parent, node, child) {
                return Err(ParseError::Internal(
                    "sorted tree edge is not registered in the parent".to_string(),
                ));
            }

            if parent != root && index == 0 {
                index = self.sorted_child_index(parent, node).unwrap_or(0);
            }
            self.arena.node_mut(child).simplified_index = index;

            node = child;
        }

        Ok(node)
    }

    /// The 1-based slot of `child` in `parent`'s rule description, honoring
    /// an inherited `simplified_index`.
    fn sorted_child_index(&self, parent: NodeId, child: NodeId) -> Option<u32> {
        let child_node = self.arena.node(child);
        if child_node.simplified_index > 0 {
            return Some(child_node.simplified_index);
        }

        let rule = self.arena.node(parent).rule()?;
        let grammar = self.grammar();
        for (i, elem) in grammar.rule(rule).children.iter().enumerate() {
            let slot = i as u32 + 1;
            let hit = match *elem {
                ChildRef::Token(id) => child_node
                    .token()
                    .is_some_and(|token| token == grammar.token(id)),
                ChildRef::Rule(r) if grammar.is_special(r) => match child_node.token() {
                    Some(token) => {
                        if r == grammar.identifier_rule() {
                            token.is_identifier()
                        } else {
                            token.is_literal()
                        }
                    }
                    None => false,
                },
                ChildRef::Rule(r) => child_node.rule() == Some(r),
                ChildRef::Char(_) | ChildRef::Str(_) | ChildRef::Type(_) => false,
            };
            if hit {
                return Some(slot);
            }
        }
        None
    }
}
