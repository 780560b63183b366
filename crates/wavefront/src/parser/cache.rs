//! # Match Cache & Failed Set
//!
//! Per-rule memoization of attempt outcomes, keyed by start position.
//!
//! A success record holds every end position known so far, the appeal nodes
//! that realized them, and a `done` flag meaning no further iteration can
//! extend the result. A failure record is just the start position; the two
//! can coexist transiently inside a recursion group, where early instances
//! fail and later ones succeed, but never with `done` on the success side
//! and an unreset failure.
//!
//! Both structures are owned by a single parse and cleared at the top of
//! each statement.

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use crate::grammar::RuleId;
use crate::parser::appeal::NodeId;

/// Cached successes of one rule at one start position.
#[derive(Debug, Clone, Default)]
pub struct SuccEntry {
    /// End positions, deduplicated.
    pub ends: SmallVec<[u32; 4]>,
    /// Appeal nodes that realized any of the ends.
    pub nodes: SmallVec<[NodeId; 2]>,
    /// When set, no further attempt at this (rule, start) can improve.
    pub done: bool,
}

/// Per-rule success cache.
#[derive(Debug, Default)]
pub struct SuccCache {
    table: Vec<HashMap<u32, SuccEntry, ahash::RandomState>>,
}

impl SuccCache {
    #[must_use]
    pub fn new(rule_count: usize) -> Self {
        let mut table = Vec::with_capacity(rule_count);
        table.resize_with(rule_count, || {
            HashMap::with_hasher(ahash::RandomState::new())
        });
        Self { table }
    }

    pub fn clear_all(&mut self) {
        for map in &mut self.table {
            map.clear();
        }
    }

    #[must_use]
    pub fn entry(&self, rule: RuleId, start: u32) -> Option<&SuccEntry> {
        self.table[rule.index()].get(&start)
    }

    /// Record a success: union the realizer node and its end positions into
    /// any prior record. Idempotent.
    pub fn remember_success(&mut self, rule: RuleId, start: u32, node: NodeId, ends: &[u32]) {
        let entry = self.table[rule.index()].entry(start).or_default();
        if !entry.nodes.contains(&node) {
            entry.nodes.push(node);
        }
        for &e in ends {
            if !entry.ends.contains(&e) {
                entry.ends.push(e);
            }
        }
    }

    /// Mark a (rule, start) result final.
    pub fn mark_done(&mut self, rule: RuleId, start: u32) {
        if let Some(entry) = self.table[rule.index()].get_mut(&start) {
            entry.done = true;
        }
    }

    /// Start positions recorded for a rule, in no particular order.
    #[must_use]
    pub fn starts(&self, rule: RuleId) -> Vec<u32> {
        self.table[rule.index()].keys().copied().collect()
    }
}

/// Per-rule set of start positions known to fail.
#[derive(Debug, Default)]
pub struct FailedSet {
    table: Vec<HashSet<u32, ahash::RandomState>>,
}

impl FailedSet {
    #[must_use]
    pub fn new(rule_count: usize) -> Self {
        let mut table = Vec::with_capacity(rule_count);
        table.resize_with(rule_count, || {
            HashSet::with_hasher(ahash::RandomState::new())
        });
        Self { table }
    }

    pub fn clear_all(&mut self) {
        for set in &mut self.table {
            set.clear();
        }
    }

    pub fn remember_failure(&mut self, rule: RuleId, start: u32) {
        self.table[rule.index()].insert(start);
    }

    /// Remove a failure record; used by the appeal pass to undo mistaken
    /// failures recorded during speculative descent.
    pub fn reset_failure(&mut self, rule: RuleId, start: u32) {
        self.table[rule.index()].remove(&start);
    }

    #[must_use]
    pub fn was_failed(&self, rule: RuleId, start: u32) -> bool {
        self.table[rule.index()].contains(&start)
    }
}
