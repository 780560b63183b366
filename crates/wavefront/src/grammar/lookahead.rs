//! # Look-Ahead Sets
//!
//! Per-rule sets of tokens a rule can start with, used by the matcher to
//! reject doomed attempts before descending.
//!
//! Entries come in four shapes: an exact system token, any identifier, any
//! literal, or *text* (a char/string child the lexer has already merged into
//! larger tokens). Text entries are advisory: a rule whose frontier contains
//! one is never rejected by the gate.
//!
//! The set of a rule is the union over its leftmost-reachable frontier:
//! every child of a OneOf, the prefix of a Concatenate while the preceding
//! children are nullable, the sole child of ZeroOrX and Data. Cycles are cut
//! by a visited set.

use smallvec::SmallVec;

use crate::grammar::{ChildRef, RuleId, RuleKind, RuleTable};

/// One look-ahead entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookAhead {
    Token(crate::grammar::TokenId),
    AnyIdentifier,
    AnyLiteral,
    /// A char or string child; advisory, never rejects.
    Text,
}

/// Look-ahead entries for every rule, indexed by [`RuleId`].
#[derive(Debug, Default)]
pub struct LookAheadTable {
    sets: Vec<SmallVec<[LookAhead; 4]>>,
}

impl LookAheadTable {
    /// Compute the table for a full rule set.
    #[must_use]
    pub fn compute(rules: &[RuleTable], identifier: RuleId, literal: RuleId) -> Self {
        let mut sets = Vec::with_capacity(rules.len());
        for id in 0..rules.len() {
            let mut out = SmallVec::new();
            let mut visited = vec![false; rules.len()];
            collect(
                rules,
                identifier,
                literal,
                RuleId(id as u32),
                &mut visited,
                &mut out,
            );
            sets.push(out);
        }
        Self { sets }
    }

    #[must_use]
    pub fn entries(&self, rule: RuleId) -> &[LookAhead] {
        &self.sets[rule.index()]
    }
}

fn push_unique(out: &mut SmallVec<[LookAhead; 4]>, entry: LookAhead) {
    if !out.contains(&entry) {
        out.push(entry);
    }
}

fn collect(
    rules: &[RuleTable],
    identifier: RuleId,
    literal: RuleId,
    rule: RuleId,
    visited: &mut [bool],
    out: &mut SmallVec<[LookAhead; 4]>,
) {
    if visited[rule.index()] {
        return;
    }
    visited[rule.index()] = true;

    if rule == identifier {
        push_unique(out, LookAhead::AnyIdentifier);
        return;
    }
    if rule == literal {
        push_unique(out, LookAhead::AnyLiteral);
        return;
    }

    let table = &rules[rule.index()];
    match table.kind {
        RuleKind::OneOf => {
            for child in &table.children {
                collect_child(rules, identifier, literal, *child, visited, out);
            }
        }
        RuleKind::Concatenate => {
            for child in &table.children {
                collect_child(rules, identifier, literal, *child, visited, out);
                if !child_nullable(rules, *child, &mut vec![false; rules.len()]) {
                    break;
                }
            }
        }
        RuleKind::ZeroOrMore | RuleKind::ZeroOrOne | RuleKind::Data => {
            if let Some(child) = table.children.first() {
                collect_child(rules, identifier, literal, *child, visited, out);
            }
        }
        RuleKind::Null => {}
    }
}

fn collect_child(
    rules: &[RuleTable],
    identifier: RuleId,
    literal: RuleId,
    child: ChildRef,
    visited: &mut [bool],
    out: &mut SmallVec<[LookAhead; 4]>,
) {
    match child {
        ChildRef::Token(t) => push_unique(out, LookAhead::Token(t)),
        ChildRef::Rule(r) => collect(rules, identifier, literal, r, visited, out),
        ChildRef::Char(_) | ChildRef::Str(_) | ChildRef::Type(_) => {
            push_unique(out, LookAhead::Text);
        }
    }
}

fn child_nullable(rules: &[RuleTable], child: ChildRef, visited: &mut Vec<bool>) -> bool {
    match child {
        ChildRef::Rule(r) => rule_nullable(rules, r, visited),
        ChildRef::Token(_) | ChildRef::Char(_) | ChildRef::Str(_) | ChildRef::Type(_) => false,
    }
}

/// Whether a rule can match zero tokens.
pub(crate) fn rule_nullable(rules: &[RuleTable], rule: RuleId, visited: &mut Vec<bool>) -> bool {
    if visited[rule.index()] {
        return false;
    }
    visited[rule.index()] = true;

    let table = &rules[rule.index()];
    match table.kind {
        RuleKind::ZeroOrMore | RuleKind::ZeroOrOne => true,
        RuleKind::Data => table
            .children
            .first()
            .is_some_and(|c| child_nullable(rules, *c, visited)),
        RuleKind::OneOf => table
            .children
            .iter()
            .any(|c| child_nullable(rules, *c, visited)),
        RuleKind::Concatenate => table
            .children
            .iter()
            .all(|c| child_nullable(rules, *c, visited)),
        RuleKind::Null => false,
    }
}
