//! # Left-Recursion Detector
//!
//! Depth-first discovery of every left-recursive cycle in a grammar,
//! producing the [`RecursionTable`]s the analyzer consumes.
//!
//! The traversal starts from the top rules and treats the second in-process
//! appearance of a rule as a back edge. The in-process rule that closes the
//! cycle — the topmost one on the current path — becomes the cycle's *lead*,
//! which guarantees one recorded recursion per loop even when the loop has
//! many nodes. Each rule is fully processed at most once.
//!
//! Traversal steps by kind: OneOf descends into every rule child; Data,
//! ZeroOrMore and ZeroOrOne descend into the sole child; Concatenate
//! descends into its first child unconditionally, and into later children
//! only for discovery of their own recursions — a back edge through a
//! non-leftmost position is not a *left* recursion and is never recorded.

use hashbrown::HashSet;

use crate::grammar::recursion::RecursionTable;
use crate::grammar::{ChildRef, RuleId, RuleKind, RuleTable};

struct Detector<'g> {
    rules: &'g [RuleTable],
    /// The current DFS path, root first.
    in_process: Vec<RuleId>,
    done: HashSet<RuleId, ahash::RandomState>,
    tables: Vec<RecursionTable>,
}

/// Find every left recursion reachable from the top rules. Cycle hops are
/// 0-based child indices; tables appear in lead-discovery order.
#[must_use]
pub fn detect_left_recursion(rules: &[RuleTable], tops: &[RuleId]) -> Vec<RecursionTable> {
    let mut detector = Detector {
        rules,
        in_process: Vec::new(),
        done: HashSet::with_hasher(ahash::RandomState::new()),
        tables: Vec::new(),
    };

    for &top in tops {
        detector.in_process.clear();
        detector.visit(top);
    }

    detector.tables
}

impl Detector<'_> {
    fn visit(&mut self, rule: RuleId) {
        if self.done.contains(&rule) {
            return;
        }
        if self.in_process.contains(&rule) {
            // Back edge: the current path from `rule` down to the caller
            // closes a cycle. `rule` is not done yet; other paths may still
            // reach it.
            self.record_cycle(rule);
            return;
        }
        self.in_process.push(rule);

        let rules = self.rules;
        let table = &rules[rule.index()];
        match table.kind {
            RuleKind::OneOf => {
                for child in &table.children {
                    if let ChildRef::Rule(child) = *child {
                        self.visit(child);
                    }
                }
            }
            RuleKind::Data | RuleKind::ZeroOrMore | RuleKind::ZeroOrOne => {
                if let Some(ChildRef::Rule(child)) = table.children.first().copied() {
                    self.visit(child);
                }
            }
            RuleKind::Concatenate => {
                if let Some(ChildRef::Rule(child)) = table.children.first().copied() {
                    self.visit(child);
                }
                for child in table.children.iter().skip(1) {
                    if let ChildRef::Rule(child) = *child {
                        if !self.in_process.contains(&child) {
                            self.visit(child);
                        }
                    }
                }
            }
            RuleKind::Null => {}
        }

        let popped = self.in_process.pop();
        debug_assert_eq!(popped, Some(rule));
        self.done.insert(rule);
    }

    /// Record the cycle closing at `lead`: the path slice from the lead's
    /// position to the top of the stack, plus the back edge, converted to
    /// child indices.
    fn record_cycle(&mut self, lead: RuleId) {
        let pos = self
            .in_process
            .iter()
            .position(|&r| r == lead)
            .expect("lead is in process");

        let mut hops = Vec::with_capacity(self.in_process.len() - pos);
        let mut parent = lead;
        for &child in &self.in_process[pos + 1..] {
            let Some(index) = find_child_index(&self.rules[parent.index()], child) else {
                return;
            };
            hops.push(index);
            parent = child;
        }
        let Some(back) = find_child_index(&self.rules[parent.index()], lead) else {
            return;
        };
        hops.push(back);

        if hops.len() < 2 {
            // A one-hop cycle means a rule leads directly back to itself
            // through its own child list with no intermediate node; the
            // wavefront needs at least lead -> node -> lead, and single-hop
            // self loops only arise from degenerate rules like `A : A`,
            // which cannot match anything.
            return;
        }

        if let Some(table) = self.tables.iter_mut().find(|t| t.lead == lead) {
            if !table.cycles.contains(&hops) {
                table.cycles.push(hops);
            }
        } else {
            self.tables.push(RecursionTable {
                lead,
                cycles: vec![hops],
            });
        }
    }
}

/// The 0-based index of the first child of `parent` referencing `child`.
fn find_child_index(parent: &RuleTable, child: RuleId) -> Option<u32> {
    parent.children.iter().position(
        |c| matches!(c, ChildRef::Rule(r) if *r == child),
    ).map(|i| i as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{RuleProperties, TokenId};
    use lasso::Rodeo;

    fn table(interner: &mut Rodeo, name: &str, kind: RuleKind, children: Vec<ChildRef>) -> RuleTable {
        RuleTable {
            name: interner.get_or_intern(name),
            kind,
            children,
            properties: RuleProperties::NONE,
            actions: vec![],
        }
    }

    #[test]
    fn direct_left_recursion() {
        let mut interner = Rodeo::new();
        // Add : ONEOF(Id, AddTail); AddTail : Add '+' Id
        let rules = vec![
            table(
                &mut interner,
                "Add",
                RuleKind::OneOf,
                vec![ChildRef::Rule(RuleId(2)), ChildRef::Rule(RuleId(1))],
            ),
            table(
                &mut interner,
                "AddTail",
                RuleKind::Concatenate,
                vec![
                    ChildRef::Rule(RuleId(0)),
                    ChildRef::Token(TokenId(0)),
                    ChildRef::Rule(RuleId(2)),
                ],
            ),
            table(&mut interner, "Id", RuleKind::Null, vec![]),
        ];

        let tables = detect_left_recursion(&rules, &[RuleId(0)]);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].lead, RuleId(0));
        assert_eq!(tables[0].cycles, vec![vec![1, 0]]);
    }

    #[test]
    fn no_recursion_in_plain_grammar() {
        let mut interner = Rodeo::new();
        // Stmt : Id ';'
        let rules = vec![
            table(
                &mut interner,
                "Stmt",
                RuleKind::Concatenate,
                vec![ChildRef::Rule(RuleId(1)), ChildRef::Token(TokenId(0))],
            ),
            table(&mut interner, "Id", RuleKind::Null, vec![]),
        ];

        let tables = detect_left_recursion(&rules, &[RuleId(0)]);
        assert!(tables.is_empty());
    }

    #[test]
    fn non_leftmost_reference_is_not_a_cycle() {
        let mut interner = Rodeo::new();
        // Paren : '(' Paren ')'. The self reference is not in leftmost
        // position, so there is no left recursion.
        let rules = vec![table(
            &mut interner,
            "Paren",
            RuleKind::Concatenate,
            vec![
                ChildRef::Token(TokenId(0)),
                ChildRef::Rule(RuleId(0)),
                ChildRef::Token(TokenId(1)),
            ],
        )];

        let tables = detect_left_recursion(&rules, &[RuleId(0)]);
        assert!(tables.is_empty());
    }

    #[test]
    fn indirect_recursion_leads_at_topmost_node() {
        let mut interner = Rodeo::new();
        // A : ONEOF(Id, B); B : ONEOF(A, Id). Cycle A -> B -> A with lead A.
        let rules = vec![
            table(
                &mut interner,
                "A",
                RuleKind::OneOf,
                vec![ChildRef::Rule(RuleId(2)), ChildRef::Rule(RuleId(1))],
            ),
            table(
                &mut interner,
                "B",
                RuleKind::OneOf,
                vec![ChildRef::Rule(RuleId(0)), ChildRef::Rule(RuleId(2))],
            ),
            table(&mut interner, "Id", RuleKind::Null, vec![]),
        ];

        let tables = detect_left_recursion(&rules, &[RuleId(0)]);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].lead, RuleId(0));
        assert_eq!(tables[0].cycles, vec![vec![1, 0]]);
    }

    #[test]
    fn two_independent_recursions() {
        let mut interner = Rodeo::new();
        // Expr : ONEOF(Add, Mul) with Add and Mul each left recursive.
        let rules = vec![
            table(
                &mut interner,
                "Expr",
                RuleKind::OneOf,
                vec![ChildRef::Rule(RuleId(1)), ChildRef::Rule(RuleId(3))],
            ),
            table(
                &mut interner,
                "Add",
                RuleKind::OneOf,
                vec![ChildRef::Rule(RuleId(5)), ChildRef::Rule(RuleId(2))],
            ),
            table(
                &mut interner,
                "AddTail",
                RuleKind::Concatenate,
                vec![
                    ChildRef::Rule(RuleId(1)),
                    ChildRef::Token(TokenId(0)),
                    ChildRef::Rule(RuleId(5)),
                ],
            ),
            table(
                &mut interner,
                "Mul",
                RuleKind::OneOf,
                vec![ChildRef::Rule(RuleId(5)), ChildRef::Rule(RuleId(4))],
            ),
            table(
                &mut interner,
                "MulTail",
                RuleKind::Concatenate,
                vec![
                    ChildRef::Rule(RuleId(3)),
                    ChildRef::Token(TokenId(1)),
                    ChildRef::Rule(RuleId(5)),
                ],
            ),
            table(&mut interner, "Id", RuleKind::Null, vec![]),
        ];

        let mut tables = detect_left_recursion(&rules, &[RuleId(0)]);
        tables.sort_by_key(|t| t.lead);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].lead, RuleId(1));
        assert_eq!(tables[1].lead, RuleId(3));
    }
}
