//! # Recursion Database
//!
//! Precomputed information about every left-recursive cycle in a grammar.
//!
//! ## Overview
//!
//! The input is a list of [`RecursionTable`]s, one per *lead* rule: the rule
//! at which a cycle closes. Each cycle is a sequence of **0-based** child
//! indices hopping from the lead back to itself. Tables are produced by the
//! built-in [detector](super::detect) or supplied from an external
//! generator.
//!
//! From the tables the analyzer derives, per lead:
//!
//! - `nodes`: every rule on any cycle of the lead, deduplicated;
//! - `lead_fronts`: children of the lead reachable without recursing;
//! - `cycle_fronts[i]`: nodes reachable from an edge of cycle *i* that are
//!   not themselves on a cycle of this lead.
//!
//! A *front* is a token, a rule, or a concat-tail (the tail of a
//! concatenation from a given child index onward).
//!
//! Leads whose cycles share rules are merged into recursion *groups*; the
//! wavefront driver keys its live state by `(group, start)`.

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use crate::error::GrammarError;
use crate::grammar::{ChildRef, RuleId, RuleKind, RuleTable, TokenId};

/// One left recursion as consumed from the detector or a generated table:
/// the lead rule plus every cycle closing at it. Cycle entries are 0-based
/// child indices; a cycle has at least two hops.
#[derive(Debug, Clone)]
pub struct RecursionTable {
    pub lead: RuleId,
    pub cycles: Vec<Vec<u32>>,
}

/// Identifier of a recursion group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub u32);

/// A token, rule, or concat-tail reachable from within a recursion by a
/// non-recursive step; used to seed and extend the wavefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontNode {
    Token(TokenId),
    Rule(RuleId),
    /// The tail of a concatenation from `start` (0-based child index) on.
    ConcatTail { rule: RuleId, start: u32 },
}

/// The analyzed form of one [`RecursionTable`].
#[derive(Debug, Clone)]
pub struct Recursion {
    pub lead: RuleId,
    pub cycles: Vec<Vec<u32>>,
    /// Every rule on any cycle, lead included, deduplicated.
    pub nodes: SmallVec<[RuleId; 4]>,
    pub lead_fronts: Vec<FrontNode>,
    /// Fronts along each cycle, indexed like `cycles`.
    pub cycle_fronts: Vec<Vec<FrontNode>>,
}

impl Recursion {
    #[must_use]
    pub fn is_node(&self, rule: RuleId) -> bool {
        self.nodes.contains(&rule)
    }
}

/// All recursions of a grammar plus the group structure over them.
#[derive(Debug, Default)]
pub struct RecursionDb {
    recursions: Vec<Recursion>,
    lead_index: HashMap<RuleId, u32, ahash::RandomState>,
    /// Rules per group, deduplicated over member recursions.
    groups: Vec<Vec<RuleId>>,
    rule_group: HashMap<RuleId, GroupId, ahash::RandomState>,
}

impl RecursionDb {
    /// Analyze a set of recursion tables against the rule tables.
    ///
    /// # Errors
    /// Returns [`GrammarError::BadRecursionTable`] when a cycle hop does not
    /// resolve to a rule child or a cycle does not close at its lead.
    pub fn analyze(rules: &[RuleTable], tables: &[RecursionTable]) -> Result<Self, GrammarError> {
        let mut recursions = Vec::with_capacity(tables.len());
        for table in tables {
            recursions.push(analyze_one(rules, table)?);
        }

        let mut db = Self {
            recursions,
            lead_index: HashMap::with_hasher(ahash::RandomState::new()),
            groups: Vec::new(),
            rule_group: HashMap::with_hasher(ahash::RandomState::new()),
        };
        for (i, rec) in db.recursions.iter().enumerate() {
            db.lead_index.insert(rec.lead, i as u32);
        }
        db.build_groups();
        Ok(db)
    }

    /// Merge recursions whose node sets intersect into groups.
    fn build_groups(&mut self) {
        let n = self.recursions.len();
        let mut group_of: Vec<usize> = (0..n).collect();

        fn root(group_of: &mut [usize], mut i: usize) -> usize {
            while group_of[i] != i {
                group_of[i] = group_of[group_of[i]];
                i = group_of[i];
            }
            i
        }

        for i in 0..n {
            for j in (i + 1)..n {
                let overlap = self.recursions[i]
                    .nodes
                    .iter()
                    .any(|r| self.recursions[j].nodes.contains(r));
                if overlap {
                    let (a, b) = (root(&mut group_of, i), root(&mut group_of, j));
                    if a != b {
                        group_of[b] = a;
                    }
                }
            }
        }

        let mut dense: HashMap<usize, u32, ahash::RandomState> =
            HashMap::with_hasher(ahash::RandomState::new());
        for i in 0..n {
            let r = root(&mut group_of, i);
            let next = self.groups.len() as u32;
            let gid = *dense.entry(r).or_insert(next);
            if gid as usize == self.groups.len() {
                self.groups.push(Vec::new());
            }
            for &rule in &self.recursions[i].nodes {
                if !self.groups[gid as usize].contains(&rule) {
                    self.groups[gid as usize].push(rule);
                }
                self.rule_group.insert(rule, GroupId(gid));
            }
        }
    }

    /// Whether `rule` is the lead of some recursion.
    #[must_use]
    pub fn is_lead(&self, rule: RuleId) -> bool {
        self.lead_index.contains_key(&rule)
    }

    /// The recursion led by `rule`, if any.
    #[must_use]
    pub fn recursion_of(&self, lead: RuleId) -> Option<&Recursion> {
        self.lead_index
            .get(&lead)
            .map(|&i| &self.recursions[i as usize])
    }

    /// The group containing `rule`, if `rule` is on any cycle.
    #[must_use]
    pub fn group_of(&self, rule: RuleId) -> Option<GroupId> {
        self.rule_group.get(&rule).copied()
    }

    /// Whether two rules sit in the same recursion group.
    #[must_use]
    pub fn in_same_group(&self, a: RuleId, b: RuleId) -> bool {
        match (self.group_of(a), self.group_of(b)) {
            (Some(ga), Some(gb)) => ga == gb,
            _ => false,
        }
    }

    /// The rules of a group.
    #[must_use]
    pub fn rules_in_group(&self, group: GroupId) -> &[RuleId] {
        &self.groups[group.0 as usize]
    }

    #[must_use]
    pub fn recursions(&self) -> &[Recursion] {
        &self.recursions
    }
}

/// Resolve one hop of a cycle: the child at `index` must be a rule.
fn rule_child_at(
    rules: &[RuleTable],
    parent: RuleId,
    index: u32,
    lead_name: &str,
) -> Result<RuleId, GrammarError> {
    let table = &rules[parent.index()];
    match table.child_at(index as usize) {
        Some(ChildRef::Rule(next)) => Ok(next),
        _ => Err(GrammarError::BadRecursionTable {
            rule: lead_name.to_string(),
            reason: format!("cycle hop {index} does not resolve to a rule child"),
        }),
    }
}

fn analyze_one(rules: &[RuleTable], table: &RecursionTable) -> Result<Recursion, GrammarError> {
    let lead = table.lead;
    let lead_name = format!("rule#{}", lead.0);

    // Recursion nodes: walk every cycle, accumulating uniquely. The last
    // hop of each cycle is the back edge and must land on the lead.
    let mut nodes: SmallVec<[RuleId; 4]> = SmallVec::new();
    nodes.push(lead);
    for cycle in &table.cycles {
        if cycle.len() < 2 {
            return Err(GrammarError::BadRecursionTable {
                rule: lead_name,
                reason: "cycle shorter than two hops".to_string(),
            });
        }
        let mut prev = lead;
        for (j, &hop) in cycle.iter().enumerate() {
            let next = rule_child_at(rules, prev, hop, &lead_name)?;
            if j + 1 == cycle.len() {
                if next != lead {
                    return Err(GrammarError::BadRecursionTable {
                        rule: lead_name,
                        reason: "cycle does not close at its lead".to_string(),
                    });
                }
            } else if !nodes.contains(&next) {
                nodes.push(next);
            }
            prev = next;
        }
    }

    let lead_fronts = find_lead_fronts(rules, table);
    let mut cycle_fronts = Vec::with_capacity(table.cycles.len());
    for cycle in &table.cycles {
        cycle_fronts.push(find_cycle_fronts(rules, lead, cycle, &nodes, &lead_name)?);
    }

    Ok(Recursion {
        lead,
        cycles: table.cycles.clone(),
        nodes,
        lead_fronts,
        cycle_fronts,
    })
}

/// Fronts directly reachable from the lead without entering any cycle.
fn find_lead_fronts(rules: &[RuleTable], table: &RecursionTable) -> Vec<FrontNode> {
    let lead_table = &rules[table.lead.index()];
    let mut fronts = Vec::new();

    match lead_table.kind {
        RuleKind::OneOf => {
            // Children that are not the first hop of any cycle exit the
            // recursion immediately.
            let first_hops: HashSet<u32, ahash::RandomState> = table
                .cycles
                .iter()
                .filter_map(|c| c.first().copied())
                .collect();
            for (i, child) in lead_table.children.iter().enumerate() {
                if first_hops.contains(&(i as u32)) {
                    continue;
                }
                match *child {
                    ChildRef::Token(t) => fronts.push(FrontNode::Token(t)),
                    ChildRef::Rule(r) => fronts.push(FrontNode::Rule(r)),
                    ChildRef::Char(_) | ChildRef::Str(_) | ChildRef::Type(_) => {}
                }
            }
        }
        // The sole child is always on a cycle.
        RuleKind::ZeroOrMore | RuleKind::ZeroOrOne | RuleKind::Data | RuleKind::Null => {}
        RuleKind::Concatenate => {
            for cycle in &table.cycles {
                let Some(&k) = cycle.first() else { continue };
                if (k as usize) < lead_table.children.len().saturating_sub(1) {
                    fronts.push(FrontNode::ConcatTail {
                        rule: table.lead,
                        start: k + 1,
                    });
                }
            }
        }
    }

    fronts
}

/// Fronts along one cycle: at each intermediate node, the children stepping
/// off the cycle. The lead itself is covered by the lead fronts.
fn find_cycle_fronts(
    rules: &[RuleTable],
    lead: RuleId,
    cycle: &[u32],
    nodes: &[RuleId],
    lead_name: &str,
) -> Result<Vec<FrontNode>, GrammarError> {
    let mut fronts = Vec::new();
    let mut prev = lead;

    for (j, &hop) in cycle.iter().enumerate() {
        let next = rule_child_at(rules, prev, hop, lead_name)?;
        if j == 0 {
            prev = next;
            continue;
        }

        let prev_table = &rules[prev.index()];
        match prev_table.kind {
            RuleKind::OneOf => {
                for child in &prev_table.children {
                    match *child {
                        ChildRef::Token(t) => fronts.push(FrontNode::Token(t)),
                        ChildRef::Rule(r) => {
                            if r != next && !nodes.contains(&r) {
                                fronts.push(FrontNode::Rule(r));
                            }
                        }
                        ChildRef::Char(_) | ChildRef::Str(_) | ChildRef::Type(_) => {}
                    }
                }
            }
            RuleKind::ZeroOrMore | RuleKind::ZeroOrOne | RuleKind::Data | RuleKind::Null => {}
            RuleKind::Concatenate => {
                if (hop as usize) < prev_table.children.len().saturating_sub(1) {
                    fronts.push(FrontNode::ConcatTail {
                        rule: prev,
                        start: hop + 1,
                    });
                }
            }
        }

        prev = next;
    }

    Ok(fronts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{RuleProperties, RuleTable};
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

    /// `Add : ONEOF(Id, AddTail)` with `AddTail : Add '+' Id`, the classic
    /// two-node left recursion with lead `Add`.
    fn add_grammar(interner: &mut Rodeo) -> Vec<RuleTable> {
        vec![
            table(
                interner,
                "Add",
                RuleKind::OneOf,
                vec![ChildRef::Rule(RuleId(2)), ChildRef::Rule(RuleId(1))],
            ),
            table(
                interner,
                "AddTail",
                RuleKind::Concatenate,
                vec![
                    ChildRef::Rule(RuleId(0)),
                    ChildRef::Token(TokenId(0)),
                    ChildRef::Rule(RuleId(2)),
                ],
            ),
            table(interner, "Id", RuleKind::Null, vec![]),
        ]
    }

    #[test]
    fn recursion_nodes_collected() {
        let mut interner = Rodeo::new();
        let rules = add_grammar(&mut interner);
        let tables = vec![RecursionTable {
            lead: RuleId(0),
            cycles: vec![vec![1, 0]],
        }];
        let db = RecursionDb::analyze(&rules, &tables).unwrap();

        let rec = db.recursion_of(RuleId(0)).unwrap();
        assert_eq!(rec.nodes.as_slice(), &[RuleId(0), RuleId(1)]);
        assert!(db.is_lead(RuleId(0)));
        assert!(!db.is_lead(RuleId(1)));
    }

    #[test]
    fn lead_fronts_of_oneof() {
        let mut interner = Rodeo::new();
        let rules = add_grammar(&mut interner);
        let tables = vec![RecursionTable {
            lead: RuleId(0),
            cycles: vec![vec![1, 0]],
        }];
        let db = RecursionDb::analyze(&rules, &tables).unwrap();

        let rec = db.recursion_of(RuleId(0)).unwrap();
        // Child 0 (Id) is off-cycle; child 1 is the cycle's first hop.
        assert_eq!(rec.lead_fronts, vec![FrontNode::Rule(RuleId(2))]);
    }

    #[test]
    fn cycle_fronts_include_concat_tail() {
        let mut interner = Rodeo::new();
        let rules = add_grammar(&mut interner);
        let tables = vec![RecursionTable {
            lead: RuleId(0),
            cycles: vec![vec![1, 0]],
        }];
        let db = RecursionDb::analyze(&rules, &tables).unwrap();

        let rec = db.recursion_of(RuleId(0)).unwrap();
        // The back edge leaves AddTail at child 0; the tail "+ Id" remains.
        assert_eq!(
            rec.cycle_fronts[0],
            vec![FrontNode::ConcatTail {
                rule: RuleId(1),
                start: 1
            }]
        );
    }

    #[test]
    fn groups_merge_on_shared_nodes() {
        let mut interner = Rodeo::new();
        // Two leads sharing a node: A : ONEOF(Id, B); B : ONEOF(A, BTail);
        // BTail : B ',' Id. Cycles: A->B->A and B->BTail->B.
        let rules = vec![
            table(
                &mut interner,
                "A",
                RuleKind::OneOf,
                vec![ChildRef::Rule(RuleId(3)), ChildRef::Rule(RuleId(1))],
            ),
            table(
                &mut interner,
                "B",
                RuleKind::OneOf,
                vec![ChildRef::Rule(RuleId(0)), ChildRef::Rule(RuleId(2))],
            ),
            table(
                &mut interner,
                "BTail",
                RuleKind::Concatenate,
                vec![
                    ChildRef::Rule(RuleId(1)),
                    ChildRef::Token(TokenId(0)),
                    ChildRef::Rule(RuleId(3)),
                ],
            ),
            table(&mut interner, "Id", RuleKind::Null, vec![]),
        ];
        let tables = vec![
            RecursionTable {
                lead: RuleId(0),
                cycles: vec![vec![1, 0]],
            },
            RecursionTable {
                lead: RuleId(1),
                cycles: vec![vec![1, 0]],
            },
        ];
        let db = RecursionDb::analyze(&rules, &tables).unwrap();

        assert!(db.in_same_group(RuleId(0), RuleId(1)));
        assert!(db.in_same_group(RuleId(0), RuleId(2)));
        assert!(!db.in_same_group(RuleId(0), RuleId(3)));

        let group = db.group_of(RuleId(0)).unwrap();
        let mut rules_in = db.rules_in_group(group).to_vec();
        rules_in.sort();
        assert_eq!(rules_in, vec![RuleId(0), RuleId(1), RuleId(2)]);
    }

    #[test]
    fn malformed_cycle_rejected() {
        let mut interner = Rodeo::new();
        let rules = add_grammar(&mut interner);
        // Hop 1 of AddTail is a token, not a rule.
        let tables = vec![RecursionTable {
            lead: RuleId(0),
            cycles: vec![vec![1, 1]],
        }];
        assert!(RecursionDb::analyze(&rules, &tables).is_err());
    }
}
