//! # Grammar Module
//!
//! The static, read-only description of a language: rule tables, their
//! operator kind, child data, and per-element actions.
//!
//! ## Overview
//!
//! A grammar is a directed graph of [`RuleTable`]s addressed by dense
//! [`RuleId`]s. Each table has a [`RuleKind`] and an ordered child list of
//! [`ChildRef`]s; a child is either a system token, another rule, a literal
//! char or string, or a type tag. Cycles are permitted only when recorded in
//! the recursion database, which [`GrammarBuilder`](builder::GrammarBuilder)
//! derives automatically at build time.
//!
//! Two rule tables are reserved: *Identifier* and *Literal*. The matcher
//! never descends into them; it checks the token category at the cursor
//! instead.
//!
//! The grammar is immutable after load and shared across all parses.

pub mod builder;
pub mod detect;
pub mod lookahead;
pub mod recursion;

pub use builder::{Elem, GrammarBuilder};
pub use lookahead::{LookAhead, LookAheadTable};
pub use recursion::{FrontNode, GroupId, Recursion, RecursionDb, RecursionTable};

use compact_str::CompactString;
use hashbrown::HashMap;
use lasso::{Rodeo, Spur};
use smallvec::SmallVec;

use crate::lexer::Token;

/// Dense identifier of a rule table; indexes all per-rule side tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub u32);

impl RuleId {
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of a system token (keyword, separator, or operator) owned by
/// the grammar and referenced from rule children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenId(pub u32);

impl TokenId {
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// The operator kind of a rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    OneOf,
    Concatenate,
    ZeroOrMore,
    ZeroOrOne,
    Data,
    Null,
}

/// Tags for type tokens appearing as rule children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TypeTag {
    Int,
    Float,
    Double,
    Bool,
    Char,
    Str,
}

/// One child of a rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildRef {
    /// A system token owned by the grammar.
    Token(TokenId),
    /// Another rule table.
    Rule(RuleId),
    /// A literal character. Never matchable at runtime; the lexer has
    /// already merged characters into tokens. Kept for look-ahead hints.
    Char(char),
    /// A literal string, interned in the grammar. Same runtime status as
    /// [`ChildRef::Char`].
    Str(Spur),
    /// A type token.
    Type(TypeTag),
}

/// Flag bits on a rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuleProperties(u8);

impl RuleProperties {
    pub const NONE: Self = Self(0);
    /// Forces a OneOf to stop at its first successful child.
    pub const SINGLE_MATCH: Self = Self(1);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for RuleProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// An action attached to a rule, consumed by the AST factory after parsing.
/// Element indices are 1-based positions into the rule's child list.
#[derive(Debug, Clone)]
pub struct RuleAction {
    pub name: CompactString,
    pub elems: SmallVec<[u8; 4]>,
}

/// A single grammar node.
#[derive(Debug, Clone)]
pub struct RuleTable {
    pub name: Spur,
    pub kind: RuleKind,
    pub children: Vec<ChildRef>,
    pub properties: RuleProperties,
    pub actions: Vec<RuleAction>,
}

impl RuleTable {
    /// Look up the child at a cycle-hop index, honoring the kind-specific
    /// child layout: ZeroOrX and Data have exactly one child at index 0.
    #[must_use]
    pub fn child_at(&self, index: usize) -> Option<ChildRef> {
        match self.kind {
            RuleKind::OneOf | RuleKind::Concatenate => self.children.get(index).copied(),
            RuleKind::ZeroOrMore | RuleKind::ZeroOrOne | RuleKind::Data => {
                if index == 0 {
                    self.children.first().copied()
                } else {
                    None
                }
            }
            RuleKind::Null => None,
        }
    }

    /// Whether any action of this rule addresses the given 1-based child
    /// slot. Transparent edges to unaddressed slots may be shrunk away.
    #[must_use]
    pub fn action_refers_to(&self, slot: u32) -> bool {
        self.actions
            .iter()
            .any(|action| action.elems.iter().any(|&e| u32::from(e) == slot))
    }
}

/// The immutable grammar: rule tables, system tokens, and the precomputed
/// recursion and look-ahead databases.
pub struct Grammar {
    rules: Vec<RuleTable>,
    tokens: Vec<Token>,
    names: HashMap<Spur, RuleId, ahash::RandomState>,
    interner: Rodeo,
    identifier: RuleId,
    literal: RuleId,
    top_rules: Vec<RuleId>,
    recursion: RecursionDb,
    lookahead: LookAheadTable,
}

impl Grammar {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        rules: Vec<RuleTable>,
        tokens: Vec<Token>,
        names: HashMap<Spur, RuleId, ahash::RandomState>,
        interner: Rodeo,
        identifier: RuleId,
        literal: RuleId,
        top_rules: Vec<RuleId>,
        recursion: RecursionDb,
        lookahead: LookAheadTable,
    ) -> Self {
        Self {
            rules,
            tokens,
            names,
            interner,
            identifier,
            literal,
            top_rules,
            recursion,
            lookahead,
        }
    }

    #[inline]
    #[must_use]
    pub fn rule(&self, id: RuleId) -> &RuleTable {
        &self.rules[id.index()]
    }

    #[must_use]
    pub fn rules(&self) -> &[RuleTable] {
        &self.rules
    }

    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Look up a rule by name.
    #[must_use]
    pub fn rule_named(&self, name: &str) -> Option<RuleId> {
        let key = self.interner.get(name)?;
        self.names.get(&key).copied()
    }

    /// The display name of a rule.
    #[must_use]
    pub fn name(&self, id: RuleId) -> &str {
        self.interner.resolve(&self.rule(id).name)
    }

    /// Resolve an interned string child.
    #[must_use]
    pub fn resolve_str(&self, key: Spur) -> &str {
        self.interner.resolve(&key)
    }

    #[inline]
    #[must_use]
    pub fn token(&self, id: TokenId) -> &Token {
        &self.tokens[id.index()]
    }

    /// The reserved Identifier rule.
    #[must_use]
    pub const fn identifier_rule(&self) -> RuleId {
        self.identifier
    }

    /// The reserved Literal rule.
    #[must_use]
    pub const fn literal_rule(&self) -> RuleId {
        self.literal
    }

    /// Whether `id` is one of the two reserved special rules.
    #[must_use]
    pub const fn is_special(&self, id: RuleId) -> bool {
        id.0 == self.identifier.0 || id.0 == self.literal.0
    }

    /// The top-level rules tried by the statement driver, in order.
    #[must_use]
    pub fn top_rules(&self) -> &[RuleId] {
        &self.top_rules
    }

    #[must_use]
    pub const fn recursion(&self) -> &RecursionDb {
        &self.recursion
    }

    /// The look-ahead entries of a rule.
    #[must_use]
    pub fn lookahead(&self, id: RuleId) -> &[LookAhead] {
        self.lookahead.entries(id)
    }
}

impl std::fmt::Debug for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grammar")
            .field("rules", &self.rules.len())
            .field("tokens", &self.tokens.len())
            .field("top_rules", &self.top_rules.len())
            .finish_non_exhaustive()
    }
}
