//! # Grammar Builder
//!
//! Programmatic construction of rule tables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use wavefront::grammar::{Elem, GrammarBuilder};
//! use wavefront::lexer::OpId;
//!
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
//! # let _ = grammar;
//! ```
//!
//! Nested combinators are lowered into anonymous sub-tables
//! (`Add_sub1`, ...), the same flattening a generated table set carries.
//! `build()` validates the tables, discovers every left-recursive cycle,
//! and computes the per-rule look-ahead sets.

use compact_str::CompactString;
use hashbrown::HashMap;
use lasso::Rodeo;
use smallvec::SmallVec;

use crate::error::GrammarError;
use crate::grammar::detect::detect_left_recursion;
use crate::grammar::lookahead::LookAheadTable;
use crate::grammar::recursion::{RecursionDb, RecursionTable};
use crate::grammar::{
    ChildRef, Grammar, RuleAction, RuleId, RuleKind, RuleProperties, RuleTable, TokenId, TypeTag,
};
use crate::lexer::{OpId, SepId, Token};

/// One element of a rule definition. Composite elements nest arbitrarily.
#[derive(Debug, Clone)]
pub enum Elem {
    OneOf(Vec<Elem>),
    Concat(Vec<Elem>),
    ZeroOrMore(Box<Elem>),
    ZeroOrOne(Box<Elem>),
    /// Reference to a named rule.
    Rule(CompactString),
    /// An exact token.
    Token(Token),
    /// The reserved Identifier rule.
    Identifier,
    /// The reserved Literal rule.
    Literal,
    Char(char),
    Str(CompactString),
    Type(TypeTag),
}

impl Elem {
    #[must_use]
    pub fn one_of(elems: impl IntoIterator<Item = Self>) -> Self {
        Self::OneOf(elems.into_iter().collect())
    }

    #[must_use]
    pub fn concat(elems: impl IntoIterator<Item = Self>) -> Self {
        Self::Concat(elems.into_iter().collect())
    }

    #[must_use]
    pub fn zero_or_more(elem: Self) -> Self {
        Self::ZeroOrMore(Box::new(elem))
    }

    #[must_use]
    pub fn zero_or_one(elem: Self) -> Self {
        Self::ZeroOrOne(Box::new(elem))
    }

    #[must_use]
    pub fn rule(name: impl Into<CompactString>) -> Self {
        Self::Rule(name.into())
    }

    #[must_use]
    pub fn token(token: Token) -> Self {
        Self::Token(token)
    }

    #[must_use]
    pub fn keyword(name: impl Into<CompactString>) -> Self {
        Self::Token(Token::Keyword(name.into()))
    }

    #[must_use]
    pub fn sep(id: SepId) -> Self {
        Self::Token(Token::Separator(id))
    }

    #[must_use]
    pub fn op(id: OpId) -> Self {
        Self::Token(Token::Operator(id))
    }

    #[must_use]
    pub const fn identifier() -> Self {
        Self::Identifier
    }

    #[must_use]
    pub const fn literal() -> Self {
        Self::Literal
    }
}

/// Builder for [`Grammar`].
#[derive(Debug, Default)]
pub struct GrammarBuilder {
    rules: Vec<(CompactString, Elem, RuleProperties)>,
    actions: Vec<(CompactString, CompactString, SmallVec<[u8; 4]>)>,
    tops: Vec<CompactString>,
    external_tables: Vec<(CompactString, Vec<Vec<u32>>)>,
}

impl GrammarBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a rule.
    #[must_use]
    pub fn rule(mut self, name: impl Into<CompactString>, elem: Elem) -> Self {
        self.rules.push((name.into(), elem, RuleProperties::NONE));
        self
    }

    /// Define a rule with property flags.
    #[must_use]
    pub fn rule_with(
        mut self,
        name: impl Into<CompactString>,
        elem: Elem,
        properties: RuleProperties,
    ) -> Self {
        self.rules.push((name.into(), elem, properties));
        self
    }

    /// Attach an action to a rule. `elems` are 1-based child slots the AST
    /// factory will read.
    #[must_use]
    pub fn action(
        mut self,
        rule: impl Into<CompactString>,
        name: impl Into<CompactString>,
        elems: &[u8],
    ) -> Self {
        self.actions
            .push((rule.into(), name.into(), elems.iter().copied().collect()));
        self
    }

    /// Add a top-level rule; the driver tries top rules in insertion order.
    #[must_use]
    pub fn top_rule(mut self, name: impl Into<CompactString>) -> Self {
        self.tops.push(name.into());
        self
    }

    /// Supply an externally generated recursion table for `lead`. When any
    /// external table is present the built-in detector is skipped entirely.
    /// Cycle hops are 0-based child indices.
    #[must_use]
    pub fn recursion_table(
        mut self,
        lead: impl Into<CompactString>,
        cycles: Vec<Vec<u32>>,
    ) -> Self {
        self.external_tables.push((lead.into(), cycles));
        self
    }

    /// Build the grammar.
    ///
    /// # Errors
    /// Returns a [`GrammarError`] on duplicate or undefined rule names,
    /// empty rules, a missing top rule, or a malformed recursion table.
    pub fn build(self) -> Result<Grammar, GrammarError> {
        let mut lowering = Lowering::new();

        // The reserved special rules occupy the first two slots.
        let identifier = lowering.add_named("Identifier")?;
        let literal = lowering.add_named("Literal")?;

        for (name, _, _) in &self.rules {
            lowering.add_named(name)?;
        }

        for (i, (name, elem, properties)) in self.rules.iter().enumerate() {
            // Offset past the two reserved rules.
            let id = RuleId(i as u32 + 2);
            lowering.lower_rule(id, name, elem, *properties)?;
        }

        for (rule, name, elems) in &self.actions {
            let id = lowering.resolve(rule)?;
            lowering.rules[id.index()].actions.push(RuleAction {
                name: name.clone(),
                elems: elems.clone(),
            });
        }

        if self.tops.is_empty() {
            return Err(GrammarError::NoTopRule);
        }
        let mut tops = Vec::with_capacity(self.tops.len());
        for name in &self.tops {
            tops.push(lowering.resolve(name)?);
        }

        let tables: Vec<RecursionTable> = if self.external_tables.is_empty() {
            detect_left_recursion(&lowering.rules, &tops)
        } else {
            let mut tables = Vec::with_capacity(self.external_tables.len());
            for (lead, cycles) in &self.external_tables {
                tables.push(RecursionTable {
                    lead: lowering.resolve(lead)?,
                    cycles: cycles.clone(),
                });
            }
            tables
        };
        let recursion = RecursionDb::analyze(&lowering.rules, &tables)?;
        let lookahead = LookAheadTable::compute(&lowering.rules, identifier, literal);

        Ok(Grammar::new(
            lowering.rules,
            lowering.tokens,
            lowering.names,
            lowering.interner,
            identifier,
            literal,
            tops,
            recursion,
            lookahead,
        ))
    }
}

/// Working state while lowering [`Elem`] trees into rule tables.
struct Lowering {
    rules: Vec<RuleTable>,
    tokens: Vec<Token>,
    names: HashMap<lasso::Spur, RuleId, ahash::RandomState>,
    interner: Rodeo,
}

impl Lowering {
    fn new() -> Self {
        Self {
            rules: Vec::new(),
            tokens: Vec::new(),
            names: HashMap::with_hasher(ahash::RandomState::new()),
            interner: Rodeo::new(),
        }
    }

    /// Register a named rule with a placeholder table.
    fn add_named(&mut self, name: &str) -> Result<RuleId, GrammarError> {
        let key = self.interner.get_or_intern(name);
        if self.names.contains_key(&key) {
            return Err(GrammarError::DuplicateRule(name.to_string()));
        }
        let id = RuleId(self.rules.len() as u32);
        self.names.insert(key, id);
        self.rules.push(RuleTable {
            name: key,
            kind: RuleKind::Null,
            children: Vec::new(),
            properties: RuleProperties::NONE,
            actions: Vec::new(),
        });
        Ok(id)
    }

    fn resolve(&self, name: &str) -> Result<RuleId, GrammarError> {
        self.interner
            .get(name)
            .and_then(|key| self.names.get(&key).copied())
            .ok_or_else(|| GrammarError::UndefinedRule(name.to_string()))
    }

    fn intern_token(&mut self, token: &Token) -> TokenId {
        if let Some(i) = self.tokens.iter().position(|t| t == token) {
            return TokenId(i as u32);
        }
        self.tokens.push(token.clone());
        TokenId(self.tokens.len() as u32 - 1)
    }

    /// Fill in the table for a named rule from its element tree.
    fn lower_rule(
        &mut self,
        id: RuleId,
        name: &str,
        elem: &Elem,
        properties: RuleProperties,
    ) -> Result<(), GrammarError> {
        let mut anon = 0u32;
        let (kind, children) = match elem {
            Elem::OneOf(elems) => {
                if elems.is_empty() {
                    return Err(GrammarError::EmptyRule(name.to_string()));
                }
                let mut children = Vec::with_capacity(elems.len());
                for e in elems {
                    children.push(self.lower_child(name, e, &mut anon)?);
                }
                (RuleKind::OneOf, children)
            }
            Elem::Concat(elems) => {
                if elems.is_empty() {
                    return Err(GrammarError::EmptyRule(name.to_string()));
                }
                let mut children = Vec::with_capacity(elems.len());
                for e in elems {
                    children.push(self.lower_child(name, e, &mut anon)?);
                }
                (RuleKind::Concatenate, children)
            }
            Elem::ZeroOrMore(inner) => {
                let child = self.lower_child(name, inner, &mut anon)?;
                (RuleKind::ZeroOrMore, vec![child])
            }
            Elem::ZeroOrOne(inner) => {
                let child = self.lower_child(name, inner, &mut anon)?;
                (RuleKind::ZeroOrOne, vec![child])
            }
            leaf => {
                let child = self.lower_child(name, leaf, &mut anon)?;
                (RuleKind::Data, vec![child])
            }
        };

        let table = &mut self.rules[id.index()];
        table.kind = kind;
        table.children = children;
        table.properties = properties;
        Ok(())
    }

    /// Lower one element to a child ref, creating an anonymous sub-table
    /// for composite elements.
    fn lower_child(
        &mut self,
        parent: &str,
        elem: &Elem,
        anon: &mut u32,
    ) -> Result<ChildRef, GrammarError> {
        match elem {
            Elem::Rule(name) => Ok(ChildRef::Rule(self.resolve(name)?)),
            Elem::Token(token) => Ok(ChildRef::Token(self.intern_token(token))),
            Elem::Identifier => Ok(ChildRef::Rule(self.resolve("Identifier")?)),
            Elem::Literal => Ok(ChildRef::Rule(self.resolve("Literal")?)),
            Elem::Char(c) => Ok(ChildRef::Char(*c)),
            Elem::Str(s) => Ok(ChildRef::Str(self.interner.get_or_intern(s.as_str()))),
            Elem::Type(tag) => Ok(ChildRef::Type(*tag)),
            composite => {
                *anon += 1;
                let name = format!("{parent}_sub{anon}");
                let id = self.add_named(&name)?;
                self.lower_rule(id, &name, composite, RuleProperties::NONE)?;
                Ok(ChildRef::Rule(id))
            }
        }
    }
}
