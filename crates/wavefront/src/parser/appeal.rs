//! # Appeal Tree
//!
//! The tree of every match attempt made during one statement parse.
//!
//! Nodes live in an index-addressed arena owned by the parse; the match
//! cache and secondary-parent links hold [`NodeId`]s, never references, so
//! the whole structure drops in one piece at statement end. The appeal tree
//! is a superset of the final parse tree: sort-out later selects the unique
//! successful sub-tree and records it in `sorted_children`.

use smallvec::SmallVec;

use crate::grammar::RuleId;
use crate::lexer::Token;

/// Index of a node in the [`AppealArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a node attempted to match.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeContent {
    /// The per-statement pseudo root.
    PseudoRoot,
    Rule(RuleId),
    Token(Token),
}

/// Outcome of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppealStatus {
    /// Not yet decided.
    Na,
    Succ,
    /// Success replayed from the match cache; the body was not descended.
    SuccWasSucc,
    /// Re-traversal that did not extend a previously cached success.
    SuccStillWasSucc,
    FailChildrenFailed,
    FailWasFailed,
    FailNotIdentifier,
    FailNotLiteral,
    FailLookAhead,
    /// Deferred failure: the second appearance of a recursion lead inside
    /// the first wavefront instance.
    Fail2ndOf1stInstance,
}

impl AppealStatus {
    #[must_use]
    pub const fn is_succ(self) -> bool {
        matches!(self, Self::Succ | Self::SuccWasSucc | Self::SuccStillWasSucc)
    }

    #[must_use]
    pub const fn is_fail(self) -> bool {
        matches!(
            self,
            Self::FailChildrenFailed
                | Self::FailWasFailed
                | Self::FailNotIdentifier
                | Self::FailNotLiteral
                | Self::FailLookAhead
                | Self::Fail2ndOf1stInstance
        )
    }
}

/// One attempted match.
#[derive(Debug, Clone)]
pub struct AppealNode {
    pub content: NodeContent,
    /// Token position at which the attempt began.
    pub start: u32,
    pub status: AppealStatus,
    /// Deduplicated end positions (inclusive) the attempt can commit to.
    pub matches: SmallVec<[u32; 4]>,
    /// Every attempted child, failed ones included.
    pub children: Vec<NodeId>,
    /// Children selected by sort-out; covers exactly `start..=final_match`.
    pub sorted_children: Vec<NodeId>,
    /// Single end position chosen by sort-out. Meaningful once `sorted`.
    pub final_match: u32,
    pub sorted: bool,
    pub parent: Option<NodeId>,
    /// Later wavefront iterations may adopt a node a second time.
    pub second_parents: SmallVec<[NodeId; 2]>,
    /// The 1-based child slot this node inherited from a shrunk ancestor
    /// edge; 0 when none.
    pub simplified_index: u32,
}

impl AppealNode {
    #[must_use]
    pub fn rule(&self) -> Option<RuleId> {
        match self.content {
            NodeContent::Rule(r) => Some(r),
            _ => None,
        }
    }

    #[must_use]
    pub fn token(&self) -> Option<&Token> {
        match &self.content {
            NodeContent::Token(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_token(&self) -> bool {
        matches!(self.content, NodeContent::Token(_))
    }

    #[must_use]
    pub const fn is_pseudo(&self) -> bool {
        matches!(self.content, NodeContent::PseudoRoot)
    }

    #[must_use]
    pub fn find_match(&self, m: u32) -> bool {
        self.matches.contains(&m)
    }

    pub fn add_match(&mut self, m: u32) {
        if !self.matches.contains(&m) {
            self.matches.push(m);
        }
    }

    /// The largest recorded end position, if any.
    #[must_use]
    pub fn longest_match(&self) -> Option<u32> {
        self.matches.iter().copied().max()
    }
}

/// Index-addressed arena of appeal nodes, dropped wholesale at statement
/// end.
#[derive(Debug, Default)]
pub struct AppealArena {
    nodes: Vec<AppealNode>,
}

impl AppealArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn node(&self, id: NodeId) -> &AppealNode {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut AppealNode {
        &mut self.nodes[id.index()]
    }

    fn alloc(&mut self, content: NodeContent, start: u32) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(AppealNode {
            content,
            start,
            status: AppealStatus::Na,
            matches: SmallVec::new(),
            children: Vec::new(),
            sorted_children: Vec::new(),
            final_match: 0,
            sorted: false,
            parent: None,
            second_parents: SmallVec::new(),
            simplified_index: 0,
        });
        id
    }

    pub fn alloc_pseudo(&mut self) -> NodeId {
        self.alloc(NodeContent::PseudoRoot, 0)
    }

    pub fn alloc_rule(&mut self, rule: RuleId, start: u32) -> NodeId {
        self.alloc(NodeContent::Rule(rule), start)
    }

    pub fn alloc_token(&mut self, token: Token, start: u32) -> NodeId {
        self.alloc(NodeContent::Token(token), start)
    }

    /// Attach `child` under `parent`. The first real parent becomes the
    /// primary one; later adopters go into `second_parents`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.index()].children.push(child);
        match self.nodes[child.index()].parent {
            None => self.nodes[child.index()].parent = Some(parent),
            Some(p) if self.nodes[p.index()].is_pseudo() => {
                self.nodes[child.index()].parent = Some(parent);
            }
            Some(_) => self.nodes[child.index()].second_parents.push(parent),
        }
    }

    /// Overwrite the primary parent; used by sort-out when committing a
    /// child to the selected tree.
    pub fn set_parent(&mut self, child: NodeId, parent: NodeId) {
        self.nodes[child.index()].parent = Some(parent);
    }

    pub fn clear_children(&mut self, id: NodeId) {
        self.nodes[id.index()].children.clear();
        self.nodes[id.index()].sorted_children.clear();
    }

    /// Union `src`'s matches into `dst`; a failed or undecided `dst` takes
    /// over `src`'s status.
    pub fn copy_match(&mut self, dst: NodeId, src: NodeId) {
        let (matches, status) = {
            let s = &self.nodes[src.index()];
            (s.matches.clone(), s.status)
        };
        let d = &mut self.nodes[dst.index()];
        for m in matches {
            d.add_match(m);
        }
        if !d.status.is_succ() {
            d.status = status;
        }
    }

    /// Whether `ancestor` lies on the primary-parent chain above `node`.
    #[must_use]
    pub fn descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = self.nodes[node.index()].parent;
        while let Some(p) = cursor {
            if p == ancestor {
                return true;
            }
            cursor = self.nodes[p.index()].parent;
        }
        false
    }

    /// Swap `existing` for `replacement` in `parent`'s sorted children.
    /// Returns false when `existing` is not there.
    pub fn replace_sorted_child(
        &mut self,
        parent: NodeId,
        existing: NodeId,
        replacement: NodeId,
    ) -> bool {
        let children = &mut self.nodes[parent.index()].sorted_children;
        let Some(pos) = children.iter().position(|&c| c == existing) else {
            return false;
        };
        children[pos] = replacement;
        self.set_parent(replacement, parent);
        true
    }
}
