//! # Parse Tree
//!
//! The owned result of one statement parse: the sorted, simplified appeal
//! tree copied out of the per-statement arena. This is the complete input
//! of an AST factory — each node carries its rule or token, the covered
//! token range, the child slot inherited through edge shrinking, and (via
//! the grammar) the rule's action list.

use compact_str::CompactString;

use crate::grammar::{Grammar, RuleAction, RuleId};
use crate::lexer::Token;
use crate::parser::appeal::{AppealArena, NodeId};

/// Index of a node within a [`ParseTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeNodeId(pub u32);

impl TreeNodeId {
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One node of the final parse tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// The rule this node matched; `None` for token leaves.
    pub rule: Option<RuleId>,
    /// The rule's display name, or the empty string for token leaves.
    pub rule_name: CompactString,
    /// The matched token for leaves.
    pub token: Option<Token>,
    /// First covered token position.
    pub start: u32,
    /// Last covered token position, inclusive.
    pub end: u32,
    /// The 1-based child slot inherited through edge shrinking; 0 if none.
    pub simplified_index: u32,
    pub children: Vec<TreeNodeId>,
}

impl TreeNode {
    #[must_use]
    pub const fn is_token(&self) -> bool {
        self.token.is_some()
    }
}

/// The parse tree of one statement.
#[derive(Debug, Clone)]
pub struct ParseTree {
    nodes: Vec<TreeNode>,
    root: TreeNodeId,
}

impl ParseTree {
    /// Copy the sorted tree under `root` out of the arena.
    #[must_use]
    pub(crate) fn build(grammar: &Grammar, arena: &AppealArena, root: NodeId) -> Self {
        let mut nodes = Vec::new();
        let root = copy_node(grammar, arena, root, &mut nodes);
        Self { nodes, root }
    }

    #[must_use]
    pub const fn root(&self) -> TreeNodeId {
        self.root
    }

    #[inline]
    #[must_use]
    pub fn node(&self, id: TreeNodeId) -> &TreeNode {
        &self.nodes[id.index()]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The actions of the rule a node matched, for the AST factory.
    #[must_use]
    pub fn actions<'g>(&self, grammar: &'g Grammar, id: TreeNodeId) -> &'g [RuleAction] {
        match self.node(id).rule {
            Some(rule) => &grammar.rule(rule).actions,
            None => &[],
        }
    }

    /// Depth-first pre-order walk.
    pub fn walk(&self, mut visit: impl FnMut(TreeNodeId, &TreeNode)) {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            visit(id, node);
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }
    }
}

fn copy_node(
    grammar: &Grammar,
    arena: &AppealArena,
    id: NodeId,
    out: &mut Vec<TreeNode>,
) -> TreeNodeId {
    let node = arena.node(id);
    let slot = TreeNodeId(out.len() as u32);
    out.push(TreeNode {
        rule: node.rule(),
        rule_name: node
            .rule()
            .map(|r| CompactString::from(grammar.name(r)))
            .unwrap_or_default(),
        token: node.token().cloned(),
        start: node.start,
        end: node.final_match,
        simplified_index: node.simplified_index,
        children: Vec::with_capacity(node.sorted_children.len()),
    });

    for &child in &node.sorted_children {
        let copied = copy_node(grammar, arena, child, out);
        out[slot.index()].children.push(copied);
    }
    slot
}

/// All statements of one input, in source order.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub trees: Vec<ParseTree>,
}

impl Module {
    #[must_use]
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}
