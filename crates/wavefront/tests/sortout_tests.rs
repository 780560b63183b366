//! Sort-out coverage invariants, cache-hit patching, and transparent-edge
//! shrinking.

use wavefront::grammar::{Elem, Grammar, GrammarBuilder};
use wavefront::lexer::{OpId, Token, VecTokenSource};
use wavefront::parser::Parser;
use wavefront::tree::ParseTree;
use wavefront::ParseError;

fn parse_one(grammar: &Grammar, tokens: Vec<Token>) -> ParseTree {
    let mut parser = Parser::new(grammar, VecTokenSource::single_line(tokens));
    parser
        .parse_statement()
        .expect("statement parses")
        .expect("input is not empty")
}

/// Every inner node's children must cover exactly its token range, in
/// order, with no overlap and no gap.
fn assert_coverage(tree: &ParseTree) {
    tree.walk(|_, node| {
        assert!(node.start <= node.end, "inverted span {:?}", node);
        if node.is_token() {
            assert_eq!(node.start, node.end);
            return;
        }
        if node.children.is_empty() {
            return;
        }
        let mut expected = node.start;
        for &child in &node.children {
            let child = tree.node(child);
            assert_eq!(child.start, expected, "gap or overlap before {child:?}");
            expected = child.end + 1;
        }
        assert_eq!(expected, node.end + 1, "children fall short of {node:?}");
    });
}

fn add_grammar() -> Grammar {
    GrammarBuilder::new()
        .rule(
            "Add",
            Elem::one_of([Elem::rule("Id"), Elem::rule("AddTail")]),
        )
        .rule(
            "AddTail",
            Elem::concat([Elem::rule("Add"), Elem::op(OpId::Add), Elem::rule("Id")]),
        )
        .rule("Id", Elem::identifier())
        .action("Add", "pick_alternative", &[1, 2])
        .action("AddTail", "build_binary", &[1, 2, 3])
        .action("Id", "build_identifier", &[1])
        .top_rule("Add")
        .build()
        .unwrap()
}

#[test]
fn sorted_tree_covers_the_match_exactly() {
    let grammar = add_grammar();
    for len in [1usize, 3, 5, 7] {
        let mut tokens = vec![Token::ident("x")];
        for _ in 0..len / 2 {
            tokens.push(Token::Operator(OpId::Add));
            tokens.push(Token::ident("y"));
        }
        let tree = parse_one(&grammar, tokens);
        assert_eq!(tree.node(tree.root()).end as usize, len - 1);
        assert_coverage(&tree);
    }
}

#[test]
fn oneof_keeps_a_single_sorted_child() {
    let grammar = add_grammar();
    let tree = parse_one(
        &grammar,
        vec![Token::ident("a"), Token::Operator(OpId::Add), Token::ident("b")],
    );
    tree.walk(|_, node| {
        // Add and Id nodes come from OneOf/Data rules; both commit to one
        // child in the sorted tree.
        if node.rule_name == "Add" || node.rule_name == "Id" {
            assert_eq!(node.children.len(), 1, "{node:?}");
        }
    });
}

#[test]
fn transparent_edges_are_shrunk() {
    // Same grammar but without any actions: every single-child edge is
    // transparent and the tree collapses to the concatenation's leaves.
    let grammar = GrammarBuilder::new()
        .rule(
            "Add",
            Elem::one_of([Elem::rule("Id"), Elem::rule("AddTail")]),
        )
        .rule(
            "AddTail",
            Elem::concat([Elem::rule("Add"), Elem::op(OpId::Add), Elem::rule("Id")]),
        )
        .rule("Id", Elem::identifier())
        .top_rule("Add")
        .build()
        .unwrap();

    let tree = parse_one(
        &grammar,
        vec![Token::ident("a"), Token::Operator(OpId::Add), Token::ident("b")],
    );

    let root = tree.node(tree.root());
    assert_eq!(root.rule_name, "AddTail");
    assert_eq!(root.children.len(), 3);

    // The collapsed left operand inherited the slot of AddTail's first
    // child, the right one the slot of its third.
    let left = tree.node(root.children[0]);
    assert_eq!(left.token, Some(Token::ident("a")));
    assert_eq!(left.simplified_index, 1);

    let right = tree.node(root.children[2]);
    assert_eq!(right.token, Some(Token::ident("b")));
    assert_eq!(right.simplified_index, 3);

    // No inner node kept exactly one transparent child.
    tree.walk(|_, node| {
        if !node.is_token() {
            assert_ne!(node.children.len(), 1, "unshrunk edge at {node:?}");
        }
    });
}

#[test]
fn cache_hit_subtrees_are_patched_back() {
    // SA fails after A has been matched and cached; SB replays A from the
    // cache, and sort-out must restore A's real subtree for the factory.
    let grammar = GrammarBuilder::new()
        .rule("S", Elem::one_of([Elem::rule("SA"), Elem::rule("SB")]))
        .rule(
            "SA",
            Elem::concat([Elem::rule("A"), Elem::op(OpId::Add)]),
        )
        .rule(
            "SB",
            Elem::concat([Elem::rule("A"), Elem::op(OpId::Sub)]),
        )
        .rule("A", Elem::identifier())
        .action("A", "build_a", &[1])
        .action("SB", "build_sb", &[1, 2])
        .top_rule("S")
        .build()
        .unwrap();

    let tokens = vec![Token::ident("a"), Token::Operator(OpId::Sub)];
    let mut parser = Parser::new(&grammar, VecTokenSource::single_line(tokens));
    let tree = parser.parse_statement().unwrap().unwrap();

    let root = tree.node(tree.root());
    assert_eq!(root.rule_name, "SB");

    // The A node regained the identifier leaf it never descended into.
    let a = tree.node(root.children[0]);
    assert_eq!(a.rule_name, "A");
    assert_eq!(a.children.len(), 1);
    assert_eq!(
        tree.node(a.children[0]).token,
        Some(Token::ident("a"))
    );

    assert_coverage(&tree);
    assert!(parser.metrics().patch_rounds >= 2);
}

#[test]
fn zero_match_optional_slot_is_skipped() {
    // P : Identifier ZEROORONE('!') Identifier — the optional slot
    // contributes nothing and sort-out must bridge over it.
    let grammar = GrammarBuilder::new()
        .rule(
            "P",
            Elem::concat([
                Elem::identifier(),
                Elem::zero_or_one(Elem::op(OpId::Not)),
                Elem::identifier(),
            ]),
        )
        .action("P", "build_pair", &[1, 3])
        .top_rule("P")
        .build()
        .unwrap();

    let tree = parse_one(&grammar, vec![Token::ident("a"), Token::ident("b")]);
    let root = tree.node(tree.root());
    assert_eq!(root.rule_name, "P");
    assert_eq!(root.end, 1);
    assert_eq!(root.children.len(), 2);
    assert_coverage(&tree);

    // With the operator present the slot participates.
    let tree = parse_one(
        &grammar,
        vec![
            Token::ident("a"),
            Token::Operator(OpId::Not),
            Token::ident("b"),
        ],
    );
    assert_eq!(tree.node(tree.root()).end, 2);
    assert_coverage(&tree);
}

#[test]
fn all_zero_concatenation_fails() {
    // Z consists of zero-capable children only; matching nothing is no
    // progress and must not count as a statement.
    let grammar = GrammarBuilder::new()
        .rule(
            "Z",
            Elem::concat([
                Elem::zero_or_one(Elem::op(OpId::Add)),
                Elem::zero_or_more(Elem::op(OpId::Sub)),
            ]),
        )
        .top_rule("Z")
        .build()
        .unwrap();

    let tokens = vec![Token::ident("a")];
    let mut parser = Parser::new(&grammar, VecTokenSource::single_line(tokens));
    let err = parser.parse_statement().unwrap_err();
    assert!(matches!(err, ParseError::IllegalSyntax { .. }));
    assert_eq!(parser.cursor(), 0);
}

#[test]
fn repetition_chains_backwards() {
    // L : Identifier ZEROORMORE(',' Identifier) — classic list shape.
    let grammar = GrammarBuilder::new()
        .rule(
            "L",
            Elem::concat([
                Elem::identifier(),
                Elem::zero_or_more(Elem::concat([
                    Elem::sep(wavefront::lexer::SepId::Comma),
                    Elem::identifier(),
                ])),
            ]),
        )
        .action("L", "build_list", &[1, 2])
        .top_rule("L")
        .build()
        .unwrap();

    let tokens = vec![
        Token::ident("a"),
        Token::Separator(wavefront::lexer::SepId::Comma),
        Token::ident("b"),
        Token::Separator(wavefront::lexer::SepId::Comma),
        Token::ident("c"),
    ];
    let tree = parse_one(&grammar, tokens);
    assert_eq!(tree.node(tree.root()).end, 4);
    assert_coverage(&tree);

    let mut idents = 0;
    tree.walk(|_, node| {
        if matches!(&node.token, Some(Token::Identifier(_))) {
            idents += 1;
        }
    });
    assert_eq!(idents, 3);
}
